//! Property-based tests for evaluation and starter sets
//!
//! These tests use proptest to generate random inputs and char sets and
//! check the invariants every parse and every FIRST set must uphold.

#![cfg(test)]

use pegmatic::grammar::{GrammarBuilder, RuleKey, RuleResult};
use pegmatic::{Chars, Grammar};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

const ALPHABET: [char; 6] = ['a', 'b', 'x', ',', '[', ']'];

// Value = '[' (Value (',' Value)*)? ']' / 'x' / "ab" / 'a'
fn value(g: &mut GrammarBuilder<()>) -> RuleResult {
    g.rule(RuleKey::new("Value"), |g| {
        let open = g.ch('[')?;
        let first = value(g)?;
        let comma = g.ch(',')?;
        let next = value(g)?;
        let more = g.sequence([comma, next])?;
        let more = g.zero_or_more(more)?;
        let items = g.sequence([first, more])?;
        let items = g.optional(items)?;
        let close = g.ch(']')?;
        let array = g.sequence([open, items, close])?;
        let x = g.ch('x')?;
        let ab = g.string("ab")?;
        let a = g.ch('a')?;
        g.first_of([array, x, ab, a])
    })
}

fn values() -> Grammar<()> {
    GrammarBuilder::build(value).unwrap()
}

/// How a possibly failing `"abx"`-style sequence is wrapped.
#[derive(Debug, Clone, Copy)]
enum Wrapper {
    /// `("abx")?`
    Optional,
    /// `"abx" / "ab" / EMPTY`
    Choice,
    /// `("ab")*`
    Repetition,
}

/// How far the wrapped matcher should advance over `rest`.
fn expected_advance(wrapper: Wrapper, rest: &[char]) -> usize {
    match wrapper {
        Wrapper::Optional => {
            if rest.starts_with(&['a', 'b', 'x']) {
                3
            } else {
                0
            }
        }
        Wrapper::Choice => {
            if rest.starts_with(&['a', 'b', 'x']) {
                3
            } else if rest.starts_with(&['a', 'b']) {
                2
            } else {
                0
            }
        }
        Wrapper::Repetition => 2 * rest.chunks(2).take_while(|pair| *pair == ['a', 'b']).count(),
    }
}

/// Parse `x* <mark> <wrapped> <mark>` and return both marked cursors.
fn marked_cursors(wrapper: Wrapper, input: &str) -> Vec<usize> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let grammar = GrammarBuilder::<()>::build(move |g| {
        let x = g.ch('x')?;
        let xs = g.zero_or_more(x)?;
        let a = g.ch('a')?;
        let b = g.ch('b')?;
        let ab = g.sequence([a, b])?;
        let abx = g.sequence([a, b, x])?;
        let wrapped = match wrapper {
            Wrapper::Optional => g.optional(abx)?,
            Wrapper::Choice => {
                let empty = g.empty()?;
                g.first_of([abx, ab, empty])?
            }
            Wrapper::Repetition => g.zero_or_more(ab)?,
        };
        let mark = g.action(move |ctx| {
            log.lock().unwrap().push(ctx.cursor());
            Ok(true)
        })?;
        g.sequence([xs, mark, wrapped, mark])
    })
    .unwrap();
    let outcome = pegmatic::parse(&grammar, input).unwrap();
    assert!(outcome.matched);
    let cursors = seen.lock().unwrap().clone();
    cursors
}

fn wrapper_strategy() -> impl Strategy<Value = Wrapper> {
    prop_oneof![
        Just(Wrapper::Optional),
        Just(Wrapper::Choice),
        Just(Wrapper::Repetition)
    ]
}

fn input_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(ALPHABET.to_vec()), 0..16)
        .prop_map(|chars| chars.into_iter().collect())
}

fn char_set_strategy() -> impl Strategy<Value = Vec<char>> {
    prop::collection::vec(prop::sample::select(ALPHABET.to_vec()), 0..4)
}

proptest! {
    #[test]
    fn prop_outcome_cursor_is_consistent(input in input_strategy()) {
        let grammar = values();
        let outcome = pegmatic::parse(&grammar, &input).unwrap();
        if outcome.matched {
            prop_assert!(outcome.cursor <= input.chars().count());
            let tree = outcome.tree.unwrap();
            prop_assert_eq!((tree.start, tree.end), (0, outcome.cursor));
        } else {
            prop_assert_eq!(outcome.cursor, 0);
            prop_assert!(outcome.tree.is_none());
            prop_assert!(outcome.failure.is_some());
        }
    }

    #[test]
    fn prop_failed_inner_match_restores_cursor(
        wrapper in wrapper_strategy(),
        input in input_strategy(),
    ) {
        let chars: Vec<char> = input.chars().collect();
        let before = chars.iter().take_while(|&&c| c == 'x').count();
        let cursors = marked_cursors(wrapper, &input);
        prop_assert_eq!(cursors.len(), 2);
        prop_assert_eq!(cursors[0], before);
        prop_assert_eq!(cursors[1], before + expected_advance(wrapper, &chars[before..]));
    }

    #[test]
    fn prop_child_nodes_tile_their_parent(input in input_strategy()) {
        let grammar = values();
        let outcome = pegmatic::parse(&grammar, &input).unwrap();
        let mut stack: Vec<_> = outcome.tree.iter().collect();
        while let Some(node) = stack.pop() {
            let mut at = node.start;
            for child in &node.children {
                prop_assert!(child.start >= at);
                prop_assert!(child.end <= node.end);
                at = child.end;
                stack.push(child);
            }
        }
    }

    #[test]
    fn prop_match_starts_with_a_starter_char(input in input_strategy()) {
        let grammar = values();
        let outcome = pegmatic::parse(&grammar, &input).unwrap();
        let starters = grammar.starter_chars(grammar.root());
        if outcome.matched {
            match input.chars().next() {
                Some(c) if outcome.cursor > 0 => prop_assert!(starters.contains(c)),
                _ => prop_assert!(starters.contains_empty()),
            }
        }
    }

    #[test]
    fn prop_double_negation_is_positive_lookahead(input in input_strategy()) {
        let double = GrammarBuilder::<()>::build(|g| {
            let v = value(g)?;
            let not_v = g.test_not(v)?;
            g.test_not(not_v)
        })
        .unwrap();
        let single = GrammarBuilder::<()>::build(|g| {
            let v = value(g)?;
            g.test(v)
        })
        .unwrap();
        let a = pegmatic::parse(&double, &input).unwrap();
        let b = pegmatic::parse(&single, &input).unwrap();
        prop_assert_eq!(a.matched, b.matched);
        prop_assert_eq!(a.cursor, 0);
        prop_assert_eq!(b.cursor, 0);
    }

    #[test]
    fn prop_negated_test_starters_complement_the_child(set in char_set_strategy()) {
        let grammar = GrammarBuilder::<()>::build(|g| {
            let any_of = g.any_of(set.iter().copied())?;
            g.test_not(any_of)
        })
        .unwrap();
        let starters = grammar.starter_chars(grammar.root());
        prop_assert!(!starters.contains_empty());
        for c in ALPHABET {
            prop_assert_eq!(starters.contains(c), !set.contains(&c));
        }
    }

    #[test]
    fn prop_char_set_algebra(a in char_set_strategy(), b in char_set_strategy()) {
        let sa: Chars = a.iter().copied().collect();
        let sb: Chars = b.iter().copied().collect();
        let union = sa.union(&sb);
        let both = sa.intersect(&sb);
        let only_a = sa.remove(&sb);
        let not_a = sa.complement();
        for c in ALPHABET {
            let (in_a, in_b) = (a.contains(&c), b.contains(&c));
            prop_assert_eq!(union.contains(c), in_a || in_b);
            prop_assert_eq!(both.contains(c), in_a && in_b);
            prop_assert_eq!(only_a.contains(c), in_a && !in_b);
            prop_assert_eq!(not_a.contains(c), !in_a);
            prop_assert_eq!(not_a.union(&sb).contains(c), !in_a || in_b);
        }
        prop_assert!(!union.contains_empty());
        prop_assert!(not_a.contains_empty());
    }
}
