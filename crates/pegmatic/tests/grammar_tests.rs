//! Tests for grammar construction, rule caching and starter sets

use pegmatic::grammar::{GrammarBuilder, LazyGrammar, RuleKey, RuleResult};
use pegmatic::{ConstructionError, MatcherKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn keyword(g: &mut GrammarBuilder<()>, word: &str) -> RuleResult {
    g.rule(RuleKey::new("keyword").arg(word), |g| {
        let text = g.string(word)?;
        let lower = g.char_range('a', 'z')?;
        let boundary = g.test_not(lower)?;
        g.sequence([text, boundary])
    })
}

#[test]
fn test_recursive_rule_is_built_once() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn nested(g: &mut GrammarBuilder<()>) -> RuleResult {
        g.rule(RuleKey::new("Nested"), |g| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            let open = g.ch('[')?;
            let inner = nested(g)?;
            let inner = g.zero_or_more(inner)?;
            let close = g.ch(']')?;
            g.sequence([open, inner, close])
        })
    }

    let grammar = GrammarBuilder::build(nested).unwrap();
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(grammar.rule_count(), 1);
    assert_eq!(grammar.rule_named("Nested"), Some(grammar.root()));
    // The recursive reference points back at the root, not at a copy.
    let MatcherKind::Sequence(children) = grammar.get(grammar.root()).unwrap().kind() else {
        panic!("rule body should be a sequence");
    };
    let MatcherKind::ZeroOrMore(inner) = grammar.get(children[1]).unwrap().kind() else {
        panic!("second step should repeat the rule");
    };
    assert_eq!(*inner, grammar.root());

    let outcome = pegmatic::parse(&grammar, "[[][[]]]").unwrap();
    assert!(outcome.is_complete(8));
}

#[test]
fn test_mutually_recursive_rules() {
    fn value(g: &mut GrammarBuilder<()>) -> RuleResult {
        g.rule(RuleKey::new("Value"), |g| {
            let open = g.ch('[')?;
            let items = list(g)?;
            let items = g.optional(items)?;
            let close = g.ch(']')?;
            let array = g.sequence([open, items, close])?;
            let atom = g.ch('x')?;
            g.first_of([array, atom])
        })
    }

    fn list(g: &mut GrammarBuilder<()>) -> RuleResult {
        g.rule(RuleKey::new("List"), |g| {
            let first = value(g)?;
            let comma = g.ch(',')?;
            let next = value(g)?;
            let more = g.sequence([comma, next])?;
            let more = g.zero_or_more(more)?;
            g.sequence([first, more])
        })
    }

    let grammar = GrammarBuilder::build(value).unwrap();
    assert_eq!(grammar.rule_count(), 2);
    for (input, complete) in [("x", true), ("[]", true), ("[x,[x,x],[]]", true), ("[x,]", false)] {
        let outcome = pegmatic::parse(&grammar, input).unwrap();
        assert_eq!(
            outcome.is_complete(input.chars().count()),
            complete,
            "input {input:?}"
        );
    }
}

#[test]
fn test_rule_arguments_are_part_of_the_key() {
    let grammar = GrammarBuilder::<()>::build(|g| {
        let let_kw = keyword(g, "let")?;
        let if_kw = keyword(g, "if")?;
        let again = keyword(g, "let")?;
        assert_eq!(let_kw, again);
        assert_ne!(let_kw, if_kw);
        g.first_of([let_kw, if_kw])
    })
    .unwrap();
    assert_eq!(grammar.rule_count(), 2);

    let let_kw = grammar.rule(&RuleKey::new("keyword").arg("let")).unwrap();
    assert_eq!(grammar.label(let_kw), "keyword(\"let\")");
    assert!(grammar.get(let_kw).unwrap().is_rule());

    assert!(pegmatic::parse(&grammar, "if").unwrap().matched);
    assert!(!pegmatic::parse(&grammar, "iffy").unwrap().matched);
}

#[test]
fn test_explicit_label_survives_rule_naming() {
    fn ws(g: &mut GrammarBuilder<()>) -> RuleResult {
        g.rule(RuleKey::new("Ws"), |g| {
            let space = g.any_of([' ', '\t', '\n'])?;
            let spaces = g.one_or_more(space)?;
            g.label(spaces, "whitespace")
        })
    }
    let grammar = GrammarBuilder::build(ws).unwrap();
    assert_eq!(grammar.label(grammar.root()), "whitespace");
    assert_eq!(grammar.rule_named("Ws"), Some(grammar.root()));
}

fn digits(g: &mut GrammarBuilder<()>) -> RuleResult {
    g.rule(RuleKey::new("Digits"), |g| {
        let digit = g.char_range('0', '9')?;
        g.one_or_more(digit)
    })
}

#[test]
fn test_built_rules_are_sealed() {
    let mut g = GrammarBuilder::<()>::new();
    let rule = digits(&mut g).unwrap();
    let sealed = ConstructionError::SealedRule {
        rule: "Digits".into(),
    };
    assert_eq!(g.label(rule, "Number"), Err(sealed.clone()));
    assert_eq!(g.without_node(rule), Err(sealed));
}

#[test]
fn test_rule_returning_another_rule_gets_its_own_matcher() {
    let grammar = GrammarBuilder::<()>::build(|g| {
        let inner = digits(g)?;
        let outer = g.rule(RuleKey::new("Count"), digits)?;
        let comma = g.ch(',')?;
        g.sequence([inner, comma, outer])
    })
    .unwrap();
    let inner = grammar.rule_named("Digits").unwrap();
    let outer = grammar.rule_named("Count").unwrap();
    assert_ne!(inner, outer);
    assert_eq!(grammar.label(inner), "Digits");
    assert_eq!(grammar.label(outer), "Count");

    let tree = pegmatic::parse(&grammar, "1,2").unwrap().tree.unwrap();
    let labels: Vec<_> = tree.children.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels[0], "Digits");
    assert_eq!(labels[2], "Count");
    assert_eq!(tree.children[2].children[0].label, "Digits");
}

#[test]
fn test_leaked_placeholder_is_unresolved() {
    let err = GrammarBuilder::<()>::build(|g| {
        let mut leaked = None;
        let refused = g.rule(RuleKey::new("A"), |g| {
            leaked = Some(g.rule(RuleKey::new("A"), |g| g.ch('a'))?);
            Err(ConstructionError::factory("A", "refused"))
        });
        assert!(refused.is_err());
        let placeholder = leaked.expect("recursive call returns a placeholder");
        g.optional(placeholder)
    })
    .unwrap_err();
    assert_eq!(
        err,
        ConstructionError::UnresolvedPlaceholder { rule: "A".into() }
    );
}

#[test]
fn test_factory_errors_propagate() {
    fn picky(g: &mut GrammarBuilder<()>, width: u32) -> RuleResult {
        g.rule(RuleKey::new("picky").arg(width), |g| {
            if width == 0 {
                return Err(ConstructionError::factory("picky", "width must be positive"));
            }
            g.ch('p')
        })
    }
    let err = GrammarBuilder::<()>::build(|g| picky(g, 0)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "rule `picky` failed to construct: width must be positive"
    );
    assert!(GrammarBuilder::<()>::build(|g| picky(g, 2)).is_ok());
}

#[test]
fn test_zero_width_repetition_is_rejected() {
    let err = GrammarBuilder::<()>::build(|g| {
        let a = g.ch('a')?;
        let maybe = g.optional(a)?;
        let many = g.zero_or_more(maybe)?;
        g.label(many, "Many")
    })
    .unwrap_err();
    assert_eq!(
        err,
        ConstructionError::ZeroWidthRepetition {
            label: "Many".into()
        }
    );
}

#[test]
fn test_repetition_of_recursive_optional_rule_is_rejected() {
    fn items(g: &mut GrammarBuilder<()>) -> RuleResult {
        g.rule(RuleKey::new("Items"), |g| {
            let x = g.ch('x')?;
            let rest = items(g)?;
            let pair = g.sequence([x, rest])?;
            g.optional(pair)
        })
    }
    let err = GrammarBuilder::<()>::build(|g| {
        let it = items(g)?;
        g.one_or_more(it)
    })
    .unwrap_err();
    assert!(matches!(err, ConstructionError::ZeroWidthRepetition { .. }));
}

#[test]
fn test_suppressing_lookahead_names_the_matcher() {
    let mut g = GrammarBuilder::<()>::new();
    let digit = g.char_range('0', '9').unwrap();
    let peek = g.test(digit).unwrap();
    let peek = g.label(peek, "DigitAhead").unwrap();
    assert_eq!(
        g.without_node(peek),
        Err(ConstructionError::InvalidSuppression {
            label: "DigitAhead".into()
        })
    );
}

#[test]
fn test_lookahead_labels() {
    let grammar = GrammarBuilder::<()>::build(|g| {
        let digit = g.char_range('0', '9')?;
        let peek = g.test(digit)?;
        g.test_not(peek)
    })
    .unwrap();
    let root = grammar.root();
    assert_eq!(grammar.label(root), "!(&('0'..'9'))");
    assert_eq!(grammar.expected(root), "not '0'..'9'");
}

#[test]
fn test_starter_chars() {
    let grammar = GrammarBuilder::<()>::build(|g| {
        let sign = g.ch('+')?;
        let sign = g.optional(sign)?;
        let digit = g.char_range('0', '9')?;
        let number = g.sequence([sign, digit])?;
        let number = g.label(number, "Number")?;
        let not_digit = g.test_not(digit)?;
        let not_digit = g.label(not_digit, "NotDigit")?;
        let a = g.ch('a')?;
        let many_a = g.zero_or_more(a)?;
        let many_a = g.label(many_a, "ManyA")?;
        g.first_of([number, not_digit, many_a])
    })
    .unwrap();
    let find = |label: &str| {
        grammar
            .ids()
            .find(|&id| grammar.label(id) == label)
            .unwrap()
    };

    let number = grammar.starter_chars(find("Number"));
    assert!(number.contains('+'));
    assert!(number.contains('7'));
    assert!(!number.contains('-'));
    assert!(!number.contains_empty());

    let not_digit = find("NotDigit");
    assert!(grammar.can_start_with(not_digit, 'q'));
    assert!(!grammar.can_start_with(not_digit, '3'));
    assert!(!grammar.starter_chars(not_digit).contains_empty());

    let many_a = find("ManyA");
    assert!(grammar.starter_chars(many_a).contains_empty());
    assert!(grammar.is_nullable(many_a));
    assert!(!grammar.is_nullable(find("Number")));

    let root = grammar.starter_chars(grammar.root());
    assert!(root.contains('+') && root.contains('a') && root.contains('z'));
    assert!(root.contains_empty());
}

#[test]
fn test_starter_chars_of_recursive_rule() {
    fn parens(g: &mut GrammarBuilder<()>) -> RuleResult {
        g.rule(RuleKey::new("Parens"), |g| {
            let open = g.ch('(')?;
            let inner = parens(g)?;
            let close = g.ch(')')?;
            let nested = g.sequence([open, inner, close])?;
            let x = g.ch('x')?;
            g.first_of([nested, x])
        })
    }
    let grammar = GrammarBuilder::build(parens).unwrap();
    let set = grammar.starter_chars(grammar.root());
    assert_eq!(
        set.ranges().collect::<Vec<_>>(),
        vec![('(', '('), ('x', 'x')]
    );
    assert!(!set.contains_empty());
}

fn words(g: &mut GrammarBuilder<()>) -> RuleResult {
    static BUILDS: AtomicUsize = AtomicUsize::new(0);
    assert_eq!(BUILDS.fetch_add(1, Ordering::SeqCst), 0, "built twice");
    g.rule(RuleKey::new("Words"), |g| {
        let letter = g.char_range('a', 'z')?;
        let word = g.one_or_more(letter)?;
        let space = g.ch(' ')?;
        let more = g.sequence([space, word])?;
        let more = g.zero_or_more(more)?;
        g.sequence([word, more])
    })
}

static WORDS: LazyGrammar<()> = LazyGrammar::new(words);

#[test]
fn test_lazy_grammar_is_shared_between_threads() {
    let grammars: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4).map(|_| scope.spawn(|| WORDS.get().unwrap())).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(WORDS.is_initialized());
    for grammar in &grammars[1..] {
        assert!(Arc::ptr_eq(&grammars[0], grammar));
    }

    let parser = WORDS.parser(pegmatic::ParseConfig::default()).unwrap();
    assert!(parser.parse("hello lazy world").unwrap().is_complete(16));
}

#[test]
fn test_lazy_grammar_keeps_its_error() {
    fn selfish(g: &mut GrammarBuilder<()>) -> RuleResult {
        g.rule(RuleKey::new("Selfish"), selfish)
    }
    static BROKEN: LazyGrammar<()> = LazyGrammar::new(selfish);
    let first = BROKEN.get().unwrap_err();
    assert_eq!(BROKEN.get().unwrap_err(), first);
    assert!(BROKEN.is_initialized());
}
