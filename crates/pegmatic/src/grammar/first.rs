//! FIRST (starter) sets.

use super::Grammar;
use crate::chars::Chars;
use crate::matcher::{MatcherId, MatcherKind};

/// Starter set of every matcher in a grammar.
#[derive(Debug)]
pub(crate) struct FirstSets {
    sets: Vec<Chars>,
}

impl FirstSets {
    pub(crate) fn compute<V>(grammar: &Grammar<V>) -> Self {
        let mut calc = Calculator {
            grammar,
            memo: vec![None; grammar.len()],
            visiting: vec![false; grammar.len()],
        };
        let sets = grammar.ids().map(|id| calc.starter(id)).collect();
        Self { sets }
    }

    pub(crate) fn get(&self, id: MatcherId) -> &Chars {
        &self.sets[id.index()]
    }
}

struct Calculator<'g, V> {
    grammar: &'g Grammar<V>,
    memo: Vec<Option<Chars>>,
    visiting: Vec<bool>,
}

impl<V> Calculator<'_, V> {
    fn starter(&mut self, id: MatcherId) -> Chars {
        let i = id.index();
        if let Some(set) = &self.memo[i] {
            return set.clone();
        }
        // Only left recursion can lead back here; it never matches in a PEG.
        if self.visiting[i] {
            return Chars::none();
        }
        self.visiting[i] = true;
        let set = match &self.grammar.node(id).kind {
            MatcherKind::Sequence(children) => {
                let mut set = Chars::empty();
                for child in children {
                    let child_set = self.starter(*child);
                    set = set.without_empty().union(&child_set);
                    if !child_set.contains_empty() {
                        break;
                    }
                }
                set
            }
            MatcherKind::Choice(children) => children
                .iter()
                .fold(Chars::none(), |acc, child| acc.union(&self.starter(*child))),
            MatcherKind::ZeroOrMore(child) | MatcherKind::Optional(child) => {
                self.starter(*child).with_empty()
            }
            MatcherKind::OneOrMore(child) | MatcherKind::Test(child) => self.starter(*child),
            MatcherKind::TestNot(child) => Chars::all_except_empty().remove(&self.starter(*child)),
            MatcherKind::Action(_) => Chars::empty(),
            MatcherKind::Terminal(terminal) => terminal.starter_chars(),
        };
        self.visiting[i] = false;
        self.memo[i] = Some(set.clone());
        set
    }
}
