//! Static checks over a linked matcher arena.

use crate::error::ConstructionError;
use crate::matcher::{Matcher, MatcherKind};

/// Which matchers can succeed without consuming input.
///
/// Least fixpoint over the arena, so recursive rules settle on the smallest
/// consistent answer. Lookaheads and actions are always nullable.
pub(crate) fn nullable<V>(nodes: &[Matcher<V>]) -> Vec<bool> {
    let mut result = vec![false; nodes.len()];
    let mut changed = true;
    while changed {
        changed = false;
        for (i, matcher) in nodes.iter().enumerate() {
            if result[i] {
                continue;
            }
            let now = match &matcher.kind {
                MatcherKind::Sequence(children) => {
                    children.iter().all(|child| result[child.index()])
                }
                MatcherKind::Choice(children) => {
                    children.iter().any(|child| result[child.index()])
                }
                MatcherKind::OneOrMore(child) => result[child.index()],
                MatcherKind::ZeroOrMore(_)
                | MatcherKind::Optional(_)
                | MatcherKind::Test(_)
                | MatcherKind::TestNot(_)
                | MatcherKind::Action(_) => true,
                MatcherKind::Terminal(terminal) => terminal.is_nullable(),
            };
            if now {
                result[i] = true;
                changed = true;
            }
        }
    }
    result
}

/// Reject repetitions whose body can succeed without advancing: such a loop
/// would either spin forever or stop for reasons nobody specified.
pub(crate) fn check_repetitions<V>(
    nodes: &[Matcher<V>],
    nullable: &[bool],
    label: impl Fn(usize) -> String,
) -> Result<(), ConstructionError> {
    for (i, matcher) in nodes.iter().enumerate() {
        if let MatcherKind::ZeroOrMore(child) | MatcherKind::OneOrMore(child) = &matcher.kind
            && nullable[child.index()]
        {
            return Err(ConstructionError::ZeroWidthRepetition { label: label(i) });
        }
    }
    Ok(())
}
