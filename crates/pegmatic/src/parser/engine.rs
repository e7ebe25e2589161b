//! # Evaluation
//!
//! One dispatch over [`MatcherKind`]. Every arm upholds the same contract: on
//! `Ok(true)` the cursor has advanced per the variant's semantics, on
//! `Ok(false)` it is back where the matcher started. `Err` aborts the parse.

use crate::context::MatcherContext;
use crate::error::ParseError;
use crate::matcher::{Action, MatcherKind};

pub(crate) fn evaluate<V: Clone>(ctx: &mut MatcherContext<'_, '_, V>) -> Result<bool, ParseError> {
    let grammar = ctx.grammar();
    let id = ctx.matcher();
    match &grammar.node(id).kind {
        MatcherKind::Sequence(children) => {
            let start = ctx.cursor;
            for &child in children {
                if !ctx.run_child(child)? {
                    // Backtrack: restore position
                    ctx.cursor = start;
                    return Ok(false);
                }
            }
            Ok(true)
        }

        // PEG: ordered choice, first match wins
        MatcherKind::Choice(children) => {
            for &child in children {
                if ctx.run_child(child)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }

        MatcherKind::ZeroOrMore(child) | MatcherKind::OneOrMore(child) => {
            let mut count = 0usize;
            loop {
                let before = ctx.cursor;
                if !ctx.run_child(*child)? {
                    break;
                }
                if ctx.cursor == before {
                    return Err(ParseError::NonAdvancingRepetition {
                        label: grammar.label(id).to_string(),
                        position: before,
                    });
                }
                count += 1;
            }
            Ok(count > 0 || matches!(grammar.node(id).kind, MatcherKind::ZeroOrMore(_)))
        }

        MatcherKind::Optional(child) => {
            ctx.run_child(*child)?;
            Ok(true)
        }

        MatcherKind::Test(child) => lookahead(ctx, *child, true),
        MatcherKind::TestNot(child) => lookahead(ctx, *child, false),

        MatcherKind::Action(action) => run_action(ctx, action),

        MatcherKind::Terminal(terminal) => {
            let rest = ctx.input().get(ctx.cursor..).unwrap_or_default();
            match terminal.match_len(rest) {
                Some(len) => {
                    ctx.cursor += len;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }
}

/// Evaluate `child` speculatively and compare its outcome with `positive`.
///
/// The child runs in a disposable context with enforcement cleared, so
/// nothing it does (cursor, nodes, variables, recorded failures) survives.
fn lookahead<V: Clone>(
    ctx: &mut MatcherContext<'_, '_, V>,
    child: crate::matcher::MatcherId,
    positive: bool,
) -> Result<bool, ParseError> {
    let mark = ctx.var_mark();
    let matched = {
        let mut sub = ctx.sub_context(child);
        sub.clear_enforcement();
        sub.mark_speculative();
        sub.run()?.is_some()
    };
    ctx.truncate_vars(mark);
    Ok(matched == positive)
}

/// Run an action against the context of the matcher that contains it.
pub(crate) fn run_action<V: Clone>(
    ctx: &mut MatcherContext<'_, '_, V>,
    action: &Action<V>,
) -> Result<bool, ParseError> {
    if ctx.is_speculative() && !action.run_in_predicates {
        return Ok(true);
    }
    ctx.check_interrupt()?;
    ctx.count_action();
    let before = ctx.cursor;
    let mark = ctx.var_mark();
    match (action.run)(ctx) {
        Ok(true) => Ok(true),
        Ok(false) => {
            ctx.cursor = before;
            ctx.truncate_vars(mark);
            Ok(false)
        }
        Err(source) => {
            let label = ctx.rule_label();
            log_debug!("action in `{label}` failed at {before}: {source}");
            Err(ParseError::Action {
                label,
                position: before,
                source,
            })
        }
    }
}
