//! # Execution Context
//!
//! One [`MatcherContext`] exists per matcher invocation. It owns the cursor of
//! that invocation, the tree nodes collected by its successful children and
//! the value its actions produced. Everything shared by the whole parse (the
//! input, the grammar, the invocation stack with its action-variable frames,
//! the furthest failure) lives in a `ParseState` that every context borrows.
//!
//! Contexts nest by reborrowing: a child context is created for a sub-match,
//! runs, and is dropped. Only a successful child commits anything back into
//! its parent, which is what makes rollback free.
//!
//! Action closures receive the context of the matcher that contains them and
//! use it to read what was matched and to produce values:
//!
//! ```rust
//! use pegmatic::grammar::GrammarBuilder;
//!
//! let grammar = GrammarBuilder::<u32>::build(|g| {
//!     let digit = g.char_range('0', '9')?;
//!     let digits = g.one_or_more(digit)?;
//!     let to_number = g.action(|ctx| {
//!         let n = ctx.last_text().parse().unwrap_or(0);
//!         ctx.set_value(n);
//!         Ok(true)
//!     })?;
//!     g.sequence([digits, to_number])
//! })
//! .expect("valid grammar");
//!
//! let outcome = pegmatic::parse(&grammar, "42").expect("no action faults");
//! assert_eq!(outcome.value, Some(42));
//! ```

use crate::error::{ActionFault, ParseError};
use crate::grammar::Grammar;
use crate::matcher::{MatcherId, MatcherKind};
use crate::parser::{FailureReport, ParseConfig, ParseMetrics, ParseWarning, engine};
use crate::tree::{Captured, ParseNode, slice_text};
use compact_str::CompactString;
use std::any::Any;
use std::time::Instant;

/// A value visible to actions of one rule invocation.
enum Binding<V> {
    /// What a named sub-rule matched.
    Captured(Captured<V>),
    /// A typed local carried from one action to a later one.
    Local(Box<dyn Any>),
}

/// Action variables of one rule invocation.
struct Frame<V> {
    vars: Vec<(CompactString, Binding<V>)>,
}

impl<V> Frame<V> {
    const fn new() -> Self {
        Self { vars: Vec::new() }
    }

    fn find(&self, name: &str) -> Option<&Binding<V>> {
        self.vars
            .iter()
            .rev()
            .find_map(|(n, binding)| (n == name).then_some(binding))
    }
}

/// State shared by every context of one parse.
pub(crate) struct ParseState<'a, V> {
    grammar: &'a Grammar<V>,
    input: &'a [char],
    config: &'a ParseConfig,
    started: Instant,
    /// Active rule invocations: (rule, start position).
    invocations: Vec<(MatcherId, usize)>,
    /// Active matcher invocations of any kind.
    depth: usize,
    /// One frame per active rule, plus a root frame for top-level actions.
    frames: Vec<Frame<V>>,
    failure: Option<FailureReport>,
    warnings: Vec<ParseWarning>,
    metrics: ParseMetrics,
}

impl<'a, V> ParseState<'a, V> {
    pub(crate) fn new(grammar: &'a Grammar<V>, input: &'a [char], config: &'a ParseConfig) -> Self {
        Self {
            grammar,
            input,
            config,
            started: Instant::now(),
            invocations: Vec::new(),
            depth: 0,
            frames: vec![Frame::new()],
            failure: None,
            warnings: Vec::new(),
            metrics: ParseMetrics::default(),
        }
    }

    /// Consume the state, returning what the parse left for the caller.
    pub(crate) fn finish(mut self) -> (Option<FailureReport>, Vec<ParseWarning>, ParseMetrics) {
        self.metrics.parse_time = self.started.elapsed();
        (self.failure, self.warnings, self.metrics)
    }

    fn frame(&self) -> &Frame<V> {
        // The root frame is never popped.
        &self.frames[self.frames.len() - 1]
    }

    fn frame_mut(&mut self) -> &mut Frame<V> {
        let top = self.frames.len() - 1;
        &mut self.frames[top]
    }

    pub(crate) fn var_mark(&self) -> usize {
        self.frame().vars.len()
    }

    pub(crate) fn truncate_vars(&mut self, mark: usize) {
        self.frame_mut().vars.truncate(mark);
    }

    fn record_failure(&mut self, position: usize, expected: String) {
        match &mut self.failure {
            Some(report) if report.position > position => {}
            Some(report) if report.position == position => {
                if !report.expected.contains(&expected) {
                    report.expected.push(expected);
                }
            }
            _ => {
                self.failure = Some(FailureReport {
                    position,
                    expected: vec![expected],
                });
            }
        }
    }
}

/// Result of a successful matcher invocation, handed to the parent.
pub(crate) struct Matched<V> {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) node: Option<ParseNode<V>>,
    pub(crate) value: Option<V>,
}

/// The context of one matcher invocation.
pub struct MatcherContext<'c, 'a, V> {
    state: &'c mut ParseState<'a, V>,
    matcher: MatcherId,
    start: usize,
    pub(crate) cursor: usize,
    enforced: bool,
    pub(crate) speculative: bool,
    children: Vec<ParseNode<V>>,
    value: Option<V>,
    last_match: Option<Captured<V>>,
}

impl<'c, 'a, V: Clone> MatcherContext<'c, 'a, V> {
    /// The context of a whole parse starting at `matcher`.
    pub(crate) fn root(state: &'c mut ParseState<'a, V>, matcher: MatcherId) -> Self {
        let enforced = state.config.record_diagnostics;
        Self {
            state,
            matcher,
            start: 0,
            cursor: 0,
            enforced,
            speculative: false,
            children: Vec::new(),
            value: None,
            last_match: None,
        }
    }

    /// A child context for `matcher`, starting at this context's cursor.
    pub(crate) fn sub_context(&mut self, matcher: MatcherId) -> MatcherContext<'_, 'a, V> {
        MatcherContext {
            state: &mut *self.state,
            matcher,
            start: self.cursor,
            cursor: self.cursor,
            enforced: self.enforced,
            speculative: self.speculative,
            children: Vec::new(),
            value: None,
            last_match: None,
        }
    }

    /// Evaluate this context's matcher and report whether it matched.
    ///
    /// The cursor is left after the match on success and at its start on
    /// failure.
    ///
    /// # Errors
    ///
    /// Propagates any [`ParseError`] raised during evaluation.
    pub(crate) fn run_matcher(&mut self) -> Result<bool, ParseError> {
        let matched = engine::evaluate(self)?;
        if !matched {
            self.cursor = self.start;
        }
        Ok(matched)
    }

    /// Run this context's matcher to completion, consuming the context.
    ///
    /// # Errors
    ///
    /// [`ParseError::RecursionLimitExceeded`] when this invocation would nest
    /// deeper than `max_recursion_depth` matchers, plus anything raised by
    /// evaluation.
    pub(crate) fn run(mut self) -> Result<Option<Matched<V>>, ParseError> {
        let max_depth = self.state.config.max_recursion_depth;
        if self.state.depth >= max_depth {
            return Err(ParseError::RecursionLimitExceeded {
                position: self.start,
                max_depth,
            });
        }
        self.state.depth += 1;
        let result = self.run_nested();
        self.state.depth -= 1;
        result
    }

    fn run_nested(&mut self) -> Result<Option<Matched<V>>, ParseError> {
        let grammar = self.state.grammar;
        let id = self.matcher;
        let matcher = grammar.node(id);
        self.state.metrics.matchers_run += 1;

        let matched = if matcher.scoped {
            if !self.enter_rule()? {
                return Ok(None);
            }
            let result = self.run_matcher();
            self.state.invocations.pop();
            self.state.frames.pop();
            result?
        } else {
            self.run_matcher()?
        };

        if !matched {
            if self.enforced
                && matches!(
                    matcher.kind,
                    MatcherKind::Terminal(_) | MatcherKind::Test(_) | MatcherKind::TestNot(_)
                )
            {
                let expected = grammar.expected(id);
                self.state.record_failure(self.start, expected);
            }
            return Ok(None);
        }

        let value = self
            .value
            .take()
            .or_else(|| self.last_match.take().and_then(|m| m.value));
        let node = if self.state.config.build_tree
            && matcher.kind.builds_nodes()
            && !matcher.suppress_node
        {
            self.state.metrics.nodes_created += 1;
            Some(ParseNode {
                label: grammar.label(id),
                matcher: id,
                start: self.start,
                end: self.cursor,
                value: value.clone(),
                children: std::mem::take(&mut self.children),
            })
        } else {
            None
        };
        Ok(Some(Matched {
            start: self.start,
            end: self.cursor,
            node,
            value,
        }))
    }

    /// Push a rule invocation. Returns `false` for left recursion, which
    /// fails the invocation without evaluating it.
    fn enter_rule(&mut self) -> Result<bool, ParseError> {
        let (id, at) = (self.matcher, self.start);
        if self.state.invocations.contains(&(id, at)) {
            let message = format!(
                "left recursion in rule `{}`, alternative abandoned",
                self.state.grammar.label(id)
            );
            log_debug!("{message} at position {at}");
            if !self.state.warnings.iter().any(|w| w.position == at && w.message == message) {
                self.state.warnings.push(ParseWarning {
                    position: at,
                    message,
                });
            }
            return Ok(false);
        }
        self.check_interrupt()?;
        self.state.invocations.push((id, at));
        self.state.frames.push(Frame::new());
        Ok(true)
    }

    /// Run `child` against this context, committing its match on success.
    ///
    /// Actions run directly against this context. Any other matcher gets a
    /// sub-context; on success its node is appended, the cursor advances and
    /// [`last_match`](Self::last_match) is updated. On failure the action
    /// variables bound by the child are dropped.
    pub(crate) fn run_child(&mut self, child: MatcherId) -> Result<bool, ParseError> {
        let grammar = self.state.grammar;
        let kind = &grammar.node(child).kind;
        if let MatcherKind::Action(action) = kind {
            return engine::run_action(self, action);
        }
        let mark = self.state.var_mark();
        let Some(matched) = self.sub_context(child).run()? else {
            self.state.truncate_vars(mark);
            return Ok(false);
        };
        self.cursor = matched.end;
        if let Some(node) = matched.node {
            self.children.push(node);
        }
        if kind.builds_nodes() {
            self.last_match = Some(Captured {
                start: matched.start,
                end: matched.end,
                value: matched.value,
            });
        }
        Ok(true)
    }
}

impl<'a, V> MatcherContext<'_, 'a, V> {
    /// The grammar being parsed with.
    #[must_use]
    pub fn grammar(&self) -> &'a Grammar<V> {
        self.state.grammar
    }

    /// The matcher this context evaluates.
    #[must_use]
    pub const fn matcher(&self) -> MatcherId {
        self.matcher
    }

    /// The whole input.
    #[must_use]
    pub fn input(&self) -> &'a [char] {
        self.state.input
    }

    /// Current position, in chars.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Where this context's matcher started.
    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// Move the cursor, typically back to an earlier position.
    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor.min(self.state.input.len());
    }

    /// Stop recording failures for this context and everything below it.
    pub const fn clear_enforcement(&mut self) {
        self.enforced = false;
    }

    /// Whether failures are being recorded.
    #[must_use]
    pub const fn is_enforced(&self) -> bool {
        self.enforced
    }

    /// Whether this context evaluates inside a `test` or `test_not`.
    #[must_use]
    pub const fn is_speculative(&self) -> bool {
        self.speculative
    }

    pub(crate) const fn mark_speculative(&mut self) {
        self.speculative = true;
    }

    /// Text matched by this context so far.
    #[must_use]
    pub fn match_text(&self) -> String {
        slice_text(self.state.input, self.start, self.cursor)
    }

    /// The most recent successful child match.
    #[must_use]
    pub const fn last_match(&self) -> Option<&Captured<V>> {
        self.last_match.as_ref()
    }

    /// Text of the most recent successful child match, empty if none.
    #[must_use]
    pub fn last_text(&self) -> String {
        self.last_match
            .as_ref()
            .map_or_else(String::new, |m| m.text(self.state.input))
    }

    /// Value of the most recent successful child match.
    #[must_use]
    pub fn last_value(&self) -> Option<&V> {
        self.last_match.as_ref().and_then(|m| m.value.as_ref())
    }

    /// Text of a captured match.
    #[must_use]
    pub fn text_of(&self, captured: &Captured<V>) -> String {
        captured.text(self.state.input)
    }

    /// Set the value this context's matcher produces.
    pub fn set_value(&mut self, value: V) {
        self.value = Some(value);
    }

    /// The value set so far.
    #[must_use]
    pub const fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Remove and return the value set so far.
    pub fn take_value(&mut self) -> Option<V> {
        self.value.take()
    }

    /// Bind a captured match under `name` in the current rule invocation.
    pub fn bind(&mut self, name: &str, captured: Captured<V>) {
        self.state
            .frame_mut()
            .vars
            .push((name.into(), Binding::Captured(captured)));
    }

    /// Store a typed local under `name` in the current rule invocation.
    pub fn set_local<T: 'static>(&mut self, name: &str, value: T) {
        self.state
            .frame_mut()
            .vars
            .push((name.into(), Binding::Local(Box::new(value))));
    }

    /// Check the configured timeout and cancellation token.
    ///
    /// # Errors
    ///
    /// [`ParseError::Cancelled`] or [`ParseError::TimeoutExceeded`].
    pub fn check_interrupt(&self) -> Result<(), ParseError> {
        let config = self.state.config;
        if config.cancellation.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(ParseError::Cancelled {
                position: self.cursor,
            });
        }
        if let Some(limit) = config.timeout {
            let elapsed = self.state.started.elapsed();
            if elapsed > limit {
                return Err(ParseError::TimeoutExceeded { elapsed, limit });
            }
        }
        Ok(())
    }

    pub(crate) fn var_mark(&self) -> usize {
        self.state.var_mark()
    }

    pub(crate) fn truncate_vars(&mut self, mark: usize) {
        self.state.truncate_vars(mark);
    }

    pub(crate) fn count_action(&mut self) {
        self.state.metrics.actions_run += 1;
    }

    /// Label of the innermost active rule, or of this matcher outside rules.
    pub(crate) fn rule_label(&self) -> String {
        let id = self
            .state
            .invocations
            .last()
            .map_or(self.matcher, |&(rule, _)| rule);
        self.state.grammar.label(id).to_string()
    }
}

impl<V: Clone> MatcherContext<'_, '_, V> {
    /// The match bound under `name` in the current rule invocation.
    ///
    /// # Errors
    ///
    /// Fails when nothing, or a typed local, is bound under `name`.
    pub fn capture(&self, name: &str) -> Result<Captured<V>, ActionFault> {
        match self.state.frame().find(name) {
            Some(Binding::Captured(captured)) => Ok(captured.clone()),
            Some(Binding::Local(_)) => Err(ActionFault::new(format!(
                "`{name}` is a local, not a captured match"
            ))),
            None => Err(ActionFault::new(format!("no match captured as `{name}`"))),
        }
    }

    /// The typed local stored under `name` in the current rule invocation.
    ///
    /// # Errors
    ///
    /// Fails when nothing is stored under `name` or it has another type.
    pub fn local<T: Clone + 'static>(&self, name: &str) -> Result<T, ActionFault> {
        match self.state.frame().find(name) {
            Some(Binding::Local(value)) => value.downcast_ref::<T>().cloned().ok_or_else(|| {
                ActionFault::new(format!(
                    "local `{name}` is not a `{}`",
                    std::any::type_name::<T>()
                ))
            }),
            Some(Binding::Captured(_)) => Err(ActionFault::new(format!(
                "`{name}` is a captured match, not a local"
            ))),
            None => Err(ActionFault::new(format!("no local `{name}` in scope"))),
        }
    }
}

impl<V> std::fmt::Debug for MatcherContext<'_, '_, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatcherContext")
            .field("matcher", &self.matcher)
            .field("start", &self.start)
            .field("cursor", &self.cursor)
            .field("enforced", &self.enforced)
            .field("speculative", &self.speculative)
            .finish_non_exhaustive()
    }
}
