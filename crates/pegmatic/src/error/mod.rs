//! # Error Types
//!
//! Three kinds of trouble exist, each fatal only to its own phase:
//!
//! - [`ConstructionError`]: a malformed grammar, reported by
//!   [`GrammarBuilder`](crate::grammar::GrammarBuilder) before any parsing.
//! - Match failure: not an error at all. Evaluation returns `Ok(false)`,
//!   backtracking absorbs it, and only the furthest failure is reported
//!   through [`FailureReport`](crate::parser::FailureReport).
//! - [`ParseError`]: an action closure raised an [`ActionFault`], or a
//!   configured limit tripped. The parse is aborted, never retried.
//!
//! ## Diagnostics Support
//!
//! When the `diagnostics` feature is enabled, errors integrate with [`miette`].

use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "diagnostics")]
use miette::Diagnostic;

/// A grammar that cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum ConstructionError {
    #[error("`{label}` rules cannot be marked as node-suppressing, they never create parse tree nodes")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(code(grammar::invalid_suppression))
    )]
    InvalidSuppression { label: String },

    #[error("rule `{rule}` is referenced before it was constructed and never resolved")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(
            code(grammar::unresolved_placeholder),
            help("a rule factory must build a matcher rather than return its own recursive reference")
        )
    )]
    UnresolvedPlaceholder { rule: String },

    #[error("repetition `{label}` wraps a sub-rule that can match without consuming input")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(
            code(grammar::zero_width_repetition),
            help("make the repeated rule consume at least one char on every success")
        )
    )]
    ZeroWidthRepetition { label: String },

    #[error("`{kind}` needs at least one sub-rule")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::empty_composite)))]
    EmptyComposite { kind: &'static str },

    #[error("rule `{rule}` is already built and shared; its label and node suppression cannot change")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(
            code(grammar::sealed_rule),
            help("wrap the rule in a sequence of its own and label that instead")
        )
    )]
    SealedRule { rule: String },

    #[error("cannot capture `{name}`: `{label}` never matches any input to capture")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::invalid_capture)))]
    InvalidCapture { name: String, label: String },

    #[error("rule `{rule}` failed to construct: {message}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::factory)))]
    Factory { rule: String, message: String },
}

impl ConstructionError {
    /// Create a factory error for rule code that refuses its arguments.
    #[must_use]
    pub fn factory(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Factory {
            rule: rule.into(),
            message: message.into(),
        }
    }
}

/// An error raised by an action closure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
#[error("{message}")]
pub struct ActionFault {
    message: String,
}

impl ActionFault {
    /// Create a fault with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Wrap any error raised inside an action.
    #[must_use]
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        Self::new(error.to_string())
    }

    /// The fault message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A fatal error that aborted a parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum ParseError {
    #[error("action in `{label}` failed at position {position}: {source}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(parser::action_fault)))]
    Action {
        label: String,
        position: usize,
        #[source]
        source: ActionFault,
    },

    #[error("matcher nesting exceeded the limit of {max_depth} at position {position}")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(
            code(parser::recursion_limit),
            help("raise ParseConfig::max_recursion_depth or flatten the grammar")
        )
    )]
    RecursionLimitExceeded { position: usize, max_depth: usize },

    #[error("parse timed out after {elapsed:?} (limit {limit:?})")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(parser::timeout)))]
    TimeoutExceeded { elapsed: Duration, limit: Duration },

    #[error("parse cancelled at position {position}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(parser::cancelled)))]
    Cancelled { position: usize },

    #[error("repetition `{label}` matched without consuming input at position {position}")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(code(parser::non_advancing_repetition))
    )]
    NonAdvancingRepetition { label: String, position: usize },
}

impl ParseError {
    /// Input position the error refers to, when it has one.
    #[must_use]
    pub const fn position(&self) -> Option<usize> {
        match self {
            Self::Action { position, .. }
            | Self::RecursionLimitExceeded { position, .. }
            | Self::Cancelled { position }
            | Self::NonAdvancingRepetition { position, .. } => Some(*position),
            Self::TimeoutExceeded { .. } => None,
        }
    }

    /// Whether the error came from user action code.
    #[must_use]
    pub const fn is_action_fault(&self) -> bool {
        matches!(self, Self::Action { .. })
    }
}

/// Format a list of expected items as a human-readable string
#[must_use]
pub fn format_expected_list(expected: &[String]) -> String {
    match expected {
        [] => "nothing".to_string(),
        [one] => one.clone(),
        [first, second] => format!("{first} or {second}"),
        [init @ .., last] => format!("{}, or {last}", init.join(", ")),
    }
}
