//! # Pegmatic
//!
//! A parsing-expression-grammar engine whose grammars are built by ordinary
//! Rust functions and whose semantic actions run during parsing.
//!
//! ## Overview
//!
//! - **Matchers**: a grammar is an immutable arena of [`Matcher`] nodes
//!   (sequence, ordered choice, repetition, lookahead, action, terminal)
//!   evaluated by a backtracking interpreter.
//! - **Rule factories**: functions that build matchers through a
//!   [`GrammarBuilder`]. Calls are cached per factory and arguments, so a
//!   rule referenced many times, or recursively, is built once.
//! - **Inline actions**: a rule body interleaves sub-rule matches with action
//!   code. [`RuleBody`], or the `#[rule]` attribute macro, splits it into a
//!   sequence whose action nodes run exactly where they were written, and only
//!   when the parse really gets there (never inside lookahead).
//! - **FIRST sets**: [`Grammar::starter_chars`] reports which chars can
//!   start each matcher, for prediction and diagnostics.
//!
//! ## Quick Start
//!
//! ```rust
//! use pegmatic::grammar::{GrammarBuilder, RuleKey, RuleResult};
//! use pegmatic::{ActionFault, RuleBody};
//!
//! // Number = [0-9]+, valued as the integer it spells
//! fn number(g: &mut GrammarBuilder<i64>) -> RuleResult {
//!     g.rule(RuleKey::new("Number"), |g| {
//!         let digit = g.char_range('0', '9')?;
//!         let digits = g.one_or_more(digit)?;
//!         RuleBody::of(g)
//!             .then(digits)
//!             .action(|ctx| {
//!                 let n = ctx.match_text().parse::<i64>().map_err(|e| ActionFault::from_error(&e))?;
//!                 ctx.set_value(n);
//!                 Ok(true)
//!             })
//!             .build(g)
//!     })
//! }
//!
//! // Pair = Number ',' Number, valued as the sum of both
//! fn pair(g: &mut GrammarBuilder<i64>) -> RuleResult {
//!     g.rule(RuleKey::new("Pair"), |g| {
//!         let lhs = number(g)?;
//!         let comma = g.ch(',')?;
//!         let rhs = number(g)?;
//!         RuleBody::of(g)
//!             .bind("lhs", lhs)
//!             .then(comma)
//!             .bind("rhs", rhs)
//!             .action(|ctx| {
//!                 let lhs = ctx.capture("lhs")?.value.unwrap_or(0);
//!                 let rhs = ctx.capture("rhs")?.value.unwrap_or(0);
//!                 ctx.set_value(lhs + rhs);
//!                 Ok(true)
//!             })
//!             .build(g)
//!     })
//! }
//!
//! let grammar = GrammarBuilder::build(pair).expect("valid grammar");
//! let outcome = pegmatic::parse(&grammar, "20,22").expect("no action faults");
//! assert!(outcome.matched);
//! assert_eq!(outcome.value, Some(42));
//! ```
//!
//! ## Feature Flags
//!
//! - `derive` (default): the `#[rule]` attribute macro.
//! - `logging` (default): debug and trace output through the `log` facade.
//! - `diagnostics`: `miette` integration for errors.
//! - `serialize`: serde support for configuration, reports and parse trees.

/// Logging macros - no-ops when logging feature is disabled
#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

/// Logging macros - use log crate when logging feature is enabled
#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_trace {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
macro_rules! log_trace {
    ($($arg:tt)*) => { log::trace!($($arg)*) };
}

pub mod action;
pub mod chars;
pub mod context;
pub mod error;
pub mod grammar;
pub mod matcher;
pub mod parser;
pub mod tree;

pub use action::{RuleBody, Step};
pub use chars::Chars;
pub use context::MatcherContext;
pub use error::{ActionFault, ConstructionError, ParseError};
pub use grammar::{Grammar, GrammarBuilder, KeyArg, LazyGrammar, RuleKey, RuleResult};
pub use matcher::{Matcher, MatcherId, MatcherKind, Terminal};
pub use parser::{
    CancellationToken, FailureReport, ParseConfig, ParseMetrics, ParseOutcome, ParseWarning,
    Parser, parse,
};
pub use tree::{Captured, ParseNode};

#[cfg(feature = "derive")]
pub use pegmatic_derive::rule;
