//! # Parser
//!
//! [`Parser`] runs a shared [`Grammar`] against input text. A parse is
//! single-threaded and depth-first; its outcome says whether the root matcher
//! matched, how far it got, and (when it did not get far enough) where the
//! furthest failure happened and what was expected there.
//!
//! ```rust
//! use pegmatic::grammar::GrammarBuilder;
//! use pegmatic::{ParseConfig, Parser};
//! use std::sync::Arc;
//!
//! let grammar = GrammarBuilder::<()>::build(|g| {
//!     let digit = g.char_range('0', '9')?;
//!     let not_digit = g.test_not(digit)?;
//!     let letter = g.char_range('a', 'z')?;
//!     g.sequence([not_digit, letter])
//! })
//! .expect("valid grammar");
//!
//! let parser = Parser::new(Arc::new(grammar), ParseConfig::default());
//! let outcome = parser.parse("5").expect("no action faults");
//! assert!(!outcome.matched);
//! let failure = outcome.failure.expect("failure recorded");
//! assert_eq!(failure.position, 0);
//! assert_eq!(failure.expected, vec!["not '0'..'9'".to_string()]);
//! ```

mod config;
pub(crate) mod engine;

pub use config::{CancellationToken, ParseConfig};

use crate::context::{MatcherContext, ParseState};
use crate::error::{ParseError, format_expected_list};
use crate::grammar::Grammar;
use crate::matcher::MatcherId;
use crate::tree::ParseNode;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// The furthest position at which an enforced matcher failed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct FailureReport {
    /// Char offset of the failure.
    pub position: usize,
    /// Expected strings of every matcher that failed there, in first-seen order.
    pub expected: Vec<String>,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {} at position {}",
            format_expected_list(&self.expected),
            self.position
        )
    }
}

/// Non-fatal parse observation
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ParseWarning {
    pub position: usize,
    pub message: String,
}

/// Statistics collected during parsing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ParseMetrics {
    /// Wall-clock time of the parse.
    pub parse_time: Duration,
    /// Matcher invocations, actions excluded.
    pub matchers_run: usize,
    /// Action closures actually executed.
    pub actions_run: usize,
    /// Parse-tree nodes built.
    pub nodes_created: usize,
}

/// Everything a finished parse produced.
#[derive(Debug, Clone)]
pub struct ParseOutcome<V> {
    /// Whether the root matcher matched.
    pub matched: bool,
    /// End of the match, or 0 when nothing matched. Trailing input is not an
    /// error; add an end-of-input matcher to the grammar to demand it.
    pub cursor: usize,
    /// Root of the parse tree, when one was built.
    pub tree: Option<ParseNode<V>>,
    /// Value produced by the root matcher.
    pub value: Option<V>,
    /// Furthest failure, when diagnostics are recorded and something failed.
    pub failure: Option<FailureReport>,
    pub warnings: Vec<ParseWarning>,
    pub metrics: ParseMetrics,
}

impl<V> ParseOutcome<V> {
    /// Whether the root matched and consumed `input_len` chars.
    #[must_use]
    pub const fn is_complete(&self, input_len: usize) -> bool {
        self.matched && self.cursor == input_len
    }
}

/// A grammar plus the configuration to parse with.
#[derive(Debug, Clone)]
pub struct Parser<V> {
    grammar: Arc<Grammar<V>>,
    config: ParseConfig,
}

impl<V: Clone> Parser<V> {
    #[must_use]
    pub const fn new(grammar: Arc<Grammar<V>>, config: ParseConfig) -> Self {
        Self { grammar, config }
    }

    #[must_use]
    pub fn grammar(&self) -> &Grammar<V> {
        &self.grammar
    }

    #[must_use]
    pub const fn config(&self) -> &ParseConfig {
        &self.config
    }

    /// Parse `input` from the grammar's root.
    ///
    /// # Errors
    ///
    /// A [`ParseError`] when an action faults or a configured limit trips.
    /// An ordinary mismatch is not an error; see [`ParseOutcome::matched`].
    pub fn parse(&self, input: &str) -> Result<ParseOutcome<V>, ParseError> {
        let chars: Vec<char> = input.chars().collect();
        self.parse_chars(&chars)
    }

    /// Parse already-decoded input from the grammar's root.
    ///
    /// # Errors
    ///
    /// See [`Parser::parse`].
    pub fn parse_chars(&self, input: &[char]) -> Result<ParseOutcome<V>, ParseError> {
        self.parse_from(self.grammar.root(), input)
    }

    /// Parse `input` starting at any matcher of the grammar, such as a rule
    /// found through [`Grammar::rule`].
    ///
    /// # Errors
    ///
    /// See [`Parser::parse`].
    pub fn parse_from(
        &self,
        start: MatcherId,
        input: &[char],
    ) -> Result<ParseOutcome<V>, ParseError> {
        execute(&self.grammar, &self.config, start, input)
    }
}

/// Parse `input` with `grammar` and the default configuration.
///
/// # Errors
///
/// See [`Parser::parse`].
pub fn parse<V: Clone>(grammar: &Grammar<V>, input: &str) -> Result<ParseOutcome<V>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    execute(grammar, &ParseConfig::default(), grammar.root(), &chars)
}

fn execute<V: Clone>(
    grammar: &Grammar<V>,
    config: &ParseConfig,
    start: MatcherId,
    input: &[char],
) -> Result<ParseOutcome<V>, ParseError> {
    log_debug!("parsing {} chars from `{}`", input.len(), grammar.label(start));
    let mut state = ParseState::new(grammar, input, config);
    let matched = MatcherContext::root(&mut state, start).run()?;
    let (failure, warnings, metrics) = state.finish();
    log_debug!(
        "parse finished: matched={} matchers={} actions={} in {:?}",
        matched.is_some(),
        metrics.matchers_run,
        metrics.actions_run,
        metrics.parse_time
    );
    let (matched, cursor, tree, value) = match matched {
        Some(m) => (true, m.end, m.node, m.value),
        None => (false, 0, None, None),
    };
    Ok(ParseOutcome {
        matched,
        cursor,
        tree,
        value,
        failure,
        warnings,
        metrics,
    })
}
