use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Configuration options for a [`Parser`](super::Parser).
///
/// # Example
///
/// ```rust
/// use pegmatic::ParseConfig;
/// use std::time::Duration;
///
/// // Use default configuration
/// let config = ParseConfig::default();
///
/// // Or customize it
/// let config = ParseConfig::default()
///     .with_build_tree(false)
///     .with_max_recursion_depth(128)
///     .with_timeout(Duration::from_millis(50));
/// assert!(!config.build_tree);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct ParseConfig {
    /// Collect a parse tree of every non-suppressed successful matcher.
    ///
    /// Actions and values work either way; turning this off only skips node
    /// allocation.
    pub build_tree: bool,

    /// Record the furthest failure position and what was expected there.
    pub record_diagnostics: bool,

    /// Maximum nesting of matcher invocations.
    ///
    /// Every matcher counts one level, not just rules: a rule body of a
    /// sequence around an optional costs three. The default of 256 stays well
    /// inside a 2 MiB thread stack.
    pub max_recursion_depth: usize,

    /// Wall-clock limit for one parse, checked on rule entry and before actions.
    pub timeout: Option<Duration>,

    /// Cooperative cancellation, checked on rule entry and before actions.
    #[cfg_attr(feature = "serialize", serde(skip))]
    pub cancellation: Option<CancellationToken>,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            build_tree: true,
            record_diagnostics: true,
            max_recursion_depth: 256,
            timeout: None,
            cancellation: None,
        }
    }
}

impl ParseConfig {
    #[must_use]
    pub const fn with_build_tree(mut self, build_tree: bool) -> Self {
        self.build_tree = build_tree;
        self
    }

    #[must_use]
    pub const fn with_record_diagnostics(mut self, record: bool) -> Self {
        self.record_diagnostics = record;
        self
    }

    #[must_use]
    pub const fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Shared flag that asks a running parse to stop.
///
/// Clones share the flag, so one clone can live in the parser configuration
/// while another is cancelled from a different thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
