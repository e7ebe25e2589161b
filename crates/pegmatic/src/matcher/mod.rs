//! # Matchers
//!
//! A grammar is an arena of [`Matcher`] nodes addressed by [`MatcherId`]
//! handles. Every node is one variant of the closed [`MatcherKind`] set and
//! holds only its own data: child handles, a closure, or a terminal symbol
//! set. Evaluation is a single dispatch over the variant (see
//! [`crate::parser`]).

use crate::chars::Chars;
use crate::context::MatcherContext;
use crate::error::ActionFault;
use compact_str::{CompactString, format_compact};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Stable handle of a matcher inside a grammar arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialize", serde(transparent))]
pub struct MatcherId(pub(crate) u32);

impl MatcherId {
    /// Position of the matcher in its arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }
}

impl fmt::Display for MatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Child handle list. Most composites have a handful of children.
pub type Children = SmallVec<[MatcherId; 4]>;

/// Signature of an action closure.
///
/// The closure runs against the context of the matcher that contains the
/// action (usually a rule's sequence). `Ok(false)` is an ordinary match
/// failure; `Err` aborts the parse.
pub type ActionFn<V> =
    Arc<dyn Fn(&mut MatcherContext<'_, '_, V>) -> Result<bool, ActionFault> + Send + Sync>;

/// An action node's closure plus its predicate policy.
pub struct Action<V> {
    pub(crate) run: ActionFn<V>,
    /// Run even while a predicate evaluates its sub-rule speculatively.
    pub(crate) run_in_predicates: bool,
}

impl<V> Action<V> {
    /// Whether the action also runs inside `test`/`test_not` evaluation.
    #[must_use]
    pub const fn runs_in_predicates(&self) -> bool {
        self.run_in_predicates
    }
}

impl<V> Clone for Action<V> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
            run_in_predicates: self.run_in_predicates,
        }
    }
}

impl<V> fmt::Debug for Action<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("run_in_predicates", &self.run_in_predicates)
            .finish_non_exhaustive()
    }
}

/// Terminal symbol sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// A single char.
    Char(char),
    /// An inclusive char range.
    Range(char, char),
    /// Any char of a set.
    AnyOf(Chars),
    /// An exact string.
    Literal(CompactString),
    /// Any single char.
    Any,
    /// End of input.
    Eoi,
    /// Matches nothing, always succeeds.
    Empty,
}

impl Terminal {
    /// Number of chars matched at the start of `input`, if any.
    #[must_use]
    pub fn match_len(&self, input: &[char]) -> Option<usize> {
        let first = input.first().copied();
        match self {
            Self::Char(c) => (first == Some(*c)).then_some(1),
            Self::Range(lo, hi) => first.filter(|c| lo <= c && c <= hi).map(|_| 1),
            Self::AnyOf(set) => first.filter(|c| set.contains(*c)).map(|_| 1),
            Self::Literal(text) => {
                let mut len = 0;
                for expected in text.chars() {
                    if input.get(len) != Some(&expected) {
                        return None;
                    }
                    len += 1;
                }
                Some(len)
            }
            Self::Any => first.map(|_| 1),
            Self::Eoi => input.is_empty().then_some(0),
            Self::Empty => Some(0),
        }
    }

    /// The chars this terminal can start with.
    #[must_use]
    pub fn starter_chars(&self) -> Chars {
        match self {
            Self::Char(c) => Chars::of(*c),
            Self::Range(lo, hi) => Chars::range(*lo, *hi),
            Self::AnyOf(set) => set.without_empty(),
            Self::Literal(text) => text.chars().next().map_or_else(Chars::empty, Chars::of),
            Self::Any => Chars::all_except_empty(),
            Self::Eoi | Self::Empty => Chars::empty(),
        }
    }

    /// Whether the terminal succeeds without consuming input.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Literal(text) => text.is_empty(),
            Self::Eoi | Self::Empty => true,
            Self::Char(_) | Self::Range(..) | Self::AnyOf(_) | Self::Any => false,
        }
    }

    fn default_label(&self) -> CompactString {
        match self {
            Self::Char(c) => format_compact!("{c:?}"),
            Self::Range(lo, hi) => format_compact!("{lo:?}..{hi:?}"),
            Self::AnyOf(set) => format_compact!("{set}"),
            Self::Literal(text) => format_compact!("{text:?}"),
            Self::Any => CompactString::const_new("ANY"),
            Self::Eoi => CompactString::const_new("EOI"),
            Self::Empty => CompactString::const_new("EMPTY"),
        }
    }
}

/// The closed set of matcher variants.
pub enum MatcherKind<V> {
    /// All children, in order.
    Sequence(Children),
    /// The first child that matches (PEG ordered choice).
    Choice(Children),
    /// The child as often as it matches.
    ZeroOrMore(MatcherId),
    /// The child at least once, then as often as it matches.
    OneOrMore(MatcherId),
    /// The child or nothing.
    Optional(MatcherId),
    /// Positive lookahead. Never consumes input or builds nodes.
    Test(MatcherId),
    /// Negative lookahead. Never consumes input or builds nodes.
    TestNot(MatcherId),
    /// A deferred action closure.
    Action(Action<V>),
    /// A terminal symbol set.
    Terminal(Terminal),
}

impl<V> MatcherKind<V> {
    /// Child handles in declared order.
    #[must_use]
    pub fn children(&self) -> &[MatcherId] {
        match self {
            Self::Sequence(children) | Self::Choice(children) => children,
            Self::ZeroOrMore(child)
            | Self::OneOrMore(child)
            | Self::Optional(child)
            | Self::Test(child)
            | Self::TestNot(child) => std::slice::from_ref(child),
            Self::Action(_) | Self::Terminal(_) => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> &mut [MatcherId] {
        match self {
            Self::Sequence(children) | Self::Choice(children) => children,
            Self::ZeroOrMore(child)
            | Self::OneOrMore(child)
            | Self::Optional(child)
            | Self::Test(child)
            | Self::TestNot(child) => std::slice::from_mut(child),
            Self::Action(_) | Self::Terminal(_) => &mut [],
        }
    }

    /// Variant name, also the default label of composites.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sequence(_) => "Sequence",
            Self::Choice(_) => "FirstOf",
            Self::ZeroOrMore(_) => "ZeroOrMore",
            Self::OneOrMore(_) => "OneOrMore",
            Self::Optional(_) => "Optional",
            Self::Test(_) => "Test",
            Self::TestNot(_) => "TestNot",
            Self::Action(_) => "Action",
            Self::Terminal(_) => "Terminal",
        }
    }

    /// Whether the variant can ever produce a parse-tree node.
    #[must_use]
    pub const fn builds_nodes(&self) -> bool {
        !matches!(self, Self::Test(_) | Self::TestNot(_) | Self::Action(_))
    }
}

impl<V> fmt::Debug for MatcherKind<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(action) => f.debug_tuple("Action").field(action).finish(),
            Self::Terminal(terminal) => f.debug_tuple("Terminal").field(terminal).finish(),
            _ => f.debug_tuple(self.name()).field(&self.children()).finish(),
        }
    }
}

/// A node of the grammar arena.
pub struct Matcher<V> {
    pub(crate) kind: MatcherKind<V>,
    pub(crate) label: Option<CompactString>,
    pub(crate) suppress_node: bool,
    /// Rule bodies own an action-variable frame and take part in recursion
    /// tracking.
    pub(crate) scoped: bool,
}

impl<V> Matcher<V> {
    pub(crate) const fn new(kind: MatcherKind<V>) -> Self {
        Self {
            kind,
            label: None,
            suppress_node: false,
            scoped: false,
        }
    }

    /// The variant.
    #[must_use]
    pub const fn kind(&self) -> &MatcherKind<V> {
        &self.kind
    }

    /// The explicit label, if one was set.
    #[must_use]
    pub fn explicit_label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Whether successful matches skip building a parse-tree node.
    #[must_use]
    pub const fn is_node_suppressed(&self) -> bool {
        self.suppress_node
    }

    /// Whether this matcher is a rule body produced by a cached factory.
    #[must_use]
    pub const fn is_rule(&self) -> bool {
        self.scoped
    }

    /// Label used when no explicit one exists and the variant does not
    /// derive it from a child.
    pub(crate) fn fallback_label(&self) -> CompactString {
        match &self.kind {
            MatcherKind::Terminal(terminal) => terminal.default_label(),
            kind => CompactString::const_new(kind.name()),
        }
    }
}

impl<V> fmt::Debug for Matcher<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("suppress_node", &self.suppress_node)
            .field("scoped", &self.scoped)
            .finish()
    }
}
