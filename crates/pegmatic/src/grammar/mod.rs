//! # Grammars
//!
//! A [`Grammar`] is the frozen matcher arena produced by
//! [`GrammarBuilder::build`]. It never changes after construction, so it can
//! be shared between threads and parsers, and derived data (FIRST sets) is
//! computed once on demand.
//!
//! ```rust
//! use pegmatic::grammar::GrammarBuilder;
//!
//! let grammar = GrammarBuilder::<()>::build(|g| {
//!     let digit = g.char_range('0', '9')?;
//!     g.one_or_more(digit)
//! })
//! .expect("valid grammar");
//!
//! let outcome = pegmatic::parse(&grammar, "123abc").expect("no action faults");
//! assert!(outcome.matched);
//! assert_eq!(outcome.cursor, 3);
//! ```

mod analysis;
mod builder;
mod cache;
mod first;
mod lazy;

pub use builder::{GrammarBuilder, RuleResult};
pub use cache::{KeyArg, RuleKey};
pub use lazy::LazyGrammar;

pub(crate) use analysis::nullable;

use crate::chars::Chars;
use crate::matcher::{Matcher, MatcherId, MatcherKind};
use compact_str::{CompactString, format_compact};
use first::FirstSets;
use hashbrown::HashMap;
use once_cell::sync::OnceCell;

/// A built, immutable grammar.
pub struct Grammar<V> {
    nodes: Vec<Matcher<V>>,
    root: MatcherId,
    rules: HashMap<RuleKey, MatcherId, ahash::RandomState>,
    first_sets: OnceCell<FirstSets>,
    nullable: OnceCell<Vec<bool>>,
}

impl<V> Grammar<V> {
    pub(crate) fn from_parts(
        nodes: Vec<Matcher<V>>,
        root: MatcherId,
        rules: HashMap<RuleKey, MatcherId, ahash::RandomState>,
        nullable: Vec<bool>,
    ) -> Self {
        Self {
            nodes,
            root,
            rules,
            first_sets: OnceCell::new(),
            nullable: OnceCell::with_value(nullable),
        }
    }

    /// The entry matcher.
    #[must_use]
    pub const fn root(&self) -> MatcherId {
        self.root
    }

    /// Number of matchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds no matchers. Never true for a built grammar.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a matcher.
    #[must_use]
    pub fn get(&self, id: MatcherId) -> Option<&Matcher<V>> {
        self.nodes.get(id.index())
    }

    /// All matcher handles.
    pub fn ids(&self) -> impl Iterator<Item = MatcherId> + '_ {
        (0..self.nodes.len()).map(MatcherId::from_index)
    }

    pub(crate) fn node(&self, id: MatcherId) -> &Matcher<V> {
        &self.nodes[id.index()]
    }

    /// The matcher built for a rule-factory invocation.
    #[must_use]
    pub fn rule(&self, key: &RuleKey) -> Option<MatcherId> {
        self.rules.get(key).copied()
    }

    /// The matcher built for an argument-less rule factory.
    #[must_use]
    pub fn rule_named(&self, factory: &'static str) -> Option<MatcherId> {
        self.rule(&RuleKey::new(factory))
    }

    /// Number of distinct rule-factory invocations in the grammar.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// The diagnostic label of a matcher.
    ///
    /// Rules are labeled with their factory name. Tests and negated tests
    /// default to `&(sub)` and `!(sub)`; other unlabeled matchers use their
    /// variant name or terminal text.
    #[must_use]
    pub fn label(&self, id: MatcherId) -> CompactString {
        let matcher = self.node(id);
        if let Some(label) = &matcher.label {
            return label.clone();
        }
        match &matcher.kind {
            MatcherKind::Test(sub) => format_compact!("&({})", self.label(*sub)),
            MatcherKind::TestNot(sub) => format_compact!("!({})", self.label(*sub)),
            _ => matcher.fallback_label(),
        }
    }

    /// What a failure of this matcher says was expected.
    #[must_use]
    pub fn expected(&self, id: MatcherId) -> String {
        let matcher = self.node(id);
        if let Some(label) = &matcher.label {
            return label.to_string();
        }
        match &matcher.kind {
            MatcherKind::Test(sub) => self.expected(*sub),
            MatcherKind::TestNot(sub) => format!("not {}", self.expected(*sub)),
            _ => matcher.fallback_label().into(),
        }
    }

    /// The chars a successful match of `id` can start with; the empty marker
    /// is present when it can succeed without consuming.
    ///
    /// Computed once per grammar and cached. Used for prediction and
    /// diagnostics only; evaluation never consults it.
    #[must_use]
    pub fn starter_chars(&self, id: MatcherId) -> &Chars {
        self.first_sets
            .get_or_init(|| FirstSets::compute(self))
            .get(id)
    }

    /// Whether `c` can start a match of `id`.
    #[must_use]
    pub fn can_start_with(&self, id: MatcherId, c: char) -> bool {
        self.starter_chars(id).contains(c)
    }

    /// Whether `id` can succeed without consuming input.
    #[must_use]
    pub fn is_nullable(&self, id: MatcherId) -> bool {
        self.nullable.get_or_init(|| nullable(&self.nodes))[id.index()]
    }
}

impl<V> std::fmt::Debug for Grammar<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grammar")
            .field("root", &self.root)
            .field("matchers", &self.nodes.len())
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}
