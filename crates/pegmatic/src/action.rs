//! # Rule Bodies
//!
//! A rule body is the linear form of a rule: sub-rule matches and inline
//! action code, in source order. [`RuleBody`] turns that list into one
//! sequence matcher in which every action step becomes an action node placed
//! exactly where it was written, so it runs after the matches before it and
//! before the matches after it.
//!
//! Values flow between steps through the rule invocation's variable frame:
//! [`RuleBody::bind`] records what a sub-rule matched under a name, and later
//! actions read it back with [`MatcherContext::capture`]. The `#[rule]`
//! attribute macro generates exactly these calls from a plain function body.
//!
//! ```rust
//! use pegmatic::grammar::{GrammarBuilder, RuleKey, RuleResult};
//! use pegmatic::{ActionFault, RuleBody};
//!
//! fn number(g: &mut GrammarBuilder<i64>) -> RuleResult {
//!     g.rule(RuleKey::new("Number"), |g| {
//!         let digit = g.char_range('0', '9')?;
//!         let digits = g.one_or_more(digit)?;
//!         RuleBody::of(g)
//!             .bind("digits", digits)
//!             .action(|ctx| {
//!                 let digits = ctx.capture("digits")?;
//!                 let n = ctx
//!                     .text_of(&digits)
//!                     .parse::<i64>()
//!                     .map_err(|e| ActionFault::from_error(&e))?;
//!                 ctx.set_value(n);
//!                 Ok(true)
//!             })
//!             .build(g)
//!     })
//! }
//!
//! let grammar = GrammarBuilder::build(number).expect("valid grammar");
//! assert_eq!(pegmatic::parse(&grammar, "1234").unwrap().value, Some(1234));
//! ```

use crate::context::MatcherContext;
use crate::error::{ActionFault, ConstructionError};
use crate::grammar::{GrammarBuilder, RuleResult};
use crate::matcher::MatcherId;
use compact_str::CompactString;
use std::fmt;

/// One step of a rule body.
pub enum Step<V> {
    /// Match a sub-rule.
    Match(MatcherId),
    /// Bind the preceding match under a name. Runs inside predicates too, so
    /// later semantic predicates can read it.
    Bind(CompactString),
    /// Run deferred action code.
    Action(Box<dyn Fn(&mut MatcherContext<'_, '_, V>) -> Result<bool, ActionFault> + Send + Sync>),
}

impl<V> fmt::Debug for Step<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match(id) => f.debug_tuple("Match").field(id).finish(),
            Self::Bind(name) => f.debug_tuple("Bind").field(name).finish(),
            Self::Action(_) => f.write_str("Action(..)"),
        }
    }
}

/// Builder for the sequence of match and action steps of one rule.
pub struct RuleBody<V> {
    steps: Vec<Step<V>>,
}

impl<V> Default for RuleBody<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RuleBody<V> {
    #[must_use]
    pub const fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// An empty body whose value type is taken from `g`, so action closures
    /// added before [`build`](Self::build) already know it.
    #[must_use]
    pub const fn of(_g: &GrammarBuilder<V>) -> Self {
        Self::new()
    }
}

impl<V: Clone + 'static> RuleBody<V> {
    /// Match `id` next.
    #[must_use]
    pub fn then(mut self, id: MatcherId) -> Self {
        self.steps.push(Step::Match(id));
        self
    }

    /// Match `id` next and bind what it matched under `name`.
    #[must_use]
    pub fn bind(mut self, name: &str, id: MatcherId) -> Self {
        self.steps.push(Step::Match(id));
        self.steps.push(Step::Bind(name.into()));
        self
    }

    /// Run `action` once every step before it has matched.
    #[must_use]
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut MatcherContext<'_, '_, V>) -> Result<bool, ActionFault> + Send + Sync + 'static,
    {
        self.steps.push(Step::Action(Box::new(action)));
        self
    }

    /// The recorded steps, in order.
    #[must_use]
    pub fn steps(&self) -> &[Step<V>] {
        &self.steps
    }

    /// Build the sequence matcher.
    ///
    /// A body whose only step matches a freshly built matcher returns that
    /// matcher itself. A lone step that matches another rule gets a sequence
    /// of its own, so the enclosing rule never shares that rule's node.
    ///
    /// # Errors
    ///
    /// [`ConstructionError::EmptyComposite`] for a body without steps, and
    /// [`ConstructionError::InvalidCapture`] for a bind of a matcher that
    /// leaves no match record (a test, negated test or action).
    pub fn build(self, g: &mut GrammarBuilder<V>) -> RuleResult {
        if let [Step::Match(id)] = self.steps.as_slice()
            && !g.is_rule(*id)
        {
            return Ok(*id);
        }
        if self.steps.is_empty() {
            return Err(ConstructionError::EmptyComposite { kind: "Sequence" });
        }
        let mut children = Vec::with_capacity(self.steps.len());
        let mut last_match = None;
        for step in self.steps {
            let id = match step {
                Step::Match(id) => {
                    last_match = Some(id);
                    id
                }
                Step::Bind(name) => {
                    if let Some(target) = last_match
                        && !g.is_capturable(target)
                    {
                        return Err(ConstructionError::InvalidCapture {
                            name: name.to_string(),
                            label: g.describe(target),
                        });
                    }
                    g.predicate_action(move |ctx| {
                        if let Some(captured) = ctx.last_match().cloned() {
                            ctx.bind(&name, captured);
                        }
                        Ok(true)
                    })?
                }
                Step::Action(action) => g.action(action)?,
            };
            children.push(id);
        }
        g.sequence(children)
    }
}

impl<V> fmt::Debug for RuleBody<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.steps).finish()
    }
}

/// Fail the current match unless `cond` holds. For use inside action code.
///
/// ```rust
/// # use pegmatic::{ActionFault, MatcherContext};
/// fn short_word(ctx: &mut MatcherContext<'_, '_, ()>) -> Result<bool, ActionFault> {
///     pegmatic::require!(ctx.last_text().len() <= 8);
///     Ok(true)
/// }
/// ```
#[macro_export]
macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return ::core::result::Result::Ok(false);
        }
    };
}
