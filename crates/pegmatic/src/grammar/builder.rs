use super::analysis::{check_repetitions, nullable};
use super::cache::{CacheEntry, RuleCache, RuleKey};
use super::Grammar;
use crate::chars::Chars;
use crate::context::MatcherContext;
use crate::error::{ActionFault, ConstructionError};
use crate::matcher::{Action, Children, Matcher, MatcherId, MatcherKind, Terminal};
use compact_str::CompactString;
use hashbrown::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Result of every grammar-construction call.
pub type RuleResult = Result<MatcherId, ConstructionError>;

/// One arena slot during construction.
enum Slot<V> {
    Node(Matcher<V>),
    /// Handed to a recursive caller while the rule's factory is still running.
    Placeholder { rule: CompactString },
    /// A placeholder patched to the matcher its factory finally built.
    Forward(MatcherId),
}

/// Builder for [`Grammar`]s.
///
/// Primitive constructors allocate one matcher each. Rule factories go through
/// [`GrammarBuilder::rule`], which caches their result per [`RuleKey`] so that
/// repeated and recursive references share a single matcher.
///
/// # Example
///
/// ```rust
/// use pegmatic::grammar::{GrammarBuilder, RuleKey, RuleResult};
///
/// // Parens = '(' Parens? ')'
/// fn parens(g: &mut GrammarBuilder<()>) -> RuleResult {
///     g.rule(RuleKey::new("Parens"), |g| {
///         let open = g.ch('(')?;
///         let inner = parens(g)?;
///         let inner = g.optional(inner)?;
///         let close = g.ch(')')?;
///         g.sequence([open, inner, close])
///     })
/// }
///
/// let grammar = GrammarBuilder::build(parens).expect("valid grammar");
/// assert!(pegmatic::parse(&grammar, "(())").unwrap().matched);
/// ```
pub struct GrammarBuilder<V> {
    slots: Vec<Slot<V>>,
    cache: RuleCache,
}

impl<V> Default for GrammarBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> GrammarBuilder<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            cache: RuleCache::default(),
        }
    }

    /// Run `root` against a fresh builder and freeze the result.
    ///
    /// # Errors
    ///
    /// Any [`ConstructionError`] raised by a factory, or by validation of the
    /// finished arena.
    pub fn build<F>(root: F) -> Result<Grammar<V>, ConstructionError>
    where
        F: FnOnce(&mut Self) -> RuleResult,
    {
        let mut builder = Self::new();
        let root = root(&mut builder)?;
        builder.finish(root)
    }

    /// Number of arena slots allocated so far, placeholders included.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of rule-factory invocations cached so far.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.cache.len()
    }

    // Rule cache

    /// Build the matcher for `key` with `factory`, once.
    ///
    /// A resolved key returns its cached matcher. A key whose factory is
    /// still running (a recursive reference) returns a placeholder that is
    /// patched to forward to the finished matcher. Otherwise the factory runs,
    /// its matcher is labeled with the key (unless already labeled) and marked
    /// as a rule.
    ///
    /// # Errors
    ///
    /// A factory error is propagated and the key is forgotten, so a later call
    /// runs the factory again. A factory that returns its own placeholder is
    /// rejected with [`ConstructionError::UnresolvedPlaceholder`].
    pub fn rule<F>(&mut self, key: RuleKey, factory: F) -> RuleResult
    where
        F: FnOnce(&mut Self) -> RuleResult,
    {
        match self.cache.get(&key) {
            Some(CacheEntry::Resolved(id)) => return Ok(id),
            Some(CacheEntry::Building {
                placeholder: Some(id),
            }) => return Ok(id),
            Some(CacheEntry::Building { placeholder: None }) => {
                let id = self.push_slot(Slot::Placeholder { rule: key.label() });
                log_trace!("rule `{key}` is recursive, handing out placeholder {id}");
                self.cache.set_placeholder(&key, id);
                return Ok(id);
            }
            None => {}
        }

        self.cache.begin(key.clone());
        let built = factory(self);
        let entry = self.cache.take(&key);
        let built = self.resolve(built?);

        let placeholder = match entry {
            Some(CacheEntry::Building { placeholder }) => placeholder,
            _ => None,
        };
        if placeholder == Some(built) {
            return Err(ConstructionError::UnresolvedPlaceholder {
                rule: key.to_string(),
            });
        }
        // A matcher that already belongs to another rule stays that rule's.
        let target = if self.is_rule(built) {
            self.push(MatcherKind::Sequence(std::iter::once(built).collect()))
        } else {
            built
        };
        if let Some(placeholder) = placeholder {
            self.slots[placeholder.index()] = Slot::Forward(target);
        }
        if let Slot::Node(matcher) = &mut self.slots[target.index()] {
            if matcher.label.is_none() {
                matcher.label = Some(key.label());
            }
            matcher.scoped = true;
        }
        log_trace!("rule `{key}` resolved to {target}");
        self.cache.resolve(key, target);
        Ok(target)
    }

    /// Whether `id` is the matcher of a rule, finished or still being built.
    #[must_use]
    pub fn is_rule(&self, id: MatcherId) -> bool {
        match &self.slots[self.resolve(id).index()] {
            Slot::Node(matcher) => matcher.scoped,
            Slot::Placeholder { .. } | Slot::Forward(_) => true,
        }
    }

    /// Whether a successful match of `id` leaves a match record that can be
    /// captured. Tests, negated tests and actions leave none.
    #[must_use]
    pub fn is_capturable(&self, id: MatcherId) -> bool {
        match &self.slots[self.resolve(id).index()] {
            Slot::Node(matcher) => matcher.kind.builds_nodes(),
            Slot::Placeholder { .. } | Slot::Forward(_) => true,
        }
    }

    /// Diagnostic name of a matcher under construction.
    pub(crate) fn describe(&self, id: MatcherId) -> String {
        match &self.slots[self.resolve(id).index()] {
            Slot::Node(matcher) => matcher
                .label
                .as_ref()
                .map_or_else(|| matcher.fallback_label().to_string(), ToString::to_string),
            Slot::Placeholder { rule } => rule.to_string(),
            Slot::Forward(target) => target.to_string(),
        }
    }

    // Terminals

    /// A single char.
    pub fn ch(&mut self, c: char) -> RuleResult {
        Ok(self.terminal(Terminal::Char(c)))
    }

    /// An inclusive char range.
    pub fn char_range(&mut self, low: char, high: char) -> RuleResult {
        Ok(self.terminal(Terminal::Range(low, high)))
    }

    /// Any char of `set`.
    pub fn any_of(&mut self, set: impl IntoIterator<Item = char>) -> RuleResult {
        Ok(self.terminal(Terminal::AnyOf(set.into_iter().collect::<Chars>())))
    }

    /// Any char except those in `set`.
    pub fn none_of(&mut self, set: impl IntoIterator<Item = char>) -> RuleResult {
        let set = set.into_iter().collect::<Chars>().complement().without_empty();
        Ok(self.terminal(Terminal::AnyOf(set)))
    }

    /// An exact string.
    pub fn string(&mut self, text: &str) -> RuleResult {
        Ok(self.terminal(Terminal::Literal(text.into())))
    }

    /// Any single char.
    pub fn any(&mut self) -> RuleResult {
        Ok(self.terminal(Terminal::Any))
    }

    /// End of input.
    pub fn eoi(&mut self) -> RuleResult {
        Ok(self.terminal(Terminal::Eoi))
    }

    /// Always succeeds without consuming.
    pub fn empty(&mut self) -> RuleResult {
        Ok(self.terminal(Terminal::Empty))
    }

    // Composites

    /// All of `children`, in order.
    pub fn sequence(&mut self, children: impl IntoIterator<Item = MatcherId>) -> RuleResult {
        let children: Children = children.into_iter().collect();
        if children.is_empty() {
            return Err(ConstructionError::EmptyComposite { kind: "Sequence" });
        }
        Ok(self.push(MatcherKind::Sequence(children)))
    }

    /// The first of `children` that matches.
    pub fn first_of(&mut self, children: impl IntoIterator<Item = MatcherId>) -> RuleResult {
        let children: Children = children.into_iter().collect();
        if children.is_empty() {
            return Err(ConstructionError::EmptyComposite { kind: "FirstOf" });
        }
        Ok(self.push(MatcherKind::Choice(children)))
    }

    /// `child` as often as it matches, possibly never.
    pub fn zero_or_more(&mut self, child: MatcherId) -> RuleResult {
        Ok(self.push(MatcherKind::ZeroOrMore(child)))
    }

    /// `child` at least once.
    pub fn one_or_more(&mut self, child: MatcherId) -> RuleResult {
        Ok(self.push(MatcherKind::OneOrMore(child)))
    }

    /// `child` or nothing.
    pub fn optional(&mut self, child: MatcherId) -> RuleResult {
        Ok(self.push(MatcherKind::Optional(child)))
    }

    /// Succeeds where `child` would match, consuming nothing.
    pub fn test(&mut self, child: MatcherId) -> RuleResult {
        Ok(self.push(MatcherKind::Test(child)))
    }

    /// Succeeds where `child` would not match, consuming nothing.
    pub fn test_not(&mut self, child: MatcherId) -> RuleResult {
        Ok(self.push(MatcherKind::TestNot(child)))
    }

    // Actions

    /// An action run when the parser reaches it in a live match. Inside a
    /// predicate it is skipped and succeeds.
    pub fn action<F>(&mut self, run: F) -> RuleResult
    where
        F: Fn(&mut MatcherContext<'_, '_, V>) -> Result<bool, ActionFault> + Send + Sync + 'static,
    {
        Ok(self.push(MatcherKind::Action(Action {
            run: Arc::new(run),
            run_in_predicates: false,
        })))
    }

    /// A semantic predicate: an action that also runs inside `test` and
    /// `test_not`. It must not have side effects beyond the context.
    pub fn predicate_action<F>(&mut self, run: F) -> RuleResult
    where
        F: Fn(&mut MatcherContext<'_, '_, V>) -> Result<bool, ActionFault> + Send + Sync + 'static,
    {
        Ok(self.push(MatcherKind::Action(Action {
            run: Arc::new(run),
            run_in_predicates: true,
        })))
    }

    // Attributes

    /// Set the diagnostic label of a matcher.
    ///
    /// # Errors
    ///
    /// Fails for a placeholder whose rule is still under construction, and
    /// for the matcher of a finished rule ([`ConstructionError::SealedRule`]).
    pub fn label(&mut self, id: MatcherId, label: &str) -> RuleResult {
        let matcher = self.unsealed_mut(id)?;
        matcher.label = Some(label.into());
        Ok(id)
    }

    /// Stop a matcher from building parse-tree nodes.
    ///
    /// # Errors
    ///
    /// Tests and negated tests never build nodes, so asking them to stop is a
    /// usage error ([`ConstructionError::InvalidSuppression`]). A finished
    /// rule cannot be changed ([`ConstructionError::SealedRule`]).
    pub fn without_node(&mut self, id: MatcherId) -> RuleResult {
        let matcher = self.unsealed_mut(id)?;
        if let MatcherKind::Test(_) | MatcherKind::TestNot(_) = matcher.kind {
            let label = matcher
                .label
                .as_ref()
                .map_or_else(|| matcher.kind.name().to_string(), ToString::to_string);
            return Err(ConstructionError::InvalidSuppression { label });
        }
        matcher.suppress_node = true;
        Ok(id)
    }

    /// Freeze the arena reachable from `root` into a [`Grammar`].
    ///
    /// Forward references are linked to their targets, unreachable slots are
    /// dropped and handles are renumbered, with the root becoming handle 0.
    ///
    /// # Errors
    ///
    /// [`ConstructionError::UnresolvedPlaceholder`] when a reachable reference
    /// never got its matcher, [`ConstructionError::ZeroWidthRepetition`] when
    /// a repetition body can match empty.
    pub fn finish(self, root: MatcherId) -> Result<Grammar<V>, ConstructionError> {
        let targets: Vec<Result<MatcherId, CompactString>> = (0..self.slots.len())
            .map(|i| self.link(MatcherId::from_index(i)))
            .collect();
        let target = |id: MatcherId| -> Result<MatcherId, ConstructionError> {
            targets[id.index()]
                .clone()
                .map_err(|rule| ConstructionError::UnresolvedPlaceholder {
                    rule: rule.to_string(),
                })
        };

        // Breadth-first renumbering of everything reachable from the root.
        let mut renumbered: Vec<Option<MatcherId>> = vec![None; self.slots.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        let root = target(root)?;
        renumbered[root.index()] = Some(MatcherId::from_index(0));
        order.push(root);
        queue.push_back(root);
        while let Some(id) = queue.pop_front() {
            let Slot::Node(matcher) = &self.slots[id.index()] else {
                continue;
            };
            for child in matcher.kind.children() {
                let child = target(*child)?;
                if renumbered[child.index()].is_none() {
                    renumbered[child.index()] = Some(MatcherId::from_index(order.len()));
                    order.push(child);
                    queue.push_back(child);
                }
            }
        }

        let renumber = |id: MatcherId| -> MatcherId {
            targets[id.index()]
                .as_ref()
                .ok()
                .and_then(|t| renumbered[t.index()])
                .unwrap_or(id)
        };

        let mut rules = HashMap::with_hasher(ahash::RandomState::new());
        for (key, id) in self.cache.resolved() {
            if let Ok(t) = &targets[id.index()]
                && let Some(new_id) = renumbered[t.index()]
            {
                rules.insert(key.clone(), new_id);
            }
        }

        let mut slots: Vec<Option<Slot<V>>> = self.slots.into_iter().map(Some).collect();
        let mut nodes = Vec::with_capacity(order.len());
        for old in order {
            if let Some(Slot::Node(mut matcher)) = slots[old.index()].take() {
                for child in matcher.kind.children_mut() {
                    *child = renumber(*child);
                }
                nodes.push(matcher);
            }
        }

        let nullable = nullable(&nodes);
        check_repetitions(&nodes, &nullable, |i| {
            nodes[i]
                .label
                .as_ref()
                .map_or_else(|| nodes[i].kind.name().to_string(), ToString::to_string)
        })?;

        log_debug!(
            "built grammar: {} matchers, {} rules",
            nodes.len(),
            rules.len()
        );
        Ok(Grammar::from_parts(nodes, MatcherId::from_index(0), rules, nullable))
    }

    fn terminal(&mut self, terminal: Terminal) -> MatcherId {
        self.push(MatcherKind::Terminal(terminal))
    }

    fn push(&mut self, kind: MatcherKind<V>) -> MatcherId {
        self.push_slot(Slot::Node(Matcher::new(kind)))
    }

    fn push_slot(&mut self, slot: Slot<V>) -> MatcherId {
        let id = MatcherId::from_index(self.slots.len());
        self.slots.push(slot);
        id
    }

    /// Follow forwards until reaching a node or a pending placeholder.
    fn resolve(&self, mut id: MatcherId) -> MatcherId {
        for _ in 0..=self.slots.len() {
            match &self.slots[id.index()] {
                Slot::Forward(next) => id = *next,
                Slot::Node(_) | Slot::Placeholder { .. } => return id,
            }
        }
        id
    }

    /// Like `resolve`, but a pending placeholder is an error naming its rule.
    fn link(&self, id: MatcherId) -> Result<MatcherId, CompactString> {
        let id = self.resolve(id);
        match &self.slots[id.index()] {
            Slot::Node(_) => Ok(id),
            Slot::Placeholder { rule } => Err(rule.clone()),
            Slot::Forward(_) => Err(CompactString::const_new("<cyclic forward>")),
        }
    }

    /// A matcher whose attributes may still change.
    fn unsealed_mut(&mut self, id: MatcherId) -> Result<&mut Matcher<V>, ConstructionError> {
        let matcher = self.node_mut(id)?;
        if matcher.scoped {
            let rule = matcher
                .label
                .as_ref()
                .map_or_else(|| matcher.kind.name().to_string(), ToString::to_string);
            return Err(ConstructionError::SealedRule { rule });
        }
        Ok(matcher)
    }

    fn node_mut(&mut self, id: MatcherId) -> Result<&mut Matcher<V>, ConstructionError> {
        let id = self.link(id)
            .map_err(|rule| ConstructionError::UnresolvedPlaceholder {
                rule: rule.to_string(),
            })?;
        match &mut self.slots[id.index()] {
            Slot::Node(matcher) => Ok(matcher),
            Slot::Placeholder { rule } => Err(ConstructionError::UnresolvedPlaceholder {
                rule: rule.to_string(),
            }),
            Slot::Forward(_) => Err(ConstructionError::UnresolvedPlaceholder {
                rule: id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digits(g: &mut GrammarBuilder<()>) -> RuleResult {
        g.rule(RuleKey::new("Digits"), |g| {
            let digit = g.char_range('0', '9')?;
            g.one_or_more(digit)
        })
    }

    #[test]
    fn repeated_rule_calls_share_one_matcher() {
        let mut g = GrammarBuilder::new();
        let a = digits(&mut g).unwrap();
        let slots = g.slot_count();
        let b = digits(&mut g).unwrap();
        assert_eq!(a, b);
        assert_eq!(g.slot_count(), slots);
    }

    #[test]
    fn recursive_rule_gets_placeholder_then_forward() {
        fn nested(g: &mut GrammarBuilder<()>) -> RuleResult {
            g.rule(RuleKey::new("Nested"), |g| {
                let open = g.ch('[')?;
                let inner = nested(g)?;
                let inner = g.optional(inner)?;
                let close = g.ch(']')?;
                g.sequence([open, inner, close])
            })
        }
        let mut g = GrammarBuilder::new();
        let id = nested(&mut g).unwrap();
        assert!(matches!(g.slots[id.index()], Slot::Node(_)));
        let forwards = g
            .slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Forward(target) if *target == id))
            .count();
        assert_eq!(forwards, 1);
    }

    #[test]
    fn factory_returning_itself_is_rejected() {
        fn selfish(g: &mut GrammarBuilder<()>) -> RuleResult {
            g.rule(RuleKey::new("Selfish"), selfish)
        }
        let err = GrammarBuilder::build(selfish).unwrap_err();
        assert_eq!(
            err,
            ConstructionError::UnresolvedPlaceholder {
                rule: "Selfish".into()
            }
        );
    }

    #[test]
    fn failed_factory_is_forgotten() {
        let mut g = GrammarBuilder::<()>::new();
        let key = RuleKey::new("Flaky");
        let err = g
            .rule(key.clone(), |_| Err(ConstructionError::factory("Flaky", "not yet")))
            .unwrap_err();
        assert!(matches!(err, ConstructionError::Factory { .. }));
        assert_eq!(g.rule_count(), 0);
        assert!(g.rule(key, |g| g.ch('x')).is_ok());
    }

    #[test]
    fn suppressing_a_test_is_a_usage_error() {
        let mut g = GrammarBuilder::<()>::new();
        let a = g.ch('a').unwrap();
        let test = g.test_not(a).unwrap();
        assert!(matches!(
            g.without_node(test),
            Err(ConstructionError::InvalidSuppression { .. })
        ));
        assert!(g.without_node(a).is_ok());
    }

    #[test]
    fn empty_sequence_is_rejected() {
        let mut g = GrammarBuilder::<()>::new();
        assert_eq!(
            g.sequence([]),
            Err(ConstructionError::EmptyComposite { kind: "Sequence" })
        );
    }

    #[test]
    fn finish_drops_unreachable_matchers() {
        let mut g = GrammarBuilder::<()>::new();
        let _unused = g.string("dead").unwrap();
        let root = digits(&mut g).unwrap();
        let grammar = g.finish(root).unwrap();
        assert_eq!(grammar.len(), 2);
        assert_eq!(grammar.root(), MatcherId::from_index(0));
        assert_eq!(grammar.rule_named("Digits"), Some(grammar.root()));
    }
}
