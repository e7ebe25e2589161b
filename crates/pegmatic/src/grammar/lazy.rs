use super::{Grammar, GrammarBuilder, RuleResult};
use crate::error::ConstructionError;
use crate::parser::{ParseConfig, Parser};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// A grammar built on first use and shared afterwards.
///
/// Suited for `static` items. Threads that race on first use block until the
/// single construction finishes; recursive rules inside the factory go
/// through the builder and never touch the cell.
///
/// ```rust
/// use pegmatic::grammar::{GrammarBuilder, LazyGrammar, RuleKey, RuleResult};
///
/// fn word(g: &mut GrammarBuilder<()>) -> RuleResult {
///     g.rule(RuleKey::new("Word"), |g| {
///         let letter = g.char_range('a', 'z')?;
///         g.one_or_more(letter)
///     })
/// }
///
/// static WORD: LazyGrammar<()> = LazyGrammar::new(word);
///
/// let grammar = WORD.get().expect("valid grammar");
/// assert_eq!(grammar.rule_count(), 1);
/// ```
pub struct LazyGrammar<V> {
    factory: fn(&mut GrammarBuilder<V>) -> RuleResult,
    cell: OnceCell<Result<Arc<Grammar<V>>, ConstructionError>>,
}

impl<V> LazyGrammar<V> {
    #[must_use]
    pub const fn new(factory: fn(&mut GrammarBuilder<V>) -> RuleResult) -> Self {
        Self {
            factory,
            cell: OnceCell::new(),
        }
    }

    /// The grammar, building it on the first call.
    ///
    /// # Errors
    ///
    /// The [`ConstructionError`] of the first build, returned to every caller.
    pub fn get(&self) -> Result<Arc<Grammar<V>>, ConstructionError> {
        self.cell
            .get_or_init(|| GrammarBuilder::build(self.factory).map(Arc::new))
            .clone()
    }

    /// Whether the grammar has been built (or failed to build).
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<V: Clone> LazyGrammar<V> {
    /// A parser over the shared grammar.
    ///
    /// # Errors
    ///
    /// See [`LazyGrammar::get`].
    pub fn parser(&self, config: ParseConfig) -> Result<Parser<V>, ConstructionError> {
        Ok(Parser::new(self.get()?, config))
    }
}

impl<V> std::fmt::Debug for LazyGrammar<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyGrammar")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
