//! Rule-factory memoization.
//!
//! Every call of a rule factory is keyed by the factory's name and its
//! argument tuple. The first call builds the matcher; every later call, and
//! every recursive call made while the first one is still running, gets a
//! handle instead of building again. Recursive calls receive a placeholder
//! slot that is patched to forward to the finished matcher.

use crate::matcher::MatcherId;
use compact_str::{CompactString, ToCompactString};
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::fmt;

/// One argument of a rule-factory call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyArg {
    Bool(bool),
    Char(char),
    Int(i64),
    UInt(u64),
    Str(CompactString),
}

impl fmt::Display for KeyArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Char(c) => write!(f, "{c:?}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::UInt(u) => write!(f, "{u}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

macro_rules! key_arg_from {
    ($($ty:ty => $variant:ident as $conv:ty),* $(,)?) => {
        $(
            impl From<$ty> for KeyArg {
                fn from(value: $ty) -> Self {
                    Self::$variant(<$conv>::from(value))
                }
            }
        )*
    };
}

key_arg_from! {
    bool => Bool as bool,
    char => Char as char,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
}

impl From<usize> for KeyArg {
    fn from(value: usize) -> Self {
        Self::UInt(value as u64)
    }
}

impl From<&str> for KeyArg {
    fn from(value: &str) -> Self {
        Self::Str(value.to_compact_string())
    }
}

impl From<String> for KeyArg {
    fn from(value: String) -> Self {
        Self::Str(value.into())
    }
}

impl From<CompactString> for KeyArg {
    fn from(value: CompactString) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for KeyArg {
    fn from(value: &String) -> Self {
        Self::Str(value.to_compact_string())
    }
}

/// Identity of one rule-factory invocation: factory name plus arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    factory: &'static str,
    args: SmallVec<[KeyArg; 2]>,
}

impl RuleKey {
    /// Key of a factory taking no arguments.
    #[must_use]
    pub fn new(factory: &'static str) -> Self {
        Self {
            factory,
            args: SmallVec::new(),
        }
    }

    /// Key of a factory called with `args`.
    #[must_use]
    pub fn with_args<I>(factory: &'static str, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<KeyArg>,
    {
        Self {
            factory,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<KeyArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The factory name.
    #[must_use]
    pub const fn factory(&self) -> &'static str {
        self.factory
    }

    /// The argument tuple.
    #[must_use]
    pub fn args(&self) -> &[KeyArg] {
        &self.args
    }

    /// Label given to the rule's matcher: the factory name, followed by the
    /// arguments when there are any.
    #[must_use]
    pub fn label(&self) -> CompactString {
        self.to_compact_string()
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.factory)?;
        if self.args.is_empty() {
            return Ok(());
        }
        f.write_str("(")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheEntry {
    /// The factory is running. Holds the placeholder handed to recursive
    /// callers, allocated on the first such call.
    Building { placeholder: Option<MatcherId> },
    Resolved(MatcherId),
}

/// Per-builder memo table of rule-factory results.
#[derive(Debug, Default)]
pub(crate) struct RuleCache {
    entries: HashMap<RuleKey, CacheEntry, ahash::RandomState>,
}

impl RuleCache {
    pub(crate) fn get(&self, key: &RuleKey) -> Option<CacheEntry> {
        self.entries.get(key).copied()
    }

    pub(crate) fn begin(&mut self, key: RuleKey) {
        self.entries
            .insert(key, CacheEntry::Building { placeholder: None });
    }

    pub(crate) fn set_placeholder(&mut self, key: &RuleKey, placeholder: MatcherId) {
        if let Some(entry) = self.entries.get_mut(key) {
            *entry = CacheEntry::Building {
                placeholder: Some(placeholder),
            };
        }
    }

    /// Drop an entry, returning what it held.
    pub(crate) fn take(&mut self, key: &RuleKey) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    pub(crate) fn resolve(&mut self, key: RuleKey, id: MatcherId) {
        self.entries.insert(key, CacheEntry::Resolved(id));
    }

    /// All resolved rules.
    pub(crate) fn resolved(&self) -> impl Iterator<Item = (&RuleKey, MatcherId)> + '_ {
        self.entries.iter().filter_map(|(key, entry)| match entry {
            CacheEntry::Resolved(id) => Some((key, *id)),
            CacheEntry::Building { .. } => None,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
