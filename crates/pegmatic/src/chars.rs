//! # Character Sets
//!
//! [`Chars`] is the symbol-set algebra shared by terminals and FIRST-set
//! computation. A set is a normalized list of inclusive char ranges plus a
//! flag for the *empty* marker (the pseudo-symbol saying "can match without
//! consuming anything"). A subtractive set stores what it excludes, which keeps
//! complements such as "anything but a digit" small.
//!
//! ```rust
//! use pegmatic::Chars;
//!
//! let digits = Chars::range('0', '9');
//! let not_digits = digits.complement();
//! assert!(not_digits.contains('a'));
//! assert!(!not_digits.contains('5'));
//! ```

use smallvec::SmallVec;
use std::fmt;

type Ranges = SmallVec<[(char, char); 4]>;

/// A set of chars with an optional empty marker.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Chars {
    /// Sorted, non-overlapping, non-adjacent inclusive ranges.
    ranges: Ranges,
    /// Whether the empty marker is listed.
    empty: bool,
    /// When set, `ranges` and `empty` list what the set excludes.
    subtractive: bool,
}

impl Chars {
    /// The set containing nothing.
    #[must_use]
    pub fn none() -> Self {
        Self {
            ranges: Ranges::new(),
            empty: false,
            subtractive: false,
        }
    }

    /// The set containing every char and the empty marker.
    #[must_use]
    pub fn all() -> Self {
        Self {
            ranges: Ranges::new(),
            empty: false,
            subtractive: true,
        }
    }

    /// Every char, but not the empty marker.
    #[must_use]
    pub fn all_except_empty() -> Self {
        Self {
            ranges: Ranges::new(),
            empty: true,
            subtractive: true,
        }
    }

    /// The set holding only the empty marker.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            ranges: Ranges::new(),
            empty: true,
            subtractive: false,
        }
    }

    /// A single char.
    #[must_use]
    pub fn of(c: char) -> Self {
        Self::range(c, c)
    }

    /// An inclusive char range. Reversed bounds produce the empty set.
    #[must_use]
    pub fn range(low: char, high: char) -> Self {
        let mut ranges = Ranges::new();
        if low <= high {
            ranges.push((low, high));
        }
        Self {
            ranges,
            empty: false,
            subtractive: false,
        }
    }

    /// Whether `c` is a member.
    #[must_use]
    pub fn contains(&self, c: char) -> bool {
        let listed = self.ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi);
        listed != self.subtractive
    }

    /// Whether the empty marker is a member.
    #[must_use]
    pub const fn contains_empty(&self) -> bool {
        self.empty != self.subtractive
    }

    /// Whether the set stores exclusions rather than members.
    #[must_use]
    pub const fn is_subtractive(&self) -> bool {
        self.subtractive
    }

    /// Whether no char and no empty marker is a member.
    #[must_use]
    pub fn is_none(&self) -> bool {
        !self.subtractive && !self.empty && self.ranges.is_empty()
    }

    /// The complement, including the empty marker.
    #[must_use]
    pub fn complement(&self) -> Self {
        Self {
            ranges: self.ranges.clone(),
            empty: self.empty,
            subtractive: !self.subtractive,
        }
    }

    /// The set with the empty marker added.
    #[must_use]
    pub fn with_empty(&self) -> Self {
        self.union(&Self::empty())
    }

    /// The set with the empty marker removed.
    #[must_use]
    pub fn without_empty(&self) -> Self {
        self.remove(&Self::empty())
    }

    /// Set union.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        match (self.subtractive, other.subtractive) {
            (false, false) => Self::additive(
                union_ranges(&self.ranges, &other.ranges),
                self.empty || other.empty,
            ),
            (false, true) => Self::excluding(
                difference_ranges(&other.ranges, &self.ranges),
                other.empty && !self.empty,
            ),
            (true, false) => other.union(self),
            (true, true) => Self::excluding(
                intersect_ranges(&self.ranges, &other.ranges),
                self.empty && other.empty,
            ),
        }
    }

    /// Set intersection.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        match (self.subtractive, other.subtractive) {
            (false, false) => Self::additive(
                intersect_ranges(&self.ranges, &other.ranges),
                self.empty && other.empty,
            ),
            (false, true) => Self::additive(
                difference_ranges(&self.ranges, &other.ranges),
                self.empty && !other.empty,
            ),
            (true, false) => other.intersect(self),
            (true, true) => Self::excluding(
                union_ranges(&self.ranges, &other.ranges),
                self.empty || other.empty,
            ),
        }
    }

    /// Everything in `self` that is not in `other`.
    #[must_use]
    pub fn remove(&self, other: &Self) -> Self {
        self.intersect(&other.complement())
    }

    /// Iterate the listed ranges (members, or exclusions for subtractive sets).
    pub fn ranges(&self) -> impl Iterator<Item = (char, char)> + '_ {
        self.ranges.iter().copied()
    }

    fn additive(ranges: Ranges, empty: bool) -> Self {
        Self {
            ranges,
            empty,
            subtractive: false,
        }
    }

    fn excluding(ranges: Ranges, empty: bool) -> Self {
        Self {
            ranges,
            empty,
            subtractive: true,
        }
    }
}

impl Default for Chars {
    fn default() -> Self {
        Self::none()
    }
}

impl FromIterator<char> for Chars {
    fn from_iter<I: IntoIterator<Item = char>>(iter: I) -> Self {
        let ranges: Ranges = iter.into_iter().map(|c| (c, c)).collect();
        Self::additive(normalize(ranges), false)
    }
}

impl fmt::Debug for Chars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Chars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subtractive {
            f.write_str("!")?;
        }
        f.write_str("[")?;
        for (i, (lo, hi)) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if lo == hi {
                write!(f, "{lo:?}")?;
            } else {
                write!(f, "{lo:?}..{hi:?}")?;
            }
        }
        if self.empty {
            if !self.ranges.is_empty() {
                f.write_str(",")?;
            }
            f.write_str("EMPTY")?;
        }
        f.write_str("]")
    }
}

/// The char after `c`, skipping the surrogate gap.
fn succ(c: char) -> Option<char> {
    match c {
        '\u{D7FF}' => Some('\u{E000}'),
        char::MAX => None,
        _ => char::from_u32(c as u32 + 1),
    }
}

/// The char before `c`, skipping the surrogate gap.
fn pred(c: char) -> Option<char> {
    match c {
        '\u{E000}' => Some('\u{D7FF}'),
        '\0' => None,
        _ => char::from_u32(c as u32 - 1),
    }
}

fn normalize(mut ranges: Ranges) -> Ranges {
    ranges.sort_unstable();
    let mut merged = Ranges::new();
    for (lo, hi) in ranges {
        if let Some(last) = merged.last_mut() {
            let touches = succ(last.1).is_none_or(|next| lo <= next);
            if touches {
                last.1 = last.1.max(hi);
                continue;
            }
        }
        merged.push((lo, hi));
    }
    merged
}

fn union_ranges(a: &Ranges, b: &Ranges) -> Ranges {
    normalize(a.iter().chain(b.iter()).copied().collect())
}

fn intersect_ranges(a: &Ranges, b: &Ranges) -> Ranges {
    let mut out = Ranges::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let lo = a[i].0.max(b[j].0);
        let hi = a[i].1.min(b[j].1);
        if lo <= hi {
            out.push((lo, hi));
        }
        if a[i].1 < b[j].1 {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

fn complement_ranges(a: &Ranges) -> Ranges {
    let mut out = Ranges::new();
    let mut next = Some('\0');
    for &(lo, hi) in a {
        if let Some(start) = next
            && start < lo
            && let Some(end) = pred(lo)
        {
            out.push((start, end));
        }
        next = succ(hi);
    }
    if let Some(start) = next {
        out.push((start, char::MAX));
    }
    out
}

fn difference_ranges(a: &Ranges, b: &Ranges) -> Ranges {
    intersect_ranges(a, &complement_ranges(b))
}
