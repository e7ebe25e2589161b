//! Parse-tree nodes and the match records actions read.

use crate::matcher::MatcherId;
use compact_str::CompactString;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A node of the parse tree.
///
/// Every successful matcher builds one unless it is node-suppressed; tests,
/// negated tests and actions never do. `start..end` are char offsets.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ParseNode<V> {
    pub label: CompactString,
    pub matcher: MatcherId,
    pub start: usize,
    pub end: usize,
    pub value: Option<V>,
    pub children: Vec<ParseNode<V>>,
}

impl<V> ParseNode<V> {
    /// The matched text.
    #[must_use]
    pub fn text(&self, input: &[char]) -> String {
        slice_text(input, self.start, self.end)
    }

    /// Whether the node matched no input.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// First direct child with the given label.
    #[must_use]
    pub fn child(&self, label: &str) -> Option<&Self> {
        self.children.iter().find(|child| child.label == label)
    }

    /// Depth-first search for the first node with the given label, this node
    /// included.
    #[must_use]
    pub fn find(&self, label: &str) -> Option<&Self> {
        if self.label == label {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(label))
    }

    /// Number of nodes in this subtree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }
}

/// What a sub-rule match left behind for later actions: its text range and
/// the value its actions produced.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Captured<V> {
    pub start: usize,
    pub end: usize,
    pub value: Option<V>,
}

impl<V> Captured<V> {
    /// The matched text.
    #[must_use]
    pub fn text(&self, input: &[char]) -> String {
        slice_text(input, self.start, self.end)
    }

    /// Number of chars matched.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the match consumed nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

pub(crate) fn slice_text(input: &[char], start: usize, end: usize) -> String {
    let end = end.min(input.len());
    input.get(start..end).map_or_else(String::new, |chars| chars.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(label: &str, start: usize, end: usize) -> ParseNode<()> {
        ParseNode {
            label: label.into(),
            matcher: MatcherId(0),
            start,
            end,
            value: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn find_searches_depth_first() {
        let mut root = leaf("Expr", 0, 3);
        let mut term = leaf("Term", 0, 1);
        term.children.push(leaf("Number", 0, 1));
        root.children.push(term);
        root.children.push(leaf("Number", 2, 3));
        assert_eq!(root.find("Number").map(|n| n.start), Some(0));
        assert_eq!(root.child("Number").map(|n| n.start), Some(2));
        assert_eq!(root.node_count(), 4);
    }

    #[test]
    fn text_is_clamped_to_input() {
        let input: Vec<char> = "abc".chars().collect();
        let captured = Captured::<()> {
            start: 1,
            end: 9,
            value: None,
        };
        assert_eq!(captured.text(&input), "bc");
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn trees_are_serializable() {
        fn assert_serde<T: Serialize + for<'de> Deserialize<'de>>() {}
        assert_serde::<ParseNode<i64>>();
        assert_serde::<Captured<String>>();
        assert_serde::<MatcherId>();
    }
}
