use thiserror::Error;

/// Error enumerates over all possible errors that this package
/// shall return.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Index does not address an element, or a position, in the
    /// requested color view.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    /// Range `index..index+size` runs past the end of the color view.
    #[error("range {index}+{size} out of bounds for length {len}")]
    RangeOutOfBounds { index: usize, size: usize, len: usize },
    /// Palette must label between 1 and 7 colors.
    #[error("palette must name 1 to 7 colors, got {0}")]
    InvalidPalette(usize),
    /// Same label appears twice in a palette.
    #[error("duplicate color label {0:?}")]
    DuplicateLabel(String),
    /// Color, or color mask, is not part of the tree's palette.
    #[error("color bits {0:#04x} outside the palette")]
    InvalidColor(u8),
    /// Sorted operations on a tree constructed without comparator.
    #[error("tree has no comparator")]
    NoComparator,
    /// Element handle refers to a node that is no longer in the tree.
    #[error("element {0} is not linked into the tree")]
    StaleElement(u32),

    /// Fatal case, node height is not one more than its tallest child.
    #[error("node {node} height {height}, expected {expected}")]
    HeightMismatch { node: u32, height: u8, expected: u8 },
    /// Fatal case, breaking the AVL balance rule.
    #[error("node {node} unbalanced, left {left} right {right}")]
    Unbalanced { node: u32, left: u8, right: u8 },
    /// Fatal case, aggregate count for a color is out of sync with
    /// the subtree.
    #[error("node {node} color #{color} count {count}, expected {expected}")]
    CountMismatch {
        node: u32,
        color: usize,
        count: usize,
        expected: usize,
    },
    /// Fatal case, child does not point back to its parent.
    #[error("node {child} parent link does not point to {node}")]
    ParentMismatch { node: u32, child: u32 },
    /// Fatal case, zero sized run left linked into the tree.
    #[error("node {0} holds an empty run")]
    EmptyRun(u32),
    /// Fatal case, removal queue was not drained.
    #[error("{0} nodes pending removal")]
    PendingDrain(usize),
}
