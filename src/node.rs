use crate::color::{Color, ColorMask, MAX_COLORS};

/// Per-color element counts over a subtree, indexed by color bit
/// position.
pub(crate) type Counts = [usize; MAX_COLORS];

/// Sortedness of a run, consulted by sorted insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sortedness {
    /// Run takes part in sort-order comparisons.
    Sorted,
    /// Run was added out of band and is skipped by comparisons.
    Unsorted,
    /// Run is awaiting relocation, skipped like `Unsorted`.
    Pending,
}

/// Node holds a single run of `size` adjacent elements sharing the
/// same color and value. Nodes live in the tree's arena, links are
/// arena indices.
#[derive(Clone)]
pub(crate) struct Node<V> {
    pub(crate) size: usize,
    pub(crate) color: Color,
    pub(crate) value: Option<V>,
    pub(crate) sorted: Sortedness,
    pub(crate) height: u8,
    pub(crate) counts: Counts,
    pub(crate) left: Option<u32>,   // owning link
    pub(crate) right: Option<u32>,  // owning link
    pub(crate) parent: Option<u32>, // back link
    pub(crate) live: bool,
    pub(crate) generation: u32, // bumped every time the slot is freed.
}

impl<V> Node<V> {
    // CREATE operation, a leaf with its counts already in place.
    pub(crate) fn new(color: Color, size: usize, value: Option<V>, parent: Option<u32>) -> Node<V> {
        let mut counts: Counts = [0; MAX_COLORS];
        counts[color.index()] = size;
        Node {
            size,
            color,
            value,
            sorted: Sortedness::Sorted,
            height: 1,
            counts,
            left: None,
            right: None,
            parent,
            live: true,
            generation: 0,
        }
    }

    /// Number of elements in this subtree whose color is in `mask`.
    #[inline]
    pub(crate) fn size_for(&self, mask: ColorMask) -> usize {
        mask.indices().map(|i| self.counts[i]).sum()
    }

    /// Number of elements this node's own run adds to `mask`'s view.
    #[inline]
    pub(crate) fn run_contribution(&self, mask: ColorMask) -> usize {
        if mask.contains(self.color) {
            self.size
        } else {
            0
        }
    }

    /// Recompute every count from the children's counts and this
    /// node's own run.
    pub(crate) fn refresh_counts(&mut self, left: Option<&Counts>, right: Option<&Counts>) {
        let zero: Counts = [0; MAX_COLORS];
        let (left, right) = (left.unwrap_or(&zero), right.unwrap_or(&zero));
        for i in 0..MAX_COLORS {
            self.counts[i] = left[i] + right[i];
        }
        self.counts[self.color.index()] += self.size;
    }

    /// Move this node's run to `color`, only this node's counts are
    /// adjusted. Caller must propagate the move up to the root.
    pub(crate) fn set_color(&mut self, color: Color) {
        self.counts[self.color.index()] -= self.size;
        self.counts[color.index()] += self.size;
        self.color = color;
    }
}
