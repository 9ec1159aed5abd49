//! Run-length AVL tree with per-color order statistics.
//!
//! A [`Tree`] holds a sequence of elements, each tagged with one
//! [`Color`] from a [`Palette`]. Adjacent elements sharing color and
//! value are stored as a single run. Every index is expressed relative
//! to a [`ColorMask`], the view of the sequence that keeps only the
//! masked colors, and can be translated between views in O(log n).

mod color;
mod depth;
mod error;
mod iter;
mod node;
mod tree;

pub use crate::color::{Color, ColorMask, Palette, MAX_COLORS};
pub use crate::depth::Depth;
pub use crate::error::Error;
pub use crate::iter::{Cursor, Run, Runs, Values};
pub use crate::node::Sortedness;
pub use crate::tree::{Comparator, Element, Stats, Tree};

#[cfg(test)]
mod iter_test;
