use crate::color::{Color, ColorMask, MAX_COLORS};
use crate::error::Error;
use crate::node::{Counts, Sortedness};
use crate::tree::{Element, Tree};

/// Cursor walks a [`Tree`] element by element, or run by run, in the
/// view of any color mask. It keeps, for every color, the number of
/// elements before the current run, so that stepping costs O(1)
/// within a run and indices in any view are available without
/// descending the tree.
///
/// Cloning a cursor forks an independent position over the same tree.
#[derive(Clone)]
pub struct Cursor<'a, V>
where
    V: Clone + PartialEq,
{
    tree: &'a Tree<V>,
    node: Option<u32>, // None, positioned before the first element.
    offset: usize,     // offset within current run.
    counts: Counts,    // per color, elements before current run.
}

impl<'a, V> Cursor<'a, V>
where
    V: Clone + PartialEq,
{
    pub(crate) fn new(tree: &'a Tree<V>) -> Cursor<'a, V> {
        Cursor {
            tree,
            node: None,
            offset: 0,
            counts: [0; MAX_COLORS],
        }
    }

    pub(crate) fn starting_at(
        tree: &'a Tree<V>,
        next_index: usize,
        mask: ColorMask,
    ) -> Result<Cursor<'a, V>, Error> {
        let len = tree.size(mask);
        if next_index > len {
            return Err(Error::IndexOutOfBounds {
                index: next_index,
                len,
            });
        }
        if next_index == 0 {
            return Ok(Cursor::new(tree));
        }

        // position on the element just before `next_index`.
        let current = tree.get(next_index - 1, mask)?;
        let start = tree.index_of_node(current, mask)?;
        Ok(Cursor {
            tree,
            node: Some(current.0),
            offset: next_index - 1 - start,
            counts: tree.counts_before(current.0),
        })
    }

    /// Whether there is an element of `mask` after the current
    /// position.
    pub fn has_next(&self, mask: ColorMask) -> bool {
        let len = self.tree.size(mask);
        match self.node.map(|n| self.tree.node(n)) {
            None => len > 0,
            Some(nref) if mask.contains(nref.color) => {
                self.node_start_index(mask) + self.offset + 1 < len
            }
            Some(_) => self.node_start_index(mask) < len,
        }
    }

    /// Whether there is a run of `mask` after the current run.
    pub fn has_next_node(&self, mask: ColorMask) -> bool {
        match self.node {
            None => self.tree.size(mask) > 0,
            Some(_) => self.node_end_index(mask) < self.tree.size(mask),
        }
    }

    /// Step to the next element of `mask`, skipping over elements of
    /// other colors. Return the run holding it, `None` when there are
    /// no more elements of `mask`.
    pub fn next(&mut self, mask: ColorMask) -> Option<Element> {
        if !self.has_next(mask) {
            return None;
        }
        match self.node {
            None => {
                let first = self.tree.first_node()?;
                self.node = Some(first);
                self.offset = 0;
                if mask.contains(self.tree.node(first).color) {
                    return Some(self.tree.element(first));
                }
            }
            Some(node) => {
                let nref = self.tree.node(node);
                if mask.contains(nref.color) && self.offset + 1 < nref.size {
                    self.offset += 1;
                    return Some(self.tree.element(node));
                }
            }
        }
        self.scan(mask)
    }

    /// Step to the first element of the next run of `mask`.
    pub fn next_node(&mut self, mask: ColorMask) -> Option<Element> {
        if !self.has_next_node(mask) {
            return None;
        }
        if self.node.is_none() {
            let first = self.tree.first_node()?;
            self.node = Some(first);
            self.offset = 0;
            if mask.contains(self.tree.node(first).color) {
                return Some(self.tree.element(first));
            }
        }
        self.scan(mask)
    }

    // move past whole runs until one of `mask` is reached.
    fn scan(&mut self, mask: ColorMask) -> Option<Element> {
        while let Some(node) = self.node {
            let nref = self.tree.node(node);
            self.counts[nref.color.index()] += nref.size;
            self.node = self.tree.successor(node);
            self.offset = 0;
            match self.node {
                Some(next) if mask.contains(self.tree.node(next).color) => {
                    return Some(self.tree.element(next));
                }
                _ => (),
            }
        }
        panic!("scan(): ran past the last run, call the programmer")
    }

    /// Index of the current element in `mask`'s view. When the
    /// current run is not of `mask`, this is the index of the next
    /// element of `mask`.
    pub fn index(&self, mask: ColorMask) -> Option<usize> {
        let nref = self.tree.node(self.node?);
        let offset = if mask.contains(nref.color) {
            self.offset
        } else {
            0
        };
        Some(self.node_start_index(mask) + offset)
    }

    /// Index, in `mask`'s view, where the current run starts.
    pub fn node_start_index(&self, mask: ColorMask) -> usize {
        mask.indices().map(|i| self.counts[i]).sum()
    }

    /// Index, in `mask`'s view, just past the current run.
    pub fn node_end_index(&self, mask: ColorMask) -> usize {
        let run = self
            .node
            .map_or(0, |n| self.tree.node(n).run_contribution(mask));
        self.node_start_index(mask) + run
    }

    /// Run under the cursor.
    pub fn element(&self) -> Option<Element> {
        self.node.map(|n| self.tree.element(n))
    }

    /// Offset of the current element within its run.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn color(&self) -> Option<Color> {
        self.node.map(|n| self.tree.node(n).color)
    }

    pub fn value(&self) -> Option<&'a V> {
        let tree = self.tree;
        self.node.and_then(|n| tree.node(n).value.as_ref())
    }
}

/// A single run, as yielded by [`Runs`].
#[derive(Debug)]
pub struct Run<'a, V> {
    pub element: Element,
    pub color: Color,
    pub size: usize,
    pub value: Option<&'a V>,
    pub sorted: Sortedness,
}

/// Iterator over the runs of a [`Tree`], in order.
pub struct Runs<'a, V>
where
    V: Clone + PartialEq,
{
    tree: &'a Tree<V>,
    next: Option<u32>,
}

impl<'a, V> Runs<'a, V>
where
    V: Clone + PartialEq,
{
    pub(crate) fn new(tree: &'a Tree<V>, next: Option<u32>) -> Runs<'a, V> {
        Runs { tree, next }
    }
}

impl<'a, V> Iterator for Runs<'a, V>
where
    V: Clone + PartialEq,
{
    type Item = Run<'a, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        let node = self.next?;
        let nref = tree.node(node);
        self.next = tree.successor(node);
        Some(Run {
            element: tree.element(node),
            color: nref.color,
            size: nref.size,
            value: nref.value.as_ref(),
            sorted: nref.sorted,
        })
    }
}

/// Iterator over every element of a color mask, yielding the
/// element's color and value.
pub struct Values<'a, V>
where
    V: Clone + PartialEq,
{
    cursor: Cursor<'a, V>,
    mask: ColorMask,
}

impl<'a, V> Values<'a, V>
where
    V: Clone + PartialEq,
{
    pub(crate) fn new(cursor: Cursor<'a, V>, mask: ColorMask) -> Values<'a, V> {
        Values { cursor, mask }
    }
}

impl<'a, V> Iterator for Values<'a, V>
where
    V: Clone + PartialEq,
{
    type Item = (Color, Option<&'a V>);

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next(self.mask)?;
        let color = self.cursor.color()?;
        Some((color, self.cursor.value()))
    }
}
