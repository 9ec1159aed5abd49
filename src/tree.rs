use std::{
    cmp::{self, Ordering},
    fmt, mem,
};

use log::{debug, trace};

use crate::color::{Color, ColorMask, Palette, MAX_COLORS};
use crate::depth::Depth;
use crate::error::Error;
use crate::iter::{Cursor, Run, Runs, Values};
use crate::node::{Counts, Node, Sortedness};

/// Total order over values, used by sorted insertion and value search.
pub type Comparator<V> = Box<dyn Fn(&V, &V) -> Ordering>;

/// Element is a handle to a single run inside a [`Tree`]. Handles stay
/// valid until the run is removed; runs grow in place when merged
/// into and keep their leading half when split. A handle to a removed
/// run never resolves to a run created later in the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Element(pub(crate) u32, pub(crate) u32); // (slot, generation)

/// Tree manage a sequence of colored elements, compressed into runs,
/// using an [AVL][avl] tree. Every node carries per-color element
/// counts of its subtree, so that any index can be located, and
/// translated between color views, in O(log n).
///
/// [avl]: https://en.wikipedia.org/wiki/AVL_tree
pub struct Tree<V>
where
    V: Clone + PartialEq,
{
    name: String,
    palette: Palette,
    comparator: Option<Comparator<V>>,
    nodes: Vec<Node<V>>,
    free: Vec<u32>,
    root: Option<u32>,
    zero_queue: Vec<u32>, // emptied runs waiting to be unlinked.
}

/// Different ways to construct a new Tree instance.
impl<V> Tree<V>
where
    V: Clone + PartialEq,
{
    /// Create an empty tree, identified by `name`, coloring elements
    /// from `palette`. Trees created this way don't support sorted
    /// operations.
    pub fn new<S>(name: S, palette: Palette) -> Tree<V>
    where
        S: AsRef<str>,
    {
        debug!(
            "tree {}: new with {} colors",
            name.as_ref(),
            palette.len()
        );
        Tree {
            name: name.as_ref().to_string(),
            palette,
            comparator: None,
            nodes: vec![],
            free: vec![],
            root: None,
            zero_queue: vec![],
        }
    }

    /// Create an empty tree whose values are ordered by `comparator`,
    /// enabling [`Tree::add_in_sorted_order`] and
    /// [`Tree::index_of_value`]. Absent values order before all
    /// present values.
    pub fn with_comparator<S, F>(name: S, palette: Palette, comparator: F) -> Tree<V>
    where
        S: AsRef<str>,
        F: Fn(&V, &V) -> Ordering + 'static,
    {
        let mut tree = Tree::new(name, palette);
        tree.comparator = Some(Box::new(comparator));
        tree
    }
}

/// Maintenance API.
impl<V> Tree<V>
where
    V: Clone + PartialEq,
{
    /// Identify this instance.
    #[inline]
    pub fn id(&self) -> String {
        self.name.clone()
    }

    #[inline]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Mask selecting every color of this tree's palette.
    #[inline]
    pub fn all_colors(&self) -> ColorMask {
        self.palette.all()
    }

    /// Number of elements whose color is in `mask`.
    #[inline]
    pub fn size(&self, mask: ColorMask) -> usize {
        self.subtree_size(self.root, mask)
    }

    /// Number of elements, across all colors.
    #[inline]
    pub fn len(&self) -> usize {
        self.size(self.palette.all())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of runs, that is nodes, in the tree.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Discard every element.
    pub fn clear(&mut self) {
        debug!("tree {}: clear {} runs", self.name, self.node_count());
        self.root = None;
        self.zero_queue.clear();
        // slots are kept, so that outstanding handles turn stale.
        for index in 0..self.nodes.len() as u32 {
            if self.node(index).live {
                self.release(index);
            }
        }
    }

    /// Return quickly with basic statisics, only runs(), elements()
    /// and node_size() are valid with this statistics.
    pub fn stats(&self) -> Stats {
        Stats::new(self.node_count(), self.len(), mem::size_of::<Node<V>>())
    }

    /// Validate the tree with following rules:
    ///
    /// * Height of every node is one more than its taller child.
    /// * Heights of left and right subtree differ by at most one.
    /// * Every per-color count equals the sum over its subtree.
    /// * Children point back to their parent.
    /// * No empty run is linked into the tree.
    ///
    /// Additionally return full statistics on the tree. Refer to
    /// [`Stats`] for more information.
    pub fn validate(&self) -> Result<Stats, Error> {
        if !self.zero_queue.is_empty() {
            return Err(Error::PendingDrain(self.zero_queue.len()));
        }
        let mut stats = self.stats();
        stats.set_depths(Depth::new());
        if let Some(root) = self.root {
            if let Some(parent) = self.node(root).parent {
                let child = root;
                return Err(Error::ParentMismatch { node: parent, child });
            }
        }
        let height = self.validate_tree(self.root, 1, &mut stats)?;
        stats.set_height(height);
        Ok(stats)
    }
}

/// Element API, operations on a single run.
impl<V> Tree<V>
where
    V: Clone + PartialEq,
{
    /// Return the first run.
    pub fn first(&self) -> Option<Element> {
        self.first_node().map(|n| self.element(n))
    }

    /// Return the last run.
    pub fn last(&self) -> Option<Element> {
        self.root.map(|root| self.element(self.rightmost(root)))
    }

    /// Return the run following `element`.
    pub fn next_element(&self, element: Element) -> Result<Option<Element>, Error> {
        self.live(element)?;
        Ok(self.successor(element.0).map(|n| self.element(n)))
    }

    /// Return the run preceding `element`.
    pub fn prev_element(&self, element: Element) -> Result<Option<Element>, Error> {
        self.live(element)?;
        Ok(self.predecessor(element.0).map(|n| self.element(n)))
    }

    pub fn value(&self, element: Element) -> Result<Option<&V>, Error> {
        Ok(self.live(element)?.value.as_ref())
    }

    /// Replace the value of the run, return the old value. Sizes and
    /// counts are left untouched.
    pub fn set_value(&mut self, element: Element, value: Option<V>) -> Result<Option<V>, Error> {
        self.live(element)?;
        Ok(mem::replace(&mut self.node_mut(element.0).value, value))
    }

    pub fn color(&self, element: Element) -> Result<Color, Error> {
        Ok(self.live(element)?.color)
    }

    /// Recolor the whole run, moving its elements from one color view
    /// to another.
    pub fn set_color(&mut self, element: Element, color: Color) -> Result<(), Error> {
        self.check_color(color)?;
        let (old, size, parent) = {
            let node = self.live(element)?;
            (node.color, node.size as isize, node.parent)
        };
        if old != color {
            self.node_mut(element.0).set_color(color);
            self.fix_counts_to_root(parent, old, -size);
            self.fix_counts_to_root(parent, color, size);
        }
        self.check_invariants();
        Ok(())
    }

    /// Number of elements in this run.
    pub fn run_size(&self, element: Element) -> Result<usize, Error> {
        Ok(self.live(element)?.size)
    }

    pub fn sortedness(&self, element: Element) -> Result<Sortedness, Error> {
        Ok(self.live(element)?.sorted)
    }

    pub fn set_sortedness(&mut self, element: Element, sorted: Sortedness) -> Result<(), Error> {
        self.live(element)?;
        self.node_mut(element.0).sorted = sorted;
        Ok(())
    }
}

/// Write operations on Tree instance.
impl<V> Tree<V>
where
    V: Clone + PartialEq,
{
    /// Insert a run of `size` elements with `color` and `value`, so
    /// that its first element lands at `index` in `mask`'s view. If
    /// the run is adjacent to, or inside, a run with same color and
    /// value, that run grows instead. Absent values never merge.
    ///
    /// Return the run holding the new elements, `None` when `size`
    /// is zero.
    pub fn add(
        &mut self,
        index: usize,
        mask: ColorMask,
        color: Color,
        value: Option<V>,
        size: usize,
    ) -> Result<Option<Element>, Error> {
        self.check_color(color)?;
        self.check_mask(mask)?;
        let len = self.size(mask);
        if index > len {
            return Err(Error::IndexOutOfBounds { index, len });
        }
        if size == 0 {
            return Ok(None);
        }

        let node = match self.root {
            None => {
                let root = self.alloc(color, size, value, None);
                self.root = Some(root);
                root
            }
            Some(root) => self.insert_into_subtree(root, index, mask, color, value, size),
        };
        self.check_invariants();
        Ok(Some(self.element(node)))
    }

    /// Insert a run at its sort position, located by comparing
    /// `value` with the values of sorted runs. Runs that are not
    /// [`Sortedness::Sorted`] are skipped over for comparisons. Ties
    /// descend into the shorter subtree, or merge with a run of same
    /// color and value.
    pub fn add_in_sorted_order(
        &mut self,
        color: Color,
        value: Option<V>,
        size: usize,
    ) -> Result<Option<Element>, Error> {
        if self.comparator.is_none() {
            return Err(Error::NoComparator);
        }
        self.check_color(color)?;
        if size == 0 {
            return Ok(None);
        }

        let node = match self.root {
            None => {
                let root = self.alloc(color, size, value, None);
                self.root = Some(root);
                root
            }
            Some(root) => self.insert_in_sorted_order(root, color, value, size),
        };
        self.check_invariants();
        Ok(Some(self.element(node)))
    }

    /// Remove the run entirely.
    pub fn remove_element(&mut self, element: Element) -> Result<(), Error> {
        let (color, size) = {
            let node = self.live(element)?;
            (node.color, node.size)
        };
        self.fix_counts_to_root(Some(element.0), color, -(size as isize));
        self.node_mut(element.0).size = 0;
        self.zero_queue.push(element.0);
        self.drain();
        self.check_invariants();
        Ok(())
    }

    /// Remove `size` elements starting at `index` in `mask`'s view.
    /// Only elements of colors in `mask` are removed, elements of
    /// other colors stay in place. Runs left adjacent with same color
    /// and value are not merged back.
    pub fn remove(&mut self, index: usize, mask: ColorMask, size: usize) -> Result<(), Error> {
        self.check_mask(mask)?;
        let len = self.size(mask);
        if index + size > len {
            return Err(Error::RangeOutOfBounds { index, size, len });
        }
        if let (Some(root), true) = (self.root, size > 0) {
            self.remove_from_subtree(root, index, mask, size);
            self.drain();
        }
        self.check_invariants();
        Ok(())
    }

    /// Replace `size` elements starting at `index` in `mask`'s view
    /// with a single run of `color` and `value`.
    pub fn set(
        &mut self,
        index: usize,
        mask: ColorMask,
        color: Color,
        value: Option<V>,
        size: usize,
    ) -> Result<Option<Element>, Error> {
        // TODO: fuse into a single descent, removing then adding walks
        // the same path twice.
        self.check_color(color)?;
        self.remove(index, mask, size)?;
        self.add(index, mask, color, value, size)
    }
}

/// Read operations on Tree instance.
impl<V> Tree<V>
where
    V: Clone + PartialEq,
{
    /// Return the run holding the element at `index` in `mask`'s view.
    pub fn get(&self, index: usize, mask: ColorMask) -> Result<Element, Error> {
        self.check_mask(mask)?;
        let len = self.size(mask);
        let mut node = match self.root {
            Some(root) if index < len => root,
            _ => return Err(Error::IndexOutOfBounds { index, len }),
        };

        let mut index = index;
        loop {
            let nref = self.node(node);
            let left_size = self.subtree_size(nref.left, mask);
            if let (Some(left), true) = (nref.left, index < left_size) {
                node = left;
                continue;
            }
            index -= left_size;
            let run = nref.run_contribution(mask);
            if index < run {
                break Ok(self.element(node));
            }
            index -= run;
            node = match nref.right {
                Some(right) => right,
                None => panic!("get(): counts out of sync, call the programmer"),
            };
        }
    }

    /// Return the index, in `mask`'s view, of the first element of
    /// the run. When the run's color is not in `mask`, this is where
    /// the run would start if it had such a color.
    pub fn index_of_node(&self, element: Element, mask: ColorMask) -> Result<usize, Error> {
        self.live(element)?;
        self.check_mask(mask)?;
        let counts = self.counts_before(element.0);
        Ok(mask.indices().map(|i| counts[i]).sum())
    }

    /// Search `value` using the comparator, return its index in
    /// `mask`'s view. With `first_index` ties resolve to the first
    /// match, else to the last. Only elements of `mask` can match.
    /// When not found, return the index where `value` would be
    /// inserted if `simulated`, else `None`.
    pub fn index_of_value(
        &self,
        value: Option<&V>,
        first_index: bool,
        simulated: bool,
        mask: ColorMask,
    ) -> Result<Option<usize>, Error> {
        if self.comparator.is_none() {
            return Err(Error::NoComparator);
        }
        self.check_mask(mask)?;

        // count elements ordered before `value`, or not after it when
        // looking for the last match.
        let mut result = 0_usize;
        let mut node = self.root;
        while let Some(n) = node {
            let nref = self.node(n);
            match self.compare(value, nref.value.as_ref()) {
                Ordering::Less => node = nref.left,
                Ordering::Equal if first_index => node = nref.left,
                Ordering::Equal | Ordering::Greater => {
                    result += self.subtree_size(nref.left, mask);
                    result += nref.run_contribution(mask);
                    node = nref.right;
                }
            }
        }

        let candidate = if first_index {
            Some(result)
        } else {
            result.checked_sub(1)
        };
        let found = match candidate {
            Some(index) if index < self.size(mask) => {
                let element = self.get(index, mask)?;
                let other = self.node(element.0).value.as_ref();
                self.compare(value, other) == Ordering::Equal
            }
            _ => false,
        };
        match (found, simulated) {
            (true, _) => Ok(candidate),
            (false, true) => Ok(Some(result)),
            (false, false) => Ok(None),
        }
    }

    /// Translate `index` from `mask_in`'s view into `mask_out`'s
    /// view. When the element at `index` has a color outside
    /// `mask_out`, return the index of the closest preceding
    /// `mask_out` element, `None` if there is none. An index one past
    /// the end translates to the length of `mask_out`'s view.
    pub fn convert_index_color(
        &self,
        index: usize,
        mask_in: ColorMask,
        mask_out: ColorMask,
    ) -> Result<Option<usize>, Error> {
        self.check_mask(mask_in)?;
        self.check_mask(mask_out)?;
        let len = self.size(mask_in);
        if index > len {
            return Err(Error::IndexOutOfBounds { index, len });
        } else if index == len {
            return Ok(Some(self.size(mask_out)));
        }

        let (mut index, mut result) = (index, 0_usize);
        let mut node = self.root;
        while let Some(n) = node {
            let nref = self.node(n);
            let left_size = self.subtree_size(nref.left, mask_in);
            if let (Some(left), true) = (nref.left, index < left_size) {
                node = Some(left);
                continue;
            }
            result += self.subtree_size(nref.left, mask_out);
            index -= left_size;

            let run = nref.run_contribution(mask_in);
            if index < run {
                return if mask_out.contains(nref.color) {
                    Ok(Some(result + index))
                } else {
                    Ok(result.checked_sub(1))
                };
            }
            result += nref.run_contribution(mask_out);
            index -= run;
            node = nref.right;
        }
        panic!("convert_index_color(): counts out of sync, call the programmer")
    }

    /// Return a cursor positioned before the first element.
    pub fn cursor(&self) -> Cursor<'_, V> {
        Cursor::new(self)
    }

    /// Return a cursor whose next element, in `mask`'s view, is the
    /// one at `next_index`.
    pub fn cursor_at(&self, next_index: usize, mask: ColorMask) -> Result<Cursor<'_, V>, Error> {
        Cursor::starting_at(self, next_index, mask)
    }

    /// Return an iterator over all runs, in order.
    pub fn runs(&self) -> Runs<'_, V> {
        Runs::new(self, self.first_node())
    }

    /// Return an iterator over every element, in order, whose color is
    /// in `mask`. Runs are expanded element by element.
    pub fn values(&self, mask: ColorMask) -> Values<'_, V> {
        Values::new(self.cursor(), mask)
    }
}

// crate-internal node access, shared with the cursor.
impl<V> Tree<V>
where
    V: Clone + PartialEq,
{
    #[inline]
    pub(crate) fn node(&self, index: u32) -> &Node<V> {
        &self.nodes[index as usize]
    }

    // handle to the run currently held by slot `index`.
    #[inline]
    pub(crate) fn element(&self, index: u32) -> Element {
        Element(index, self.node(index).generation)
    }

    #[inline]
    fn node_mut(&mut self, index: u32) -> &mut Node<V> {
        &mut self.nodes[index as usize]
    }

    fn live(&self, element: Element) -> Result<&Node<V>, Error> {
        match self.nodes.get(element.0 as usize) {
            Some(node) if node.live && node.generation == element.1 => Ok(node),
            _ => Err(Error::StaleElement(element.0)),
        }
    }

    fn check_color(&self, color: Color) -> Result<(), Error> {
        if self.palette.has(color) {
            Ok(())
        } else {
            Err(Error::InvalidColor(color.bits()))
        }
    }

    fn check_mask(&self, mask: ColorMask) -> Result<(), Error> {
        if self.palette.covers(mask) {
            Ok(())
        } else {
            Err(Error::InvalidColor(mask.bits()))
        }
    }

    #[inline]
    fn subtree_size(&self, node: Option<u32>, mask: ColorMask) -> usize {
        node.map_or(0, |n| self.node(n).size_for(mask))
    }

    #[inline]
    fn height_of(&self, node: Option<u32>) -> u8 {
        node.map_or(0, |n| self.node(n).height)
    }

    pub(crate) fn first_node(&self) -> Option<u32> {
        self.root.map(|root| self.leftmost(root))
    }

    fn leftmost(&self, mut node: u32) -> u32 {
        while let Some(left) = self.node(node).left {
            node = left;
        }
        node
    }

    fn rightmost(&self, mut node: u32) -> u32 {
        while let Some(right) = self.node(node).right {
            node = right;
        }
        node
    }

    pub(crate) fn successor(&self, node: u32) -> Option<u32> {
        if let Some(right) = self.node(node).right {
            return Some(self.leftmost(right));
        }
        let mut node = node;
        while let Some(parent) = self.node(node).parent {
            if self.node(parent).left == Some(node) {
                return Some(parent);
            }
            node = parent;
        }
        None
    }

    fn predecessor(&self, node: u32) -> Option<u32> {
        if let Some(left) = self.node(node).left {
            return Some(self.rightmost(left));
        }
        let mut node = node;
        while let Some(parent) = self.node(node).parent {
            if self.node(parent).right == Some(node) {
                return Some(parent);
            }
            node = parent;
        }
        None
    }

    /// Per-color count of elements before the node's run, computed by
    /// walking up to the root.
    pub(crate) fn counts_before(&self, node: u32) -> Counts {
        let mut counts: Counts = [0; MAX_COLORS];
        let add = |counts: &mut Counts, from: Option<u32>| {
            if let Some(from) = from {
                let from = &self.node(from).counts;
                counts.iter_mut().zip(from.iter()).for_each(|(c, f)| *c += f);
            }
        };

        add(&mut counts, self.node(node).left);
        let mut node = node;
        while let Some(parent) = self.node(node).parent {
            let pref = self.node(parent);
            if pref.right == Some(node) {
                add(&mut counts, pref.left);
                counts[pref.color.index()] += pref.size;
            }
            node = parent;
        }
        counts
    }

    fn compare(&self, a: Option<&V>, b: Option<&V>) -> Ordering {
        match (a, b, self.comparator.as_ref()) {
            (None, None, _) => Ordering::Equal,
            (None, Some(_), _) => Ordering::Less,
            (Some(_), None, _) => Ordering::Greater,
            (Some(a), Some(b), Some(cmp)) => cmp(a, b),
            (Some(_), Some(_), None) => panic!("compare(): no comparator, call the programmer"),
        }
    }

    // full validation after every mutation, in this crate's own tests
    // or when the `check-invariants` feature is enabled.
    #[cfg(any(test, feature = "check-invariants"))]
    fn check_invariants(&self) {
        if let Err(err) = self.validate() {
            panic!("tree {}: {}", self.name, err);
        }
    }

    #[cfg(not(any(test, feature = "check-invariants")))]
    #[inline]
    fn check_invariants(&self) {}
}

// arena management.
impl<V> Tree<V>
where
    V: Clone + PartialEq,
{
    fn alloc(&mut self, color: Color, size: usize, value: Option<V>, parent: Option<u32>) -> u32 {
        let mut node = Node::new(color, size, value, parent);
        match self.free.pop() {
            Some(index) => {
                node.generation = self.node(index).generation;
                self.nodes[index as usize] = node;
                index
            }
            None if self.nodes.len() < (u32::MAX as usize) => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as u32
            }
            None => panic!("alloc(): arena exhausted for tree {}", self.name),
        }
    }

    fn release(&mut self, index: u32) {
        let node = self.node_mut(index);
        node.live = false;
        node.generation = node.generation.wrapping_add(1);
        node.value = None;
        node.left = None;
        node.right = None;
        node.parent = None;
        self.free.push(index);
    }
}

impl<V> Tree<V>
where
    V: Clone + PartialEq,
{
    fn insert_into_subtree(
        &mut self,
        mut parent: u32,
        mut index: usize,
        mask: ColorMask,
        color: Color,
        value: Option<V>,
        size: usize,
    ) -> u32 {
        loop {
            let (left, left_size, pcolor, mergeable) = {
                let pref = self.node(parent);
                let mergeable = value.is_some() && color == pref.color && value == pref.value;
                let left_size = self.subtree_size(pref.left, mask);
                (pref.left, left_size, pref.color, mergeable)
            };
            let mut right_start = left_size + self.node(parent).run_contribution(mask);

            // cheapest is to grow a run that already touches the index.
            if mergeable && index >= left_size && index <= right_start {
                self.node_mut(parent).size += size;
                self.fix_counts_to_root(Some(parent), color, size as isize);
                return parent;
            }

            if index <= left_size {
                match left {
                    Some(left) => {
                        parent = left;
                        continue;
                    }
                    None => return self.link_leaf(parent, true, color, value, size),
                }
            }

            // index falls strictly inside this run, split it in two.
            if index < right_start {
                let tail = right_start - index;
                let (tail_value, sorted) = {
                    let pref = self.node_mut(parent);
                    pref.size -= tail;
                    (pref.value.clone(), pref.sorted)
                };
                self.fix_counts_to_root(Some(parent), pcolor, -(tail as isize));
                // valueless, so the tail can't merge back into parent.
                let split = self.insert_into_subtree(parent, index, mask, pcolor, None, tail);
                let sref = self.node_mut(split);
                sref.value = tail_value;
                sref.sorted = sorted;
                right_start = index;
            }

            match self.node(parent).right {
                Some(right) => {
                    index -= right_start;
                    parent = right;
                }
                None => return self.link_leaf(parent, false, color, value, size),
            }
        }
    }

    fn insert_in_sorted_order(
        &mut self,
        mut parent: u32,
        color: Color,
        value: Option<V>,
        size: usize,
    ) -> u32 {
        loop {
            let side = self.sort_side(parent, value.as_ref());
            let (left, right, mergeable) = {
                let pref = self.node(parent);
                let mergeable = value.is_some() && color == pref.color && value == pref.value;
                (pref.left, pref.right, mergeable)
            };
            if side == Ordering::Equal && mergeable {
                self.node_mut(parent).size += size;
                self.fix_counts_to_root(Some(parent), color, size as isize);
                return parent;
            }

            let on_left = match side {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => {
                    let shorter = self.height_of(left) < self.height_of(right);
                    left.is_none() || (right.is_some() && shorter)
                }
            };
            match (on_left, left, right) {
                (true, Some(left), _) => parent = left,
                (false, _, Some(right)) => parent = right,
                (on_left, _, _) => return self.link_leaf(parent, on_left, color, value, size),
            }
        }
    }

    // compare against the first sorted run at or after `from`, values
    // past the last sorted run go to the left.
    fn sort_side(&self, from: u32, value: Option<&V>) -> Ordering {
        let mut follower = Some(from);
        while let Some(f) = follower {
            let fref = self.node(f);
            if fref.sorted == Sortedness::Sorted {
                return self.compare(value, fref.value.as_ref());
            }
            follower = self.successor(f);
        }
        Ordering::Less
    }

    fn link_leaf(
        &mut self,
        parent: u32,
        on_left: bool,
        color: Color,
        value: Option<V>,
        size: usize,
    ) -> u32 {
        let leaf = self.alloc(color, size, value, Some(parent));
        if on_left {
            self.node_mut(parent).left = Some(leaf);
        } else {
            self.node_mut(parent).right = Some(leaf);
        }
        self.fix_counts_to_root(Some(parent), color, size as isize);
        self.fix_height_post_change(parent, false);
        leaf
    }

    fn remove_from_subtree(&mut self, mut node: u32, mut index: usize, mask: ColorMask, mut size: usize) {
        while size > 0 {
            let (left, right) = {
                let nref = self.node(node);
                (nref.left, nref.right)
            };
            let mut left_size = self.subtree_size(left, mask);

            if let (Some(left), true) = (left, index < left_size) {
                if index + size > left_size {
                    let partial = left_size - index;
                    self.remove_from_subtree(left, index, mask, partial);
                    size -= partial;
                    left_size -= partial;
                } else {
                    node = left;
                    continue;
                }
            }

            let mut right_start = left_size + self.node(node).run_contribution(mask);
            if index < right_start {
                let n = cmp::min(right_start - index, size);
                let (color, emptied) = {
                    let nref = self.node_mut(node);
                    nref.size -= n;
                    (nref.color, nref.size == 0)
                };
                size -= n;
                right_start -= n;
                self.fix_counts_to_root(Some(node), color, -(n as isize));
                if emptied {
                    self.zero_queue.push(node);
                }
                if size == 0 {
                    return;
                }
            }

            index -= right_start;
            node = match right {
                Some(right) => right,
                None => panic!("remove_from_subtree(): counts out of sync, call the programmer"),
            };
        }
    }

    // unlink every emptied run, latest first.
    fn drain(&mut self) {
        while let Some(node) = self.zero_queue.pop() {
            trace!("tree {}: drain node {}", self.name, node);
            let (left, right) = {
                let nref = self.node(node);
                (nref.left, nref.right)
            };
            match (left, right) {
                (Some(_), Some(_)) => self.replace_empty_node_with_child(node),
                (child, None) | (None, child) => self.replace_in_parent(node, child),
            }
            self.release(node);
        }
    }

    fn replace_in_parent(&mut self, node: u32, replacement: Option<u32>) {
        let parent = self.node(node).parent;
        self.replace_child(parent, node, replacement);
        if let Some(parent) = parent {
            self.fix_height_post_change(parent, true);
        }
    }

    // swap the empty `node` with its in-order predecessor, which has
    // no right child and can be spliced out directly.
    fn replace_empty_node_with_child(&mut self, node: u32) {
        let mut replacement = match self.node(node).left {
            Some(left) => left,
            None => panic!("replace_empty_node_with_child(): no left child, call the programmer"),
        };
        while let Some(right) = self.node(replacement).right {
            replacement = right;
        }
        let (color, size, inner) = {
            let rref = self.node(replacement);
            (rref.color, rref.size as isize, rref.left)
        };

        self.fix_counts_to_root(Some(replacement), color, -size);
        self.replace_in_parent(replacement, inner);

        // rebalancing above may have rotated `node`, re-read its links.
        let (left, right, parent) = {
            let nref = self.node(node);
            (nref.left, nref.right, nref.parent)
        };
        {
            let rref = self.node_mut(replacement);
            rref.left = left;
            rref.right = right;
        }
        for child in [left, right].iter().flatten() {
            self.node_mut(*child).parent = Some(replacement);
        }
        self.refresh(replacement);
        self.replace_child(parent, node, Some(replacement));
        self.fix_counts_to_root(parent, color, size);
        if let Some(parent) = parent {
            self.fix_height_post_change(parent, true);
        }
    }

    // point `parent`'s link to `old` at `new` instead, the root when
    // there is no parent.
    fn replace_child(&mut self, parent: Option<u32>, old: u32, new: Option<u32>) {
        match parent {
            None => self.root = new,
            Some(parent) => {
                let pref = self.node_mut(parent);
                if pref.left == Some(old) {
                    pref.left = new;
                } else {
                    pref.right = new;
                }
            }
        }
        if let Some(new) = new {
            self.node_mut(new).parent = parent;
        }
    }

    fn fix_counts_to_root(&mut self, from: Option<u32>, color: Color, delta: isize) {
        let slot = color.index();
        let mut cursor = from;
        while let Some(node) = cursor {
            let nref = self.node_mut(node);
            nref.counts[slot] = (nref.counts[slot] as isize + delta) as usize;
            cursor = nref.parent;
        }
    }

    // recompute height and counts from the children.
    fn refresh(&mut self, node: u32) {
        let (left, right) = {
            let nref = self.node(node);
            (nref.left, nref.right)
        };
        let lcounts = left.map(|l| self.node(l).counts);
        let rcounts = right.map(|r| self.node(r).counts);
        let height = 1 + cmp::max(self.height_of(left), self.height_of(right));
        let nref = self.node_mut(node);
        nref.refresh_counts(lcounts.as_ref(), rcounts.as_ref());
        nref.height = height;
    }

    // Walk up from `node` restoring heights, rotating where the
    // children's heights differ by two. Insertion can stop at the
    // first node whose height is unchanged, deletion must walk up to
    // the root.
    fn fix_height_post_change(&mut self, node: u32, all_the_way_to_root: bool) {
        let mut cursor = Some(node);
        while let Some(mut node) = cursor {
            let (left, right) = {
                let nref = self.node(node);
                (nref.left, nref.right)
            };
            let (lh, rh) = (self.height_of(left), self.height_of(right));
            if let (Some(left), true) = (left, lh > rh + 1) {
                let (ll, lr) = {
                    let lref = self.node(left);
                    (lref.left, lref.right)
                };
                if self.height_of(lr) > self.height_of(ll) {
                    self.rotate_left(left);
                }
                node = self.rotate_right(node);
            } else if let (Some(right), true) = (right, rh > lh + 1) {
                let (rl, rr) = {
                    let rref = self.node(right);
                    (rref.left, rref.right)
                };
                if self.height_of(rl) > self.height_of(rr) {
                    self.rotate_right(right);
                }
                node = self.rotate_left(node);
            }

            let (left, right) = {
                let nref = self.node(node);
                (nref.left, nref.right)
            };
            let height = 1 + cmp::max(self.height_of(left), self.height_of(right));
            if !all_the_way_to_root && self.node(node).height == height {
                return;
            }
            self.node_mut(node).height = height;
            cursor = self.node(node).parent;
        }
    }

    //              (i)                       (i)
    //               |                         |
    //              node                       x
    //              /  \                      / \
    //             /    \                    /   \
    //            /      \                  /     \
    //          left      x              node      xr
    //                   / \             /  \
    //                 xl   xr        left   xl
    //
    fn rotate_left(&mut self, node: u32) -> u32 {
        let x = match self.node(node).right {
            Some(x) => x,
            None => panic!("rotate_left(): no right child, call the programmer"),
        };
        trace!("tree {}: rotate left {} -> {}", self.name, node, x);
        let parent = self.node(node).parent;
        let xl = self.node(x).left;
        self.node_mut(node).right = xl;
        if let Some(xl) = xl {
            self.node_mut(xl).parent = Some(node);
        }
        self.node_mut(x).left = Some(node);
        self.node_mut(node).parent = Some(x);
        self.replace_child(parent, node, Some(x));
        self.refresh(node);
        self.refresh(x);
        x
    }

    //              (i)                       (i)
    //               |                         |
    //              node                       x
    //              /  \                      / \
    //             /    \                    /   \
    //            /      \                  /     \
    //           x      right             xl      node
    //          / \                               / \
    //        xl   xr                           xr  right
    //
    fn rotate_right(&mut self, node: u32) -> u32 {
        let x = match self.node(node).left {
            Some(x) => x,
            None => panic!("rotate_right(): no left child, call the programmer"),
        };
        trace!("tree {}: rotate right {} -> {}", self.name, node, x);
        let parent = self.node(node).parent;
        let xr = self.node(x).right;
        self.node_mut(node).left = xr;
        if let Some(xr) = xr {
            self.node_mut(xr).parent = Some(node);
        }
        self.node_mut(x).right = Some(node);
        self.node_mut(node).parent = Some(x);
        self.replace_child(parent, node, Some(x));
        self.refresh(node);
        self.refresh(x);
        x
    }

    fn validate_tree(&self, node: Option<u32>, depth: usize, stats: &mut Stats) -> Result<u8, Error> {
        let node = match node {
            None => return Ok(0),
            Some(node) => node,
        };
        let nref = self.node(node);
        if nref.size == 0 {
            return Err(Error::EmptyRun(node));
        }
        for child in [nref.left, nref.right].iter().flatten() {
            if self.node(*child).parent != Some(node) {
                let child = *child;
                return Err(Error::ParentMismatch { node, child });
            }
        }
        if nref.left.is_none() && nref.right.is_none() {
            if let Some(depths) = stats.depths.as_mut() {
                depths.sample(depth);
            }
        }

        let left = self.validate_tree(nref.left, depth + 1, stats)?;
        let right = self.validate_tree(nref.right, depth + 1, stats)?;
        let expected = 1 + cmp::max(left, right);
        if nref.height != expected {
            let height = nref.height;
            return Err(Error::HeightMismatch { node, height, expected });
        }
        if cmp::max(left, right) - cmp::min(left, right) > 1 {
            return Err(Error::Unbalanced { node, left, right });
        }

        let zero: Counts = [0; MAX_COLORS];
        let lcounts = nref.left.map_or(&zero, |l| &self.node(l).counts);
        let rcounts = nref.right.map_or(&zero, |r| &self.node(r).counts);
        for color in 0..MAX_COLORS {
            let own = if nref.color.index() == color { nref.size } else { 0 };
            let expected = lcounts[color] + rcounts[color] + own;
            let count = nref.counts[color];
            if count != expected {
                return Err(Error::CountMismatch {
                    node,
                    color,
                    count,
                    expected,
                });
            }
        }
        Ok(nref.height)
    }
}

impl<V> fmt::Debug for Tree<V>
where
    V: Clone + PartialEq + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let runs: Vec<String> = self
            .runs()
            .map(|run: Run<'_, V>| {
                let label = self.palette.label(run.color).unwrap_or("?");
                format!("{}x{} {:?}", run.size, label, run.value)
            })
            .collect();
        f.debug_struct("Tree")
            .field("name", &self.name)
            .field("runs", &runs)
            .finish()
    }
}

/// Statistics on [`Tree`]. Serves two purpose:
///
/// * To get partial but quick statistics via [`Tree::stats`] method.
/// * To get full statisics via [`Tree::validate`] method.
#[derive(Default, Debug)]
pub struct Stats {
    runs: usize,     // number of nodes in the tree.
    elements: usize, // number of elements, across all colors.
    node_size: usize,
    height: Option<u8>,
    depths: Option<Depth>,
}

impl Stats {
    fn new(runs: usize, elements: usize, node_size: usize) -> Stats {
        Stats {
            runs,
            elements,
            node_size,
            height: Default::default(),
            depths: Default::default(),
        }
    }

    #[inline]
    fn set_height(&mut self, height: u8) {
        self.height = Some(height)
    }

    #[inline]
    fn set_depths(&mut self, depths: Depth) {
        self.depths = Some(depths)
    }

    /// Return number of runs in [`Tree`] instance.
    #[inline]
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Return number of elements in [`Tree`] instance.
    #[inline]
    pub fn elements(&self) -> usize {
        self.elements
    }

    /// Return node-size, including over-head for `Tree<V>`. The
    /// node size varies with value type.
    #[inline]
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Return height of the tree, zero for an empty tree.
    #[inline]
    pub fn height(&self) -> Option<u8> {
        self.height
    }

    /// Return [`Depth`] statistics of leaf nodes.
    pub fn depths(&self) -> Option<Depth> {
        match self.depths.as_ref() {
            Some(depths) if depths.samples() > 0 => Some(depths.clone()),
            _ => None,
        }
    }
}
