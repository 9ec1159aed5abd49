use log::info;

// AVL height stays below 1.45 * log2(n + 2), so 64 levels cover any
// tree that fits in memory. Deeper samples land in the last bucket.
const MAX_DEPTH: usize = 64;

/// Histogram of leaf depths, filled by [`Tree::validate`]. The root is
/// at depth 1, so a tree of height `h` has leaves at depths between
/// `h / 2` and `h`.
///
/// [`Tree::validate`]: crate::Tree::validate
#[derive(Clone, Debug)]
pub struct Depth {
    buckets: [usize; MAX_DEPTH], // leaf count per depth.
    samples: usize,
    total: usize,
}

impl Depth {
    pub(crate) fn new() -> Depth {
        Default::default()
    }

    pub(crate) fn sample(&mut self, depth: usize) {
        let depth = depth.min(MAX_DEPTH - 1);
        self.buckets[depth] += 1;
        self.samples += 1;
        self.total += depth;
    }

    /// Number of leaves sampled.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Depth of the shallowest leaf, zero without samples.
    pub fn min(&self) -> usize {
        self.filled().next().map_or(0, |(depth, _)| depth)
    }

    /// Depth of the deepest leaf, zero without samples.
    pub fn max(&self) -> usize {
        self.filled().last().map_or(0, |(depth, _)| depth)
    }

    /// Mean leaf depth, rounded down.
    pub fn mean(&self) -> usize {
        self.total.checked_div(self.samples).unwrap_or(0)
    }

    /// Return `(percentile, depth)` pairs for the tail of the
    /// distribution: the first depth reaching or passing 90%, then
    /// every deeper level that raises the cumulative percentile.
    pub fn percentiles(&self) -> Vec<(u8, usize)> {
        let mut acc = 0;
        let mut floor = 90_u8;
        let mut percentiles = vec![];
        for (depth, leaves) in self.filled() {
            acc += leaves;
            let perc = (acc * 100 / self.samples) as u8;
            if perc >= floor {
                percentiles.push((perc, depth));
                floor = perc.saturating_add(1);
            }
        }
        percentiles
    }

    /// Log the histogram, each line starting with `prefix`.
    pub fn pretty_print(&self, prefix: &str) {
        info!(
            "{}leaf depth min {} mean {} max {} over {} leaves",
            prefix,
            self.min(),
            self.mean(),
            self.max(),
            self.samples
        );
        for (perc, depth) in self.percentiles() {
            info!("{}  p{} <= {}", prefix, perc, depth);
        }
    }

    /// Render the histogram summary as a JSON object.
    pub fn json(&self) -> String {
        let percentiles: Vec<String> = self
            .percentiles()
            .into_iter()
            .map(|(perc, depth)| format!("\"{}\": {}", perc, depth))
            .collect();
        format!(
            "{{\"samples\": {}, \"min\": {}, \"mean\": {}, \"max\": {}, \"percentiles\": {{{}}}}}",
            self.samples,
            self.min(),
            self.mean(),
            self.max(),
            percentiles.join(", ")
        )
    }

    // (depth, leaves) for every depth holding at least one leaf.
    fn filled(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, leaves)| **leaves > 0)
            .map(|(depth, leaves)| (depth, *leaves))
    }
}

impl Default for Depth {
    fn default() -> Self {
        Depth {
            buckets: [0; MAX_DEPTH],
            samples: 0,
            total: 0,
        }
    }
}
