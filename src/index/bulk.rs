use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::core::config::{IndexConfig, SplitPolicy};
use crate::core::threshold::AtomicF64;
use crate::index::node::{Entry, Node, Tree};
use crate::transform::dft::SpectralLayout;

/// Minimum number of items in a partition step before the recursion fans out
/// across threads. Below this, thread-dispatch overhead wins.
#[cfg(feature = "parallel")]
const MIN_PARALLEL_ITEMS: usize = 2048;

/// Diagnostic counters accumulated during a bulk load. Atomic because the
/// partition recursion runs in parallel; read once at the end.
#[derive(Debug)]
struct BuildCounters {
    nodes: AtomicUsize,
    leaves: AtomicUsize,
    leaf_volume: AtomicF64,
    leaf_log_volume: AtomicF64,
    leaf_margin: AtomicF64,
}

impl BuildCounters {
    fn new() -> Self {
        Self {
            nodes: AtomicUsize::new(0),
            leaves: AtomicUsize::new(0),
            leaf_volume: AtomicF64::new(0.0),
            leaf_log_volume: AtomicF64::new(0.0),
            leaf_margin: AtomicF64::new(0.0),
        }
    }
}

/// Bulk-load quality statistics, reported once per build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    pub nodes: usize,
    pub leaves: usize,
    pub height: usize,
    pub entries: usize,
    pub leaf_volume: f64,
    pub leaf_log_volume: f64,
    pub leaf_margin: f64,
}

/// Anything the Sort-Tile-Recursive packer can order spatially.
trait StrItem: Send {
    fn mid(&self, axis: usize) -> f64;
}

impl StrItem for Entry {
    #[inline]
    fn mid(&self, axis: usize) -> f64 {
        self.mbr.midpoint(axis)
    }
}

impl StrItem for Node {
    #[inline]
    fn mid(&self, axis: usize) -> f64 {
        self.mbr().midpoint(axis)
    }
}

/// Build a balanced tree from a flat list of entries with Sort-Tile-Recursive
/// packing and adaptive per-dimension split weighting.
///
/// Entries are packed into leaves, leaves into non-leaves, and so on until a
/// single root remains. The packing is deterministic for a given input order
/// and split policy, whether or not the recursion runs in parallel.
///
/// An empty input yields an empty tree; a singleton input yields one leaf.
///
/// # Panics
/// Panics if the configuration is inconsistent (see
/// [`IndexConfig::validate`]) or an entry's dimensionality disagrees with
/// `layout`.
pub fn bulk_load(
    entries: Vec<Entry>,
    config: &IndexConfig,
    layout: SpectralLayout,
) -> (Tree, BuildReport) {
    config.validate();
    for e in &entries {
        assert_eq!(
            e.mbr.dims(),
            layout.dims(),
            "Entry geometry has {} axes, layout expects {}",
            e.mbr.dims(),
            layout.dims()
        );
    }

    if entries.is_empty() {
        let tree = Tree {
            root: None,
            len: 0,
            node_count: 0,
            config: config.clone(),
            layout,
        };
        return (tree, BuildReport::default());
    }

    let n_entries = entries.len();
    let loader = Loader {
        config,
        dims: layout.dims(),
        next_id: AtomicU32::new(0),
        counters: BuildCounters::new(),
    };

    let mut level = loader.pack_entries(entries);
    while level.len() > 1 {
        level = loader.pack_nodes(level);
    }
    let root = level.pop().expect("Non-empty input always leaves a root");

    let report = BuildReport {
        nodes: loader.counters.nodes.load(Ordering::Acquire),
        leaves: loader.counters.leaves.load(Ordering::Acquire),
        height: root.height(),
        entries: n_entries,
        leaf_volume: loader.counters.leaf_volume.load(),
        leaf_log_volume: loader.counters.leaf_log_volume.load(),
        leaf_margin: loader.counters.leaf_margin.load(),
    };
    let tree = Tree {
        root: Some(root),
        len: n_entries,
        node_count: loader.next_id.load(Ordering::Acquire),
        config: config.clone(),
        layout,
    };
    (tree, report)
}

struct Loader<'a> {
    config: &'a IndexConfig,
    dims: usize,
    next_id: AtomicU32,
    counters: BuildCounters,
}

impl Loader<'_> {
    fn pack_entries(&self, entries: Vec<Entry>) -> Vec<Node> {
        let groups = self.partition_level(entries, self.config.leaf_size);
        self.wrap(groups, |id, group| {
            let node = Node::leaf(id, group);
            self.counters.leaves.fetch_add(1, Ordering::AcqRel);
            self.counters.leaf_volume.fetch_add(node.mbr().volume());
            self.counters
                .leaf_log_volume
                .fetch_add(node.mbr().log_volume());
            self.counters.leaf_margin.fetch_add(node.mbr().margin());
            node
        })
    }

    fn pack_nodes(&self, nodes: Vec<Node>) -> Vec<Node> {
        let groups = self.partition_level(nodes, self.config.max_children);
        self.wrap(groups, Node::non_leaf)
    }

    fn wrap<T, F>(&self, groups: Vec<Vec<T>>, make: F) -> Vec<Node>
    where
        F: Fn(u32, Vec<T>) -> Node,
    {
        groups
            .into_iter()
            .map(|group| {
                let id = self.next_id.fetch_add(1, Ordering::AcqRel);
                self.counters.nodes.fetch_add(1, Ordering::AcqRel);
                make(id, group)
            })
            .collect()
    }

    /// One STR level: choose per-axis split counts, then recursively sort and
    /// slice into roughly `ceil(len / capacity)` balanced groups.
    fn partition_level<T: StrItem>(&self, items: Vec<T>, capacity: usize) -> Vec<Vec<T>> {
        let node_count = items.len().div_ceil(capacity);
        if node_count <= 1 {
            return vec![items];
        }

        let weights = split_weights(&items, self.dims, self.config.split_policy);
        let splits = split_counts(&weights, node_count);

        // Partition by axes in descending split-count order; axes that got a
        // single slice contribute nothing.
        let mut axes: Vec<(usize, usize)> = splits
            .into_iter()
            .enumerate()
            .filter(|&(_, s)| s > 1)
            .collect();
        axes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        str_partition(items, &axes, capacity)
    }
}

/// Per-axis split weights over item geometry midpoints, normalized to sum
/// to 1. Degenerate spreads (all items coincident) fall back to uniform.
fn split_weights<T: StrItem>(items: &[T], dims: usize, policy: SplitPolicy) -> Vec<f64> {
    let uniform = || vec![1.0 / dims as f64; dims];
    let raw: Vec<f64> = match policy {
        SplitPolicy::Equal => return uniform(),
        SplitPolicy::Range => (0..dims)
            .map(|axis| {
                let mut lo = f64::INFINITY;
                let mut hi = f64::NEG_INFINITY;
                for it in items {
                    let m = it.mid(axis);
                    lo = lo.min(m);
                    hi = hi.max(m);
                }
                (hi - lo).max(0.0)
            })
            .collect(),
        SplitPolicy::Variance => (0..dims)
            .map(|axis| {
                let n = items.len() as f64;
                let mean = items.iter().map(|it| it.mid(axis)).sum::<f64>() / n;
                items
                    .iter()
                    .map(|it| {
                        let d = it.mid(axis) - mean;
                        d * d
                    })
                    .sum::<f64>()
                    / n
            })
            .collect(),
    };
    let total: f64 = raw.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return uniform();
    }
    raw.into_iter().map(|w| w / total).collect()
}

/// Convert normalized weights into integer split counts whose product covers
/// `node_count`: start from `round(node_count^weight)`, then promote
/// unsplit axes by descending weight until the product suffices (or no
/// unsplit axis remains).
fn split_counts(weights: &[f64], node_count: usize) -> Vec<usize> {
    let n = node_count as f64;
    let mut splits: Vec<usize> = weights
        .iter()
        .map(|&w| (n.powf(w)).round().max(1.0) as usize)
        .collect();

    let mut product: usize = splits.iter().product();
    while product < node_count {
        let candidate = weights
            .iter()
            .enumerate()
            .filter(|&(i, _)| splits[i] == 1)
            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)));
        match candidate {
            Some((axis, _)) => {
                splits[axis] = 2;
                product *= 2;
            }
            None => break,
        }
    }
    splits
}

/// Slice `items` into `pieces` contiguous groups whose sizes differ by at
/// most one. Preserves order.
fn balanced_slices<T>(mut items: Vec<T>, pieces: usize) -> Vec<Vec<T>> {
    let len = items.len();
    let pieces = pieces.min(len).max(1);
    let base = len / pieces;
    let extra = len % pieces;
    let mut out = Vec::with_capacity(pieces);
    // Drain from the back to avoid repeated shifting.
    let mut sizes: Vec<usize> = (0..pieces)
        .map(|i| base + usize::from(i < extra))
        .collect();
    while let Some(size) = sizes.pop() {
        let tail = items.split_off(items.len() - size);
        out.push(tail);
    }
    out.reverse();
    out
}

/// Recursive sort-and-slice. Sorts by the first axis' midpoints, slices into
/// that axis' split count, then recurses with the remaining axes inside each
/// slice. A slice that already fits one node, or has no axes left, is cut
/// into final capacity-bounded groups.
fn str_partition<T: StrItem>(
    mut items: Vec<T>,
    axes: &[(usize, usize)],
    capacity: usize,
) -> Vec<Vec<T>> {
    if items.len() <= capacity {
        return vec![items];
    }

    if axes.len() <= 1 {
        if let Some(&(axis, _)) = axes.first() {
            sort_by_axis(&mut items, axis);
        }
        return balanced_slices_by_capacity(items, capacity);
    }

    let (axis, pieces) = axes[0];
    sort_by_axis(&mut items, axis);

    #[cfg(feature = "parallel")]
    if items.len() >= MIN_PARALLEL_ITEMS {
        use rayon::prelude::*;
        return balanced_slices(items, pieces)
            .into_par_iter()
            .map(|slice| str_partition(slice, &axes[1..], capacity))
            .reduce(Vec::new, |mut acc, mut groups| {
                acc.append(&mut groups);
                acc
            });
    }

    balanced_slices(items, pieces)
        .into_iter()
        .flat_map(|slice| str_partition(slice, &axes[1..], capacity))
        .collect()
}

/// Final cut: balanced groups no larger than `capacity`.
fn balanced_slices_by_capacity<T>(items: Vec<T>, capacity: usize) -> Vec<Vec<T>> {
    let pieces = items.len().div_ceil(capacity);
    balanced_slices(items, pieces)
}

fn sort_by_axis<T: StrItem>(items: &mut [T], axis: usize) {
    // Stable sort keeps equal-midpoint items in input order, which is what
    // makes the packing deterministic.
    items.sort_by(|a, b| a.mid(axis).total_cmp(&b.mid(axis)));
}
