use std::cmp::Ordering;
use std::collections::binary_heap::PeekMut;
use std::collections::BinaryHeap;

use crate::core::threshold::RunningThreshold;
use crate::index::geometry::QuerySummary;
use crate::index::node::{Entry, Node, Tree};

/// Per-query memo of node lower bounds, indexed by node id.
///
/// The same node is compared against the same query by both passes of a
/// query; the memo makes the second comparison a lookup. A fresh cache is
/// created per query (that is the invalidation protocol, not eviction), so
/// it is never shared across threads.
#[derive(Debug)]
pub struct BoundCache {
    bounds: Vec<f64>,
}

impl BoundCache {
    pub fn for_tree(tree: &Tree) -> Self {
        Self {
            bounds: vec![f64::NAN; tree.node_count() as usize],
        }
    }

    #[inline]
    fn get(&self, id: u32) -> Option<f64> {
        let b = self.bounds[id as usize];
        if b.is_nan() {
            None
        } else {
            Some(b)
        }
    }

    #[inline]
    fn set(&mut self, id: u32, bound: f64) {
        self.bounds[id as usize] = bound;
    }
}

/// Traversal counters for one search.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SearchStats {
    /// Nodes fully expanded (all children examined).
    pub nodes_expanded: usize,
    /// Children discarded because their bound exceeded the threshold.
    pub nodes_pruned: usize,
    /// Leaf entries whose bound was computed.
    pub entries_tested: usize,
    /// Leaf entries discarded by the threshold.
    pub entries_pruned: usize,
    /// Entries yielded to the caller.
    pub yielded: usize,
}

enum Item<'a> {
    /// A node plus the index of its next unexamined child or entry.
    Node { node: &'a Node, cursor: usize },
    /// A leaf entry waiting to surface in bound order.
    Entry(&'a Entry),
}

struct Prioritized<'a> {
    bound: f64,
    /// Insertion sequence; makes equal-bound ordering deterministic (FIFO).
    seq: u64,
    item: Item<'a>,
}

impl PartialEq for Prioritized<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Prioritized<'_> {}

impl Ord for Prioritized<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Inverted: BinaryHeap is a max-heap, we want the smallest bound on
        // top, ties resolved oldest-first.
        other
            .bound
            .total_cmp(&self.bound)
            .then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Prioritized<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// What the inspection of the queue top decided, with the peek released.
enum Step<'a> {
    Yield(&'a Entry, f64),
    TestEntry(&'a Entry),
    TestChild(&'a Node),
    Advance,
    Stop,
}

/// Lazy best-first traversal of a frozen tree, pruned by a shared shrinking
/// threshold.
///
/// Yields `(entry, lower_bound)` pairs in non-decreasing lower-bound order;
/// every yielded entry satisfies `lower_bound <= threshold.get()` at yield
/// time. The iterator is re-enterable: each `next` call advances internal
/// state, and a call that returns `None` because the queue minimum exceeds
/// the threshold leaves the frontier intact.
///
/// Soundness: a node or entry bound never exceeds the true squared distance
/// of anything it summarizes, and the threshold only shrinks. So when the
/// queue minimum exceeds the threshold, every undiscovered entry's true
/// distance also exceeds it, so stopping never misses a qualifying entry.
pub struct BoundedSearch<'a> {
    query: &'a QuerySummary,
    threshold: &'a RunningThreshold,
    cache: &'a mut BoundCache,
    queue: BinaryHeap<Prioritized<'a>>,
    next_seq: u64,
    stats: SearchStats,
}

impl<'a> BoundedSearch<'a> {
    /// Start a search from the tree root.
    ///
    /// # Panics
    /// Panics if the query was summarized under a different layout than the
    /// tree was built with (dimensionality mismatch is a configuration
    /// error, surfaced before any traversal).
    pub fn new(
        tree: &'a Tree,
        query: &'a QuerySummary,
        threshold: &'a RunningThreshold,
        cache: &'a mut BoundCache,
    ) -> Self {
        assert_eq!(
            query.layout,
            *tree.layout(),
            "Query layout {:?} does not match the index layout {:?}",
            query.layout,
            tree.layout()
        );
        assert!(
            cache.bounds.len() >= tree.node_count() as usize,
            "Bound cache built for a different tree"
        );

        let mut queue = BinaryHeap::new();
        if let Some(root) = tree.root() {
            // The root enters with priority 0: it is never pruned against a
            // non-negative threshold, and its true bound is paid lazily.
            queue.push(Prioritized {
                bound: 0.0,
                seq: 0,
                item: Item::Node {
                    node: root,
                    cursor: 0,
                },
            });
        }
        Self {
            query,
            threshold,
            cache,
            queue,
            next_seq: 1,
            stats: SearchStats::default(),
        }
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    fn push(&mut self, bound: f64, item: Item<'a>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Prioritized { bound, seq, item });
    }

    /// Inspect the queue top and either consume it or advance its cursor.
    fn inspect(&mut self) -> Option<Step<'a>> {
        let threshold = self.threshold.get();
        let mut top = self.queue.peek_mut()?;
        if top.bound > threshold {
            // Queue order is monotone in the bound: everything still queued
            // is at least this far. Leave the frontier for a later call.
            return Some(Step::Stop);
        }
        let bound = top.bound;

        // `pop` decided while the item borrow is live; applied after it ends.
        let (step, pop) = match &mut top.item {
            Item::Entry(entry) => (Step::Yield(*entry, bound), true),
            Item::Node { node, cursor } => {
                // Copy the long-lived node reference out of the queue slot so
                // the returned step is not tied to this peek.
                let node: &'a Node = *node;
                match node {
                    Node::Leaf { entries, .. } => {
                        if *cursor < entries.len() {
                            let entry = &entries[*cursor];
                            *cursor += 1;
                            (Step::TestEntry(entry), false)
                        } else {
                            (Step::Advance, true)
                        }
                    }
                    Node::NonLeaf { children, .. } => {
                        if *cursor < children.len() {
                            let child = &children[*cursor];
                            *cursor += 1;
                            (Step::TestChild(child), false)
                        } else {
                            (Step::Advance, true)
                        }
                    }
                }
            }
        };
        if pop {
            let _ = PeekMut::pop(top);
        }
        Some(step)
    }
}

impl<'a> Iterator for BoundedSearch<'a> {
    type Item = (&'a Entry, f64);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inspect()? {
                Step::Stop => return None,
                Step::Yield(entry, bound) => {
                    self.stats.yielded += 1;
                    return Some((entry, bound));
                }
                Step::Advance => {
                    self.stats.nodes_expanded += 1;
                }
                Step::TestEntry(entry) => {
                    self.stats.entries_tested += 1;
                    let bound = entry.mbr.total_lower_bound(self.query);
                    // Other entries of the same leaf may still qualify, so a
                    // pruned entry does not discard its leaf.
                    if bound <= self.threshold.get() {
                        self.push(bound, Item::Entry(entry));
                    } else {
                        self.stats.entries_pruned += 1;
                    }
                }
                Step::TestChild(child) => {
                    let bound = match self.cache.get(child.id()) {
                        Some(b) => b,
                        None => {
                            let b = child.mbr().total_lower_bound(self.query);
                            self.cache.set(child.id(), b);
                            b
                        }
                    };
                    if bound <= self.threshold.get() {
                        self.push(
                            bound,
                            Item::Node {
                                node: child,
                                cursor: 0,
                            },
                        );
                    } else {
                        self.stats.nodes_pruned += 1;
                    }
                }
            }
        }
    }
}
