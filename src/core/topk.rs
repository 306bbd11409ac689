use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use crate::core::threshold::AtomicF64;

/// One verified subsequence match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the owning time series.
    pub series: usize,
    /// Subsequence-start offset within the series.
    pub offset: usize,
    /// Z-normalized Euclidean distance to the query (summed over channels).
    pub distance: f64,
}

/// Heap entry: squared distance plus identity for deterministic tie order.
#[derive(Debug, Clone, Copy)]
struct Hit {
    dist_sq: f64,
    series: usize,
    offset: usize,
}

impl Hit {
    #[inline]
    fn rank(&self) -> (f64, usize, usize) {
        (self.dist_sq, self.series, self.offset)
    }
}

impl PartialEq for Hit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Hit {}

impl Ord for Hit {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on (distance, series, offset): the worst retained hit sits
        // at the top, ties broken by candidate identity for determinism.
        let (d, s, o) = self.rank();
        let (od, os, oo) = other.rank();
        d.total_cmp(&od).then(s.cmp(&os)).then(o.cmp(&oo))
    }
}

impl PartialOrd for Hit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded top-k heap shared by all oracle workers of one query.
///
/// Retains the k smallest squared distances seen across all inserts, and
/// exposes the current k-th smallest as a monotonically non-increasing value
/// suitable for feeding a [`crate::core::threshold::RunningThreshold`].
///
/// Inserts take a mutex; the k-th bound is mirrored into an atomic so the
/// quick-reject path and concurrent readers never contend on the lock.
#[derive(Debug)]
pub struct TopKHeap {
    k: usize,
    heap: Mutex<BinaryHeap<Hit>>,
    kth: AtomicF64,
}

impl TopKHeap {
    /// # Panics
    /// Panics if `k == 0`.
    pub fn new(k: usize) -> Self {
        assert!(k >= 1, "k must be >= 1");
        Self {
            k,
            heap: Mutex::new(BinaryHeap::with_capacity(k + 1)),
            kth: AtomicF64::new(f64::INFINITY),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Current k-th smallest squared distance, or `+inf` while fewer than k
    /// hits have been inserted. Never increases.
    #[inline]
    pub fn kth_dist_sq(&self) -> f64 {
        self.kth.load()
    }

    /// Offer a candidate; kept only if it beats the current k-th hit.
    pub fn insert(&self, dist_sq: f64, series: usize, offset: usize) {
        let hit = Hit {
            dist_sq,
            series,
            offset,
        };
        // Lock-free reject for the common case of a hopeless candidate.
        if dist_sq > self.kth.load() {
            return;
        }

        let mut heap = self.heap.lock().expect("top-k heap poisoned");
        if heap.len() < self.k {
            heap.push(hit);
            if heap.len() == self.k {
                self.kth.store(heap.peek().map_or(f64::INFINITY, |h| h.dist_sq));
            }
            return;
        }
        // Full: replace the worst hit only if the candidate ranks before it.
        let worst = *heap.peek().expect("heap is full and non-empty");
        if hit.cmp(&worst) == Ordering::Less {
            heap.pop();
            heap.push(hit);
            self.kth.store(heap.peek().map_or(f64::INFINITY, |h| h.dist_sq));
        }
    }

    /// Number of hits currently retained (at most k).
    pub fn len(&self) -> usize {
        self.heap.lock().expect("top-k heap poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the heap, returning neighbors sorted ascending by distance
    /// (ties by series, then offset). Distances are de-squared here, at the
    /// API boundary.
    pub fn into_sorted(self) -> Vec<Neighbor> {
        let heap = self.heap.into_inner().expect("top-k heap poisoned");
        let mut hits = heap.into_vec();
        hits.sort_by(|a, b| a.cmp(b));
        hits.into_iter()
            .map(|h| Neighbor {
                series: h.series,
                offset: h.offset,
                distance: h.dist_sq.max(0.0).sqrt(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_retains_k_smallest() {
        let topk = TopKHeap::new(3);
        for (i, d) in [9.0, 1.0, 16.0, 4.0, 25.0, 0.25].iter().enumerate() {
            topk.insert(*d, 0, i);
        }
        let result = topk.into_sorted();
        let dists: Vec<f64> = result.iter().map(|n| n.distance).collect();
        assert_eq!(dists, vec![0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_kth_bound_monotone() {
        let topk = TopKHeap::new(2);
        assert_eq!(topk.kth_dist_sq(), f64::INFINITY);
        topk.insert(5.0, 0, 0);
        assert_eq!(topk.kth_dist_sq(), f64::INFINITY, "Not full yet");
        topk.insert(3.0, 0, 1);
        assert_eq!(topk.kth_dist_sq(), 5.0);
        topk.insert(1.0, 0, 2);
        assert_eq!(topk.kth_dist_sq(), 3.0);
        topk.insert(4.0, 0, 3);
        assert_eq!(topk.kth_dist_sq(), 3.0, "Worse candidate must not loosen");
    }

    #[test]
    fn test_tie_break_is_deterministic() {
        // Four candidates at the same distance: identity order decides.
        let topk = TopKHeap::new(2);
        topk.insert(1.0, 1, 50);
        topk.insert(1.0, 0, 9);
        topk.insert(1.0, 1, 2);
        topk.insert(1.0, 0, 70);
        let result = topk.into_sorted();
        assert_eq!(
            result.iter().map(|n| (n.series, n.offset)).collect::<Vec<_>>(),
            vec![(0, 9), (0, 70)]
        );
    }

    #[test]
    fn test_fewer_than_k() {
        let topk = TopKHeap::new(10);
        topk.insert(4.0, 0, 1);
        topk.insert(1.0, 2, 3);
        let result = topk.into_sorted();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].series, 2);
    }

    #[test]
    fn test_concurrent_inserts() {
        let topk = Arc::new(TopKHeap::new(8));
        let handles: Vec<_> = (0..4)
            .map(|tid| {
                let topk = Arc::clone(&topk);
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        let d = ((tid * 1000 + i) as f64).powi(2) % 7919.0;
                        topk.insert(d, tid, i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Recompute the expected 8 smallest serially.
        let mut all: Vec<(f64, usize, usize)> = (0..4)
            .flat_map(|tid| {
                (0..1000).map(move |i| (((tid * 1000 + i) as f64).powi(2) % 7919.0, tid, i))
            })
            .collect();
        all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let result = Arc::try_unwrap(topk).unwrap().into_sorted();
        assert_eq!(result.len(), 8);
        for (n, (d, s, o)) in result.iter().zip(all.iter()) {
            assert!((n.distance - d.sqrt()).abs() < 1e-12);
            assert_eq!((n.series, n.offset), (*s, *o));
        }
    }
}
