use std::collections::HashSet;

use crate::core::segment::{coalesce, Segment};
use crate::core::threshold::RunningThreshold;
use crate::core::topk::{Neighbor, TopKHeap};
use crate::index::geometry::QuerySummary;
use crate::index::node::Tree;
use crate::index::search::{BoundCache, BoundedSearch, SearchStats};
use crate::oracle::mass::DistanceOracle;

/// Survivor segments buffered between oracle calls in the exact pass.
/// Batching amortizes per-call overhead while still letting the oracle
/// tighten the shared threshold mid-traversal.
const VERIFY_BATCH: usize = 64;

/// Diagnostics for one two-pass query.
#[derive(Debug, Default, Clone)]
pub struct QueryReport {
    pub pass1: SearchStats,
    pub pass2: SearchStats,
    /// Candidate segments seeding the threshold in the approximate pass.
    pub seeds: usize,
    /// Coalesced segment runs handed to the oracle (both passes).
    pub verified_runs: usize,
    /// Total subsequence offsets the oracle evaluated exactly.
    pub verified_offsets: usize,
}

/// Exact top-k nearest subsequences by two bounded searches around the
/// exact-distance oracle.
///
/// Pass 1 (approximate) runs unbounded and takes the first `k` entries; the
/// search yields in ascending lower-bound order, so these are the k most
/// promising segments. The oracle turns them into true distances; the k-th
/// of those is a realized upper bound on the true k-th neighbor distance.
///
/// Pass 2 (exact) re-runs the search with the shared threshold seeded at
/// that bound and verifies every surviving segment. The threshold keeps
/// shrinking as the oracle confirms better distances, and the in-flight
/// search observes each tightened value. That stays sound: the bound of
/// anything pruned still exceeds a realized distance. By bound soundness the
/// survivors are a superset of the true top-k, so the heap's final content
/// is exact.
///
/// Ties at the k-th distance resolve by `(series, offset)` so results are
/// deterministic.
///
/// # Panics
/// Panics if `k == 0` or the query layout does not match the tree.
pub fn knn<O: DistanceOracle>(
    tree: &Tree,
    query: &QuerySummary,
    oracle: &O,
    k: usize,
) -> (Vec<Neighbor>, QueryReport) {
    assert!(k >= 1, "k must be >= 1");

    let mut report = QueryReport::default();
    let mut cache = BoundCache::for_tree(tree);
    let topk = TopKHeap::new(k);
    // Shared by pass 2 and the oracle; pass-1 verification seeds it.
    let threshold = RunningThreshold::unbounded();

    // Pass 1: approximate. The unbounded threshold never prunes; the pass
    // ends as soon as k candidate segments surfaced.
    let mut seeds: Vec<Segment> = Vec::with_capacity(k);
    let mut seen: HashSet<Segment> = HashSet::with_capacity(k * 2);
    {
        let pass1_threshold = RunningThreshold::unbounded();
        let mut search = BoundedSearch::new(tree, query, &pass1_threshold, &mut cache);
        for (entry, _) in search.by_ref() {
            seeds.push(entry.segment);
            seen.insert(entry.segment);
            if seeds.len() == k {
                break;
            }
        }
        report.pass1 = search.stats().clone();
    }
    report.seeds = seeds.len();

    let seed_runs = coalesce(seeds);
    report.verified_runs += seed_runs.len();
    report.verified_offsets += seed_runs.iter().map(Segment::len).sum::<usize>();
    oracle.verify(&seed_runs, &topk, &threshold);

    // Pass 2: exact, against the live shared threshold.
    {
        let mut search = BoundedSearch::new(tree, query, &threshold, &mut cache);
        let mut batch: Vec<Segment> = Vec::with_capacity(VERIFY_BATCH);
        loop {
            let next = search.next();
            if let Some((entry, _)) = next {
                if seen.contains(&entry.segment) {
                    continue;
                }
                batch.push(entry.segment);
            }
            if batch.len() >= VERIFY_BATCH || (next.is_none() && !batch.is_empty()) {
                let runs = coalesce(std::mem::take(&mut batch));
                report.verified_runs += runs.len();
                report.verified_offsets += runs.iter().map(Segment::len).sum::<usize>();
                oracle.verify(&runs, &topk, &threshold);
            }
            if next.is_none() {
                break;
            }
        }
        report.pass2 = search.stats().clone();
    }

    (topk.into_sorted(), report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IndexConfig;
    use crate::core::segment::Segment;
    use crate::index::bulk::bulk_load;
    use crate::index::geometry::Mbr;
    use crate::index::node::Entry;
    use crate::transform::dft::SpectralLayout;

    /// Oracle over a closed-form distance: offset `o` of series `s` has true
    /// squared distance `table(s, o)`. The tree below stores each offset's
    /// coefficient point so that the geometry bound genuinely lower-bounds
    /// the table.
    struct TableOracle;

    fn true_dist_sq(series: usize, offset: usize) -> f64 {
        // Base: the coefficient point's distance to the origin (see
        // `entries()`), plus a residual the geometry cannot see.
        let (x, y) = point_for(series, offset);
        let residual = ((series * 31 + offset * 7) % 5) as f64 * 0.1;
        (x * x + y * y) / 2.0 + residual
    }

    fn point_for(series: usize, offset: usize) -> (f64, f64) {
        let t = (series * 97 + offset) as f64 * 0.71;
        let r = ((series * 53 + offset * 13) % 29) as f64 * 0.4;
        (r * t.cos(), r * t.sin())
    }

    impl DistanceOracle for TableOracle {
        fn verify(&self, segments: &[Segment], topk: &TopKHeap, threshold: &RunningThreshold) {
            for seg in segments {
                for o in seg.start..=seg.end {
                    topk.insert(true_dist_sq(seg.series, o), seg.series, o);
                }
                threshold.shrink(topk.kth_dist_sq());
            }
        }
    }

    fn layout_2d() -> SpectralLayout {
        SpectralLayout::new(1, 1, 2)
    }

    fn build_tree(n_series: usize, offsets_per_series: usize, segment_len: usize) -> Tree {
        let mut entries = Vec::new();
        for s in 0..n_series {
            let mut start = 0;
            while start < offsets_per_series {
                let end = (start + segment_len - 1).min(offsets_per_series - 1);
                let (x0, y0) = point_for(s, start);
                let mut mbr = Mbr::from_point(&[x0, y0], None);
                for o in start + 1..=end {
                    let (x, y) = point_for(s, o);
                    mbr.expand_point(&[x, y], None);
                }
                entries.push(Entry::new(Segment::new(s, start, end), mbr));
                start = end + 1;
            }
        }
        let mut config = IndexConfig::new(8);
        config.coeffs = 1;
        config.leaf_size = 4;
        config.min_children = 2;
        config.max_children = 4;
        let (tree, _) = bulk_load(entries, &config, layout_2d());
        tree
    }

    fn brute_topk(n_series: usize, offsets: usize, k: usize) -> Vec<(usize, usize, f64)> {
        let mut all: Vec<(usize, usize, f64)> = (0..n_series)
            .flat_map(|s| (0..offsets).map(move |o| (s, o, true_dist_sq(s, o))))
            .collect();
        all.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));
        all.truncate(k);
        all
    }

    fn origin_query() -> QuerySummary {
        QuerySummary::new(layout_2d(), vec![0.0, 0.0], None)
    }

    #[test]
    fn test_two_pass_matches_brute_force() {
        let tree = build_tree(6, 40, 4);
        let query = origin_query();
        for k in [1, 5, 10, 25] {
            let (got, _) = knn(&tree, &query, &TableOracle, k);
            let expected = brute_topk(6, 40, k);
            assert_eq!(got.len(), k, "k={k}");
            for (n, (s, o, d_sq)) in got.iter().zip(expected.iter()) {
                assert_eq!((n.series, n.offset), (*s, *o), "k={k}");
                assert!((n.distance - d_sq.sqrt()).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_no_duplicate_results() {
        let tree = build_tree(4, 32, 4);
        let (got, _) = knn(&tree, &origin_query(), &TableOracle, 20);
        let mut ids: Vec<(usize, usize)> = got.iter().map(|n| (n.series, n.offset)).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), got.len(), "Pass-1 seeds were re-verified");
    }

    #[test]
    fn test_k_larger_than_population_returns_all() {
        let tree = build_tree(2, 6, 3);
        let (got, _) = knn(&tree, &origin_query(), &TableOracle, 100);
        assert_eq!(got.len(), 12, "All offsets, no more");
        for w in got.windows(2) {
            assert!(w[0].distance <= w[1].distance + 1e-12);
        }
    }

    #[test]
    fn test_empty_tree_returns_nothing() {
        let (tree, _) = bulk_load(vec![], &IndexConfig::new(8), layout_2d());
        let (got, report) = knn(&tree, &origin_query(), &TableOracle, 3);
        assert!(got.is_empty());
        assert_eq!(report.verified_offsets, 0);
    }

    #[test]
    #[should_panic(expected = "k must be >= 1")]
    fn test_zero_k_rejected() {
        let tree = build_tree(1, 8, 4);
        let _ = knn(&tree, &origin_query(), &TableOracle, 0);
    }

    #[test]
    fn test_pass2_prunes_with_tightened_threshold() {
        let tree = build_tree(8, 64, 4);
        let (_, report) = knn(&tree, &origin_query(), &TableOracle, 3);
        let total_offsets = 8 * 64;
        assert!(
            report.verified_offsets < total_offsets,
            "Exact pass verified everything ({} of {total_offsets}); the \
             threshold never pruned",
            report.verified_offsets
        );
        assert!(report.pass2.nodes_pruned + report.pass2.entries_pruned > 0);
    }
}
