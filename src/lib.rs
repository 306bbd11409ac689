pub mod core;
pub mod index;
pub mod oracle;
pub mod transform;

pub use crate::core::config::{IndexConfig, SplitPolicy};
pub use crate::core::dataset::{Dataset, RollingStats, Series};
pub use crate::core::segment::Segment;
pub use crate::core::threshold::RunningThreshold;
pub use crate::core::topk::{Neighbor, TopKHeap};
pub use crate::index::bulk::{bulk_load, BuildReport};
pub use crate::index::geometry::{DistanceBound, Mbr, QuerySummary};
pub use crate::index::node::{Entry, Node, Tree};
pub use crate::index::query::{knn, QueryReport};
pub use crate::index::search::{BoundCache, BoundedSearch, SearchStats};
pub use crate::oracle::mass::{brute_force_knn, DistanceOracle, MassOracle};
pub use crate::transform::dft::SpectralLayout;
pub use crate::transform::landmarks::Landmarks;
pub use crate::transform::segmentation::build_entries;

use crate::transform::dft::{window_spectrum, znormalize};

/// High-level facade: summarize a dataset once, answer exact k-NN
/// subsequence queries many times.
///
/// # Examples
///
/// ```
/// use simsearch_rs::{Dataset, IndexConfig, SearchEngine, Series};
///
/// let dataset = Dataset::new(vec![
///     Series::univariate((0..96).map(|i| (i as f64 * 0.4).sin()).collect()),
///     Series::univariate((0..96).map(|i| (i as f64 * 0.9).cos()).collect()),
/// ]);
/// let engine = SearchEngine::build(dataset, IndexConfig::new(8));
///
/// let query = vec![(0..8).map(|i| (i as f64 * 0.4).sin()).collect::<Vec<f64>>()];
/// let neighbors = engine.knn(&query, 3);
/// assert_eq!(neighbors.len(), 3);
/// assert!(neighbors[0].distance < 1e-6, "The query appears verbatim");
/// ```
pub struct SearchEngine {
    dataset: Dataset,
    stats: Vec<Vec<RollingStats>>,
    landmarks: Option<Landmarks>,
    tree: Tree,
    report: BuildReport,
}

impl SearchEngine {
    /// Summarize the dataset, fit landmarks (if configured), and bulk-load
    /// the index.
    ///
    /// # Panics
    /// Panics if the configuration is inconsistent (see
    /// [`IndexConfig::validate`]).
    pub fn build(dataset: Dataset, config: IndexConfig) -> Self {
        config.validate();
        let layout = SpectralLayout::new(dataset.n_channels(), config.coeffs, config.window);
        let stats = dataset.rolling_stats(config.window);

        let landmarks = if config.landmarks > 0 {
            Landmarks::fit(
                &dataset,
                &stats,
                &layout,
                config.landmarks,
                config.landmark_sample,
            )
        } else {
            None
        };

        let entries = build_entries(&dataset, &stats, &layout, &config, landmarks.as_ref());
        let (tree, report) = bulk_load(entries, &config, layout);

        Self {
            dataset,
            stats,
            landmarks,
            tree,
            report,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn build_report(&self) -> &BuildReport {
        &self.report
    }

    pub fn landmarks(&self) -> Option<&Landmarks> {
        self.landmarks.as_ref()
    }

    /// Transform a raw multi-channel query window into the index's
    /// coefficient space (and landmark distances, when enabled).
    ///
    /// # Panics
    /// Panics if the channel count or window length disagree with the
    /// index; a query built against the wrong configuration fails here,
    /// before any traversal.
    pub fn summarize(&self, query: &[Vec<f64>]) -> QuerySummary {
        let layout = *self.tree.layout();
        assert_eq!(
            query.len(),
            layout.channels,
            "Query has {} channels, index was built with {}",
            query.len(),
            layout.channels
        );

        let mut point = Vec::with_capacity(layout.dims());
        let mut landmark_dists = self.landmarks.as_ref().map(|_| Vec::new());
        for (ch, window) in query.iter().enumerate() {
            let coeffs = window_spectrum(window, &layout);
            if let (Some(lm), Some(dists)) = (&self.landmarks, &mut landmark_dists) {
                let znorm = znormalize(window);
                let constant = znorm.iter().all(|&v| v == 0.0);
                let residual_sq = layout.residual_energy(&coeffs, constant);
                dists.push(lm.query_dists(ch, &znorm, residual_sq));
            }
            point.extend_from_slice(&coeffs);
        }
        QuerySummary::new(layout, point, landmark_dists)
    }

    /// Exact top-k nearest subsequences to `query` (one `Vec<f64>` of window
    /// length per channel), sorted ascending by distance.
    ///
    /// # Panics
    /// Panics if `k == 0` or the query shape does not match the index.
    pub fn knn(&self, query: &[Vec<f64>], k: usize) -> Vec<Neighbor> {
        self.knn_with_report(query, k).0
    }

    /// Like [`Self::knn`], also returning traversal and verification
    /// diagnostics.
    pub fn knn_with_report(&self, query: &[Vec<f64>], k: usize) -> (Vec<Neighbor>, QueryReport) {
        let summary = self.summarize(query);
        let oracle = MassOracle::new(&self.dataset, &self.stats, query);
        knn(&self.tree, &summary, &oracle, k)
    }

    /// Correctness self-check: answer the query through the index and
    /// through the brute-force scan, and compare.
    ///
    /// Both paths share the oracle's distance computation and tie order, so
    /// agreement is exact.
    pub fn self_check(&self, query: &[Vec<f64>], k: usize) -> bool {
        let indexed = self.knn(query, k);
        let scanned = brute_force_knn(&self.dataset, &self.stats, query, k);
        indexed.len() == scanned.len()
            && indexed.iter().zip(&scanned).all(|(a, b)| {
                (a.series, a.offset) == (b.series, b.offset)
                    && (a.distance - b.distance).abs() < 1e-9
            })
    }
}
