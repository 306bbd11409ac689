use crate::core::dataset::{Dataset, RollingStats};
use crate::core::segment::Segment;
use crate::core::threshold::RunningThreshold;
use crate::core::topk::{Neighbor, TopKHeap};
use crate::oracle::sdp::sliding_dot_product;

/// Minimum total offsets in a verification batch before the segments are
/// fanned out across threads.
#[cfg(feature = "parallel")]
const MIN_PARALLEL_OFFSETS: usize = 1024;

/// The exact-distance seam of the engine.
///
/// Static polymorphism, like the metric seam in matrix-profile engines: the
/// query pipeline is generic over the oracle so tests can substitute a
/// reference implementation. Contract: for every offset covered by every
/// segment, compute the true squared distance to the query and offer it to
/// the shared top-k heap; afterwards shrink the shared threshold to the
/// heap's current k-th distance. The oracle must never report a distance
/// below the true one; the search bound soundness leans on the heap only
/// ever holding realized distances.
pub trait DistanceOracle: Sync {
    fn verify(&self, segments: &[Segment], topk: &TopKHeap, threshold: &RunningThreshold);
}

/// MASS-backed oracle: per channel, the z-normalized distance profile over a
/// segment's offsets comes from one sliding dot product (FFT-batched for
/// large slices) and the correlation form
/// `d^2 = 2m * (1 - (QT - m*mu_q*mu_i) / (m*sigma_q*sigma_i))`;
/// channels add in the squared domain.
pub struct MassOracle<'a> {
    dataset: &'a Dataset,
    stats: &'a [Vec<RollingStats>],
    query: &'a [Vec<f64>],
    q_mu: Vec<f64>,
    q_sigma: Vec<f64>,
    window: usize,
}

impl<'a> MassOracle<'a> {
    /// # Panics
    /// Panics if the query channel count does not match the dataset, the
    /// channels have unequal lengths, or the query is empty.
    pub fn new(dataset: &'a Dataset, stats: &'a [Vec<RollingStats>], query: &'a [Vec<f64>]) -> Self {
        assert_eq!(
            query.len(),
            dataset.n_channels(),
            "Query has {} channels, dataset has {}",
            query.len(),
            dataset.n_channels()
        );
        let window = query[0].len();
        assert!(window > 0, "Query window must be non-empty");
        for (i, ch) in query.iter().enumerate() {
            assert_eq!(
                ch.len(),
                window,
                "Query channel {i} has length {}, expected {window}",
                ch.len()
            );
        }

        let m_f = window as f64;
        let mut q_mu = Vec::with_capacity(query.len());
        let mut q_sigma = Vec::with_capacity(query.len());
        for ch in query {
            let mu = ch.iter().sum::<f64>() / m_f;
            let sum_sq = ch.iter().map(|x| x * x).sum::<f64>();
            let var = (sum_sq / m_f - mu * mu).max(0.0);
            q_mu.push(mu);
            q_sigma.push(var.sqrt());
        }

        Self {
            dataset,
            stats,
            query,
            q_mu,
            q_sigma,
            window,
        }
    }

    /// True squared distances (summed over channels) for every offset of one
    /// segment.
    ///
    /// # Panics
    /// Panics if the segment range runs past the series.
    pub fn segment_distances_sq(&self, segment: &Segment) -> Vec<f64> {
        let series = self.dataset.series(segment.series);
        let m = self.window;
        let n_subs = series.n_subsequences(m);
        assert!(
            segment.end < n_subs,
            "Segment {segment:?} runs past the {n_subs} subsequences of its series"
        );

        let n_offsets = segment.len();
        let mut total = vec![0.0; n_offsets];
        let m_f = m as f64;
        let two_m = 2.0 * m_f;

        for ch in 0..series.n_channels() {
            let ts = series.channel(ch);
            let ch_stats = &self.stats[segment.series][ch];
            let q_sigma = self.q_sigma[ch];
            let q_mu = self.q_mu[ch];
            // Slice covering windows for offsets start..=end only.
            let slice = &ts[segment.start..segment.end + m];
            let qt = sliding_dot_product(&self.query[ch], slice);
            debug_assert_eq!(qt.len(), n_offsets);

            if q_sigma < 1e-15 {
                for (local, acc) in total.iter_mut().enumerate() {
                    let g = segment.start + local;
                    // Both constant: identical after z-normalization.
                    if ch_stats.sigma_inv[g] != 0.0 {
                        *acc += two_m;
                    }
                }
            } else {
                let q_sigma_inv = 1.0 / q_sigma;
                for (local, acc) in total.iter_mut().enumerate() {
                    let g = segment.start + local;
                    let sigma_inv = ch_stats.sigma_inv[g];
                    if sigma_inv == 0.0 {
                        *acc += two_m;
                    } else {
                        let r = (qt[local] - m_f * q_mu * ch_stats.mean[g])
                            * (sigma_inv * q_sigma_inv / m_f);
                        *acc += (two_m * (1.0 - r.clamp(-1.0, 1.0))).max(0.0);
                    }
                }
            }
        }
        total
    }

    fn verify_one(&self, segment: &Segment, topk: &TopKHeap, threshold: &RunningThreshold) {
        let dists = self.segment_distances_sq(segment);
        for (local, &d_sq) in dists.iter().enumerate() {
            topk.insert(d_sq, segment.series, segment.start + local);
        }
        threshold.shrink(topk.kth_dist_sq());
    }
}

impl DistanceOracle for MassOracle<'_> {
    fn verify(&self, segments: &[Segment], topk: &TopKHeap, threshold: &RunningThreshold) {
        #[cfg(feature = "parallel")]
        {
            let total: usize = segments.iter().map(Segment::len).sum();
            if segments.len() >= 2 && total >= MIN_PARALLEL_OFFSETS {
                use rayon::prelude::*;
                segments
                    .par_iter()
                    .for_each(|seg| self.verify_one(seg, topk, threshold));
                return;
            }
        }
        for seg in segments {
            self.verify_one(seg, topk, threshold);
        }
    }
}

/// Ground-truth scan: verify every subsequence of every series.
///
/// The engine's correctness self-check and the tests both compare against
/// this.
///
/// # Panics
/// Panics if `k == 0` or the query shape does not match the dataset.
pub fn brute_force_knn(
    dataset: &Dataset,
    stats: &[Vec<RollingStats>],
    query: &[Vec<f64>],
    k: usize,
) -> Vec<Neighbor> {
    assert!(k >= 1, "k must be >= 1");
    let oracle = MassOracle::new(dataset, stats, query);
    let m = oracle.window;
    let segments: Vec<Segment> = (0..dataset.n_series())
        .filter_map(|s| {
            let n_subs = dataset.series(s).n_subsequences(m);
            (n_subs > 0).then(|| Segment::new(s, 0, n_subs - 1))
        })
        .collect();
    let topk = TopKHeap::new(k);
    let threshold = RunningThreshold::unbounded();
    oracle.verify(&segments, &topk, &threshold);
    topk.into_sorted()
}
