use realfft::RealFftPlanner;

use crate::core::dataset::{Dataset, RollingStats};
use crate::oracle::sdp::sliding_dot_product;
use crate::transform::dft::{znormalize, SpectralLayout};

/// Lloyd iterations per channel when fitting centroids.
const KMEANS_ITERS: usize = 20;

/// Cluster centroids over the residual band (the signal energy the retained
/// coefficients discard), one set per channel.
///
/// Centroids live in the residual subspace (averages of vectors whose
/// retained frequencies were zeroed), so they are orthogonal to the
/// retained band. That orthogonality is what allows residual-to-centroid
/// distances to be recovered from plain sliding dot products:
/// `d^2 = |r|^2 + |c|^2 - 2 * <z, c>` with `<r, c> = <z, c>`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Landmarks {
    layout: SpectralLayout,
    /// `[channel][cluster]` residual-space centroids of length `window`.
    centroids: Vec<Vec<Vec<f64>>>,
    /// `[channel][cluster]` squared centroid norms.
    norms_sq: Vec<Vec<f64>>,
}

impl Landmarks {
    /// Fit `n_clusters` centroids per channel from residual vectors sampled
    /// across the dataset (about `sample_per_series` per series, evenly
    /// strided). Returns `None` when no series is long enough to sample.
    ///
    /// Initialization is deterministic (evenly strided samples), so repeated
    /// fits of the same dataset agree.
    ///
    /// # Panics
    /// Panics if `n_clusters == 0`.
    pub fn fit(
        dataset: &Dataset,
        stats: &[Vec<RollingStats>],
        layout: &SpectralLayout,
        n_clusters: usize,
        sample_per_series: usize,
    ) -> Option<Self> {
        assert!(n_clusters >= 1, "Need at least one landmark cluster");
        let m = layout.window;
        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(m);
        let inverse = planner.plan_fft_inverse(m);

        let mut centroids = Vec::with_capacity(layout.channels);
        let mut norms_sq = Vec::with_capacity(layout.channels);

        for ch in 0..layout.channels {
            let mut samples: Vec<Vec<f64>> = Vec::new();
            for (series, series_stats) in dataset.iter().zip(stats.iter()) {
                let n_subs = series.n_subsequences(m);
                if n_subs == 0 {
                    continue;
                }
                let stride = (n_subs / sample_per_series.max(1)).max(1);
                let ts = series.channel(ch);
                let mut o = 0;
                while o < n_subs {
                    if series_stats[ch].sigma_inv[o] != 0.0 {
                        let znorm = znormalize(&ts[o..o + m]);
                        samples.push(residual_of(&znorm, layout, &*forward, &*inverse));
                    }
                    o += stride;
                }
            }
            if samples.is_empty() {
                return None;
            }
            let channel_centroids = lloyd(samples, n_clusters);
            norms_sq.push(
                channel_centroids
                    .iter()
                    .map(|c| c.iter().map(|x| x * x).sum())
                    .collect(),
            );
            centroids.push(channel_centroids);
        }

        Some(Self {
            layout: *layout,
            centroids,
            norms_sq,
        })
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids[0].len()
    }

    pub fn layout(&self) -> &SpectralLayout {
        &self.layout
    }

    /// Residual-to-centroid distances for every subsequence of one channel,
    /// flattened as `n_subs * n_clusters`.
    ///
    /// `residual_sq[o]` is the squared residual norm of offset `o` (from
    /// [`SpectralLayout::residual_energy`]); constant subsequences have a
    /// zero residual, whose distance to a centroid is the centroid's norm.
    pub fn channel_dists(
        &self,
        ch: usize,
        ts: &[f64],
        stats: &RollingStats,
        residual_sq: &[f64],
    ) -> Vec<f64> {
        let n_subs = stats.len();
        debug_assert_eq!(residual_sq.len(), n_subs);
        let k = self.n_clusters();
        let mut out = vec![0.0; n_subs * k];
        for (c, centroid) in self.centroids[ch].iter().enumerate() {
            let qt = sliding_dot_product(centroid, ts);
            let norm_sq = self.norms_sq[ch][c];
            for o in 0..n_subs {
                let inner = qt[o] * stats.sigma_inv[o];
                let d_sq = (residual_sq[o] + norm_sq - 2.0 * inner).max(0.0);
                out[o * k + c] = d_sq.sqrt();
            }
        }
        out
    }

    /// Residual-to-centroid distances of one standalone z-normalized window
    /// (query construction path).
    pub fn query_dists(&self, ch: usize, znorm: &[f64], residual_sq: f64) -> Vec<f64> {
        self.centroids[ch]
            .iter()
            .zip(&self.norms_sq[ch])
            .map(|(centroid, norm_sq)| {
                let inner: f64 = znorm.iter().zip(centroid).map(|(a, b)| a * b).sum();
                (residual_sq + norm_sq - 2.0 * inner).max(0.0).sqrt()
            })
            .collect()
    }
}

/// Project a z-normalized window onto the discarded frequency band: zero the
/// retained bins in the spectrum and transform back.
fn residual_of(
    znorm: &[f64],
    layout: &SpectralLayout,
    forward: &dyn realfft::RealToComplex<f64>,
    inverse: &dyn realfft::ComplexToReal<f64>,
) -> Vec<f64> {
    let m = layout.window;
    let mut input = znorm.to_vec();
    let mut spectrum = forward.make_output_vec();
    forward
        .process(&mut input, &mut spectrum)
        .expect("Forward FFT of a window-sized buffer");
    for bin in spectrum.iter_mut().take(layout.coeffs) {
        *bin = realfft::num_complex::Complex::new(0.0, 0.0);
    }
    let mut out = vec![0.0; m];
    inverse
        .process(&mut spectrum, &mut out)
        .expect("Inverse FFT of a window-sized buffer");
    // realfft leaves the inverse unnormalized.
    let scale = 1.0 / m as f64;
    for v in &mut out {
        *v *= scale;
    }
    out
}

/// Plain Lloyd's k-means with deterministic, evenly strided initialization.
/// Empty clusters keep their previous centroid.
fn lloyd(samples: Vec<Vec<f64>>, k: usize) -> Vec<Vec<f64>> {
    let k = k.min(samples.len());
    let dim = samples[0].len();
    let mut centroids: Vec<Vec<f64>> = (0..k)
        .map(|i| samples[i * samples.len() / k].clone())
        .collect();
    let mut assignment = vec![usize::MAX; samples.len()];

    for _ in 0..KMEANS_ITERS {
        let mut changed = false;
        for (s, sample) in samples.iter().enumerate() {
            let mut best = 0;
            let mut best_d = f64::INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let d: f64 = sample
                    .iter()
                    .zip(centroid)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                if d < best_d {
                    best_d = d;
                    best = c;
                }
            }
            if assignment[s] != best {
                assignment[s] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (s, sample) in samples.iter().enumerate() {
            let c = assignment[s];
            counts[c] += 1;
            for (acc, v) in sums[c].iter_mut().zip(sample) {
                *acc += v;
            }
        }
        for c in 0..k {
            if counts[c] > 0 {
                let inv = 1.0 / counts[c] as f64;
                for (dst, acc) in centroids[c].iter_mut().zip(&sums[c]) {
                    *dst = acc * inv;
                }
            }
        }
    }
    centroids
}
