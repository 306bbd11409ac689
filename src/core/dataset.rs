/// Rolling mean and standard deviation for all subsequences of length `m`.
///
/// Computed in a single pass over cumulative sums and sums-of-squares. The
/// precomputed `1/sigma` column lets the oracle and the summarizer replace
/// division with multiplication in their inner loops; it is zero for
/// constant subsequences (sigma == 0), which z-normalize to the zero vector.
#[derive(Debug, Clone)]
pub struct RollingStats {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    /// `1 / sigma` per subsequence, or 0.0 where sigma vanishes.
    pub sigma_inv: Vec<f64>,
    /// Whether any subsequence is constant.
    pub has_constant: bool,
}

impl RollingStats {
    /// Compute rolling statistics for all length-`m` subsequences of `ts`.
    ///
    /// # Panics
    /// Panics if `m == 0` or `ts.len() < m`.
    pub fn compute(ts: &[f64], m: usize) -> Self {
        assert!(m > 0, "Subsequence length must be > 0");
        assert!(ts.len() >= m, "Time series must be at least as long as m");

        let n = ts.len();
        let n_subs = n - m + 1;

        let mut cumsum = vec![0.0; n + 1];
        let mut cumsum_sq = vec![0.0; n + 1];
        for i in 0..n {
            cumsum[i + 1] = cumsum[i] + ts[i];
            cumsum_sq[i + 1] = cumsum_sq[i] + ts[i] * ts[i];
        }

        let mut mean = vec![0.0; n_subs];
        let mut std = vec![0.0; n_subs];
        let mut sigma_inv = vec![0.0; n_subs];
        let mut has_constant = false;

        let m_f = m as f64;
        for i in 0..n_subs {
            let sum = cumsum[i + m] - cumsum[i];
            let sum_sq = cumsum_sq[i + m] - cumsum_sq[i];
            let mu = sum / m_f;
            // Variance via E[X^2] - E[X]^2, clamped for numerical stability.
            let var = (sum_sq / m_f - mu * mu).max(0.0);
            let sigma = var.sqrt();
            mean[i] = mu;
            std[i] = sigma;
            if sigma < 1e-15 {
                sigma_inv[i] = 0.0;
                has_constant = true;
            } else {
                sigma_inv[i] = 1.0 / sigma;
            }
        }

        Self {
            mean,
            std,
            sigma_inv,
            has_constant,
        }
    }

    /// Number of subsequences covered.
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }
}

/// One multivariate time series: `channels` co-evolving signals of equal
/// length.
#[derive(Debug, Clone)]
pub struct Series {
    channels: Vec<Vec<f64>>,
}

impl Series {
    /// # Panics
    /// Panics if `channels` is empty or the channels have unequal lengths.
    pub fn new(channels: Vec<Vec<f64>>) -> Self {
        assert!(!channels.is_empty(), "Series needs at least one channel");
        let n = channels[0].len();
        for (i, ch) in channels.iter().enumerate() {
            assert_eq!(
                ch.len(),
                n,
                "Channel {i} has length {}, expected {n}",
                ch.len()
            );
        }
        Self { channels }
    }

    /// Convenience constructor for a univariate series.
    pub fn univariate(values: Vec<f64>) -> Self {
        Self::new(vec![values])
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    /// Length of every channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self, c: usize) -> &[f64] {
        &self.channels[c]
    }

    /// Number of length-`m` subsequences, or 0 if the series is too short.
    pub fn n_subsequences(&self, m: usize) -> usize {
        (self.len() + 1).saturating_sub(m)
    }
}

/// A collection of multivariate series sharing one channel count.
///
/// Frozen once handed to the engine: all query-time access is through shared
/// references, which is what makes lock-free concurrent searches safe.
#[derive(Debug, Clone)]
pub struct Dataset {
    series: Vec<Series>,
}

impl Dataset {
    /// # Panics
    /// Panics if `series` is empty or channel counts disagree.
    pub fn new(series: Vec<Series>) -> Self {
        assert!(!series.is_empty(), "Dataset needs at least one series");
        let channels = series[0].n_channels();
        for (i, s) in series.iter().enumerate() {
            assert_eq!(
                s.n_channels(),
                channels,
                "Series {i} has {} channels, expected {channels}",
                s.n_channels()
            );
        }
        Self { series }
    }

    pub fn n_series(&self) -> usize {
        self.series.len()
    }

    pub fn n_channels(&self) -> usize {
        self.series[0].n_channels()
    }

    pub fn series(&self, idx: usize) -> &Series {
        &self.series[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Series> {
        self.series.iter()
    }

    /// Total number of length-`m` subsequences across all series.
    pub fn total_subsequences(&self, m: usize) -> usize {
        self.series.iter().map(|s| s.n_subsequences(m)).sum()
    }

    /// Rolling statistics for every `(series, channel)` pair. Series shorter
    /// than `m` contribute empty placeholders.
    pub fn rolling_stats(&self, m: usize) -> Vec<Vec<RollingStats>> {
        self.series
            .iter()
            .map(|s| {
                (0..s.n_channels())
                    .map(|c| {
                        if s.len() >= m {
                            RollingStats::compute(s.channel(c), m)
                        } else {
                            RollingStats {
                                mean: vec![],
                                std: vec![],
                                sigma_inv: vec![],
                                has_constant: false,
                            }
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_stats_simple() {
        // ts = [1..5], m = 3: means 2,3,4; stds all sqrt(2/3).
        let ts = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let stats = RollingStats::compute(&ts, 3);
        assert_eq!(stats.len(), 3);
        assert!((stats.mean[0] - 2.0).abs() < 1e-10);
        assert!((stats.mean[1] - 3.0).abs() < 1e-10);
        assert!((stats.mean[2] - 4.0).abs() < 1e-10);
        let expected_std = (2.0_f64 / 3.0).sqrt();
        for s in &stats.std {
            assert!((s - expected_std).abs() < 1e-10);
        }
        assert!(!stats.has_constant);
    }

    #[test]
    fn test_rolling_stats_constant() {
        let ts = vec![5.0; 10];
        let stats = RollingStats::compute(&ts, 4);
        assert!(stats.has_constant);
        for (s, inv) in stats.std.iter().zip(stats.sigma_inv.iter()) {
            assert!(*s < 1e-10);
            assert_eq!(*inv, 0.0);
        }
    }

    #[test]
    fn test_series_shape_checks() {
        let s = Series::new(vec![vec![0.0; 8], vec![1.0; 8]]);
        assert_eq!(s.n_channels(), 2);
        assert_eq!(s.len(), 8);
        assert_eq!(s.n_subsequences(4), 5);
        assert_eq!(s.n_subsequences(9), 0);
    }

    #[test]
    #[should_panic(expected = "expected 3")]
    fn test_series_rejects_ragged_channels() {
        let _ = Series::new(vec![vec![0.0; 3], vec![0.0; 4]]);
    }

    #[test]
    fn test_dataset_totals() {
        let d = Dataset::new(vec![
            Series::univariate((0..10).map(|i| i as f64).collect()),
            Series::univariate((0..6).map(|i| i as f64).collect()),
        ]);
        assert_eq!(d.total_subsequences(4), 7 + 3);
        assert_eq!(d.n_channels(), 1);
    }
}
