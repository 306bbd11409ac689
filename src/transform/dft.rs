use std::f64::consts::TAU;

use crate::core::dataset::RollingStats;

/// How often the sliding DFT recurrence is re-anchored with a direct
/// transform. Bounds floating-point drift on long series.
const REFRESH_INTERVAL: usize = 1024;

/// Shape of the coefficient space: `channels` co-evolving signals, each
/// summarized by its first `coeffs` DFT coefficients (frequencies
/// `0..coeffs`) of the z-normalized length-`window` subsequence.
///
/// One coefficient-space point has `channels * coeffs * 2` axes, laid out as
/// `[ch0_f0_re, ch0_f0_im, ch0_f1_re, ..., ch1_f0_re, ...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpectralLayout {
    pub channels: usize,
    pub coeffs: usize,
    pub window: usize,
}

impl SpectralLayout {
    /// # Panics
    /// Panics if any dimension is zero or `coeffs` exceeds `window/2 + 1`.
    pub fn new(channels: usize, coeffs: usize, window: usize) -> Self {
        assert!(channels >= 1, "Need at least one channel");
        assert!(coeffs >= 1, "Need at least one retained coefficient");
        assert!(
            coeffs <= window / 2 + 1,
            "Cannot retain more than window/2 + 1 coefficients"
        );
        Self {
            channels,
            coeffs,
            window,
        }
    }

    /// Total number of coefficient-space axes.
    pub fn dims(&self) -> usize {
        self.channels * self.coeffs * 2
    }

    /// Number of axes contributed by one channel.
    pub fn channel_dims(&self) -> usize {
        self.coeffs * 2
    }

    /// Parseval weight of frequency `f`: the zero frequency and the Nyquist
    /// frequency appear once in the full spectrum, every other retained
    /// frequency stands for a conjugate pair and counts twice.
    #[inline]
    pub fn freq_weight(&self, f: usize) -> f64 {
        if f == 0 || 2 * f == self.window {
            1.0
        } else {
            2.0
        }
    }

    /// Parseval weight of coefficient-space axis `axis`.
    #[inline]
    pub fn axis_weight(&self, axis: usize) -> f64 {
        self.freq_weight((axis % self.channel_dims()) / 2)
    }

    /// `1 / window`: the Parseval scale between coefficient-space energy and
    /// time-domain squared distance.
    #[inline]
    pub fn inv_window(&self) -> f64 {
        1.0 / self.window as f64
    }

    /// Energy of the retained band for one channel's normalized coefficients,
    /// in time-domain units: `(1/m) * sum_f w_f * |Z_f|^2`.
    pub fn retained_energy(&self, channel_coeffs: &[f64]) -> f64 {
        debug_assert_eq!(channel_coeffs.len(), self.channel_dims());
        let mut energy = 0.0;
        for f in 0..self.coeffs {
            let re = channel_coeffs[2 * f];
            let im = channel_coeffs[2 * f + 1];
            energy += self.freq_weight(f) * (re * re + im * im);
        }
        energy * self.inv_window()
    }

    /// Squared norm of the residual (discarded frequencies) of one channel's
    /// z-normalized window: `m - retained_energy`, clamped at zero.
    ///
    /// `constant` marks a zero-variance window, whose z-normalized form (and
    /// therefore residual) is the zero vector.
    pub fn residual_energy(&self, channel_coeffs: &[f64], constant: bool) -> f64 {
        if constant {
            return 0.0;
        }
        (self.window as f64 - self.retained_energy(channel_coeffs)).max(0.0)
    }
}

/// Direct DFT of a raw window at frequencies `0..coeffs`, interleaved
/// `[re, im, ...]`. O(window * coeffs); used to anchor the sliding
/// recurrence and for one-off query windows.
pub(crate) fn direct_spectrum(window: &[f64], coeffs: usize) -> Vec<f64> {
    let m = window.len() as f64;
    let mut out = vec![0.0; coeffs * 2];
    for f in 0..coeffs {
        let step = TAU * f as f64 / m;
        let mut re = 0.0;
        let mut im = 0.0;
        for (t, &x) in window.iter().enumerate() {
            let theta = step * t as f64;
            re += x * theta.cos();
            im -= x * theta.sin();
        }
        out[2 * f] = re;
        out[2 * f + 1] = im;
    }
    out
}

/// Normalize a raw-window spectrum in place: scale by `1/sigma` and zero the
/// DC coefficient (exactly zero for a mean-subtracted window). A constant
/// window (`sigma_inv == 0`) normalizes to the zero point.
#[inline]
fn normalize_spectrum(raw: &mut [f64], sigma_inv: f64) {
    if sigma_inv == 0.0 {
        raw.fill(0.0);
        return;
    }
    for v in raw.iter_mut() {
        *v *= sigma_inv;
    }
    raw[0] = 0.0;
    raw[1] = 0.0;
}

/// Normalized coefficients of a single standalone window (query
/// construction path).
pub fn window_spectrum(window: &[f64], layout: &SpectralLayout) -> Vec<f64> {
    assert_eq!(
        window.len(),
        layout.window,
        "Query window length {} does not match the index window {}",
        window.len(),
        layout.window
    );
    let m_f = layout.window as f64;
    let mu = window.iter().sum::<f64>() / m_f;
    let sum_sq = window.iter().map(|x| x * x).sum::<f64>();
    let var = (sum_sq / m_f - mu * mu).max(0.0);
    let sigma = var.sqrt();
    let sigma_inv = if sigma < 1e-15 { 0.0 } else { 1.0 / sigma };

    let mut raw = direct_spectrum(window, layout.coeffs);
    normalize_spectrum(&mut raw, sigma_inv);
    raw
}

/// Z-normalize a standalone window; constant windows map to the zero vector.
pub fn znormalize(window: &[f64]) -> Vec<f64> {
    let m_f = window.len() as f64;
    let mu = window.iter().sum::<f64>() / m_f;
    let sum_sq = window.iter().map(|x| x * x).sum::<f64>();
    let var = (sum_sq / m_f - mu * mu).max(0.0);
    let sigma = var.sqrt();
    if sigma < 1e-15 {
        return vec![0.0; window.len()];
    }
    window.iter().map(|&x| (x - mu) / sigma).collect()
}

/// Normalized coefficient points for every subsequence of one channel,
/// returned as a flat `n_subs * (coeffs * 2)` array.
///
/// Uses the O(1)-per-offset sliding recurrence
/// `F_f(o+1) = (F_f(o) - x_o + x_{o+m}) * e^{i*2*pi*f/m}`
/// on the raw-window DFT (the dropped and admitted samples both enter as
/// reals; the rotation then re-phases the whole sum), re-anchored with a
/// direct transform every [`REFRESH_INTERVAL`] offsets.
///
/// # Panics
/// Panics if `ts.len() < layout.window` or `stats` does not cover `ts`.
pub fn channel_spectra(ts: &[f64], stats: &RollingStats, layout: &SpectralLayout) -> Vec<f64> {
    let m = layout.window;
    let c = layout.coeffs;
    assert!(ts.len() >= m, "Series shorter than the window");
    let n_subs = ts.len() - m + 1;
    assert_eq!(stats.len(), n_subs, "Rolling stats do not match the series");

    // Twiddle factors e^{i*2*pi*f/m} per retained frequency.
    let twiddle: Vec<(f64, f64)> = (0..c)
        .map(|f| {
            let theta = TAU * f as f64 / m as f64;
            (theta.cos(), theta.sin())
        })
        .collect();

    let stride = c * 2;
    let mut out = vec![0.0; n_subs * stride];
    let mut raw = direct_spectrum(&ts[0..m], c);

    for o in 0..n_subs {
        if o > 0 {
            if o % REFRESH_INTERVAL == 0 {
                raw = direct_spectrum(&ts[o..o + m], c);
            } else {
                let delta = ts[o + m - 1] - ts[o - 1];
                for (f, &(cos, sin)) in twiddle.iter().enumerate() {
                    let re = raw[2 * f] + delta;
                    let im = raw[2 * f + 1];
                    raw[2 * f] = re * cos - im * sin;
                    raw[2 * f + 1] = re * sin + im * cos;
                }
            }
        }
        let dst = &mut out[o * stride..(o + 1) * stride];
        dst.copy_from_slice(&raw);
        normalize_spectrum(dst, stats.sigma_inv[o]);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                (t * 0.37).sin() + 0.4 * (t * 1.93).cos() + 0.05 * t.sin() * (t * 0.11).cos()
            })
            .collect()
    }

    #[test]
    fn test_recurrence_matches_direct() {
        let layout = SpectralLayout::new(1, 4, 16);
        let ts = test_series(200);
        let stats = RollingStats::compute(&ts, 16);
        let spectra = channel_spectra(&ts, &stats, &layout);

        let stride = layout.channel_dims();
        for o in [0, 1, 7, 50, 123, 184] {
            let mut expected = direct_spectrum(&ts[o..o + 16], 4);
            normalize_spectrum(&mut expected, stats.sigma_inv[o]);
            for (axis, (a, b)) in spectra[o * stride..(o + 1) * stride]
                .iter()
                .zip(expected.iter())
                .enumerate()
            {
                assert!(
                    (a - b).abs() < 1e-8,
                    "Mismatch at offset {o}, axis {axis}: sliding={a}, direct={b}"
                );
            }
        }
    }

    #[test]
    fn test_dc_coefficient_is_zero() {
        let layout = SpectralLayout::new(1, 3, 8);
        let ts = test_series(64);
        let stats = RollingStats::compute(&ts, 8);
        let spectra = channel_spectra(&ts, &stats, &layout);
        let stride = layout.channel_dims();
        for o in 0..stats.len() {
            assert_eq!(spectra[o * stride], 0.0);
            assert_eq!(spectra[o * stride + 1], 0.0);
        }
    }

    #[test]
    fn test_constant_window_is_zero_point() {
        let layout = SpectralLayout::new(1, 3, 8);
        let mut ts = test_series(40);
        for v in ts.iter_mut().take(20).skip(4) {
            *v = 2.5;
        }
        let stats = RollingStats::compute(&ts, 8);
        let spectra = channel_spectra(&ts, &stats, &layout);
        let stride = layout.channel_dims();
        // Offsets 4..=12 cover only the constant stretch.
        for o in 4..=12 {
            assert_eq!(stats.sigma_inv[o], 0.0);
            assert!(spectra[o * stride..(o + 1) * stride].iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_retained_energy_bounded_by_window() {
        // For a z-normalized window, total spectral energy is exactly m, so
        // any retained band holds at most m and the residual is non-negative.
        let layout = SpectralLayout::new(1, 5, 16);
        let ts = test_series(100);
        let stats = RollingStats::compute(&ts, 16);
        let spectra = channel_spectra(&ts, &stats, &layout);
        let stride = layout.channel_dims();
        for o in 0..stats.len() {
            let ch = &spectra[o * stride..(o + 1) * stride];
            let retained = layout.retained_energy(ch);
            assert!(
                retained <= 16.0 + 1e-9,
                "Retained energy {retained} exceeds window at offset {o}"
            );
            assert!(layout.residual_energy(ch, stats.sigma_inv[o] == 0.0) >= 0.0);
        }
    }

    #[test]
    fn test_full_band_captures_everything() {
        // Retaining all window/2 + 1 frequencies leaves zero residual.
        let layout = SpectralLayout::new(1, 9, 16);
        let ts = test_series(60);
        let stats = RollingStats::compute(&ts, 16);
        let spectra = channel_spectra(&ts, &stats, &layout);
        let stride = layout.channel_dims();
        for o in 0..stats.len() {
            let ch = &spectra[o * stride..(o + 1) * stride];
            let residual = layout.residual_energy(ch, stats.sigma_inv[o] == 0.0);
            assert!(
                residual < 1e-8,
                "Full retained band should leave no residual, got {residual} at {o}"
            );
        }
    }

    #[test]
    fn test_window_spectrum_matches_channel_spectra() {
        let layout = SpectralLayout::new(1, 4, 16);
        let ts = test_series(80);
        let stats = RollingStats::compute(&ts, 16);
        let spectra = channel_spectra(&ts, &stats, &layout);
        let stride = layout.channel_dims();
        for o in [0, 13, 42, 64] {
            let single = window_spectrum(&ts[o..o + 16], &layout);
            for (a, b) in single.iter().zip(&spectra[o * stride..(o + 1) * stride]) {
                assert!((a - b).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn test_parseval_weights() {
        let layout = SpectralLayout::new(2, 5, 8);
        assert_eq!(layout.freq_weight(0), 1.0);
        assert_eq!(layout.freq_weight(1), 2.0);
        assert_eq!(layout.freq_weight(3), 2.0);
        assert_eq!(layout.freq_weight(4), 1.0, "Nyquist of an even window");
        // Axis weights repeat per channel.
        assert_eq!(layout.axis_weight(0), 1.0);
        assert_eq!(layout.axis_weight(2), 2.0);
        assert_eq!(layout.axis_weight(layout.channel_dims()), 1.0);
    }
}
