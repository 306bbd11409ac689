use crate::core::config::IndexConfig;
use crate::core::dataset::{Dataset, RollingStats};
use crate::core::segment::Segment;
use crate::index::geometry::{ChannelEnvelope, LandmarkEnvelope, Mbr};
use crate::index::node::Entry;
use crate::transform::dft::{channel_spectra, SpectralLayout};
use crate::transform::landmarks::Landmarks;

/// Minimum series count before segmentation fans out across threads.
#[cfg(feature = "parallel")]
const MIN_PARALLEL_SERIES: usize = 2;

/// Summarize a dataset into index entries: every series' offset range is cut
/// into runs of `config.segment_len`, and each run becomes one entry whose
/// geometry encloses the coefficient points of all covered offsets (plus
/// landmark envelopes when centroids are provided).
///
/// Every subsequence offset of every long-enough series is covered by
/// exactly one entry; series shorter than the window contribute none. Entry
/// order is deterministic: by series, then by offset.
pub fn build_entries(
    dataset: &Dataset,
    stats: &[Vec<RollingStats>],
    layout: &SpectralLayout,
    config: &IndexConfig,
    landmarks: Option<&Landmarks>,
) -> Vec<Entry> {
    let per_series = |s: usize| series_entries(dataset, stats, layout, config, landmarks, s);

    #[cfg(feature = "parallel")]
    if dataset.n_series() >= MIN_PARALLEL_SERIES {
        use rayon::prelude::*;
        return (0..dataset.n_series())
            .into_par_iter()
            .map(per_series)
            .reduce(Vec::new, |mut acc, mut v| {
                acc.append(&mut v);
                acc
            });
    }

    (0..dataset.n_series()).flat_map(per_series).collect()
}

fn series_entries(
    dataset: &Dataset,
    stats: &[Vec<RollingStats>],
    layout: &SpectralLayout,
    config: &IndexConfig,
    landmarks: Option<&Landmarks>,
    series_idx: usize,
) -> Vec<Entry> {
    let series = dataset.series(series_idx);
    let m = layout.window;
    let n_subs = series.n_subsequences(m);
    if n_subs == 0 {
        return Vec::new();
    }
    let series_stats = &stats[series_idx];
    let stride = layout.channel_dims();

    // Per-channel coefficient points and (optionally) landmark distances for
    // the whole series, computed once with the sliding recurrence.
    let spectra: Vec<Vec<f64>> = (0..layout.channels)
        .map(|ch| channel_spectra(series.channel(ch), &series_stats[ch], layout))
        .collect();
    let dist_tables: Option<Vec<Vec<f64>>> = landmarks.map(|lm| {
        (0..layout.channels)
            .map(|ch| {
                let residual_sq: Vec<f64> = (0..n_subs)
                    .map(|o| {
                        layout.residual_energy(
                            &spectra[ch][o * stride..(o + 1) * stride],
                            series_stats[ch].sigma_inv[o] == 0.0,
                        )
                    })
                    .collect();
                lm.channel_dists(ch, series.channel(ch), &series_stats[ch], &residual_sq)
            })
            .collect()
    });
    let n_clusters = landmarks.map_or(0, Landmarks::n_clusters);

    let point_at = |o: usize| -> Vec<f64> {
        let mut point = Vec::with_capacity(layout.dims());
        for ch_spectra in &spectra {
            point.extend_from_slice(&ch_spectra[o * stride..(o + 1) * stride]);
        }
        point
    };
    let dists_at = |o: usize| -> Option<Vec<Vec<f64>>> {
        dist_tables.as_ref().map(|tables| {
            tables
                .iter()
                .map(|t| t[o * n_clusters..(o + 1) * n_clusters].to_vec())
                .collect()
        })
    };

    let mut entries = Vec::with_capacity(n_subs.div_ceil(config.segment_len));
    let mut start = 0;
    while start < n_subs {
        let end = (start + config.segment_len - 1).min(n_subs - 1);

        let envelope = dists_at(start).map(|dists| {
            LandmarkEnvelope::new(
                dists
                    .iter()
                    .map(|d| ChannelEnvelope::from_point(d))
                    .collect(),
            )
        });
        let mut mbr = Mbr::from_point(&point_at(start), envelope);
        for o in start + 1..=end {
            let dists = dists_at(o);
            mbr.expand_point(&point_at(o), dists.as_deref());
        }

        entries.push(Entry::new(Segment::new(series_idx, start, end), mbr));
        start = end + 1;
    }
    entries
}
