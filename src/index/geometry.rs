use crate::transform::dft::SpectralLayout;

/// A provable bracket `[lower, upper]` on the squared distance between a
/// query and anything summarized by a geometry.
///
/// Coefficient-space bounds bracket the portion of the signal energy captured
/// by the retained frequencies; landmark bounds bracket the residual portion.
/// The two cover disjoint energy, so their lower bounds add.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceBound {
    pub lower: f64,
    pub upper: f64,
}

impl DistanceBound {
    pub const ZERO: Self = Self {
        lower: 0.0,
        upper: 0.0,
    };

    #[inline]
    pub fn combine(self, other: Self) -> Self {
        Self {
            lower: self.lower + other.lower,
            upper: self.upper + other.upper,
        }
    }
}

/// Landmark statistics for one channel of a geometry.
///
/// For every centroid of the channel's landmark set this records the
/// min/max residual distance over all summarized subsequences, plus how many
/// of them voted that centroid as their nearest. The representative cluster
/// used at query time is the majority vote; keeping the full interval table
/// (rather than only the winner's) is what makes `union` self-contained:
/// merging two envelopes never has to re-derive a losing cluster's interval
/// from raw subsequences.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelEnvelope {
    votes: Vec<u32>,
    lo: Vec<f64>,
    hi: Vec<f64>,
}

impl ChannelEnvelope {
    /// Envelope of a single subsequence: every interval is degenerate at the
    /// point's own distances, and its nearest centroid gets the one vote.
    ///
    /// # Panics
    /// Panics if `dists` is empty.
    pub fn from_point(dists: &[f64]) -> Self {
        assert!(!dists.is_empty(), "Need at least one landmark distance");
        let nearest = dists
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .expect("dists is non-empty");
        let mut votes = vec![0; dists.len()];
        votes[nearest] = 1;
        Self {
            votes,
            lo: dists.to_vec(),
            hi: dists.to_vec(),
        }
    }

    /// Majority-vote representative cluster (ties to the smaller index).
    pub fn chosen(&self) -> usize {
        let mut best = 0;
        for (i, &v) in self.votes.iter().enumerate() {
            if v > self.votes[best] {
                best = i;
            }
        }
        best
    }

    /// Recorded `[min, max]` residual distance to centroid `cluster`.
    pub fn interval(&self, cluster: usize) -> (f64, f64) {
        (self.lo[cluster], self.hi[cluster])
    }

    pub fn n_clusters(&self) -> usize {
        self.votes.len()
    }

    fn union(&self, other: &Self) -> Self {
        debug_assert_eq!(self.votes.len(), other.votes.len());
        Self {
            votes: self
                .votes
                .iter()
                .zip(&other.votes)
                .map(|(a, b)| a + b)
                .collect(),
            lo: self
                .lo
                .iter()
                .zip(&other.lo)
                .map(|(a, b)| a.min(*b))
                .collect(),
            hi: self
                .hi
                .iter()
                .zip(&other.hi)
                .map(|(a, b)| a.max(*b))
                .collect(),
        }
    }

    fn merge_into(&mut self, dists: &[f64]) {
        debug_assert_eq!(dists.len(), self.votes.len());
        let nearest = dists
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .expect("dists is non-empty");
        self.votes[nearest] += 1;
        for (i, &d) in dists.iter().enumerate() {
            self.lo[i] = self.lo[i].min(d);
            self.hi[i] = self.hi[i].max(d);
        }
    }
}

/// Per-channel landmark envelopes of a geometry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LandmarkEnvelope {
    channels: Vec<ChannelEnvelope>,
}

impl LandmarkEnvelope {
    pub fn new(channels: Vec<ChannelEnvelope>) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> &[ChannelEnvelope] {
        &self.channels
    }

    fn union(&self, other: &Self) -> Self {
        debug_assert_eq!(self.channels.len(), other.channels.len());
        Self {
            channels: self
                .channels
                .iter()
                .zip(&other.channels)
                .map(|(a, b)| a.union(b))
                .collect(),
        }
    }
}

/// A query summarized into the index's coefficient space: the transformed
/// point plus, when landmarks are enabled, the query residual's distance to
/// every centroid of every channel.
#[derive(Debug, Clone)]
pub struct QuerySummary {
    pub layout: SpectralLayout,
    pub point: Vec<f64>,
    pub landmark_dists: Option<Vec<Vec<f64>>>,
}

impl QuerySummary {
    /// # Panics
    /// Panics if the point does not match the layout's dimensionality.
    pub fn new(
        layout: SpectralLayout,
        point: Vec<f64>,
        landmark_dists: Option<Vec<Vec<f64>>>,
    ) -> Self {
        assert_eq!(
            point.len(),
            layout.dims(),
            "Query point has {} axes, layout expects {}",
            point.len(),
            layout.dims()
        );
        if let Some(dists) = &landmark_dists {
            assert_eq!(
                dists.len(),
                layout.channels,
                "Landmark distances cover {} channels, layout has {}",
                dists.len(),
                layout.channels
            );
        }
        Self {
            layout,
            point,
            landmark_dists,
        }
    }
}

/// Minimum bounding rectangle in coefficient space, with an optional
/// landmark envelope for the residual band.
///
/// Invariant: for every subsequence summarized by this geometry,
/// `mins[i] <= point[i] <= maxs[i]` on every axis, and each channel
/// envelope's intervals contain the subsequence's true residual distance to
/// every centroid. Geometries are immutable once built; `union` produces a
/// new one.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mbr {
    mins: Vec<f64>,
    maxs: Vec<f64>,
    envelope: Option<LandmarkEnvelope>,
}

impl Mbr {
    /// Degenerate rectangle around a single coefficient point.
    pub fn from_point(point: &[f64], envelope: Option<LandmarkEnvelope>) -> Self {
        Self {
            mins: point.to_vec(),
            maxs: point.to_vec(),
            envelope,
        }
    }

    /// Rectangle from explicit bounds (test and persistence constructor).
    ///
    /// # Panics
    /// Panics if the arrays disagree in length or any `min > max`.
    pub fn from_bounds(
        mins: Vec<f64>,
        maxs: Vec<f64>,
        envelope: Option<LandmarkEnvelope>,
    ) -> Self {
        assert_eq!(mins.len(), maxs.len(), "Bounds arrays must match");
        for (i, (lo, hi)) in mins.iter().zip(&maxs).enumerate() {
            assert!(lo <= hi, "Inverted bounds on axis {i}: {lo} > {hi}");
        }
        Self {
            mins,
            maxs,
            envelope,
        }
    }

    pub fn dims(&self) -> usize {
        self.mins.len()
    }

    pub fn mins(&self) -> &[f64] {
        &self.mins
    }

    pub fn maxs(&self) -> &[f64] {
        &self.maxs
    }

    pub fn envelope(&self) -> Option<&LandmarkEnvelope> {
        self.envelope.as_ref()
    }

    /// Midpoint of one axis (the bulk loader's sort key).
    #[inline]
    pub fn midpoint(&self, axis: usize) -> f64 {
        0.5 * (self.mins[axis] + self.maxs[axis])
    }

    /// Element-wise min/max of the coefficient bounds; landmark envelopes
    /// merge interval-wise with summed votes. Always defined; if either side
    /// lacks an envelope the union has none.
    pub fn union(&self, other: &Self) -> Self {
        debug_assert_eq!(self.dims(), other.dims());
        let mins = self
            .mins
            .iter()
            .zip(&other.mins)
            .map(|(a, b)| a.min(*b))
            .collect();
        let maxs = self
            .maxs
            .iter()
            .zip(&other.maxs)
            .map(|(a, b)| a.max(*b))
            .collect();
        let envelope = match (&self.envelope, &other.envelope) {
            (Some(a), Some(b)) => Some(a.union(b)),
            _ => None,
        };
        Self {
            mins,
            maxs,
            envelope,
        }
    }

    /// Grow this rectangle in place to admit another summarized point.
    /// Build-time only; published geometries are never mutated.
    pub(crate) fn expand_point(&mut self, point: &[f64], dists: Option<&[Vec<f64>]>) {
        debug_assert_eq!(point.len(), self.dims());
        for (i, &v) in point.iter().enumerate() {
            self.mins[i] = self.mins[i].min(v);
            self.maxs[i] = self.maxs[i].max(v);
        }
        if let (Some(env), Some(dists)) = (&mut self.envelope, dists) {
            for (ch, d) in env.channels.iter_mut().zip(dists.iter()) {
                ch.merge_into(d);
            }
        }
    }

    /// Product of the axis extents. Diagnostic only; underflows to zero in
    /// high dimensions.
    pub fn volume(&self) -> f64 {
        self.mins
            .iter()
            .zip(&self.maxs)
            .map(|(lo, hi)| hi - lo)
            .product()
    }

    /// Sum of `ln(extent)` over axes with positive extent. Diagnostic only.
    pub fn log_volume(&self) -> f64 {
        self.mins
            .iter()
            .zip(&self.maxs)
            .map(|(lo, hi)| hi - lo)
            .filter(|e| *e > 0.0)
            .map(f64::ln)
            .sum()
    }

    /// Sum of the axis extents. Diagnostic only.
    pub fn margin(&self) -> f64 {
        self.mins.iter().zip(&self.maxs).map(|(lo, hi)| hi - lo).sum()
    }

    /// Whether `point` lies inside this rectangle on every axis.
    pub fn contains_point(&self, point: &[f64]) -> bool {
        point.len() == self.dims()
            && point
                .iter()
                .enumerate()
                .all(|(i, &v)| self.mins[i] <= v && v <= self.maxs[i])
    }

    /// Coefficient-space bracket on the squared distance between the query
    /// point and any point inside this rectangle, restricted to the retained
    /// frequency band.
    ///
    /// Per axis: zero lower contribution if the query lies inside the
    /// interval, else squared distance to the nearest bound; upper
    /// contribution is the squared distance to the farthest bound. Conjugate
    /// frequencies are counted twice, and the Parseval `1/window` scale maps
    /// the sum into time-domain units.
    ///
    /// # Panics
    /// Panics if the query dimensionality does not match the rectangle's.
    pub fn coeff_bound_point(&self, point: &[f64], layout: &SpectralLayout) -> DistanceBound {
        assert_eq!(
            point.len(),
            self.dims(),
            "Query has {} axes but the index was built with {}",
            point.len(),
            self.dims()
        );
        let mut lower = 0.0;
        let mut upper = 0.0;
        for (i, &q) in point.iter().enumerate() {
            let lo = self.mins[i];
            let hi = self.maxs[i];
            let w = layout.axis_weight(i);
            let below = lo - q;
            let above = q - hi;
            let near = below.max(above).max(0.0);
            let far = (q - lo).abs().max((q - hi).abs());
            lower += w * near * near;
            upper += w * far * far;
        }
        let scale = layout.inv_window();
        DistanceBound {
            lower: lower * scale,
            upper: upper * scale,
        }
    }

    /// Same bracket with both sides treated as intervals: minimum over the
    /// nearest pair of bounds, maximum over the farthest pair.
    pub fn coeff_bound_mbr(&self, other: &Self, layout: &SpectralLayout) -> DistanceBound {
        assert_eq!(
            other.dims(),
            self.dims(),
            "Geometry has {} axes but the index was built with {}",
            other.dims(),
            self.dims()
        );
        let mut lower = 0.0;
        let mut upper = 0.0;
        for i in 0..self.dims() {
            let w = layout.axis_weight(i);
            let near = (self.mins[i] - other.maxs[i])
                .max(other.mins[i] - self.maxs[i])
                .max(0.0);
            let far = (self.maxs[i] - other.mins[i])
                .abs()
                .max((other.maxs[i] - self.mins[i]).abs());
            lower += w * near * near;
            upper += w * far * far;
        }
        let scale = layout.inv_window();
        DistanceBound {
            lower: lower * scale,
            upper: upper * scale,
        }
    }

    /// Triangle-inequality bracket on the squared residual distance, via each
    /// channel's majority-vote centroid.
    ///
    /// Lower: if the query's distance to the centroid falls outside the
    /// recorded `[min, max]`, the gap to the violated end, squared; zero when
    /// inside. Upper: the larger of the two end deviations, squared, i.e. the
    /// worst triangle-inequality deviation the envelope admits.
    ///
    /// Zero when either side carries no landmark information.
    pub fn landmark_bound(&self, query: &QuerySummary) -> DistanceBound {
        let (Some(env), Some(dists)) = (&self.envelope, &query.landmark_dists) else {
            return DistanceBound::ZERO;
        };
        let mut lower = 0.0;
        let mut upper = 0.0;
        for (ch, qd) in env.channels.iter().zip(dists.iter()) {
            let cluster = ch.chosen();
            let (lo, hi) = ch.interval(cluster);
            let q = qd[cluster];
            let gap = if q < lo {
                lo - q
            } else if q > hi {
                q - hi
            } else {
                0.0
            };
            lower += gap * gap;
            let dev = (q - lo).abs().max((q - hi).abs());
            upper += dev * dev;
        }
        DistanceBound { lower, upper }
    }

    /// Combined bracket: coefficient band plus residual band. The two
    /// summarize disjoint components of the signal energy, so both ends add.
    pub fn bound(&self, query: &QuerySummary) -> DistanceBound {
        self.coeff_bound_point(&query.point, &query.layout)
            .combine(self.landmark_bound(query))
    }

    /// The pruning quantity: combined lower bound on the squared distance.
    #[inline]
    pub fn total_lower_bound(&self, query: &QuerySummary) -> f64 {
        self.bound(query).lower
    }
}
