/// Policy for distributing split counts across coefficient axes during
/// bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SplitPolicy {
    /// Uniform weight `1/d` per axis.
    Equal,
    /// Weight proportional to the midpoint spread `(max - min)` of each axis.
    Range,
    /// Weight proportional to the midpoint variance of each axis.
    #[default]
    Variance,
}

/// Static configuration fixed at index-construction time.
///
/// Covers both the tree shape (`leaf_size`, `min_children`, `max_children`)
/// and the summarization transform (`coeffs` retained DFT coefficients per
/// channel, `segment_len` offsets per entry, `landmarks` centroids per
/// channel, 0 disabling the landmark envelope entirely).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexConfig {
    /// Subsequence (query window) length.
    pub window: usize,
    /// Retained DFT coefficients per channel (frequencies `0..coeffs`).
    pub coeffs: usize,
    /// Subsequence offsets summarized per index entry.
    pub segment_len: usize,
    /// Maximum entries per leaf node.
    pub leaf_size: usize,
    /// Minimum children per non-leaf node.
    pub min_children: usize,
    /// Maximum children per non-leaf node.
    pub max_children: usize,
    /// Split-weight policy for the bulk loader.
    pub split_policy: SplitPolicy,
    /// Landmark centroids per channel; 0 disables landmarks.
    pub landmarks: usize,
    /// Residual vectors sampled per series when fitting landmarks.
    pub landmark_sample: usize,
}

impl IndexConfig {
    /// Defaults tuned for short-to-medium windows; see field docs.
    ///
    /// # Panics
    /// Panics if `window < 4`.
    pub fn new(window: usize) -> Self {
        assert!(window >= 4, "Window length must be >= 4, got {window}");
        let coeffs = (window / 4).clamp(2, 8);
        Self {
            window,
            coeffs,
            segment_len: 16,
            leaf_size: 32,
            min_children: 4,
            max_children: 16,
            split_policy: SplitPolicy::default(),
            landmarks: 0,
            landmark_sample: 256,
        }
    }

    /// Enable the landmark envelope with `n` centroids per channel.
    pub fn with_landmarks(mut self, n: usize) -> Self {
        self.landmarks = n;
        self
    }

    pub fn with_split_policy(mut self, policy: SplitPolicy) -> Self {
        self.split_policy = policy;
        self
    }

    /// Validate the internal consistency of the configuration.
    ///
    /// # Panics
    /// Panics with a description of the first violated constraint.
    pub fn validate(&self) {
        assert!(self.window >= 4, "Window length must be >= 4");
        assert!(self.coeffs >= 1, "Must retain at least one coefficient");
        assert!(
            self.coeffs <= self.window / 2 + 1,
            "Cannot retain more than window/2 + 1 coefficients ({} > {})",
            self.coeffs,
            self.window / 2 + 1
        );
        assert!(self.segment_len >= 1, "Segment length must be >= 1");
        assert!(self.leaf_size >= 1, "Leaf size must be >= 1");
        assert!(
            self.min_children >= 2 && self.max_children >= self.min_children,
            "Fan-out bounds must satisfy 2 <= min_children <= max_children"
        );
    }
}
