use std::sync::atomic::{AtomicU64, Ordering};

/// An `f64` stored as atomic bits.
///
/// Supports the two operations the engine needs across threads: an
/// accumulate-add for diagnostic counters and a minimum-only store for the
/// pruning threshold. Both are compare-and-swap loops; no locks.
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    /// Add `delta`, retrying until the compare-and-swap succeeds.
    pub fn fetch_add(&self, delta: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Lower the stored value to `value` if and only if `value` is smaller.
    ///
    /// Returns `true` if the store happened. NaN proposals are ignored.
    pub fn fetch_min(&self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            if value >= f64::from_bits(current) {
                return false;
            }
            match self.0.compare_exchange_weak(
                current,
                value.to_bits(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }
}

/// The single piece of mutable state shared by all participants of one query:
/// the current best known upper bound on the squared k-th nearest-neighbor
/// distance.
///
/// The value only ever decreases. [`RunningThreshold::shrink`] is a no-op
/// unless the proposed value is strictly smaller than the current one, so
/// concurrent writers cannot loosen the bound, and readers on the search hot
/// path pay one atomic load.
#[derive(Debug)]
pub struct RunningThreshold(AtomicF64);

impl RunningThreshold {
    /// Start from a known upper bound (squared distance).
    pub fn new(limit: f64) -> Self {
        Self(AtomicF64::new(limit))
    }

    /// Start unbounded: every candidate qualifies until the first shrink.
    pub fn unbounded() -> Self {
        Self::new(f64::INFINITY)
    }

    /// Current bound.
    #[inline]
    pub fn get(&self) -> f64 {
        self.0.load()
    }

    /// Propose a tighter bound; ignored unless strictly smaller than the
    /// current value. Safe under arbitrarily many concurrent writers.
    #[inline]
    pub fn shrink(&self, value: f64) -> bool {
        self.0.fetch_min(value)
    }
}
