//! Bounded per-layer feature buffer
//!
//! Completed records wait here, in production order, until the consumer
//! takes them. A soft threshold steers the interleave scheduler toward
//! draining; the hard threshold is the absolute ceiling beyond which
//! inserts are rejected rather than buffered unboundedly.

use crate::feature::Feature;

/// Above this fill level the scheduler redirects consumers to drain the
/// layer before producing more
pub const SWITCH_THRESHOLD: usize = 10_000;

/// Hard ceiling; inserts beyond it are rejected
pub const MAX_THRESHOLD: usize = 100_000;

/// Why an insert was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Buffer is over the hard threshold
    Overflow,
    /// Allocation for the insert failed
    OutOfMemory,
}

/// FIFO buffer of completed features
///
/// Delivery uses a take cursor over the backing vector; when the last
/// pending feature is taken, both reset so repeated fill/drain cycles do
/// not grow the buffer.
#[derive(Debug, Default)]
pub struct FeatureBuffer {
    features: Vec<Feature>,
    next_index: usize,
}

impl FeatureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered features, delivered-but-not-drained included
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// True once at least one feature was taken from the current fill
    pub fn delivery_started(&self) -> bool {
        self.next_index != 0
    }

    /// Appends a feature in production order
    ///
    /// With `check_threshold`, inserts over [`MAX_THRESHOLD`] are refused.
    pub fn try_push(&mut self, feature: Feature, check_threshold: bool) -> Result<(), PushError> {
        if check_threshold && self.features.len() > MAX_THRESHOLD {
            return Err(PushError::Overflow);
        }
        self.features
            .try_reserve(1)
            .map_err(|_| PushError::OutOfMemory)?;
        self.features.push(feature);
        Ok(())
    }

    /// Removes and returns the oldest pending feature
    pub fn take_next(&mut self) -> Option<Feature> {
        if self.next_index >= self.features.len() {
            return None;
        }
        let feature = std::mem::take(&mut self.features[self.next_index]);
        self.next_index += 1;

        if self.next_index == self.features.len() {
            self.next_index = 0;
            self.features.clear();
        }

        Some(feature)
    }

    /// Drops all pending features and resets the cursor
    pub fn clear(&mut self) {
        self.features.clear();
        self.next_index = 0;
    }
}
