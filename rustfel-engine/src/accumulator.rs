//! Running-sum ("powder") accumulators.
//!
//! Each accumulator owns a canvas-sized running sum and a frame count behind
//! its own lock, so unrelated accumulators never contend. The lock is held
//! only for the in-place addition (or a snapshot copy), never across
//! calibration or assembly. Addition is commutative, so the final sum does
//! not depend on the order in which workers apply their frames.

use crate::error::{Error, Result};
use std::sync::Mutex;

struct PowderState {
    sum: Vec<f64>,
    frames: u64,
}

/// One running-sum canvas with its frame count.
///
/// The sum is kept in f64 so long runs do not lose frames to float
/// cancellation; per-frame images stay f32.
pub struct PowderAccumulator {
    state: Mutex<PowderState>,
}

/// Consistent copy of an accumulator's sum and frame count.
#[derive(Clone, Debug, PartialEq)]
pub struct PowderSnapshot {
    /// Element-wise running sum over all accumulated images.
    pub sum: Vec<f64>,
    /// Number of images accumulated.
    pub frames: u64,
}

impl PowderAccumulator {
    /// Create an accumulator for a canvas of `canvas_len` cells.
    #[must_use]
    pub fn new(canvas_len: usize) -> Self {
        Self {
            state: Mutex::new(PowderState {
                sum: vec![0.0; canvas_len],
                frames: 0,
            }),
        }
    }

    /// Add an assembled image and bump the frame count, atomically with
    /// respect to readers of this accumulator.
    ///
    /// # Errors
    /// Returns [`Error::AccumulatorSize`] if the image length differs from
    /// the accumulator canvas.
    pub fn accumulate(&self, image: &[f32]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if image.len() != state.sum.len() {
            return Err(Error::AccumulatorSize {
                expected: state.sum.len(),
                actual: image.len(),
            });
        }
        for (acc, &v) in state.sum.iter_mut().zip(image) {
            *acc += f64::from(v);
        }
        state.frames += 1;
        Ok(())
    }

    /// Consistent (sum, count) pair under the accumulator's lock.
    #[must_use]
    pub fn snapshot(&self) -> PowderSnapshot {
        let state = self.state.lock().unwrap();
        PowderSnapshot {
            sum: state.sum.clone(),
            frames: state.frames,
        }
    }
}

/// The run's powder accumulators, e.g. one per classification bucket.
pub struct AccumulatorSet {
    accumulators: Vec<PowderAccumulator>,
}

impl AccumulatorSet {
    /// Create `count` independent accumulators over `canvas_len` cells.
    #[must_use]
    pub fn new(count: usize, canvas_len: usize) -> Self {
        Self {
            accumulators: (0..count).map(|_| PowderAccumulator::new(canvas_len)).collect(),
        }
    }

    /// Number of accumulators in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accumulators.len()
    }

    /// Returns true if the set holds no accumulators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accumulators.is_empty()
    }

    /// Add an image to the selected accumulator.
    ///
    /// # Errors
    /// Returns [`Error::UnknownAccumulator`] for an id outside the set, or
    /// [`Error::AccumulatorSize`] on a canvas mismatch.
    pub fn accumulate(&self, id: usize, image: &[f32]) -> Result<()> {
        self.accumulators
            .get(id)
            .ok_or(Error::UnknownAccumulator(id))?
            .accumulate(image)
    }

    /// Snapshot the selected accumulator.
    ///
    /// # Errors
    /// Returns [`Error::UnknownAccumulator`] for an id outside the set.
    pub fn snapshot(&self, id: usize) -> Result<PowderSnapshot> {
        Ok(self
            .accumulators
            .get(id)
            .ok_or(Error::UnknownAccumulator(id))?
            .snapshot())
    }
}
