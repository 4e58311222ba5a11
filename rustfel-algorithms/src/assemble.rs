//! Geometry-driven image assembly.
//!
//! Scatters a corrected sensor-native frame onto the square output canvas
//! using the per-pixel geometry map. Canvas cells never written by any
//! sensor pixel keep the background value zero.

use rustfel_core::{Error, GeometryMap, Result};

/// Corrected values at or above this level are treated as gap or saturated
/// sentinels. Matches the acquisition layer, which maps detector overflow
/// onto `u16::MAX` before dark subtraction can lower it slightly.
pub const GAP_THRESHOLD: f32 = 32_767.0;

/// Resolution of canvas-cell collisions at panel-gap and overlap boundaries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CollisionPolicy {
    /// Later sensor pixels (in index order) overwrite earlier ones.
    LastWriteWins,
    /// Gap/saturated sentinel values never write to the canvas, so they
    /// cannot clobber real data. Selected for raw-frame fidelity output.
    PreserveSignal {
        /// Values at or above this threshold are suppressed.
        gap_threshold: f32,
    },
}

impl Default for CollisionPolicy {
    fn default() -> Self {
        Self::LastWriteWins
    }
}

impl CollisionPolicy {
    /// Policy for a run: raw-frame fidelity requests gap suppression.
    #[must_use]
    pub fn for_raw_fidelity(save_raw: bool) -> Self {
        if save_raw {
            Self::PreserveSignal {
                gap_threshold: GAP_THRESHOLD,
            }
        } else {
            Self::LastWriteWins
        }
    }
}

/// Assemble a corrected frame into a canvas image.
///
/// Each sensor pixel is written at its integer-rounded canvas coordinate.
/// The geometry map guarantees every rounded coordinate is in bounds.
///
/// # Errors
/// Returns [`Error::Frame`] if the corrected frame length does not match the
/// geometry's pixel count.
pub fn assemble(
    corrected: &[f32],
    geometry: &GeometryMap,
    policy: CollisionPolicy,
) -> Result<Vec<f32>> {
    if corrected.len() != geometry.pixel_count() {
        return Err(Error::Frame(format!(
            "corrected frame has {} pixels, geometry expects {}",
            corrected.len(),
            geometry.pixel_count()
        )));
    }

    let n = geometry.canvas_size();
    let mut canvas = vec![0.0_f32; geometry.canvas_len()];
    let xs = geometry.x();
    let ys = geometry.y();

    for (i, &value) in corrected.iter().enumerate() {
        if let CollisionPolicy::PreserveSignal { gap_threshold } = policy {
            if value >= gap_threshold {
                continue;
            }
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let cx = xs[i].round() as usize;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let cy = ys[i].round() as usize;
        canvas[cy * n + cx] = value;
    }

    Ok(canvas)
}
