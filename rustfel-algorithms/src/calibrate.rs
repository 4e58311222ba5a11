//! Per-frame calibration pipeline.
//!
//! Pure function of the raw frame, the dark reference, and the run
//! configuration. The reference is read-only and can be shared by all
//! workers without locking.

use crate::common_mode::{suppress_by_column, suppress_by_module, FloorEstimator};
use rustfel_core::{CalibrationReference, CommonMode, Error, ProcessingConfig, Result};

/// Calibrate one raw frame into a floating-point corrected frame.
///
/// Stages, in order:
/// 1. Dark subtraction (if enabled), computed in a signed 32-bit domain so
///    baselines above the signal leave negative values rather than wrapping.
///    Negatives are retained, not clamped.
/// 2. Common-mode suppression (if enabled), grouped per the configuration.
/// 3. The uniform background offset (if enabled).
///
/// # Errors
/// Returns [`Error::Frame`] if the raw frame or reference length does not
/// match the configured detector layout.
pub fn calibrate<E: FloorEstimator>(
    raw: &[u16],
    reference: &CalibrationReference,
    config: &ProcessingConfig,
    estimator: &E,
) -> Result<Vec<f32>> {
    let expected = config.layout.pixel_count();
    if raw.len() != expected {
        return Err(Error::Frame(format!(
            "raw frame has {} pixels, layout expects {expected}",
            raw.len()
        )));
    }
    if reference.len() != expected {
        return Err(Error::Frame(format!(
            "calibration reference has {} pixels, layout expects {expected}",
            reference.len()
        )));
    }

    #[allow(clippy::cast_precision_loss)]
    let mut corrected: Vec<f32> = if config.subtract_darkcal {
        raw.iter()
            .zip(reference.values())
            .map(|(&r, &dark)| (i32::from(r) - i32::from(dark)) as f32)
            .collect()
    } else {
        raw.iter().map(|&r| f32::from(r)).collect()
    };

    match config.common_mode {
        CommonMode::Disabled => {}
        CommonMode::Module => {
            suppress_by_module(&mut corrected, &config.layout, config.cm_floor, estimator);
        }
        CommonMode::Column => {
            suppress_by_column(&mut corrected, &config.layout, config.cm_floor, estimator);
        }
    }

    if config.subtract_bg {
        for v in &mut corrected {
            *v -= config.bg_offset;
        }
    }

    Ok(corrected)
}
