//! Dark-calibration loader.

use crate::error::{Error, Result};
use rustfel_core::CalibrationReference;
use std::path::Path;

/// Load the dark-calibration reference.
///
/// A missing file is a degraded condition, not a fatal one: the run proceeds
/// with an all-zero reference and a logged warning. An existing file that
/// cannot be read, or whose size does not match the detector, is fatal.
///
/// # Errors
/// Returns an error if an existing file is unreadable or mis-sized.
pub fn load_darkcal<P: AsRef<Path>>(path: P, pixel_count: usize) -> Result<CalibrationReference> {
    let path = path.as_ref();
    if !path.exists() {
        log::warn!(
            "darkcal file {} not found, defaulting to all-zero reference",
            path.display()
        );
        return Ok(CalibrationReference::zeros(pixel_count));
    }

    let file = hdf5::File::open(path)?;
    let values = file.dataset("data")?.read_raw::<u16>()?;
    if values.len() != pixel_count {
        return Err(Error::InvalidFormat(format!(
            "darkcal {} covers {} pixels, detector has {pixel_count}",
            path.display(),
            values.len()
        )));
    }

    log::info!("darkcal {}: {} pixels", path.display(), values.len());
    Ok(CalibrationReference::new(values))
}
