//! Sensor-native detector layout.
//!
//! A detector is a grid of identical modules (panels), each `module_rows` x
//! `module_cols` pixels. Frames arrive in sensor-native order: pixel
//! `i = panel * module_rows * module_cols + row * module_cols + col`.
//! The layout defines the group partitions used by common-mode suppression.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sensor-native layout of a modular pixel detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectorLayout {
    /// Number of detector modules (panels).
    pub panel_count: usize,
    /// Readout rows per module.
    pub module_rows: usize,
    /// Readout columns per module.
    pub module_cols: usize,
}

impl DetectorLayout {
    /// Create a layout, validating that every dimension is at least 1.
    ///
    /// # Errors
    /// Returns [`Error::Layout`] if any dimension is zero.
    pub fn new(panel_count: usize, module_rows: usize, module_cols: usize) -> Result<Self> {
        if panel_count == 0 || module_rows == 0 || module_cols == 0 {
            return Err(Error::Layout(format!(
                "layout dimensions must be non-zero: {panel_count} panels x {module_rows} rows x {module_cols} cols"
            )));
        }
        Ok(Self {
            panel_count,
            module_rows,
            module_cols,
        })
    }

    /// Pixels per module.
    #[must_use]
    pub fn module_len(&self) -> usize {
        self.module_rows * self.module_cols
    }

    /// Total sensor-native pixel count (module rows x cols x panel count).
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.panel_count * self.module_len()
    }

    /// Module index owning sensor-native pixel `i`.
    #[must_use]
    pub fn panel_of(&self, i: usize) -> usize {
        i / self.module_len()
    }

    /// Sensor-native index range of module `panel`.
    #[must_use]
    pub fn module_range(&self, panel: usize) -> std::ops::Range<usize> {
        let start = panel * self.module_len();
        start..start + self.module_len()
    }
}
