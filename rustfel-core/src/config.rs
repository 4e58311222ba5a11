//! Run configuration.
//!
//! Configuration is assembled from a `tag = value` file (one pair per line,
//! `#`-prefixed comments ignored, tags case-insensitive) plus optional
//! command-line overrides of the same tags. Unknown tags are logged and
//! ignored, never fatal; a malformed value for a known tag is an error.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layout::DetectorLayout;
use std::fs;
use std::path::{Path, PathBuf};

/// Common-mode noise grouping mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CommonMode {
    /// No common-mode suppression.
    Disabled,
    /// One group per detector module.
    #[default]
    Module,
    /// One group per readout column within a module.
    Column,
}

/// Immutable processing options for the lifetime of a run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct ProcessingConfig {
    /// Worker-slot capacity of the processing pool.
    pub n_threads: usize,
    /// Common-mode suppression grouping.
    pub common_mode: CommonMode,
    /// Apply the uniform background offset after calibration.
    pub subtract_bg: bool,
    /// Frame-independent additive background offset.
    pub bg_offset: f32,
    /// Subtract the dark-calibration reference.
    pub subtract_darkcal: bool,
    /// Maintain running powder sums.
    pub powder_sum: bool,
    /// Persist assembled per-frame images with raw-frame fidelity.
    pub save_raw: bool,
    /// Common-mode noise-floor fraction, strictly between 0 and 1.
    pub cm_floor: f32,
    /// Debug verbosity level.
    pub debug_level: u32,
    /// Detector geometry file.
    pub geometry_file: PathBuf,
    /// Dark-calibration file.
    pub darkcal_file: PathBuf,
    /// Physical pixel pitch in metres, used to scale geometry coordinates.
    pub pixel_pitch_m: f64,
    /// Sensor-native detector layout.
    pub layout: DetectorLayout,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            n_threads: 1,
            common_mode: CommonMode::Module,
            subtract_bg: true,
            bg_offset: 0.0,
            subtract_darkcal: false,
            powder_sum: true,
            save_raw: false,
            cm_floor: 0.1,
            debug_level: 2,
            geometry_file: PathBuf::from("geometry/pixelmap.h5"),
            darkcal_file: PathBuf::from("darkcal.h5"),
            pixel_pitch_m: 110e-6,
            layout: DetectorLayout {
                panel_count: 64,
                module_rows: 185,
                module_cols: 194,
            },
        }
    }
}

impl ProcessingConfig {
    /// Load configuration from a `tag = value` file on top of the defaults.
    ///
    /// A missing file is not fatal: the defaults are kept and a warning is
    /// logged, matching how runs are started without a tuned configuration.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read, or if a known
    /// tag carries a malformed value.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::default();
        config.apply_file(path)?;
        Ok(config)
    }

    /// Apply a configuration file to the current settings.
    ///
    /// # Errors
    /// Returns an error on read failure of an existing file or a malformed
    /// value for a known tag.
    pub fn apply_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!(
                "configuration file {} not found, using current settings",
                path.display()
            );
            return Ok(());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((tag, value)) = line.split_once('=') else {
                continue;
            };
            self.apply_tag(tag.trim(), value.trim())?;
        }
        Ok(())
    }

    /// Apply one `tag = value` pair, from the file or the command line.
    ///
    /// Tags are case-insensitive. Unknown tags are logged and ignored.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if a known tag carries a malformed value.
    pub fn apply_tag(&mut self, tag: &str, value: &str) -> Result<()> {
        match tag.to_lowercase().as_str() {
            "nthreads" => self.n_threads = parse(tag, value)?,
            "geometry" => self.geometry_file = PathBuf::from(value),
            "darkcal" => self.darkcal_file = PathBuf::from(value),
            "cmmodule" => self.set_common_mode(CommonMode::Module, parse_flag(tag, value)?),
            "cmcolumn" => self.set_common_mode(CommonMode::Column, parse_flag(tag, value)?),
            "subtractbg" => self.subtract_bg = parse_flag(tag, value)?,
            "bgoffset" => self.bg_offset = parse(tag, value)?,
            "subtractdarkcal" => self.subtract_darkcal = parse_flag(tag, value)?,
            "powdersum" => self.powder_sum = parse_flag(tag, value)?,
            "saveraw" => self.save_raw = parse_flag(tag, value)?,
            "cmfloor" => self.cm_floor = parse(tag, value)?,
            "debuglevel" => self.debug_level = parse(tag, value)?,
            "pixelsize" => self.pixel_pitch_m = parse(tag, value)?,
            "panels" => self.layout.panel_count = parse(tag, value)?,
            "modulerows" => self.layout.module_rows = parse(tag, value)?,
            "modulecols" => self.layout.module_cols = parse(tag, value)?,
            _ => log::warn!("unknown configuration tag (ignored): {tag} = {value}"),
        }
        Ok(())
    }

    /// Enabling one grouping selects it; disabling the active one turns
    /// common-mode suppression off.
    fn set_common_mode(&mut self, mode: CommonMode, enabled: bool) {
        if enabled {
            self.common_mode = mode;
        } else if self.common_mode == mode {
            self.common_mode = CommonMode::Disabled;
        }
    }

    /// Validate the assembled configuration before a run starts.
    ///
    /// # Errors
    /// Returns [`Error::Config`] on an invalid worker count or noise-floor
    /// fraction, or [`Error::Layout`] on a degenerate detector layout.
    pub fn validate(&self) -> Result<()> {
        if self.n_threads == 0 {
            return Err(Error::Config("nthreads must be at least 1".to_string()));
        }
        if !(self.cm_floor > 0.0 && self.cm_floor < 1.0) {
            return Err(Error::Config(format!(
                "cmfloor must lie strictly between 0 and 1, got {}",
                self.cm_floor
            )));
        }
        DetectorLayout::new(
            self.layout.panel_count,
            self.layout.module_rows,
            self.layout.module_cols,
        )?;
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(tag: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("malformed value for {tag}: {value}")))
}

/// Numeric flag in the classic configuration style: zero is off, anything
/// else is on.
fn parse_flag(tag: &str, value: &str) -> Result<bool> {
    let numeric: i64 = parse(tag, value)?;
    Ok(numeric != 0)
}
