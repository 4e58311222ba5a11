//! Detector geometry loader.
//!
//! The geometry file carries three equal-length datasets `x`, `y`, `z` with
//! per-pixel positions in metres. The loader divides by the physical pixel
//! pitch to get output-pixel units and builds the [`GeometryMap`], which
//! derives the canvas size from the bounding box. Any problem here is fatal
//! for the run: a mis-sized geometry would scatter pixels to the wrong
//! places on every frame.

use crate::error::{Error, Result};
use rustfel_core::{DetectorLayout, GeometryMap};
use std::path::Path;

/// Load and validate the geometry map.
///
/// # Errors
/// Returns an error if the file is missing or unreadable, the datasets are
/// absent or of mismatched length, or the pixel count does not match the
/// detector layout.
pub fn load_geometry<P: AsRef<Path>>(
    path: P,
    layout: &DetectorLayout,
    pixel_pitch_m: f64,
) -> Result<GeometryMap> {
    let path = path.as_ref();
    let file = hdf5::File::open(path).map_err(|e| {
        Error::InvalidFormat(format!("cannot open geometry file {}: {e}", path.display()))
    })?;

    let x = read_axis(&file, "x", pixel_pitch_m)?;
    let y = read_axis(&file, "y", pixel_pitch_m)?;
    let z = read_axis(&file, "z", pixel_pitch_m)?;

    log::info!(
        "geometry {}: {} pixels",
        path.display(),
        x.len()
    );

    let map = GeometryMap::new(x, y, z, layout)?;
    log::info!(
        "assembled images will be {0} x {0}",
        map.canvas_size()
    );
    Ok(map)
}

fn read_axis(file: &hdf5::File, name: &str, pixel_pitch_m: f64) -> Result<Vec<f32>> {
    let values = file
        .dataset(name)?
        .read_raw::<f64>()
        .map_err(|e| Error::InvalidFormat(format!("geometry dataset {name}: {e}")))?;
    #[allow(clippy::cast_possible_truncation)]
    let scaled = values.iter().map(|v| (v / pixel_pitch_m) as f32).collect();
    Ok(scaled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayView1;

    fn write_geometry(path: &Path, x: &[f64], y: &[f64], z: &[f64]) {
        let file = hdf5::File::create(path).unwrap();
        for (name, values) in [("x", x), ("y", y), ("z", z)] {
            let ds = file
                .new_dataset::<f64>()
                .shape((values.len(),))
                .create(name)
                .unwrap();
            ds.write(ArrayView1::from(values)).unwrap();
        }
    }

    #[test]
    fn test_load_geometry_scales_by_pitch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixelmap.h5");
        // Positions in metres on a 100 um pitch: a 2x2 grid.
        let pitch = 100e-6;
        write_geometry(
            &path,
            &[0.0, 100e-6, 0.0, 100e-6],
            &[0.0, 0.0, 100e-6, 100e-6],
            &[0.0; 4],
        );

        let layout = DetectorLayout::new(1, 2, 2).unwrap();
        let map = load_geometry(&path, &layout, pitch).unwrap();
        assert_eq!(map.pixel_count(), 4);
        assert_eq!(map.canvas_size(), 2);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let layout = DetectorLayout::new(1, 2, 2).unwrap();
        let result = load_geometry("/nonexistent/pixelmap.h5", &layout, 100e-6);
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_length_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixelmap.h5");
        write_geometry(&path, &[0.0, 100e-6, 0.0], &[0.0, 0.0], &[0.0, 0.0, 0.0]);

        let layout = DetectorLayout::new(1, 1, 3).unwrap();
        let result = load_geometry(&path, &layout, 100e-6);
        assert!(result.is_err());
    }

    #[test]
    fn test_layout_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixelmap.h5");
        write_geometry(&path, &[0.0, 100e-6], &[0.0, 0.0], &[0.0, 0.0]);

        let layout = DetectorLayout::new(1, 2, 2).unwrap();
        let result = load_geometry(&path, &layout, 100e-6);
        assert!(result.is_err());
    }
}
