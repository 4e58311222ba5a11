//! Per-pixel geometry map from sensor-native layout to the output canvas.
//!
//! Built once at startup from the detector geometry file and immutable for
//! the rest of the run. Coordinates are stored in output-pixel units, already
//! shifted into the canvas frame: for every pixel, the rounded `(x, y)`
//! coordinate lies within `[0, canvas_size)` on both axes. The canvas is a
//! square covering the full bounding box of all rounded pixel positions,
//! with its side length rounded up to an even integer.

use crate::error::{Error, Result};
use crate::layout::DetectorLayout;

/// Immutable pixel coordinate table with a derived canvas size.
#[derive(Clone, Debug)]
pub struct GeometryMap {
    x: Vec<f32>,
    y: Vec<f32>,
    z: Vec<f32>,
    canvas_size: usize,
}

impl GeometryMap {
    /// Build a geometry map from pixel-unit coordinates.
    ///
    /// Inputs must already be divided by the physical pixel pitch. All three
    /// arrays must have identical length equal to the layout's pixel count.
    /// The constructor shifts coordinates so the bounding box starts at the
    /// origin and derives the canvas size; it is never recomputed afterwards.
    ///
    /// # Errors
    /// Returns [`Error::Geometry`] on array length mismatch, a length not
    /// matching the layout, or non-finite coordinates.
    pub fn new(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>, layout: &DetectorLayout) -> Result<Self> {
        if x.len() != y.len() || x.len() != z.len() {
            return Err(Error::Geometry(format!(
                "coordinate array size mismatch: x={} y={} z={}",
                x.len(),
                y.len(),
                z.len()
            )));
        }
        if x.len() != layout.pixel_count() {
            return Err(Error::Geometry(format!(
                "geometry has {} pixels, detector layout expects {}",
                x.len(),
                layout.pixel_count()
            )));
        }
        if x.is_empty() {
            return Err(Error::Geometry("geometry covers no pixels".to_string()));
        }
        if x.iter().chain(&y).chain(&z).any(|v| !v.is_finite()) {
            return Err(Error::Geometry(
                "geometry contains non-finite coordinates".to_string(),
            ));
        }

        let (x, x_extent) = shift_to_origin(x);
        let (y, y_extent) = shift_to_origin(y);

        // Square canvas over the larger axis extent, rounded up to even.
        let mut canvas_size = x_extent.max(y_extent);
        if canvas_size % 2 != 0 {
            canvas_size += 1;
        }

        let map = Self {
            x,
            y,
            z,
            canvas_size,
        };
        map.check_bounds()?;
        Ok(map)
    }

    fn check_bounds(&self) -> Result<()> {
        for i in 0..self.pixel_count() {
            let cx = self.x[i].round();
            let cy = self.y[i].round();
            #[allow(clippy::cast_precision_loss)]
            let limit = self.canvas_size as f32;
            if cx < 0.0 || cx >= limit || cy < 0.0 || cy >= limit {
                return Err(Error::Geometry(format!(
                    "pixel {i} maps to ({cx}, {cy}) outside the {0} x {0} canvas",
                    self.canvas_size
                )));
            }
        }
        Ok(())
    }

    /// Sensor-native pixel count.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.x.len()
    }

    /// Side length of the square output canvas.
    #[must_use]
    pub fn canvas_size(&self) -> usize {
        self.canvas_size
    }

    /// Total cell count of the output canvas.
    #[must_use]
    pub fn canvas_len(&self) -> usize {
        self.canvas_size * self.canvas_size
    }

    /// Canvas-frame x coordinates, one per sensor pixel.
    #[must_use]
    pub fn x(&self) -> &[f32] {
        &self.x
    }

    /// Canvas-frame y coordinates, one per sensor pixel.
    #[must_use]
    pub fn y(&self) -> &[f32] {
        &self.y
    }

    /// Out-of-plane coordinates, one per sensor pixel.
    #[must_use]
    pub fn z(&self) -> &[f32] {
        &self.z
    }
}

/// Shift coordinates so the smallest rounded value becomes zero and return
/// the integer extent (number of distinct canvas cells spanned).
fn shift_to_origin(mut values: Vec<f32>) -> (Vec<f32>, usize) {
    let mut min = i64::MAX;
    let mut max = i64::MIN;
    for v in &values {
        #[allow(clippy::cast_possible_truncation)]
        let r = v.round() as i64;
        min = min.min(r);
        max = max.max(r);
    }
    #[allow(clippy::cast_precision_loss)]
    let offset = min as f32;
    for v in &mut values {
        *v -= offset;
    }
    #[allow(clippy::cast_sign_loss)]
    let extent = (max - min + 1) as usize;
    (values, extent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(n: usize) -> DetectorLayout {
        DetectorLayout::new(1, 1, n).unwrap()
    }

    #[test]
    fn test_unit_square_canvas() {
        // Pixel i -> canvas (i % 2, i / 2) on a 2x2 canvas.
        let x = vec![0.0, 1.0, 0.0, 1.0];
        let y = vec![0.0, 0.0, 1.0, 1.0];
        let z = vec![0.0; 4];
        let map = GeometryMap::new(x, y, z, &layout(4)).unwrap();
        assert_eq!(map.canvas_size(), 2);
        assert_eq!(map.canvas_len(), 4);
    }

    #[test]
    fn test_negative_coordinates_shift_to_origin() {
        let x = vec![-2.0, -1.0, 0.0, 1.0];
        let y = vec![-1.0, 0.0, 1.0, 2.0];
        let z = vec![0.0; 4];
        let map = GeometryMap::new(x, y, z, &layout(4)).unwrap();
        assert_eq!(map.canvas_size(), 4);
        assert!((map.x()[0] - 0.0).abs() < f32::EPSILON);
        assert!((map.x()[3] - 3.0).abs() < f32::EPSILON);
        assert!((map.y()[0] - 0.0).abs() < f32::EPSILON);
        assert!((map.y()[3] - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_canvas_size_rounded_up_to_even() {
        // Extent 3 on both axes rounds up to a 4x4 canvas.
        let x = vec![0.0, 1.0, 2.0];
        let y = vec![0.0, 1.0, 2.0];
        let z = vec![0.0; 3];
        let map = GeometryMap::new(x, y, z, &layout(3)).unwrap();
        assert_eq!(map.canvas_size(), 4);
    }

    #[test]
    fn test_bounding_box_invariant() {
        let x = vec![-3.4, 0.2, 7.9, 2.5];
        let y = vec![5.1, -2.7, 0.0, 3.3];
        let z = vec![0.0; 4];
        let map = GeometryMap::new(x, y, z, &layout(4)).unwrap();
        #[allow(clippy::cast_precision_loss)]
        let limit = map.canvas_size() as f32;
        for i in 0..map.pixel_count() {
            let cx = map.x()[i].round();
            let cy = map.y()[i].round();
            assert!(cx >= 0.0 && cx < limit, "x out of bounds for pixel {i}");
            assert!(cy >= 0.0 && cy < limit, "y out of bounds for pixel {i}");
        }
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let result = GeometryMap::new(vec![0.0, 1.0], vec![0.0], vec![0.0, 1.0], &layout(2));
        assert!(matches!(result, Err(Error::Geometry(_))));
    }

    #[test]
    fn test_layout_mismatch_rejected() {
        let result = GeometryMap::new(vec![0.0, 1.0], vec![0.0, 1.0], vec![0.0, 1.0], &layout(3));
        assert!(matches!(result, Err(Error::Geometry(_))));
    }

    #[test]
    fn test_non_finite_rejected() {
        let result = GeometryMap::new(
            vec![0.0, f32::NAN],
            vec![0.0, 1.0],
            vec![0.0, 1.0],
            &layout(2),
        );
        assert!(matches!(result, Err(Error::Geometry(_))));
    }
}
