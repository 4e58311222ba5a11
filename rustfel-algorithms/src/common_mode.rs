//! Common-mode noise suppression.
//!
//! Common-mode noise is a per-readout-group additive offset that changes
//! frame to frame. Pixels are partitioned into groups (one per module, or
//! one per readout column within a module), a noise floor is estimated per
//! group, and the floor is subtracted from every pixel of that group.
//! Groups are independent, so modules are processed in parallel; the result
//! does not depend on evaluation order.

use rayon::prelude::*;
use rustfel_core::DetectorLayout;

/// Noise-floor estimator for one common-mode group.
///
/// The fraction is the configured `cmfloor` value: the estimator returns the
/// level below which that fraction of the group's current values fall.
pub trait FloorEstimator: Sync {
    /// Estimate the noise floor of `values` for the given fraction.
    fn floor(&self, values: &[f32], fraction: f32) -> f32;
}

/// Order-statistic (percentile) floor estimator.
///
/// Sorts a scratch copy with a total order on f32 so the estimate is
/// bit-reproducible, then picks the value at rank `floor(fraction * n)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PercentileFloor;

impl FloorEstimator for PercentileFloor {
    fn floor(&self, values: &[f32], fraction: f32) -> f32 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted = values.to_vec();
        sorted.sort_unstable_by(f32::total_cmp);
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
        #[allow(clippy::cast_possible_truncation)]
        let rank = ((sorted.len() as f32) * fraction) as usize;
        sorted[rank.min(sorted.len() - 1)]
    }
}

/// Subtract a per-module noise floor from every pixel.
pub fn suppress_by_module<E: FloorEstimator>(
    frame: &mut [f32],
    layout: &DetectorLayout,
    fraction: f32,
    estimator: &E,
) {
    frame
        .par_chunks_mut(layout.module_len())
        .for_each(|module| {
            let floor = estimator.floor(module, fraction);
            for v in module {
                *v -= floor;
            }
        });
}

/// Subtract a per-column noise floor within each module.
///
/// Modules run in parallel; columns within a module are strided slices of
/// the module chunk and are handled sequentially.
pub fn suppress_by_column<E: FloorEstimator>(
    frame: &mut [f32],
    layout: &DetectorLayout,
    fraction: f32,
    estimator: &E,
) {
    let cols = layout.module_cols;
    let rows = layout.module_rows;
    frame
        .par_chunks_mut(layout.module_len())
        .for_each(|module| {
            let mut column = Vec::with_capacity(rows);
            for c in 0..cols {
                column.clear();
                column.extend(module.iter().skip(c).step_by(cols));
                let floor = estimator.floor(&column, fraction);
                let mut i = c;
                while i < module.len() {
                    module[i] -= floor;
                    i += cols;
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn layout(panels: usize, rows: usize, cols: usize) -> DetectorLayout {
        DetectorLayout::new(panels, rows, cols).unwrap()
    }

    #[test]
    fn test_percentile_floor_order_statistic() {
        let values = [4.0, 1.0, 3.0, 2.0];
        // rank = floor(4 * 0.5) = 2 -> third smallest.
        assert_abs_diff_eq!(PercentileFloor.floor(&values, 0.5), 3.0);
        // rank = floor(4 * 0.1) = 0 -> minimum.
        assert_abs_diff_eq!(PercentileFloor.floor(&values, 0.1), 1.0);
        // rank clamps to the last element for fractions near 1.
        assert_abs_diff_eq!(PercentileFloor.floor(&values, 0.99), 4.0);
    }

    #[test]
    fn test_percentile_floor_empty_group() {
        assert_abs_diff_eq!(PercentileFloor.floor(&[], 0.5), 0.0);
    }

    #[test]
    fn test_uniform_module_collapses_to_zero() {
        let mut frame = vec![7.0; 8];
        suppress_by_module(&mut frame, &layout(2, 2, 2), 0.1, &PercentileFloor);
        for v in frame {
            assert_abs_diff_eq!(v, 0.0);
        }
    }

    #[test]
    fn test_modules_are_independent() {
        // Module 0 uniform at 5, module 1 uniform at 9.
        let mut frame = vec![5.0, 5.0, 5.0, 5.0, 9.0, 9.0, 9.0, 9.0];
        suppress_by_module(&mut frame, &layout(2, 2, 2), 0.25, &PercentileFloor);
        for v in frame {
            assert_abs_diff_eq!(v, 0.0);
        }
    }

    #[test]
    fn test_suppression_is_idempotent() {
        let mut once = vec![3.0, 8.0, 1.0, 6.0, 2.0, 9.0];
        suppress_by_module(&mut once, &layout(1, 2, 3), 0.3, &PercentileFloor);

        let mut twice = once.clone();
        suppress_by_module(&mut twice, &layout(1, 2, 3), 0.3, &PercentileFloor);

        // The floor of an already-floored group is zero, so a second pass
        // changes nothing.
        for (a, b) in once.iter().zip(&twice) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_column_groups_within_module() {
        // One 3x2 module: column 0 holds {10, 10, 10}, column 1 {4, 4, 4}.
        let mut frame = vec![10.0, 4.0, 10.0, 4.0, 10.0, 4.0];
        suppress_by_column(&mut frame, &layout(1, 3, 2), 0.2, &PercentileFloor);
        for v in frame {
            assert_abs_diff_eq!(v, 0.0);
        }
    }

    #[test]
    fn test_column_floor_does_not_leak_across_columns() {
        // Column 0: {0, 0}; column 1: {6, 8}. Floors 0 and 6.
        let mut frame = vec![0.0, 6.0, 0.0, 8.0];
        suppress_by_column(&mut frame, &layout(1, 2, 2), 0.3, &PercentileFloor);
        assert_abs_diff_eq!(frame[0], 0.0);
        assert_abs_diff_eq!(frame[1], 0.0);
        assert_abs_diff_eq!(frame[2], 0.0);
        assert_abs_diff_eq!(frame[3], 2.0);
    }
}
