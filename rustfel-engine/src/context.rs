//! Shared run context.
//!
//! One immutable aggregate constructed at startup and passed by reference
//! (via `Arc`) to every worker. Only the accumulators carry internal
//! locking; configuration, geometry, and the dark reference are read-only
//! for the whole run.

use crate::accumulator::AccumulatorSet;
use crate::error::{Error, Result};
use rustfel_algorithms::CollisionPolicy;
use rustfel_core::{CalibrationReference, GeometryMap, ProcessingConfig};

/// Read-only state shared by all workers for the lifetime of a run.
pub struct RunContext {
    /// Processing options, fixed at startup.
    pub config: ProcessingConfig,
    /// Pixel coordinate table.
    pub geometry: GeometryMap,
    /// Dark-calibration baseline.
    pub darkcal: CalibrationReference,
    /// Powder accumulators (empty when powder sums are disabled).
    pub accumulators: AccumulatorSet,
    /// Canvas-cell collision policy derived from the configuration.
    pub collision_policy: CollisionPolicy,
}

impl RunContext {
    /// Validate the startup inputs against each other and build the context.
    ///
    /// A size mismatch here is a fatal startup condition: the pool is never
    /// started and the run aborts.
    ///
    /// # Errors
    /// Returns an error if the geometry or dark reference does not match the
    /// configured detector layout, or if the configuration is invalid.
    pub fn new(
        config: ProcessingConfig,
        geometry: GeometryMap,
        darkcal: CalibrationReference,
    ) -> Result<Self> {
        config.validate()?;
        let expected = config.layout.pixel_count();
        if geometry.pixel_count() != expected {
            return Err(Error::Core(rustfel_core::Error::Geometry(format!(
                "geometry covers {} pixels, detector layout expects {expected}",
                geometry.pixel_count()
            ))));
        }
        if darkcal.len() != expected {
            return Err(Error::Core(rustfel_core::Error::Frame(format!(
                "calibration reference covers {} pixels, detector layout expects {expected}",
                darkcal.len()
            ))));
        }

        let accumulator_count = usize::from(config.powder_sum);
        let accumulators = AccumulatorSet::new(accumulator_count, geometry.canvas_len());
        let collision_policy = CollisionPolicy::for_raw_fidelity(config.save_raw);

        Ok(Self {
            config,
            geometry,
            darkcal,
            accumulators,
            collision_policy,
        })
    }
}
