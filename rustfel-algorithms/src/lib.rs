//! rustfel-algorithms: Per-frame numerics for the reduction pipeline.
//!
//! This crate holds the pure, lock-free stages that run inside a worker:
//! the calibration pipeline (dark subtraction, common-mode suppression,
//! background offset) and the geometry-driven image assembler. Everything
//! here is a function of its inputs; shared state stays in rustfel-engine.

pub mod assemble;
pub mod calibrate;
pub mod common_mode;

pub use assemble::{assemble, CollisionPolicy, GAP_THRESHOLD};
pub use calibrate::calibrate;
pub use common_mode::{suppress_by_column, suppress_by_module, FloorEstimator, PercentileFloor};
