//! rustfel-engine: Concurrent frame-processing engine.
//!
//! A bounded worker pool consumes raw detector frames, runs the per-frame
//! pipeline (calibration, assembly, accumulation), and aggregates powder
//! sums across frames. The producer blocks inside [`WorkerPool::dispatch`]
//! when all slots are busy; that is the sole backpressure mechanism.

mod accumulator;
mod context;
mod error;
mod pool;
mod worker;

pub use accumulator::{AccumulatorSet, PowderAccumulator, PowderSnapshot};
pub use context::RunContext;
pub use error::{Error, Result};
pub use pool::{PoolCounters, WorkerPool};
pub use worker::AssembledSink;
