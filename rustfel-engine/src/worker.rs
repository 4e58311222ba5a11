//! Per-event worker pipeline.

use crate::context::RunContext;
use crate::error::{Error, Result};
use rustfel_algorithms::{assemble, calibrate, PercentileFloor};
use rustfel_core::{Event, EventState, FrameMetadata};

/// Destination for assembled per-frame images.
///
/// Implemented by the persistence layer; the engine only hands over the
/// finished canvas. A sink failure counts as a per-frame error and abandons
/// the event.
pub trait AssembledSink: Send + Sync {
    /// Persist one assembled image.
    ///
    /// # Errors
    /// Returns an error if the image cannot be written.
    fn write_assembled(
        &self,
        metadata: &FrameMetadata,
        canvas: &[f32],
        canvas_size: usize,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Run one event through calibration, assembly, and accumulation.
///
/// Calibration and assembly are lock-free; the only synchronization point
/// is the accumulator update. On any error the caller abandons the event;
/// the accumulate stage is never entered with partial data.
pub(crate) fn process_event(
    event: &mut Event,
    ctx: &RunContext,
    sink: Option<&dyn AssembledSink>,
) -> Result<()> {
    event.advance(EventState::Calibrating)?;
    event.corrected = calibrate(&event.raw, &ctx.darkcal, &ctx.config, &PercentileFloor)?;

    event.advance(EventState::Assembling)?;
    event.assembled = assemble(&event.corrected, &ctx.geometry, ctx.collision_policy)?;

    if let Some(sink) = sink {
        sink.write_assembled(&event.metadata, &event.assembled, ctx.geometry.canvas_size())
            .map_err(|e| Error::Sink(e.to_string()))?;
    }

    event.advance(EventState::Accumulating)?;
    if !ctx.accumulators.is_empty() {
        ctx.accumulators.accumulate(0, &event.assembled)?;
    }

    event.advance(EventState::Finished)?;
    Ok(())
}
