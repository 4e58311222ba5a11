//! Per-frame processing event.
//!
//! One `Event` exists per dispatched frame. It owns the raw frame and the
//! working buffers for the corrected and assembled images, so everything a
//! frame needs is released in one place when the event reaches a terminal
//! state and is dropped. Events are exclusively owned by the worker that
//! processes them and are never shared.

use crate::error::{Error, Result};
use std::time::{Duration, Instant};

/// Per-frame identifiers and beam parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameMetadata {
    /// Sequential frame number within the run.
    pub frame_number: u64,
    /// Run identifier.
    pub run_number: u64,
    /// Beam wavelength in Angstrom.
    pub wavelength_a: f64,
    /// Photon energy in eV, derived from the wavelength.
    pub photon_energy_ev: f64,
}

/// Lifecycle of an event through the per-frame pipeline.
///
/// Transitions are strictly forward; `Finished` and `Abandoned` are terminal
/// and trigger release of the worker slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventState {
    Created,
    Calibrating,
    Assembling,
    Accumulating,
    Finished,
    Abandoned,
}

impl EventState {
    /// Returns true for states that end processing of the frame.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Abandoned)
    }
}

/// One frame in flight through the pipeline.
#[derive(Debug)]
pub struct Event {
    /// Frame identifiers and beam parameters.
    pub metadata: FrameMetadata,
    /// Sensor-native raw intensities.
    pub raw: Vec<u16>,
    /// Corrected frame, filled by the calibration stage.
    pub corrected: Vec<f32>,
    /// Assembled canvas image, filled by the assembly stage.
    pub assembled: Vec<f32>,
    arrived: Instant,
    finished: Option<Instant>,
    state: EventState,
}

impl Event {
    /// Create an event for a newly arrived frame, taking ownership of it.
    #[must_use]
    pub fn new(raw: Vec<u16>, metadata: FrameMetadata) -> Self {
        Self {
            metadata,
            raw,
            corrected: Vec::new(),
            assembled: Vec::new(),
            arrived: Instant::now(),
            finished: None,
            state: EventState::Created,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> EventState {
        self.state
    }

    /// Advance to the next pipeline stage.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransition`] unless `next` is the immediate
    /// successor of the current state.
    pub fn advance(&mut self, next: EventState) -> Result<()> {
        let expected = match self.state {
            EventState::Created => EventState::Calibrating,
            EventState::Calibrating => EventState::Assembling,
            EventState::Assembling => EventState::Accumulating,
            EventState::Accumulating => EventState::Finished,
            EventState::Finished | EventState::Abandoned => {
                return Err(Error::InvalidTransition {
                    from: self.state,
                    to: next,
                })
            }
        };
        if next != expected {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        if next == EventState::Finished {
            self.finished = Some(Instant::now());
        }
        self.state = next;
        Ok(())
    }

    /// Abandon the event after an unrecoverable per-frame error.
    ///
    /// Reachable from any non-terminal state; a no-op on terminal events.
    pub fn abandon(&mut self) {
        if !self.state.is_terminal() {
            self.state = EventState::Abandoned;
            self.finished = Some(Instant::now());
        }
    }

    /// Arrival timestamp recorded at dispatch.
    #[must_use]
    pub fn arrived(&self) -> Instant {
        self.arrived
    }

    /// Wall-clock time from dispatch to a terminal state, if reached.
    #[must_use]
    pub fn processing_time(&self) -> Option<Duration> {
        self.finished.map(|t| t.duration_since(self.arrived))
    }
}
