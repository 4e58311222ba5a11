//! rustfel-core: Core types for serial X-ray detector frame reduction.
//!
//! This crate provides the foundational data model shared by the reduction
//! pipeline: detector layout, geometry map, dark-calibration reference,
//! processing configuration, and the per-frame event.
//!

pub mod config;
pub mod darkcal;
pub mod error;
pub mod event;
pub mod geometry;
pub mod layout;

pub use config::{CommonMode, ProcessingConfig};
pub use darkcal::CalibrationReference;
pub use error::{Error, Result};
pub use event::{Event, EventState, FrameMetadata};
pub use geometry::GeometryMap;
pub use layout::DetectorLayout;

/// Sentinel value marking a gap or saturated pixel in a raw frame.
///
/// The acquisition layer maps detector overflow onto this value so that
/// downstream stages can recognise invalid pixels after calibration.
pub const GAP_PIXEL: u16 = u16::MAX;
