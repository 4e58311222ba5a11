//! rustfel-io: HDF5 I/O for the reduction pipeline.
//!
//! Loaders for the detector geometry and dark-calibration reference, a
//! reader for bulk block-organized frame files, and writers for assembled
//! images and powder snapshots.
//!

mod darkcal;
mod error;
mod frames;
mod geometry;
mod writer;

pub use darkcal::load_darkcal;
pub use error::{Error, Result};
pub use frames::{FrameReader, Frames, RunMetadata};
pub use geometry::load_geometry;
pub use writer::{
    read_assembled_hdf5, read_powder_hdf5, write_assembled_hdf5, write_powder_hdf5,
    Hdf5AssembledSink,
};
