//! Writers for assembled images and powder snapshots.

use crate::error::{Error, Result};
use ndarray::ArrayView2;
use rustfel_core::FrameMetadata;
use rustfel_engine::{AssembledSink, PowderSnapshot};
use std::path::{Path, PathBuf};

/// Write one assembled frame image with its beam metadata.
///
/// The canvas is stored as a square `data` dataset; frame identifiers and
/// beam parameters become attributes on it.
///
/// # Errors
/// Returns an error if the canvas does not match `canvas_size` or HDF5 I/O
/// fails.
pub fn write_assembled_hdf5<P: AsRef<Path>>(
    path: P,
    metadata: &FrameMetadata,
    canvas: &[f32],
    canvas_size: usize,
) -> Result<()> {
    let view = canvas_view(canvas, canvas_size)?;
    let file = hdf5::File::create(path)?;
    let ds = file
        .new_dataset::<f32>()
        .shape((canvas_size, canvas_size))
        .create("data")?;
    ds.write(view)?;

    ds.new_attr::<u64>()
        .create("frame_number")?
        .write_scalar(&metadata.frame_number)?;
    ds.new_attr::<u64>()
        .create("run_number")?
        .write_scalar(&metadata.run_number)?;
    ds.new_attr::<f64>()
        .create("wavelength_a")?
        .write_scalar(&metadata.wavelength_a)?;
    ds.new_attr::<f64>()
        .create("photon_energy_ev")?
        .write_scalar(&metadata.photon_energy_ev)?;
    Ok(())
}

/// Read back an assembled frame image.
///
/// # Errors
/// Returns an error if the file is unreadable or the dataset is not square.
pub fn read_assembled_hdf5<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, usize)> {
    let file = hdf5::File::open(path)?;
    let ds = file.dataset("data")?;
    let shape = ds.shape();
    if shape.len() != 2 || shape[0] != shape[1] {
        return Err(Error::InvalidFormat(format!(
            "assembled image dataset has shape {shape:?}, expected square 2-D"
        )));
    }
    Ok((ds.read_raw::<f32>()?, shape[0]))
}

/// Write a powder snapshot: the running sum plus its frame count.
///
/// # Errors
/// Returns an error if the sum does not match `canvas_size` or HDF5 I/O
/// fails.
pub fn write_powder_hdf5<P: AsRef<Path>>(
    path: P,
    snapshot: &PowderSnapshot,
    canvas_size: usize,
) -> Result<()> {
    let view = canvas_view(&snapshot.sum, canvas_size)?;
    let file = hdf5::File::create(path)?;
    let ds = file
        .new_dataset::<f64>()
        .shape((canvas_size, canvas_size))
        .create("data")?;
    ds.write(view)?;
    ds.new_attr::<u64>()
        .create("nframes")?
        .write_scalar(&snapshot.frames)?;
    Ok(())
}

/// Read back a powder snapshot.
///
/// # Errors
/// Returns an error if the file is unreadable or malformed.
pub fn read_powder_hdf5<P: AsRef<Path>>(path: P) -> Result<PowderSnapshot> {
    let file = hdf5::File::open(path)?;
    let ds = file.dataset("data")?;
    let shape = ds.shape();
    if shape.len() != 2 || shape[0] != shape[1] {
        return Err(Error::InvalidFormat(format!(
            "powder dataset has shape {shape:?}, expected square 2-D"
        )));
    }
    let sum = ds.read_raw::<f64>()?;
    let frames = ds.attr("nframes")?.read_scalar::<u64>()?;
    Ok(PowderSnapshot { sum, frames })
}

fn canvas_view<T>(canvas: &[T], canvas_size: usize) -> Result<ArrayView2<'_, T>> {
    ArrayView2::from_shape((canvas_size, canvas_size), canvas).map_err(|e| {
        Error::InvalidFormat(format!(
            "canvas of {} cells is not {canvas_size} x {canvas_size}: {e}",
            canvas.len()
        ))
    })
}

/// Sink writing one HDF5 file per assembled frame into a directory.
pub struct Hdf5AssembledSink {
    dir: PathBuf,
}

impl Hdf5AssembledSink {
    /// Create the sink, making the output directory if needed.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn frame_path(&self, metadata: &FrameMetadata) -> PathBuf {
        self.dir.join(format!(
            "r{:04}-f{:06}.h5",
            metadata.run_number, metadata.frame_number
        ))
    }
}

impl AssembledSink for Hdf5AssembledSink {
    fn write_assembled(
        &self,
        metadata: &FrameMetadata,
        canvas: &[f32],
        canvas_size: usize,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        write_assembled_hdf5(self.frame_path(metadata), metadata, canvas, canvas_size)?;
        Ok(())
    }
}
