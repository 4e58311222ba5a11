//! Bulk frame reader for block-organized HDF5 data files.
//!
//! The acquisition system stores a run as consecutive `data_NNNNNN` blocks
//! under `/entry/data` (or directly under `/entry`), each holding a fixed
//! number of frames in a 3-D dataset of shape `(frames, rows, cols)`. The
//! reader discovers the starting block number, derives the per-block frame
//! count from the first block's extent, and serves single frames through
//! hyperslab reads.
//!
//! Detector values are clamped on the way in: negative readings become 0,
//! saturated readings at or above `i16::MAX` (panel gaps) are mapped to the
//! gap sentinel so the assembler can recognise them.

use crate::error::{Error, Result};
use ndarray::s;
use rustfel_core::{FrameMetadata, GAP_PIXEL};
use std::path::Path;

/// Photon energy in eV for a 1 Angstrom beam.
const EV_PER_ANGSTROM: f64 = 12_390.0;

/// Run-level metadata read from the detector group of the data file.
#[derive(Clone, Debug)]
pub struct RunMetadata {
    /// Number of frames in the run.
    pub n_images: usize,
    /// Detector width in pixels.
    pub x_pixels: usize,
    /// Detector height in pixels.
    pub y_pixels: usize,
    /// Physical pixel size in metres, if recorded.
    pub pixel_size_m: Option<f64>,
    /// Sample-to-detector distance in metres, if recorded.
    pub detector_distance_m: Option<f64>,
    /// Beam wavelength in Angstrom; zero when the file does not record it.
    pub wavelength_a: f64,
    /// Beam centre in pixels, if recorded.
    pub beam_center: Option<(i32, i32)>,
}

impl RunMetadata {
    /// Sensor-native pixel count of one frame.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.x_pixels * self.y_pixels
    }
}

/// Reader over one block-organized run file.
pub struct FrameReader {
    data_group: hdf5::Group,
    metadata: RunMetadata,
    run_number: u64,
    start_block: usize,
    frames_per_block: usize,
}

impl FrameReader {
    /// Open a run file and read its metadata.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the data group or
    /// first block is missing, or the block dataset is not 3-D.
    pub fn open<P: AsRef<Path>>(path: P, run_number: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = hdf5::File::open(path).map_err(|e| {
            Error::InvalidFormat(format!("cannot open data file {}: {e}", path.display()))
        })?;

        let metadata = read_run_metadata(&file)?;

        let data_group = file
            .group("entry/data")
            .or_else(|_| file.group("entry"))
            .map_err(|_| {
                Error::InvalidFormat(format!("{}: no /entry group", path.display()))
            })?;

        let start_block = usize::from(!data_group.link_exists(&block_name(0)));
        let first = data_group.dataset(&block_name(start_block)).map_err(|_| {
            Error::InvalidFormat(format!(
                "{}: first data block {} missing",
                path.display(),
                block_name(start_block)
            ))
        })?;
        let shape = first.shape();
        if shape.len() != 3 {
            return Err(Error::InvalidFormat(format!(
                "{}: data block is {}-D, expected 3-D",
                path.display(),
                shape.len()
            )));
        }
        if shape[1] != metadata.y_pixels || shape[2] != metadata.x_pixels {
            return Err(Error::InvalidFormat(format!(
                "{}: block frames are {} x {}, metadata says {} x {}",
                path.display(),
                shape[2],
                shape[1],
                metadata.x_pixels,
                metadata.y_pixels
            )));
        }
        let frames_per_block = shape[0];
        if frames_per_block == 0 {
            return Err(Error::InvalidFormat(format!(
                "{}: first data block is empty",
                path.display()
            )));
        }

        log::info!(
            "{}: {} frames, {} per block, starting at {}",
            path.display(),
            metadata.n_images,
            frames_per_block,
            block_name(start_block)
        );

        Ok(Self {
            data_group,
            metadata,
            run_number,
            start_block,
            frames_per_block,
        })
    }

    /// Run-level metadata.
    #[must_use]
    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    /// Number of frames in the run.
    #[must_use]
    pub fn n_frames(&self) -> usize {
        self.metadata.n_images
    }

    /// Read one frame, clamped into the sensor-native intensity domain.
    ///
    /// # Errors
    /// Returns an error for a frame number outside the run or a missing or
    /// mis-shaped block.
    pub fn read_frame(&self, frame_number: usize) -> Result<(Vec<u16>, FrameMetadata)> {
        if frame_number >= self.metadata.n_images {
            return Err(Error::InvalidFormat(format!(
                "frame {frame_number} outside run of {} frames",
                self.metadata.n_images
            )));
        }

        let block = self.start_block + frame_number / self.frames_per_block;
        let offset = frame_number % self.frames_per_block;

        let dataset = self.data_group.dataset(&block_name(block))?;
        let slab = dataset.read_slice_2d::<i32, _>(s![offset, .., ..])?;

        let raw: Vec<u16> = slab
            .iter()
            .map(|&v| {
                if v < 0 {
                    0
                } else if v >= i32::from(i16::MAX) {
                    GAP_PIXEL
                } else {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    {
                        v as u16
                    }
                }
            })
            .collect();

        let wavelength_a = self.metadata.wavelength_a;
        let photon_energy_ev = if wavelength_a > 0.0 {
            EV_PER_ANGSTROM / wavelength_a
        } else {
            0.0
        };

        Ok((
            raw,
            FrameMetadata {
                frame_number: frame_number as u64,
                run_number: self.run_number,
                wavelength_a,
                photon_energy_ev,
            },
        ))
    }

    /// Iterate over all frames of the run in order.
    #[must_use]
    pub fn frames(&self) -> Frames<'_> {
        Frames {
            reader: self,
            next: 0,
        }
    }
}

/// Iterator over the frames of a run.
pub struct Frames<'a> {
    reader: &'a FrameReader,
    next: usize,
}

impl Iterator for Frames<'_> {
    type Item = Result<(Vec<u16>, FrameMetadata)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.reader.n_frames() {
            return None;
        }
        let item = self.reader.read_frame(self.next);
        self.next += 1;
        Some(item)
    }
}

fn block_name(block: usize) -> String {
    format!("data_{block:06}")
}

fn read_run_metadata(file: &hdf5::File) -> Result<RunMetadata> {
    let detector = "entry/instrument/detector";

    let n_images = read_scalar::<i32>(file, &format!("{detector}/detectorSpecific/nimages"))
        .ok_or_else(|| Error::InvalidFormat("nimages not recorded".to_string()))?;
    let x_pixels = read_scalar::<i32>(
        file,
        &format!("{detector}/detectorSpecific/x_pixels_in_detector"),
    )
    .ok_or_else(|| Error::InvalidFormat("x_pixels_in_detector not recorded".to_string()))?;
    let y_pixels = read_scalar::<i32>(
        file,
        &format!("{detector}/detectorSpecific/y_pixels_in_detector"),
    )
    .ok_or_else(|| Error::InvalidFormat("y_pixels_in_detector not recorded".to_string()))?;

    if n_images < 0 || x_pixels <= 0 || y_pixels <= 0 {
        return Err(Error::InvalidFormat(format!(
            "implausible run metadata: {n_images} images of {x_pixels} x {y_pixels}"
        )));
    }

    let pixel_size_m = read_scalar::<f64>(file, &format!("{detector}/x_pixel_size"));
    let detector_distance_m = read_scalar::<f64>(file, &format!("{detector}/detector_distance"));

    let beam_x = read_scalar::<i32>(file, &format!("{detector}/beam_center_x"));
    let beam_y = read_scalar::<i32>(file, &format!("{detector}/beam_center_y"));
    let beam_center = beam_x.zip(beam_y);

    // Wavelength can live in several places depending on the writer.
    let wavelength_a = [
        "entry/instrument/beam/wavelength",
        "entry/instrument/monochromator/wavelength",
        "entry/instrument/beam/incident_wavelength",
    ]
    .iter()
    .find_map(|path| read_scalar::<f64>(file, path).filter(|&w| w > 0.0))
    .unwrap_or_else(|| {
        log::warn!("wavelength not recorded in data file; photon energy unavailable");
        0.0
    });

    #[allow(clippy::cast_sign_loss)]
    let (n_images, x_pixels, y_pixels) =
        (n_images as usize, x_pixels as usize, y_pixels as usize);

    Ok(RunMetadata {
        n_images,
        x_pixels,
        y_pixels,
        pixel_size_m,
        detector_distance_m,
        wavelength_a,
        beam_center,
    })
}

fn read_scalar<T: hdf5::H5Type + Clone>(file: &hdf5::File, path: &str) -> Option<T> {
    file.dataset(path)
        .ok()
        .and_then(|ds| ds.read_scalar::<T>().ok())
}
