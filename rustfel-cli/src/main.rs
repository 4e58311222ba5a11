//!
//! Frame-reduction driver: reads a block-organized run file, pushes every
//! frame through the worker pool, and writes the powder snapshot at the end.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::Parser;
use rustfel_core::ProcessingConfig;
use rustfel_engine::{AssembledSink, RunContext, WorkerPool};
use rustfel_io::{load_darkcal, load_geometry, write_powder_hdf5, FrameReader, Hdf5AssembledSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    RustfelIo(#[from] rustfel_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] rustfel_core::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] rustfel_engine::Error),

    #[error("{0}")]
    Startup(String),
}

/// Serial X-ray detector frame reduction.
#[derive(Parser)]
#[command(name = "rustfel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input run file (block-organized HDF5)
    input: PathBuf,

    /// Configuration file (tag = value pairs)
    #[arg(short, long, default_value = "rustfel.ini")]
    config: PathBuf,

    /// Run number recorded in outputs
    #[arg(long, default_value = "0")]
    run_number: u64,

    /// Powder snapshot output path
    #[arg(long, default_value = "powder.h5")]
    powder_output: PathBuf,

    /// Directory for assembled per-frame images (with saveraw)
    #[arg(long, default_value = "assembled")]
    output_dir: PathBuf,

    /// Worker count override (nthreads tag)
    #[arg(long)]
    nthreads: Option<usize>,

    /// Geometry file override (geometry tag)
    #[arg(long)]
    geometry: Option<PathBuf>,

    /// Darkcal file override (darkcal tag)
    #[arg(long)]
    darkcal: Option<PathBuf>,

    /// Per-module common-mode override (cmmodule tag)
    #[arg(long)]
    cmmodule: Option<i64>,

    /// Per-column common-mode override (cmcolumn tag)
    #[arg(long)]
    cmcolumn: Option<i64>,

    /// Background subtraction override (subtractbg tag)
    #[arg(long)]
    subtractbg: Option<i64>,

    /// Dark subtraction override (subtractdarkcal tag)
    #[arg(long)]
    subtractdarkcal: Option<i64>,

    /// Powder accumulation override (powdersum tag)
    #[arg(long)]
    powdersum: Option<i64>,

    /// Raw-fidelity image saving override (saveraw tag)
    #[arg(long)]
    saveraw: Option<i64>,

    /// Common-mode floor fraction override (cmfloor tag)
    #[arg(long)]
    cmfloor: Option<f32>,

    /// Debug level override (debuglevel tag)
    #[arg(long)]
    debuglevel: Option<u32>,
}

impl Cli {
    /// Assemble the run configuration: defaults, then the configuration
    /// file, then command-line overrides of the same tags.
    fn build_config(&self) -> Result<ProcessingConfig> {
        let mut config = ProcessingConfig::from_file(&self.config)?;

        let overrides: [(&str, Option<String>); 10] = [
            ("nthreads", self.nthreads.map(|v| v.to_string())),
            (
                "geometry",
                self.geometry.as_ref().map(|p| p.display().to_string()),
            ),
            (
                "darkcal",
                self.darkcal.as_ref().map(|p| p.display().to_string()),
            ),
            ("cmmodule", self.cmmodule.map(|v| v.to_string())),
            ("cmcolumn", self.cmcolumn.map(|v| v.to_string())),
            ("subtractbg", self.subtractbg.map(|v| v.to_string())),
            (
                "subtractdarkcal",
                self.subtractdarkcal.map(|v| v.to_string()),
            ),
            ("powdersum", self.powdersum.map(|v| v.to_string())),
            ("saveraw", self.saveraw.map(|v| v.to_string())),
            ("cmfloor", self.cmfloor.map(|v| v.to_string())),
        ];
        for (tag, value) in overrides {
            if let Some(value) = value {
                config.apply_tag(tag, &value)?;
            }
        }
        if let Some(level) = self.debuglevel {
            config.apply_tag("debuglevel", &level.to_string())?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = cli.build_config()?;

    // Startup sequence: all fatal checks happen before the pool exists.
    let reader = FrameReader::open(&cli.input, cli.run_number)?;
    let pixel_count = config.layout.pixel_count();
    if reader.metadata().pixel_count() != pixel_count {
        return Err(CliError::Startup(format!(
            "run file frames have {} pixels, configured layout expects {}",
            reader.metadata().pixel_count(),
            pixel_count
        )));
    }

    let geometry = load_geometry(&config.geometry_file, &config.layout, config.pixel_pitch_m)?;
    let darkcal = load_darkcal(&config.darkcal_file, pixel_count)?;

    let canvas_size = geometry.canvas_size();
    let powder_enabled = config.powder_sum;
    let save_raw = config.save_raw;
    let n_threads = config.n_threads;
    let debug_level = config.debug_level;

    let ctx = Arc::new(RunContext::new(config, geometry, darkcal)?);

    let sink: Option<Arc<dyn AssembledSink>> = if save_raw {
        Some(Arc::new(Hdf5AssembledSink::new(&cli.output_dir)?))
    } else {
        None
    };

    let pool = WorkerPool::new(Arc::clone(&ctx), sink)?;
    log::info!(
        "processing {} frames on {} workers",
        reader.n_frames(),
        n_threads
    );

    let start = Instant::now();
    let mut last_report = Instant::now();
    let mut last_reported_frame = 0_u64;
    let mut dispatched = 0_u64;

    for item in reader.frames() {
        let (raw, metadata) = item?;
        if debug_level >= 3 {
            log::debug!(
                "dispatching frame {} ({:.0} eV)",
                metadata.frame_number,
                metadata.photon_energy_ev
            );
        }
        pool.dispatch(raw, metadata)?;
        dispatched += 1;

        // Periodic data-rate report, once a second at most.
        let elapsed = last_report.elapsed().as_secs_f64();
        if elapsed > 1.0 {
            let rate = (dispatched - last_reported_frame) as f64 / elapsed;
            log::info!("frame {}: {:.1} frames/s", dispatched, rate);
            last_report = Instant::now();
            last_reported_frame = dispatched;
        }
    }

    pool.drain();

    if powder_enabled {
        let snapshot = ctx.accumulators.snapshot(0)?;
        write_powder_hdf5(&cli.powder_output, &snapshot, canvas_size)?;
        log::info!(
            "powder sum of {} frames written to {}",
            snapshot.frames,
            cli.powder_output.display()
        );
    }

    let counters = pool.counters();
    pool.shutdown();

    let elapsed = start.elapsed();
    println!(
        "Processed {} frames in {:.2}s ({:.1} frames/s)",
        counters.dispatched,
        elapsed.as_secs_f64(),
        counters.dispatched as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    Ok(())
}
