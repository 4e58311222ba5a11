//! End-to-end pipeline tests across dispatch, calibration, assembly, and
//! accumulation.

use rustfel_core::{
    CalibrationReference, CommonMode, DetectorLayout, FrameMetadata, GeometryMap,
    ProcessingConfig,
};
use rustfel_engine::{AssembledSink, RunContext, WorkerPool};
use std::sync::{Arc, Mutex};

fn small_layout() -> DetectorLayout {
    DetectorLayout::new(1, 2, 2).unwrap()
}

/// Pixel i -> canvas (i % 2, i / 2) on a 2x2 canvas.
fn unit_geometry() -> GeometryMap {
    GeometryMap::new(
        vec![0.0, 1.0, 0.0, 1.0],
        vec![0.0, 0.0, 1.0, 1.0],
        vec![0.0; 4],
        &small_layout(),
    )
    .unwrap()
}

fn passthrough_config(n_threads: usize) -> ProcessingConfig {
    ProcessingConfig {
        n_threads,
        common_mode: CommonMode::Disabled,
        subtract_bg: false,
        subtract_darkcal: false,
        layout: small_layout(),
        ..ProcessingConfig::default()
    }
}

fn metadata(frame_number: u64) -> FrameMetadata {
    FrameMetadata {
        frame_number,
        run_number: 42,
        wavelength_a: 1.3,
        photon_energy_ev: 12390.0 / 1.3,
    }
}

#[test]
fn powder_sum_after_two_identical_frames() {
    let ctx = Arc::new(
        RunContext::new(
            passthrough_config(1),
            unit_geometry(),
            CalibrationReference::zeros(4),
        )
        .unwrap(),
    );
    let pool = WorkerPool::new(Arc::clone(&ctx), None).unwrap();

    pool.dispatch(vec![10, 20, 30, 40], metadata(0)).unwrap();
    pool.drain();
    let snap = ctx.accumulators.snapshot(0).unwrap();
    assert_eq!(snap.frames, 1);
    assert_eq!(snap.sum, vec![10.0, 20.0, 30.0, 40.0]);

    pool.dispatch(vec![10, 20, 30, 40], metadata(1)).unwrap();
    pool.drain();
    let snap = ctx.accumulators.snapshot(0).unwrap();
    assert_eq!(snap.frames, 2);
    assert_eq!(snap.sum, vec![20.0, 40.0, 60.0, 80.0]);

    pool.shutdown();
}

#[test]
fn dark_subtraction_through_the_pool() {
    let config = ProcessingConfig {
        subtract_darkcal: true,
        ..passthrough_config(1)
    };
    let ctx = Arc::new(
        RunContext::new(
            config,
            unit_geometry(),
            CalibrationReference::new(vec![5, 5, 5, 5]),
        )
        .unwrap(),
    );
    let pool = WorkerPool::new(Arc::clone(&ctx), None).unwrap();
    pool.dispatch(vec![10, 20, 30, 40], metadata(0)).unwrap();
    pool.drain();

    let snap = ctx.accumulators.snapshot(0).unwrap();
    assert_eq!(snap.sum, vec![5.0, 15.0, 25.0, 35.0]);
}

#[test]
fn accumulator_order_independence_under_concurrency() {
    // Many distinct frames through four workers: whatever order the workers
    // finish in, the powder sum must match the sequential total.
    let frames: Vec<Vec<u16>> = (0..64_u16)
        .map(|k| vec![k, 2 * k, 3 * k, 4 * k])
        .collect();

    let mut expected = [0.0_f64; 4];
    for frame in &frames {
        for (acc, &v) in expected.iter_mut().zip(frame) {
            *acc += f64::from(v);
        }
    }

    let ctx = Arc::new(
        RunContext::new(
            passthrough_config(4),
            unit_geometry(),
            CalibrationReference::zeros(4),
        )
        .unwrap(),
    );
    let pool = WorkerPool::new(Arc::clone(&ctx), None).unwrap();
    for (i, frame) in frames.into_iter().enumerate() {
        pool.dispatch(frame, metadata(i as u64)).unwrap();
    }
    pool.drain();

    let snap = ctx.accumulators.snapshot(0).unwrap();
    assert_eq!(snap.frames, 64);
    assert_eq!(snap.sum, expected);
}

struct RecordingSink {
    images: Mutex<Vec<(u64, Vec<f32>)>>,
}

impl AssembledSink for RecordingSink {
    fn write_assembled(
        &self,
        metadata: &FrameMetadata,
        canvas: &[f32],
        _canvas_size: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.images
            .lock()
            .unwrap()
            .push((metadata.frame_number, canvas.to_vec()));
        Ok(())
    }
}

#[test]
fn assembled_images_reach_the_sink() {
    let ctx = Arc::new(
        RunContext::new(
            passthrough_config(2),
            unit_geometry(),
            CalibrationReference::zeros(4),
        )
        .unwrap(),
    );
    let sink = Arc::new(RecordingSink {
        images: Mutex::new(Vec::new()),
    });
    let pool = WorkerPool::new(
        Arc::clone(&ctx),
        Some(Arc::clone(&sink) as Arc<dyn AssembledSink>),
    )
    .unwrap();
    for i in 0..6 {
        pool.dispatch(vec![1, 2, 3, 4], metadata(i)).unwrap();
    }
    pool.drain();
    pool.shutdown();

    let mut images = sink.images.lock().unwrap().clone();
    images.sort_by_key(|(frame, _)| *frame);
    assert_eq!(images.len(), 6);
    for (i, (frame, canvas)) in images.iter().enumerate() {
        assert_eq!(*frame, i as u64);
        assert_eq!(canvas, &vec![1.0, 2.0, 3.0, 4.0]);
    }
}

struct FailingSink;

impl AssembledSink for FailingSink {
    fn write_assembled(
        &self,
        _metadata: &FrameMetadata,
        _canvas: &[f32],
        _canvas_size: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("disk full".into())
    }
}

#[test]
fn sink_failure_abandons_frame_without_accumulating() {
    let ctx = Arc::new(
        RunContext::new(
            passthrough_config(2),
            unit_geometry(),
            CalibrationReference::zeros(4),
        )
        .unwrap(),
    );
    let pool = WorkerPool::new(
        Arc::clone(&ctx),
        Some(Arc::new(FailingSink) as Arc<dyn AssembledSink>),
    )
    .unwrap();
    for i in 0..4 {
        pool.dispatch(vec![1, 2, 3, 4], metadata(i)).unwrap();
    }
    pool.drain();

    // Every frame failed at the sink; none may reach the powder sum, and the
    // pool must still be in a clean drained state.
    assert_eq!(ctx.accumulators.snapshot(0).unwrap().frames, 0);
    let counters = pool.counters();
    assert_eq!(counters.in_flight, 0);
    assert_eq!(counters.dispatched, 4);
}
