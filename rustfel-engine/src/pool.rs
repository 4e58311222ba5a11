//! Bounded worker pool and dispatcher.
//!
//! A fixed number of worker threads is spawned at startup and never changes.
//! Frames are handed over a rendezvous channel: [`WorkerPool::dispatch`]
//! blocks the producer until a worker is free to take the frame, which is
//! the run's only backpressure mechanism — there is no queue beyond FIFO
//! admission at the channel. Completion order between frames is not
//! guaranteed.
//!
//! Slot bookkeeping lives under one mutex that is never held during frame
//! processing. A single failed frame is abandoned and its slot released;
//! the pool itself keeps running.

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::worker::{process_event, AssembledSink};
use rustfel_core::{Event, FrameMetadata};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

struct PoolState {
    busy: usize,
    in_flight: usize,
    dispatched: u64,
}

struct PoolShared {
    state: Mutex<PoolState>,
    drained: Condvar,
}

/// Snapshot of the pool's bookkeeping counters.
#[derive(Clone, Copy, Debug)]
pub struct PoolCounters {
    /// Configured worker-slot capacity.
    pub capacity: usize,
    /// Workers currently processing a frame.
    pub busy: usize,
    /// Frames dispatched but not yet finished or abandoned.
    pub in_flight: usize,
    /// Total frames accepted since startup.
    pub dispatched: u64,
}

/// Fixed-capacity pool running the per-frame pipeline.
pub struct WorkerPool {
    capacity: usize,
    tx: Option<SyncSender<Event>>,
    handles: Vec<JoinHandle<()>>,
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Spawn the pool with the context's configured worker count.
    ///
    /// # Errors
    /// Returns [`Error::Pool`] if a worker thread cannot be spawned.
    pub fn new(context: Arc<RunContext>, sink: Option<Arc<dyn AssembledSink>>) -> Result<Self> {
        let capacity = context.config.n_threads;
        let (tx, rx) = mpsc::sync_channel::<Event>(0);
        let rx = Arc::new(Mutex::new(rx));
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                busy: 0,
                in_flight: 0,
                dispatched: 0,
            }),
            drained: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(capacity);
        for id in 0..capacity {
            let rx = Arc::clone(&rx);
            let shared = Arc::clone(&shared);
            let context = Arc::clone(&context);
            let sink = sink.clone();
            let handle = thread::Builder::new()
                .name(format!("rustfel-worker-{id}"))
                .spawn(move || worker_loop(&rx, &shared, &context, sink))
                .map_err(|e| Error::Pool(format!("cannot spawn worker {id}: {e}")))?;
            handles.push(handle);
        }

        Ok(Self {
            capacity,
            tx: Some(tx),
            handles,
            shared,
        })
    }

    /// Hand a frame to a free worker, blocking while the pool is saturated.
    ///
    /// Creates the frame's event at dispatch time and returns as soon as a
    /// worker has taken it; processing completes asynchronously.
    ///
    /// # Errors
    /// Returns [`Error::Pool`] if the pool has shut down.
    pub fn dispatch(&self, raw: Vec<u16>, metadata: FrameMetadata) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::Pool("pool has shut down".to_string()))?;

        {
            let mut state = self.shared.state.lock().unwrap();
            state.dispatched += 1;
            state.in_flight += 1;
        }

        let event = Event::new(raw, metadata);
        if tx.send(event).is_err() {
            let mut state = self.shared.state.lock().unwrap();
            state.dispatched -= 1;
            state.in_flight -= 1;
            drop(state);
            self.shared.drained.notify_all();
            return Err(Error::Pool("all workers have exited".to_string()));
        }
        Ok(())
    }

    /// Block until every in-flight frame has finished or been abandoned.
    pub fn drain(&self) {
        let mut state = self.shared.state.lock().unwrap();
        while state.in_flight > 0 {
            state = self.shared.drained.wait(state).unwrap();
        }
    }

    /// Current bookkeeping counters.
    #[must_use]
    pub fn counters(&self) -> PoolCounters {
        let state = self.shared.state.lock().unwrap();
        PoolCounters {
            capacity: self.capacity,
            busy: state.busy,
            in_flight: state.in_flight,
            dispatched: state.dispatched,
        }
    }

    /// Configured worker-slot capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop accepting frames and join all workers.
    pub fn shutdown(mut self) {
        self.close_and_join();
    }

    fn close_and_join(&mut self) {
        self.tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close_and_join();
    }
}

fn worker_loop(
    rx: &Mutex<Receiver<Event>>,
    shared: &PoolShared,
    ctx: &RunContext,
    sink: Option<Arc<dyn AssembledSink>>,
) {
    loop {
        // Hold the receiver lock only for the handoff itself.
        let received = { rx.lock().unwrap().recv() };
        let Ok(mut event) = received else { break };

        {
            let mut state = shared.state.lock().unwrap();
            state.busy += 1;
        }

        if let Err(err) = process_event(&mut event, ctx, sink.as_deref()) {
            log::warn!(
                "frame {} abandoned: {err}",
                event.metadata.frame_number
            );
            event.abandon();
        }

        let mut state = shared.state.lock().unwrap();
        state.busy -= 1;
        state.in_flight -= 1;
        drop(state);
        shared.drained.notify_all();
        // Event dropped here: its buffers are released with the slot.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfel_core::{
        CalibrationReference, CommonMode, DetectorLayout, GeometryMap, ProcessingConfig,
    };

    fn context(n_threads: usize) -> Arc<RunContext> {
        let layout = DetectorLayout::new(1, 2, 2).unwrap();
        let config = ProcessingConfig {
            n_threads,
            common_mode: CommonMode::Disabled,
            subtract_bg: false,
            subtract_darkcal: false,
            layout,
            ..ProcessingConfig::default()
        };
        let geometry = GeometryMap::new(
            vec![0.0, 1.0, 0.0, 1.0],
            vec![0.0, 0.0, 1.0, 1.0],
            vec![0.0; 4],
            &layout,
        )
        .unwrap();
        Arc::new(RunContext::new(config, geometry, CalibrationReference::zeros(4)).unwrap())
    }

    fn metadata(frame_number: u64) -> FrameMetadata {
        FrameMetadata {
            frame_number,
            run_number: 1,
            wavelength_a: 1.0,
            photon_energy_ev: 12390.0,
        }
    }

    #[test]
    fn test_drain_without_dispatch_returns() {
        let pool = WorkerPool::new(context(2), None).unwrap();
        pool.drain();
        let counters = pool.counters();
        assert_eq!(counters.in_flight, 0);
        assert_eq!(counters.dispatched, 0);
    }

    #[test]
    fn test_dispatch_counts_and_drain() {
        let ctx = context(2);
        let pool = WorkerPool::new(Arc::clone(&ctx), None).unwrap();
        for i in 0..10 {
            pool.dispatch(vec![1, 2, 3, 4], metadata(i)).unwrap();
        }
        pool.drain();

        let counters = pool.counters();
        assert_eq!(counters.dispatched, 10);
        assert_eq!(counters.in_flight, 0);
        assert_eq!(counters.busy, 0);
        assert_eq!(ctx.accumulators.snapshot(0).unwrap().frames, 10);
        pool.shutdown();
    }

    #[test]
    fn test_busy_never_exceeds_capacity() {
        let ctx = context(3);
        let pool = WorkerPool::new(Arc::clone(&ctx), None).unwrap();
        for i in 0..50 {
            pool.dispatch(vec![0; 4], metadata(i)).unwrap();
            let counters = pool.counters();
            assert!(
                counters.busy <= counters.capacity,
                "busy {} exceeded capacity {}",
                counters.busy,
                counters.capacity
            );
        }
        pool.drain();
        assert_eq!(pool.counters().busy, 0);
    }

    #[test]
    fn test_failed_frame_releases_slot_and_pool_continues() {
        let ctx = context(2);
        let pool = WorkerPool::new(Arc::clone(&ctx), None).unwrap();
        for i in 0..4 {
            pool.dispatch(vec![1, 2, 3, 4], metadata(i)).unwrap();
        }
        // Wrong-sized frames fail calibration and are abandoned.
        pool.dispatch(vec![1, 2], metadata(4)).unwrap();
        pool.dispatch(vec![1], metadata(5)).unwrap();
        for i in 6..10 {
            pool.dispatch(vec![1, 2, 3, 4], metadata(i)).unwrap();
        }
        pool.drain();

        let counters = pool.counters();
        assert_eq!(counters.dispatched, 10);
        assert_eq!(counters.in_flight, 0);
        // Only the eight good frames reach the powder sum.
        assert_eq!(ctx.accumulators.snapshot(0).unwrap().frames, 8);
    }

    #[test]
    fn test_single_worker_processes_in_admission_order() {
        // With one slot the pipeline is strictly sequential; the dispatched
        // counter matches the accumulated frame count at every drain point.
        let ctx = context(1);
        let pool = WorkerPool::new(Arc::clone(&ctx), None).unwrap();
        for i in 0..5 {
            pool.dispatch(vec![9, 9, 9, 9], metadata(i)).unwrap();
            pool.drain();
            assert_eq!(
                ctx.accumulators.snapshot(0).unwrap().frames,
                i + 1
            );
        }
    }
}
