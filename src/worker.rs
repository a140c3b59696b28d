//! Acquisition Worker: one OS thread per selected stream (spec.md §4.4).
//!
//! Each worker owns exactly one inlet and writes exclusively to the stream id
//! it was given; all workers share one [`XdfWriter`], whose own mutex
//! serializes the actual chunk writes. Workers never touch the Session
//! Controller's state mutex.

use crate::clock::ClockSource;
use crate::error::RecorderError;
use crate::model::SelectedStream;
use crate::source::StreamSource;
use crate::xdf::XdfWriter;
use crossbeam_channel::{after, select, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Tunable knobs that would otherwise be scattered call-by-call through
/// [`AcquisitionWorker::spawn`].
#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    pub buffer_seconds: f64,
    pub max_chunk_len: usize,
    pub pull_timeout_s: f64,
    pub max_samples_per_pull: usize,
    pub clock_offset_interval_s: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: 360.0,
            max_chunk_len: 0,
            pull_timeout_s: 0.2,
            max_samples_per_pull: 500,
            clock_offset_interval_s: 5.0,
        }
    }
}

/// Point-in-time counters a worker exposes for `status` (spec.md §4.4,
/// §6.1). Cloned out from behind the lock, never held across I/O.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkerStats {
    pub sample_count: u64,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
    pub clock_offsets_written: u64,
    pub reconnect_count: u64,
    pub lost: bool,
}

/// Handle to a running (or finished) acquisition worker thread.
pub struct AcquisitionWorker {
    handle: Option<JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
    cancel_tx: Sender<()>,
}

impl AcquisitionWorker {
    /// Spawn the worker thread. The caller must have already written
    /// `selected`'s StreamHeader through `writer` before calling this.
    pub fn spawn(
        selected: SelectedStream,
        source: Arc<dyn StreamSource>,
        writer: Arc<XdfWriter>,
        clock: Arc<dyn ClockSource>,
        config: WorkerConfig,
    ) -> Self {
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        // Capacity 1, not a rendezvous channel: `stop_and_join` must not block
        // if the worker thread has already exited on its own.
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);

        let thread_stats = Arc::clone(&stats);
        let handle = thread::spawn(move || {
            run(selected, source, writer, clock, config, cancel_rx, thread_stats)
        });

        Self {
            handle: Some(handle),
            stats,
            cancel_tx,
        }
    }

    /// Current counters, suitable for embedding in a status snapshot.
    pub fn stats(&self) -> WorkerStats {
        *self.stats.lock().expect("worker stats lock")
    }

    /// Ask the worker to stop and join its thread. Idempotent; safe to call
    /// more than once.
    pub fn stop_and_join(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("acquisition worker thread panicked");
            }
        }
    }

    /// Send the cancellation signal without waiting for the thread to exit.
    /// Idempotent.
    pub fn request_stop(&self) {
        let _ = self.cancel_tx.try_send(());
    }

    /// Join the thread if it has already finished, without blocking.
    /// Returns `true` once joined (or if already joined by a prior call).
    pub fn try_join(&mut self) -> bool {
        match &self.handle {
            Some(handle) if handle.is_finished() => {
                let handle = self.handle.take().expect("checked Some above");
                if handle.join().is_err() {
                    warn!("acquisition worker thread panicked");
                }
                true
            }
            Some(_) => false,
            None => true,
        }
    }
}

impl Drop for AcquisitionWorker {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn run(
    selected: SelectedStream,
    source: Arc<dyn StreamSource>,
    writer: Arc<XdfWriter>,
    clock: Arc<dyn ClockSource>,
    config: WorkerConfig,
    cancel_rx: Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    let stream_id = selected.stream_id;
    let descriptor = &selected.descriptor;
    // The Controller has already written this stream's StreamHeader before
    // spawning this thread; the worker only ever appends Samples/ClockOffset.

    let mut backoff = INITIAL_BACKOFF;
    let mut last_offset_at = Instant::now();

    'reconnect: loop {
        let mut inlet = match source.open(descriptor, config.buffer_seconds, config.max_chunk_len) {
            Ok(inlet) => {
                backoff = INITIAL_BACKOFF;
                inlet
            }
            Err(RecorderError::SourceUnavailable(msg)) => {
                debug!(stream_id, %msg, ?backoff, "stream unavailable, backing off");
                stats.lock().expect("worker stats lock").reconnect_count += 1;
                select! {
                    recv(cancel_rx) -> _ => return,
                    recv(after(backoff)) -> _ => {},
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue 'reconnect;
            }
            Err(err) => {
                warn!(stream_id, error = %err, "unrecoverable error opening inlet, worker exiting");
                return;
            }
        };

        info!(stream_id, name = %descriptor.name, "acquisition worker connected");

        loop {
            if cancel_rx.try_recv().is_ok() {
                inlet.close();
                return;
            }

            match inlet.pull_batch(config.max_samples_per_pull, config.pull_timeout_s) {
                Ok(batch) if batch.is_empty() => {}
                Ok(batch) => {
                    let n = batch.len();
                    let last_ts = batch.timestamps[n - 1];
                    let first_ts = batch.timestamps[0];
                    if let Err(err) = writer.write_samples(stream_id, &batch) {
                        warn!(stream_id, error = %err, "failed to write samples, worker exiting");
                        inlet.close();
                        return;
                    }
                    let mut s = stats.lock().expect("worker stats lock");
                    s.sample_count += n as u64;
                    s.first_timestamp.get_or_insert(first_ts);
                    s.last_timestamp = Some(last_ts);
                }
                Err(RecorderError::SourceLost(msg)) => {
                    warn!(stream_id, %msg, "stream lost, attempting reconnect");
                    stats.lock().expect("worker stats lock").lost = true;
                    inlet.close();
                    continue 'reconnect;
                }
                Err(RecorderError::Transient(msg)) => {
                    debug!(stream_id, %msg, "transient pull failure, retrying");
                }
                Err(err) => {
                    warn!(stream_id, error = %err, "unrecoverable pull error, worker exiting");
                    inlet.close();
                    return;
                }
            }

            if last_offset_at.elapsed().as_secs_f64() >= config.clock_offset_interval_s {
                match inlet.time_correction(config.pull_timeout_s) {
                    Ok(offset) => {
                        let collection_time = clock.now_streaming();
                        if let Err(err) = writer.write_clock_offset(stream_id, collection_time, offset) {
                            warn!(stream_id, error = %err, "failed to write clock offset, worker exiting");
                            inlet.close();
                            return;
                        }
                        stats.lock().expect("worker stats lock").clock_offsets_written += 1;
                        last_offset_at = Instant::now();
                    }
                    Err(RecorderError::Transient(msg)) => {
                        debug!(stream_id, %msg, "transient time_correction failure, will retry later");
                    }
                    Err(RecorderError::SourceLost(msg)) => {
                        warn!(stream_id, %msg, "stream lost during time_correction, attempting reconnect");
                        stats.lock().expect("worker stats lock").lost = true;
                        inlet.close();
                        continue 'reconnect;
                    }
                    Err(err) => {
                        warn!(stream_id, error = %err, "unrecoverable time_correction error, worker exiting");
                        inlet.close();
                        return;
                    }
                }
            }
        }
    }
}
