//! Session Controller: the recording state machine (spec.md §4.5).
//!
//! ```text
//! Idle ──update_streams──▶ Discovering ──(result)──▶ Ready ──start──▶ Recording
//!  ▲                                                                     │
//!  │                                                                     stop
//!  │                                                                     ▼
//!  └──────────────── Closed ◀── close ─── Stopping ─── (workers joined) ─┘
//! ```
//!
//! The state mutex and the writer mutex are never held together: the
//! Controller acquires the writer only inside `start`/`stop`, and only after
//! releasing the state mutex (spec.md §5 lock-ordering rule).

use crate::clock::ClockSource;
use crate::error::RecorderError;
use crate::filename;
use crate::model::{SelectedStream, SessionState, StreamDescriptor};
use crate::source::StreamSource;
use crate::worker::{AcquisitionWorker, WorkerConfig};
use crate::xdf::XdfWriter;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A `select` request (spec.md §4.6 `select` command).
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    All,
    None,
    Uids(Vec<String>),
}

/// Tunables the embedding CLI/config loads and passes through unchanged
/// (spec.md §6.5).
#[derive(Clone, Copy, Debug)]
pub struct ControllerConfig {
    pub discovery_timeout_s: f64,
    pub stop_timeout_s: f64,
    pub worker: WorkerConfig,
    pub boundary_bytes: u64,
    pub boundary_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            discovery_timeout_s: 2.0,
            stop_timeout_s: 5.0,
            worker: WorkerConfig::default(),
            boundary_bytes: 10 * 1024 * 1024,
            boundary_interval: Duration::from_secs(10),
        }
    }
}

/// One row of `status().per_stream`.
#[derive(Clone, Debug, Serialize)]
pub struct StreamStatus {
    pub uid: String,
    pub name: String,
    pub sample_count: u64,
    pub last_timestamp: Option<f64>,
}

/// Full `status()` response (spec.md §4.5).
#[derive(Clone, Debug, Serialize)]
pub struct Status {
    pub state: SessionState,
    pub filename: Option<String>,
    pub selected_count: usize,
    pub per_stream: Vec<StreamStatus>,
}

struct ActiveSession {
    writer: Arc<XdfWriter>,
    workers: Vec<(SelectedStream, AcquisitionWorker)>,
}

struct ControllerInner {
    state: SessionState,
    available_streams: Vec<StreamDescriptor>,
    selected_uids: Vec<String>,
    filename: Option<String>,
    session: Option<ActiveSession>,
}

/// Owns session state, the active Writer, and worker lifecycle. The sole
/// mutator of [`SessionState`] (spec.md §4.5).
pub struct SessionController {
    inner: Mutex<ControllerInner>,
    source: Arc<dyn StreamSource>,
    clock: Arc<dyn ClockSource>,
    config: ControllerConfig,
}

impl SessionController {
    pub fn new(source: Arc<dyn StreamSource>, clock: Arc<dyn ClockSource>, config: ControllerConfig) -> Self {
        Self {
            inner: Mutex::new(ControllerInner {
                state: SessionState::Idle,
                available_streams: Vec::new(),
                selected_uids: Vec::new(),
                filename: None,
                session: None,
            }),
            source,
            clock,
            config,
        }
    }

    /// Discover streams, replacing `available_streams`. Clears the current
    /// selection entirely if any previously-selected uid vanished.
    pub fn update_streams(&self) -> Result<Vec<StreamDescriptor>, RecorderError> {
        let mut guard = self.inner.lock().expect("controller state lock");
        match guard.state {
            SessionState::Idle | SessionState::Ready => {}
            other => {
                return Err(RecorderError::InvalidState(format!(
                    "update_streams is invalid in state {other}"
                )))
            }
        }
        guard.state = SessionState::Discovering;
        drop(guard);

        let discovered = self.source.discover(self.config.discovery_timeout_s);

        let mut guard = self.inner.lock().expect("controller state lock");
        let still_selected = guard
            .selected_uids
            .iter()
            .all(|uid| discovered.iter().any(|d| &d.uid == uid));
        if !still_selected {
            guard.selected_uids.clear();
        }
        guard.available_streams = discovered.clone();
        guard.state = SessionState::Ready;
        Ok(discovered)
    }

    /// Update the active selection. Valid only in `Ready`.
    pub fn select(&self, selection: Selection) -> Result<Vec<String>, RecorderError> {
        let mut guard = self.inner.lock().expect("controller state lock");
        if guard.state != SessionState::Ready {
            return Err(RecorderError::InvalidState(format!(
                "select is invalid in state {}",
                guard.state
            )));
        }
        let uids = match selection {
            Selection::None => Vec::new(),
            Selection::All => guard.available_streams.iter().map(|d| d.uid.clone()).collect(),
            Selection::Uids(requested) => {
                let mut seen = std::collections::HashSet::new();
                let mut result = Vec::new();
                for uid in requested {
                    if !guard.available_streams.iter().any(|d| d.uid == uid) {
                        return Err(RecorderError::BadRequest(format!("unknown stream uid {uid}")));
                    }
                    if seen.insert(uid.clone()) {
                        result.push(uid);
                    }
                }
                result
            }
        };
        guard.selected_uids = uids.clone();
        Ok(uids)
    }

    /// Parse and store a templated or plain filename. Valid any time the
    /// session is not Recording.
    pub fn set_filename(&self, spec: &str) -> Result<String, RecorderError> {
        let resolved = filename::resolve(spec)?;
        let mut guard = self.inner.lock().expect("controller state lock");
        if guard.state == SessionState::Recording {
            return Err(RecorderError::InvalidState(
                "set_filename is invalid while Recording".into(),
            ));
        }
        guard.filename = Some(resolved.clone());
        Ok(resolved)
    }

    pub fn get_filename(&self) -> Option<String> {
        self.inner.lock().expect("controller state lock").filename.clone()
    }

    /// Open the Writer, write headers, and launch one worker per selection.
    pub fn start(&self) -> Result<(), RecorderError> {
        let (selected, filename) = {
            let guard = self.inner.lock().expect("controller state lock");
            if guard.state != SessionState::Ready {
                return Err(RecorderError::InvalidState(format!(
                    "start is invalid in state {}",
                    guard.state
                )));
            }
            if guard.selected_uids.is_empty() {
                return Err(RecorderError::NoSelection);
            }
            let filename = guard.filename.clone().ok_or_else(|| {
                RecorderError::InvalidState("start requires a filename to be set first".into())
            })?;
            let selected: Vec<StreamDescriptor> = guard
                .selected_uids
                .iter()
                .map(|uid| {
                    guard
                        .available_streams
                        .iter()
                        .find(|d| &d.uid == uid)
                        .cloned()
                        .expect("selected uid always present in available_streams")
                })
                .collect();
            (selected, filename)
        };

        // Writer and worker threads are opened outside the state mutex: the
        // lock order state -> writer is forbidden (spec.md §5).
        let writer = Arc::new(XdfWriter::open_with_boundary(
            &filename,
            self.config.boundary_bytes,
            self.config.boundary_interval,
        )?);

        let mut selected_streams = Vec::with_capacity(selected.len());
        for (i, descriptor) in selected.into_iter().enumerate() {
            let stream_id = (i + 1) as u32;
            writer.write_stream_header(stream_id, &descriptor)?;
            selected_streams.push(SelectedStream { descriptor, stream_id });
        }

        let workers = selected_streams
            .iter()
            .map(|s| {
                let worker = AcquisitionWorker::spawn(
                    s.clone(),
                    Arc::clone(&self.source),
                    Arc::clone(&writer),
                    Arc::clone(&self.clock),
                    self.config.worker,
                );
                (s.clone(), worker)
            })
            .collect();

        let mut guard = self.inner.lock().expect("controller state lock");
        guard.session = Some(ActiveSession { writer, workers });
        guard.state = SessionState::Recording;
        info!(streams = selected_streams.len(), %filename, "recording started");
        Ok(())
    }

    /// Stop all workers, finalize the file, and return to `Idle`.
    pub fn stop(&self) -> Result<(), RecorderError> {
        let mut session = {
            let mut guard = self.inner.lock().expect("controller state lock");
            if guard.state != SessionState::Recording {
                return Err(RecorderError::InvalidState(format!(
                    "stop is invalid in state {}",
                    guard.state
                )));
            }
            guard.state = SessionState::Stopping;
            guard.session.take().expect("Recording implies an active session")
        };

        for (_, worker) in &session.workers {
            worker.request_stop();
        }
        let deadline = Instant::now() + Duration::from_secs_f64(self.config.stop_timeout_s);
        for (selected, worker) in &mut session.workers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !join_with_timeout(worker, remaining) {
                warn!(stream_id = selected.stream_id, "worker did not stop in time, abandoning");
            }
        }

        for (selected, worker) in &session.workers {
            let stats = worker.stats();
            if let Err(err) = session.writer.write_stream_footer(
                selected.stream_id,
                stats.first_timestamp.unwrap_or(f64::NAN),
                stats.last_timestamp.unwrap_or(f64::NAN),
                stats.sample_count,
            ) {
                warn!(stream_id = selected.stream_id, error = %err, "failed to write stream footer");
            }
        }
        if let Err(err) = session.writer.close() {
            warn!(error = %err, "failed to close writer cleanly");
        }

        let mut guard = self.inner.lock().expect("controller state lock");
        // Passes through Closed on its way back to Idle, ready for a
        // subsequent session (spec.md §4.5); no caller can observe the
        // intermediate state since it never blocks on I/O.
        guard.state = SessionState::Idle;
        info!("recording stopped");
        Ok(())
    }

    /// Current session status; never blocks on I/O.
    pub fn status(&self) -> Status {
        let guard = self.inner.lock().expect("controller state lock");
        let per_stream = guard
            .session
            .as_ref()
            .map(|session| {
                session
                    .workers
                    .iter()
                    .map(|(selected, worker)| {
                        let stats = worker.stats();
                        StreamStatus {
                            uid: selected.descriptor.uid.clone(),
                            name: selected.descriptor.name.clone(),
                            sample_count: stats.sample_count,
                            last_timestamp: stats.last_timestamp,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Status {
            state: guard.state,
            filename: guard.filename.clone(),
            selected_count: guard.selected_uids.len(),
            per_stream,
        }
    }

    pub fn available_streams(&self) -> Vec<StreamDescriptor> {
        self.inner.lock().expect("controller state lock").available_streams.clone()
    }
}

/// Join `worker`'s thread, blocking at most `timeout`. Assumes cancellation
/// was already requested. Returns `false` if the deadline passed first,
/// leaving the worker thread abandoned (spec.md §5).
fn join_with_timeout(worker: &mut AcquisitionWorker, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if worker.try_join() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::model::{ChannelFormat, MetadataNode};
    use crate::source::mock::{MockSource, MockStreamKind, MockStreamSpec};
    use std::thread::sleep;

    fn stream(uid: &str) -> StreamDescriptor {
        StreamDescriptor {
            uid: uid.into(),
            name: format!("stream-{uid}"),
            r#type: "EEG".into(),
            hostname: "localhost".into(),
            source_id: uid.into(),
            channel_count: 2,
            channel_format: ChannelFormat::Float32,
            nominal_srate: 100.0,
            metadata: MetadataNode::default(),
        }
    }

    fn test_controller(dir: &tempfile::TempDir) -> (SessionController, std::path::PathBuf) {
        let source = Arc::new(MockSource::new(vec![MockStreamSpec {
            descriptor: stream("a"),
            kind: MockStreamKind::Regular { nominal_srate: 100.0 },
            available: true,
        }]));
        let controller = SessionController::new(
            source,
            Arc::new(SystemClock::new()),
            ControllerConfig {
                worker: WorkerConfig {
                    pull_timeout_s: 0.02,
                    ..Default::default()
                },
                stop_timeout_s: 1.0,
                ..Default::default()
            },
        );
        (controller, dir.path().join("out.xdf"))
    }

    #[test]
    fn full_session_lifecycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, path) = test_controller(&dir);

        assert_eq!(controller.status().state, SessionState::Idle);
        let discovered = controller.update_streams().expect("discover");
        assert_eq!(discovered.len(), 1);

        let selected = controller.select(Selection::All).expect("select");
        assert_eq!(selected, vec!["a".to_string()]);

        controller.set_filename(path.to_str().unwrap()).expect("set_filename");
        controller.start().expect("start");
        assert_eq!(controller.status().state, SessionState::Recording);

        sleep(Duration::from_millis(100));
        controller.stop().expect("stop");
        assert_eq!(controller.status().state, SessionState::Idle);
        assert!(path.exists());
    }

    #[test]
    fn start_without_selection_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, path) = test_controller(&dir);
        controller.update_streams().expect("discover");
        controller.set_filename(path.to_str().unwrap()).expect("set_filename");
        let err = controller.start().unwrap_err();
        assert_eq!(err.kind(), "NoSelection");
    }

    #[test]
    fn start_twice_is_invalid_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, path) = test_controller(&dir);
        controller.update_streams().expect("discover");
        controller.select(Selection::All).expect("select");
        controller.set_filename(path.to_str().unwrap()).expect("set_filename");
        controller.start().expect("start");
        let err = controller.start().unwrap_err();
        assert_eq!(err.kind(), "InvalidState");
        controller.stop().expect("stop");
    }

    #[test]
    fn selecting_unknown_uid_is_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (controller, _path) = test_controller(&dir);
        controller.update_streams().expect("discover");
        let err = controller
            .select(Selection::Uids(vec!["nonexistent".into()]))
            .unwrap_err();
        assert_eq!(err.kind(), "BadRequest");
    }
}
