//! In-process mock implementation of the Stream Source Adapter.
//!
//! Simulates regular-rate numeric streams and irregular-rate marker streams
//! without any network transport, for use by this crate's own test suite
//! (spec.md §8 end-to-end scenarios). This is test tooling, not a substitute
//! for the real LSL transport.

use crate::error::RecorderError;
use crate::model::{ChannelFormat, SampleBatch, SampleValue, StreamDescriptor};
use crate::source::{Inlet, StreamSource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// What a mock stream produces once opened.
#[derive(Clone, Debug)]
pub enum MockStreamKind {
    /// A regularly-sampled numeric stream; values are a simple ramp so tests
    /// can assert on monotonicity without caring about exact numbers.
    Regular { nominal_srate: f64 },
    /// A fixed, irregular sequence of `(timestamp, label)` markers, delivered
    /// as soon as a pull arrives (no artificial pacing).
    Markers { samples: Vec<(f64, String)> },
}

/// One stream the mock source can discover and open.
#[derive(Clone, Debug)]
pub struct MockStreamSpec {
    pub descriptor: StreamDescriptor,
    pub kind: MockStreamKind,
    /// If false, `open()` fails with `SourceUnavailable` (simulates the
    /// stream vanishing between discovery and open).
    pub available: bool,
}

struct SeverHandle {
    severed: Arc<AtomicBool>,
}

/// Mock Stream Source — simulated discovery over a fixed, caller-supplied
/// stream list.
pub struct MockSource {
    streams: Vec<MockStreamSpec>,
    sever_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl MockSource {
    pub fn new(streams: Vec<MockStreamSpec>) -> Self {
        Self {
            streams,
            sever_flags: Mutex::new(HashMap::new()),
        }
    }

    /// Mark an already-opened stream's inlet as permanently severed; its next
    /// `pull_batch` call returns `SourceLost`. No-op if the uid was never
    /// opened.
    pub fn sever(&self, uid: &str) {
        if let Some(flag) = self.sever_flags.lock().expect("sever_flags lock").get(uid) {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

impl StreamSource for MockSource {
    fn discover(&self, _timeout_s: f64) -> Vec<StreamDescriptor> {
        self.streams.iter().map(|s| s.descriptor.clone()).collect()
    }

    fn open(
        &self,
        descriptor: &StreamDescriptor,
        _buffer_seconds: f64,
        _max_chunk_len: usize,
    ) -> Result<Box<dyn Inlet>, RecorderError> {
        let spec = self
            .streams
            .iter()
            .find(|s| s.descriptor.uid == descriptor.uid)
            .ok_or_else(|| {
                RecorderError::SourceUnavailable(format!("unknown uid {}", descriptor.uid))
            })?;
        if !spec.available {
            return Err(RecorderError::SourceUnavailable(format!(
                "stream {} vanished before open",
                descriptor.uid
            )));
        }

        let severed = Arc::new(AtomicBool::new(false));
        self.sever_flags
            .lock()
            .expect("sever_flags lock")
            .insert(descriptor.uid.clone(), severed.clone());

        let inlet: Box<dyn Inlet> = match &spec.kind {
            MockStreamKind::Regular { nominal_srate } => Box::new(RegularInlet {
                channel_count: descriptor.channel_count as usize,
                channel_format: descriptor.channel_format,
                nominal_srate: *nominal_srate,
                start: Instant::now(),
                emitted: 0,
                severed,
            }),
            MockStreamKind::Markers { samples } => Box::new(MarkerInlet {
                samples: samples.clone(),
                next: 0,
                severed,
            }),
        };
        Ok(inlet)
    }
}

struct RegularInlet {
    channel_count: usize,
    channel_format: ChannelFormat,
    nominal_srate: f64,
    start: Instant,
    emitted: u64,
    severed: Arc<AtomicBool>,
}

impl Inlet for RegularInlet {
    fn pull_batch(
        &mut self,
        max_samples: usize,
        timeout_s: f64,
    ) -> Result<SampleBatch, RecorderError> {
        if self.severed.load(Ordering::SeqCst) {
            return Err(RecorderError::SourceLost("mock inlet severed".into()));
        }

        let deadline = Instant::now() + Duration::from_secs_f64(timeout_s.max(0.0));
        loop {
            let elapsed = self.start.elapsed().as_secs_f64();
            let due = (elapsed * self.nominal_srate) as u64;
            let available = due.saturating_sub(self.emitted);
            if available > 0 {
                let n = available.min(max_samples as u64) as usize;
                let mut batch = SampleBatch {
                    timestamps: Vec::with_capacity(n),
                    values: Vec::with_capacity(n),
                };
                for _ in 0..n {
                    let idx = self.emitted;
                    let ts = idx as f64 / self.nominal_srate;
                    batch.timestamps.push(ts);
                    batch
                        .values
                        .push(synthetic_row(self.channel_count, self.channel_format, idx));
                    self.emitted += 1;
                }
                return Ok(batch);
            }
            if Instant::now() >= deadline {
                return Ok(SampleBatch::default());
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn time_correction(&mut self, _timeout_s: f64) -> Result<f64, RecorderError> {
        Ok(0.0)
    }

    fn close(&mut self) {}
}

fn synthetic_row(channel_count: usize, format: ChannelFormat, idx: u64) -> Vec<SampleValue> {
    (0..channel_count)
        .map(|ch| {
            let v = (idx as f64) * 0.001 + ch as f64;
            match format {
                ChannelFormat::Float32 => SampleValue::Float32(v as f32),
                ChannelFormat::Double64 => SampleValue::Double64(v),
                ChannelFormat::Int8 => SampleValue::Int8((idx % 127) as i8),
                ChannelFormat::Int16 => SampleValue::Int16((idx % 30000) as i16),
                ChannelFormat::Int32 => SampleValue::Int32(idx as i32),
                ChannelFormat::Int64 => SampleValue::Int64(idx as i64),
                ChannelFormat::String => SampleValue::String(format!("s{idx}")),
            }
        })
        .collect()
}

struct MarkerInlet {
    samples: Vec<(f64, String)>,
    next: usize,
    severed: Arc<AtomicBool>,
}

impl Inlet for MarkerInlet {
    fn pull_batch(
        &mut self,
        max_samples: usize,
        timeout_s: f64,
    ) -> Result<SampleBatch, RecorderError> {
        if self.severed.load(Ordering::SeqCst) {
            return Err(RecorderError::SourceLost("mock inlet severed".into()));
        }
        if self.next >= self.samples.len() {
            std::thread::sleep(Duration::from_secs_f64(timeout_s.max(0.0)));
            return Ok(SampleBatch::default());
        }
        let end = (self.next + max_samples).min(self.samples.len());
        let mut batch = SampleBatch {
            timestamps: Vec::with_capacity(end - self.next),
            values: Vec::with_capacity(end - self.next),
        };
        for (ts, label) in &self.samples[self.next..end] {
            batch.timestamps.push(*ts);
            batch.values.push(vec![SampleValue::String(label.clone())]);
        }
        self.next = end;
        Ok(batch)
    }

    fn time_correction(&mut self, _timeout_s: f64) -> Result<f64, RecorderError> {
        Ok(0.0)
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetadataNode;

    fn descriptor(uid: &str, channel_format: ChannelFormat, srate: f64) -> StreamDescriptor {
        StreamDescriptor {
            uid: uid.into(),
            name: "mock".into(),
            r#type: "EEG".into(),
            hostname: "localhost".into(),
            source_id: uid.into(),
            channel_count: 1,
            channel_format,
            nominal_srate: srate,
            metadata: MetadataNode::default(),
        }
    }

    #[test]
    fn discover_returns_configured_streams() {
        let source = MockSource::new(vec![MockStreamSpec {
            descriptor: descriptor("a", ChannelFormat::Float32, 10.0),
            kind: MockStreamKind::Regular { nominal_srate: 10.0 },
            available: true,
        }]);
        let found = source.discover(1.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uid, "a");
    }

    #[test]
    fn open_fails_when_unavailable() {
        let source = MockSource::new(vec![MockStreamSpec {
            descriptor: descriptor("a", ChannelFormat::Float32, 10.0),
            kind: MockStreamKind::Regular { nominal_srate: 10.0 },
            available: false,
        }]);
        let d = descriptor("a", ChannelFormat::Float32, 10.0);
        let err = source.open(&d, 1.0, 100).unwrap_err();
        assert_eq!(err.kind(), "SourceUnavailable");
    }

    #[test]
    fn sever_causes_source_lost() {
        let source = MockSource::new(vec![MockStreamSpec {
            descriptor: descriptor("a", ChannelFormat::Float32, 1000.0),
            kind: MockStreamKind::Regular {
                nominal_srate: 1000.0,
            },
            available: true,
        }]);
        let d = descriptor("a", ChannelFormat::Float32, 1000.0);
        let mut inlet = source.open(&d, 1.0, 100).expect("open");
        source.sever("a");
        let err = inlet.pull_batch(10, 0.1).unwrap_err();
        assert_eq!(err.kind(), "SourceLost");
    }

    #[test]
    fn marker_inlet_delivers_all_then_empties() {
        let samples = vec![
            (0.0, "a".to_string()),
            (0.5, "b".to_string()),
            (1.0, "c".to_string()),
        ];
        let source = MockSource::new(vec![MockStreamSpec {
            descriptor: descriptor("m", ChannelFormat::String, IRREGULAR_RATE_FOR_TEST),
            kind: MockStreamKind::Markers { samples },
            available: true,
        }]);
        let d = descriptor("m", ChannelFormat::String, IRREGULAR_RATE_FOR_TEST);
        let mut inlet = source.open(&d, 1.0, 100).expect("open");
        let batch = inlet.pull_batch(10, 0.01).expect("pull");
        assert_eq!(batch.len(), 3);
        let empty = inlet.pull_batch(10, 0.01).expect("pull");
        assert!(empty.is_empty());
    }

    const IRREGULAR_RATE_FOR_TEST: f64 = 0.0;
}
