//! XDF Writer: append-only, single-writer chunk serializer (spec.md §4.3).

use super::chunk::{
    self, TAG_BOUNDARY, TAG_CLOCK_OFFSET, TAG_FILE_HEADER, TAG_SAMPLES, TAG_STREAM_FOOTER,
    TAG_STREAM_HEADER,
};
use super::varlen::write_varlen;
use crate::error::RecorderError;
use crate::model::{ChannelFormat, SampleBatch, SampleValue, StreamDescriptor};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_BOUNDARY_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_BOUNDARY_INTERVAL: Duration = Duration::from_secs(10);

struct StreamState {
    channel_count: usize,
    channel_format: ChannelFormat,
    nominal_srate: f64,
    sample_count: u64,
    first_timestamp: f64,
    last_timestamp: f64,
    clock_offsets_written: u64,
    footer_written: bool,
}

impl StreamState {
    fn new(descriptor: &StreamDescriptor) -> Self {
        Self {
            channel_count: descriptor.channel_count as usize,
            channel_format: descriptor.channel_format,
            nominal_srate: descriptor.nominal_srate,
            sample_count: 0,
            first_timestamp: f64::NAN,
            last_timestamp: f64::NAN,
            clock_offsets_written: 0,
            footer_written: false,
        }
    }
}

struct WriterInner {
    file: BufWriter<File>,
    failed: bool,
    bytes_written: u64,
    bytes_since_boundary: u64,
    last_boundary_at: Instant,
    streams: HashMap<u32, StreamState>,
}

/// Append-only XDF file writer with single-writer concurrency (spec.md
/// §4.3.5). All mutation happens under one mutex, held only for the
/// duration of a single chunk write.
pub struct XdfWriter {
    inner: Mutex<WriterInner>,
    boundary_bytes: u64,
    boundary_interval: Duration,
}

impl XdfWriter {
    /// Create (or overwrite) `path`, writing the `"XDF:"` magic preamble and
    /// a FileHeader chunk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        Self::open_with_boundary(path, DEFAULT_BOUNDARY_BYTES, DEFAULT_BOUNDARY_INTERVAL)
    }

    /// As [`open`](Self::open), with explicit boundary-chunk thresholds
    /// (spec.md §9 open question — exposed so tests don't have to write 10 MB
    /// or wait 10 s to exercise boundary emission).
    pub fn open_with_boundary(
        path: impl AsRef<Path>,
        boundary_bytes: u64,
        boundary_interval: Duration,
    ) -> Result<Self, RecorderError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(b"XDF:")?;
        let mut bytes_written = 4u64;
        bytes_written += write_framed_chunk(&mut writer, TAG_FILE_HEADER, chunk::file_header_xml().as_bytes())?;
        writer.flush()?;
        Ok(Self {
            inner: Mutex::new(WriterInner {
                file: writer,
                failed: false,
                bytes_written,
                bytes_since_boundary: 0,
                last_boundary_at: Instant::now(),
                streams: HashMap::new(),
            }),
            boundary_bytes,
            boundary_interval,
        })
    }

    /// Must precede any data for `stream_id` (spec.md §4.3).
    pub fn write_stream_header(
        &self,
        stream_id: u32,
        descriptor: &StreamDescriptor,
    ) -> Result<(), RecorderError> {
        let mut inner = self.lock_ok()?;
        if inner.streams.contains_key(&stream_id) {
            return Err(RecorderError::OrderViolation(format!(
                "stream {stream_id} header already written"
            )));
        }
        self.maybe_write_boundary(&mut inner)?;

        let mut content = Vec::new();
        content.extend_from_slice(&stream_id.to_le_bytes());
        content.extend_from_slice(chunk::stream_header_xml(descriptor).as_bytes());
        let written = write_framed_chunk(&mut inner.file, TAG_STREAM_HEADER, &content)
            .map_err(|e| self.mark_failed(&mut inner, e))?;
        inner.bytes_written += written;
        inner.bytes_since_boundary += written;
        inner.streams.insert(stream_id, StreamState::new(descriptor));
        Ok(())
    }

    /// Appends a Samples chunk; a no-op for an empty batch.
    pub fn write_samples(&self, stream_id: u32, batch: &SampleBatch) -> Result<(), RecorderError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut inner = self.lock_ok()?;
        self.ensure_open_for_data(&inner, stream_id)?;
        self.maybe_write_boundary(&mut inner)?;

        let (channel_count, channel_format, nominal_srate) = {
            let state = inner.streams.get(&stream_id).expect("checked above");
            (state.channel_count, state.channel_format, state.nominal_srate)
        };

        let mut content = Vec::new();
        content.extend_from_slice(&stream_id.to_le_bytes());
        write_varlen(&mut content, batch.len() as u64)
            .map_err(|e| self.mark_failed(&mut inner, e))?;

        for (ts, row) in batch.timestamps.iter().zip(batch.values.iter()) {
            if row.len() != channel_count {
                return Err(RecorderError::OrderViolation(format!(
                    "sample has {} channels, expected {}",
                    row.len(),
                    channel_count
                )));
            }
            let state = inner.streams.get_mut(&stream_id).expect("checked above");
            let deducible = nominal_srate > 0.0
                && !state.last_timestamp.is_nan()
                && (*ts - (state.last_timestamp + 1.0 / nominal_srate)).abs() < 1e-9;
            if deducible {
                content.push(0u8);
            } else {
                content.push(8u8);
                content.extend_from_slice(&ts.to_le_bytes());
            }
            encode_row(&mut content, row, channel_format)?;

            if state.first_timestamp.is_nan() {
                state.first_timestamp = *ts;
            }
            state.last_timestamp = *ts;
            state.sample_count += 1;
        }

        let written = write_framed_chunk(&mut inner.file, TAG_SAMPLES, &content)
            .map_err(|e| self.mark_failed(&mut inner, e))?;
        inner.bytes_written += written;
        inner.bytes_since_boundary += written;
        Ok(())
    }

    /// Appends a ClockOffset chunk.
    pub fn write_clock_offset(
        &self,
        stream_id: u32,
        collection_time: f64,
        offset: f64,
    ) -> Result<(), RecorderError> {
        let mut inner = self.lock_ok()?;
        self.ensure_open_for_data(&inner, stream_id)?;
        self.maybe_write_boundary(&mut inner)?;

        let mut content = Vec::with_capacity(4 + 8 + 8);
        content.extend_from_slice(&stream_id.to_le_bytes());
        content.extend_from_slice(&collection_time.to_le_bytes());
        content.extend_from_slice(&offset.to_le_bytes());
        let written = write_framed_chunk(&mut inner.file, TAG_CLOCK_OFFSET, &content)
            .map_err(|e| self.mark_failed(&mut inner, e))?;
        inner.bytes_written += written;
        inner.bytes_since_boundary += written;
        inner
            .streams
            .get_mut(&stream_id)
            .expect("checked above")
            .clock_offsets_written += 1;
        Ok(())
    }

    /// Appends the StreamFooter; no further data for `stream_id` may be
    /// written afterwards.
    pub fn write_stream_footer(
        &self,
        stream_id: u32,
        first_ts: f64,
        last_ts: f64,
        sample_count: u64,
    ) -> Result<(), RecorderError> {
        let mut inner = self.lock_ok()?;
        let clock_offsets_written = {
            let state = inner.streams.get(&stream_id).ok_or_else(|| {
                RecorderError::OrderViolation(format!(
                    "stream {stream_id} footer written before header"
                ))
            })?;
            if state.footer_written {
                return Err(RecorderError::OrderViolation(format!(
                    "stream {stream_id} footer already written"
                )));
            }
            state.clock_offsets_written
        };
        self.maybe_write_boundary(&mut inner)?;

        let mut content = Vec::new();
        content.extend_from_slice(&stream_id.to_le_bytes());
        content.extend_from_slice(
            chunk::stream_footer_xml(first_ts, last_ts, sample_count, clock_offsets_written)
                .as_bytes(),
        );
        let written = write_framed_chunk(&mut inner.file, TAG_STREAM_FOOTER, &content)
            .map_err(|e| self.mark_failed(&mut inner, e))?;
        inner.bytes_written += written;
        inner.bytes_since_boundary += written;
        inner.streams.get_mut(&stream_id).expect("checked above").footer_written = true;
        Ok(())
    }

    /// Flushes and closes the file, writing any missing footers (best
    /// effort) for streams whose header was written but footer was not.
    pub fn close(&self) -> Result<(), RecorderError> {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.failed {
            return Err(RecorderError::Io(io::Error::other(
                "writer already in failed state",
            )));
        }
        let pending: Vec<u32> = inner
            .streams
            .iter()
            .filter(|(_, s)| !s.footer_written)
            .map(|(id, _)| *id)
            .collect();
        for stream_id in pending {
            let (first, last, count, offsets) = {
                let s = &inner.streams[&stream_id];
                (s.first_timestamp, s.last_timestamp, s.sample_count, s.clock_offsets_written)
            };
            let mut content = Vec::new();
            content.extend_from_slice(&stream_id.to_le_bytes());
            content.extend_from_slice(chunk::stream_footer_xml(first, last, count, offsets).as_bytes());
            if write_framed_chunk(&mut inner.file, TAG_STREAM_FOOTER, &content).is_ok() {
                inner.streams.get_mut(&stream_id).expect("just read").footer_written = true;
            }
        }
        inner.file.flush()?;
        Ok(())
    }

    fn lock_ok(&self) -> Result<std::sync::MutexGuard<'_, WriterInner>, RecorderError> {
        let inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.failed {
            return Err(RecorderError::Io(io::Error::other(
                "writer is in a failed state",
            )));
        }
        Ok(inner)
    }

    fn ensure_open_for_data(&self, inner: &WriterInner, stream_id: u32) -> Result<(), RecorderError> {
        match inner.streams.get(&stream_id) {
            None => Err(RecorderError::OrderViolation(format!(
                "no StreamHeader written for stream {stream_id}"
            ))),
            Some(s) if s.footer_written => Err(RecorderError::OrderViolation(format!(
                "stream {stream_id} footer already written"
            ))),
            Some(_) => Ok(()),
        }
    }

    fn maybe_write_boundary(&self, inner: &mut WriterInner) -> Result<(), RecorderError> {
        let due = inner.bytes_since_boundary >= self.boundary_bytes
            || inner.last_boundary_at.elapsed() >= self.boundary_interval;
        if !due {
            return Ok(());
        }
        let written = write_framed_chunk(&mut inner.file, TAG_BOUNDARY, chunk::boundary_uuid().as_bytes())
            .map_err(|e| self.mark_failed(inner, e))?;
        inner.bytes_written += written;
        inner.bytes_since_boundary = 0;
        inner.last_boundary_at = Instant::now();
        Ok(())
    }

    fn mark_failed(&self, inner: &mut WriterInner, err: io::Error) -> RecorderError {
        inner.failed = true;
        RecorderError::Io(err)
    }
}

fn write_framed_chunk(w: &mut impl Write, tag: u16, content: &[u8]) -> io::Result<u64> {
    let chunk_len = 2 + content.len() as u64;
    let mut framed = Vec::with_capacity(9 + content.len());
    write_varlen(&mut framed, chunk_len)?;
    framed.extend_from_slice(&tag.to_le_bytes());
    framed.extend_from_slice(content);
    w.write_all(&framed)?;
    Ok(framed.len() as u64)
}

fn encode_row(
    out: &mut Vec<u8>,
    row: &[SampleValue],
    format: ChannelFormat,
) -> Result<(), RecorderError> {
    for value in row {
        match (format, value) {
            (ChannelFormat::Float32, SampleValue::Float32(v)) => {
                out.extend_from_slice(&v.to_le_bytes())
            }
            (ChannelFormat::Double64, SampleValue::Double64(v)) => {
                out.extend_from_slice(&v.to_le_bytes())
            }
            (ChannelFormat::Int8, SampleValue::Int8(v)) => out.push(*v as u8),
            (ChannelFormat::Int16, SampleValue::Int16(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (ChannelFormat::Int32, SampleValue::Int32(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (ChannelFormat::Int64, SampleValue::Int64(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (ChannelFormat::String, SampleValue::String(s)) => {
                write_varlen(out, s.len() as u64).expect("Vec<u8> write cannot fail");
                out.extend_from_slice(s.as_bytes());
            }
            (expected, actual) => {
                return Err(RecorderError::OrderViolation(format!(
                    "channel format mismatch: expected {expected:?}, got {actual:?}"
                )))
            }
        }
    }
    Ok(())
}
