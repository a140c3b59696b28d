//! Core data model: stream identity, samples, and session state.
//!
//! Mirrors spec.md §3. `ChannelFormat` follows the same seven cases as the
//! `lsl` crate's `ChannelFormat` (see the discovery-layer reference in
//! `source::StreamSource`), but the wire tag/width is specific to the XDF
//! chunk encoding in `xdf`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-channel sample encoding. Determines both the in-memory representation
/// of a [`SampleBatch`] and the on-disk byte width written by the XDF writer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelFormat {
    Float32,
    Double64,
    Int8,
    Int16,
    Int32,
    Int64,
    String,
}

impl ChannelFormat {
    /// Fixed byte width of one channel value, or `None` for the variable-width
    /// `String` format.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ChannelFormat::Float32 => Some(4),
            ChannelFormat::Double64 => Some(8),
            ChannelFormat::Int8 => Some(1),
            ChannelFormat::Int16 => Some(2),
            ChannelFormat::Int32 => Some(4),
            ChannelFormat::Int64 => Some(8),
            ChannelFormat::String => None,
        }
    }
}

impl fmt::Display for ChannelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelFormat::Float32 => "float32",
            ChannelFormat::Double64 => "float64",
            ChannelFormat::Int8 => "int8",
            ChannelFormat::Int16 => "int16",
            ChannelFormat::Int32 => "int32",
            ChannelFormat::Int64 => "int64",
            ChannelFormat::String => "string",
        };
        write!(f, "{s}")
    }
}

/// Sampling rate denoting an irregular-rate stream (spec.md §3).
pub const IRREGULAR_RATE: f64 = 0.0;

/// A single labeled node in the opaque metadata descriptor tree. The core
/// never interprets this tree; it only carries it through to the Writer,
/// which renders it as XML text (spec.md §9 design note).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataNode {
    pub name: String,
    pub text: Option<String>,
    pub children: Vec<MetadataNode>,
}

impl MetadataNode {
    /// Construct a leaf node with text content.
    pub fn leaf(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
            children: Vec::new(),
        }
    }

    /// Construct a branch node with children.
    pub fn branch(name: impl Into<String>, children: Vec<MetadataNode>) -> Self {
        Self {
            name: name.into(),
            text: None,
            children,
        }
    }
}

/// Identity and schema of a discoverable stream (spec.md §3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Opaque identifier, unique within a discovery cycle only.
    pub uid: String,
    pub name: String,
    pub r#type: String,
    pub hostname: String,
    pub source_id: String,
    pub channel_count: u32,
    pub channel_format: ChannelFormat,
    /// 0.0 denotes an irregular rate.
    pub nominal_srate: f64,
    pub metadata: MetadataNode,
}

/// A `StreamDescriptor` promoted to a recording target, with a file-local id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectedStream {
    pub descriptor: StreamDescriptor,
    /// 1-based, unique within the file, assigned in selection order.
    pub stream_id: u32,
}

/// One channel value in a pulled sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SampleValue {
    Float32(f32),
    Double64(f64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    String(String),
}

/// A pulled block of samples for one stream (spec.md §3). `N` may be 0.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    /// Source-clock timestamp for each sample.
    pub timestamps: Vec<f64>,
    /// `channel_count` values per sample, row-major (one row per sample).
    pub values: Vec<Vec<SampleValue>>,
}

impl SampleBatch {
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }
}

/// A measured clock offset, emitted periodically per active stream.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClockOffset {
    pub collection_time: f64,
    pub offset_seconds: f64,
}

/// The Session Controller's state machine (spec.md §4.5).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Discovering,
    Ready,
    Recording,
    Stopping,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
