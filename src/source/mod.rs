//! Stream Source Adapter — the sole boundary to the streaming transport.
//!
//! Everything else in this crate talks to streams only through
//! [`StreamSource`] and [`Inlet`]. The real Lab Streaming Layer transport is
//! an external collaborator and is deliberately not implemented here (spec.md
//! §1); [`mock::MockSource`] is an in-process stand-in used by this crate's
//! own tests and by callers who want to exercise the pipeline without a live
//! LSL network.

pub mod mock;

use crate::error::RecorderError;
use crate::model::StreamDescriptor;

/// Discovery, inlet lifecycle, and the pull/time-correction surface a worker
/// needs. Implementors must be safe to share across acquisition-worker
/// threads.
pub trait StreamSource: Send + Sync {
    /// Block up to `timeout_s` waiting for streams to announce themselves.
    /// An empty result is not an error.
    fn discover(&self, timeout_s: f64) -> Vec<StreamDescriptor>;

    /// Open an inlet for a previously discovered stream.
    ///
    /// # Errors
    /// Returns [`RecorderError::SourceUnavailable`] if the stream vanished
    /// between discovery and open.
    fn open(
        &self,
        descriptor: &StreamDescriptor,
        buffer_seconds: f64,
        max_chunk_len: usize,
    ) -> Result<Box<dyn Inlet>, RecorderError>;
}

/// An open subscription to one remote stream.
pub trait Inlet: Send {
    /// Pull up to `max_samples` samples, blocking at most `timeout_s`.
    /// Returns an empty batch on timeout.
    ///
    /// # Errors
    /// Returns [`RecorderError::SourceLost`] if the inlet has been
    /// permanently severed.
    fn pull_batch(
        &mut self,
        max_samples: usize,
        timeout_s: f64,
    ) -> Result<crate::model::SampleBatch, RecorderError>;

    /// Query the current offset between the local clock and this stream's
    /// source clock.
    ///
    /// # Errors
    /// Returns [`RecorderError::Transient`] on a recoverable query failure;
    /// callers must tolerate this and retry later.
    fn time_correction(&mut self, timeout_s: f64) -> Result<f64, RecorderError>;

    /// Close the inlet. Idempotent.
    fn close(&mut self);
}
