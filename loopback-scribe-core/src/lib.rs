//! # loopback-scribe-core
//!
//! Platform-agnostic live loopback capture pipeline.
//!
//! Captures system-output audio from one or many loopback endpoints,
//! normalizes it to mono 16 kHz float32, accumulates overlapping spans and
//! hands them to a speech-transcription callback. No audio sample ever
//! touches non-volatile storage: chunks, windows and spans live on the
//! heap only for as long as the pipeline needs them.
//!
//! Platform backends (Windows WASAPI, future PulseAudio/Core Audio)
//! implement the `AudioBackend` trait and plug into the generic
//! `CaptureSupervisor`.
//!
//! ## Architecture
//!
//! ```text
//! loopback-scribe-core (this crate)
//! ├── traits/       ← AudioBackend, CaptureHandle, TranscriptionCallback
//! ├── models/       ← DeviceInfo, TaggedChunk, Span, CaptureConfig,
//! │                   CaptureError, StreamState, SessionCounters
//! ├── processing/   ← PCM conversion, decimation, rational resampling,
//! │                   RMS metering, AccumulationWindow
//! └── pipeline/     ← DeviceStream, CaptureSupervisor, accumulator and
//!                     dispatcher loops
//! ```
//!
//! ## Data flow
//!
//! ```text
//! [DeviceStream xN] → ingest channel (unbounded, tagged chunks)
//!                   → [ResampleAccumulator] → hand-off channel
//!                     (bounded, drop-on-full)
//!                   → [TranscriptionDispatcher] → callback → discard
//! ```

pub mod models;
pub mod pipeline;
pub mod processing;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export key types at crate root for convenience.
pub use models::chunk::{Span, TaggedChunk};
pub use models::config::CaptureConfig;
pub use models::counters::SessionCounters;
pub use models::device::{DeviceInfo, DeviceSelector};
pub use models::error::CaptureError;
pub use models::state::StreamState;
pub use pipeline::device_stream::DeviceStream;
pub use pipeline::supervisor::CaptureSupervisor;
pub use traits::audio_backend::{AudioBackend, CaptureHandle};
pub use traits::transcribe::TranscriptionCallback;
