use crate::models::device::DeviceInfo;
use crate::models::error::CaptureError;

/// Platform audio capability consumed by the pipeline.
///
/// Implemented by:
/// - `WasapiBackend` (Windows, in `loopback-scribe-windows`)
/// - Future: PulseAudio/PipeWire monitor sources (Linux),
///   Core Audio taps (macOS)
pub trait AudioBackend: Send + Sync {
    /// Enumerate capture endpoints, loopback-capable ones flagged.
    ///
    /// Fails soft: a platform query error yields an empty list plus a
    /// logged diagnostic, never an error to the caller.
    fn enumerate(&self) -> Vec<DeviceInfo>;

    /// Open a capture connection on `device` as 16-bit PCM at the device's
    /// native channel count and rate, with `frame_quantum` frames per
    /// hardware buffer.
    fn open(
        &self,
        device: &DeviceInfo,
        frame_quantum: u32,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError>;
}

/// One open hardware capture connection, owned exclusively by its reader
/// thread.
///
/// Blocking reads, not registered callbacks: some loopback driver/backend
/// combinations silently deliver zero bytes to callback-style APIs, and a
/// dedicated reader thread per device sidesteps that without affecting
/// other devices.
pub trait CaptureHandle: Send {
    /// Block until `frames` frames have been captured and return them as
    /// interleaved 16-bit PCM (`frames * channels` samples).
    ///
    /// An error means the device disconnected or the connection was closed;
    /// the reader loop treats it as a quiet exit.
    fn read_blocking(&mut self, frames: usize) -> Result<Vec<i16>, CaptureError>;

    /// Release the hardware connection. Idempotent; must be called from the
    /// thread that reads. Dropping the handle also releases the connection.
    fn close(&mut self);
}
