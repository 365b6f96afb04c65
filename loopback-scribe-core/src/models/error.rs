use thiserror::Error;

/// Errors that can occur during loopback capture.
///
/// Most of these are absorbed and logged where they occur: a device that
/// fails to open or read only removes itself from the session, a chunk that
/// fails to resample is dropped. Only "zero devices opened" ever surfaces
/// to the caller, as a failed `start()`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("no loopback devices available")]
    NoDevicesAvailable,

    #[error("device not available")]
    DeviceUnavailable,

    #[error("device open failed: {0}")]
    DeviceOpenFailed(String),

    #[error("device read failed: {0}")]
    ReadFailed(String),

    #[error("resample failed: {0}")]
    ResampleFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("capture already running")]
    AlreadyRunning,

    #[error("timeout")]
    Timeout,

    #[error("backend error: {0}")]
    Backend(String),
}
