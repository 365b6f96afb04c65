//! # loopback-scribe-windows
//!
//! Windows WASAPI backend for loopback-scribe.
//!
//! Provides:
//! - `WasapiBackend` — `AudioBackend` implementation enumerating render
//!   endpoints and opening them in loopback mode
//! - `LoopbackHandle` — blocking-read capture connection over
//!   `AUDCLNT_STREAMFLAGS_LOOPBACK`
//! - `DeviceEnumerator` — render-endpoint enumeration via the MMDevice API
//!
//! ## Platform Requirements
//! - Windows 10 1703+ (build 15063)
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use loopback_scribe_core::{CaptureConfig, CaptureSupervisor, DeviceSelector};
//! use loopback_scribe_windows::WasapiBackend;
//!
//! let backend = Arc::new(WasapiBackend::new());
//! let mut supervisor = CaptureSupervisor::new(backend, CaptureConfig::default())?;
//! supervisor.start(DeviceSelector::All, Arc::new(|samples, rate| { /* transcribe */ }));
//! ```

#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod wasapi_loopback;

#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use wasapi_loopback::WasapiBackend;
