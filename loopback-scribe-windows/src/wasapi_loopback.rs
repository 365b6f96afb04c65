//! WASAPI loopback backend for system audio.
//!
//! Captures the audio mix going to a render endpoint using
//! `AUDCLNT_STREAMFLAGS_LOOPBACK`. No special permissions needed on
//! Windows; DRM-protected audio is silenced in loopback.
//!
//! The shared-mode engine mixes in Float32; `read_blocking` converts to
//! the int16 PCM the capture capability promises, so the core normalizes
//! exactly once, in one place, for every backend.

use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use windows::core::PCWSTR;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::AvSetMmThreadCharacteristicsW;

use loopback_scribe_core::models::device::DeviceInfo;
use loopback_scribe_core::models::error::CaptureError;
use loopback_scribe_core::traits::audio_backend::{AudioBackend, CaptureHandle};

use crate::device_enumerator::DeviceEnumerator;

/// Poll interval while waiting for the engine to fill its buffer.
const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// WASAPI implementation of the platform audio capability.
///
/// Enumeration runs on the calling thread; the capture session behind each
/// handle is created lazily on the first blocking read, so every COM
/// object it owns lives and dies on the reader thread.
pub struct WasapiBackend {
    /// Enumeration index → MMDevice endpoint ID, refreshed per `enumerate`.
    endpoint_ids: Mutex<Vec<String>>,
}

impl WasapiBackend {
    pub fn new() -> Self {
        Self {
            endpoint_ids: Mutex::new(Vec::new()),
        }
    }
}

impl Default for WasapiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for WasapiBackend {
    fn enumerate(&self) -> Vec<DeviceInfo> {
        // S_FALSE (already initialized on this thread) passes `.ok()`.
        unsafe {
            if let Err(e) = CoInitializeEx(None, COINIT_MULTITHREADED).ok() {
                log::warn!("CoInitializeEx failed: {}", e);
                return Vec::new();
            }
        }
        let _com_guard = CoUninitializeGuard;

        let enumerator = match DeviceEnumerator::new() {
            Ok(e) => e,
            Err(e) => {
                log::warn!("device enumeration unavailable: {}", e);
                return Vec::new();
            }
        };

        match enumerator.list_render_endpoints() {
            Ok(endpoints) => {
                let mut ids = self.endpoint_ids.lock();
                ids.clear();
                let mut infos = Vec::with_capacity(endpoints.len());
                for endpoint in endpoints {
                    ids.push(endpoint.endpoint_id);
                    infos.push(endpoint.info);
                }
                infos
            }
            Err(e) => {
                log::warn!("failed to enumerate render endpoints: {}", e);
                Vec::new()
            }
        }
    }

    fn open(
        &self,
        device: &DeviceInfo,
        frame_quantum: u32,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let endpoint_id = self.endpoint_ids.lock().get(device.index).cloned();

        // Validate the endpoint up front so a missing device fails the
        // open, not the first read. The capture session itself is created
        // lazily on the reader thread, keeping its COM objects there.
        unsafe {
            if let Err(e) = CoInitializeEx(None, COINIT_MULTITHREADED).ok() {
                return Err(CaptureError::Backend(format!("CoInitializeEx failed: {}", e)));
            }
        }
        {
            let _com_guard = CoUninitializeGuard;
            let enumerator = DeviceEnumerator::new()?;
            match &endpoint_id {
                Some(id) => drop(enumerator.device_by_id(id)?),
                None => drop(enumerator.default_render_device()?),
            }
        }

        Ok(Box::new(LoopbackHandle {
            endpoint_id,
            frame_quantum,
            session: None,
            pending: Vec::new(),
            com_initialized: false,
            closed: false,
        }))
    }
}

/// One blocking-read loopback connection.
///
/// The WASAPI session is initialized on the first `read_blocking` call and
/// must be read and closed from that same thread.
pub struct LoopbackHandle {
    endpoint_id: Option<String>,
    frame_quantum: u32,
    session: Option<LoopbackSession>,
    pending: Vec<i16>,
    com_initialized: bool,
    closed: bool,
}

// SAFETY: COM objects are created lazily inside `read_blocking` and are
// confined to the single reader thread that owns the handle.
unsafe impl Send for LoopbackHandle {}

struct LoopbackSession {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    channels: u16,
}

impl CaptureHandle for LoopbackHandle {
    fn read_blocking(&mut self, frames: usize) -> Result<Vec<i16>, CaptureError> {
        if self.closed {
            return Err(CaptureError::DeviceUnavailable);
        }
        if self.session.is_none() {
            self.init_session()?;
        }
        let channels = match &self.session {
            Some(session) => usize::from(session.channels),
            None => return Err(CaptureError::DeviceUnavailable),
        };

        let needed = frames * channels;
        while self.pending.len() < needed {
            if self.closed {
                return Err(CaptureError::DeviceUnavailable);
            }
            let drained = self.drain_packets()?;
            if drained == 0 {
                thread::sleep(CAPTURE_POLL_INTERVAL);
            }
        }

        let rest = self.pending.split_off(needed);
        Ok(std::mem::replace(&mut self.pending, rest))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(session) = self.session.take() {
            unsafe {
                let _ = session.audio_client.Stop();
            }
            drop(session);
        }
        if self.com_initialized {
            unsafe {
                CoUninitialize();
            }
            self.com_initialized = false;
        }
    }
}

impl Drop for LoopbackHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl LoopbackHandle {
    /// Create the WASAPI capture session on the reader thread.
    ///
    /// Sequence:
    /// 1. CoInitializeEx (MTA)
    /// 2. Resolve the render endpoint (by ID, default otherwise)
    /// 3. Activate IAudioClient
    /// 4. Initialize with LOOPBACK|NOPERSIST in shared mode
    /// 5. Get IAudioCaptureClient
    /// 6. Register with MMCSS, start the stream
    fn init_session(&mut self) -> Result<(), CaptureError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| CaptureError::Backend(format!("CoInitializeEx failed: {}", e)))?;
            self.com_initialized = true;

            let enumerator = DeviceEnumerator::new()?;
            let device = match &self.endpoint_id {
                Some(id) => enumerator.device_by_id(id)?,
                None => enumerator.default_render_device()?,
            };

            let audio_client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| CaptureError::DeviceOpenFailed(format!("Activate failed: {}", e)))?;

            let mix_format_ptr = audio_client
                .GetMixFormat()
                .map_err(|e| CaptureError::DeviceOpenFailed(format!("GetMixFormat failed: {}", e)))?;

            let mix_format = &*mix_format_ptr;
            let channels = mix_format.nChannels;
            let rate = mix_format.nSamplesPerSec.max(1);

            // Engine buffer sized for the requested quantum, floored at
            // 100ms so slow consumers do not glitch (units of 100ns).
            let quantum_duration =
                i64::from(self.frame_quantum) * 10_000_000 / i64::from(rate);
            let buffer_duration = quantum_duration.max(1_000_000);

            let init_result = audio_client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
                buffer_duration,
                0,
                mix_format,
                None,
            );
            if let Err(e) = init_result {
                CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));
                return Err(CaptureError::DeviceOpenFailed(format!(
                    "IAudioClient::Initialize (loopback) failed: {}",
                    e
                )));
            }
            CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));

            let capture_client: IAudioCaptureClient = audio_client
                .GetService()
                .map_err(|e| CaptureError::DeviceOpenFailed(format!("GetService failed: {}", e)))?;

            // MMCSS registration for real-time priority.
            let mut task_index: u32 = 0;
            let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
            let _mmcss_handle =
                AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index);

            audio_client
                .Start()
                .map_err(|e| CaptureError::Backend(format!("IAudioClient::Start failed: {}", e)))?;

            self.session = Some(LoopbackSession {
                audio_client,
                capture_client,
                channels,
            });
            Ok(())
        }
    }

    /// Pull every packet the engine has buffered into `pending`.
    /// Returns the number of samples drained.
    fn drain_packets(&mut self) -> Result<usize, CaptureError> {
        // Cloning the interface (AddRef) sidesteps borrowing `self` while
        // `pending` grows.
        let (capture_client, channels) = match &self.session {
            Some(session) => (
                session.capture_client.clone(),
                usize::from(session.channels),
            ),
            None => return Err(CaptureError::DeviceUnavailable),
        };
        let mut drained = 0usize;

        unsafe {
            let mut packet_length = capture_client
                .GetNextPacketSize()
                .map_err(|e| CaptureError::ReadFailed(format!("GetNextPacketSize failed: {}", e)))?;

            while packet_length > 0 {
                let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;

                capture_client
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| CaptureError::ReadFailed(format!("GetBuffer failed: {}", e)))?;

                if num_frames > 0 && !buffer_ptr.is_null() {
                    let total_samples = num_frames as usize * channels;

                    if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                        self.pending.extend(std::iter::repeat(0i16).take(total_samples));
                    } else {
                        let float_ptr = buffer_ptr as *const f32;
                        let samples = std::slice::from_raw_parts(float_ptr, total_samples);
                        self.pending.extend(samples.iter().map(|&s| {
                            (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
                        }));
                    }
                    drained += total_samples;
                }

                capture_client
                    .ReleaseBuffer(num_frames)
                    .map_err(|e| CaptureError::ReadFailed(format!("ReleaseBuffer failed: {}", e)))?;

                packet_length = capture_client
                    .GetNextPacketSize()
                    .map_err(|e| CaptureError::ReadFailed(format!("GetNextPacketSize failed: {}", e)))?;
            }
        }

        Ok(drained)
    }
}

/// RAII guard to call CoUninitialize when dropped.
struct CoUninitializeGuard;

impl Drop for CoUninitializeGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}
