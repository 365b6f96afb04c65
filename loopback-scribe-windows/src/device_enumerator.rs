//! Windows render-endpoint enumeration via the MMDevice API.
//!
//! WASAPI loopback reads the mix of a *render* endpoint, so the loopback
//! universe is the set of active render devices. Each endpoint is reported
//! with its friendly name and native mix format, flagged loopback-capable,
//! with the default console endpoint marked default.

use windows::core::PCWSTR;
use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::{PropVariantClear, PROPVARIANT};
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::VT_LPWSTR;

use loopback_scribe_core::models::device::DeviceInfo;
use loopback_scribe_core::models::error::CaptureError;

/// One enumerated render endpoint: the core-facing descriptor plus the
/// MMDevice ID needed to reopen it.
pub struct EnumeratedEndpoint {
    pub info: DeviceInfo,
    pub endpoint_id: String,
}

/// Render-endpoint enumerator over `IMMDeviceEnumerator`.
///
/// Requires COM to be initialized on the calling thread.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    pub fn new() -> Result<Self, CaptureError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map_err(|e| CaptureError::Backend(format!("failed to create enumerator: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    /// List active render endpoints as loopback-capable devices.
    pub fn list_render_endpoints(&self) -> Result<Vec<EnumeratedEndpoint>, CaptureError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eRender, DEVICE_STATE_ACTIVE)
                .map_err(|e| CaptureError::Backend(format!("EnumAudioEndpoints failed: {}", e)))?;

            let count = collection
                .GetCount()
                .map_err(|e| CaptureError::Backend(format!("GetCount failed: {}", e)))?;

            let default_id = self
                .enumerator
                .GetDefaultAudioEndpoint(eRender, eConsole)
                .ok()
                .and_then(|d| d.GetId().ok())
                .and_then(|id| id.to_string().ok());

            let mut endpoints = Vec::new();

            for i in 0..count {
                let device = match collection.Item(i) {
                    Ok(d) => d,
                    Err(_) => continue,
                };

                let endpoint_id = match device.GetId() {
                    Ok(id) => id.to_string().unwrap_or_default(),
                    Err(_) => continue,
                };

                let name = Self::get_device_friendly_name(&device)
                    .unwrap_or_else(|| format!("Render Endpoint {}", i));

                let (channels, native_rate) = Self::get_mix_format(&device).unwrap_or((2, 48_000));
                let is_default = default_id.as_deref() == Some(endpoint_id.as_str());

                endpoints.push(EnumeratedEndpoint {
                    info: DeviceInfo {
                        index: i as usize,
                        name,
                        channels,
                        native_rate,
                        // Every render endpoint can be captured in
                        // loopback mode.
                        is_loopback: true,
                        is_default,
                    },
                    endpoint_id,
                });
            }

            Ok(endpoints)
        }
    }

    /// Resolve an endpoint ID back to an `IMMDevice`.
    pub fn device_by_id(&self, endpoint_id: &str) -> Result<IMMDevice, CaptureError> {
        unsafe {
            let wide_id: Vec<u16> = endpoint_id.encode_utf16().chain(std::iter::once(0)).collect();
            self.enumerator
                .GetDevice(PCWSTR(wide_id.as_ptr()))
                .map_err(|_| CaptureError::DeviceUnavailable)
        }
    }

    /// The default render endpoint (the device the system is playing to).
    pub fn default_render_device(&self) -> Result<IMMDevice, CaptureError> {
        unsafe {
            self.enumerator
                .GetDefaultAudioEndpoint(eRender, eConsole)
                .map_err(|_| CaptureError::DeviceUnavailable)
        }
    }

    /// Read the PKEY_Device_FriendlyName property from a device.
    fn get_device_friendly_name(device: &IMMDevice) -> Option<String> {
        unsafe {
            let store = device.OpenPropertyStore(STGM_READ).ok()?;

            let mut prop_variant = std::mem::zeroed::<PROPVARIANT>();
            store
                .GetValue(&PKEY_Device_FriendlyName, &mut prop_variant)
                .ok()?;

            let name = if prop_variant.Anonymous.Anonymous.vt == VT_LPWSTR {
                let pwsz = prop_variant.Anonymous.Anonymous.Anonymous.pwszVal;
                if !pwsz.is_null() {
                    let len = (0..).take_while(|&i| *pwsz.offset(i) != 0).count();
                    Some(String::from_utf16_lossy(std::slice::from_raw_parts(
                        pwsz, len,
                    )))
                } else {
                    None
                }
            } else {
                None
            };

            PropVariantClear(&mut prop_variant).ok();
            name
        }
    }

    /// Query a device's shared-mode mix format for channels and rate.
    fn get_mix_format(device: &IMMDevice) -> Option<(u16, u32)> {
        unsafe {
            let audio_client: IAudioClient = device.Activate(CLSCTX_ALL, None).ok()?;
            let mix_format_ptr = audio_client.GetMixFormat().ok()?;
            let mix_format = &*mix_format_ptr;
            let result = (mix_format.nChannels, mix_format.nSamplesPerSec);
            CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));
            Some(result)
        }
    }
}
