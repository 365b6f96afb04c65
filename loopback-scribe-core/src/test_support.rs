//! Scriptable in-memory audio backend standing in for platform hardware
//! in the pipeline tests.

use std::f32::consts::PI;
use std::thread;
use std::time::Duration;

use crate::models::device::DeviceInfo;
use crate::models::error::CaptureError;
use crate::traits::audio_backend::{AudioBackend, CaptureHandle};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Waveform {
    Silence,
    Sine { freq: f32, amplitude: f32 },
}

pub(crate) struct FakeDevice {
    info: DeviceInfo,
    waveform: Waveform,
    fail_open: bool,
    disconnect_after: Option<usize>,
}

impl FakeDevice {
    pub fn new(info: DeviceInfo, waveform: Waveform) -> Self {
        Self {
            info,
            waveform,
            fail_open: false,
            disconnect_after: None,
        }
    }

    /// A device whose `open` always fails.
    pub fn failing(info: DeviceInfo) -> Self {
        Self {
            info,
            waveform: Waveform::Silence,
            fail_open: true,
            disconnect_after: None,
        }
    }

    /// Let `reads` blocking reads succeed, then error like an unplugged
    /// device.
    pub fn disconnect_after(mut self, reads: usize) -> Self {
        self.disconnect_after = Some(reads);
        self
    }
}

pub(crate) struct FakeBackend {
    devices: Vec<FakeDevice>,
}

impl FakeBackend {
    pub fn new(devices: Vec<FakeDevice>) -> Self {
        Self { devices }
    }

    pub fn empty() -> Self {
        Self {
            devices: Vec::new(),
        }
    }
}

impl AudioBackend for FakeBackend {
    fn enumerate(&self) -> Vec<DeviceInfo> {
        self.devices.iter().map(|d| d.info.clone()).collect()
    }

    fn open(
        &self,
        device: &DeviceInfo,
        _frame_quantum: u32,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let fake = self
            .devices
            .iter()
            .find(|d| d.info.index == device.index)
            .ok_or(CaptureError::DeviceUnavailable)?;
        if fake.fail_open {
            return Err(CaptureError::DeviceOpenFailed("scripted open failure".into()));
        }
        Ok(Box::new(FakeHandle {
            channels: fake.info.channels,
            rate: fake.info.native_rate,
            waveform: fake.waveform,
            reads_left: fake.disconnect_after,
            phase: 0,
            closed: false,
        }))
    }
}

struct FakeHandle {
    channels: u16,
    rate: u32,
    waveform: Waveform,
    reads_left: Option<usize>,
    phase: u64,
    closed: bool,
}

impl CaptureHandle for FakeHandle {
    fn read_blocking(&mut self, frames: usize) -> Result<Vec<i16>, CaptureError> {
        if self.closed {
            return Err(CaptureError::DeviceUnavailable);
        }
        if let Some(left) = &mut self.reads_left {
            if *left == 0 {
                return Err(CaptureError::ReadFailed("device disconnected".into()));
            }
            *left -= 1;
        }

        // Pace the reader roughly like hardware would, without making the
        // tests real-time.
        thread::sleep(Duration::from_millis(10));

        let mut pcm = Vec::with_capacity(frames * usize::from(self.channels));
        for _ in 0..frames {
            let value = match self.waveform {
                Waveform::Silence => 0i16,
                Waveform::Sine { freq, amplitude } => {
                    let t = self.phase as f32 / self.rate as f32;
                    (amplitude * (2.0 * PI * freq * t).sin() * 32_767.0) as i16
                }
            };
            self.phase += 1;
            for _ in 0..self.channels {
                pcm.push(value);
            }
        }
        Ok(pcm)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
