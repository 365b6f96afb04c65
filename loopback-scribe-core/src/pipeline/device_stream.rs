use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::models::chunk::TaggedChunk;
use crate::models::counters::SessionCounters;
use crate::models::device::DeviceInfo;
use crate::models::state::StreamState;
use crate::processing::resample::pcm16_to_mono_f32;
use crate::traits::audio_backend::{AudioBackend, CaptureHandle};

/// One hardware capture connection plus its dedicated reader thread.
///
/// The reader performs blocking reads of ~100 ms (`native_rate / 10`
/// frames), normalizes to mono f32, and pushes tagged chunks onto the
/// shared ingest channel. A hardware error or disconnect ends the loop
/// quietly; that is expected during shutdown or device removal and never
/// disturbs sibling streams.
pub struct DeviceStream {
    info: DeviceInfo,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<StreamState>>,
    reader_handle: Option<thread::JoinHandle<()>>,
}

impl DeviceStream {
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(StreamState::Idle)),
            reader_handle: None,
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn state(&self) -> StreamState {
        *self.state.lock()
    }

    /// Open the hardware connection and spawn the reader thread.
    ///
    /// Returns false when the device cannot be opened; the failure is
    /// local to this stream.
    pub fn start(
        &mut self,
        backend: &dyn AudioBackend,
        frame_quantum: u32,
        ingest: Sender<TaggedChunk>,
        counters: Arc<SessionCounters>,
    ) -> bool {
        *self.state.lock() = StreamState::Opening;

        let handle = match backend.open(&self.info, frame_quantum) {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("failed to open '{}': {}", self.info.name, e);
                *self.state.lock() = StreamState::Closed;
                return false;
            }
        };

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let state = Arc::clone(&self.state);
        let info = self.info.clone();

        let spawned = thread::Builder::new()
            .name(format!("loopback-reader-{}", self.info.index))
            .spawn(move || {
                let mut handle = handle;
                reader_loop(handle.as_mut(), &info, &running, &ingest, &counters);
                handle.close();
                *state.lock() = StreamState::Closed;
            });

        match spawned {
            Ok(join_handle) => {
                self.reader_handle = Some(join_handle);
                *self.state.lock() = StreamState::Streaming;
                true
            }
            Err(e) => {
                // The handle was moved into the failed closure and dropped
                // there, which releases the connection.
                log::warn!("failed to spawn reader for '{}': {}", self.info.name, e);
                self.running.store(false, Ordering::SeqCst);
                *self.state.lock() = StreamState::Closed;
                false
            }
        }
    }

    /// Stop the reader and wait for it within `join_timeout`.
    ///
    /// Idempotent and safe from any state. A reader stuck past the timeout
    /// is abandoned; it closes its connection itself when the blocking
    /// read eventually returns.
    pub fn stop(&mut self, join_timeout: Duration) {
        self.running.store(false, Ordering::SeqCst);
        {
            let mut state = self.state.lock();
            if state.is_streaming() {
                *state = StreamState::Stopping;
            }
        }

        if let Some(handle) = self.reader_handle.take() {
            let deadline = Instant::now() + join_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::warn!(
                    "reader for '{}' did not stop within {:?}; abandoning",
                    self.info.name,
                    join_timeout
                );
            }
        }
    }
}

fn reader_loop(
    handle: &mut dyn CaptureHandle,
    info: &DeviceInfo,
    running: &AtomicBool,
    ingest: &Sender<TaggedChunk>,
    counters: &SessionCounters,
) {
    let frames_per_read = (info.native_rate / 10).max(1) as usize;

    while running.load(Ordering::SeqCst) {
        let pcm = match handle.read_blocking(frames_per_read) {
            Ok(pcm) => pcm,
            Err(e) => {
                // Expected during shutdown or device removal.
                log::debug!("reader for '{}' exiting: {}", info.name, e);
                break;
            }
        };
        if pcm.is_empty() {
            continue;
        }

        counters.record_callback();
        let samples = pcm16_to_mono_f32(&pcm, info.channels);
        let chunk = TaggedChunk {
            samples,
            native_rate: info.native_rate,
        };
        if ingest.send(chunk).is_err() {
            // Accumulator is gone; nothing left to feed.
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeBackend, FakeDevice, Waveform};
    use crossbeam_channel::unbounded;

    fn info(index: usize, rate: u32) -> DeviceInfo {
        DeviceInfo {
            index,
            name: format!("Fake Loopback {index}"),
            channels: 2,
            native_rate: rate,
            is_loopback: true,
            is_default: index == 0,
        }
    }

    #[test]
    fn open_failure_closes_without_spawning() {
        let backend = FakeBackend::new(vec![FakeDevice::failing(info(0, 48_000))]);
        let (tx, rx) = unbounded();
        let counters = Arc::new(SessionCounters::default());

        let mut stream = DeviceStream::new(info(0, 48_000));
        assert!(!stream.start(&backend, 1024, tx, counters));
        assert_eq!(stream.state(), StreamState::Closed);
        assert!(rx.is_empty());
    }

    #[test]
    fn streaming_tags_chunks_with_native_rate() {
        let backend = FakeBackend::new(vec![FakeDevice::new(
            info(0, 32_000),
            Waveform::Sine {
                freq: 440.0,
                amplitude: 0.2,
            },
        )]);
        let (tx, rx) = unbounded();
        let counters = Arc::new(SessionCounters::default());

        let mut stream = DeviceStream::new(info(0, 32_000));
        assert!(stream.start(&backend, 1024, tx, Arc::clone(&counters)));
        assert!(stream.state().is_streaming());

        let chunk = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(chunk.native_rate, 32_000);
        // 100 ms of frames, collapsed to mono.
        assert_eq!(chunk.samples.len(), 3_200);
        assert!(counters.callbacks_received() > 0);

        stream.stop(Duration::from_secs(2));
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn read_error_exits_quietly() {
        let backend = FakeBackend::new(vec![FakeDevice::new(
            info(0, 16_000),
            Waveform::Silence,
        )
        .disconnect_after(2)]);
        let (tx, rx) = unbounded();
        let counters = Arc::new(SessionCounters::default());

        let mut stream = DeviceStream::new(info(0, 16_000));
        assert!(stream.start(&backend, 1024, tx, counters));

        // Two reads arrive, then the device "disconnects" and the reader
        // winds down on its own.
        let deadline = Instant::now() + Duration::from_secs(2);
        while !stream.state().is_closed() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(rx.len(), 2);

        // Stop after the fact is a no-op.
        stream.stop(Duration::from_millis(100));
    }

    #[test]
    fn stop_is_idempotent_from_idle() {
        let mut stream = DeviceStream::new(info(0, 48_000));
        stream.stop(Duration::from_millis(10));
        stream.stop(Duration::from_millis(10));
        assert_eq!(stream.state(), StreamState::Idle);
    }
}
