use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver};

use crate::models::chunk::{Span, TaggedChunk};
use crate::models::config::CaptureConfig;
use crate::models::counters::SessionCounters;
use crate::models::device::{DeviceInfo, DeviceSelector};
use crate::models::error::CaptureError;
use crate::pipeline::accumulate::{run_accumulator, AccumulatorContext};
use crate::pipeline::device_stream::DeviceStream;
use crate::pipeline::dispatch::{run_dispatcher, DispatcherContext};
use crate::traits::audio_backend::AudioBackend;
use crate::traits::transcribe::TranscriptionCallback;

/// How long `stop()` waits for each reader thread before abandoning it.
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns a capture session: the device streams, the accumulator thread and
/// the dispatcher thread. Exactly one session can be active per
/// supervisor; the caller's control thread only ever issues `start` and
/// `stop`.
///
/// Known limitation: chunks from multiple devices are merged in arrival
/// order without timestamp alignment. That is acceptable while at most one
/// loopback endpoint carries signal at a time; simultaneous audio on
/// several endpoints is concatenated, not mixed.
pub struct CaptureSupervisor {
    backend: Arc<dyn AudioBackend>,
    config: CaptureConfig,
    counters: Arc<SessionCounters>,
    running: Arc<AtomicBool>,
    streams: Vec<DeviceStream>,
    accumulator_handle: Option<thread::JoinHandle<()>>,
    dispatcher_handle: Option<thread::JoinHandle<()>>,
    // Receiver clones kept so `stop()` can discard whatever neither
    // consumer got to.
    ingest_drain: Option<Receiver<TaggedChunk>>,
    handoff_drain: Option<Receiver<Span>>,
}

impl CaptureSupervisor {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        config: CaptureConfig,
    ) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::InvalidConfig)?;
        Ok(Self {
            backend,
            config,
            counters: Arc::new(SessionCounters::default()),
            running: Arc::new(AtomicBool::new(false)),
            streams: Vec::new(),
            accumulator_handle: None,
            dispatcher_handle: None,
            ingest_drain: None,
            handoff_drain: None,
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// List the loopback endpoints a session would open, deduplicated by
    /// name, with the platform default output included even when the
    /// enumeration did not flag it.
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        let all = self.backend.enumerate();
        let default = all.iter().find(|d| d.is_default).cloned();

        let mut selected = select_loopback_devices(all);
        let mut seen: Vec<String> = Vec::new();
        selected.retain(|d| {
            if seen.contains(&d.name) {
                false
            } else {
                seen.push(d.name.clone());
                true
            }
        });

        if let Some(default) = default {
            if !selected.iter().any(|d| d.name == default.name) {
                // Coerce the default output endpoint into loopback duty.
                selected.push(default);
            }
        }
        selected
    }

    /// Open the selected devices and spawn the pipeline threads.
    ///
    /// Returns false, with no threads started, when the session is
    /// already running or when zero devices open successfully. A device
    /// that fails to open is logged and skipped; it never aborts its
    /// siblings.
    pub fn start(&mut self, selector: DeviceSelector, callback: TranscriptionCallback) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            log::warn!("capture session already running; start ignored");
            return false;
        }
        self.counters.reset();

        let devices: Vec<DeviceInfo> = match selector {
            DeviceSelector::All => self.list_devices(),
            DeviceSelector::Index(index) => self
                .list_devices()
                .into_iter()
                .filter(|d| d.index == index)
                .collect(),
        };

        let (ingest_tx, ingest_rx) = unbounded::<TaggedChunk>();
        let (handoff_tx, handoff_rx) = bounded::<Span>(self.config.handoff_capacity);

        let mut streams = Vec::new();
        for info in devices {
            let mut stream = DeviceStream::new(info);
            if stream.start(
                self.backend.as_ref(),
                self.config.frame_quantum,
                ingest_tx.clone(),
                Arc::clone(&self.counters),
            ) {
                streams.push(stream);
            }
        }
        drop(ingest_tx);

        if streams.is_empty() {
            log::warn!("no loopback devices could be opened; capture not started");
            self.running.store(false, Ordering::SeqCst);
            return false;
        }

        let names: Vec<String> = streams.iter().map(|s| s.info().name.clone()).collect();
        log::info!("capture started on {} device(s): {:?}", names.len(), names);
        self.counters.set_active_device_names(names);
        self.streams = streams;
        self.ingest_drain = Some(ingest_rx.clone());
        self.handoff_drain = Some(handoff_rx.clone());

        let accumulator_ctx = AccumulatorContext {
            ingest: ingest_rx,
            handoff: handoff_tx,
            running: Arc::clone(&self.running),
            counters: Arc::clone(&self.counters),
            config: self.config.clone(),
        };
        self.accumulator_handle = Some(
            thread::Builder::new()
                .name("resample-accumulator".into())
                .spawn(move || run_accumulator(accumulator_ctx))
                .expect("failed to spawn accumulator thread"),
        );

        let dispatcher_ctx = DispatcherContext {
            handoff: handoff_rx,
            running: Arc::clone(&self.running),
            counters: Arc::clone(&self.counters),
            callback,
            target_rate: self.config.target_sample_rate,
        };
        self.dispatcher_handle = Some(
            thread::Builder::new()
                .name("transcription-dispatcher".into())
                .spawn(move || run_dispatcher(dispatcher_ctx))
                .expect("failed to spawn dispatcher thread"),
        );

        true
    }

    /// Signal shutdown and tear the session down.
    ///
    /// Readers are joined with a bounded timeout, the accumulator gets to
    /// flush its partial window, the dispatcher gets to drain the hand-off
    /// backlog, and anything left in either channel is discarded.
    /// Idempotent; safe to call when not running.
    pub fn stop(&mut self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if !was_running && self.streams.is_empty() {
            return;
        }

        for stream in &mut self.streams {
            stream.stop(READER_JOIN_TIMEOUT);
        }
        self.streams.clear();

        if let Some(handle) = self.accumulator_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.dispatcher_handle.take() {
            let _ = handle.join();
        }

        if let Some(rx) = self.ingest_drain.take() {
            while rx.try_recv().is_ok() {}
        }
        if let Some(rx) = self.handoff_drain.take() {
            while rx.try_recv().is_ok() {}
        }

        log::info!(
            "capture stopped ({} spans delivered, {} dropped)",
            self.counters.spans_delivered(),
            self.counters.dropped_spans()
        );
    }
}

impl Drop for CaptureSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Selection policy over an enumeration: explicitly loopback-flagged
/// endpoints first, then name-matched ones, then the platform default
/// output as a last resort.
fn select_loopback_devices(all: Vec<DeviceInfo>) -> Vec<DeviceInfo> {
    let flagged: Vec<DeviceInfo> = all.iter().filter(|d| d.is_loopback).cloned().collect();
    if !flagged.is_empty() {
        return flagged;
    }

    let named: Vec<DeviceInfo> = all
        .iter()
        .filter(|d| d.name.to_lowercase().contains("loopback"))
        .cloned()
        .collect();
    if !named.is_empty() {
        return named;
    }

    all.into_iter().filter(|d| d.is_default).collect()
}
