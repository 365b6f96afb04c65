use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;

/// Single-session diagnostic counters.
///
/// Each numeric field is owned by one pipeline stage and read lock-free by
/// observers; values are diagnostic, not correctness-critical, so all
/// atomic accesses use relaxed ordering. Reset at every session start.
#[derive(Debug, Default)]
pub struct SessionCounters {
    /// Spans discarded because the hand-off queue was full.
    dropped_spans: AtomicU64,
    /// Successful hardware reads across all device streams.
    callbacks_received: AtomicU64,
    /// Spans handed to the transcription callback.
    spans_delivered: AtomicU64,
    /// Fill fraction of the accumulation window, f32 bits in [0, 1].
    buffer_progress: AtomicU32,
    /// RMS of the most recently flushed span, f32 bits.
    last_span_rms: AtomicU32,
    active_device_names: RwLock<Vec<String>>,
}

impl SessionCounters {
    pub fn reset(&self) {
        self.dropped_spans.store(0, Ordering::Relaxed);
        self.callbacks_received.store(0, Ordering::Relaxed);
        self.spans_delivered.store(0, Ordering::Relaxed);
        self.buffer_progress.store(0f32.to_bits(), Ordering::Relaxed);
        self.last_span_rms.store(0f32.to_bits(), Ordering::Relaxed);
        self.active_device_names.write().clear();
    }

    pub fn dropped_spans(&self) -> u64 {
        self.dropped_spans.load(Ordering::Relaxed)
    }

    pub fn callbacks_received(&self) -> u64 {
        self.callbacks_received.load(Ordering::Relaxed)
    }

    pub fn spans_delivered(&self) -> u64 {
        self.spans_delivered.load(Ordering::Relaxed)
    }

    pub fn buffer_progress(&self) -> f32 {
        f32::from_bits(self.buffer_progress.load(Ordering::Relaxed))
    }

    pub fn last_span_rms(&self) -> f32 {
        f32::from_bits(self.last_span_rms.load(Ordering::Relaxed))
    }

    pub fn active_device_names(&self) -> Vec<String> {
        self.active_device_names.read().clone()
    }

    pub(crate) fn record_dropped_span(&self) {
        self.dropped_spans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_callback(&self) {
        self.callbacks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered_span(&self) {
        self.spans_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_buffer_progress(&self, progress: f32) {
        self.buffer_progress
            .store(progress.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn set_last_span_rms(&self, rms: f32) {
        self.last_span_rms.store(rms.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn set_active_device_names(&self, names: Vec<String>) {
        *self.active_device_names.write() = names;
    }
}
