use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::models::chunk::{Span, TaggedChunk};
use crate::models::config::CaptureConfig;
use crate::models::counters::SessionCounters;
use crate::processing::resample::resample_chunk;
use crate::processing::window::AccumulationWindow;

/// Spans with RMS below this are treated as digital silence and never
/// reach the transcriber.
pub const SILENCE_RMS_THRESHOLD: f32 = 1e-6;

/// Ingest receive timeout; keeps the loop responsive to the running flag.
const INGEST_RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Bound on the blocking enqueue of the final shutdown span.
const FINAL_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) struct AccumulatorContext {
    pub ingest: Receiver<TaggedChunk>,
    pub handoff: Sender<Span>,
    pub running: Arc<AtomicBool>,
    pub counters: Arc<SessionCounters>,
    pub config: CaptureConfig,
}

/// Single consumer draining the ingest channel: resample each tagged
/// chunk to the target rate, grow the sliding window, and emit completed
/// spans to the hand-off channel.
///
/// The hand-off enqueue is strictly non-blocking: when the queue is full
/// the span is dropped and counted, because capture must never stall
/// waiting for transcription. On shutdown the partial window is flushed
/// as one final best-effort span.
pub(crate) fn run_accumulator(ctx: AccumulatorContext) {
    let mut window =
        AccumulationWindow::new(ctx.config.span_samples(), ctx.config.overlap_samples());
    // Whether any new audio arrived since the last flush; keeps the final
    // flush from re-emitting a bare overlap tail.
    let mut fresh = false;

    while ctx.running.load(Ordering::SeqCst) {
        let chunk = match ctx.ingest.recv_timeout(INGEST_RECV_TIMEOUT) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let resampled = match resample_chunk(
            &chunk.samples,
            chunk.native_rate,
            ctx.config.target_sample_rate,
        ) {
            Ok(resampled) => resampled,
            Err(e) => {
                log::warn!("dropping chunk from {} Hz device: {}", chunk.native_rate, e);
                continue;
            }
        };
        if resampled.is_empty() {
            continue;
        }

        window.push(resampled);
        fresh = true;
        ctx.counters.set_buffer_progress(window.progress());

        while window.is_full() {
            if let Some(span) = window.flush() {
                emit_span(&ctx, span);
                fresh = false;
            }
            ctx.counters.set_buffer_progress(window.progress());
        }
    }

    // Final best-effort flush so trailing audio still reaches the
    // transcriber. Blocking, but bounded.
    if fresh {
        if let Some(span) = window.drain_final() {
            ctx.counters.set_last_span_rms(span.rms);
            if span.rms < SILENCE_RMS_THRESHOLD {
                log::debug!("final span is silence (rms {:.2e}); discarded", span.rms);
            } else if ctx
                .handoff
                .send_timeout(span, FINAL_FLUSH_TIMEOUT)
                .is_err()
            {
                ctx.counters.record_dropped_span();
                log::warn!("final span dropped: hand-off queue unavailable");
            }
        }
    }
}

fn emit_span(ctx: &AccumulatorContext, span: Span) {
    ctx.counters.set_last_span_rms(span.rms);
    log::debug!(
        "span ready: {} samples, rms {:.6}",
        span.samples.len(),
        span.rms
    );

    if span.rms < SILENCE_RMS_THRESHOLD {
        // Silent span: skip the transcriber. The window already re-seeded
        // itself with the overlap tail, so continuity is preserved.
        return;
    }

    match ctx.handoff.try_send(span) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            ctx.counters.record_dropped_span();
            log::warn!(
                "hand-off queue full; span dropped ({} so far)",
                ctx.counters.dropped_spans()
            );
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}
