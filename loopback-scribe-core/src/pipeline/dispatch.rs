use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::models::chunk::Span;
use crate::models::counters::SessionCounters;
use crate::traits::transcribe::TranscriptionCallback;

/// Hand-off receive timeout; keeps the loop responsive to shutdown.
const HANDOFF_RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on draining the backlog after shutdown, generous enough
/// for a slow transcriber to work through the queued spans.
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

pub(crate) struct DispatcherContext {
    pub handoff: Receiver<Span>,
    pub running: Arc<AtomicBool>,
    pub counters: Arc<SessionCounters>,
    pub callback: TranscriptionCallback,
    pub target_rate: u32,
}

/// Single consumer draining the hand-off channel: invoke the transcription
/// callback per span, serialized, then release the span immediately. No
/// reference to the audio survives the call.
pub(crate) fn run_dispatcher(ctx: DispatcherContext) {
    while ctx.running.load(Ordering::SeqCst) {
        match ctx.handoff.recv_timeout(HANDOFF_RECV_TIMEOUT) {
            Ok(span) => deliver(&ctx, span),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }

    // Shutdown: keep draining so spans accumulated before the stop signal
    // (including the accumulator's final flush) still reach the
    // transcriber, bounded so a stalled callback cannot hang teardown.
    let deadline = Instant::now() + DRAIN_DEADLINE;
    while Instant::now() < deadline {
        match ctx.handoff.recv_timeout(HANDOFF_RECV_TIMEOUT) {
            Ok(span) => deliver(&ctx, span),
            // Empty and quiet, or every sender is gone: done.
            Err(_) => break,
        }
    }
}

fn deliver(ctx: &DispatcherContext, span: Span) {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        (ctx.callback)(&span.samples, ctx.target_rate);
    }));
    if outcome.is_err() {
        log::error!("transcription callback panicked; span discarded");
    }
    ctx.counters.record_delivered_span();
    // `span` drops here; the audio is gone the moment the callback
    // returns.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use parking_lot::Mutex;
    use std::thread;

    fn span(value: f32, len: usize) -> Span {
        Span {
            samples: vec![value; len],
            rms: value.abs(),
        }
    }

    #[test]
    fn delivers_serialized_spans_then_exits_on_disconnect() {
        let (tx, rx) = bounded(5);
        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(SessionCounters::default());
        let received: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&received);
        let callback: TranscriptionCallback =
            Arc::new(move |samples, rate| {
                assert_eq!(rate, 16_000);
                sink.lock().push(samples.len());
            });

        let ctx = DispatcherContext {
            handoff: rx,
            running: Arc::clone(&running),
            counters: Arc::clone(&counters),
            callback,
            target_rate: 16_000,
        };
        let handle = thread::spawn(move || run_dispatcher(ctx));

        tx.send(span(0.1, 10)).unwrap();
        tx.send(span(0.2, 20)).unwrap();
        drop(tx);
        handle.join().unwrap();

        assert_eq!(*received.lock(), vec![10, 20]);
        assert_eq!(counters.spans_delivered(), 2);
    }

    #[test]
    fn callback_panic_is_contained() {
        let (tx, rx) = bounded(5);
        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(SessionCounters::default());
        let survived = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&survived);
        let callback: TranscriptionCallback = Arc::new(move |samples, _| {
            if samples.len() == 1 {
                panic!("transcriber blew up");
            }
            flag.store(true, Ordering::SeqCst);
        });

        let ctx = DispatcherContext {
            handoff: rx,
            running,
            counters: Arc::clone(&counters),
            callback,
            target_rate: 16_000,
        };
        let handle = thread::spawn(move || run_dispatcher(ctx));

        tx.send(span(0.5, 1)).unwrap();
        tx.send(span(0.5, 2)).unwrap();
        drop(tx);
        handle.join().unwrap();

        // The loop outlived the panic and still handled the second span.
        assert!(survived.load(Ordering::SeqCst));
        assert_eq!(counters.spans_delivered(), 2);
    }

    #[test]
    fn drains_backlog_after_shutdown_signal() {
        let (tx, rx) = bounded(5);
        // Already shut down before the dispatcher even starts.
        let running = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(SessionCounters::default());

        tx.send(span(0.1, 4)).unwrap();
        tx.send(span(0.2, 4)).unwrap();
        drop(tx);

        let delivered = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&delivered);
        let callback: TranscriptionCallback = Arc::new(move |_, _| {
            flag.store(true, Ordering::SeqCst);
        });

        let ctx = DispatcherContext {
            handoff: rx,
            running,
            counters: Arc::clone(&counters),
            callback,
            target_rate: 16_000,
        };
        run_dispatcher(ctx);

        assert!(delivered.load(Ordering::SeqCst));
        assert_eq!(counters.spans_delivered(), 2);
    }
}
