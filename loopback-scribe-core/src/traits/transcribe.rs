use std::sync::Arc;

/// Callback invoked once per completed audio span.
///
/// Parameters:
/// - `samples`: Mono f32 audio, one span's worth including the overlap
///   carried from the previous span.
/// - `sample_rate`: The configured target rate the samples were
///   resampled to.
///
/// Ownership contract: the callee must not retain a reference to `samples`
/// beyond the call; the buffer is released the moment the callback
/// returns. Invocations are serialized on the dispatcher thread, never
/// concurrent. A panic inside the callback is caught and logged at the
/// dispatcher boundary.
pub type TranscriptionCallback = Arc<dyn Fn(&[f32], u32) + Send + Sync + 'static>;
