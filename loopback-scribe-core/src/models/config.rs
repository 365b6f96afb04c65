use serde::Serialize;

/// Tuning values consumed by the capture pipeline.
///
/// Values only; loading them from a config file belongs to the
/// surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureConfig {
    /// Sample rate in Hz delivered to the transcriber (default: 16000).
    pub target_sample_rate: u32,

    /// Frames per hardware buffer requested at open time (default: 1024).
    pub frame_quantum: u32,

    /// Seconds of audio accumulated per span (default: 10).
    pub accumulate_seconds: u32,

    /// Seconds of trailing audio carried into the next span so words are
    /// not cut at span boundaries (default: 2).
    pub overlap_seconds: u32,

    /// Capacity of the span hand-off queue (default: 5).
    pub handoff_capacity: usize,
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.target_sample_rate == 0 {
            return Err("target sample rate must be positive".into());
        }
        if self.frame_quantum == 0 {
            return Err("frame quantum must be positive".into());
        }
        if self.accumulate_seconds == 0 {
            return Err("accumulate window must be positive".into());
        }
        if self.overlap_seconds >= self.accumulate_seconds {
            return Err(format!(
                "overlap ({}s) must be shorter than the accumulate window ({}s)",
                self.overlap_seconds, self.accumulate_seconds
            ));
        }
        if self.handoff_capacity == 0 {
            return Err("hand-off queue capacity must be positive".into());
        }
        Ok(())
    }

    /// Samples needed before the window flushes a span.
    pub fn span_samples(&self) -> usize {
        (self.target_sample_rate * self.accumulate_seconds) as usize
    }

    /// Samples carried from one span into the next.
    pub fn overlap_samples(&self) -> usize {
        (self.target_sample_rate * self.overlap_seconds) as usize
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            frame_quantum: 1024,
            accumulate_seconds: 10,
            overlap_seconds: 2,
            handoff_capacity: 5,
        }
    }
}
