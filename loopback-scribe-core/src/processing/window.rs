use crate::models::chunk::Span;
use crate::processing::resample::rms_level;

/// Sliding accumulation window for resampled audio.
///
/// Chunks are appended until the window covers the configured span length;
/// `flush` then concatenates them into a `Span` and re-seeds the window
/// with the trailing overlap, so consecutive spans share their boundary
/// audio and no word is truncated at a span edge.
#[derive(Debug)]
pub struct AccumulationWindow {
    pending: Vec<Vec<f32>>,
    sample_count: usize,
    span_samples: usize,
    overlap_samples: usize,
}

impl AccumulationWindow {
    pub fn new(span_samples: usize, overlap_samples: usize) -> Self {
        Self {
            pending: Vec::new(),
            sample_count: 0,
            span_samples,
            overlap_samples,
        }
    }

    pub fn push(&mut self, chunk: Vec<f32>) {
        self.sample_count += chunk.len();
        self.pending.push(chunk);
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    pub fn is_full(&self) -> bool {
        self.sample_count >= self.span_samples
    }

    /// Fill fraction of a full span, clamped to [0, 1].
    pub fn progress(&self) -> f32 {
        if self.span_samples == 0 {
            return 0.0;
        }
        (self.sample_count as f32 / self.span_samples as f32).min(1.0)
    }

    /// Concatenate the pending chunks into a span and re-seed the window
    /// with the trailing overlap (the whole span when it is shorter than
    /// the overlap). Returns `None` when nothing is buffered.
    pub fn flush(&mut self) -> Option<Span> {
        let samples = self.concat()?;
        let rms = rms_level(&samples);

        let tail_start = samples.len().saturating_sub(self.overlap_samples);
        let tail = samples[tail_start..].to_vec();
        self.sample_count = tail.len();
        if !tail.is_empty() {
            self.pending.push(tail);
        }

        Some(Span { samples, rms })
    }

    /// Flush without re-seeding; used for the final span at shutdown.
    pub fn drain_final(&mut self) -> Option<Span> {
        let samples = self.concat()?;
        let rms = rms_level(&samples);
        Some(Span { samples, rms })
    }

    fn concat(&mut self) -> Option<Vec<f32>> {
        if self.sample_count == 0 {
            return None;
        }
        let mut samples = Vec::with_capacity(self.sample_count);
        for chunk in self.pending.drain(..) {
            samples.extend(chunk);
        }
        self.sample_count = 0;
        Some(samples)
    }
}
