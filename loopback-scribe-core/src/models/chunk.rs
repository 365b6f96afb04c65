/// One hardware read's worth of audio, normalized to mono f32 in [-1, 1]
/// and tagged with the producing device's native sample rate.
///
/// Moves by value across the ingest channel; never mutated after send.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedChunk {
    pub samples: Vec<f32>,
    pub native_rate: u32,
}

/// One hand-off unit: accumulated mono audio at the target rate, carrying
/// its own RMS energy.
///
/// A span lives only between accumulator emission and dispatcher
/// consumption; the dispatcher drops it as soon as the transcription
/// callback returns.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub samples: Vec<f32>,
    pub rms: f32,
}
