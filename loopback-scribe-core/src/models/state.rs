/// Device stream state machine.
///
/// Transitions are linear, no cycles:
/// ```text
/// Idle → Opening → Streaming → Stopping → Closed
/// ```
/// A failed open jumps straight from `Opening` to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Opening,
    Streaming,
    Stopping,
    Closed,
}

impl StreamState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
