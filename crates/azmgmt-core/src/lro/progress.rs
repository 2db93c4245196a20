//! Progress events for long-running operations
//!
//! A [`Poller`](super::Poller) can report each status check through a
//! callback, for spinners and progress bars.

use super::OperationState;
use std::time::Duration;

/// Progress events emitted while an operation is polled
#[derive(Debug, Clone)]
pub enum LroEvent {
    /// The triggering request was accepted
    Started { operation_url: Option<String> },
    /// A status check returned
    Polling {
        state: OperationState,
        elapsed: Duration,
        next_poll_in: Option<Duration>,
    },
    /// A status check failed transiently and will be repeated
    PollRetry { failures: u32, error: String },
    /// Operation reached Succeeded
    Completed { elapsed: Duration },
    /// Operation reached Failed or Canceled
    Failed { state: OperationState, error: String },
}

/// Callback type for progress updates
pub type LroCallback = Box<dyn Fn(LroEvent) + Send + Sync>;

/// Helper to emit progress events
pub(crate) fn emit(callback: &Option<LroCallback>, event: LroEvent) {
    if let Some(cb) = callback {
        cb(event);
    }
}
