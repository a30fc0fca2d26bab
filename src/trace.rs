//! Observable event trace emitted by the executor.

use serde::{Deserialize, Serialize};

use crate::coroutine::Fault;

/// Observable event emitted by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// A thread was started.
    Started {
        /// Tick counter when the event occurred.
        round: u64,
        /// Thread id.
        thread: u64,
    },
    /// A thread ran to completion.
    Finished {
        /// Tick counter when the event occurred.
        round: u64,
        /// Thread id.
        thread: u64,
    },
    /// A thread faulted.
    Faulted {
        /// Tick counter when the event occurred.
        round: u64,
        /// Thread id.
        thread: u64,
        /// The fault.
        fault: Fault,
    },
    /// A thread was disposed by executor teardown.
    Disposed {
        /// Tick counter when the event occurred.
        round: u64,
        /// Thread id.
        thread: u64,
    },
}
