//! Neutral records for suspended state, and the engine that produces and
//! consumes them.
//!
//! A record is plain data: serde-serializable, wire-format neutral. The
//! engine converts between live frames and records through the registry;
//! it never inspects a frame's layout itself.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coroutine::CoroThread;
use crate::executor::Executor;
use crate::frame::Frame;
use crate::identity::MethodId;
use crate::registry::GeneratorRegistry;
use crate::Value;

/// Errors from snapshot capture and rehydration.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The record references an unregistered method id.
    #[error("no descriptor registered for {method}")]
    UnknownGenerator {
        /// The unresolvable identifier.
        method: MethodId,
    },
    /// A live frame's concrete type has no descriptor.
    #[error("no descriptor registered for frame type {type_name}")]
    UnknownType {
        /// Diagnostic label for the unregistered type.
        type_name: String,
    },
    /// A captured key is not declared by the descriptor (strict mode).
    #[error("descriptor {method} does not recognize key `{key}`")]
    SchemaMismatch {
        /// The descriptor's identifier.
        method: MethodId,
        /// The unrecognized argument or local name.
        key: String,
    },
    /// Capture or rehydration is not legal for the given state.
    #[error("snapshot unavailable: {what}")]
    IllegalState {
        /// Why the operation was rejected.
        what: String,
    },
    /// A field failed to encode or decode.
    #[error("value codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Resumable state of one suspended frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Registry key resolving the generator method.
    pub method: MethodId,
    /// Program-counter state number.
    pub state: i32,
    /// Last yielded value; excludable before handoff to a serializer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Value>,
    /// Capturing instance, if any; excludable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<Value>,
    /// Argument name to captured value.
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
    /// Hoisted-variable name to captured value.
    #[serde(default)]
    pub locals: BTreeMap<String, Value>,
}

/// One captured thread: its frame stack, bottom first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    /// Thread id, preserved so join frames re-bind their children.
    pub id: u64,
    /// Caller tag, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Value>,
    /// Frame records from stack bottom to top.
    pub frames: Vec<FrameSnapshot>,
}

/// A whole executor, captured between ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSnapshot {
    /// Accumulated simulated time.
    pub time: Duration,
    /// Live threads in insertion order.
    pub threads: Vec<ThreadSnapshot>,
}

/// Bidirectional converter between live state and snapshot records.
pub struct SnapshotEngine<'r> {
    registry: &'r GeneratorRegistry,
    strict: bool,
}

impl<'r> SnapshotEngine<'r> {
    /// An engine over the given registry, tolerant of unknown keys.
    #[must_use]
    pub fn new(registry: &'r GeneratorRegistry) -> Self {
        Self {
            registry,
            strict: false,
        }
    }

    /// Escalate unknown arg/local keys to [`SnapshotError::SchemaMismatch`]
    /// instead of dropping them.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Externalize a suspended frame.
    ///
    /// A frame that has never been advanced captures with
    /// `current = None`; capture is not rejected.
    ///
    /// # Errors
    ///
    /// `UnknownType` when the frame's type has no descriptor; codec
    /// errors when a field does not encode.
    pub fn capture(&self, frame: &dyn Frame) -> Result<FrameSnapshot, SnapshotError> {
        let descriptor = self.registry.lookup_frame(frame)?;
        descriptor.introspect(frame)
    }

    /// Rebuild a resumable frame from a record.
    ///
    /// # Errors
    ///
    /// `UnknownGenerator` when the method id is unbound; `SchemaMismatch`
    /// for unknown keys in strict mode; codec errors when a captured
    /// value does not decode.
    pub fn rehydrate(&self, snapshot: &FrameSnapshot) -> Result<Box<dyn Frame>, SnapshotError> {
        let descriptor = self.registry.lookup(&snapshot.method)?;
        descriptor.instantiate(snapshot, self.strict)
    }

    /// Externalize a thread's whole stack, bottom first.
    ///
    /// # Errors
    ///
    /// `IllegalState` for a terminal thread (its stack is gone); capture
    /// errors for any frame.
    pub fn capture_thread(&self, thread: &CoroThread) -> Result<ThreadSnapshot, SnapshotError> {
        if thread.is_terminal() {
            return Err(SnapshotError::IllegalState {
                what: format!("thread {} is terminal", thread.id()),
            });
        }
        let frames = thread.with_stack(|stack| {
            stack
                .iter()
                .map(|frame| self.capture(frame.as_ref()))
                .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(ThreadSnapshot {
            id: thread.id(),
            tag: thread.tag(),
            frames,
        })
    }

    /// Externalize a whole executor: its time and every live thread.
    ///
    /// # Errors
    ///
    /// `IllegalState` while a tick is in progress; capture errors for any
    /// frame.
    pub fn capture_executor(&self, executor: &Executor) -> Result<ExecutorSnapshot, SnapshotError> {
        if executor.is_executing() {
            return Err(SnapshotError::IllegalState {
                what: "executor is mid-tick; capture is only legal between ticks".to_string(),
            });
        }
        let threads = executor
            .threads()
            .iter()
            .filter(|thread| !thread.is_terminal())
            .map(|thread| self.capture_thread(thread))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ExecutorSnapshot {
            time: executor.time(),
            threads,
        })
    }

    /// Rebuild an executor from a record: time restored, each thread's
    /// stack rehydrated bottom-up under its captured id.
    ///
    /// # Errors
    ///
    /// `IllegalState` for a thread record with no frames; rehydration
    /// errors for any frame.
    pub fn rehydrate_executor(
        &self,
        snapshot: &ExecutorSnapshot,
    ) -> Result<Executor, SnapshotError> {
        let mut executor = Executor::new();
        executor.restore_time(snapshot.time);
        for thread_snapshot in &snapshot.threads {
            if thread_snapshot.frames.is_empty() {
                return Err(SnapshotError::IllegalState {
                    what: format!("thread {} record has no frames", thread_snapshot.id),
                });
            }
            let stack = thread_snapshot
                .frames
                .iter()
                .map(|frame| self.rehydrate(frame))
                .collect::<Result<Vec<_>, _>>()?;
            executor.restore_thread(CoroThread::restore(
                thread_snapshot.id,
                stack,
                thread_snapshot.tag.clone(),
            ));
        }
        Ok(executor)
    }
}
