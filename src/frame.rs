//! The resumable-frame contract and the context a driver hands to it.

use std::any::Any;
use std::time::Duration;

use crate::action::Step;
use crate::coroutine::{CoroThread, Fault};
use crate::executor::Executor;
use crate::Value;

/// One suspended generator on a thread's stack.
///
/// A frame is a state machine: an `i32` state field is its program
/// counter, hoisted locals are ordinary fields. Between resumes it is in
/// exactly one of three conditions: not started (state at its initial
/// sentinel), suspended at a yield point, or completed.
///
/// The `as_any` accessors expose the concrete value to a registered
/// [`GeneratorDescriptor`](crate::registry::GeneratorDescriptor) so its
/// resumable state can be externalized without the runtime knowing the
/// layout.
pub trait Frame: 'static {
    /// Advance one step, either suspending with a directive or completing.
    ///
    /// # Errors
    ///
    /// A body error faults the owning thread and surfaces from the
    /// executor's tick.
    fn resume(&mut self, cx: &mut StepContext<'_>) -> Result<Step, Fault>;

    /// Release hook, run when the frame is popped or its thread disposed.
    fn close(&mut self) {}

    /// The concrete frame, for descriptor introspection.
    fn as_any(&self) -> &dyn Any;

    /// The concrete frame, mutably, for descriptor rehydration.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl std::fmt::Debug for dyn Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Frame")
    }
}

/// Per-step view of the driving executor and thread.
///
/// Passed explicitly to [`Frame::resume`]; the innermost driver is also
/// published through the scoped stack in [`crate::context`]. A detached
/// context drives a frame outside any executor, with no time source and
/// no result channel.
pub struct StepContext<'a> {
    executor: Option<&'a mut Executor>,
    thread: Option<CoroThread>,
}

impl<'a> StepContext<'a> {
    pub(crate) fn driven(executor: &'a mut Executor, thread: CoroThread) -> Self {
        Self {
            executor: Some(executor),
            thread: Some(thread),
        }
    }

    /// A context with no driving executor, for stepping frames directly.
    #[must_use]
    pub fn detached() -> StepContext<'static> {
        StepContext {
            executor: None,
            thread: None,
        }
    }

    /// Simulated time of the driving executor, or zero when detached.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.executor.as_deref().map_or(Duration::ZERO, Executor::time)
    }

    /// Elapsed time of the current tick, or zero when detached.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.executor
            .as_deref()
            .map_or(Duration::ZERO, Executor::elapsed)
    }

    /// The thread being driven, if any.
    #[must_use]
    pub fn thread(&self) -> Option<&CoroThread> {
        self.thread.as_ref()
    }

    /// The driving executor, if any.
    #[must_use]
    pub fn executor(&self) -> Option<&Executor> {
        self.executor.as_deref()
    }

    /// The driving executor, mutably, if any.
    pub fn executor_mut(&mut self) -> Option<&mut Executor> {
        self.executor.as_deref_mut()
    }

    /// The transient result left by the frame that popped immediately
    /// before this step, if one was produced.
    #[must_use]
    pub fn result(&self) -> Option<Value> {
        self.thread.as_ref().and_then(CoroThread::result_value)
    }
}
