//! Logical coroutine threads: a stack of suspended frames plus status.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::executor::RuntimeError;
use crate::frame::Frame;
use crate::Value;

/// Thread execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadStatus {
    /// Suspended between ticks.
    Yielded,
    /// Inside a drive step. Never observed between ticks.
    Executing,
    /// Completed normally.
    Finished,
    /// Terminated with a fault.
    Faulted,
}

impl ThreadStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Faulted)
    }
}

/// Fault carried by a terminated thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fault {
    /// Error propagated out of a frame body.
    User {
        /// Error message from the body.
        message: String,
    },
    /// The frame yielded something the driver does not recognize.
    Protocol {
        /// Description of the offending yield.
        message: String,
    },
    /// The thread was disposed with an error.
    Canceled {
        /// Reason supplied at disposal.
        message: String,
    },
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User { message } => write!(f, "user fault: {message}"),
            Self::Protocol { message } => write!(f, "protocol fault: {message}"),
            Self::Canceled { message } => write!(f, "canceled: {message}"),
        }
    }
}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Self::User { message }
    }
}

impl From<&str> for Fault {
    fn from(message: &str) -> Self {
        Self::User {
            message: message.to_string(),
        }
    }
}

pub(crate) struct ThreadCore {
    id: u64,
    stack: Vec<Box<dyn Frame>>,
    status: ThreadStatus,
    fault: Option<Fault>,
    result: Option<Value>,
    elapsed: Duration,
    tag: Option<Value>,
}

/// Handle to a logical coroutine thread owned by one executor.
///
/// Handles are cheap clones of a shared core; the runtime is
/// single-threaded cooperative by contract, so the core is not `Send`.
#[derive(Clone)]
pub struct CoroThread {
    core: Rc<RefCell<ThreadCore>>,
}

impl CoroThread {
    pub(crate) fn new(id: u64, root: Box<dyn Frame>) -> Self {
        Self::restore(id, vec![root], None)
    }

    pub(crate) fn restore(id: u64, stack: Vec<Box<dyn Frame>>, tag: Option<Value>) -> Self {
        Self {
            core: Rc::new(RefCell::new(ThreadCore {
                id,
                stack,
                status: ThreadStatus::Yielded,
                fault: None,
                result: None,
                elapsed: Duration::ZERO,
                tag,
            })),
        }
    }

    /// Thread identifier, unique within its executor.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.core.borrow().id
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ThreadStatus {
        self.core.borrow().status
    }

    /// Whether this thread has finished or faulted.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// The fault that terminated this thread, if any.
    #[must_use]
    pub fn fault(&self) -> Option<Fault> {
        self.core.borrow().fault.clone()
    }

    /// Number of suspended frames on the stack.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.core.borrow().stack.len()
    }

    /// Elapsed time of the tick currently or most recently driving this
    /// thread.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.core.borrow().elapsed
    }

    /// Caller-attached tag.
    #[must_use]
    pub fn tag(&self) -> Option<Value> {
        self.core.borrow().tag.clone()
    }

    /// Attach or clear a caller tag.
    pub fn set_tag(&self, tag: Option<Value>) {
        self.core.borrow_mut().tag = tag;
    }

    /// The transient result slot, if populated.
    ///
    /// The slot is set by a `Result` yield on a popping frame, visible to
    /// exactly one subsequent step of the then-top frame, and cleared
    /// after that step and again when the tick exits.
    #[must_use]
    pub fn result_value(&self) -> Option<Value> {
        self.core.borrow().result.clone()
    }

    /// Decode the transient result slot.
    ///
    /// # Errors
    ///
    /// `InvalidState` when no result is pending; `InvalidArgument` when
    /// the pending value does not decode as `T`.
    pub fn result_as<T: DeserializeOwned>(&self) -> Result<T, RuntimeError> {
        let value = self
            .result_value()
            .ok_or_else(|| RuntimeError::InvalidState {
                what: "no result available".to_string(),
            })?;
        serde_json::from_value(value).map_err(|err| RuntimeError::InvalidArgument {
            what: format!("result does not decode: {err}"),
        })
    }

    /// Decode the transient result slot, or the default when absent or
    /// undecodable.
    #[must_use]
    pub fn result_or_default<T: DeserializeOwned + Default>(&self) -> T {
        self.result_as().unwrap_or_default()
    }

    /// Terminate this thread, draining its stack top-down and running each
    /// frame's close hook. Terminal status is `Faulted` iff a fault is
    /// given. Idempotent.
    pub fn dispose(&self, fault: Option<Fault>) {
        let drained: Vec<Box<dyn Frame>> = {
            let mut core = self.core.borrow_mut();
            if core.status.is_terminal() {
                return;
            }
            core.status = if fault.is_some() {
                ThreadStatus::Faulted
            } else {
                ThreadStatus::Finished
            };
            core.fault = fault;
            let mut frames = std::mem::take(&mut core.stack);
            frames.reverse();
            frames
        };
        for mut frame in drained {
            frame.close();
        }
    }

    /// Mark the thread executing and take its top frame.
    pub(crate) fn begin_step(&self) -> Option<Box<dyn Frame>> {
        let mut core = self.core.borrow_mut();
        core.status = ThreadStatus::Executing;
        let frame = core.stack.pop();
        if frame.is_none() {
            core.status = ThreadStatus::Finished;
        }
        frame
    }

    /// Return to `Yielded` (unless terminated mid-step) and clear the
    /// transient result.
    pub(crate) fn end_step(&self) {
        let mut core = self.core.borrow_mut();
        if core.status == ThreadStatus::Executing {
            core.status = ThreadStatus::Yielded;
        }
        core.result = None;
    }

    pub(crate) fn push_frame(&self, frame: Box<dyn Frame>) {
        self.core.borrow_mut().stack.push(frame);
    }

    pub(crate) fn set_result(&self, value: Value) {
        self.core.borrow_mut().result = Some(value);
    }

    pub(crate) fn clear_result(&self) {
        self.core.borrow_mut().result = None;
    }

    pub(crate) fn set_elapsed(&self, elapsed: Duration) {
        self.core.borrow_mut().elapsed = elapsed;
    }

    pub(crate) fn with_stack<R>(&self, f: impl FnOnce(&[Box<dyn Frame>]) -> R) -> R {
        let core = self.core.borrow();
        f(&core.stack)
    }
}

impl fmt::Debug for CoroThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.core.try_borrow() {
            Ok(core) => f
                .debug_struct("CoroThread")
                .field("id", &core.id)
                .field("status", &core.status)
                .field("frames", &core.stack.len())
                .finish(),
            Err(_) => f.write_str("CoroThread(<executing>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Step;
    use crate::frame::StepContext;
    use std::any::Any;

    struct Closeable {
        closed: Rc<RefCell<Vec<&'static str>>>,
        label: &'static str,
    }

    impl Frame for Closeable {
        fn resume(&mut self, _cx: &mut StepContext<'_>) -> Result<Step, Fault> {
            Ok(Step::Complete)
        }

        fn close(&mut self) {
            self.closed.borrow_mut().push(self.label);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn dispose_drains_top_down_and_is_idempotent() {
        let closed = Rc::new(RefCell::new(Vec::new()));
        let thread = CoroThread::restore(
            1,
            vec![
                Box::new(Closeable {
                    closed: closed.clone(),
                    label: "bottom",
                }),
                Box::new(Closeable {
                    closed: closed.clone(),
                    label: "top",
                }),
            ],
            None,
        );

        thread.dispose(Some(Fault::from("gone")));
        thread.dispose(None);

        assert_eq!(*closed.borrow(), vec!["top", "bottom"]);
        assert_eq!(thread.status(), ThreadStatus::Faulted);
        assert_eq!(thread.frame_count(), 0);
        assert_eq!(
            thread.fault(),
            Some(Fault::User {
                message: "gone".to_string()
            })
        );
    }

    #[test]
    fn result_slot_reads() {
        let thread = CoroThread::restore(1, Vec::new(), None);
        assert!(thread.result_as::<i64>().is_err());
        assert_eq!(thread.result_or_default::<i64>(), 0);

        thread.set_result(serde_json::json!(7));
        assert_eq!(thread.result_as::<i64>().unwrap(), 7);

        thread.clear_result();
        assert!(thread.result_value().is_none());
    }
}
