//! Directives a frame may yield to its driver.
//!
//! Yields are a tagged sum rather than runtime type checks: a frame that
//! wants to hand control to a nested producer wraps it in an explicit
//! variant, and anything the driver does not recognize is a protocol
//! fault instead of silent misbehavior.

use std::fmt;
use std::time::Duration;

use crate::frame::Frame;
use crate::Value;

/// Outcome of advancing a frame one step.
pub enum Step {
    /// The frame suspended at a yield point with a directive.
    Yield(CoroutineAction),
    /// The frame ran to completion.
    Complete,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yield(action) => f.debug_tuple("Yield").field(action).finish(),
            Self::Complete => f.write_str("Complete"),
        }
    }
}

/// Directive yielded by a frame body.
pub enum CoroutineAction {
    /// Yield to the next tick.
    Pass,
    /// Push the frame onto the current stack and keep driving this tick.
    Nested(Box<dyn Frame>),
    /// Suspend until simulated time exceeds now plus the given duration.
    Delay(Duration),
    /// Start each frame as a sibling thread, then wait for the join.
    Parallel(Vec<Box<dyn Frame>>),
    /// Set the thread's transient result slot and pop this frame.
    Result(Value),
    /// A raw yielded value. Meaningful to the snapshot engine as the
    /// frame's `current`; the executor faults the thread when it sees one.
    Value(Value),
}

impl CoroutineAction {
    /// Push `frame` as a nested frame. Ergonomic alias for [`Self::Nested`].
    #[must_use]
    pub fn execute(frame: impl Frame) -> Self {
        Self::Nested(Box::new(frame))
    }

    /// Suspend for `secs` seconds of simulated time.
    ///
    /// # Panics
    ///
    /// If `secs` is negative or not finite (inherited from
    /// [`Duration::from_secs_f64`]).
    #[must_use]
    pub fn delay_secs(secs: f64) -> Self {
        Self::Delay(Duration::from_secs_f64(secs))
    }
}

impl fmt::Debug for CoroutineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("Pass"),
            Self::Nested(_) => f.write_str("Nested(..)"),
            Self::Delay(duration) => f.debug_tuple("Delay").field(duration).finish(),
            Self::Parallel(frames) => write!(f, "Parallel({} frames)", frames.len()),
            Self::Result(value) => f.debug_tuple("Result").field(value).finish(),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, StepContext};
    use crate::coroutine::Fault;
    use std::any::Any;

    struct Noop;

    impl Frame for Noop {
        fn resume(&mut self, _cx: &mut StepContext<'_>) -> Result<Step, Fault> {
            Ok(Step::Complete)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn execute_is_a_nested_push() {
        assert!(matches!(
            CoroutineAction::execute(Noop),
            CoroutineAction::Nested(_)
        ));
    }

    #[test]
    fn delay_secs_converts_to_duration() {
        match CoroutineAction::delay_secs(1.5) {
            CoroutineAction::Delay(d) => assert_eq!(d, Duration::from_millis(1500)),
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
