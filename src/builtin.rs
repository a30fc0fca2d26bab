//! Built-in frames the driver composes with: timed delay and parallel join.

use std::any::Any;
use std::time::Duration;

use crate::action::{CoroutineAction, Step};
use crate::coroutine::{CoroThread, Fault, ThreadStatus};
use crate::frame::{Frame, StepContext};
use crate::identity::MethodId;
use crate::registry::{DescriptorBuilder, GeneratorDescriptor};
use crate::snapshot::SnapshotError;

/// Scope under which built-in descriptors are registered.
pub const BUILTIN_SCOPE: &str = "torpor";

/// Frame that suspends until simulated time exceeds its deadline.
///
/// The deadline is captured lazily: `end = time + duration` at the first
/// resume, and the frame stays pending while `time < end` (strict
/// comparison). A zero duration completes on the first resume.
pub struct DelayFrame {
    duration: Duration,
    end: Option<Duration>,
}

impl DelayFrame {
    /// A delay for the given simulated duration.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            end: None,
        }
    }

    /// A delay for fractional seconds.
    ///
    /// # Panics
    ///
    /// If `secs` is negative or not finite (inherited from
    /// [`Duration::from_secs_f64`]).
    #[must_use]
    pub fn from_secs(secs: f64) -> Self {
        Self::new(Duration::from_secs_f64(secs))
    }

    pub(crate) fn descriptor() -> GeneratorDescriptor {
        DescriptorBuilder::<Self>::new(MethodId::new(BUILTIN_SCOPE, "delay"))
            .factory(|| Self::new(Duration::ZERO))
            .state(
                |frame| i32::from(frame.end.is_some()),
                |_frame, _state| {},
            )
            .local("duration", |frame| frame.duration, |frame, d| {
                frame.duration = d;
            })
            .local("end", |frame| frame.end, |frame, end| frame.end = end)
            .build()
            .expect("delay descriptor is complete")
    }
}

impl Frame for DelayFrame {
    fn resume(&mut self, cx: &mut StepContext<'_>) -> Result<Step, Fault> {
        let now = cx.time();
        let end = *self.end.get_or_insert(now + self.duration);
        if now < end {
            Ok(Step::Yield(CoroutineAction::Pass))
        } else {
            Ok(Step::Complete)
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

enum ChildSlot {
    /// Handle to a sibling thread on the driving executor.
    Live(CoroThread),
    /// Captured thread id, not yet re-bound after rehydration.
    Detached(u64),
    /// Resolved: the thread already left the executor, so it finished.
    Finished(u64),
}

/// Join frame over sibling threads.
///
/// On its first resume the pending frames are started as top-level
/// threads on the driving executor; thereafter the frame polls them.
/// The first faulted child's fault becomes this frame's own fault,
/// surfacing to the composing caller; surviving children are NOT
/// disposed (the join is not an owning scope). The frame completes when
/// every child has finished.
pub struct ParallelFrame {
    pending: Vec<Box<dyn Frame>>,
    children: Vec<ChildSlot>,
}

impl ParallelFrame {
    /// A join over the given frames. Any non-empty set is accepted; the
    /// executor rejects an empty one.
    #[must_use]
    pub fn new(frames: Vec<Box<dyn Frame>>) -> Self {
        Self {
            pending: frames,
            children: Vec::new(),
        }
    }

    fn child_ids(&self) -> Vec<u64> {
        self.children
            .iter()
            .map(|slot| match slot {
                ChildSlot::Live(thread) => thread.id(),
                ChildSlot::Detached(id) | ChildSlot::Finished(id) => *id,
            })
            .collect()
    }

    pub(crate) fn descriptor() -> GeneratorDescriptor {
        DescriptorBuilder::<Self>::new(MethodId::new(BUILTIN_SCOPE, "parallel"))
            .factory(|| Self::new(Vec::new()))
            .state(
                |frame| i32::try_from(frame.children.len()).unwrap_or(i32::MAX),
                |_frame, _state| {},
            )
            .local_raw(
                "children",
                |frame| {
                    if !frame.pending.is_empty() {
                        return Err(SnapshotError::IllegalState {
                            what: "parallel frame has not started its children yet".to_string(),
                        });
                    }
                    Ok(serde_json::to_value(frame.child_ids())?)
                },
                |frame, value| {
                    let ids: Vec<u64> = serde_json::from_value(value)?;
                    frame.children = ids.into_iter().map(ChildSlot::Detached).collect();
                    Ok(())
                },
            )
            .build()
            .expect("parallel descriptor is complete")
    }
}

impl Frame for ParallelFrame {
    fn resume(&mut self, cx: &mut StepContext<'_>) -> Result<Step, Fault> {
        if !self.pending.is_empty() {
            let Some(executor) = cx.executor_mut() else {
                return Err(Fault::Protocol {
                    message: "parallel join requires a driving executor".to_string(),
                });
            };
            for frame in self.pending.drain(..) {
                let thread = executor.start(frame).map_err(|err| Fault::Protocol {
                    message: format!("parallel child failed to start: {err}"),
                })?;
                self.children.push(ChildSlot::Live(thread));
            }
        }

        // Re-bind captured ids; an id the executor no longer knows belongs
        // to a thread that finished and left before capture.
        for slot in &mut self.children {
            if let ChildSlot::Detached(id) = slot {
                *slot = match cx.executor().and_then(|e| e.find_thread(*id)) {
                    Some(thread) => ChildSlot::Live(thread),
                    None => ChildSlot::Finished(*id),
                };
            }
        }

        let mut waiting = false;
        for slot in &self.children {
            let ChildSlot::Live(thread) = slot else {
                continue;
            };
            match thread.status() {
                ThreadStatus::Faulted => {
                    return Err(thread.fault().unwrap_or_else(|| Fault::User {
                        message: format!("thread {} faulted", thread.id()),
                    }));
                }
                ThreadStatus::Finished => {}
                ThreadStatus::Yielded | ThreadStatus::Executing => waiting = true,
            }
        }

        if waiting {
            Ok(Step::Yield(CoroutineAction::Pass))
        } else {
            Ok(Step::Complete)
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn zero_delay_completes_on_first_resume() {
        let mut delay = DelayFrame::new(Duration::ZERO);
        let mut cx = StepContext::detached();
        assert_matches!(delay.resume(&mut cx), Ok(Step::Complete));
    }

    #[test]
    fn pending_delay_passes_until_deadline() {
        let mut delay = DelayFrame::from_secs(0.5);
        let mut cx = StepContext::detached();
        // Detached time never advances, so the deadline stays ahead.
        assert_matches!(
            delay.resume(&mut cx),
            Ok(Step::Yield(CoroutineAction::Pass))
        );
        assert_eq!(delay.end, Some(Duration::from_millis(500)));
    }

    #[test]
    fn detached_parallel_faults() {
        let mut join = ParallelFrame::new(vec![Box::new(DelayFrame::new(Duration::ZERO))]);
        let mut cx = StepContext::detached();
        assert_matches!(join.resume(&mut cx), Err(Fault::Protocol { .. }));
    }
}
