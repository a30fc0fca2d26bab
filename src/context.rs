//! Ambient current-thread / current-executor context.
//!
//! The driver pushes an entry around every drive step and pops it on the
//! way out, even when the step faults, so `current_thread` always reports
//! the innermost driver. Mutable executor access stays on
//! [`StepContext`](crate::frame::StepContext); this module only publishes
//! identity.

use std::cell::RefCell;
use std::marker::PhantomData;

use crate::coroutine::CoroThread;

struct ContextEntry {
    executor: u64,
    thread: CoroThread,
}

thread_local! {
    static CONTEXT: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// Scope guard returned by [`enter`]; popping happens on drop.
pub(crate) struct ContextScope {
    _not_send: PhantomData<*const ()>,
}

pub(crate) fn enter(executor: u64, thread: CoroThread) -> ContextScope {
    CONTEXT.with(|stack| stack.borrow_mut().push(ContextEntry { executor, thread }));
    ContextScope {
        _not_send: PhantomData,
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        CONTEXT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// The thread currently being driven on this OS thread, if any.
#[must_use]
pub fn current_thread() -> Option<CoroThread> {
    CONTEXT.with(|stack| stack.borrow().last().map(|entry| entry.thread.clone()))
}

/// Identity of the executor currently driving, if any.
#[must_use]
pub fn current_executor_id() -> Option<u64> {
    CONTEXT.with(|stack| stack.borrow().last().map(|entry| entry.executor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_outside_any_drive() {
        assert!(current_thread().is_none());
        assert!(current_executor_id().is_none());
    }

    #[test]
    fn scopes_nest_and_unwind() {
        let outer = CoroThread::restore(1, Vec::new(), None);
        let inner = CoroThread::restore(2, Vec::new(), None);

        let outer_scope = enter(10, outer);
        assert_eq!(current_thread().map(|t| t.id()), Some(1));
        {
            let _inner_scope = enter(11, inner);
            assert_eq!(current_thread().map(|t| t.id()), Some(2));
            assert_eq!(current_executor_id(), Some(11));
        }
        assert_eq!(current_thread().map(|t| t.id()), Some(1));
        assert_eq!(current_executor_id(), Some(10));
        drop(outer_scope);
        assert!(current_thread().is_none());
    }
}
