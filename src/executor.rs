//! The executor: owns threads, advances time, dispatches yielded actions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::action::{CoroutineAction, Step};
use crate::builtin::{DelayFrame, ParallelFrame};
use crate::context;
use crate::coroutine::{CoroThread, Fault};
use crate::frame::{Frame, StepContext};
use crate::trace::TraceEvent;

static NEXT_EXECUTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Errors surfaced at the executor API boundary.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Out-of-range input.
    #[error("invalid argument: {what}")]
    InvalidArgument {
        /// What was wrong.
        what: String,
    },
    /// The operation is not legal in the current state.
    #[error("invalid state: {what}")]
    InvalidState {
        /// What was violated.
        what: String,
    },
    /// Thread limit exceeded.
    #[error("max threads ({max}) exceeded")]
    TooManyThreads {
        /// Configured maximum.
        max: usize,
    },
    /// A thread faulted during a tick.
    #[error("thread {thread} faulted: {fault}")]
    Fault {
        /// The faulted thread's id.
        thread: u64,
        /// The fault it terminated with.
        fault: Fault,
    },
}

/// Executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of live threads.
    pub max_threads: usize,
    /// Whether to record [`TraceEvent`]s.
    pub trace_enabled: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_threads: 1024,
            trace_enabled: true,
        }
    }
}

/// Single-threaded cooperative driver for coroutine threads.
///
/// Threads are ticked in insertion order; within a thread, frames are a
/// strict LIFO stack. Pushes and pops take effect synchronously within
/// the tick; only `Pass` and still-pending delays and joins defer to the
/// next one. Time only moves when the caller ticks.
#[derive(Debug)]
pub struct Executor {
    id: u64,
    config: ExecutorConfig,
    threads: Vec<CoroThread>,
    time: Duration,
    elapsed: Duration,
    round: u64,
    executing: bool,
    next_thread_id: u64,
    trace: Vec<TraceEvent>,
}

impl Executor {
    /// An executor with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    /// An executor with the given configuration.
    #[must_use]
    pub fn with_config(config: ExecutorConfig) -> Self {
        Self {
            id: NEXT_EXECUTOR_ID.fetch_add(1, Ordering::Relaxed),
            config,
            threads: Vec::new(),
            time: Duration::ZERO,
            elapsed: Duration::ZERO,
            round: 0,
            executing: false,
            next_thread_id: 1,
            trace: Vec::new(),
        }
    }

    /// Process-unique executor identity, reported by the ambient context.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Accumulated simulated time. Monotone non-decreasing.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.time
    }

    /// Elapsed time of the current or most recent tick.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Tick counter.
    #[must_use]
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Whether a tick is in progress.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.executing
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Threads currently owned, insertion order. Terminal threads linger
    /// here only until the next tick boundary.
    #[must_use]
    pub fn threads(&self) -> &[CoroThread] {
        &self.threads
    }

    /// Number of threads not yet finished or faulted.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.threads.iter().filter(|t| !t.is_terminal()).count()
    }

    /// Look up a live thread by id.
    #[must_use]
    pub fn find_thread(&self, id: u64) -> Option<CoroThread> {
        self.threads
            .iter()
            .find(|thread| thread.id() == id)
            .cloned()
    }

    /// Recorded trace events.
    #[must_use]
    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    /// Start a new thread rooted at `frame`.
    ///
    /// A thread started from inside a generator body joins the current
    /// tick: the tick loop indexes the growing thread list.
    ///
    /// # Errors
    ///
    /// `TooManyThreads` when the configured limit is reached.
    pub fn start(&mut self, frame: Box<dyn Frame>) -> Result<CoroThread, RuntimeError> {
        if self.alive_count() >= self.config.max_threads {
            return Err(RuntimeError::TooManyThreads {
                max: self.config.max_threads,
            });
        }
        let id = self.next_thread_id;
        self.next_thread_id += 1;
        let thread = CoroThread::new(id, frame);
        self.record(TraceEvent::Started {
            round: self.round,
            thread: id,
        });
        tracing::debug!(thread = id, executor = self.id, "thread started");
        self.threads.push(thread.clone());
        Ok(thread)
    }

    /// A frame that suspends for the given simulated duration.
    #[must_use]
    pub fn delay(&self, duration: Duration) -> Box<dyn Frame> {
        Box::new(DelayFrame::new(duration))
    }

    /// A frame that joins over the given frames run as sibling threads.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty set.
    pub fn parallel(&self, frames: Vec<Box<dyn Frame>>) -> Result<Box<dyn Frame>, RuntimeError> {
        if frames.is_empty() {
            return Err(RuntimeError::InvalidArgument {
                what: "parallel requires at least one frame".to_string(),
            });
        }
        Ok(Box::new(ParallelFrame::new(frames)))
    }

    /// Advance time by `elapsed` and drive every live thread until it
    /// yields, finishes, or faults. Returns the live-thread count.
    ///
    /// `tick(Duration::ZERO)` is legal: no time passes but ready threads
    /// still advance.
    ///
    /// # Errors
    ///
    /// `InvalidState` on reentrant ticking; `Fault` when a thread faults
    /// (the remaining threads keep their state and the executor stays
    /// usable).
    pub fn tick(&mut self, elapsed: Duration) -> Result<usize, RuntimeError> {
        if self.executing {
            return Err(RuntimeError::InvalidState {
                what: "tick is already in progress".to_string(),
            });
        }
        self.executing = true;
        self.round += 1;
        self.time += elapsed;
        self.elapsed = elapsed;
        tracing::trace!(
            executor = self.id,
            round = self.round,
            time_ms = self.time.as_millis() as u64,
            "tick"
        );

        let outcome = self.drive_all();

        self.executing = false;
        for thread in &self.threads {
            thread.clear_result();
        }
        self.threads.retain(|thread| !thread.is_terminal());
        outcome.map(|()| self.threads.len())
    }

    /// Drive ticks from a wall-clock source, elapsed scaled by `factor`,
    /// until no live threads remain.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless `factor` is finite and positive; any
    /// error a tick surfaces.
    pub fn finish(&mut self, factor: f64) -> Result<(), RuntimeError> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(RuntimeError::InvalidArgument {
                what: format!("finish factor must be positive, got {factor}"),
            });
        }
        let mut last = Instant::now();
        loop {
            let now = Instant::now();
            let elapsed = (now - last).mul_f64(factor);
            last = now;
            if self.tick(elapsed)? == 0 {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Dispose remaining threads in reverse insertion order. Also runs on
    /// drop.
    pub fn dispose(&mut self) {
        for thread in std::mem::take(&mut self.threads).into_iter().rev() {
            if thread.is_terminal() {
                continue;
            }
            thread.dispose(None);
            self.record(TraceEvent::Disposed {
                round: self.round,
                thread: thread.id(),
            });
        }
    }

    pub(crate) fn restore_time(&mut self, time: Duration) {
        self.time = time;
    }

    pub(crate) fn restore_thread(&mut self, thread: CoroThread) {
        self.next_thread_id = self.next_thread_id.max(thread.id() + 1);
        self.threads.push(thread);
    }

    fn record(&mut self, event: TraceEvent) {
        if self.config.trace_enabled {
            self.trace.push(event);
        }
    }

    fn drive_all(&mut self) -> Result<(), RuntimeError> {
        let mut index = 0;
        while index < self.threads.len() {
            let thread = self.threads[index].clone();
            index += 1;
            if thread.is_terminal() {
                continue;
            }
            thread.set_elapsed(self.elapsed);
            self.drive(&thread)?;
        }
        Ok(())
    }

    /// Advance one thread until it yields or terminates.
    fn drive(&mut self, thread: &CoroThread) -> Result<(), RuntimeError> {
        let _scope = context::enter(self.id, thread.clone());
        loop {
            let Some(mut frame) = thread.begin_step() else {
                // Stack exhausted without a completing step; nothing to run.
                return Ok(());
            };

            let outcome = {
                let mut cx = StepContext::driven(self, thread.clone());
                frame.resume(&mut cx)
            };
            thread.end_step();

            match outcome {
                Err(fault) => {
                    frame.close();
                    return Err(self.fault_thread(thread, fault));
                }
                Ok(Step::Complete) => {
                    frame.close();
                    if thread.is_terminal() {
                        return Ok(());
                    }
                    if thread.frame_count() == 0 {
                        self.finish_thread(thread);
                        return Ok(());
                    }
                }
                Ok(Step::Yield(action)) => {
                    if thread.is_terminal() {
                        // The body disposed its own thread mid-step.
                        frame.close();
                        return Ok(());
                    }
                    match action {
                        CoroutineAction::Pass => {
                            thread.push_frame(frame);
                            return Ok(());
                        }
                        CoroutineAction::Nested(inner) => {
                            thread.push_frame(frame);
                            thread.push_frame(inner);
                        }
                        CoroutineAction::Delay(duration) => {
                            thread.push_frame(frame);
                            thread.push_frame(Box::new(DelayFrame::new(duration)));
                        }
                        CoroutineAction::Parallel(frames) => {
                            if frames.is_empty() {
                                frame.close();
                                let fault = Fault::Protocol {
                                    message: "parallel requires at least one frame".to_string(),
                                };
                                return Err(self.fault_thread(thread, fault));
                            }
                            thread.push_frame(frame);
                            thread.push_frame(Box::new(ParallelFrame::new(frames)));
                        }
                        CoroutineAction::Result(value) => {
                            frame.close();
                            thread.set_result(value);
                            if thread.frame_count() == 0 {
                                self.finish_thread(thread);
                                return Ok(());
                            }
                        }
                        CoroutineAction::Value(value) => {
                            frame.close();
                            let fault = Fault::Protocol {
                                message: format!("unrecognized yield: {value}"),
                            };
                            return Err(self.fault_thread(thread, fault));
                        }
                    }
                }
            }
        }
    }

    fn finish_thread(&mut self, thread: &CoroThread) {
        thread.dispose(None);
        self.record(TraceEvent::Finished {
            round: self.round,
            thread: thread.id(),
        });
        tracing::debug!(thread = thread.id(), executor = self.id, "thread finished");
    }

    fn fault_thread(&mut self, thread: &CoroThread, fault: Fault) -> RuntimeError {
        thread.dispose(Some(fault.clone()));
        self.record(TraceEvent::Faulted {
            round: self.round,
            thread: thread.id(),
            fault: fault.clone(),
        });
        tracing::debug!(thread = thread.id(), executor = self.id, %fault, "thread faulted");
        RuntimeError::Fault {
            thread: thread.id(),
            fault,
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.dispose();
    }
}
