//! Cooperative coroutine runtime with live-state snapshots.
//!
//! This crate provides a single-threaded executor for logical coroutine
//! threads, each a stack of suspended frames, plus an engine that can
//! externalize a still-suspended frame into a neutral record and later
//! rebuild a resumable frame from it.
//!
//! # Architecture
//!
//! - **Actions** ([`action::CoroutineAction`]): directives a frame yields
//!   to its driver (pass, nest, delay, parallel join, result)
//! - **Frames** ([`frame::Frame`]): hand-written resumable state machines,
//!   one per generator method
//! - **Threads** ([`coroutine::CoroThread`]): logical coroutines, a LIFO
//!   stack of frames with status and a transient result slot
//! - **Executor** ([`executor::Executor`]): the tick-driven driver that
//!   owns threads and advances simulated time
//! - **Registry** ([`registry::GeneratorRegistry`]): catalog of descriptors
//!   mediating between live frames and their records
//! - **Snapshots** ([`snapshot::SnapshotEngine`]): capture and rehydrate
//!   frames, threads, and whole executors
//!
//! # Usage
//!
//! ```ignore
//! use std::time::Duration;
//! use torpor::{Executor, SnapshotEngine, GeneratorRegistry};
//!
//! let mut executor = Executor::new();
//! let thread = executor.start(executor.delay(Duration::from_secs(1)))?;
//! executor.tick(Duration::from_millis(550))?;
//!
//! let registry = GeneratorRegistry::new();
//! let engine = SnapshotEngine::new(&registry);
//! let record = engine.capture_executor(&executor)?;
//! let mut revived = engine.rehydrate_executor(&record)?;
//! ```

pub mod action;
pub mod builtin;
pub mod context;
pub mod coroutine;
pub mod executor;
pub mod frame;
pub mod identity;
pub mod registry;
pub mod snapshot;
pub mod trace;

/// Opaque captured payload. Round-trips under whatever serializer the
/// caller pairs with the snapshot records.
pub type Value = serde_json::Value;

pub use action::{CoroutineAction, Step};
pub use builtin::{DelayFrame, ParallelFrame};
pub use context::{current_executor_id, current_thread};
pub use coroutine::{CoroThread, Fault, ThreadStatus};
pub use executor::{Executor, ExecutorConfig, RuntimeError};
pub use frame::{Frame, StepContext};
pub use identity::MethodId;
pub use registry::{DescriptorBuilder, GeneratorDescriptor, GeneratorRegistry, RegistryError};
pub use snapshot::{ExecutorSnapshot, FrameSnapshot, SnapshotEngine, SnapshotError, ThreadSnapshot};
pub use trace::TraceEvent;
