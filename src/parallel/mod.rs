//! Parallel task dispatch
//!
//! This module runs a caller-supplied transformation over a batch of work
//! items, either on worker threads or serially in the calling thread, and
//! hands back one result per item in submission order.
//!
//! # Architecture Responsibilities
//!
//! ## What This Module Does:
//! - **Resource Discovery**: Detects available CPU cores using `num_cpus::get()` ([`Capabilities`])
//! - **Execution Strategy**: Chooses Sequential vs Parallel from explicit inputs ([`ExecutionStrategy`])
//! - **Worker Management**: Runs workers over `crossbeam` channels and joins them ([`WorkerPool`])
//! - **Shared Resources**: Lends one session lock to every task ([`TaskLock`])
//! - **Ordering**: Reassembles results by submission index ([`Dispatcher`])
//!
//! ## What This Module Does NOT Do:
//! - **Domain Logic**: Does not know what a task payload is or what the transformation does
//! - **Cancellation**: Callers cannot stop a session once it has started
//! - **Timeouts**: Transformations needing one must enforce it themselves
//!
//! # Session Flow
//! ```text
//! items ──▶ Task{index} ──▶ WorkerPool ──▶ TaskResult (completion order)
//!                             │  ▲                    │
//!                      TaskLock  transform            ▼
//!                                          sort by index ──▶ Vec<TaskResult>
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use bpc_utils::parallel::{Capabilities, DispatchOptions, Dispatcher, TaskContext};
//!
//! let options = DispatchOptions::new(Capabilities::detect()).jobs(Some(3));
//! let results = Dispatcher::new(options)
//!     .dispatch(["a", "b", "c"], |item: &str, _ctx: &TaskContext<'_>| {
//!         Ok(item.to_uppercase())
//!     })
//!     .unwrap();
//!
//! let values: Vec<_> = results.iter().map(|r| r.value().unwrap().as_str()).collect();
//! assert_eq!(values, ["A", "B", "C"]);
//! ```

pub mod core;
pub mod dispatcher;
pub mod lock;
pub mod pool;
pub mod task;

// Re-export main types for easier access
pub use self::core::{Capabilities, DispatchOptions, ExecutionStrategy};
pub use dispatcher::{DispatchState, Dispatcher, dispatch};
pub use lock::{TaskLock, TaskLockGuard};
pub use pool::WorkerPool;
pub use task::{Task, TaskContext, TaskFailure, TaskResult};
