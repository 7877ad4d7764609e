//! # Orchestration
//!
//! The batch execution engine and its moving parts.
//!
//! ## Components
//!
//! - [`engine`]: public control surface, lifecycle locks, supervisor and recovery
//! - `driver`: per-operation fan-out task
//! - [`writer`]: single-writer actor owning an active operation's record
//! - [`concurrency`]: per-operation slot pool
//! - [`registry`]: table of active operations
//! - [`executor`]: per-image executor trait and registry
//! - [`aggregator`]: pure progress, summary and final-status derivation

pub mod aggregator;
pub mod concurrency;
pub(crate) mod driver;
pub mod engine;
pub mod executor;
pub mod registry;
pub mod writer;

pub use concurrency::{ConcurrencyController, ConcurrencySlot};
pub use engine::{BatchEngine, BatchEngineBuilder, ShutdownMode};
pub use executor::{
    ExecutionContext, ExecutorError, ExecutorRegistry, ImageOperationExecutor, ProgressReporter,
};
pub use registry::{ActiveOperation, ActiveRegistry};
pub use writer::{OperationWriter, OperationWriterHandle, SubTaskOutcome, WriterOptions};
