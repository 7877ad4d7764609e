#![allow(clippy::doc_markdown)] // Allow technical terms like WIM, VHDX in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # ImageBatch Core
//!
//! Batch operation engine for offline OS image servicing.
//!
//! ## Overview
//!
//! A batch operation applies one per-image operation (template application,
//! debloat, driver injection, format conversion, ...) to a list of target
//! images. The engine fans the images out under a per-operation concurrency
//! bound, tracks per-image and aggregate progress, supports pause, resume,
//! cancel and retry-of-failures over jobs that run for hours, and persists
//! every state change so a crashed process can pick its operations back up.
//!
//! The image mutations themselves, the audit trail and notifications are
//! collaborators reached through traits; this crate never touches an image.
//!
//! ## Module Organization
//!
//! - [`models`] - Operation records, sub-tasks and creation requests
//! - [`state_machine`] - Operation and sub-task lifecycle transitions
//! - [`orchestration`] - Engine, fan-out driver, writer actor, concurrency control
//! - [`persistence`] - Whole-document operation stores (file and in-memory)
//! - [`query`] - Filtering, sorting and pagination of stored operations
//! - [`events`] - Audit sink and notification dispatch
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup and helpers
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imagebatch_core::config::ConfigManager;
//! use imagebatch_core::logging::init_structured_logging;
//! use imagebatch_core::models::{CreateOperationRequest, OperationType};
//! use imagebatch_core::orchestration::{
//!     BatchEngine, ExecutionContext, ExecutorError, ImageOperationExecutor, ShutdownMode,
//! };
//! use std::sync::Arc;
//!
//! struct Debloat;
//!
//! #[async_trait::async_trait]
//! impl ImageOperationExecutor for Debloat {
//!     async fn execute(&self, context: ExecutionContext) -> Result<(), ExecutorError> {
//!         context.progress.report(50.0).await;
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! init_structured_logging(&manager.config().logging);
//!
//! let engine = BatchEngine::builder(manager.config().clone())
//!     .with_executor(OperationType::Debloat, Arc::new(Debloat))
//!     .build()
//!     .await?;
//! engine.recover_interrupted_operations().await?;
//!
//! let record = engine
//!     .create(
//!         CreateOperationRequest::new("Debloat golden images", OperationType::Debloat, ["a.wim", "b.wim"])
//!             .start_immediately(),
//!     )
//!     .await?;
//! let finished = engine.wait_for_completion(record.id).await?;
//! println!("{}: {}% ({})", finished.name, finished.progress_percentage, finished.status);
//!
//! engine.shutdown(ShutdownMode::Drain).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod query;
pub mod state_machine;

pub use config::{ConfigManager, EngineConfig};
pub use error::{BatchError, BatchResult};
pub use models::{CreateOperationRequest, OperationId, OperationRecord, OperationType, SubTask};
pub use orchestration::{BatchEngine, ImageOperationExecutor, ShutdownMode};
pub use persistence::{FileOperationStore, InMemoryOperationStore, OperationStore};
pub use query::{OperationPage, OperationQuery};
pub use state_machine::{OperationStatus, SubTaskStatus};
