//! # Lifecycle Events
//!
//! Outbound side channels of the engine: the audit sink and the notification
//! dispatcher. Both are best-effort. The engine bounds every call with a
//! timeout and only logs failures, so a broken sink can never fail a batch
//! operation.

pub mod audit;
pub mod notifications;
pub mod publisher;

pub use audit::{AuditEntry, AuditError, AuditSink, TracingAuditSink};
pub use notifications::{NotificationDispatcher, NotificationError, OperationNotification};
pub use publisher::EventPublisher;
