//! # docshelf-core
//!
//! Core types, traits, and the event bus for the docshelf PDF library.
//!
//! This crate provides the data structures and trait definitions that the
//! store, ingestion and API crates depend on.
//!
//! ## Log Level Contract
//!
//! Every crate logs with `tracing` and the structured fields `subsystem`,
//! `component` and `op`, plus `document_id`, `batch_id` and `duration_ms`
//! where they apply.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, skipped file, failed document |
//! | INFO  | Lifecycle events (startup, connect), batch completions |
//! | DEBUG | Decision points, extractor stderr, config choices |
//! | TRACE | Per-fragment iteration |

pub mod defaults;
pub mod error;
pub mod events;
pub mod file_safety;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{EventBus, EventEnvelope, EventKind, ServerEvent, SubscriptionToken};
pub use file_safety::{is_pdf, sanitize_filename};
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
