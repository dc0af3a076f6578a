//! # docshelf-ingest
//!
//! Ingestion pipeline for the docshelf PDF library.
//!
//! This crate provides:
//! - Staging of path and byte inputs with duplicate detection
//! - A process-backed extractor and an in-process `pdftotext` extractor
//! - Per-document transactional commits through [`IngestStore`]
//! - Lifecycle notifications on the shared [`EventBus`]
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use docshelf_ingest::{FileInput, IngestPipeline, ProcessExtractor, StagingArea};
//!
//! let pipeline = IngestPipeline::new(
//!     Arc::new(ProcessExtractor::new(Default::default())),
//!     Arc::new(EventBus::default()),
//!     StagingArea::default(),
//! );
//! let report = pipeline
//!     .ingest(&store, vec![FileInput::Path("report.pdf".into())])
//!     .await?;
//! ```

pub mod chunker;
pub mod committer;
pub mod extractor;
pub mod pdf_text;
pub mod pipeline;
pub mod staging;

#[cfg(test)]
pub(crate) mod testing;

// Re-export core types
pub use docshelf_core::*;

pub use chunker::{ChunkerConfig, TextChunker};
pub use committer::{build_document, commit_batch, decode_image_payload};
pub use extractor::{parse_output, ProcessExtractor, ProcessExtractorConfig};
pub use pdf_text::PdfTextExtractor;
pub use pipeline::{IngestPipeline, IngestReport};
pub use staging::{StagedBatch, StagedFile, StagingArea, StagingWarning};
