//! Centralized default constants for docshelf.
//!
//! All crates reference these constants instead of defining their own magic
//! numbers. Runtime overrides come from environment variables read by the
//! API server's config layer.

// =============================================================================
// SERVER
// =============================================================================

/// Default listen address.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default listen port.
pub const SERVER_PORT: u16 = 3000;

/// Maximum accepted request body (uploads are whole PDFs).
pub const MAX_BODY_SIZE_BYTES: usize = 512 * 1024 * 1024;

/// Broadcast buffer for the event bus. Slow SSE clients past this many
/// pending events lose the oldest ones.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Interval between SSE keep-alive comments.
pub const SSE_KEEPALIVE_SECS: u64 = 15;

// =============================================================================
// DATABASE
// =============================================================================

/// Maximum pooled connections.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Minimum idle connections kept open.
pub const DB_MIN_CONNECTIONS: u32 = 1;

/// Seconds to wait when acquiring a connection.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Seconds before an idle connection is closed.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default Postgres port for field-wise connection settings.
pub const DB_PORT: u16 = 5432;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Interpreter used to launch the extraction script.
pub const EXTRACTOR_PROGRAM: &str = "python3";

/// Extraction script path, relative to the working directory.
pub const EXTRACTOR_SCRIPT: &str = "parser/scripts/uni_processor.py";

/// Upper bound for one batch extraction run. Large scanned PDFs are slow.
pub const EXTRACTOR_TIMEOUT_SECS: u64 = 600;

/// Timeout for short external commands (version checks, pdftotext per file).
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 60;

/// Prefix of the per-batch extractor output directory.
pub const OUTPUT_DIR_PREFIX: &str = "docshelf-out-";

/// Prefix of the per-batch staging directory.
pub const STAGING_DIR_PREFIX: &str = "docshelf-staging-";

// =============================================================================
// CHUNKING
// =============================================================================

/// Target characters per text fragment.
pub const CHUNK_SIZE: usize = 1024;

/// Fraction of a chunk carried over into the next one.
pub const CHUNK_OVERLAP_RATIO: f32 = 0.2;

/// Chunks shorter than this are dropped.
pub const CHUNK_MIN_CHARS: usize = 50;

/// Minimum share of alphanumeric characters for a chunk to be kept.
pub const CHUNK_MIN_MEANINGFUL_RATIO: f32 = 0.3;
