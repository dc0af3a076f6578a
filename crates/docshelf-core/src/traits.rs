//! Core traits for docshelf abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// DOCUMENT REPOSITORY TRAITS
// =============================================================================

/// Store operations the ingestion pipeline depends on.
#[async_trait]
pub trait IngestStore: Send + Sync {
    /// Whether a document with exactly this name is already stored.
    async fn name_exists(&self, name: &str) -> Result<bool>;

    /// Persist a document with its raw payload and fragments in one
    /// transaction. Nothing is written when any step fails.
    async fn commit_document(&self, doc: NewDocument) -> Result<Uuid>;
}

/// Repository for document queries and updates.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// All documents joined with their folder name, newest first.
    async fn list(&self) -> Result<Vec<Document>>;

    async fn get(&self, id: Uuid) -> Result<Option<Document>>;

    /// Delete one document with its raw payload and fragments.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Delete several documents; returns how many existed.
    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64>;

    /// Move a document into the named folder, or to root with `None`.
    async fn move_to_folder(&self, id: Uuid, folder_name: Option<&str>) -> Result<()>;

    /// Move several documents; returns how many were updated.
    async fn move_many(&self, ids: &[Uuid], folder_name: Option<&str>) -> Result<u64>;

    /// Replace a document's tag list.
    async fn set_tags(&self, id: Uuid, tags: &[String]) -> Result<()>;

    /// File name, ordered text fragments and image views.
    async fn content(&self, id: Uuid) -> Result<DocumentContent>;

    /// Original bytes as uploaded.
    async fn raw_file(&self, id: Uuid) -> Result<RawFile>;
}

/// Repository for folder management.
#[async_trait]
pub trait FolderRepository: Send + Sync {
    /// All folders with document counts, newest first.
    async fn list(&self) -> Result<Vec<Folder>>;

    /// Create a folder. Returns `None` when the name is already taken.
    async fn create(&self, name: &str, color: FolderColor) -> Result<Option<Folder>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Folder>>;

    /// Move member documents to root, then remove the folder.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Repository for individual fragment edits.
#[async_trait]
pub trait FragmentRepository: Send + Sync {
    async fn update_text(&self, id: Uuid, content: &str) -> Result<()>;

    async fn delete_text(&self, id: Uuid) -> Result<()>;

    async fn delete_image(&self, id: Uuid) -> Result<()>;
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Status string the collaborator uses for a successfully processed file.
pub const EXTRACTION_SUCCESS: &str = "success";

/// Per-file outcome reported by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    /// Base name of the staged file that was processed.
    #[serde(rename = "baseName")]
    pub base_name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FileSummary {
    pub fn is_success(&self) -> bool {
        self.status == EXTRACTION_SUCCESS
    }
}

/// A text chunk tagged with the stem of the file it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub source: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

/// An image chunk tagged with the stem of the file it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageChunk {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub data_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

impl ImageChunk {
    /// Identifier suggested by the extractor, if any.
    pub fn suggested_label(&self) -> Option<&str> {
        self.image_id.as_deref().or(self.filename.as_deref())
    }

    pub fn has_payload(&self) -> bool {
        self.data_base64
            .as_deref()
            .is_some_and(|data| !data.trim().is_empty())
    }
}

/// Combined result of one extraction run over a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    #[serde(default)]
    pub summary: Vec<FileSummary>,
    #[serde(default)]
    pub text_chunks: Vec<TextChunk>,
    #[serde(default)]
    pub image_chunks: Vec<ImageChunk>,
}

impl ExtractionOutput {
    /// True when `base_name` is listed with status `success`.
    ///
    /// Files missing from the summary count as failed.
    pub fn succeeded(&self, base_name: &str) -> bool {
        self.summary
            .iter()
            .any(|s| s.base_name == base_name && s.is_success())
    }

    /// Failure message reported for `base_name`, if any.
    pub fn failure_message(&self, base_name: &str) -> Option<&str> {
        self.summary
            .iter()
            .find(|s| s.base_name == base_name)
            .and_then(|s| s.message.as_deref())
    }

    /// Text chunks for one source stem, in returned order.
    pub fn text_for<'a>(&'a self, stem: &'a str) -> impl Iterator<Item = &'a TextChunk> + 'a {
        self.text_chunks.iter().filter(move |c| c.source == stem)
    }

    /// Image chunks for one source stem, in returned order.
    pub fn images_for<'a>(&'a self, stem: &'a str) -> impl Iterator<Item = &'a ImageChunk> + 'a {
        self.image_chunks.iter().filter(move |c| c.source == stem)
    }
}

/// Extracts text and images from a batch of files.
///
/// One call covers the whole batch. `inputs` and `stems` have equal length
/// and matching order. An `Err` fails every file in the batch; per-file
/// failures are reported through [`ExtractionOutput::summary`].
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn run(
        &self,
        inputs: &[PathBuf],
        stems: &[String],
        out_dir: &Path,
    ) -> Result<ExtractionOutput>;

    /// Check if the extractor's external dependencies are available.
    async fn health_check(&self) -> Result<bool>;

    /// Human-readable name of this extractor.
    fn name(&self) -> &str;
}

/// Chooses where a document's bytes should be written.
///
/// `None` means the user canceled.
#[async_trait]
pub trait SaveLocationPicker: Send + Sync {
    async fn pick(&self, suggested_name: &str) -> Option<PathBuf>;
}
