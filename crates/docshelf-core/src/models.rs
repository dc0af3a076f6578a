//! Domain models for docshelf.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Error;

// =============================================================================
// DOCUMENT
// =============================================================================

/// Lifecycle status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Staged, waiting for extraction and persistence.
    Processing,
    /// Extracted and committed to the store.
    Ready,
    /// Extraction or persistence failed.
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(DocumentStatus::Processing),
            "ready" => Ok(DocumentStatus::Ready),
            "error" => Ok(DocumentStatus::Error),
            other => Err(Error::InvalidInput(format!(
                "unknown document status: {}",
                other
            ))),
        }
    }
}

/// A stored (or staged) PDF document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    /// Display name, unique among persisted documents.
    pub name: String,
    /// Size in bytes.
    pub size: i64,
    pub upload_date: DateTime<Utc>,
    pub status: DocumentStatus,
    pub folder_id: Option<Uuid>,
    pub folder_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether a row for this document exists in the store.
    #[serde(default)]
    pub persisted: bool,
}

impl Document {
    /// Build a freshly staged document in `processing` state.
    pub fn staged(id: Uuid, name: impl Into<String>, size: i64) -> Self {
        Self {
            id,
            name: name.into(),
            size,
            upload_date: Utc::now(),
            status: DocumentStatus::Processing,
            folder_id: None,
            folder_name: None,
            tags: Vec::new(),
            persisted: false,
        }
    }

    /// Copy of this document with a new status.
    pub fn with_status(&self, status: DocumentStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Name without its final extension (`report.v2.pdf` -> `report.v2`).
    ///
    /// Fragments returned by the extractor are attributed by this stem.
    pub fn stem(&self) -> String {
        name_stem(&self.name)
    }
}

/// File-name stem: everything before the last `.`, or the whole name when the
/// only dot is leading (`.hidden`).
pub fn name_stem(name: &str) -> String {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name[..pos].to_string(),
        _ => name.to_string(),
    }
}

// =============================================================================
// FOLDER
// =============================================================================

/// Fixed folder colour palette.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderColor {
    #[default]
    Blue,
    Green,
    Purple,
    Orange,
    Pink,
    Red,
}

impl FolderColor {
    pub const ALL: [FolderColor; 6] = [
        FolderColor::Blue,
        FolderColor::Green,
        FolderColor::Purple,
        FolderColor::Orange,
        FolderColor::Pink,
        FolderColor::Red,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FolderColor::Blue => "blue",
            FolderColor::Green => "green",
            FolderColor::Purple => "purple",
            FolderColor::Orange => "orange",
            FolderColor::Pink => "pink",
            FolderColor::Red => "red",
        }
    }
}

impl fmt::Display for FolderColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FolderColor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FolderColor::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown folder color: {}", s)))
    }
}

/// A named folder documents can be filed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: Uuid,
    pub name: String,
    pub color: FolderColor,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub document_count: i64,
}

/// Folders and documents loaded together for an initial view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibrarySnapshot {
    pub folders: Vec<Folder>,
    pub documents: Vec<Document>,
}

// =============================================================================
// FRAGMENTS
// =============================================================================

/// A chunk of extracted text belonging to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub metadata: JsonValue,
}

/// An extracted image belonging to a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFragment {
    pub id: Uuid,
    pub document_id: Uuid,
    pub image_index: i32,
    pub label: Option<String>,
    pub data: Vec<u8>,
}

impl ImageFragment {
    /// MIME type sniffed from magic bytes, `image/png` when unknown.
    pub fn mime_type(&self) -> &'static str {
        infer::get(&self.data)
            .filter(|t| t.matcher_type() == infer::MatcherType::Image)
            .map(|t| t.mime_type())
            .unwrap_or("image/png")
    }

    /// Embeddable `data:` URI for the image bytes.
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }

    pub fn to_view(&self) -> ImageView {
        ImageView {
            id: self.id,
            index: self.image_index,
            label: self.label.clone(),
            src: self.to_data_uri(),
        }
    }
}

/// Image fragment as handed to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageView {
    pub id: Uuid,
    pub index: i32,
    pub label: Option<String>,
    pub src: String,
}

/// Full viewable content of one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentContent {
    pub document_id: Uuid,
    pub file_name: String,
    /// Ordered by `chunk_index` ascending.
    pub text_fragments: Vec<TextFragment>,
    /// Ordered by `index` ascending.
    pub images: Vec<ImageView>,
}

/// Original file bytes of a document.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub file_name: String,
    pub data: Vec<u8>,
}

// =============================================================================
// INGESTION RECORDS
// =============================================================================

/// One incoming file in an ingestion batch.
#[derive(Debug, Clone)]
pub enum FileInput {
    /// A file already on disk (chosen in a file dialog).
    Path(PathBuf),
    /// File bytes handed over directly (drag and drop, upload).
    Bytes { name: String, data: Vec<u8> },
}

impl FileInput {
    pub fn bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        FileInput::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Display name derived from the input.
    pub fn display_name(&self) -> String {
        match self {
            FileInput::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            FileInput::Bytes { name, .. } => name.trim().to_string(),
        }
    }
}

/// Text fragment ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTextFragment {
    pub chunk_index: i32,
    pub content: String,
    pub metadata: JsonValue,
}

/// Image fragment ready for insertion (already decoded).
#[derive(Debug, Clone, PartialEq)]
pub struct NewImageFragment {
    pub image_index: i32,
    pub label: Option<String>,
    pub data: Vec<u8>,
}

/// Everything persisted for one successfully extracted document, written in
/// a single transaction.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub name: String,
    pub size: i64,
    pub upload_date: DateTime<Utc>,
    pub raw: Vec<u8>,
    pub text_fragments: Vec<NewTextFragment>,
    pub image_fragments: Vec<NewImageFragment>,
}

/// Result of a user-directed save of a document's bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved { path: PathBuf },
    Canceled,
}
