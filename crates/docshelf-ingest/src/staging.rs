//! Staging area: turns a batch of incoming files into filesystem paths and
//! `processing` documents.
//!
//! Path inputs are used where they are. Byte inputs are written into a
//! per-batch temporary directory as `{token}-{name}`. Only those temporary
//! files are ever removed on cleanup; user files are never touched.
//!
//! Accepted names stay reserved until their batch is dropped, so two
//! overlapping batches never both accept the same name.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

use docshelf_core::defaults::STAGING_DIR_PREFIX;
use docshelf_core::{
    is_pdf, name_stem, new_v7, sanitize_filename, Document, Error, FileInput, IngestStore, Result,
};

/// Why an input was left out of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingWarning {
    /// The input has no usable display name.
    EmptyName,
    /// A stored document already has this exact name.
    AlreadyExists { name: String },
    /// Another batch still in flight has this name.
    InProgress { name: String },
    /// An earlier input in the same batch has this name.
    DuplicateInBatch { name: String },
    /// An earlier input in the same batch has the same stem, so extracted
    /// fragments could not be told apart.
    DuplicateStem { name: String, stem: String },
    /// A path input could not be read.
    Unreadable { name: String, reason: String },
    /// A byte input could not be written to the staging directory.
    WriteFailed { name: String, reason: String },
}

impl fmt::Display for StagingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagingWarning::EmptyName => write!(f, "Skipped a file with an empty name"),
            StagingWarning::AlreadyExists { name } => {
                write!(f, "\"{}\" already exists and was skipped", name)
            }
            StagingWarning::InProgress { name } => {
                write!(f, "\"{}\" is already being imported and was skipped", name)
            }
            StagingWarning::DuplicateInBatch { name } => {
                write!(f, "\"{}\" was selected more than once; extra copies skipped", name)
            }
            StagingWarning::DuplicateStem { name, stem } => write!(
                f,
                "\"{}\" was skipped because another file named \"{}\" is in the same batch",
                name, stem
            ),
            StagingWarning::Unreadable { name, reason } => {
                write!(f, "\"{}\" could not be read: {}", name, reason)
            }
            StagingWarning::WriteFailed { name, reason } => {
                write!(f, "\"{}\" could not be staged: {}", name, reason)
            }
        }
    }
}

/// One accepted input.
#[derive(Debug)]
pub struct StagedFile {
    /// The `processing` document announced for this file.
    pub document: Document,
    /// Where the extractor reads the file from.
    pub path: PathBuf,
    /// True when `path` is a temporary copy owned by the batch.
    pub temporary: bool,
}

impl StagedFile {
    /// File name of the staged path, as the extractor reports it back.
    pub fn base_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn stem(&self) -> String {
        self.document.stem()
    }
}

/// Names staged by any batch and not yet released.
#[derive(Debug, Clone, Default)]
struct InFlightNames(Arc<Mutex<HashSet<String>>>);

impl InFlightNames {
    fn with_set<T>(&self, f: impl FnOnce(&mut HashSet<String>) -> T) -> T {
        let mut set = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut set)
    }

    /// Returns false when the name is already reserved.
    fn try_reserve(&self, name: &str) -> bool {
        self.with_set(|set| set.insert(name.to_string()))
    }

    fn release(&self, name: &str) {
        self.with_set(|set| set.remove(name));
    }

    fn contains(&self, name: &str) -> bool {
        self.with_set(|set| set.contains(name))
    }
}

/// Names held by one batch; released on drop.
#[derive(Debug)]
struct Reservation {
    names: Vec<String>,
    in_flight: InFlightNames,
}

impl Reservation {
    fn new(in_flight: InFlightNames) -> Self {
        Self {
            names: Vec::new(),
            in_flight,
        }
    }

    fn reserve(&mut self, name: &str) -> bool {
        if !self.in_flight.try_reserve(name) {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    fn release(&mut self, name: &str) {
        self.names.retain(|n| n != name);
        self.in_flight.release(name);
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        for name in &self.names {
            self.in_flight.release(name);
        }
    }
}

/// The result of staging one batch.
///
/// Holds a reservation on every accepted name until it is dropped or
/// cleaned up.
#[derive(Debug)]
pub struct StagedBatch {
    pub id: Uuid,
    pub files: Vec<StagedFile>,
    pub warnings: Vec<StagingWarning>,
    dir: Option<TempDir>,
    reservation: Reservation,
}

impl StagedBatch {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.files.iter().map(|f| f.document.clone()).collect()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    pub fn stems(&self) -> Vec<String> {
        self.files.iter().map(StagedFile::stem).collect()
    }

    /// Directory holding this batch's temporary copies, if one was created.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Remove the temporary copies and the batch directory, then release
    /// the batch's names.
    pub async fn cleanup(mut self) {
        for file in self.files.iter().filter(|f| f.temporary) {
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        subsystem = "ingest",
                        component = "staging",
                        op = "cleanup",
                        path = %file.path.display(),
                        error = %e,
                        "Failed to remove staged file"
                    );
                }
            }
        }
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(
                    subsystem = "ingest",
                    component = "staging",
                    op = "cleanup",
                    path = %path.display(),
                    error = %e,
                    "Failed to remove staging directory"
                );
            }
        }
    }
}

/// Process-scoped root under which per-batch directories are created.
///
/// Clones share the same set of in-flight names.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
    in_flight: InFlightNames,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            in_flight: InFlightNames::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True while a staged batch holds `name`.
    pub fn is_in_flight(&self, name: &str) -> bool {
        self.in_flight.contains(name)
    }

    /// Create a fresh, empty directory under the staging root.
    pub async fn temp_dir(&self, prefix: &str) -> Result<TempDir> {
        tokio::fs::create_dir_all(&self.root).await?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.root)?;
        Ok(dir)
    }

    /// Stage a batch.
    ///
    /// Inputs are checked in order; skipped inputs become warnings. Errors
    /// from the store abort the whole batch before anything is announced.
    ///
    /// A name is reserved before the store is asked about it, so a batch
    /// committing concurrently is seen either as in flight or as stored.
    pub async fn stage(&self, inputs: Vec<FileInput>, store: &dyn IngestStore) -> Result<StagedBatch> {
        let mut batch = StagedBatch {
            id: new_v7(),
            files: Vec::new(),
            warnings: Vec::new(),
            dir: None,
            reservation: Reservation::new(self.in_flight.clone()),
        };
        let mut names = HashSet::new();
        let mut stems = HashSet::new();

        for input in inputs {
            let name = input.display_name();
            if name.is_empty() {
                batch.warnings.push(StagingWarning::EmptyName);
                continue;
            }
            if names.contains(&name) {
                batch
                    .warnings
                    .push(StagingWarning::DuplicateInBatch { name });
                continue;
            }
            let stem = name_stem(&name);
            if stems.contains(&stem) {
                batch
                    .warnings
                    .push(StagingWarning::DuplicateStem { name, stem });
                continue;
            }
            if !batch.reservation.reserve(&name) {
                batch.warnings.push(StagingWarning::InProgress { name });
                continue;
            }
            if store.name_exists(&name).await? {
                batch.reservation.release(&name);
                batch.warnings.push(StagingWarning::AlreadyExists { name });
                continue;
            }

            let staged = match input {
                FileInput::Path(path) => stage_path(&name, path).await,
                FileInput::Bytes { data, .. } => {
                    let dir = match batch.dir.as_ref() {
                        Some(dir) => dir.path().to_path_buf(),
                        None => match self.temp_dir(STAGING_DIR_PREFIX).await {
                            Ok(dir) => {
                                let path = dir.path().to_path_buf();
                                batch.dir = Some(dir);
                                path
                            }
                            Err(e) => {
                                batch.reservation.release(&name);
                                batch.warnings.push(StagingWarning::WriteFailed {
                                    name,
                                    reason: e.to_string(),
                                });
                                continue;
                            }
                        },
                    };
                    stage_bytes(&name, &data, &dir).await
                }
            };

            match staged {
                Ok(file) => {
                    debug!(
                        subsystem = "ingest",
                        component = "staging",
                        op = "stage",
                        batch_id = %batch.id,
                        document_id = %file.document.id,
                        file_name = %name,
                        size = file.document.size,
                        "File staged"
                    );
                    names.insert(name);
                    stems.insert(stem);
                    batch.files.push(file);
                }
                Err(warning) => {
                    batch.reservation.release(&name);
                    batch.warnings.push(warning);
                }
            }
        }

        for warning in &batch.warnings {
            warn!(
                subsystem = "ingest",
                component = "staging",
                batch_id = %batch.id,
                "{}",
                warning
            );
        }
        Ok(batch)
    }
}

impl Default for StagingArea {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("docshelf"))
    }
}

async fn stage_path(name: &str, path: PathBuf) -> std::result::Result<StagedFile, StagingWarning> {
    let unreadable = |reason: String| StagingWarning::Unreadable {
        name: name.to_string(),
        reason,
    };
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| unreadable(e.to_string()))?;
    if !metadata.is_file() {
        return Err(unreadable("not a regular file".to_string()));
    }
    Ok(StagedFile {
        document: Document::staged(new_v7(), name, metadata.len() as i64),
        path,
        temporary: false,
    })
}

async fn stage_bytes(
    name: &str,
    data: &[u8],
    dir: &Path,
) -> std::result::Result<StagedFile, StagingWarning> {
    let write_failed = |e: Error| StagingWarning::WriteFailed {
        name: name.to_string(),
        reason: e.to_string(),
    };
    if !is_pdf(data) {
        debug!(file_name = name, "Staged bytes lack a PDF signature");
    }
    let path = dir.join(format!(
        "{}-{}",
        Uuid::new_v4().simple(),
        sanitize_filename(name)
    ));
    tokio::fs::write(&path, data)
        .await
        .map_err(|e| write_failed(e.into()))?;
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| write_failed(e.into()))?;
    Ok(StagedFile {
        document: Document::staged(new_v7(), name, metadata.len() as i64),
        path,
        temporary: true,
    })
}
