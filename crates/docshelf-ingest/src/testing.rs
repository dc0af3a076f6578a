//! In-memory doubles for pipeline tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use docshelf_core::{
    new_v7, Document, Error, ExtractionOutput, Extractor, FileSummary, IngestStore, NewDocument,
    Result, TextChunk, EXTRACTION_SUCCESS,
};

use crate::staging::StagedFile;

/// Store that keeps committed documents in memory.
#[derive(Default)]
pub struct MemoryStore {
    existing: Mutex<HashSet<String>>,
    committed: Mutex<Vec<NewDocument>>,
    failing: Mutex<HashSet<String>>,
    fail_lookups: AtomicBool,
}

impl MemoryStore {
    pub fn with_names(names: &[&str]) -> Self {
        let store = Self::default();
        store
            .existing
            .lock()
            .unwrap()
            .extend(names.iter().map(|n| n.to_string()));
        store
    }

    pub fn fail_lookups(&self) {
        self.fail_lookups.store(true, Ordering::SeqCst);
    }

    pub fn fail_commit_for(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn committed(&self) -> Vec<NewDocument> {
        self.committed.lock().unwrap().clone()
    }

    pub fn committed_names(&self) -> Vec<String> {
        self.committed().into_iter().map(|d| d.name).collect()
    }
}

#[async_trait]
impl IngestStore for MemoryStore {
    async fn name_exists(&self, name: &str) -> Result<bool> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        Ok(self.existing.lock().unwrap().contains(name))
    }

    async fn commit_document(&self, doc: NewDocument) -> Result<Uuid> {
        if self.failing.lock().unwrap().contains(&doc.name) {
            return Err(Error::Internal(format!("simulated failure for {}", doc.name)));
        }
        if !self.existing.lock().unwrap().insert(doc.name.clone()) {
            return Err(Error::AlreadyExists(doc.name));
        }
        let id = doc.id;
        self.committed.lock().unwrap().push(doc);
        Ok(id)
    }
}

/// How [`FakeExtractor`] answers.
#[derive(Clone)]
pub enum FakeBehavior {
    /// Every file succeeds with one text chunk, except the listed stems.
    SucceedExcept(Vec<String>),
    /// The whole run fails.
    Fail,
}

/// Extractor that answers without spawning anything and records what it saw.
pub struct FakeExtractor {
    behavior: FakeBehavior,
    delay: Duration,
    calls: AtomicUsize,
    seen: Mutex<Vec<(Vec<PathBuf>, Vec<String>, PathBuf)>>,
}

impl FakeExtractor {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(FakeBehavior::SucceedExcept(Vec::new()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<(Vec<PathBuf>, Vec<String>, PathBuf)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn run(
        &self,
        inputs: &[PathBuf],
        stems: &[String],
        out_dir: &Path,
    ) -> Result<ExtractionOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((inputs.to_vec(), stems.to_vec(), out_dir.to_path_buf()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failing = match &self.behavior {
            FakeBehavior::Fail => {
                return Err(Error::Extraction("parser failed (exit status: 1)".to_string()))
            }
            FakeBehavior::SucceedExcept(stems) => stems,
        };

        let mut output = ExtractionOutput::default();
        for (path, stem) in inputs.iter().zip(stems) {
            let base_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if failing.contains(stem) {
                output.summary.push(FileSummary {
                    base_name,
                    status: "error".to_string(),
                    message: Some("corrupt file".to_string()),
                });
                continue;
            }
            output.summary.push(FileSummary {
                base_name,
                status: EXTRACTION_SUCCESS.to_string(),
                message: None,
            });
            output.text_chunks.push(TextChunk {
                source: stem.clone(),
                text: format!("Text of {}", stem),
                metadata: None,
            });
        }
        Ok(output)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Write `data` to `dir/name` and wrap it as a non-temporary staged file.
pub fn staged_file(dir: &Path, name: &str, data: &[u8]) -> StagedFile {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    StagedFile {
        document: Document::staged(new_v7(), name, data.len() as i64),
        path,
        temporary: false,
    }
}

/// Summary-only output marking each file as succeeded or failed.
pub fn output_for(files: &[(&StagedFile, bool)]) -> ExtractionOutput {
    ExtractionOutput {
        summary: files
            .iter()
            .map(|(file, ok)| FileSummary {
                base_name: file.base_name(),
                status: if *ok { EXTRACTION_SUCCESS } else { "error" }.to_string(),
                message: None,
            })
            .collect(),
        ..ExtractionOutput::default()
    }
}
