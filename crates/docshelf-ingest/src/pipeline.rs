//! Ingestion pipeline: staging, extraction, persistence, notification.
//!
//! ```text
//! inputs ──► StagingArea ──► document.created × n
//!                 │
//!                 ▼
//!            Extractor (one run per batch)
//!                 │
//!                 ▼
//!            commit_batch (under the commit lock) ──► document.updated × n
//!                 │
//!                 ▼
//!            cleanup of staged copies and output dir
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use docshelf_core::defaults::OUTPUT_DIR_PREFIX;
use docshelf_core::{
    Document, DocumentStatus, EventBus, ExtractionOutput, Extractor, FileInput, IngestStore,
    Result,
};

use crate::committer::commit_batch;
use crate::staging::{StagedBatch, StagingArea};

/// Outcome of a full ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub batch_id: Uuid,
    /// Documents with their terminal status, in input order.
    pub documents: Vec<Document>,
    /// Human-readable reasons for skipped inputs.
    pub warnings: Vec<String>,
}

impl IngestReport {
    pub fn count(&self, status: DocumentStatus) -> usize {
        self.documents.iter().filter(|d| d.status == status).count()
    }
}

/// Drives batches through the four ingestion stages.
pub struct IngestPipeline {
    extractor: Arc<dyn Extractor>,
    events: Arc<EventBus>,
    staging: StagingArea,
    commit_lock: Mutex<()>,
}

impl IngestPipeline {
    pub fn new(extractor: Arc<dyn Extractor>, events: Arc<EventBus>, staging: StagingArea) -> Self {
        Self {
            extractor,
            events,
            staging,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn extractor(&self) -> &Arc<dyn Extractor> {
        &self.extractor
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Stage a batch and announce it.
    ///
    /// Warnings are emitted first, then one `document.created` per accepted
    /// file once the whole batch is staged.
    pub async fn stage(&self, store: &dyn IngestStore, inputs: Vec<FileInput>) -> Result<StagedBatch> {
        let batch = self.staging.stage(inputs, store).await?;
        for warning in &batch.warnings {
            self.events.warning(warning.to_string());
        }
        for file in &batch.files {
            self.events.document_created(&file.document);
        }
        info!(
            subsystem = "ingest",
            component = "pipeline",
            op = "stage",
            batch_id = %batch.id,
            file_count = batch.len(),
            skipped = batch.warnings.len(),
            "Batch staged"
        );
        Ok(batch)
    }

    /// Extract and persist a staged batch, returning each document with its
    /// terminal status. Never fails: problems become `error` statuses.
    ///
    /// The batch's names are released only after the commit loop, so a
    /// concurrent batch sees each name as in flight or as stored.
    pub async fn process(&self, store: &dyn IngestStore, batch: StagedBatch) -> Vec<Document> {
        if batch.is_empty() {
            batch.cleanup().await;
            return Vec::new();
        }
        let start = Instant::now();
        let batch_id = batch.id;

        let output = self.extract(&batch).await;
        let finished = {
            let _guard = self.commit_lock.lock().await;
            commit_batch(store, &batch.files, output.as_ref().ok()).await
        };
        batch.cleanup().await;

        for document in &finished {
            self.events.document_updated(document);
        }

        let ready = finished
            .iter()
            .filter(|d| d.status == DocumentStatus::Ready)
            .count();
        info!(
            subsystem = "ingest",
            component = "pipeline",
            op = "process",
            batch_id = %batch_id,
            file_count = finished.len(),
            ready,
            failed = finished.len() - ready,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch processed"
        );
        finished
    }

    /// Stage and process in one call.
    pub async fn ingest(&self, store: &dyn IngestStore, inputs: Vec<FileInput>) -> Result<IngestReport> {
        let batch = self.stage(store, inputs).await?;
        let batch_id = batch.id;
        let warnings = batch.warnings.iter().map(ToString::to_string).collect();
        let documents = self.process(store, batch).await;
        Ok(IngestReport {
            batch_id,
            documents,
            warnings,
        })
    }

    async fn extract(&self, batch: &StagedBatch) -> Result<ExtractionOutput> {
        let result = match self.staging.temp_dir(OUTPUT_DIR_PREFIX).await {
            Ok(out_dir) => {
                let result = self
                    .extractor
                    .run(&batch.paths(), &batch.stems(), out_dir.path())
                    .await;
                if let Err(e) = out_dir.close() {
                    warn!(batch_id = %batch.id, error = %e, "Failed to remove output directory");
                }
                result
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            warn!(
                subsystem = "ingest",
                component = "pipeline",
                op = "extract",
                batch_id = %batch.id,
                extractor = self.extractor.name(),
                error = %e,
                "Extraction failed for batch"
            );
            self.events
                .warning(format!("Processing failed for {} file(s): {}", batch.len(), e));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBehavior, FakeExtractor, MemoryStore};
    use docshelf_core::{EventEnvelope, ServerEvent};
    use tokio::sync::broadcast::Receiver;

    struct Harness {
        pipeline: IngestPipeline,
        extractor: Arc<FakeExtractor>,
        rx: Receiver<EventEnvelope>,
        root: tempfile::TempDir,
    }

    fn harness(extractor: FakeExtractor) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let extractor = Arc::new(extractor);
        let events = Arc::new(EventBus::new(64));
        let rx = events.subscribe();
        let pipeline = IngestPipeline::new(
            extractor.clone(),
            events,
            StagingArea::new(root.path().join("staging")),
        );
        Harness {
            pipeline,
            extractor,
            rx,
            root,
        }
    }

    fn drain(rx: &mut Receiver<EventEnvelope>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            events.push(envelope.payload);
        }
        events
    }

    fn pdf(name: &str) -> FileInput {
        FileInput::bytes(name, format!("%PDF-1.4 {}", name).into_bytes())
    }

    fn staging_leftovers(h: &Harness) -> usize {
        std::fs::read_dir(h.pipeline.staging().root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_created_events_precede_updates() {
        let mut h = harness(FakeExtractor::succeeding());
        let store = MemoryStore::default();

        let report = h
            .pipeline
            .ingest(&store, vec![pdf("a.pdf"), pdf("b.pdf")])
            .await
            .unwrap();

        assert_eq!(report.count(DocumentStatus::Ready), 2);
        let events = drain(&mut h.rx);
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], ServerEvent::DocumentCreated { .. }));
        assert!(matches!(events[1], ServerEvent::DocumentCreated { .. }));
        for event in &events[2..] {
            match event {
                ServerEvent::DocumentUpdated { document } => {
                    assert_eq!(document.status, DocumentStatus::Ready);
                    assert!(document.persisted);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(events[0].entity_id(), events[2].entity_id());
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let mut h = harness(FakeExtractor::succeeding());
        let store = MemoryStore::with_names(&["a.pdf"]);

        let report = h.pipeline.ingest(&store, vec![pdf("a.pdf")]).await.unwrap();

        assert!(report.documents.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(h.extractor.calls(), 0);
        let events = drain(&mut h.rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::Warning { .. }));
    }

    #[tokio::test]
    async fn test_existing_names_are_excluded() {
        let mut h = harness(FakeExtractor::succeeding());
        let store = MemoryStore::with_names(&["old.pdf"]);

        let report = h
            .pipeline
            .ingest(&store, vec![pdf("old.pdf"), pdf("new.pdf")])
            .await
            .unwrap();

        let names: Vec<_> = report.documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["new.pdf"]);
        assert_eq!(store.committed_names(), vec!["new.pdf"]);
        let created = drain(&mut h.rx)
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::DocumentCreated { .. }))
            .count();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_extractor_failure_marks_batch_error() {
        let mut h = harness(FakeExtractor::new(FakeBehavior::Fail));
        let store = MemoryStore::default();

        let report = h
            .pipeline
            .ingest(&store, vec![pdf("a.pdf"), pdf("b.pdf"), pdf("c.pdf")])
            .await
            .unwrap();

        assert_eq!(report.count(DocumentStatus::Error), 3);
        assert!(store.committed().is_empty());
        assert_eq!(staging_leftovers(&h), 0);

        let events = drain(&mut h.rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::Warning { message } if message.contains("3 file(s)"))));
        let updated: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::DocumentUpdated { document } => Some(document.status),
                _ => None,
            })
            .collect();
        assert_eq!(updated, vec![DocumentStatus::Error; 3]);
    }

    #[tokio::test]
    async fn test_mixed_batch_round_trip() {
        let h = harness(FakeExtractor::new(FakeBehavior::SucceedExcept(vec![
            "b".to_string(),
        ])));
        let store = MemoryStore::default();

        let report = h
            .pipeline
            .ingest(&store, vec![pdf("a.pdf"), pdf("b.pdf"), pdf("c.pdf")])
            .await
            .unwrap();

        let statuses: Vec<_> = report.documents.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![DocumentStatus::Ready, DocumentStatus::Error, DocumentStatus::Ready]
        );
        let committed = store.committed();
        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0].name, "a.pdf");
        assert_eq!(committed[0].raw, b"%PDF-1.4 a.pdf");
        assert_eq!(committed[0].text_fragments[0].content, "Text of a");
        assert_eq!(committed[1].name, "c.pdf");
        assert_eq!(committed[1].id, report.documents[2].id);
        assert_eq!(staging_leftovers(&h), 0);
    }

    #[tokio::test]
    async fn test_extractor_sees_staged_paths_and_stems() {
        let h = harness(FakeExtractor::succeeding());
        let user_file = h.root.path().join("Annual Report.pdf");
        std::fs::write(&user_file, b"%PDF-1.7").unwrap();

        h.pipeline
            .ingest(
                &MemoryStore::default(),
                vec![FileInput::Path(user_file.clone()), pdf("scan.v2.pdf")],
            )
            .await
            .unwrap();

        let seen = h.extractor.seen();
        assert_eq!(seen.len(), 1);
        let (paths, stems, out_dir) = &seen[0];
        assert_eq!(paths[0], user_file);
        assert!(paths[1]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("-scan.v2.pdf"));
        assert_eq!(stems, &vec!["Annual Report".to_string(), "scan.v2".to_string()]);
        assert!(out_dir.starts_with(h.pipeline.staging().root()));
        assert!(!out_dir.exists());
        assert!(user_file.exists());
    }

    #[tokio::test]
    async fn test_stage_then_process_separately() {
        let mut h = harness(FakeExtractor::succeeding());
        let store = MemoryStore::default();

        let batch = h.pipeline.stage(&store, vec![pdf("x.pdf")]).await.unwrap();
        let staged = batch.documents();
        assert_eq!(staged[0].status, DocumentStatus::Processing);
        assert!(!staged[0].persisted);
        assert_eq!(drain(&mut h.rx).len(), 1);

        let finished = h.pipeline.process(&store, batch).await;
        assert_eq!(finished[0].id, staged[0].id);
        assert_eq!(finished[0].status, DocumentStatus::Ready);
    }

    #[tokio::test]
    async fn test_concurrent_batches_with_same_name() {
        let h = harness(FakeExtractor::succeeding().with_delay(std::time::Duration::from_millis(50)));
        let store = MemoryStore::default();

        let (first, second) = tokio::join!(
            h.pipeline.ingest(&store, vec![pdf("dup.pdf")]),
            h.pipeline.ingest(&store, vec![pdf("dup.pdf")]),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(h.extractor.calls(), 1);
        assert_eq!(store.committed_names(), vec!["dup.pdf"]);
        let (accepted, skipped) = if first.documents.is_empty() {
            (first, second)
        } else {
            (second, first)
        };
        assert!(skipped.documents.is_empty());
        assert_eq!(skipped.warnings.len(), 1);
        assert!(skipped.warnings[0].contains("already being imported"));
        assert_eq!(accepted.count(DocumentStatus::Ready), 1);
        assert!(!h.pipeline.staging().is_in_flight("dup.pdf"));
    }

    #[tokio::test]
    async fn test_failed_batch_releases_names() {
        let h = harness(FakeExtractor::new(FakeBehavior::Fail));
        let store = MemoryStore::default();

        let report = h.pipeline.ingest(&store, vec![pdf("retry.pdf")]).await.unwrap();
        assert_eq!(report.count(DocumentStatus::Error), 1);
        assert!(!h.pipeline.staging().is_in_flight("retry.pdf"));

        let retry = h.pipeline.stage(&store, vec![pdf("retry.pdf")]).await.unwrap();
        assert_eq!(retry.len(), 1);
        assert!(retry.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_batches_both_complete() {
        let h = harness(FakeExtractor::succeeding().with_delay(std::time::Duration::from_millis(20)));
        let store = MemoryStore::default();

        let (first, second) = tokio::join!(
            h.pipeline.ingest(&store, vec![pdf("a.pdf"), pdf("b.pdf")]),
            h.pipeline.ingest(&store, vec![pdf("c.pdf")]),
        );

        assert_eq!(first.unwrap().count(DocumentStatus::Ready), 2);
        assert_eq!(second.unwrap().count(DocumentStatus::Ready), 1);
        assert_eq!(store.committed().len(), 3);
        assert_eq!(h.extractor.calls(), 2);
    }
}
