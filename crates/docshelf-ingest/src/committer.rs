//! Persistence of extracted documents.
//!
//! Each successfully extracted file becomes one [`NewDocument`] handed to
//! [`IngestStore::commit_document`], which writes it in a single transaction.
//! Documents are committed one at a time; a failure only affects its own
//! document.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, trace, warn};

use docshelf_core::{
    Document, DocumentStatus, ExtractionOutput, ImageChunk, IngestStore, NewDocument,
    NewImageFragment, NewTextFragment, Result,
};

use crate::staging::StagedFile;

/// Decode a base64 payload, accepting an optional `data:<mime>;base64,` prefix.
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>> {
    let payload = payload.trim();
    let encoded = match payload.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .unwrap_or(rest),
        None => payload,
    };
    Ok(STANDARD.decode(encoded)?)
}

fn image_label(chunk: &ImageChunk, stem: &str, index: usize) -> String {
    chunk
        .suggested_label()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_img_{}.png", stem, index))
}

/// Assemble the record for one staged file from the extraction output.
pub async fn build_document(file: &StagedFile, output: &ExtractionOutput) -> Result<NewDocument> {
    let stem = file.stem();
    let raw = tokio::fs::read(&file.path).await?;

    let text_fragments: Vec<NewTextFragment> = output
        .text_for(&stem)
        .enumerate()
        .map(|(i, chunk)| NewTextFragment {
            chunk_index: i as i32,
            content: chunk.text.clone(),
            metadata: fragment_metadata(chunk.metadata.as_ref()),
        })
        .collect();

    let mut image_fragments = Vec::new();
    for chunk in output.images_for(&stem).filter(|c| c.has_payload()) {
        let index = image_fragments.len();
        let data = decode_image_payload(chunk.data_base64.as_deref().unwrap_or_default())?;
        trace!(
            document_id = %file.document.id,
            image_index = index,
            bytes = data.len(),
            "Image fragment decoded"
        );
        image_fragments.push(NewImageFragment {
            image_index: index as i32,
            label: Some(image_label(chunk, &stem, index)),
            data,
        });
    }

    Ok(NewDocument {
        id: file.document.id,
        name: file.document.name.clone(),
        size: file.document.size,
        upload_date: file.document.upload_date,
        raw,
        text_fragments,
        image_fragments,
    })
}

/// Commit every file in order and return each document with its terminal
/// status. `output` is `None` when extraction failed for the whole batch.
pub async fn commit_batch(
    store: &dyn IngestStore,
    files: &[StagedFile],
    output: Option<&ExtractionOutput>,
) -> Vec<Document> {
    let mut finished = Vec::with_capacity(files.len());
    for file in files {
        let Some(output) = output else {
            finished.push(file.document.with_status(DocumentStatus::Error));
            continue;
        };
        let base_name = file.base_name();
        if !output.succeeded(&base_name) {
            warn!(
                subsystem = "ingest",
                component = "committer",
                document_id = %file.document.id,
                file_name = %file.document.name,
                reason = output.failure_message(&base_name).unwrap_or("not reported by parser"),
                "Extraction did not succeed for file"
            );
            finished.push(file.document.with_status(DocumentStatus::Error));
            continue;
        }

        let result = match build_document(file, output).await {
            Ok(doc) => store.commit_document(doc).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => {
                debug!(
                    subsystem = "ingest",
                    component = "committer",
                    op = "commit",
                    document_id = %file.document.id,
                    "Document ready"
                );
                let mut doc = file.document.with_status(DocumentStatus::Ready);
                doc.persisted = true;
                finished.push(doc);
            }
            Err(e) => {
                warn!(
                    subsystem = "ingest",
                    component = "committer",
                    op = "commit",
                    document_id = %file.document.id,
                    file_name = %file.document.name,
                    error = %e,
                    "Document commit failed"
                );
                finished.push(file.document.with_status(DocumentStatus::Error));
            }
        }
    }
    finished
}

/// Metadata object for a fragment, `{}` when the parser sent none.
pub fn fragment_metadata(metadata: Option<&JsonValue>) -> JsonValue {
    metadata.cloned().unwrap_or_else(|| json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{output_for, staged_file, MemoryStore};
    use docshelf_core::{ImageChunk, TextChunk};

    #[test]
    fn test_decode_plain_and_data_uri() {
        assert_eq!(decode_image_payload("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_image_payload("data:image/png;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert!(decode_image_payload("***").is_err());
    }

    #[tokio::test]
    async fn test_build_document_selects_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let file = staged_file(dir.path(), "report.pdf", b"%PDF-report");
        let mut output = output_for(&[(&file, true)]);
        output.text_chunks = vec![
            TextChunk {
                source: "report".into(),
                text: "first".into(),
                metadata: Some(json!({"page": 1})),
            },
            TextChunk {
                source: "other".into(),
                text: "not mine".into(),
                metadata: None,
            },
            TextChunk {
                source: "report".into(),
                text: "second".into(),
                metadata: None,
            },
        ];
        output.image_chunks = vec![
            ImageChunk {
                source: "report".into(),
                image_id: None,
                filename: None,
                data_base64: None,
                metadata: None,
            },
            ImageChunk {
                source: "report".into(),
                image_id: None,
                filename: Some("fig.png".into()),
                data_base64: Some("aGVsbG8=".into()),
                metadata: None,
            },
            ImageChunk {
                source: "report".into(),
                image_id: None,
                filename: None,
                data_base64: Some("d29ybGQ=".into()),
                metadata: None,
            },
        ];

        let doc = build_document(&file, &output).await.unwrap();

        assert_eq!(doc.raw, b"%PDF-report");
        assert_eq!(doc.text_fragments.len(), 2);
        assert_eq!(doc.text_fragments[0].content, "first");
        assert_eq!(doc.text_fragments[0].metadata, json!({"page": 1}));
        assert_eq!(doc.text_fragments[1].chunk_index, 1);
        assert_eq!(doc.text_fragments[1].metadata, json!({}));
        assert_eq!(doc.image_fragments.len(), 2);
        assert_eq!(doc.image_fragments[0].label.as_deref(), Some("fig.png"));
        assert_eq!(doc.image_fragments[0].data, b"hello");
        assert_eq!(doc.image_fragments[1].image_index, 1);
        assert_eq!(doc.image_fragments[1].label.as_deref(), Some("report_img_1.png"));
    }

    #[tokio::test]
    async fn test_commit_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let a = staged_file(dir.path(), "a.pdf", b"%PDF-a");
        let b = staged_file(dir.path(), "b.pdf", b"%PDF-b");
        let c = staged_file(dir.path(), "c.pdf", b"%PDF-c");
        let output = output_for(&[(&a, true), (&b, true), (&c, true)]);
        let store = MemoryStore::default();
        store.fail_commit_for("b.pdf");

        let docs = commit_batch(&store, &[a, b, c], Some(&output)).await;

        let statuses: Vec<_> = docs.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![DocumentStatus::Ready, DocumentStatus::Error, DocumentStatus::Ready]
        );
        assert!(docs[0].persisted);
        assert!(!docs[1].persisted);
        assert_eq!(store.committed_names(), vec!["a.pdf", "c.pdf"]);
    }

    #[tokio::test]
    async fn test_batch_failure_marks_everything_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = staged_file(dir.path(), "a.pdf", b"%PDF-a");
        let store = MemoryStore::default();

        let docs = commit_batch(&store, &[a], None).await;

        assert_eq!(docs[0].status, DocumentStatus::Error);
        assert!(store.committed_names().is_empty());
    }

    #[tokio::test]
    async fn test_unlisted_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = staged_file(dir.path(), "a.pdf", b"%PDF-a");
        let store = MemoryStore::default();

        let docs = commit_batch(&store, &[a], Some(&ExtractionOutput::default())).await;

        assert_eq!(docs[0].status, DocumentStatus::Error);
        assert!(store.committed_names().is_empty());
    }

    #[test]
    fn test_fragment_metadata_defaults_to_empty_object() {
        assert_eq!(fragment_metadata(None), json!({}));
        assert_eq!(fragment_metadata(Some(&json!({"k": 1}))), json!({"k": 1}));
    }
}
