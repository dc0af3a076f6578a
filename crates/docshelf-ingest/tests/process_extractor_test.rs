//! End-to-end tests of the process-backed extractor against a shell parser.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use docshelf_ingest::{
    DocumentStatus, Error, EventBus, Extractor, FileInput, IngestPipeline, IngestStore,
    NewDocument, ProcessExtractor, ProcessExtractorConfig, Result, StagingArea,
};

/// Mimics the parser contract: one summary entry per input, one text chunk
/// and one image per stem. Inputs whose name contains `broken` fail.
const PARSER_SCRIPT: &str = r#"
mode=""
inputs=""
stems=""
outdir=""
while [ $# -gt 0 ]; do
  case "$1" in
    --input-files) mode=in ;;
    --original-stems) mode=stem ;;
    --output-dir) mode=out ;;
    *)
      case "$mode" in
        in) inputs="$inputs $1" ;;
        stem) stems="$stems $1" ;;
        out) outdir="$1" ;;
      esac ;;
  esac
  shift
done
[ -d "$outdir" ] || { echo "missing output dir" >&2; exit 3; }
echo "parsing" >&2
summary=""; sep=""
for f in $inputs; do
  b=$(basename "$f")
  case "$b" in
    *broken*) entry="{\"baseName\":\"$b\",\"status\":\"error\",\"message\":\"bad xref\"}" ;;
    *) entry="{\"baseName\":\"$b\",\"status\":\"success\"}" ;;
  esac
  summary="$summary$sep$entry"; sep=","
done
texts=""; images=""; sep=""
for s in $stems; do
  texts="$texts$sep{\"source\":\"$s\",\"text\":\"Page one of $s\",\"metadata\":{\"page\":1}}"
  images="$images$sep{\"source\":\"$s\",\"image_id\":\"$s-fig\",\"data_base64\":\"aGVsbG8=\"}"
  sep=","
done
printf '{"summary":[%s],"text_chunks":[%s],"image_chunks":[%s]}\n' "$summary" "$texts" "$images"
"#;

#[derive(Default)]
struct RecordingStore {
    committed: Mutex<Vec<NewDocument>>,
}

#[async_trait]
impl IngestStore for RecordingStore {
    async fn name_exists(&self, name: &str) -> Result<bool> {
        Ok(self.committed.lock().unwrap().iter().any(|d| d.name == name))
    }

    async fn commit_document(&self, doc: NewDocument) -> Result<Uuid> {
        let id = doc.id;
        self.committed.lock().unwrap().push(doc);
        Ok(id)
    }
}

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("parser.sh");
    std::fs::write(&path, body).unwrap();
    path
}

fn extractor(script: PathBuf, timeout: Duration) -> ProcessExtractor {
    ProcessExtractor::new(ProcessExtractorConfig {
        program: PathBuf::from("sh"),
        script: Some(script),
        timeout,
    })
}

#[tokio::test]
async fn test_pipeline_with_shell_parser() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), PARSER_SCRIPT);
    let pipeline = IngestPipeline::new(
        Arc::new(extractor(script, Duration::from_secs(30))),
        Arc::new(EventBus::new(32)),
        StagingArea::new(dir.path().join("staging")),
    );
    let store = RecordingStore::default();

    let report = pipeline
        .ingest(
            &store,
            vec![
                FileInput::bytes("alpha.pdf", b"%PDF-alpha".to_vec()),
                FileInput::bytes("broken.pdf", b"%PDF-broken".to_vec()),
                FileInput::bytes("gamma.pdf", b"%PDF-gamma".to_vec()),
            ],
        )
        .await
        .unwrap();

    let statuses: Vec<_> = report.documents.iter().map(|d| d.status).collect();
    assert_eq!(
        statuses,
        vec![DocumentStatus::Ready, DocumentStatus::Error, DocumentStatus::Ready]
    );

    let committed = store.committed.lock().unwrap();
    assert_eq!(committed.len(), 2);
    let alpha = &committed[0];
    assert_eq!(alpha.name, "alpha.pdf");
    assert_eq!(alpha.raw, b"%PDF-alpha");
    assert_eq!(alpha.text_fragments.len(), 1);
    assert_eq!(alpha.text_fragments[0].content, "Page one of alpha");
    assert_eq!(alpha.text_fragments[0].metadata["page"], 1);
    assert_eq!(alpha.image_fragments.len(), 1);
    assert_eq!(alpha.image_fragments[0].label.as_deref(), Some("alpha-fig"));
    assert_eq!(alpha.image_fragments[0].data, b"hello");

    let leftovers = std::fs::read_dir(dir.path().join("staging")).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_non_zero_exit_includes_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "echo 'boom: missing module' >&2\nexit 1\n");
    let err = extractor(script, Duration::from_secs(10))
        .run(&[dir.path().join("a.pdf")], &["a".to_string()], dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Extraction(ref m) if m.contains("boom: missing module")));
}

#[tokio::test]
async fn test_blank_stdout_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "exit 0\n");
    let err = extractor(script, Duration::from_secs(10))
        .run(&[dir.path().join("a.pdf")], &["a".to_string()], dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Extraction(ref m) if m.contains("no output")));
}

#[tokio::test]
async fn test_non_json_stdout_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "echo 'Loading models...'\n");
    let err = extractor(script, Duration::from_secs(10))
        .run(&[dir.path().join("a.pdf")], &["a".to_string()], dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Extraction(ref m) if m.contains("not valid JSON")));
}

#[tokio::test]
async fn test_timeout_kills_parser() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "sleep 30\n");
    let started = std::time::Instant::now();
    let err = extractor(script, Duration::from_millis(300))
        .run(&[dir.path().join("a.pdf")], &["a".to_string()], dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Extraction(ref m) if m.contains("timed out")));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_background_process_holding_stderr_does_not_block() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "sleep 8 >/dev/null &\nprintf '{\"summary\":[],\"text_chunks\":[],\"image_chunks\":[]}'\n",
    );
    let started = std::time::Instant::now();
    let output = extractor(script, Duration::from_secs(30))
        .run(&[dir.path().join("a.pdf")], &["a".to_string()], dir.path())
        .await
        .unwrap();
    assert!(output.summary.is_empty());
    assert!(started.elapsed() < Duration::from_secs(6));
}

#[tokio::test]
async fn test_batch_failure_through_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "exit 2\n");
    let pipeline = IngestPipeline::new(
        Arc::new(extractor(script, Duration::from_secs(10))),
        Arc::new(EventBus::new(32)),
        StagingArea::new(dir.path().join("staging")),
    );
    let store = RecordingStore::default();

    let report = pipeline
        .ingest(
            &store,
            vec![
                FileInput::bytes("one.pdf", b"%PDF-1".to_vec()),
                FileInput::bytes("two.pdf", b"%PDF-2".to_vec()),
            ],
        )
        .await
        .unwrap();

    assert_eq!(report.count(DocumentStatus::Error), 2);
    assert!(store.committed.lock().unwrap().is_empty());
}
