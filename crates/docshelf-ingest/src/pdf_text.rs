//! In-process extractor built on `pdftotext` (poppler-utils).
//!
//! Runs `pdftotext` once per file, then cleans and chunks the text locally.
//! Produces the same [`ExtractionOutput`] shape as the external parser but
//! never yields images.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, warn};

use docshelf_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use docshelf_core::{
    Error, ExtractionOutput, Extractor, FileSummary, Result, TextChunk, EXTRACTION_SUCCESS,
};

use crate::chunker::TextChunker;

/// Run a command with a timeout, returning stdout as a string.
async fn run_cmd_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<String> {
    let output = tokio::time::timeout(timeout, cmd.kill_on_drop(true).output())
        .await
        .map_err(|_| {
            Error::Extraction(format!(
                "External command timed out after {}s",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| Error::Extraction(format!("Failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Extraction(format!(
            "Command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extracts text with `pdftotext` and chunks it with [`TextChunker`].
pub struct PdfTextExtractor {
    chunker: TextChunker,
    timeout: Duration,
}

impl PdfTextExtractor {
    pub fn new(chunker: TextChunker) -> Self {
        Self {
            chunker,
            timeout: Duration::from_secs(EXTRACTION_CMD_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn extract_file(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = tokio::fs::read(path).await?;
        if bytes.len() < 4 || &bytes[0..4] != b"%PDF" {
            return Err(Error::InvalidInput(format!(
                "'{}' is not a valid PDF (missing %PDF header)",
                path.display()
            )));
        }
        let text = run_cmd_with_timeout(
            Command::new("pdftotext").arg(path).arg("-"),
            self.timeout,
        )
        .await?;
        Ok(self.chunker.chunk(&text))
    }
}

impl Default for PdfTextExtractor {
    fn default() -> Self {
        Self::new(TextChunker::default())
    }
}

#[async_trait]
impl Extractor for PdfTextExtractor {
    async fn run(
        &self,
        inputs: &[PathBuf],
        stems: &[String],
        _out_dir: &Path,
    ) -> Result<ExtractionOutput> {
        if inputs.len() != stems.len() {
            return Err(Error::InvalidInput(format!(
                "{} inputs but {} stems",
                inputs.len(),
                stems.len()
            )));
        }

        let mut output = ExtractionOutput::default();
        for (path, stem) in inputs.iter().zip(stems) {
            let base_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            match self.extract_file(path).await {
                Ok(chunks) => {
                    debug!(
                        subsystem = "ingest",
                        component = "pdf_text",
                        file_name = %base_name,
                        chunk_count = chunks.len(),
                        "Text extracted"
                    );
                    output
                        .text_chunks
                        .extend(chunks.into_iter().enumerate().map(|(i, text)| TextChunk {
                            source: stem.clone(),
                            text,
                            metadata: Some(json!({ "chunk_index": i })),
                        }));
                    output.summary.push(FileSummary {
                        base_name,
                        status: EXTRACTION_SUCCESS.to_string(),
                        message: None,
                    });
                }
                Err(e) => {
                    warn!(
                        subsystem = "ingest",
                        component = "pdf_text",
                        file_name = %base_name,
                        error = %e,
                        "Text extraction failed"
                    );
                    output.summary.push(FileSummary {
                        base_name,
                        status: "error".to_string(),
                        message: Some(e.to_string()),
                    });
                }
            }
        }
        Ok(output)
    }

    async fn health_check(&self) -> Result<bool> {
        match Command::new("pdftotext").arg("-v").output().await {
            // pdftotext -v exits with 0 or 99 depending on the version.
            Ok(output) => Ok(output.status.success() || output.status.code() == Some(99)),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "pdf_text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal valid PDF containing a single line of text.
    const HELLO_PDF: &[u8] = b"%PDF-1.0
1 0 obj
<< /Type /Catalog /Pages 2 0 R >>
endobj

2 0 obj
<< /Type /Pages /Kids [3 0 R] /Count 1 >>
endobj

3 0 obj
<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792]
   /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>
endobj

4 0 obj
<< /Length 86 >>
stream
BT /F1 12 Tf 100 700 Td (Hello World from the docshelf quarterly archive report) Tj ET
endstream
endobj

5 0 obj
<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>
endobj

xref
0 6
0000000000 65535 f
0000000009 00000 n
0000000059 00000 n
0000000117 00000 n
0000000247 00000 n
0000000384 00000 n

trailer
<< /Size 6 /Root 1 0 R >>
startxref
455
%%EOF";

    #[test]
    fn test_pdf_text_name() {
        assert_eq!(PdfTextExtractor::default().name(), "pdf_text");
    }

    #[tokio::test]
    async fn test_pdf_text_health_check() {
        // Passes whether or not pdftotext is installed.
        assert!(PdfTextExtractor::default().health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_pdf_reported_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.pdf");
        std::fs::write(&bad, b"not a pdf at all").unwrap();

        let output = PdfTextExtractor::default()
            .run(&[bad], &["bad".to_string()], dir.path())
            .await
            .unwrap();

        assert!(!output.succeeded("bad.pdf"));
        assert!(output
            .failure_message("bad.pdf")
            .unwrap()
            .contains("not a valid PDF"));
        assert!(output.text_chunks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_reported_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = PdfTextExtractor::default()
            .run(&[dir.path().join("gone.pdf")], &["gone".to_string()], dir.path())
            .await
            .unwrap();
        assert_eq!(output.summary.len(), 1);
        assert_eq!(output.summary[0].status, "error");
    }

    #[tokio::test]
    async fn test_pdf_text_extraction() {
        let extractor = PdfTextExtractor::default();
        if !extractor.health_check().await.unwrap_or(false) {
            eprintln!("Skipping test_pdf_text_extraction: pdftotext not installed");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.pdf");
        std::fs::write(&path, HELLO_PDF).unwrap();

        let output = extractor
            .run(&[path], &["hello".to_string()], dir.path())
            .await
            .unwrap();

        assert!(output.succeeded("hello.pdf"), "summary: {:?}", output.summary);
        let chunks: Vec<_> = output.text_for("hello").collect();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("Hello World"));
        assert_eq!(chunks[0].metadata, Some(json!({ "chunk_index": 0 })));
    }
}
