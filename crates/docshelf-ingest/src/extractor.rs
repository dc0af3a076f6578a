//! Process-backed extractor.
//!
//! Spawns the external parser once per batch:
//!
//! ```text
//! <program> [script] --input-files <p1> <p2> .. --original-stems <s1> <s2> .. --output-dir <dir>
//! ```
//!
//! and parses the single JSON document it prints on stdout.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use docshelf_core::defaults::{EXTRACTOR_PROGRAM, EXTRACTOR_SCRIPT, EXTRACTOR_TIMEOUT_SECS};
use docshelf_core::{Error, ExtractionOutput, Extractor, Result};

/// Number of stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// How long to keep reading stderr after the parser exits. Background
/// processes it started may hold the pipe open.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How to launch the parser process.
#[derive(Debug, Clone)]
pub struct ProcessExtractorConfig {
    /// Executable to run.
    pub program: PathBuf,
    /// Script passed as the first argument, when the program is an interpreter.
    pub script: Option<PathBuf>,
    /// Upper bound on one run; the child is killed afterwards.
    pub timeout: Duration,
}

impl Default for ProcessExtractorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(EXTRACTOR_PROGRAM),
            script: Some(PathBuf::from(EXTRACTOR_SCRIPT)),
            timeout: Duration::from_secs(EXTRACTOR_TIMEOUT_SECS),
        }
    }
}

/// Runs the external parser as a child process.
pub struct ProcessExtractor {
    config: ProcessExtractorConfig,
}

impl ProcessExtractor {
    pub fn new(config: ProcessExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessExtractorConfig {
        &self.config
    }

    fn command(&self, inputs: &[PathBuf], stems: &[String], out_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.config.program);
        if let Some(script) = &self.config.script {
            cmd.arg(script);
        }
        cmd.arg("--input-files")
            .args(inputs)
            .arg("--original-stems")
            .args(stems)
            .arg("--output-dir")
            .arg(out_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Parse the parser's stdout into an [`ExtractionOutput`].
pub fn parse_output(stdout: &str) -> Result<ExtractionOutput> {
    if stdout.trim().is_empty() {
        return Err(Error::Extraction(
            "parser exited successfully but produced no output".to_string(),
        ));
    }
    serde_json::from_str(stdout.trim())
        .map_err(|e| Error::Extraction(format!("parser output is not valid JSON: {}", e)))
}

async fn finish_stderr_reader(task: Option<JoinHandle<()>>) {
    let Some(mut task) = task else {
        return;
    };
    match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(
            subsystem = "ingest",
            component = "extractor",
            error = %e,
            "Parser stderr reader failed"
        ),
        Err(_) => {
            task.abort();
            debug!(
                subsystem = "ingest",
                component = "extractor",
                "Parser stderr still open after exit; reader stopped"
            );
        }
    }
}

fn stderr_summary(tail: &VecDeque<String>) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {}", tail.iter().cloned().collect::<Vec<_>>().join(" | "))
    }
}

#[async_trait]
impl Extractor for ProcessExtractor {
    async fn run(
        &self,
        inputs: &[PathBuf],
        stems: &[String],
        out_dir: &Path,
    ) -> Result<ExtractionOutput> {
        if inputs.len() != stems.len() {
            return Err(Error::InvalidInput(format!(
                "{} inputs but {} stems",
                inputs.len(),
                stems.len()
            )));
        }
        let start = Instant::now();
        let mut child = self.command(inputs, stems, out_dir).spawn().map_err(|e| {
            Error::Extraction(format!(
                "failed to start {}: {}",
                self.config.program.display(),
                e
            ))
        })?;

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr_task = child.stderr.take().map(|stderr| {
            let tail = Arc::clone(&tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(
                        subsystem = "ingest",
                        component = "extractor",
                        "parser: {}",
                        line
                    );
                    let mut tail = tail.lock().await;
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            })
        });
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("parser stdout not captured".to_string()))?;

        let run = async {
            let mut buf = String::new();
            stdout.read_to_string(&mut buf).await?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, buf))
        };

        let outcome = tokio::time::timeout(self.config.timeout, run).await;
        let (status, stdout) = match outcome {
            Ok(result) => result.map_err(|e| Error::Extraction(format!("parser I/O failed: {}", e)))?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out parser");
                }
                if let Some(task) = &stderr_task {
                    task.abort();
                }
                return Err(Error::Extraction(format!(
                    "parser timed out after {}s",
                    self.config.timeout.as_secs()
                )));
            }
        };

        finish_stderr_reader(stderr_task).await;

        if !status.success() {
            let tail = tail.lock().await;
            return Err(Error::Extraction(format!(
                "parser failed ({}){}",
                status,
                stderr_summary(&tail)
            )));
        }

        let output = parse_output(&stdout)?;
        info!(
            subsystem = "ingest",
            component = "extractor",
            op = "run",
            file_count = inputs.len(),
            chunk_count = output.text_chunks.len(),
            image_count = output.image_chunks.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Parser finished"
        );
        Ok(output)
    }

    async fn health_check(&self) -> Result<bool> {
        if let Some(script) = &self.config.script {
            if !tokio::fs::try_exists(script).await.unwrap_or(false) {
                return Ok(false);
            }
        }
        match Command::new(&self.config.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
        {
            Ok(output) => Ok(output.status.success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "process"
    }
}
