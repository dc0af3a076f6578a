//! Save a stored document's original bytes to disk.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use docshelf_core::{sanitize_filename, RawFile, Result, SaveLocationPicker, SaveOutcome};

/// Picks `<dir>/<sanitized name>`, or cancels when no directory is known.
#[derive(Debug, Clone, Default)]
pub struct DirectoryPicker {
    dir: Option<PathBuf>,
}

impl DirectoryPicker {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl SaveLocationPicker for DirectoryPicker {
    async fn pick(&self, suggested_name: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(sanitize_filename(suggested_name)))
    }
}

/// Ask `picker` for a location and write `raw` there.
///
/// A blank suggested name falls back to the stored file name.
pub async fn write_export(
    picker: &dyn SaveLocationPicker,
    raw: &RawFile,
    suggested_name: Option<&str>,
) -> Result<SaveOutcome> {
    let name = suggested_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(&raw.file_name);

    let Some(path) = picker.pick(name).await else {
        return Ok(SaveOutcome::Canceled);
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &raw.data).await?;

    info!(
        subsystem = "api",
        component = "export",
        op = "save",
        path = %path.display(),
        bytes = raw.data.len(),
        "Document saved to disk"
    );
    Ok(SaveOutcome::Saved { path })
}
