//! Server configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `HOST` / `PORT` | `0.0.0.0` / `3000` |
//! | `DATABASE_URL` | unset (connect later through the API) |
//! | `AUTO_MIGRATE` | `true` |
//! | `EXTRACTOR_BACKEND` | `process` (`process` or `pdftotext`) |
//! | `EXTRACTOR_PROGRAM` / `EXTRACTOR_SCRIPT` | `python3` / `parser/scripts/uni_processor.py` |
//! | `EXTRACTOR_TIMEOUT_SECS` | `600` |
//! | `STAGING_DIR` | `<system temp>/docshelf` |
//! | `EXPORT_DIR` | unset |
//! | `EVENT_BUS_CAPACITY` | `256` |
//! | `MAX_BODY_SIZE_BYTES` | 512 MiB |
//! | `DB_MAX_CONNECTIONS` / `DB_CONNECT_TIMEOUT_SECS` | `10` / `10` |
//! | `ALLOWED_ORIGINS` | local dev origins, comma separated |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use docshelf_core::defaults::{
    DB_CONNECT_TIMEOUT_SECS, DB_MAX_CONNECTIONS, EVENT_BUS_CAPACITY, EXTRACTOR_PROGRAM,
    EXTRACTOR_SCRIPT, EXTRACTOR_TIMEOUT_SECS, MAX_BODY_SIZE_BYTES, SERVER_HOST, SERVER_PORT,
};
use docshelf_core::{Error, Result};

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173,tauri://localhost";

/// Which extractor implementation the pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorBackend {
    /// External parser process.
    Process,
    /// In-process `pdftotext` with local chunking.
    PdfToText,
}

impl FromStr for ExtractorBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(ExtractorBackend::Process),
            "pdftotext" | "pdf_text" => Ok(ExtractorBackend::PdfToText),
            other => Err(Error::Config(format!(
                "EXTRACTOR_BACKEND must be 'process' or 'pdftotext', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub auto_migrate: bool,
    pub extractor_backend: ExtractorBackend,
    pub extractor_program: PathBuf,
    pub extractor_script: Option<PathBuf>,
    pub extractor_timeout: Duration,
    pub staging_dir: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
    pub event_bus_capacity: usize,
    pub max_body_size: usize,
    pub db_max_connections: u32,
    pub db_connect_timeout: Duration,
    pub allowed_origins: Vec<String>,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // An empty EXTRACTOR_SCRIPT runs the program without a script argument.
        let extractor_script = match lookup("EXTRACTOR_SCRIPT") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(PathBuf::from(v)),
            None => Some(PathBuf::from(EXTRACTOR_SCRIPT)),
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| SERVER_HOST.to_string()),
            port: parse_or(&get, "PORT", SERVER_PORT)?,
            database_url: get("DATABASE_URL"),
            auto_migrate: parse_bool(get("AUTO_MIGRATE").as_deref(), true),
            extractor_backend: get("EXTRACTOR_BACKEND")
                .map(|v| v.parse::<ExtractorBackend>())
                .transpose()?
                .unwrap_or(ExtractorBackend::Process),
            extractor_program: get("EXTRACTOR_PROGRAM")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(EXTRACTOR_PROGRAM)),
            extractor_script,
            extractor_timeout: Duration::from_secs(parse_or(
                &get,
                "EXTRACTOR_TIMEOUT_SECS",
                EXTRACTOR_TIMEOUT_SECS,
            )?),
            staging_dir: get("STAGING_DIR").map(PathBuf::from),
            export_dir: get("EXPORT_DIR").map(PathBuf::from),
            event_bus_capacity: parse_or(&get, "EVENT_BUS_CAPACITY", EVENT_BUS_CAPACITY)?.max(1),
            max_body_size: parse_or(&get, "MAX_BODY_SIZE_BYTES", MAX_BODY_SIZE_BYTES)?,
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS)?,
            db_connect_timeout: Duration::from_secs(parse_or(
                &get,
                "DB_CONNECT_TIMEOUT_SECS",
                DB_CONNECT_TIMEOUT_SECS,
            )?),
            allowed_origins: get("ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if v == "true" || v == "1" || v == "yes" => true,
        Some(v) if v == "false" || v == "0" || v == "no" => false,
        _ => default,
    }
}
