//! Configuration for the Folio core.
//!
//! Settings are loaded from two layers (in priority order):
//! 1. **Compiled defaults** — [`FolioConfig::default()`]
//! 2. **Config file** — a JSON file merged over defaults via `#[serde(default)]`
//!
//! with two environment overrides applied last: `FOLIO_DATA_DIR` (root data
//! directory) and `FOLIO_PDF2ZH_BIN` (translator executable).
//!
//! There is no global singleton: the embedding program builds one
//! [`FolioConfig`] and passes it (or the values derived from it) into every
//! component that needs it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The config file is not valid JSON for the expected shape.
    #[error("config file {path} is not valid: {source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },
}

/// Session short-term-memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Minutes before a session's cached papers and last-active id expire.
    pub ttl_minutes: u64,
    /// Maximum papers kept per session.
    pub max_papers: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 60,
            max_papers: 50,
        }
    }
}

impl SessionConfig {
    /// TTL as a [`Duration`].
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }
}

/// External translator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslatorConfig {
    /// Translator executable name or path.
    pub bin: String,
    /// Translation service selector passed to the tool.
    pub service: String,
    /// Worker thread count passed to the tool.
    pub threads: u32,
    /// Keep the bilingual side-by-side output.
    pub keep_dual: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            bin: "pdf2zh".into(),
            service: "bing".into(),
            threads: 4,
            keep_dual: false,
        }
    }
}

/// Download behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownloadConfig {
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Attempts to acquire the per-destination lock before giving up.
    pub lock_retries: u32,
    /// Fixed delay between lock attempts, in milliseconds.
    pub lock_retry_delay_ms: u64,
    /// Bodies smaller than this are rejected as not-a-PDF.
    pub min_pdf_bytes: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            read_timeout_secs: 120,
            lock_retries: 150,
            lock_retry_delay_ms: 200,
            min_pdf_bytes: 1024,
        }
    }
}

/// Top-level Folio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolioConfig {
    /// Root directory for all persisted state.
    pub data_dir: PathBuf,
    /// Session memory settings.
    pub session: SessionConfig,
    /// Translator settings.
    pub translator: TranslatorConfig,
    /// Download settings.
    pub download: DownloadConfig,
}

impl Default for FolioConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./output"),
            session: SessionConfig::default(),
            translator: TranslatorConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}

impl FolioConfig {
    /// Load configuration from a JSON file over compiled defaults, then
    /// apply environment overrides. A missing file yields the defaults
    /// (still with env overrides applied).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("FOLIO_DATA_DIR") {
            if !dir.is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(bin) = std::env::var("FOLIO_PDF2ZH_BIN") {
            if !bin.is_empty() {
                self.translator.bin = bin;
            }
        }
    }

    /// Directory holding raw downloaded PDFs.
    #[must_use]
    pub fn raw_pdf_dir(&self) -> PathBuf {
        self.data_dir.join("pdf").join("raw")
    }

    /// Directory holding translated PDFs.
    #[must_use]
    pub fn translated_dir(&self) -> PathBuf {
        self.data_dir.join("pdf").join("translated")
    }

    /// Path of the raw-PDF cache index file.
    #[must_use]
    pub fn pdf_cache_path(&self) -> PathBuf {
        self.data_dir.join("pdf_cache.json")
    }

    /// Path of the translated-asset cache index file.
    #[must_use]
    pub fn translate_cache_path(&self) -> PathBuf {
        self.data_dir.join("translate_cache.json")
    }

    /// Directory holding translator transcript logs.
    #[must_use]
    pub fn transcript_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
