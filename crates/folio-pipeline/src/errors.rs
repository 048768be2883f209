//! Error taxonomy for the pipelines.
//!
//! Everything here surfaces to the immediate caller. Best-effort cleanup
//! (temp-file removal, dual-file deletion, lock-file removal) is
//! logged-and-continued instead, and every `FAILED` asset or task record
//! carries a human-readable error string so state is inspectable without
//! log access.

use std::path::PathBuf;

use thiserror::Error;

use folio_store::CacheError;

/// Errors from the download pipeline.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The reference could not be mapped to a paper. Not retryable as-is;
    /// the caller should refresh session memory or pass a concrete ref.
    #[error("could not resolve reference to a paper: {0}")]
    Resolution(String),
    /// The per-destination lock was not acquired within bounded retries.
    /// The caller may retry later.
    #[error("download lock busy: {path} (another download may be in progress)")]
    LockBusy {
        /// The contended lock file.
        path: PathBuf,
    },
    /// The fetched content failed the size/magic-byte check — typically an
    /// HTML error or redirect page masquerading as success.
    #[error("downloaded content does not look like a valid PDF: {reason}")]
    Validation {
        /// What the check rejected.
        reason: String,
    },
    /// The source URL did not parse.
    #[error("invalid pdf url {url}: {source}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Underlying parse error.
        source: url::ParseError,
    },
    /// The HTTP request failed (connect, read, or status).
    #[error("pdf request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Local filesystem I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The cache index could not be read or persisted.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Errors from the translation pipeline.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// The input PDF is not on disk.
    #[error("input pdf not found: {0}")]
    InputMissing(PathBuf),
    /// The translator executable is neither directly executable nor on the
    /// search path.
    #[error(
        "translator executable not found: {name}. Install it (pip install pdf2zh) \
         or point translator.bin / FOLIO_PDF2ZH_BIN at the executable"
    )]
    TranslatorMissing {
        /// The configured executable name or path.
        name: String,
    },
    /// The translator exited non-zero; the tail of its output is attached.
    #[error("translator exited with code {code}\n---- tail ----\n{tail}")]
    Process {
        /// Subprocess exit code (-1 when killed by signal).
        code: i32,
        /// Last captured output segments.
        tail: String,
    },
    /// The run succeeded but no expected output file exists.
    #[error("translated output not found; probed: {}", probed.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    OutputNotFound {
        /// Every candidate path that was probed.
        probed: Vec<PathBuf>,
    },
    /// Local filesystem or subprocess I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the translate-task orchestration service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The reference could not be mapped to a paper.
    #[error("could not resolve reference to a paper: {0}")]
    Resolution(String),
    /// The raw PDF is not downloaded and validated yet.
    #[error("raw pdf for {paper_id} is not ready; download it first")]
    PdfNotReady {
        /// The paper whose PDF is missing.
        paper_id: String,
    },
    /// The cache index could not be read or persisted.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_not_found_lists_all_candidates() {
        let err = TranslateError::OutputNotFound {
            probed: vec![
                PathBuf::from("/out/x-mono.pdf"),
                PathBuf::from("/out/x-zh.pdf"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("/out/x-mono.pdf"));
        assert!(msg.contains("/out/x-zh.pdf"));
    }

    #[test]
    fn process_error_carries_tail() {
        let err = TranslateError::Process {
            code: 3,
            tail: "boom: out of memory".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("code 3"));
        assert!(msg.contains("boom: out of memory"));
    }

    #[test]
    fn translator_missing_has_remediation_hint() {
        let err = TranslateError::TranslatorMissing {
            name: "pdf2zh".into(),
        };
        assert!(err.to_string().contains("pip install pdf2zh"));
    }
}
