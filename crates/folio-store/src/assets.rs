//! Asset records for the two cache indices.
//!
//! [`PdfAsset`] tracks a raw downloaded PDF, [`TranslateAsset`] its
//! machine-translated counterpart. Both are keyed by paper id and mutated
//! only through their owning pipeline. Patch types enumerate exactly the
//! fields eligible for update; `error` uses a double option so `Some(None)`
//! clears a stale message.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheRecord;

// ─────────────────────────────────────────────────────────────────────────────
// Raw-PDF assets
// ─────────────────────────────────────────────────────────────────────────────

/// Download lifecycle of a raw PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PdfStatus {
    /// A download is in flight.
    Downloading,
    /// The file is on disk and validated.
    Ready,
    /// The last attempt failed; see `error`.
    Failed,
}

impl PdfStatus {
    /// Wire string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Downloading => "DOWNLOADING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PdfStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached raw-PDF artifact for one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfAsset {
    /// Paper id (index key).
    pub paper_id: String,
    /// Source URL the file was (or will be) fetched from.
    pub pdf_url: String,
    /// Destination path on local disk.
    pub local_path: PathBuf,
    /// Current lifecycle status.
    pub status: PdfStatus,
    /// File size in bytes; 0 until the download completes.
    pub size_bytes: u64,
    /// SHA-256 of the file content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// When the download completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<DateTime<Utc>>,
    /// Human-readable failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PdfAsset {
    /// A fresh record for a download that is about to start.
    #[must_use]
    pub fn downloading(
        paper_id: impl Into<String>,
        pdf_url: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            paper_id: paper_id.into(),
            pdf_url: pdf_url.into(),
            local_path: local_path.into(),
            status: PdfStatus::Downloading,
            size_bytes: 0,
            sha256: None,
            downloaded_at: None,
            error: None,
        }
    }
}

/// Partial update for a [`PdfAsset`].
#[derive(Debug, Default)]
pub struct PdfAssetPatch {
    /// New status.
    pub status: Option<PdfStatus>,
    /// New source URL.
    pub pdf_url: Option<String>,
    /// New destination path.
    pub local_path: Option<PathBuf>,
    /// New size.
    pub size_bytes: Option<u64>,
    /// New digest.
    pub sha256: Option<String>,
    /// New completion timestamp.
    pub downloaded_at: Option<DateTime<Utc>>,
    /// `Some(Some(_))` records a failure, `Some(None)` clears a stale one.
    pub error: Option<Option<String>>,
}

impl CacheRecord for PdfAsset {
    type Patch = PdfAssetPatch;

    fn key(&self) -> &str {
        &self.paper_id
    }

    fn apply(&mut self, patch: PdfAssetPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(pdf_url) = patch.pdf_url {
            self.pdf_url = pdf_url;
        }
        if let Some(local_path) = patch.local_path {
            self.local_path = local_path;
        }
        if let Some(size_bytes) = patch.size_bytes {
            self.size_bytes = size_bytes;
        }
        if let Some(sha256) = patch.sha256 {
            self.sha256 = Some(sha256);
        }
        if let Some(downloaded_at) = patch.downloaded_at {
            self.downloaded_at = Some(downloaded_at);
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Translated assets
// ─────────────────────────────────────────────────────────────────────────────

/// Translation lifecycle of a paper's PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranslateStatus {
    /// Queued, no work started.
    Pending,
    /// The translator subprocess is running.
    Running,
    /// Translated output is on disk.
    Ready,
    /// The last attempt failed; see `error`.
    Failed,
}

impl TranslateStatus {
    /// Wire string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TranslateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached translated artifact for one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateAsset {
    /// Paper id (index key).
    pub paper_id: String,
    /// Current lifecycle status.
    pub status: TranslateStatus,
    /// Single-language translated PDF.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mono_path: Option<PathBuf>,
    /// Bilingual side-by-side PDF, when kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dual_path: Option<PathBuf>,
    /// Progress fraction in `[0, 1]`.
    pub progress: f32,
    /// Human-readable failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranslateAsset {
    /// A fresh record for a translation that is queued but not started.
    #[must_use]
    pub fn pending(paper_id: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            status: TranslateStatus::Pending,
            mono_path: None,
            dual_path: None,
            progress: 0.0,
            error: None,
        }
    }
}

/// Partial update for a [`TranslateAsset`].
#[derive(Debug, Default)]
pub struct TranslateAssetPatch {
    /// New status.
    pub status: Option<TranslateStatus>,
    /// New mono output path.
    pub mono_path: Option<PathBuf>,
    /// `Some(Some(_))` sets the dual path, `Some(None)` clears it.
    pub dual_path: Option<Option<PathBuf>>,
    /// New progress fraction.
    pub progress: Option<f32>,
    /// `Some(Some(_))` records a failure, `Some(None)` clears a stale one.
    pub error: Option<Option<String>>,
}

impl CacheRecord for TranslateAsset {
    type Patch = TranslateAssetPatch;

    fn key(&self) -> &str {
        &self.paper_id
    }

    fn apply(&mut self, patch: TranslateAssetPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(mono_path) = patch.mono_path {
            self.mono_path = Some(mono_path);
        }
        if let Some(dual_path) = patch.dual_path {
            self.dual_path = dual_path;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_status_wire_strings() {
        assert_eq!(
            serde_json::to_string(&PdfStatus::Downloading).unwrap(),
            "\"DOWNLOADING\""
        );
        assert_eq!(
            serde_json::to_string(&PdfStatus::Ready).unwrap(),
            "\"READY\""
        );
        assert_eq!(
            serde_json::to_string(&PdfStatus::Failed).unwrap(),
            "\"FAILED\""
        );
    }

    #[test]
    fn translate_status_wire_strings() {
        for (status, wire) in [
            (TranslateStatus::Pending, "\"PENDING\""),
            (TranslateStatus::Running, "\"RUNNING\""),
            (TranslateStatus::Ready, "\"READY\""),
            (TranslateStatus::Failed, "\"FAILED\""),
        ] {
            assert_eq!(serde_json::to_string(&status).unwrap(), wire);
        }
    }

    #[test]
    fn pdf_asset_serde_roundtrip() {
        let asset = PdfAsset {
            paper_id: "2401.00001".into(),
            pdf_url: "https://arxiv.org/pdf/2401.00001.pdf".into(),
            local_path: PathBuf::from("/data/pdf/raw/2401.00001.pdf"),
            status: PdfStatus::Ready,
            size_bytes: 1_234_567,
            sha256: Some("ab".repeat(32)),
            downloaded_at: Some(Utc::now()),
            error: None,
        };
        let json = serde_json::to_string(&asset).unwrap();
        let back: PdfAsset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, asset);
        assert!(json.contains("paperId"));
        assert!(json.contains("localPath"));
        assert!(!json.contains("error"));
    }

    #[test]
    fn pdf_patch_merges_and_clears_error() {
        let mut asset = PdfAsset::downloading("a", "u", "/tmp/a.pdf");
        asset.apply(PdfAssetPatch {
            status: Some(PdfStatus::Failed),
            error: Some(Some("connection reset".into())),
            ..PdfAssetPatch::default()
        });
        assert_eq!(asset.status, PdfStatus::Failed);
        assert_eq!(asset.error.as_deref(), Some("connection reset"));

        asset.apply(PdfAssetPatch {
            status: Some(PdfStatus::Ready),
            size_bytes: Some(2048),
            sha256: Some("deadbeef".into()),
            error: Some(None),
            ..PdfAssetPatch::default()
        });
        assert_eq!(asset.status, PdfStatus::Ready);
        assert_eq!(asset.size_bytes, 2048);
        assert!(asset.error.is_none());
        // Untouched fields survive the merge.
        assert_eq!(asset.pdf_url, "u");
    }

    #[test]
    fn translate_asset_pending_defaults() {
        let asset = TranslateAsset::pending("2401.00001");
        assert_eq!(asset.status, TranslateStatus::Pending);
        assert!(asset.mono_path.is_none());
        assert!((asset.progress - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn translate_patch_sets_outputs_and_progress() {
        let mut asset = TranslateAsset::pending("a");
        asset.apply(TranslateAssetPatch {
            status: Some(TranslateStatus::Ready),
            mono_path: Some(PathBuf::from("/out/a-mono.pdf")),
            dual_path: Some(Some(PathBuf::from("/out/a-dual.pdf"))),
            progress: Some(1.0),
            error: Some(None),
        });
        assert_eq!(asset.status, TranslateStatus::Ready);
        assert_eq!(asset.mono_path.as_deref().unwrap().to_str(), Some("/out/a-mono.pdf"));
        assert!(asset.dual_path.is_some());
        assert!((asset.progress - 1.0).abs() < f32::EPSILON);

        // A later patch can drop the dual path without touching mono.
        asset.apply(TranslateAssetPatch {
            dual_path: Some(None),
            ..TranslateAssetPatch::default()
        });
        assert!(asset.dual_path.is_none());
        assert!(asset.mono_path.is_some());
    }
}
