//! Download pipeline: reference → validated PDF on disk, exactly once.
//!
//! Flow: resolve the reference through session memory, normalize the source
//! URL, derive a sanitized destination, then either take the fast path (file
//! already present and non-empty) or the slow path — per-destination file
//! lock, stream to `<dest>.part` with incremental hashing, size/magic-byte
//! validation, atomic rename into place — updating the raw-PDF cache index
//! at every transition.
//!
//! Key rules:
//!
//! - Touching a paper (any resolved download request) updates the session's
//!   `last_active_paper_id`.
//! - The fast path repairs an inconsistent cache record to `READY` rather
//!   than re-downloading.
//! - The fast path is re-checked after lock acquisition, so of two
//!   concurrent requests for the same paper exactly one performs network I/O.
//! - The lock sentinel is removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use folio_core::FolioConfig;
use folio_store::{CacheIndex, PaperRef, PdfAsset, PdfAssetPatch, PdfStatus, SessionStore};

use crate::errors::DownloadError;
use crate::lock::PathLock;

const USER_AGENT: &str = "folio/0.1 (+pdf fetcher)";
const PDF_MAGIC: &[u8] = b"%PDF";

/// Runs of anything outside this set collapse to a single `_`.
static UNSAFE_FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static regex"));

/// Sanitize an identifier into a filename: only `[A-Za-z0-9._-]` survive,
/// other runs collapse to `_`, leading/trailing `_` are trimmed.
#[must_use]
pub fn safe_filename(name: &str) -> String {
    UNSAFE_FILENAME_RE
        .replace_all(name, "_")
        .trim_matches('_')
        .to_string()
}

/// Canonical arXiv PDF URL for a bare paper id.
#[must_use]
pub fn fallback_pdf_url(paper_id: &str) -> String {
    format!("https://arxiv.org/pdf/{paper_id}.pdf")
}

/// Normalize a PDF URL so its path always ends in `.pdf` — arXiv feeds
/// sometimes omit the extension.
pub fn normalize_pdf_url(raw: &str) -> Result<String, DownloadError> {
    let trimmed = raw.trim();
    let mut url = Url::parse(trimmed).map_err(|source| DownloadError::InvalidUrl {
        url: trimmed.to_string(),
        source,
    })?;
    let path = url.path().trim_end_matches('/').to_string();
    if path.ends_with(".pdf") {
        url.set_path(&path);
    } else {
        url.set_path(&format!("{path}.pdf"));
    }
    Ok(url.to_string())
}

/// What a completed download request reports back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    /// Session the request was made under.
    pub session_id: String,
    /// Resolved paper id.
    pub paper_id: String,
    /// Normalized source URL.
    pub pdf_url: String,
    /// Where the file lives.
    pub local_path: PathBuf,
    /// Final status; always `READY` on success.
    pub status: PdfStatus,
    /// Whether the file was already on disk (no network I/O performed).
    pub existed: bool,
    /// File size in bytes.
    pub size_bytes: u64,
    /// SHA-256 of the content, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Resolves references, downloads PDFs, and maintains the raw-PDF cache.
pub struct DownloadPipeline {
    http: reqwest::Client,
    raw_dir: PathBuf,
    sessions: Arc<SessionStore>,
    pdf_cache: Arc<CacheIndex<PdfAsset>>,
    lock_retries: u32,
    lock_delay: Duration,
    min_pdf_bytes: u64,
}

impl DownloadPipeline {
    /// Build a pipeline from configuration and the shared stores.
    pub fn new(
        config: &FolioConfig,
        sessions: Arc<SessionStore>,
        pdf_cache: Arc<CacheIndex<PdfAsset>>,
    ) -> Result<Self, DownloadError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.download.connect_timeout_secs))
            .timeout(Duration::from_secs(config.download.read_timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            raw_dir: config.raw_pdf_dir(),
            sessions,
            pdf_cache,
            lock_retries: config.download.lock_retries,
            lock_delay: Duration::from_millis(config.download.lock_retry_delay_ms),
            min_pdf_bytes: config.download.min_pdf_bytes,
        })
    }

    /// Download the referenced paper's PDF into the raw directory.
    ///
    /// With `force` false an existing non-empty destination short-circuits
    /// without network I/O; with `force` true the file is re-fetched.
    pub async fn download(
        &self,
        session_id: &str,
        reference: &PaperRef,
        force: bool,
    ) -> Result<DownloadOutcome, DownloadError> {
        let (paper_id, source_url) = self.resolve(session_id, reference)?;
        // Any operation on a paper counts as touching it.
        self.sessions.set_last_active_paper_id(session_id, &paper_id);

        let pdf_url = normalize_pdf_url(&source_url)?;
        let dest = self.raw_dir.join(format!("{}.pdf", safe_filename(&paper_id)));

        if !force {
            if let Some(outcome) = self.fast_path(session_id, &paper_id, &pdf_url, &dest)? {
                debug!(%paper_id, path = %dest.display(), "pdf already on disk");
                return Ok(outcome);
            }
        }

        tokio::fs::create_dir_all(&self.raw_dir).await?;
        let _lock =
            PathLock::acquire(lock_path(&dest), self.lock_retries, self.lock_delay).await?;

        // A concurrent winner may have completed while we waited on the lock.
        if !force {
            if let Some(outcome) = self.fast_path(session_id, &paper_id, &pdf_url, &dest)? {
                debug!(%paper_id, "destination appeared while waiting for the lock");
                return Ok(outcome);
            }
        }

        self.mark_downloading(&paper_id, &pdf_url, &dest)?;

        match self.fetch(&pdf_url, &dest).await {
            Ok((size_bytes, sha256)) => {
                let _ = self.pdf_cache.update(
                    &paper_id,
                    PdfAssetPatch {
                        status: Some(PdfStatus::Ready),
                        size_bytes: Some(size_bytes),
                        sha256: Some(sha256.clone()),
                        downloaded_at: Some(Utc::now()),
                        error: Some(None),
                        ..PdfAssetPatch::default()
                    },
                )?;
                info!(%paper_id, size_bytes, path = %dest.display(), "pdf downloaded");
                Ok(DownloadOutcome {
                    session_id: session_id.to_string(),
                    paper_id,
                    pdf_url,
                    local_path: dest,
                    status: PdfStatus::Ready,
                    existed: false,
                    size_bytes,
                    sha256: Some(sha256),
                })
            }
            Err(e) => {
                // Keep the failure inspectable even when persisting it fails too.
                if let Err(cache_err) = self.pdf_cache.update(
                    &paper_id,
                    PdfAssetPatch {
                        status: Some(PdfStatus::Failed),
                        error: Some(Some(e.to_string())),
                        ..PdfAssetPatch::default()
                    },
                ) {
                    warn!(%paper_id, error = %cache_err, "failed to record download failure");
                }
                Err(e)
            }
        }
    }

    /// Map a reference to `(paper_id, source_url)`.
    ///
    /// An unspecified reference falls back to `last_active_paper_id`
    /// directly, bypassing the `last_papers` membership check, and
    /// synthesizes the canonical URL when session metadata has expired.
    pub(crate) fn resolve(
        &self,
        session_id: &str,
        reference: &PaperRef,
    ) -> Result<(String, String), DownloadError> {
        match reference {
            PaperRef::Unspecified => {
                let paper_id = self
                    .sessions
                    .get_last_active_paper_id(session_id)
                    .ok_or_else(|| {
                        DownloadError::Resolution(
                            "no recently touched paper; download, translate, or check one \
                             first, or pass an explicit ref (index / id / title)"
                                .into(),
                        )
                    })?;
                let url = self
                    .sessions
                    .resolve_paper(session_id, &PaperRef::Text(paper_id.clone()))
                    .and_then(|p| p.pdf_url)
                    .unwrap_or_else(|| fallback_pdf_url(&paper_id));
                Ok((paper_id, url))
            }
            reference => {
                let paper = self
                    .sessions
                    .resolve_paper(session_id, reference)
                    .ok_or_else(|| {
                        DownloadError::Resolution(
                            "paper not found in session memory; list recent papers first \
                             or check the ref"
                                .into(),
                        )
                    })?;
                let url = paper
                    .pdf_url
                    .clone()
                    .unwrap_or_else(|| fallback_pdf_url(&paper.id));
                Ok((paper.id, url))
            }
        }
    }

    /// Short-circuit when the destination already holds a non-empty file,
    /// repairing the cache record to `READY` if it disagrees.
    fn fast_path(
        &self,
        session_id: &str,
        paper_id: &str,
        pdf_url: &str,
        dest: &Path,
    ) -> Result<Option<DownloadOutcome>, DownloadError> {
        let metadata = match std::fs::metadata(dest) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if metadata.len() == 0 {
            return Ok(None);
        }
        let size_bytes = metadata.len();

        let sha256 = match self.pdf_cache.get(paper_id) {
            None => {
                let asset = PdfAsset {
                    paper_id: paper_id.to_string(),
                    pdf_url: pdf_url.to_string(),
                    local_path: dest.to_path_buf(),
                    status: PdfStatus::Ready,
                    size_bytes,
                    sha256: None,
                    downloaded_at: Some(Utc::now()),
                    error: None,
                };
                let _ = self.pdf_cache.upsert(asset)?;
                None
            }
            Some(asset) if asset.status != PdfStatus::Ready => {
                let repaired = self.pdf_cache.update(
                    paper_id,
                    PdfAssetPatch {
                        status: Some(PdfStatus::Ready),
                        pdf_url: Some(pdf_url.to_string()),
                        local_path: Some(dest.to_path_buf()),
                        size_bytes: Some(size_bytes),
                        downloaded_at: Some(asset.downloaded_at.unwrap_or_else(Utc::now)),
                        error: Some(None),
                        ..PdfAssetPatch::default()
                    },
                )?;
                repaired.and_then(|a| a.sha256)
            }
            Some(asset) => asset.sha256,
        };

        Ok(Some(DownloadOutcome {
            session_id: session_id.to_string(),
            paper_id: paper_id.to_string(),
            pdf_url: pdf_url.to_string(),
            local_path: dest.to_path_buf(),
            status: PdfStatus::Ready,
            existed: true,
            size_bytes,
            sha256,
        }))
    }

    fn mark_downloading(
        &self,
        paper_id: &str,
        pdf_url: &str,
        dest: &Path,
    ) -> Result<(), DownloadError> {
        if self.pdf_cache.get(paper_id).is_none() {
            let _ = self
                .pdf_cache
                .upsert(PdfAsset::downloading(paper_id, pdf_url, dest))?;
        } else {
            let _ = self.pdf_cache.update(
                paper_id,
                PdfAssetPatch {
                    status: Some(PdfStatus::Downloading),
                    pdf_url: Some(pdf_url.to_string()),
                    local_path: Some(dest.to_path_buf()),
                    error: Some(None),
                    ..PdfAssetPatch::default()
                },
            )?;
        }
        Ok(())
    }

    /// Stream the body into `<dest>.part`, validate it, and promote it.
    ///
    /// Any failure removes the temp file; the destination is only ever
    /// written by the atomic rename.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(u64, String), DownloadError> {
        let part = part_path(dest);
        // Clear stale leftovers from a previous crashed run.
        if let Err(e) = tokio::fs::remove_file(&part).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %part.display(), error = %e, "failed to remove stale temp file");
            }
        }

        match self.stream_to_part(url, &part).await {
            Ok((size_bytes, sha256)) => {
                tokio::fs::rename(&part, dest).await?;
                Ok((size_bytes, sha256))
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %part.display(), error = %rm, "failed to remove temp file");
                    }
                }
                Err(e)
            }
        }
    }

    async fn stream_to_part(&self, url: &str, part: &Path) -> Result<(u64, String), DownloadError> {
        let response = self.http.get(url).send().await?.error_for_status()?;

        let mut file = tokio::fs::File::create(part).await?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut head: Vec<u8> = Vec::with_capacity(PDF_MAGIC.len());

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            if head.len() < PDF_MAGIC.len() {
                let take = (PDF_MAGIC.len() - head.len()).min(chunk.len());
                head.extend_from_slice(&chunk[..take]);
            }
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            size += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if size < self.min_pdf_bytes {
            return Err(DownloadError::Validation {
                reason: format!(
                    "body is {size} bytes, below the {} byte minimum (content may be an \
                     HTML error or redirect page)",
                    self.min_pdf_bytes
                ),
            });
        }
        if head.as_slice() != PDF_MAGIC {
            return Err(DownloadError::Validation {
                reason: "missing %PDF magic bytes (content may be an HTML error or \
                         redirect page)"
                    .into(),
            });
        }

        Ok((size, format!("{:x}", hasher.finalize())))
    }
}

fn lock_path(dest: &Path) -> PathBuf {
    suffixed(dest, ".lock")
}

fn part_path(dest: &Path) -> PathBuf {
    suffixed(dest, ".part")
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::Paper;
    use folio_core::config::DownloadConfig;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        _dir: tempfile::TempDir,
        sessions: Arc<SessionStore>,
        pdf_cache: Arc<CacheIndex<PdfAsset>>,
        pipeline: DownloadPipeline,
        raw_dir: PathBuf,
    }

    fn fixture_with(download: DownloadConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = FolioConfig {
            data_dir: dir.path().to_path_buf(),
            download,
            ..FolioConfig::default()
        };
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(60), 50));
        let pdf_cache: Arc<CacheIndex<PdfAsset>> =
            Arc::new(CacheIndex::open(config.pdf_cache_path()).unwrap());
        let raw_dir = config.raw_pdf_dir();
        let pipeline =
            DownloadPipeline::new(&config, Arc::clone(&sessions), Arc::clone(&pdf_cache)).unwrap();
        Fixture {
            _dir: dir,
            sessions,
            pdf_cache,
            pipeline,
            raw_dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(DownloadConfig::default())
    }

    fn seed_paper(fx: &Fixture, id: &str, url: &str) {
        fx.sessions.set_last_papers(
            "s1",
            vec![Paper::new(id, "A Sufficiently Deep Network").with_pdf_url(url)],
        );
    }

    fn valid_pdf_body() -> Vec<u8> {
        let mut body = b"%PDF-1.5\n".to_vec();
        body.resize(4096, b'x');
        body
    }

    #[test]
    fn safe_filename_collapses_unsafe_runs() {
        assert_eq!(safe_filename("abs/1234.5678v2"), "abs_1234.5678v2");
        assert_eq!(safe_filename("a  b??c"), "a_b_c");
        assert_eq!(safe_filename("__x__"), "x");
        assert_eq!(safe_filename("plain-id_1.2"), "plain-id_1.2");
    }

    #[test]
    fn normalize_appends_pdf_extension_once() {
        assert_eq!(
            normalize_pdf_url("https://arxiv.org/pdf/2401.00001").unwrap(),
            "https://arxiv.org/pdf/2401.00001.pdf"
        );
        assert_eq!(
            normalize_pdf_url("https://arxiv.org/pdf/2401.00001.pdf").unwrap(),
            "https://arxiv.org/pdf/2401.00001.pdf"
        );
        assert_eq!(
            normalize_pdf_url("https://arxiv.org/pdf/2401.00001/").unwrap(),
            "https://arxiv.org/pdf/2401.00001.pdf"
        );
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(matches!(
            normalize_pdf_url("not a url"),
            Err(DownloadError::InvalidUrl { .. })
        ));
        assert!(matches!(
            normalize_pdf_url(""),
            Err(DownloadError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn resolve_unspecified_synthesizes_canonical_url() {
        let fx = fixture();
        // Active id set, but no paper metadata in session memory.
        fx.sessions.set_last_active_paper_id("s1", "2401.00042");
        let (paper_id, url) = fx
            .pipeline
            .resolve("s1", &PaperRef::Unspecified)
            .unwrap();
        assert_eq!(paper_id, "2401.00042");
        assert_eq!(url, "https://arxiv.org/pdf/2401.00042.pdf");
    }

    #[test]
    fn resolve_unspecified_without_active_id_fails() {
        let fx = fixture();
        let err = fx
            .pipeline
            .resolve("s1", &PaperRef::Unspecified)
            .unwrap_err();
        assert!(matches!(err, DownloadError::Resolution(_)));
    }

    #[tokio::test]
    async fn unresolvable_ref_is_resolution_error() {
        let fx = fixture();
        let err = fx
            .pipeline
            .download("s1", &PaperRef::Index(1), false)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Resolution(_)));
    }

    #[tokio::test]
    async fn download_streams_validates_and_marks_ready() {
        let server = MockServer::start().await;
        let body = valid_pdf_body();
        Mock::given(method("GET"))
            .and(url_path("/pdf/2401.00001.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture();
        seed_paper(&fx, "2401.00001", &format!("{}/pdf/2401.00001", server.uri()));

        let outcome = fx
            .pipeline
            .download("s1", &PaperRef::Index(1), false)
            .await
            .unwrap();

        assert!(!outcome.existed);
        assert_eq!(outcome.status, PdfStatus::Ready);
        assert_eq!(outcome.size_bytes, body.len() as u64);
        assert!(outcome.sha256.is_some());
        assert!(outcome.pdf_url.ends_with(".pdf"));

        let on_disk = std::fs::read(&outcome.local_path).unwrap();
        assert_eq!(on_disk, body);
        assert!(!part_path(&outcome.local_path).exists());
        assert!(!lock_path(&outcome.local_path).exists());

        let asset = fx.pdf_cache.get("2401.00001").unwrap();
        assert_eq!(asset.status, PdfStatus::Ready);
        assert_eq!(asset.size_bytes, body.len() as u64);
        assert!(asset.error.is_none());

        // Touching the paper updated the session's last-active id.
        assert_eq!(
            fx.sessions.get_last_active_paper_id("s1").as_deref(),
            Some("2401.00001")
        );
    }

    #[tokio::test]
    async fn existing_file_short_circuits_without_network() {
        // No mock server mounted at all: any network attempt would fail.
        let fx = fixture();
        seed_paper(&fx, "2401.00001", "https://arxiv.org/pdf/2401.00001");
        std::fs::create_dir_all(&fx.raw_dir).unwrap();
        std::fs::write(fx.raw_dir.join("2401.00001.pdf"), valid_pdf_body()).unwrap();

        let outcome = fx
            .pipeline
            .download("s1", &PaperRef::Index(1), false)
            .await
            .unwrap();

        assert!(outcome.existed);
        assert_eq!(outcome.status, PdfStatus::Ready);
        // The absent cache record was created as READY.
        let asset = fx.pdf_cache.get("2401.00001").unwrap();
        assert_eq!(asset.status, PdfStatus::Ready);
        assert!(asset.downloaded_at.is_some());
    }

    #[tokio::test]
    async fn fast_path_repairs_inconsistent_record() {
        let fx = fixture();
        seed_paper(&fx, "2401.00001", "https://arxiv.org/pdf/2401.00001");
        std::fs::create_dir_all(&fx.raw_dir).unwrap();
        let dest = fx.raw_dir.join("2401.00001.pdf");
        std::fs::write(&dest, valid_pdf_body()).unwrap();

        let mut stale = PdfAsset::downloading(
            "2401.00001",
            "https://arxiv.org/pdf/2401.00001.pdf",
            &dest,
        );
        stale.status = PdfStatus::Failed;
        stale.error = Some("older failure".into());
        let _ = fx.pdf_cache.upsert(stale).unwrap();

        let outcome = fx
            .pipeline
            .download("s1", &PaperRef::Index(1), false)
            .await
            .unwrap();
        assert!(outcome.existed);

        let asset = fx.pdf_cache.get("2401.00001").unwrap();
        assert_eq!(asset.status, PdfStatus::Ready);
        assert!(asset.error.is_none());
        assert_eq!(asset.size_bytes, 4096);
    }

    #[tokio::test]
    async fn html_body_fails_validation_and_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/pdf/2401.00001.pdf"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html>302 moved</html>"),
            )
            .mount(&server)
            .await;

        let fx = fixture();
        seed_paper(&fx, "2401.00001", &format!("{}/pdf/2401.00001", server.uri()));

        let err = fx
            .pipeline
            .download("s1", &PaperRef::Index(1), false)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Validation { .. }));

        let dest = fx.raw_dir.join("2401.00001.pdf");
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
        assert!(!lock_path(&dest).exists());

        let asset = fx.pdf_cache.get("2401.00001").unwrap();
        assert_eq!(asset.status, PdfStatus::Failed);
        assert!(asset.error.is_some());
    }

    #[tokio::test]
    async fn large_non_pdf_body_fails_magic_check() {
        let server = MockServer::start().await;
        let mut body = b"<html>".to_vec();
        body.resize(8192, b'x');
        Mock::given(method("GET"))
            .and(url_path("/pdf/2401.00001.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;

        let fx = fixture();
        seed_paper(&fx, "2401.00001", &format!("{}/pdf/2401.00001", server.uri()));

        let err = fx
            .pipeline
            .download("s1", &PaperRef::Index(1), false)
            .await
            .unwrap_err();
        match err {
            DownloadError::Validation { reason } => assert!(reason.contains("%PDF")),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[tokio::test]
    async fn force_redownloads_over_existing_file() {
        let server = MockServer::start().await;
        let body = valid_pdf_body();
        Mock::given(method("GET"))
            .and(url_path("/pdf/2401.00001.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture();
        seed_paper(&fx, "2401.00001", &format!("{}/pdf/2401.00001", server.uri()));
        std::fs::create_dir_all(&fx.raw_dir).unwrap();
        std::fs::write(fx.raw_dir.join("2401.00001.pdf"), b"%PDF stale but long enough to pass the old check ............................").unwrap();

        let outcome = fx
            .pipeline
            .download("s1", &PaperRef::Index(1), true)
            .await
            .unwrap();
        assert!(!outcome.existed);
        assert_eq!(outcome.size_bytes, body.len() as u64);
        assert_eq!(
            std::fs::read(&outcome.local_path).unwrap().len(),
            body.len()
        );
    }

    #[tokio::test]
    async fn held_lock_yields_lock_busy() {
        let fx = fixture_with(DownloadConfig {
            lock_retries: 3,
            lock_retry_delay_ms: 1,
            ..DownloadConfig::default()
        });
        seed_paper(&fx, "2401.00001", "https://arxiv.org/pdf/2401.00001");
        std::fs::create_dir_all(&fx.raw_dir).unwrap();
        // Another process holds the lock.
        let dest = fx.raw_dir.join("2401.00001.pdf");
        std::fs::write(lock_path(&dest), b"").unwrap();

        let err = fx
            .pipeline
            .download("s1", &PaperRef::Index(1), false)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::LockBusy { .. }));
        // The foreign sentinel is left in place.
        assert!(lock_path(&dest).exists());
    }

    #[tokio::test]
    async fn concurrent_downloads_fetch_exactly_once() {
        let server = MockServer::start().await;
        let body = valid_pdf_body();
        Mock::given(method("GET"))
            .and(url_path("/pdf/2401.00001.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(body.clone())
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture_with(DownloadConfig {
            lock_retries: 500,
            lock_retry_delay_ms: 5,
            ..DownloadConfig::default()
        });
        let fx = Arc::new(fx);
        seed_paper(&fx, "2401.00001", &format!("{}/pdf/2401.00001", server.uri()));

        let a = {
            let fx = Arc::clone(&fx);
            tokio::spawn(
                async move { fx.pipeline.download("s1", &PaperRef::Index(1), false).await },
            )
        };
        let b = {
            let fx = Arc::clone(&fx);
            tokio::spawn(
                async move { fx.pipeline.download("s1", &PaperRef::Index(1), false).await },
            )
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        // Exactly one performed network I/O (also enforced by expect(1)).
        assert_eq!(
            [a.existed, b.existed].iter().filter(|e| !**e).count(),
            1,
            "exactly one fetch, the other observed READY"
        );
        assert_eq!(std::fs::read(&a.local_path).unwrap(), body);
        assert_eq!(a.local_path, b.local_path);
        assert!(!lock_path(&a.local_path).exists());
    }

    #[tokio::test]
    async fn http_error_status_marks_asset_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/pdf/2401.00001.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fx = fixture();
        seed_paper(&fx, "2401.00001", &format!("{}/pdf/2401.00001", server.uri()));

        let err = fx
            .pipeline
            .download("s1", &PaperRef::Index(1), false)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Http(_)));

        let asset = fx.pdf_cache.get("2401.00001").unwrap();
        assert_eq!(asset.status, PdfStatus::Failed);
        assert!(asset.error.is_some());
    }
}
