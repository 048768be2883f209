//! Translate-task orchestration.
//!
//! [`TranslateService`] ties the stores and the translation pipeline
//! together: a translate request resolves the paper, verifies its raw PDF is
//! cached, registers a task, and spawns a detached worker that drives the
//! translator while patching both the task record and the translate-asset
//! record. Callers poll [`folio_store::TaskRegistry::get_task`] (or the
//! cache) for progress; there is no cancellation protocol.
//!
//! Also here: [`TranslateService::cache_status`], the "is this paper already
//! downloaded/translated" query, which counts as touching the paper.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use folio_core::FolioConfig;
use folio_core::config::TranslatorConfig;
use folio_store::{
    CacheIndex, PaperRef, PdfAsset, PdfStatus, SessionStore, TaskRegistry, TaskStatus,
    TranslateAsset, TranslateAssetPatch, TranslateStatus, TranslateTask, TranslateTaskPatch,
};

use crate::download::safe_filename;
use crate::errors::ServiceError;
use crate::translate::{CaptureMode, TranslateOptions, run_translation};

/// Combined cache view for one paper.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    /// Resolved paper id.
    pub paper_id: String,
    /// Raw-PDF cache record, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf: Option<PdfAsset>,
    /// Translate cache record, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translate: Option<TranslateAsset>,
    /// Whether the raw PDF is downloaded and validated.
    pub pdf_ready: bool,
    /// Whether the translated output is on disk.
    pub translated_ready: bool,
}

/// Orchestrates asynchronous translate tasks over the shared stores.
pub struct TranslateService {
    sessions: Arc<SessionStore>,
    pdf_cache: Arc<CacheIndex<PdfAsset>>,
    translate_cache: Arc<CacheIndex<TranslateAsset>>,
    tasks: Arc<TaskRegistry>,
    translated_dir: PathBuf,
    transcript_dir: PathBuf,
    translator: TranslatorConfig,
    capture: CaptureMode,
}

impl TranslateService {
    /// Build a service from configuration and the shared stores.
    #[must_use]
    pub fn new(
        config: &FolioConfig,
        sessions: Arc<SessionStore>,
        pdf_cache: Arc<CacheIndex<PdfAsset>>,
        translate_cache: Arc<CacheIndex<TranslateAsset>>,
        tasks: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            sessions,
            pdf_cache,
            translate_cache,
            tasks,
            translated_dir: config.translated_dir(),
            transcript_dir: config.transcript_dir(),
            translator: config.translator.clone(),
            capture: CaptureMode::Interleaved,
        }
    }

    /// Builder: override the subprocess capture mode (line-buffered fallback
    /// for platforms without full-fidelity capture).
    #[must_use]
    pub fn with_capture(mut self, capture: CaptureMode) -> Self {
        self.capture = capture;
        self
    }

    /// Start (or short-circuit) a translation for the referenced paper.
    ///
    /// Returns the task record immediately; the work runs on a detached
    /// worker. With `force` false a `READY` translate record whose mono file
    /// still exists resolves the task at once without running the
    /// translator.
    pub fn request_translation(
        &self,
        session_id: &str,
        reference: &PaperRef,
        force: bool,
    ) -> Result<TranslateTask, ServiceError> {
        let paper_id = self.resolve_paper_id(session_id, reference)?;
        self.sessions.set_last_active_paper_id(session_id, &paper_id);

        let pdf = self
            .pdf_cache
            .get(&paper_id)
            .filter(|asset| {
                asset.status == PdfStatus::Ready
                    && std::fs::metadata(&asset.local_path).is_ok_and(|m| m.len() > 0)
            })
            .ok_or_else(|| ServiceError::PdfNotReady {
                paper_id: paper_id.clone(),
            })?;

        let task = self.tasks.create_task(session_id, &paper_id, &pdf.pdf_url);

        if !force {
            if let Some(done) = self.cached_result(&task, &paper_id) {
                return Ok(done);
            }
        }

        let _ = self
            .translate_cache
            .upsert(TranslateAsset::pending(&paper_id))?;

        let options = TranslateOptions {
            bin: self.translator.bin.clone(),
            service: self.translator.service.clone(),
            threads: self.translator.threads,
            keep_dual: self.translator.keep_dual,
            log_path: Some(
                self.transcript_dir
                    .join(format!("{}.log", safe_filename(&paper_id))),
            ),
            capture: self.capture,
        };

        let tasks = Arc::clone(&self.tasks);
        let translate_cache = Arc::clone(&self.translate_cache);
        let task_id = task.task_id.clone();
        let worker_paper = paper_id;
        let input = pdf.local_path.clone();
        let out_dir = self.translated_dir.clone();

        let _worker = tokio::spawn(async move {
            let _ = tasks.update_task(
                &task_id,
                TranslateTaskPatch {
                    status: Some(TaskStatus::Running),
                    ..TranslateTaskPatch::default()
                },
            );
            if let Err(e) = translate_cache.update(
                &worker_paper,
                TranslateAssetPatch {
                    status: Some(TranslateStatus::Running),
                    error: Some(None),
                    ..TranslateAssetPatch::default()
                },
            ) {
                warn!(paper_id = %worker_paper, error = %e, "failed to mark translation running");
            }

            let result = run_translation(&input, &out_dir, &options, |p, _line| {
                let _ = tasks.update_task(
                    &task_id,
                    TranslateTaskPatch {
                        progress: Some(p),
                        ..TranslateTaskPatch::default()
                    },
                );
                if let Err(e) = translate_cache.update(
                    &worker_paper,
                    TranslateAssetPatch {
                        progress: Some(p),
                        ..TranslateAssetPatch::default()
                    },
                ) {
                    warn!(paper_id = %worker_paper, error = %e, "failed to persist translation progress");
                }
            })
            .await;

            match result {
                Ok(output) => {
                    let _ = tasks.update_task(
                        &task_id,
                        TranslateTaskPatch {
                            status: Some(TaskStatus::Succeeded),
                            progress: Some(1.0),
                            mono_path: Some(output.mono_path.clone()),
                            dual_path: output.dual_path.clone(),
                            ..TranslateTaskPatch::default()
                        },
                    );
                    if let Err(e) = translate_cache.update(
                        &worker_paper,
                        TranslateAssetPatch {
                            status: Some(TranslateStatus::Ready),
                            progress: Some(1.0),
                            mono_path: Some(output.mono_path.clone()),
                            dual_path: Some(output.dual_path),
                            error: Some(None),
                            ..TranslateAssetPatch::default()
                        },
                    ) {
                        warn!(paper_id = %worker_paper, error = %e, "failed to persist translation result");
                    }
                    info!(paper_id = %worker_paper, mono = %output.mono_path.display(), "translation finished");
                }
                Err(e) => {
                    let message = e.to_string();
                    let _ = tasks.update_task(
                        &task_id,
                        TranslateTaskPatch {
                            status: Some(TaskStatus::Failed),
                            error: Some(Some(message.clone())),
                            ..TranslateTaskPatch::default()
                        },
                    );
                    if let Err(cache_err) = translate_cache.update(
                        &worker_paper,
                        TranslateAssetPatch {
                            status: Some(TranslateStatus::Failed),
                            error: Some(Some(message)),
                            ..TranslateAssetPatch::default()
                        },
                    ) {
                        warn!(paper_id = %worker_paper, error = %cache_err, "failed to persist translation failure");
                    }
                }
            }
        });

        Ok(task)
    }

    /// Cached-translation short-circuit: resolve the task immediately when
    /// the translate record is `READY` and its mono file still exists.
    fn cached_result(&self, task: &TranslateTask, paper_id: &str) -> Option<TranslateTask> {
        let asset = self.translate_cache.get(paper_id)?;
        if asset.status != TranslateStatus::Ready {
            return None;
        }
        let mono = asset.mono_path.clone()?;
        if !mono.exists() {
            return None;
        }
        let patch = TranslateTaskPatch {
            status: Some(TaskStatus::Succeeded),
            progress: Some(1.0),
            mono_path: Some(mono),
            dual_path: asset.dual_path.clone(),
            ..TranslateTaskPatch::default()
        };
        self.tasks.update_task(&task.task_id, patch)
    }

    /// Report both cache records for a paper.
    ///
    /// An explicit `paper_id` wins; otherwise an absent or unspecified ref
    /// falls back to the last-active paper. The query counts as touching the
    /// paper.
    pub fn cache_status(
        &self,
        session_id: &str,
        reference: Option<&PaperRef>,
        paper_id: Option<&str>,
    ) -> Result<CacheStatus, ServiceError> {
        let paper_id = match paper_id {
            Some(id) => id.to_string(),
            None => match reference {
                None | Some(PaperRef::Unspecified) => self
                    .sessions
                    .get_last_active_paper_id(session_id)
                    .ok_or_else(|| {
                        ServiceError::Resolution(
                            "pass a ref or paper_id, or download/translate/check a paper \
                             first"
                                .into(),
                        )
                    })?,
                Some(reference) => self
                    .sessions
                    .resolve_paper(session_id, reference)
                    .ok_or_else(|| {
                        ServiceError::Resolution(
                            "paper not found in session memory; list recent papers first \
                             or pass paper_id"
                                .into(),
                        )
                    })?
                    .id,
            },
        };
        self.sessions.set_last_active_paper_id(session_id, &paper_id);

        let pdf = self.pdf_cache.get(&paper_id);
        let translate = self.translate_cache.get(&paper_id);
        let pdf_ready = pdf.as_ref().is_some_and(|a| a.status == PdfStatus::Ready);
        let translated_ready = translate
            .as_ref()
            .is_some_and(|a| a.status == TranslateStatus::Ready);

        Ok(CacheStatus {
            paper_id,
            pdf,
            translate,
            pdf_ready,
            translated_ready,
        })
    }

    fn resolve_paper_id(
        &self,
        session_id: &str,
        reference: &PaperRef,
    ) -> Result<String, ServiceError> {
        match reference {
            PaperRef::Unspecified => self
                .sessions
                .get_last_active_paper_id(session_id)
                .ok_or_else(|| {
                    ServiceError::Resolution(
                        "no recently touched paper; download, translate, or check one \
                         first, or pass an explicit ref (index / id / title)"
                            .into(),
                    )
                }),
            reference => self
                .sessions
                .resolve_paper(session_id, reference)
                .map(|p| p.id)
                .ok_or_else(|| {
                    ServiceError::Resolution(
                        "paper not found in session memory; list recent papers first or \
                         check the ref"
                            .into(),
                    )
                }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
