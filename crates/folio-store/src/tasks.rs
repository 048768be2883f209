//! Translate-task registry.
//!
//! One [`TranslateTask`] per translate request, tracked from `PENDING`
//! through `RUNNING` to `SUCCEEDED`/`FAILED` so callers can poll long-running
//! work. Records are never removed; bounding growth is left to the embedding
//! program.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Translate-task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created, not yet started.
    Pending,
    /// The translation worker is running.
    Running,
    /// Finished with output on disk.
    Succeeded,
    /// Finished with an error; see `error`.
    Failed,
}

impl TaskStatus {
    /// Whether this status represents a finished task.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Wire string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One translate request's lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateTask {
    /// Opaque random identifier.
    pub task_id: String,
    /// Session that requested the translation.
    pub session_id: String,
    /// Paper being translated.
    pub paper_id: String,
    /// Source URL of the input PDF.
    pub input_pdf_url: String,
    /// Current status.
    pub status: TaskStatus,
    /// Progress fraction in `[0, 1]`.
    pub progress: f32,
    /// Single-language output, set on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mono_path: Option<PathBuf>,
    /// Bilingual output, set on success when kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dual_path: Option<PathBuf>,
    /// Human-readable failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Partial update for a [`TranslateTask`].
#[derive(Debug, Default)]
pub struct TranslateTaskPatch {
    /// New status.
    pub status: Option<TaskStatus>,
    /// New progress fraction.
    pub progress: Option<f32>,
    /// New mono output path.
    pub mono_path: Option<PathBuf>,
    /// New dual output path.
    pub dual_path: Option<PathBuf>,
    /// `Some(Some(_))` records a failure, `Some(None)` clears a stale one.
    pub error: Option<Option<String>>,
}

/// In-memory registry of translate tasks, guarded by one coarse mutex.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, TranslateTask>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh task in `PENDING` state and return it.
    pub fn create_task(
        &self,
        session_id: &str,
        paper_id: &str,
        input_pdf_url: &str,
    ) -> TranslateTask {
        let now = Utc::now();
        let task = TranslateTask {
            task_id: Uuid::new_v4().simple().to_string(),
            session_id: session_id.to_string(),
            paper_id: paper_id.to_string(),
            input_pdf_url: input_pdf_url.to_string(),
            status: TaskStatus::Pending,
            progress: 0.0,
            mono_path: None,
            dual_path: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let _ = self
            .tasks
            .lock()
            .insert(task.task_id.clone(), task.clone());
        task
    }

    /// Merge a patch into an existing task, bumping `updated_at`.
    ///
    /// Returns `None` when the id is unknown.
    pub fn update_task(&self, task_id: &str, patch: TranslateTaskPatch) -> Option<TranslateTask> {
        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(task_id)?;
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(progress) = patch.progress {
            task.progress = progress;
        }
        if let Some(mono_path) = patch.mono_path {
            task.mono_path = Some(mono_path);
        }
        if let Some(dual_path) = patch.dual_path {
            task.dual_path = Some(dual_path);
        }
        if let Some(error) = patch.error {
            task.error = error;
        }
        task.updated_at = Utc::now();
        Some(task.clone())
    }

    /// Pure lookup.
    #[must_use]
    pub fn get_task(&self, task_id: &str) -> Option<TranslateTask> {
        self.tasks.lock().get(task_id).cloned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
