//! # folio-pipeline
//!
//! Work layer for the Folio paper assistant:
//!
//! - **Downloads**: [`download::DownloadPipeline`] — reference resolution to
//!   a validated, atomically-placed PDF on disk, exactly once per concurrent
//!   request, with cache-record transitions
//! - **Translation**: [`translate::run_translation`] — external translator
//!   invocation with live progress extraction from mixed line/redraw output
//! - **Orchestration**: [`service::TranslateService`] — asynchronous
//!   translate-task lifecycle over the task registry and asset caches
//!
//! Both pipelines are `async` and blocking from the calling task's
//! perspective; overlap comes from spawning onto the runtime while other
//! callers poll task and asset records.

#![deny(unsafe_code)]

pub mod download;
pub mod errors;
pub mod lock;
pub mod service;
pub mod translate;

pub use download::{DownloadOutcome, DownloadPipeline};
pub use errors::{DownloadError, ServiceError, TranslateError};
pub use service::{CacheStatus, TranslateService};
pub use translate::{CaptureMode, TranslateOptions, TranslateOutput, run_translation};
