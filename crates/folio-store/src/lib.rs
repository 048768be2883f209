//! # folio-store
//!
//! State layer for the Folio paper assistant:
//!
//! - **Session memory**: [`session::SessionStore`] — per-session short-term
//!   memory (recent papers, last-active paper id) with TTL-based lazy expiry,
//!   and [`session::PaperRef`] resolution
//! - **Asset caches**: [`cache::CacheIndex`] — a generic JSON-backed
//!   persistent map, instantiated for [`assets::PdfAsset`] and
//!   [`assets::TranslateAsset`]
//! - **Task registry**: [`tasks::TaskRegistry`] — translate-task lifecycle
//!   records for callers to poll
//!
//! Each shared structure owns its data behind one coarse `parking_lot::Mutex`;
//! compound reads are atomic relative to writers. Correctness over throughput
//! at the expected scale.

#![deny(unsafe_code)]

pub mod assets;
pub mod cache;
pub mod session;
pub mod tasks;

pub use assets::{
    PdfAsset, PdfAssetPatch, PdfStatus, TranslateAsset, TranslateAssetPatch, TranslateStatus,
};
pub use cache::{CacheError, CacheIndex, CacheRecord};
pub use session::{PaperRef, SessionStore};
pub use tasks::{TaskRegistry, TaskStatus, TranslateTask, TranslateTaskPatch};
