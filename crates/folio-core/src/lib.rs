//! # folio-core
//!
//! Foundation types and configuration for the Folio paper assistant.
//!
//! This crate provides the shared vocabulary the other folio crates depend on:
//!
//! - **Papers**: [`paper::Paper`], the immutable metadata record supplied by
//!   the arXiv metadata client
//! - **Configuration**: [`config::FolioConfig`] with compiled defaults, a
//!   JSON file layer, and environment overrides
//! - **Logging**: [`logging::init`] for `tracing` subscriber setup
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `folio-store` and `folio-pipeline`.

#![deny(unsafe_code)]

pub mod config;
pub mod logging;
pub mod paper;

pub use config::{ConfigError, FolioConfig};
pub use paper::Paper;
