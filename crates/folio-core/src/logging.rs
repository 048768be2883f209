//! Tracing subscriber setup.
//!
//! Library crates only emit `tracing` events; installing a subscriber is the
//! embedding program's choice. [`init`] is the standard one: fmt output with
//! an env filter read from `FOLIO_LOG`.

use tracing_subscriber::EnvFilter;

/// Install the default fmt subscriber.
///
/// The filter comes from `FOLIO_LOG` (e.g. `folio_pipeline=debug,info`),
/// defaulting to `info`. Calling this twice is a no-op: the second install
/// attempt fails quietly so tests and embedders can both call it.
pub fn init() {
    let filter = EnvFilter::try_from_env("FOLIO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
