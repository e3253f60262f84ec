//! Logging conventions for the MeshDB engine.
//!
//! Engine internals emit `tracing` events with a small set of stable
//! fields: `query_id` on everything that happens inside a statement,
//! `table` and `source` on routed data-source calls. Every statement
//! executes under the span built by [`query_span`], so downstream
//! collectors can group a statement's events without parsing messages.
//!
//! The init helpers (behind the `logging` feature) install a global
//! subscriber whose default filter keeps sled's internal chatter at
//! `warn` while the engine logs at `info`. The `MESHDB_LOG` environment
//! variable overrides the directives with the usual `RUST_LOG` syntax.

use tracing::Span;

/// Span wrapping one statement's execution. Entered by the engine for
/// the lifetime of the statement; nested events inherit `query_id`.
pub fn query_span(query_id: &str) -> Span {
    tracing::info_span!("query", query_id = %query_id)
}

/// Engine at `info`, sled's background threads at `warn`.
#[cfg(feature = "logging")]
const DEFAULT_DIRECTIVES: &str = "info,sled=warn";

/// Install the global subscriber with the engine's default filter.
///
/// # Environment Variables
/// - `MESHDB_LOG` - filter directives (default: `info,sled=warn`)
#[cfg(feature = "logging")]
pub fn init() {
    init_with_directives(DEFAULT_DIRECTIVES)
}

/// Install the global subscriber with explicit filter directives.
#[cfg(feature = "logging")]
pub fn init_with_directives(directives: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_env("MESHDB_LOG").unwrap_or_else(|_| EnvFilter::new(directives));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Subscriber for tests: engine at `debug`, routed to the test writer
/// so output interleaves with the harness per test.
#[cfg(feature = "logging")]
pub fn init_test() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("meshdb_core=debug,sled=warn"))
        .with_test_writer()
        .try_init();
}

// Stub implementations when the logging feature is disabled; spans stay
// available because the engine enters one per statement either way
#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_directives(_directives: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
