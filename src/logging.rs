//! Structured logging init (spec §6 ambient stack): a thin `tracing_subscriber`
//! wrapper the embedding binary calls once at startup. Level comes from
//! `RUST_LOG` when set, falling back to `default_level`.

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber. Idempotent: a second call is a
/// no-op rather than a panic, since tests across the crate may each try to
/// enable logging independently.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
