//! Logging initialization for embedders and tests.
//!
//! The library itself only emits `tracing` events; it never installs a
//! global subscriber implicitly. Embedders call [`init`] once at startup.
//! Filtering follows `RUST_LOG` (default `info`).

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops (useful in tests
/// where several binaries share a process).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Like [`init`], but emits JSON lines (for log shippers).
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_is_idempotent() {
        super::init();
        super::init();
        super::init_json(); // no-op once a subscriber is set
    }
}
