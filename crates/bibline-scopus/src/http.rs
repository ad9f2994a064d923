//! Blocking HTTP on a shared tokio runtime
//!
//! The pipeline is sequential, so requests are issued with `block_on` on a
//! small process-wide runtime instead of threading async through the phases.

use std::sync::LazyLock;
use std::time::Duration;

/// Connect timeout; the per-request timeout comes from the client config.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// First retry delay; doubles per attempt.
pub const BASE_DELAY: Duration = Duration::from_secs(2);

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Build a client with the connect timeout and a per-request timeout.
pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .user_agent(concat!("bibline/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Exponential backoff: 2s, 4s, 8s, ...
pub fn backoff_duration(attempt: u32) -> Duration {
    BASE_DELAY * 2u32.saturating_pow(attempt.saturating_sub(1))
}
