use std::time::Duration;

use thiserror::Error;

/// Timeout applied to every provider request so a dead network can never
/// wedge the refresh cycle.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service rejected the request: {0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

pub(crate) fn blocking_client(timeout: Duration) -> Result<reqwest::blocking::Client, ProviderError> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()?)
}
