//! Error types for discovery queries.

use thiserror::Error;

/// Result type for discovery operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by discovery streams.
///
/// Missing resources are never reported here; a service without endpoints is
/// an empty stream, not an error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The Kubernetes API call failed.
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A fetcher implementation failed for a reason other than the Kubernetes API.
    #[error("resource fetch failed: {0}")]
    Fetch(String),
}

impl Error {
    /// Creates a fetch error with the given message.
    #[must_use]
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }
}
