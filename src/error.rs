//! Error types for the fetch pipeline
//!
//! Every variant is terminal for an invocation. Cache problems are not
//! represented here because they never reach the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Which HTTP request of the conditional retrieval failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Check,
    Retrieve,
}

impl std::fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchPhase::Check => f.write_str("check"),
            FetchPhase::Retrieve => f.write_str("download"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GhdirError {
    #[error("invalid GitHub URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("confirmation prompt failed: {0}")]
    Prompt(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("could not reach {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("repository is not accessible ({phase} of {url} returned HTTP {status})")]
    Status {
        url: String,
        phase: FetchPhase,
        status: reqwest::StatusCode,
    },

    #[error("download of {url} was interrupted")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read archive stream")]
    Archive(#[source] std::io::Error),

    #[error("failed to create {}", path.display())]
    Materialize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction worker did not finish")]
    Worker(#[source] tokio::task::JoinError),
}

impl ExtractionError {
    pub(crate) fn materialize(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Materialize {
            path: path.into(),
            source,
        }
    }

    /// Split off failures caused by the response body rather than the archive
    /// or the filesystem. `Ok` carries the underlying read error.
    pub(crate) fn into_transfer_failure(self) -> Result<std::io::Error, Self> {
        match self {
            Self::Archive(source) | Self::Write { source, .. } if carries_transport_error(&source) => {
                Ok(source)
            }
            other => Err(other),
        }
    }
}

/// Whether a `reqwest::Error` is wrapped somewhere inside `error`
fn carries_transport_error(error: &std::io::Error) -> bool {
    let mut current = error
        .get_ref()
        .map(|inner| inner as &(dyn std::error::Error + 'static));
    while let Some(inner) = current {
        if inner.is::<reqwest::Error>() {
            return true;
        }
        current = match inner.downcast_ref::<std::io::Error>() {
            Some(io) => io
                .get_ref()
                .map(|nested| nested as &(dyn std::error::Error + 'static)),
            None => inner.source(),
        };
    }
    false
}
