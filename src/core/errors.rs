// src/core/errors.rs

//! Defines the primary error type for the engine.

use thiserror::Error;

/// The main error enum, representing all failures the engine can report.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("HTTP client error: {0}")]
    HttpClientError(String),

    /// The remote store answered, but not with a success status.
    #[error("Remote store responded with status {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    #[error("Malformed remote response: {0}")]
    MalformedResponse(String),

    /// The collection is not declared in the engine's schema set.
    #[error("Unknown collection '{0}'")]
    UnknownCollection(String),

    /// The collection could not be found or created on the remote store.
    #[error("Collection '{0}' is unavailable on the remote store")]
    CollectionUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// Manual implementation of Clone so failed sync outcomes can be shared with
// readiness waiters.
impl Clone for MirrorError {
    fn clone(&self) -> Self {
        match self {
            MirrorError::HttpClientError(s) => MirrorError::HttpClientError(s.clone()),
            MirrorError::RemoteStatus { status, body } => MirrorError::RemoteStatus {
                status: *status,
                body: body.clone(),
            },
            MirrorError::MalformedResponse(s) => MirrorError::MalformedResponse(s.clone()),
            MirrorError::UnknownCollection(s) => MirrorError::UnknownCollection(s.clone()),
            MirrorError::CollectionUnavailable(s) => MirrorError::CollectionUnavailable(s.clone()),
            MirrorError::InvalidRequest(s) => MirrorError::InvalidRequest(s.clone()),
        }
    }
}

impl PartialEq for MirrorError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MirrorError::HttpClientError(s1), MirrorError::HttpClientError(s2)) => s1 == s2,
            (
                MirrorError::RemoteStatus {
                    status: s1,
                    body: b1,
                },
                MirrorError::RemoteStatus {
                    status: s2,
                    body: b2,
                },
            ) => s1 == s2 && b1 == b2,
            (MirrorError::MalformedResponse(s1), MirrorError::MalformedResponse(s2)) => s1 == s2,
            (MirrorError::UnknownCollection(s1), MirrorError::UnknownCollection(s2)) => s1 == s2,
            (MirrorError::CollectionUnavailable(s1), MirrorError::CollectionUnavailable(s2)) => {
                s1 == s2
            }
            (MirrorError::InvalidRequest(s1), MirrorError::InvalidRequest(s2)) => s1 == s2,
            _ => false,
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<reqwest::Error> for MirrorError {
    fn from(e: reqwest::Error) -> Self {
        MirrorError::HttpClientError(e.to_string())
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(e: serde_json::Error) -> Self {
        MirrorError::MalformedResponse(e.to_string())
    }
}
