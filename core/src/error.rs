//! Error types for the request/response pipeline.
//!
//! # Design
//! Every terminal failure a caller can observe is a `NetworkError`. The
//! variants split along the three stages of a request: construction
//! (`InvalidUrl`, `InvalidBody`), transport (`ResponseFailure`) and
//! conversion (`InvalidJsonResponse`, `DecodeFailure`). `Unknown` is reserved
//! for errors raised by caller-supplied converters that are not themselves a
//! `NetworkError`; the original cause is kept when there is one.

use std::io;
use std::path::PathBuf;

use bytes::Bytes;
use thiserror::Error;

/// Boxed error used where the concrete cause is caller-defined.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors delivered by every dispatch style.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The composed URL could not be parsed. Carries the original string.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The request body could not be encoded.
    #[error("invalid request body: {0}")]
    InvalidBody(#[source] BodyError),

    /// The response body was not valid JSON.
    #[error("invalid JSON response: {0}")]
    InvalidJsonResponse(#[source] serde_json::Error),

    /// The response body could not be decoded into the requested type.
    #[error("decode failure: {0}")]
    DecodeFailure(#[source] BoxError),

    /// The transport failed or the server answered with a non-2xx status.
    #[error("response failure (status {status:?}): {cause}")]
    ResponseFailure {
        #[source]
        cause: TransportError,
        status: Option<u16>,
        data: Option<Bytes>,
    },

    /// An error that could not be classified.
    #[error("unknown error")]
    Unknown(#[source] Option<BoxError>),
}

impl NetworkError {
    /// HTTP status observed before the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::ResponseFailure { status, .. } => *status,
            _ => None,
        }
    }

    /// Raw response bytes observed before the failure, if any.
    pub fn data(&self) -> Option<&Bytes> {
        match self {
            NetworkError::ResponseFailure { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    /// True for errors raised before any network I/O took place.
    pub fn is_construction_error(&self) -> bool {
        matches!(self, NetworkError::InvalidUrl(_) | NetworkError::InvalidBody(_))
    }
}

impl From<TransportFailure> for NetworkError {
    fn from(failure: TransportFailure) -> Self {
        NetworkError::ResponseFailure {
            cause: failure.error,
            status: failure.status,
            data: failure.partial,
        }
    }
}

/// Failures while turning a `RequestBody` into bytes.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read form file {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures reported by a `Transport`.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered, but with a status outside 200..300.
    #[error("unacceptable status code {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// A transport error plus whatever the transport saw before it failed.
#[derive(Debug)]
pub struct TransportFailure {
    pub error: TransportError,
    pub status: Option<u16>,
    pub partial: Option<Bytes>,
}

impl TransportFailure {
    /// A failure that happened before any response arrived.
    pub fn before_response(error: impl Into<TransportError>) -> Self {
        Self {
            error: error.into(),
            status: None,
            partial: None,
        }
    }
}

/// Failures of the persisted key/value cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The store is string-backed; only UTF-8 payloads can be kept.
    #[error("cache values must be valid UTF-8 text")]
    NotText,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("cache file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failure_maps_to_response_failure() {
        let failure = TransportFailure {
            error: TransportError::Status(404),
            status: Some(404),
            partial: Some(Bytes::from_static(b"{\"error\":\"not found\"}")),
        };
        let err = NetworkError::from(failure);
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.data().unwrap().as_ref(), b"{\"error\":\"not found\"}");
        assert!(!err.is_construction_error());
    }

    #[test]
    fn construction_errors_are_flagged() {
        assert!(NetworkError::InvalidUrl("::".into()).is_construction_error());
        let body = BodyError::FileRead {
            path: PathBuf::from("/missing"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(NetworkError::InvalidBody(body).is_construction_error());
        assert!(!NetworkError::Unknown(None).is_construction_error());
    }

    #[test]
    fn display_includes_context() {
        let err = NetworkError::ResponseFailure {
            cause: TransportError::Timeout,
            status: None,
            data: None,
        };
        assert_eq!(err.to_string(), "response failure (status None): request timed out");
        assert_eq!(
            NetworkError::InvalidUrl("ht tp://x".into()).to_string(),
            "invalid URL: ht tp://x"
        );
    }
}
