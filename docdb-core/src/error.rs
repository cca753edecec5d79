// Error handling for the document database client and the feed harness
// Mirrors the service's status/sub-status model plus local serialization failures

pub mod status_codes;

use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

pub use status_codes::{parse_service_error, sub_status, StatusCode};

/// Type alias for client results
pub type DocDbResult<T> = Result<T, DocDbError>;

/// Message used when a payload cannot be encoded into a document body
pub const SERIALIZE_FAILURE_MESSAGE: &str = "Can't serialize the object into the json string";

#[derive(Debug, Error)]
pub enum DocDbError {
    #[error("Request failed with status {status} (sub-status {sub_status}): {message}")]
    Request {
        status: u16,
        sub_status: u32,
        message: String,
        activity_id: Option<String>,
        retry_after: Option<Duration>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
        retryable: bool,
        /// The connection was never established, so no request reached the service
        unsent: bool,
    },

    #[error("Decode error: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    #[error("Authorization failed: {message}")]
    Authorization { message: String },
}

impl DocDbError {
    /// Create a server-reported request error
    pub fn request(status: u16, message: impl Into<String>) -> Self {
        Self::Request {
            status,
            sub_status: sub_status::UNKNOWN,
            message: message.into(),
            activity_id: None,
            retry_after: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::request(StatusCode::BadRequest.as_u16(), message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::request(StatusCode::NotFound.as_u16(), message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::request(StatusCode::Conflict.as_u16(), message)
    }

    /// Create a throttling error carrying the server's back-off hint
    pub fn throttled(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::Request {
            status: StatusCode::TooManyRequests.as_u16(),
            sub_status: sub_status::UNKNOWN,
            message: message.into(),
            activity_id: None,
            retry_after,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
            retryable: true,
            unsent: false,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a serde failure as a serialization error
    pub fn serialization(source: serde_json::Error) -> Self {
        Self::Serialization {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// The user-visible error raised when a payload cannot be encoded.
    ///
    /// The cause chain is `InvalidArgument -> Serialization -> serde_json::Error`, so the
    /// innermost cause is whatever the payload's serializer raised.
    pub fn unserializable(source: serde_json::Error) -> Self {
        Self::InvalidArgument {
            message: SERIALIZE_FAILURE_MESSAGE.to_string(),
            source: Some(Box::new(Self::serialization(source))),
        }
    }

    /// Attach the activity id the service assigned to the failed request
    pub fn with_activity_id(mut self, id: impl Into<String>) -> Self {
        if let Self::Request { activity_id, .. } = &mut self {
            *activity_id = Some(id.into());
        }
        self
    }

    /// Attach a sub-status to a request error
    pub fn with_sub_status(mut self, value: u32) -> Self {
        if let Self::Request { sub_status, .. } = &mut self {
            *sub_status = value;
        }
        self
    }

    /// Attach the server's back-off hint to a request error
    pub fn with_retry_after(mut self, value: Option<Duration>) -> Self {
        if let Self::Request { retry_after, .. } = &mut self {
            *retry_after = value;
        }
        self
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            DocDbError::Request { status, .. } => Some(*status),
            DocDbError::Timeout { .. } => Some(StatusCode::RequestTimeout.as_u16()),
            _ => None,
        }
    }

    pub fn sub_status(&self) -> Option<u32> {
        match self {
            DocDbError::Request { sub_status, .. } => Some(*sub_status),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DocDbError::Request { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DocDbError::Request { status, .. } => ErrorCategory::from_status(*status),
            DocDbError::Serialization { .. } => ErrorCategory::Serialization,
            DocDbError::InvalidArgument { .. } => ErrorCategory::InvalidArgument,
            DocDbError::Timeout { .. } => ErrorCategory::Timeout,
            DocDbError::Network { .. } => ErrorCategory::Network,
            DocDbError::Decode { .. } => ErrorCategory::Decode,
            DocDbError::Authorization { .. } => ErrorCategory::Unauthorized,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            DocDbError::Request { status, .. } => StatusCode::from_u16(*status)
                .map(|s| s.is_retryable())
                .unwrap_or(false),
            DocDbError::Network { retryable, .. } => *retryable,
            DocDbError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// True when the service cannot have applied the request, so resending a write is safe
    pub fn is_unapplied(&self) -> bool {
        match self {
            DocDbError::Request { status, .. } => matches!(
                StatusCode::from_u16(*status),
                Some(StatusCode::TooManyRequests | StatusCode::RetryWith)
            ),
            DocDbError::Network { unsent, .. } => *unsent,
            _ => false,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DocDbError::Request { message, .. }
            | DocDbError::Serialization { message, .. }
            | DocDbError::InvalidArgument { message, .. }
            | DocDbError::Timeout { message }
            | DocDbError::Network { message, .. }
            | DocDbError::Decode { message, .. }
            | DocDbError::Authorization { message } => message,
        }
    }

    /// This error followed by each of its sources, outermost first
    pub fn cause_chain(&self) -> Vec<&(dyn StdError + 'static)> {
        let mut chain: Vec<&(dyn StdError + 'static)> = Vec::new();
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            chain.push(err);
            current = err.source();
        }
        chain
    }

    /// The innermost error of the cause chain
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }
}

impl From<serde_json::Error> for DocDbError {
    fn from(err: serde_json::Error) -> Self {
        DocDbError::Decode {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    PreconditionFailed,
    Throttled,
    Server,
    Timeout,
    Network,
    Serialization,
    InvalidArgument,
    Decode,
    Unknown,
}

impl ErrorCategory {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 413 => ErrorCategory::BadRequest,
            401 => ErrorCategory::Unauthorized,
            403 => ErrorCategory::Forbidden,
            404 => ErrorCategory::NotFound,
            408 => ErrorCategory::Timeout,
            409 => ErrorCategory::Conflict,
            412 => ErrorCategory::PreconditionFailed,
            429 => ErrorCategory::Throttled,
            500..=599 => ErrorCategory::Server,
            _ => ErrorCategory::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;

    #[test]
    fn test_request_error_accessors() {
        let err = DocDbError::not_found("missing")
            .with_activity_id("a1")
            .with_sub_status(sub_status::OWNER_RESOURCE_NOT_FOUND);

        assert_eq!(err.status_code(), Some(404));
        assert_eq!(err.sub_status(), Some(1003));
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(!err.is_retryable());
        assert_eq!(err.message(), "missing");
    }

    #[test]
    fn test_throttled_is_retryable_with_hint() {
        let err = DocDbError::throttled("slow down", Some(Duration::from_millis(15)));
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_millis(15)));
    }

    #[test]
    fn test_only_rejected_requests_are_unapplied() {
        assert!(DocDbError::throttled("slow down", None).is_unapplied());
        assert!(DocDbError::request(449, "retry with").is_unapplied());

        // the service may have applied these before failing to answer
        assert!(!DocDbError::timeout("late").is_unapplied());
        assert!(!DocDbError::network("reset").is_unapplied());
        assert!(!DocDbError::request(503, "unavailable").is_unapplied());
        assert!(!DocDbError::request(410, "gone").is_unapplied());
    }

    #[test]
    fn test_unserializable_chain() {
        let inner = serde_json::Error::custom("boom");
        let err = DocDbError::unserializable(inner);

        let chain = err.cause_chain();
        assert_eq!(chain.len(), 3);
        assert!(chain[1].downcast_ref::<DocDbError>().is_some());
        assert!(err.root_cause().downcast_ref::<serde_json::Error>().is_some());
        assert!(err.to_string().contains(SERIALIZE_FAILURE_MESSAGE));
    }
}
