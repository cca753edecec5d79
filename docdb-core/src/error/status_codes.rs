// Service status and sub-status codes
// HTTP statuses the document service returns plus the sub-statuses the harness asserts on

use super::{DocDbError, ErrorCategory};
use serde_json;

/// HTTP status codes returned by the document service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    Created = 201,
    NoContent = 204,
    NotModified = 304,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    RequestTimeout = 408,
    Conflict = 409,
    Gone = 410,
    PreconditionFailed = 412,
    RequestEntityTooLarge = 413,
    TooManyRequests = 429,
    RetryWith = 449,
    InternalServerError = 500,
    ServiceUnavailable = 503,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            200 => Some(Self::Ok),
            201 => Some(Self::Created),
            204 => Some(Self::NoContent),
            304 => Some(Self::NotModified),
            400 => Some(Self::BadRequest),
            401 => Some(Self::Unauthorized),
            403 => Some(Self::Forbidden),
            404 => Some(Self::NotFound),
            405 => Some(Self::MethodNotAllowed),
            408 => Some(Self::RequestTimeout),
            409 => Some(Self::Conflict),
            410 => Some(Self::Gone),
            412 => Some(Self::PreconditionFailed),
            413 => Some(Self::RequestEntityTooLarge),
            429 => Some(Self::TooManyRequests),
            449 => Some(Self::RetryWith),
            500 => Some(Self::InternalServerError),
            503 => Some(Self::ServiceUnavailable),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_status(self.as_u16())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout
                | Self::Gone
                | Self::TooManyRequests
                | Self::RetryWith
                | Self::ServiceUnavailable
        )
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "Created",
            Self::NoContent => "No content",
            Self::NotModified => "Not modified",
            Self::BadRequest => "Bad request",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Resource not found",
            Self::MethodNotAllowed => "Method not allowed",
            Self::RequestTimeout => "Request timeout",
            Self::Conflict => "Resource with specified id or name already exists",
            Self::Gone => "Gone",
            Self::PreconditionFailed => "Precondition failed",
            Self::RequestEntityTooLarge => "Request size is too large",
            Self::TooManyRequests => "Request rate is large",
            Self::RetryWith => "Retry with",
            Self::InternalServerError => "Internal server error",
            Self::ServiceUnavailable => "Service unavailable",
        }
    }
}

/// Sub-status values carried in the `x-ms-substatus` header
pub mod sub_status {
    pub const UNKNOWN: u32 = 0;
    pub const NAME_CACHE_IS_STALE: u32 = 1000;
    pub const PARTITION_KEY_RANGE_GONE: u32 = 1002;
    pub const CROSS_PARTITION_QUERY_NOT_SERVABLE: u32 = 1004;
    pub const OWNER_RESOURCE_NOT_FOUND: u32 = 1003;
}

/// Build a request error from an HTTP status and the JSON error body the service returns.
///
/// The body has the shape `{"code": "NotFound", "message": "..."}`; anything else falls back
/// to the status' default message.
pub fn parse_service_error(
    status: u16,
    sub_status: u32,
    activity_id: Option<String>,
    body: &str,
) -> DocDbError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| {
            StatusCode::from_u16(status)
                .map(|s| s.default_message())
                .unwrap_or("Unknown error")
                .to_string()
        });

    DocDbError::Request {
        status,
        sub_status,
        message,
        activity_id,
        retry_after: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_category() {
        let status = StatusCode::from_u16(409).unwrap();
        assert_eq!(status, StatusCode::Conflict);
        assert_eq!(status.as_u16(), 409);
        assert_eq!(status.category(), ErrorCategory::Conflict);
        assert!(StatusCode::from_u16(418).is_none());
    }

    #[test]
    fn test_parse_service_error_reads_message() {
        let body = r#"{"code":"NotFound","message":"Entity does not exist."}"#;
        let err = parse_service_error(404, 0, Some("act-1".to_string()), body);

        assert_eq!(err.status_code(), Some(404));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_parse_service_error_falls_back_on_garbage() {
        let err = parse_service_error(429, 0, None, "<html>busy</html>");
        assert_eq!(err.category(), ErrorCategory::Throttled);
        assert!(err.to_string().contains("Request rate is large"));
    }
}
