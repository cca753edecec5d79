// Error categories, service error parsing and retry classification

use docdb_core::error::{parse_service_error, sub_status, DocDbError, ErrorCategory, StatusCode};
use docdb_core::retry::RetryPolicy;
use docdb_core::validation::FailureValidator;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_status_categories() {
    let cases = [
        (400, ErrorCategory::BadRequest),
        (401, ErrorCategory::Unauthorized),
        (404, ErrorCategory::NotFound),
        (409, ErrorCategory::Conflict),
        (412, ErrorCategory::PreconditionFailed),
        (429, ErrorCategory::Throttled),
        (503, ErrorCategory::Server),
        (418, ErrorCategory::Unknown),
    ];

    for (status, category) in cases {
        assert_eq!(DocDbError::request(status, "x").category(), category, "status {}", status);
    }
}

#[test]
fn test_retryable_classification() {
    assert!(DocDbError::throttled("slow down", None).is_retryable());
    assert!(DocDbError::request(503, "unavailable").is_retryable());
    assert!(DocDbError::request(410, "gone").is_retryable());
    assert!(DocDbError::timeout("late").is_retryable());
    assert!(DocDbError::network("reset").is_retryable());

    assert!(!DocDbError::bad_request("bad").is_retryable());
    assert!(!DocDbError::not_found("missing").is_retryable());
    assert!(!DocDbError::conflict("dup").is_retryable());
    assert!(!DocDbError::decode("garbled").is_retryable());
}

#[test]
fn test_parse_service_error_body() {
    let err = parse_service_error(
        409,
        sub_status::UNKNOWN,
        Some("act-1".to_string()),
        r#"{"code":"Conflict","message":"Resource with specified id or name already exists."}"#,
    );

    FailureValidator::builder()
        .conflict()
        .sub_status(0)
        .message_contains("already exists")
        .build()
        .validate(&err)
        .unwrap();
    assert!(err.to_string().contains("409"));
}

#[test]
fn test_parse_service_error_falls_back_to_default_message() {
    let err = parse_service_error(429, sub_status::UNKNOWN, None, "<html>busy</html>");
    assert_eq!(err.message(), StatusCode::TooManyRequests.default_message());

    let err = parse_service_error(404, sub_status::OWNER_RESOURCE_NOT_FOUND, None, "");
    assert_eq!(err.sub_status(), Some(sub_status::OWNER_RESOURCE_NOT_FOUND));
    assert_eq!(err.message(), "Resource not found");
}

#[test]
fn test_builder_helpers_attach_context() {
    let err = DocDbError::not_found("missing")
        .with_activity_id("act-9")
        .with_sub_status(sub_status::NAME_CACHE_IS_STALE)
        .with_retry_after(Some(Duration::from_millis(5)));

    assert_eq!(err.sub_status(), Some(1000));
    assert_eq!(err.retry_after(), Some(Duration::from_millis(5)));
    match &err {
        DocDbError::Request { activity_id, .. } => {
            assert_eq!(activity_id.as_deref(), Some("act-9"))
        }
        other => panic!("unexpected variant {other:?}"),
    }

    // only request errors carry service context
    let timeout = DocDbError::timeout("late").with_sub_status(7);
    assert_eq!(timeout.sub_status(), None);
    assert_eq!(timeout.status_code(), Some(408));
}

#[test]
fn test_decode_error_from_serde_keeps_cause() {
    let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let err: DocDbError = source.into();

    assert_eq!(err.category(), ErrorCategory::Decode);
    assert_eq!(err.cause_chain().len(), 2);
    assert!(err.root_cause().downcast_ref::<serde_json::Error>().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_honours_throttling_hint() {
    let attempts = Arc::new(AtomicU32::new(0));
    let policy =
        RetryPolicy::new(4, Duration::from_secs(1), Duration::from_secs(30)).with_jitter(false);
    let started = tokio::time::Instant::now();

    let counter = Arc::clone(&attempts);
    let result = policy
        .execute_async(|| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DocDbError::throttled("busy", Some(Duration::from_millis(250))))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    // two hinted waits instead of the 1s and 2s backoff
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(500) && elapsed < Duration::from_secs(1),
        "{:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_retry_policy_does_not_retry_client_errors() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let result: Result<(), _> = RetryPolicy::default()
        .execute_async(|| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DocDbError::bad_request("malformed"))
            }
        })
        .await;

    assert_eq!(result.unwrap_err().status_code(), Some(400));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
