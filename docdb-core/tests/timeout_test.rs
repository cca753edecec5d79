// Validation calls fail exactly at their timeout and cancel the subscription

use docdb_core::error::{DocDbError, DocDbResult};
use docdb_core::protocol::{Document, ResourceResponse};
use docdb_core::validation::{
    single, validate_failure_with_timeout, validate_query_success, validate_success,
    FailureValidator, FeedResponseListValidator, ResourceResponseValidator,
};
use docdb_core::{FeedStream, Page};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const TIMEOUT: Duration = Duration::from_millis(500);

/// Flags when the stream holding it is dropped
struct DropGuard(Arc<AtomicBool>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn assert_at_boundary(started: Instant) {
    let elapsed = started.elapsed();
    assert!(elapsed >= TIMEOUT, "failed early after {:?}", elapsed);
    assert!(elapsed < TIMEOUT + Duration::from_millis(5), "failed late after {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_never_terminating_feed_times_out_at_the_boundary() {
    let validator = FeedResponseListValidator::<u32>::builder().build();
    let started = Instant::now();

    let failure = validate_query_success(FeedStream::pending(), &validator, TIMEOUT)
        .await
        .unwrap_err();

    assert!(failure.is_timeout());
    assert_at_boundary(started);
}

#[tokio::test(start_paused = true)]
async fn test_slow_pages_time_out_after_partial_delivery() {
    // one page right away, the next never arrives
    let feed =
        FeedStream::from_pages(vec![Page::new(vec![1u32], 1.0)]).chain(FeedStream::pending());
    let validator = FeedResponseListValidator::<u32>::builder().build();

    let failure = validate_query_success(feed, &validator, TIMEOUT).await.unwrap_err();
    assert!(failure.is_timeout());
}

#[tokio::test(start_paused = true)]
async fn test_feed_completing_before_deadline_passes() {
    let delayed = stream::once(async {
        tokio::time::sleep(TIMEOUT / 2).await;
        Ok(Page::new(vec![1u32, 2], 1.0))
    });
    let validator = FeedResponseListValidator::builder().total_size(2).build();

    let pages = validate_query_success(FeedStream::new(delayed), &validator, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(pages.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_drops_the_subscription() {
    let dropped = Arc::new(AtomicBool::new(false));
    let guard = DropGuard(Arc::clone(&dropped));

    let feed = stream::pending::<DocDbResult<Page<u32>>>().map(move |item| {
        let _held = &guard;
        item
    });
    let validator = FeedResponseListValidator::<u32>::builder().build();

    let failure = validate_query_success(feed, &validator, TIMEOUT).await.unwrap_err();

    assert!(failure.is_timeout());
    assert!(dropped.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_failure_validation_times_out_without_terminal_signal() {
    let started = Instant::now();
    let failure = validate_failure_with_timeout(
        FeedStream::<u32>::pending(),
        &FailureValidator::builder().build(),
        TIMEOUT,
    )
    .await
    .unwrap_err();

    assert!(failure.is_timeout());
    assert_at_boundary(started);
}

#[tokio::test(start_paused = true)]
async fn test_single_result_timeout() {
    let never = std::future::pending::<DocDbResult<ResourceResponse<Document>>>();
    let failure = validate_success(never, &ResourceResponseValidator::builder().build(), TIMEOUT)
        .await
        .unwrap_err();
    assert!(failure.is_timeout());

    let slow_error = async {
        tokio::time::sleep(TIMEOUT * 2).await;
        Err::<(), _>(DocDbError::conflict("late"))
    };
    let validator = FailureValidator::builder().build();
    let failure = validate_failure_with_timeout(single(slow_error), &validator, TIMEOUT)
        .await
        .unwrap_err();
    assert!(failure.is_timeout());
}
