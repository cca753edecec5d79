//! Feed validation protocol.
//!
//! Each entry point subscribes to a feed (or a single-result operation), drains it under a
//! deadline and applies a validator once the terminal signal arrives. Every mismatch is
//! returned as a [`ValidationFailure`]; nothing is retried or swallowed.

mod failure;
mod feed;
mod resource;

pub use failure::{FailureValidator, FailureValidatorBuilder};
pub use feed::{
    FeedResponseListValidator, FeedResponseListValidatorBuilder, FeedResponseValidator,
    FeedResponseValidatorBuilder,
};
pub use resource::{ResourceResponseValidator, ResourceResponseValidatorBuilder};

use crate::config::DEFAULT_TIMEOUT;
use crate::error::{DocDbError, DocDbResult};
use crate::feed::Page;
use crate::protocol::ResourceResponse;
use futures_util::stream::{self, Stream, StreamExt};
use futures_util::pin_mut;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

/// Why a validation call failed
#[derive(Debug, Error)]
pub enum ValidationFailure {
    #[error("{check} mismatch\n  expected: {expected}\n    actual: {actual}")]
    Assertion {
        check: String,
        expected: String,
        actual: String,
    },

    #[error("no terminal signal observed within {0:?}")]
    Timeout(Duration),

    #[error("operation failed unexpectedly: {0}")]
    UnexpectedError(#[source] DocDbError),

    #[error("expected the operation to fail but it completed successfully")]
    ExpectedError,

    #[error("failed to start validation runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl ValidationFailure {
    /// An expected-vs-actual mismatch rendered with `Debug`
    pub fn mismatch(check: impl Into<String>, expected: impl Debug, actual: impl Debug) -> Self {
        Self::Assertion {
            check: check.into(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    /// Prefix the failing check with the page it was evaluated against
    pub(crate) fn in_page(self, index: usize) -> Self {
        match self {
            Self::Assertion {
                check,
                expected,
                actual,
            } => Self::Assertion {
                check: format!("page[{}].{}", index, check),
                expected,
                actual,
            },
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The service error behind an `UnexpectedError`
    pub fn unexpected_error(&self) -> Option<&DocDbError> {
        match self {
            Self::UnexpectedError(err) => Some(err),
            _ => None,
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationFailure>;

/// Drain a feed that must succeed and validate the realised pages.
///
/// Pages are accumulated in arrival order. An error signal fails the call with the
/// underlying error untouched. If completion is not observed within `timeout` the feed is
/// dropped, which cancels the subscription, and the call fails with
/// [`ValidationFailure::Timeout`]. On success the pages are handed back for further checks.
pub async fn validate_query_success<T, S>(
    feed: S,
    validator: &FeedResponseListValidator<T>,
    timeout: Duration,
) -> ValidationResult<Vec<Page<T>>>
where
    S: Stream<Item = DocDbResult<Page<T>>>,
{
    let span = info_span!("validate_feed", timeout_ms = timeout.as_millis() as u64);

    async move {
        pin_mut!(feed);
        let mut pages: Vec<Page<T>> = Vec::new();

        let drain = async {
            while let Some(signal) = feed.next().await {
                match signal {
                    Ok(page) => {
                        debug!(
                            index = pages.len(),
                            items = page.len(),
                            request_charge = page.request_charge,
                            has_more = page.has_more(),
                            "page received"
                        );
                        pages.push(page);
                    }
                    Err(err) => return Err(ValidationFailure::UnexpectedError(err)),
                }
            }
            Ok(())
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => {
                warn!(error = %failure, "feed terminated with an error");
                return Err(failure);
            }
            Err(_) => {
                warn!(?timeout, "feed did not complete in time");
                return Err(ValidationFailure::Timeout(timeout));
            }
        }

        if let Err(failure) = validator.validate(&pages) {
            warn!(error = %failure, "feed validation failed");
            return Err(failure);
        }

        info!(
            pages = pages.len(),
            items = pages.iter().map(Page::len).sum::<usize>(),
            "feed validated"
        );
        Ok(pages)
    }
    .instrument(span)
    .await
}

/// Blocking bridge over [`validate_query_success`] for synchronous callers.
///
/// Runs the protocol on a private current-thread runtime, so it must not be called from
/// inside an async context.
pub fn validate_query_success_blocking<T, S>(
    feed: S,
    validator: &FeedResponseListValidator<T>,
    timeout: Duration,
) -> ValidationResult<Vec<Page<T>>>
where
    S: Stream<Item = DocDbResult<Page<T>>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(validate_query_success(feed, validator, timeout))
}

/// Expect a feed or single-result stream to terminate with an error, bounded by the
/// default timeout.
pub async fn validate_failure<T, S>(
    signals: S,
    validator: &FailureValidator,
) -> ValidationResult<DocDbError>
where
    S: Stream<Item = DocDbResult<T>>,
{
    validate_failure_with_timeout(signals, validator, DEFAULT_TIMEOUT).await
}

/// Expect a stream to terminate with an error and match that error.
///
/// Values before the terminal signal are skipped. Exactly one terminal signal is consumed;
/// the stream is dropped right after it. The matched error is returned.
pub async fn validate_failure_with_timeout<T, S>(
    signals: S,
    validator: &FailureValidator,
    timeout: Duration,
) -> ValidationResult<DocDbError>
where
    S: Stream<Item = DocDbResult<T>>,
{
    let span = info_span!("validate_failure", timeout_ms = timeout.as_millis() as u64);

    async move {
        pin_mut!(signals);

        let terminal = async {
            let mut skipped = 0usize;
            loop {
                match signals.next().await {
                    Some(Ok(_)) => skipped += 1,
                    Some(Err(err)) => return Some((err, skipped)),
                    None => return None,
                }
            }
        };

        let (error, skipped) = match tokio::time::timeout(timeout, terminal).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                warn!("operation completed but an error was expected");
                return Err(ValidationFailure::ExpectedError);
            }
            Err(_) => return Err(ValidationFailure::Timeout(timeout)),
        };

        debug!(skipped, error = %error, "terminal error received");
        validator.validate(&error)?;
        info!(category = ?error.category(), "failure validated");
        Ok(error)
    }
    .instrument(span)
    .await
}

/// Await a single-result operation that must succeed and validate its response
pub async fn validate_success<T, F>(
    operation: F,
    validator: &ResourceResponseValidator<T>,
    timeout: Duration,
) -> ValidationResult<ResourceResponse<T>>
where
    F: Future<Output = DocDbResult<ResourceResponse<T>>>,
{
    let response = match tokio::time::timeout(timeout, operation).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => return Err(ValidationFailure::UnexpectedError(err)),
        Err(_) => return Err(ValidationFailure::Timeout(timeout)),
    };

    validator.validate(&response)?;
    debug!(request_charge = response.request_charge, "response validated");
    Ok(response)
}

/// Lift a single-result operation into a one-signal stream for [`validate_failure`]
pub fn single<T, F>(operation: F) -> impl Stream<Item = DocDbResult<T>>
where
    F: Future<Output = DocDbResult<T>>,
{
    stream::once(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedStream;

    fn pages(sizes: &[usize]) -> Vec<Page<u32>> {
        sizes
            .iter()
            .map(|n| Page::new((0..*n as u32).collect(), 1.0))
            .collect()
    }

    #[tokio::test]
    async fn test_success_returns_pages_in_order() {
        let validator = FeedResponseListValidator::builder()
            .total_size(5)
            .number_of_pages(3)
            .build();

        let realised = validate_query_success(
            FeedStream::from_pages(pages(&[2, 2, 1])),
            &validator,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(realised.len(), 3);
        assert_eq!(realised[2].len(), 1);
    }

    #[tokio::test]
    async fn test_success_propagates_feed_error() {
        let validator = FeedResponseListValidator::<u32>::builder().build();
        let feed = FeedStream::from_results(vec![
            Ok(Page::new(vec![1], 1.0)),
            Err(DocDbError::not_found("collection gone")),
        ]);

        let failure = validate_query_success(feed, &validator, Duration::from_secs(1))
            .await
            .unwrap_err();

        let err = failure.unexpected_error().unwrap();
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(err.message(), "collection gone");
    }

    #[test]
    fn test_blocking_bridge() {
        let validator = FeedResponseListValidator::builder().total_size(3).build();
        let realised = validate_query_success_blocking(
            FeedStream::from_pages(pages(&[3])),
            &validator,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(realised.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_on_completion_without_error() {
        let validator = FailureValidator::builder().build();
        let failure = validate_failure(FeedStream::from_pages(pages(&[1])), &validator)
            .await
            .unwrap_err();

        assert!(matches!(failure, ValidationFailure::ExpectedError));
    }

    #[tokio::test]
    async fn test_failure_single_result() {
        let validator = FailureValidator::builder().status_code(409).build();
        let op = async { Err::<u32, _>(DocDbError::conflict("exists")) };

        let err = validate_failure(single(op), &validator).await.unwrap();
        assert_eq!(err.message(), "exists");
    }

    #[test]
    fn test_mismatch_renders_diff() {
        let failure = ValidationFailure::mismatch("total size", 5, 4).in_page(2);
        let text = failure.to_string();

        assert!(text.starts_with("page[2].total size mismatch"));
        assert!(text.contains("expected: 5"));
        assert!(text.contains("actual: 4"));
    }
}
