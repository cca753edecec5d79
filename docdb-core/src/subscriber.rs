// Recording subscriber for feeds and single-result streams
// Drives a stream on its own task and keeps every signal for later assertions

use crate::error::{DocDbError, DocDbResult};
use crate::validation::{FailureValidator, ValidationFailure, ValidationResult};
use futures_util::{Stream, StreamExt};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

struct Recorded<T> {
    values: Vec<T>,
    error: Option<DocDbError>,
    completed: bool,
    after_terminal: usize,
}

impl<T> Recorded<T> {
    fn is_terminated(&self) -> bool {
        self.completed || self.error.is_some()
    }
}

/// Subscribes to a stream and records what it delivers.
///
/// The driving task keeps polling past the first error so that a source which keeps
/// emitting after its terminal signal is caught by [`assert_no_values_after_terminal`].
///
/// [`assert_no_values_after_terminal`]: TestSubscriber::assert_no_values_after_terminal
pub struct TestSubscriber<T> {
    state: Arc<Mutex<Recorded<T>>>,
    terminal: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> TestSubscriber<T> {
    /// Start consuming `stream` on a spawned task. Must be called inside a tokio runtime.
    pub fn subscribe<S>(stream: S) -> Self
    where
        S: Stream<Item = DocDbResult<T>> + Send + 'static,
    {
        let state = Arc::new(Mutex::new(Recorded {
            values: Vec::new(),
            error: None,
            completed: false,
            after_terminal: 0,
        }));
        let (tx, terminal) = watch::channel(false);

        let recorder = Arc::clone(&state);
        let task = tokio::spawn(async move {
            let mut stream = Box::pin(stream);

            while let Some(signal) = stream.next().await {
                let reached_terminal = {
                    let mut recorded = recorder.lock();
                    if recorded.is_terminated() {
                        recorded.after_terminal += 1;
                        warn!("signal delivered after terminal event");
                        false
                    } else {
                        match signal {
                            Ok(value) => {
                                recorded.values.push(value);
                                trace!(count = recorded.values.len(), "value recorded");
                                false
                            }
                            Err(err) => {
                                debug!(error = %err, "error recorded");
                                recorded.error = Some(err);
                                true
                            }
                        }
                    }
                };
                if reached_terminal {
                    tx.send_replace(true);
                }
            }

            {
                let mut recorded = recorder.lock();
                if !recorded.is_terminated() {
                    recorded.completed = true;
                    debug!(values = recorded.values.len(), "completion recorded");
                }
            }
            tx.send_replace(true);
        });

        Self {
            state,
            terminal,
            task,
        }
    }
}

impl<T> TestSubscriber<T> {
    /// Wait until an error or completion has been recorded
    pub async fn await_terminal_event(&self, timeout: Duration) -> ValidationResult<()> {
        let mut terminal = self.terminal.clone();
        let outcome = match tokio::time::timeout(timeout, terminal.wait_for(|done| *done)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ValidationFailure::mismatch(
                "terminal event",
                "error or completion",
                "subscription cancelled",
            )),
            Err(_) => Err(ValidationFailure::Timeout(timeout)),
        };
        outcome
    }

    pub fn value_count(&self) -> usize {
        self.state.lock().values.len()
    }

    pub fn values(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.state.lock().values.clone()
    }

    /// The recorded error, if the stream failed
    pub fn error(&self) -> Option<MappedMutexGuard<'_, DocDbError>> {
        MutexGuard::try_map(self.state.lock(), |recorded| recorded.error.as_mut()).ok()
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().is_terminated()
    }

    pub fn assert_value_count(&self, expected: usize) -> ValidationResult<()> {
        let actual = self.value_count();
        if actual == expected {
            Ok(())
        } else {
            Err(ValidationFailure::mismatch("value count", expected, actual))
        }
    }

    /// An error was recorded and it satisfies `validator`
    pub fn assert_error(&self, validator: &FailureValidator) -> ValidationResult<()> {
        let recorded = self.state.lock();
        match &recorded.error {
            Some(err) => validator.validate(err),
            None => Err(ValidationFailure::mismatch(
                "terminal error",
                "an error",
                if recorded.completed { "completion" } else { "no terminal event" },
            )),
        }
    }

    pub fn assert_complete(&self) -> ValidationResult<()> {
        let recorded = self.state.lock();
        if recorded.completed {
            return Ok(());
        }
        match &recorded.error {
            Some(err) => Err(ValidationFailure::mismatch(
                "completion",
                "completed",
                err.to_string(),
            )),
            None => Err(ValidationFailure::mismatch("completion", "completed", "still running")),
        }
    }

    pub fn assert_not_complete(&self) -> ValidationResult<()> {
        if self.is_terminated() {
            Err(ValidationFailure::mismatch("terminal event", "none", "terminated"))
        } else {
            Ok(())
        }
    }

    pub fn assert_no_values_after_terminal(&self) -> ValidationResult<()> {
        let extra = self.state.lock().after_terminal;
        if extra == 0 {
            Ok(())
        } else {
            Err(ValidationFailure::mismatch("signals after terminal event", 0, extra))
        }
    }

    /// Stop consuming; the stream is dropped with the driving task
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_finished() && !self.is_terminated()
    }
}

impl<T> Drop for TestSubscriber<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedStream, Page};
    use futures::stream;

    #[tokio::test]
    async fn test_records_values_and_completion() {
        let subscriber = TestSubscriber::subscribe(FeedStream::from_pages(vec![
            Page::new(vec![1u32, 2], 1.0),
            Page::new(vec![3], 1.0),
        ]));

        subscriber
            .await_terminal_event(Duration::from_secs(1))
            .await
            .unwrap();

        subscriber.assert_value_count(2).unwrap();
        subscriber.assert_complete().unwrap();
        assert!(subscriber.error().is_none());
        assert_eq!(subscriber.values()[1].items, vec![3]);
    }

    #[tokio::test]
    async fn test_raw_stream_emitting_after_error_is_flagged() {
        let raw = stream::iter(vec![
            Ok(1u32),
            Err(DocDbError::bad_request("boom")),
            Ok(2),
        ]);
        let subscriber = TestSubscriber::subscribe(raw);

        subscriber
            .await_terminal_event(Duration::from_secs(1))
            .await
            .unwrap();
        tokio::task::yield_now().await;

        subscriber
            .assert_error(&FailureValidator::builder().bad_request().build())
            .unwrap();
        assert!(!subscriber.is_completed());
        assert!(subscriber.assert_no_values_after_terminal().is_err());
        assert_eq!(subscriber.value_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_a_late_terminal_event() {
        let late = stream::once(async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(Page::new(vec![7u32], 1.0))
        });
        let subscriber = TestSubscriber::subscribe(FeedStream::new(late));
        assert!(!subscriber.is_terminated());

        subscriber
            .await_terminal_event(Duration::from_secs(1))
            .await
            .unwrap();

        subscriber.assert_complete().unwrap();
        subscriber.assert_value_count(1).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_stream_times_out() {
        let subscriber = TestSubscriber::subscribe(FeedStream::<u32>::pending());

        let failure = subscriber
            .await_terminal_event(Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(failure.is_timeout());
        subscriber.assert_not_complete().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_reports_no_terminal_event() {
        let subscriber = TestSubscriber::subscribe(FeedStream::<u32>::pending());
        subscriber.cancel();

        let failure = subscriber
            .await_terminal_event(Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(!failure.is_timeout());
        assert!(subscriber.is_cancelled());
    }
}
