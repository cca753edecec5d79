//! Paged feeds.
//!
//! A feed is the result of a listing or query operation: a lazy, finite sequence of
//! [`Page`]s that ends either with completion or with an error. [`FeedStream`] enforces
//! the terminal contract: after the first error it yields nothing, even if the source
//! behind it would keep producing pages.

use crate::config::DEFAULT_MAX_ITEM_COUNT;
use crate::error::{DocDbError, DocDbResult};
use crate::logging::generate_activity_id;
use futures_util::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};

/// One round trip of a feed: items plus response metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub request_charge: f64,
    /// Opaque cursor for the next page; `None` on the last page
    pub continuation: Option<String>,
    pub activity_id: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request_charge: f64) -> Self {
        Self {
            items,
            request_charge,
            continuation: None,
            activity_id: None,
        }
    }

    pub fn with_continuation(mut self, token: impl Into<String>) -> Self {
        self.continuation = Some(token.into());
        self
    }

    pub fn with_activity_id(mut self, id: impl Into<String>) -> Self {
        self.activity_id = Some(id.into());
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.continuation.is_some()
    }
}

/// Request options for feed operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedOptions {
    /// Maximum items per page; `None` or `0` uses the service default
    pub max_item_count: Option<usize>,
    pub enable_cross_partition_query: bool,
    /// Pin the request to a single partition key value
    pub partition_key: Option<Value>,
    /// Resume from a continuation token returned by an earlier page
    pub request_continuation: Option<String>,
}

impl FeedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_item_count(mut self, count: usize) -> Self {
        self.max_item_count = Some(count);
        self
    }

    pub fn enable_cross_partition_query(mut self, enabled: bool) -> Self {
        self.enable_cross_partition_query = enabled;
        self
    }

    pub fn partition_key(mut self, value: impl Into<Value>) -> Self {
        self.partition_key = Some(value.into());
        self
    }

    pub fn request_continuation(mut self, token: impl Into<String>) -> Self {
        self.request_continuation = Some(token.into());
        self
    }

    /// Effective page size
    pub fn page_size(&self) -> usize {
        match self.max_item_count {
            Some(count) if count > 0 => count,
            _ => DEFAULT_MAX_ITEM_COUNT,
        }
    }
}

/// A single-subscriber stream of pages that stops after its first error
pub struct FeedStream<T> {
    inner: BoxStream<'static, DocDbResult<Page<T>>>,
    terminated: bool,
}

impl<T: Send + 'static> FeedStream<T> {
    pub fn new<S>(source: S) -> Self
    where
        S: Stream<Item = DocDbResult<Page<T>>> + Send + 'static,
    {
        Self {
            inner: source.boxed(),
            terminated: false,
        }
    }

    pub fn from_pages(pages: Vec<Page<T>>) -> Self {
        Self::new(stream::iter(pages.into_iter().map(Ok)))
    }

    /// Emit the given signals in order; anything after the first error is never delivered
    pub fn from_results(results: Vec<DocDbResult<Page<T>>>) -> Self {
        Self::new(stream::iter(results))
    }

    pub fn empty() -> Self {
        Self::new(stream::empty())
    }

    pub fn failed(err: DocDbError) -> Self {
        Self::new(stream::once(async move { Err(err) }))
    }

    /// A feed that never emits and never terminates
    pub fn pending() -> Self {
        Self::new(stream::pending())
    }

    /// Concatenate two feeds. An error in `self` still ends the combined feed.
    pub fn chain(self, next: FeedStream<T>) -> Self {
        Self::new(StreamExt::chain(self, next))
    }

    /// Drain the feed into its pages, stopping at the first error
    pub async fn collect_pages(self) -> DocDbResult<Vec<Page<T>>> {
        self.try_collect().await
    }

    /// Drain the feed and flatten the pages into their items
    pub async fn collect_items(self) -> DocDbResult<Vec<T>> {
        let pages = self.collect_pages().await?;
        Ok(pages.into_iter().flat_map(|page| page.items).collect())
    }
}

impl<T> Stream for FeedStream<T> {
    type Item = DocDbResult<Page<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Err(err))) => {
                this.terminated = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.terminated = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

enum PagerState<T, F> {
    Pending(F),
    Paging { remaining: Vec<T>, offset: usize },
    Done,
}

/// Page a result set the way the service does.
///
/// `load` runs on first poll, so nothing happens until the feed is consumed. Pages hold at
/// most `options.page_size()` items; all but the last carry a continuation token. An empty
/// result still produces one empty page. `charge` prices each page from its item count.
pub fn paginate<T, F>(load: F, options: &FeedOptions, charge: fn(usize) -> f64) -> FeedStream<T>
where
    T: Send + 'static,
    F: FnOnce() -> DocDbResult<Vec<T>> + Send + 'static,
{
    let page_size = options.page_size();
    let start = match options.request_continuation.as_deref().map(parse_continuation) {
        None => 0,
        Some(Ok(offset)) => offset,
        Some(Err(err)) => return FeedStream::failed(err),
    };

    let source = stream::unfold(PagerState::Pending(load), move |state| async move {
        match state {
            PagerState::Pending(load) => match load() {
                Ok(items) => {
                    let remaining: Vec<T> = items.into_iter().skip(start).collect();
                    Some(next_page(remaining, start, page_size, charge))
                }
                Err(err) => Some((Err(err), PagerState::Done)),
            },
            PagerState::Paging { remaining, .. } if remaining.is_empty() => None,
            PagerState::Paging { remaining, offset } => {
                Some(next_page(remaining, offset, page_size, charge))
            }
            PagerState::Done => None,
        }
    });

    FeedStream::new(source)
}

fn next_page<T, F>(
    mut items: Vec<T>,
    offset: usize,
    page_size: usize,
    charge: fn(usize) -> f64,
) -> (DocDbResult<Page<T>>, PagerState<T, F>) {
    let rest = items.split_off(page_size.min(items.len()));
    let next_offset = offset + items.len();

    let mut page = Page::new(items, charge(next_offset - offset))
        .with_activity_id(generate_activity_id());
    if !rest.is_empty() {
        page = page.with_continuation(next_offset.to_string());
    }

    (
        Ok(page),
        PagerState::Paging {
            remaining: rest,
            offset: next_offset,
        },
    )
}

fn parse_continuation(token: &str) -> DocDbResult<usize> {
    token
        .parse::<usize>()
        .map_err(|_| DocDbError::bad_request(format!("Invalid continuation token: {}", token)))
}
