//! Document database feed-validation harness
//!
//! This crate drives a document database client through CRUD, feed and query operations
//! and validates what comes back: page counts, item totals, request charges, ordering and
//! how a feed terminates. It ships an in-process emulator of the service and a REST client
//! for a live account behind the same `DocumentClient` trait.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod http;
pub mod logging;
pub mod protocol;
pub mod retry;
pub mod subscriber;
pub mod validation;

pub use client::{DocumentClient, InMemoryClient, RequestOptions, RestClient};
pub use config::HarnessConfig;
pub use error::{DocDbError, DocDbResult, ErrorCategory};
pub use feed::{FeedOptions, FeedStream, Page};
pub use subscriber::TestSubscriber;
pub use validation::{
    validate_failure, validate_query_success, validate_success, FailureValidator,
    FeedResponseListValidator, FeedResponseValidator, ResourceResponseValidator,
    ValidationFailure, ValidationResult,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
