// Document service clients
// One trait for every operation the suite drives, with an in-process and a REST implementation

pub mod emulator;
pub mod rest;

pub use emulator::InMemoryClient;
pub use rest::{RestClient, RestClientBuilder};

use crate::config::HarnessConfig;
use crate::error::DocDbResult;
use crate::feed::{FeedOptions, FeedStream};
use crate::protocol::{
    Database, Document, DocumentCollection, Offer, Query, ResourceLink, ResourceResponse,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Throughput given to a collection when the request does not set one
pub const DEFAULT_OFFER_THROUGHPUT: u32 = 400;

/// Per-request options for single-result operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Partition key value of the addressed document
    pub partition_key: Option<Value>,
    /// Throughput for a new collection
    pub offer_throughput: Option<u32>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition_key(mut self, value: impl Into<Value>) -> Self {
        self.partition_key = Some(value.into());
        self
    }

    pub fn offer_throughput(mut self, throughput: u32) -> Self {
        self.offer_throughput = Some(throughput);
        self
    }
}

/// Operations against the document service.
///
/// Single-result operations are async. Feed operations return a cold [`FeedStream`]: no
/// request is made until the stream is polled, and every call starts a new round trip.
#[async_trait]
pub trait DocumentClient: Send + Sync {
    async fn create_database(&self, database: Database) -> DocDbResult<ResourceResponse<Database>>;

    async fn read_database(&self, link: &ResourceLink) -> DocDbResult<ResourceResponse<Database>>;

    async fn delete_database(&self, link: &ResourceLink) -> DocDbResult<ResourceResponse<()>>;

    fn read_databases(&self, options: &FeedOptions) -> FeedStream<Database>;

    async fn create_collection(
        &self,
        database: &ResourceLink,
        collection: DocumentCollection,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<DocumentCollection>>;

    async fn read_collection(
        &self,
        link: &ResourceLink,
    ) -> DocDbResult<ResourceResponse<DocumentCollection>>;

    async fn delete_collection(&self, link: &ResourceLink) -> DocDbResult<ResourceResponse<()>>;

    fn read_collections(
        &self,
        database: &ResourceLink,
        options: &FeedOptions,
    ) -> FeedStream<DocumentCollection>;

    async fn create_document(
        &self,
        collection: &ResourceLink,
        document: Document,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<Document>>;

    async fn upsert_document(
        &self,
        collection: &ResourceLink,
        document: Document,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<Document>>;

    async fn read_document(
        &self,
        link: &ResourceLink,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<Document>>;

    async fn replace_document(
        &self,
        link: &ResourceLink,
        document: Document,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<Document>>;

    async fn delete_document(
        &self,
        link: &ResourceLink,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<()>>;

    fn read_documents(
        &self,
        collection: &ResourceLink,
        options: &FeedOptions,
    ) -> FeedStream<Document>;

    fn query_documents(
        &self,
        collection: &ResourceLink,
        query: &Query,
        options: &FeedOptions,
    ) -> FeedStream<Document>;

    async fn read_offer(&self, link: &ResourceLink) -> DocDbResult<ResourceResponse<Offer>>;

    async fn replace_offer(&self, offer: Offer) -> DocDbResult<ResourceResponse<Offer>>;

    fn read_offers(&self, options: &FeedOptions) -> FeedStream<Offer>;
}

/// Client selected by the harness configuration: REST when an endpoint and key are set,
/// the in-process emulator otherwise
pub fn from_config(config: &HarnessConfig) -> DocDbResult<Arc<dyn DocumentClient>> {
    match config.live_account() {
        Some((endpoint, key)) => {
            info!(endpoint, "using live account");
            let client = RestClient::builder()
                .endpoint(endpoint)
                .master_key(key)
                .timeout(config.timeout)
                .build()?;
            Ok(Arc::new(client))
        }
        None => {
            debug!("no live account configured; using the in-process emulator");
            Ok(Arc::new(InMemoryClient::new()))
        }
    }
}
