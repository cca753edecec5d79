// REST client for a live document service account
// Feeds follow the x-ms-continuation header until the service stops returning one

use super::{DocumentClient, RequestOptions};
use crate::auth::{AuthMode, MasterKeyAuth};
use crate::error::{DocDbError, DocDbResult};
use crate::feed::{FeedOptions, FeedStream, Page};
use crate::http::{
    headers, ConsistencyLevel, DocDbHttpClient, HttpConfig, HttpResponse, RequestTarget,
    ResponseHeaders,
};
use crate::protocol::{
    Database, Document, DocumentCollection, Offer, Query, ResourceLink, ResourceResponse,
    SqlQuerySpec,
};
use async_trait::async_trait;
use futures_util::stream;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const DATABASES_KEY: &str = "Databases";
const COLLECTIONS_KEY: &str = "DocumentCollections";
const DOCUMENTS_KEY: &str = "Documents";
const OFFERS_KEY: &str = "Offers";

/// Client for the service's REST API
pub struct RestClient {
    http: Arc<DocDbHttpClient>,
}

impl RestClient {
    /// Connect with an account master key
    pub fn new(endpoint: impl Into<String>, master_key: impl Into<String>) -> DocDbResult<Self> {
        Self::builder().endpoint(endpoint).master_key(master_key).build()
    }

    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::default()
    }

    pub fn endpoint(&self) -> &str {
        self.http.base_url()
    }

    fn feed<T>(&self, request: FeedRequest, options: &FeedOptions) -> FeedStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let http = Arc::clone(&self.http);
        let request = Arc::new(request);
        let start = Cursor::Next(options.request_continuation.clone());

        FeedStream::new(stream::unfold(start, move |cursor| {
            let http = Arc::clone(&http);
            let request = Arc::clone(&request);
            async move {
                let Cursor::Next(continuation) = cursor else {
                    return None;
                };
                match fetch_page::<T>(&http, &request, continuation).await {
                    Ok(page) => {
                        let next = match &page.continuation {
                            Some(token) => Cursor::Next(Some(token.clone())),
                            None => Cursor::Done,
                        };
                        Some((Ok(page), next))
                    }
                    Err(err) => Some((Err(err), Cursor::Done)),
                }
            }
        }))
    }
}

enum Cursor {
    Next(Option<String>),
    Done,
}

/// Everything needed to fetch any page of one feed
struct FeedRequest {
    target: RequestTarget,
    list_key: &'static str,
    query: Option<SqlQuerySpec>,
    partition_key: Option<Value>,
    cross_partition: bool,
    page_size: usize,
}

impl FeedRequest {
    fn read(target: RequestTarget, list_key: &'static str, options: &FeedOptions) -> Self {
        Self {
            target,
            list_key,
            query: None,
            partition_key: options.partition_key.clone(),
            cross_partition: options.enable_cross_partition_query,
            page_size: options.page_size(),
        }
    }

    fn query(mut self, spec: SqlQuerySpec) -> Self {
        self.query = Some(spec);
        self
    }
}

async fn fetch_page<T: DeserializeOwned>(
    http: &DocDbHttpClient,
    request: &FeedRequest,
    continuation: Option<String>,
) -> DocDbResult<Page<T>> {
    let builder = match &request.query {
        Some(spec) => http
            .post(request.target.clone())
            .query(spec)?
            .header(headers::ENABLE_CROSS_PARTITION, request.cross_partition.to_string()),
        None => http.get(request.target.clone()),
    };

    let (mut body, response_headers): (Value, ResponseHeaders) = builder
        .header(headers::MAX_ITEM_COUNT, request.page_size.to_string())
        .header_opt(headers::CONTINUATION, continuation)
        .header_opt(
            headers::PARTITION_KEY,
            request.partition_key.as_ref().map(partition_key_header),
        )
        .send_json()
        .await?;

    let items = match body.get_mut(request.list_key) {
        Some(list) => serde_json::from_value::<Vec<T>>(list.take())?,
        None => {
            return Err(DocDbError::decode(format!(
                "Feed response has no {} array",
                request.list_key
            )))
        }
    };

    debug!(
        path = %request.target.path,
        items = items.len(),
        request_charge = response_headers.request_charge,
        has_more = response_headers.continuation.is_some(),
        "feed page fetched"
    );

    let mut page = Page::new(items, response_headers.request_charge);
    if let Some(token) = response_headers.continuation {
        page = page.with_continuation(token);
    }
    if let Some(id) = response_headers.activity_id {
        page = page.with_activity_id(id);
    }
    Ok(page)
}

/// `x-ms-documentdb-partitionkey` carries the key as a one-element JSON array
fn partition_key_header(value: &Value) -> String {
    json!([value]).to_string()
}

fn resource_response<T: DeserializeOwned>(
    response: HttpResponse,
) -> DocDbResult<ResourceResponse<T>> {
    let resource = response.json()?;
    Ok(with_headers(
        ResourceResponse::new(resource, response.status, response.headers.request_charge),
        &response.headers,
    ))
}

fn empty_response(response: HttpResponse) -> ResourceResponse<()> {
    with_headers(
        ResourceResponse::new((), response.status, response.headers.request_charge),
        &response.headers,
    )
}

fn with_headers<T>(
    response: ResourceResponse<T>,
    headers: &ResponseHeaders,
) -> ResourceResponse<T> {
    match &headers.activity_id {
        Some(id) => response.with_activity_id(id.clone()),
        None => response,
    }
}

#[async_trait]
impl DocumentClient for RestClient {
    async fn create_database(&self, database: Database) -> DocDbResult<ResourceResponse<Database>> {
        let response = self
            .http
            .post(RequestTarget::feed(None, "dbs"))
            .json(&database)?
            .send()
            .await?;
        resource_response(response)
    }

    async fn read_database(&self, link: &ResourceLink) -> DocDbResult<ResourceResponse<Database>> {
        link.expect_database()?;
        resource_response(self.http.get(RequestTarget::item(link)).send().await?)
    }

    async fn delete_database(&self, link: &ResourceLink) -> DocDbResult<ResourceResponse<()>> {
        link.expect_database()?;
        Ok(empty_response(self.http.delete(RequestTarget::item(link)).send().await?))
    }

    fn read_databases(&self, options: &FeedOptions) -> FeedStream<Database> {
        self.feed(
            FeedRequest::read(RequestTarget::feed(None, "dbs"), DATABASES_KEY, options),
            options,
        )
    }

    async fn create_collection(
        &self,
        database: &ResourceLink,
        collection: DocumentCollection,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<DocumentCollection>> {
        database.expect_database()?;
        let response = self
            .http
            .post(RequestTarget::feed(Some(database), "colls"))
            .header_opt(
                headers::OFFER_THROUGHPUT,
                options.offer_throughput.map(|t| t.to_string()),
            )
            .json(&collection)?
            .send()
            .await?;
        resource_response(response)
    }

    async fn read_collection(
        &self,
        link: &ResourceLink,
    ) -> DocDbResult<ResourceResponse<DocumentCollection>> {
        link.expect_collection()?;
        resource_response(self.http.get(RequestTarget::item(link)).send().await?)
    }

    async fn delete_collection(&self, link: &ResourceLink) -> DocDbResult<ResourceResponse<()>> {
        link.expect_collection()?;
        Ok(empty_response(self.http.delete(RequestTarget::item(link)).send().await?))
    }

    fn read_collections(
        &self,
        database: &ResourceLink,
        options: &FeedOptions,
    ) -> FeedStream<DocumentCollection> {
        if let Err(err) = database.expect_database() {
            return FeedStream::failed(err);
        }
        let target = RequestTarget::feed(Some(database), "colls");
        self.feed(FeedRequest::read(target, COLLECTIONS_KEY, options), options)
    }

    async fn create_document(
        &self,
        collection: &ResourceLink,
        document: Document,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<Document>> {
        collection.expect_collection()?;
        let response = self
            .http
            .post(RequestTarget::feed(Some(collection), "docs"))
            .header_opt(
                headers::PARTITION_KEY,
                options.partition_key.as_ref().map(partition_key_header),
            )
            .json(&document)?
            .send()
            .await?;
        resource_response(response)
    }

    async fn upsert_document(
        &self,
        collection: &ResourceLink,
        document: Document,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<Document>> {
        collection.expect_collection()?;
        let response = self
            .http
            .post(RequestTarget::feed(Some(collection), "docs"))
            .header(headers::IS_UPSERT, "true")
            .header_opt(
                headers::PARTITION_KEY,
                options.partition_key.as_ref().map(partition_key_header),
            )
            .json(&document)?
            .send()
            .await?;
        resource_response(response)
    }

    async fn read_document(
        &self,
        link: &ResourceLink,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<Document>> {
        link.expect_document()?;
        let response = self
            .http
            .get(RequestTarget::item(link))
            .header_opt(
                headers::PARTITION_KEY,
                options.partition_key.as_ref().map(partition_key_header),
            )
            .send()
            .await?;
        resource_response(response)
    }

    async fn replace_document(
        &self,
        link: &ResourceLink,
        document: Document,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<Document>> {
        link.expect_document()?;
        let response = self
            .http
            .put(RequestTarget::item(link))
            .header_opt(
                headers::PARTITION_KEY,
                options.partition_key.as_ref().map(partition_key_header),
            )
            .json(&document)?
            .send()
            .await?;
        resource_response(response)
    }

    async fn delete_document(
        &self,
        link: &ResourceLink,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<()>> {
        link.expect_document()?;
        let response = self
            .http
            .delete(RequestTarget::item(link))
            .header_opt(
                headers::PARTITION_KEY,
                options.partition_key.as_ref().map(partition_key_header),
            )
            .send()
            .await?;
        Ok(empty_response(response))
    }

    fn read_documents(
        &self,
        collection: &ResourceLink,
        options: &FeedOptions,
    ) -> FeedStream<Document> {
        if let Err(err) = collection.expect_collection() {
            return FeedStream::failed(err);
        }
        let target = RequestTarget::feed(Some(collection), "docs");
        self.feed(FeedRequest::read(target, DOCUMENTS_KEY, options), options)
    }

    fn query_documents(
        &self,
        collection: &ResourceLink,
        query: &Query,
        options: &FeedOptions,
    ) -> FeedStream<Document> {
        if let Err(err) = collection.expect_collection() {
            return FeedStream::failed(err);
        }
        let request =
            FeedRequest::read(RequestTarget::feed(Some(collection), "docs"), DOCUMENTS_KEY, options)
                .query(query.to_sql());
        self.feed(request, options)
    }

    async fn read_offer(&self, link: &ResourceLink) -> DocDbResult<ResourceResponse<Offer>> {
        link.expect_offer()?;
        resource_response(self.http.get(RequestTarget::item(link)).send().await?)
    }

    async fn replace_offer(&self, offer: Offer) -> DocDbResult<ResourceResponse<Offer>> {
        let link = ResourceLink::offer(offer.id.clone());
        let response = self
            .http
            .put(RequestTarget::item(&link))
            .json(&offer)?
            .send()
            .await?;
        resource_response(response)
    }

    fn read_offers(&self, options: &FeedOptions) -> FeedStream<Offer> {
        self.feed(
            FeedRequest::read(RequestTarget::feed(None, "offers"), OFFERS_KEY, options),
            options,
        )
    }
}

/// Builder for [`RestClient`]
#[derive(Default)]
pub struct RestClientBuilder {
    endpoint: Option<String>,
    master_key: Option<String>,
    resource_token: Option<String>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    consistency_level: Option<ConsistencyLevel>,
    accept_invalid_certs: bool,
}

impl RestClientBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn master_key(mut self, key: impl Into<String>) -> Self {
        self.master_key = Some(key.into());
        self
    }

    pub fn resource_token(mut self, token: impl Into<String>) -> Self {
        self.resource_token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency_level = Some(level);
        self
    }

    /// Trust the self-signed certificate of a local emulator
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn build(self) -> DocDbResult<RestClient> {
        let endpoint = self.endpoint.ok_or_else(|| DocDbError::InvalidArgument {
            message: "An endpoint is required".to_string(),
            source: None,
        })?;

        let auth = match (self.master_key, self.resource_token) {
            (Some(key), _) => {
                // fail on a malformed key now rather than on the first request
                MasterKeyAuth::new(&key)?;
                AuthMode::master_key(key)
            }
            (None, Some(token)) => AuthMode::resource_token(token),
            (None, None) => {
                return Err(DocDbError::Authorization {
                    message: "A master key or resource token is required".to_string(),
                })
            }
        };

        let mut config = HttpConfig::builder()
            .base_url(endpoint)
            .accept_invalid_certs(self.accept_invalid_certs);
        if let Some(timeout) = self.timeout {
            config = config.timeout(timeout);
        }
        if let Some(retries) = self.max_retries {
            config = config.max_retries(retries);
        }
        if let Some(level) = self.consistency_level {
            config = config.consistency_level(level);
        }

        let http = DocDbHttpClient::with_auth(config.build(), auth)?;
        info!(endpoint = http.base_url(), "REST client ready");
        Ok(RestClient {
            http: Arc::new(http),
        })
    }
}
