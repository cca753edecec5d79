// HTTP transport for the document service REST API
// Signs each attempt, maps service errors and retries throttled or transient failures

use crate::auth::{rfc1123_date, AuthMode};
use crate::error::{parse_service_error, sub_status, DocDbError, DocDbResult, StatusCode};
use crate::protocol::{ResourceLink, SqlQuerySpec};
use crate::retry::RetryPolicy;
use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub use self::config::{
    ConsistencyLevel, HttpConfig, HttpConfigBuilder, DEFAULT_API_VERSION, DEFAULT_BASE_URL,
};

mod config;

/// Header names of the REST dialect
pub mod headers {
    pub const AUTHORIZATION: &str = "authorization";
    pub const DATE: &str = "x-ms-date";
    pub const VERSION: &str = "x-ms-version";
    pub const CONSISTENCY_LEVEL: &str = "x-ms-consistency-level";
    pub const CONTINUATION: &str = "x-ms-continuation";
    pub const MAX_ITEM_COUNT: &str = "x-ms-max-item-count";
    pub const REQUEST_CHARGE: &str = "x-ms-request-charge";
    pub const ACTIVITY_ID: &str = "x-ms-activity-id";
    pub const SUB_STATUS: &str = "x-ms-substatus";
    pub const RETRY_AFTER_MS: &str = "x-ms-retry-after-ms";
    pub const IS_QUERY: &str = "x-ms-documentdb-isquery";
    pub const IS_UPSERT: &str = "x-ms-documentdb-is-upsert";
    pub const PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";
    pub const ENABLE_CROSS_PARTITION: &str = "x-ms-documentdb-query-enablecrosspartition";
    pub const OFFER_THROUGHPUT: &str = "x-ms-offer-throughput";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Where a request goes and what it is signed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub path: String,
    pub resource_type: &'static str,
    pub resource_link: String,
}

impl RequestTarget {
    /// A single addressed resource, e.g. `dbs/db/colls/c/docs/d`
    pub fn item(link: &ResourceLink) -> Self {
        let resource_link = match link {
            // offers are addressed by rid, which the service signs lower-cased
            ResourceLink::Offer { offer } => offer.to_lowercase(),
            other => other.to_string(),
        };
        Self {
            path: format!("/{}", link),
            resource_type: link.resource_type(),
            resource_link,
        }
    }

    /// The feed of `child_type` resources under `parent`, or at the account root
    pub fn feed(parent: Option<&ResourceLink>, child_type: &'static str) -> Self {
        match parent {
            Some(parent) => Self {
                path: format!("/{}/{}", parent, child_type),
                resource_type: child_type,
                resource_link: parent.to_string(),
            },
            None => Self {
                path: format!("/{}", child_type),
                resource_type: child_type,
                resource_link: String::new(),
            },
        }
    }
}

/// HTTP client for the document service
pub struct DocDbHttpClient {
    client: Client,
    auth_mode: Option<AuthMode>,
    base_url: String,
    api_version: String,
    consistency_level: Option<ConsistencyLevel>,
    default_headers: Vec<(String, String)>,
    retry: RetryPolicy,
}

impl DocDbHttpClient {
    pub fn new(config: HttpConfig) -> DocDbResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| DocDbError::Network {
                message: format!("failed to build HTTP client: {}", e),
                source: Some(Box::new(e)),
                retryable: false,
                unsent: true,
            })?;

        Ok(Self {
            client,
            auth_mode: None,
            base_url: config.base_url,
            api_version: config.api_version,
            consistency_level: config.consistency_level,
            default_headers: Vec::new(),
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(100),
                Duration::from_secs(5),
            ),
        })
    }

    pub fn with_auth(config: HttpConfig, auth_mode: AuthMode) -> DocDbResult<Self> {
        let mut client = Self::new(config)?;
        client.auth_mode = Some(auth_mode);
        Ok(client)
    }

    pub fn auth_mode(&self) -> Option<&AuthMode> {
        self.auth_mode.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Add a header that will be included in all requests
    pub fn add_default_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.default_headers.push((key.into(), value.into()));
    }

    pub fn get(&self, target: RequestTarget) -> HttpRequestBuilder<'_> {
        HttpRequestBuilder::new(self, HttpMethod::Get, target)
    }

    pub fn post(&self, target: RequestTarget) -> HttpRequestBuilder<'_> {
        HttpRequestBuilder::new(self, HttpMethod::Post, target)
    }

    pub fn put(&self, target: RequestTarget) -> HttpRequestBuilder<'_> {
        HttpRequestBuilder::new(self, HttpMethod::Put, target)
    }

    pub fn delete(&self, target: RequestTarget) -> HttpRequestBuilder<'_> {
        HttpRequestBuilder::new(self, HttpMethod::Delete, target)
    }
}

/// HTTP request builder for fluent API
pub struct HttpRequestBuilder<'a> {
    client: &'a DocDbHttpClient,
    method: HttpMethod,
    target: RequestTarget,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    // reads and queries can be resent after any transient failure
    replay_safe: bool,
}

impl<'a> HttpRequestBuilder<'a> {
    fn new(client: &'a DocDbHttpClient, method: HttpMethod, target: RequestTarget) -> Self {
        Self {
            client,
            method,
            target,
            headers: client.default_headers.clone(),
            body: None,
            replay_safe: method == HttpMethod::Get,
        }
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    pub fn header_opt(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.header(key, value),
            None => self,
        }
    }

    /// Set a JSON body
    pub fn json<T: Serialize>(mut self, body: &T) -> DocDbResult<Self> {
        let bytes = serde_json::to_vec(body).map_err(DocDbError::unserializable)?;
        self.body = Some(bytes);
        Ok(self.header("content-type", "application/json"))
    }

    /// Set a SQL query body
    pub fn query(mut self, spec: &SqlQuerySpec) -> DocDbResult<Self> {
        let bytes = serde_json::to_vec(spec).map_err(DocDbError::serialization)?;
        self.body = Some(bytes);
        self.replay_safe = true;
        Ok(self
            .header("content-type", "application/query+json")
            .header(headers::IS_QUERY, "true"))
    }

    /// Send the request, retrying per the client's policy, and decode a JSON body
    pub async fn send_json<T: DeserializeOwned>(self) -> DocDbResult<(T, ResponseHeaders)> {
        let response = self.send().await?;
        let headers = response.headers.clone();
        Ok((response.json()?, headers))
    }

    /// Send the request, retrying per the client's policy.
    ///
    /// Writes are only resent when the service cannot have applied them: throttling,
    /// retry-with, or a connection that was never established.
    pub async fn send(self) -> DocDbResult<HttpResponse> {
        let retry = &self.client.retry;
        if self.replay_safe {
            retry.execute_if(DocDbError::is_retryable, || self.attempt()).await
        } else {
            retry.execute_if(DocDbError::is_unapplied, || self.attempt()).await
        }
    }

    async fn attempt(&self) -> DocDbResult<HttpResponse> {
        let client = self.client;
        let url = format!("{}{}", client.base_url, self.target.path);
        let date = rfc1123_date(Utc::now());

        let mut request = client
            .client
            .request(self.method.to_reqwest(), &url)
            .header(headers::DATE, &date)
            .header(headers::VERSION, &client.api_version)
            .header("accept", "application/json");

        if let Some(auth) = &client.auth_mode {
            let token = auth.authorization_header(
                self.method.as_str(),
                self.target.resource_type,
                &self.target.resource_link,
                &date,
            )?;
            request = request.header(headers::AUTHORIZATION, token);
        }
        if let Some(level) = client.consistency_level {
            request = request.header(headers::CONSISTENCY_LEVEL, level.as_str());
        }
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }

        let started = Instant::now();
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status().as_u16();
        let headers = ResponseHeaders::from_header_map(response.headers());
        let body = response.bytes().await.map_err(map_transport_error)?.to_vec();

        debug!(
            method = self.method.as_str(),
            path = %self.target.path,
            status,
            request_charge = headers.request_charge,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );

        if (200..300).contains(&status) {
            return Ok(HttpResponse {
                status,
                headers,
                body,
            });
        }

        let text = String::from_utf8_lossy(&body);
        let err =
            parse_service_error(status, headers.sub_status, headers.activity_id.clone(), &text)
                .with_retry_after(headers.retry_after);
        if status == StatusCode::TooManyRequests.as_u16() {
            warn!(retry_after = ?headers.retry_after, "request throttled");
        }
        Err(err)
    }
}

fn map_transport_error(e: reqwest::Error) -> DocDbError {
    if e.is_connect() {
        DocDbError::Network {
            message: e.to_string(),
            retryable: true,
            unsent: true,
            source: Some(Box::new(e)),
        }
    } else if e.is_timeout() {
        DocDbError::timeout(e.to_string())
    } else {
        DocDbError::Network {
            message: e.to_string(),
            retryable: e.is_request(),
            unsent: false,
            source: Some(Box::new(e)),
        }
    }
}

/// The `x-ms-*` response headers the harness reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseHeaders {
    pub request_charge: f64,
    pub continuation: Option<String>,
    pub activity_id: Option<String>,
    pub sub_status: u32,
    pub retry_after: Option<Duration>,
}

impl ResponseHeaders {
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let text = |name: &str| {
            map.get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            request_charge: text(headers::REQUEST_CHARGE)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
            continuation: text(headers::CONTINUATION),
            activity_id: text(headers::ACTIVITY_ID),
            sub_status: text(headers::SUB_STATUS)
                .and_then(|v| v.parse().ok())
                .unwrap_or(sub_status::UNKNOWN),
            retry_after: text(headers::RETRY_AFTER_MS)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis),
        }
    }
}

/// A successful response with its body read
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: ResponseHeaders,
    body: Vec<u8>,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> DocDbResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }
}
