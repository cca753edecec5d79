// Shared fixtures for the integration suites
// Client construction, unique ids, collection seeding and cleanup

#![allow(dead_code)]

use docdb_core::client::{from_config, DocumentClient, RequestOptions};
use docdb_core::config::HarnessConfig;
use docdb_core::error::{DocDbError, DocDbResult};
use docdb_core::logging::init_logging;
use docdb_core::protocol::{Database, Document, DocumentCollection, Offer, Resource, ResourceLink};
use docdb_core::validation::{validate_failure_with_timeout, FailureValidator, ValidationResult};
use docdb_core::FeedOptions;
use futures::Stream;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use uuid::Uuid;

static INIT: Once = Once::new();

pub const PARTITION_KEY_PATH: &str = "/mypk";

/// Logging as configured by `DOCDB_LOG_FORMAT`, routed through the test writer
pub fn init_test_logging() {
    INIT.call_once(|| {
        let mut log = test_config().log;
        log.test_writer = true;
        init_logging(log);
    });
}

/// Generate a unique id for test isolation
pub fn generate_test_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_{}_{}", Uuid::new_v4().simple(), count)
}

pub fn test_config() -> HarnessConfig {
    HarnessConfig::from_env()
}

/// Bound for validation calls, from `DOCDB_TIMEOUT_MS`
pub fn validation_timeout() -> Duration {
    test_config().timeout
}

/// Feed options with the page size from `DOCDB_PAGE_SIZE`
pub fn feed_options() -> FeedOptions {
    test_config().feed_options()
}

/// `validate_failure` bounded by the configured timeout
pub async fn expect_failure<T, S>(
    signals: S,
    validator: &FailureValidator,
) -> ValidationResult<DocDbError>
where
    S: Stream<Item = DocDbResult<T>>,
{
    validate_failure_with_timeout(signals, validator, validation_timeout()).await
}

/// Client chosen from `DOCDB_*` variables; the emulator when none are set
pub fn create_test_client() -> Arc<dyn DocumentClient> {
    init_test_logging();
    from_config(&test_config()).expect("failed to build client from DOCDB_* configuration")
}

/// A database and collection created for one test
pub struct TestCollection {
    pub client: Arc<dyn DocumentClient>,
    pub database: ResourceLink,
    pub link: ResourceLink,
    pub collection: DocumentCollection,
    cleanup: CleanupTracker,
}

impl TestCollection {
    pub fn document_link(&self, id: &str) -> ResourceLink {
        match &self.link {
            ResourceLink::Collection {
                database,
                collection,
            } => ResourceLink::document(database.clone(), collection.clone(), id),
            _ => unreachable!("fixture always holds a collection link"),
        }
    }

    /// The offer attached to this collection
    pub async fn offer(&self) -> DocDbResult<Offer> {
        let rid = self.collection.resource_id().unwrap_or_default().to_string();
        let offers = self
            .client
            .read_offers(&feed_options())
            .collect_items()
            .await?;
        offers
            .into_iter()
            .find(|offer| offer.offer_resource_id == rid)
            .ok_or_else(|| DocDbError::not_found(format!("no offer for collection {}", rid)))
    }

    pub async fn cleanup(&self) -> DocDbResult<()> {
        self.cleanup.run(self.client.as_ref()).await
    }
}

/// Create a fresh database holding one collection, optionally partitioned on `/mypk`
pub async fn create_test_collection(
    client: Arc<dyn DocumentClient>,
    partitioned: bool,
) -> DocDbResult<TestCollection> {
    let db_id = generate_test_id();
    let coll_id = generate_test_id();
    let database = ResourceLink::database(db_id.clone());
    let cleanup = CleanupTracker::default();

    client.create_database(Database::new(db_id)).await?;
    cleanup.track(database.clone());

    let definition = if partitioned {
        DocumentCollection::partitioned(coll_id.clone(), PARTITION_KEY_PATH)
    } else {
        DocumentCollection::new(coll_id.clone())
    };
    let collection = client
        .create_collection(&database, definition, &RequestOptions::default())
        .await?
        .resource;

    Ok(TestCollection {
        client,
        link: ResourceLink::collection(database.expect_database()?, coll_id),
        database,
        collection,
        cleanup,
    })
}

/// Insert `count` documents `doc_0..doc_{count-1}`, spreading them over `partitions` keys
pub async fn seed_documents(
    fixture: &TestCollection,
    count: usize,
    partitions: usize,
) -> DocDbResult<Vec<Document>> {
    let mut created = Vec::with_capacity(count);
    for i in 0..count {
        let document = Document::new(format!("doc_{}", i))
            .with("mypk", format!("pk_{}", i % partitions.max(1)))
            .with("seq", i as u64);
        let response = fixture
            .client
            .create_document(&fixture.link, document, &RequestOptions::default())
            .await?;
        created.push(response.resource);
    }
    Ok(created)
}

pub fn ids(documents: &[Document]) -> Vec<String> {
    documents.iter().map(|d| d.id.clone()).collect()
}

/// Databases to delete when a test finishes
#[derive(Default, Clone)]
pub struct CleanupTracker {
    databases: Arc<Mutex<Vec<ResourceLink>>>,
}

impl CleanupTracker {
    pub fn track(&self, database: ResourceLink) {
        self.databases.lock().push(database);
    }

    pub fn tracked(&self) -> usize {
        self.databases.lock().len()
    }

    pub async fn run(&self, client: &dyn DocumentClient) -> DocDbResult<()> {
        let pending: Vec<ResourceLink> = self.databases.lock().drain(..).collect();
        for database in pending {
            match client.delete_database(&database).await {
                Ok(_) => {}
                Err(err) if err.status_code() == Some(404) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}
