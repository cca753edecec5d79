//! In-process emulator of the document service.
//!
//! Holds databases, collections, documents and offers in memory with the service's
//! observable behaviour: 404 for missing resources, 409 for duplicate ids, request charges
//! on every response, insertion-ordered feeds paged with continuation tokens and the
//! cross-partition query rule for partitioned collections.

use super::{DocumentClient, RequestOptions, DEFAULT_OFFER_THROUGHPUT};
use crate::error::{DocDbError, DocDbResult, StatusCode};
use crate::feed::{paginate, FeedOptions, FeedStream};
use crate::logging::generate_activity_id;
use crate::protocol::{
    is_valid_id, Database, Document, DocumentCollection, Offer, OfferContent, Query, Resource,
    ResourceLink, ResourceResponse, SystemProperties,
};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub const POINT_READ_CHARGE: f64 = 1.0;
pub const WRITE_BASE_CHARGE: f64 = 5.0;
pub const WRITE_CHARGE_PER_KIB: f64 = 0.01;
pub const FEED_PAGE_BASE_CHARGE: f64 = 2.0;
pub const FEED_CHARGE_PER_ITEM: f64 = 0.1;

/// Lowest throughput an offer accepts
pub const MIN_OFFER_THROUGHPUT: u32 = 400;

pub const CROSS_PARTITION_DISABLED_MESSAGE: &str =
    "Cross partition query is required but disabled. \
     Please set x-ms-documentdb-query-enablecrosspartition to true, specify \
     x-ms-documentdb-partitionkey, or revise your query to avoid this exception.";

const NOT_FOUND_MESSAGE: &str = "Entity with the specified id does not exist in the system.";
const CONFLICT_MESSAGE: &str = "Entity with the specified id already exists in the system.";
const PARTITION_KEY_MISMATCH_MESSAGE: &str =
    "PartitionKey extracted from document doesn't match the one specified in the header";

fn write_charge(bytes: usize) -> f64 {
    WRITE_BASE_CHARGE + WRITE_CHARGE_PER_KIB * (bytes as f64 / 1024.0)
}

fn feed_charge(items: usize) -> f64 {
    FEED_PAGE_BASE_CHARGE + FEED_CHARGE_PER_ITEM * items as f64
}

fn serialized_size<T: Serialize>(resource: &T) -> usize {
    serde_json::to_vec(resource).map(|v| v.len()).unwrap_or(0)
}

fn new_rid() -> String {
    base64::engine::general_purpose::URL_SAFE.encode(rand::random::<[u8; 6]>())
}

fn stamp(system: &mut SystemProperties, rid: String, self_link: String) {
    system.rid = Some(rid);
    system.self_link = Some(self_link);
    touch(system);
}

/// New etag and timestamp after a write
fn touch(system: &mut SystemProperties) {
    system.etag = Some(format!("\"{}\"", Uuid::new_v4()));
    system.ts = Some(Utc::now().timestamp());
}

fn rid_of<R: Resource>(resource: &R) -> &str {
    resource.resource_id().unwrap_or_default()
}

fn not_found(link: &ResourceLink) -> DocDbError {
    DocDbError::not_found(format!("{} ({})", NOT_FOUND_MESSAGE, link))
}

fn require_id(id: &str) -> DocDbResult<()> {
    if !is_valid_id(id) {
        return Err(DocDbError::bad_request("The resource id must be a non-empty string"));
    }
    Ok(())
}

fn respond<T>(resource: T, status: StatusCode, charge: f64) -> DocDbResult<ResourceResponse<T>> {
    let response = ResourceResponse::new(resource, status.as_u16(), charge);
    Ok(response.with_activity_id(generate_activity_id()))
}

#[derive(Default)]
struct Account {
    databases: Vec<DatabaseEntry>,
    offers: Vec<Offer>,
}

struct DatabaseEntry {
    database: Database,
    collections: Vec<CollectionEntry>,
}

struct CollectionEntry {
    collection: DocumentCollection,
    documents: Vec<Document>,
}

impl CollectionEntry {
    fn position(&self, id: &str) -> Option<usize> {
        self.documents.iter().position(|d| d.id == id)
    }

    fn document_self_link(&self, rid: &str) -> String {
        format!("{}docs/{}/", self.collection.self_link().unwrap_or_default(), rid)
    }

    /// Options that pin a document in a partitioned collection must agree with its key
    fn check_partition_key(
        &self,
        document: &Document,
        options: &RequestOptions,
    ) -> DocDbResult<()> {
        let (Some(definition), Some(expected)) =
            (&self.collection.partition_key, &options.partition_key)
        else {
            return Ok(());
        };
        if document.partition_key_value(definition) == Some(expected) {
            Ok(())
        } else {
            Err(DocDbError::bad_request(PARTITION_KEY_MISMATCH_MESSAGE))
        }
    }

    /// Point operations on a partitioned collection must name the partition
    fn locate(&self, id: &str, options: &RequestOptions) -> DocDbResult<Option<usize>> {
        let Some(definition) = &self.collection.partition_key else {
            return Ok(self.position(id));
        };
        let Some(expected) = &options.partition_key else {
            return Err(DocDbError::bad_request(
                "PartitionKey value must be supplied for this operation.",
            ));
        };
        Ok(self
            .position(id)
            .filter(|&i| self.documents[i].partition_key_value(definition) == Some(expected)))
    }

    fn in_partition<'a>(
        &'a self,
        partition_key: Option<&'a Value>,
    ) -> impl Iterator<Item = &'a Document> {
        self.documents.iter().filter(move |doc| {
            match (&self.collection.partition_key, partition_key) {
                (Some(definition), Some(key)) => doc.partition_key_value(definition) == Some(key),
                _ => true,
            }
        })
    }
}

impl Account {
    fn database(&self, id: &str) -> Option<&DatabaseEntry> {
        self.databases.iter().find(|e| e.database.id == id)
    }

    fn database_mut(&mut self, id: &str) -> Option<&mut DatabaseEntry> {
        self.databases.iter_mut().find(|e| e.database.id == id)
    }

    fn collection(&self, link: &ResourceLink) -> DocDbResult<&CollectionEntry> {
        let (db, coll) = match link {
            ResourceLink::Document {
                database,
                collection,
                ..
            } => (database.as_str(), collection.as_str()),
            other => other.expect_collection()?,
        };
        self.database(db)
            .and_then(|e| e.collections.iter().find(|c| c.collection.id == coll))
            .ok_or_else(|| not_found(&ResourceLink::collection(db, coll)))
    }

    fn collection_mut(&mut self, link: &ResourceLink) -> DocDbResult<&mut CollectionEntry> {
        let (db, coll) = match link {
            ResourceLink::Document {
                database,
                collection,
                ..
            } => (database.as_str(), collection.as_str()),
            other => other.expect_collection()?,
        };
        self.database_mut(db)
            .and_then(|e| e.collections.iter_mut().find(|c| c.collection.id == coll))
            .ok_or_else(|| not_found(&ResourceLink::collection(db, coll)))
    }

    fn drop_offers_for(&mut self, collection_rids: &[String]) {
        self.offers
            .retain(|offer| !collection_rids.contains(&offer.offer_resource_id));
    }
}

/// In-memory document service. Clones share the same account.
#[derive(Clone, Default)]
pub struct InMemoryClient {
    state: Arc<RwLock<Account>>,
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored across all collections
    pub fn document_count(&self) -> usize {
        self.state
            .read()
            .databases
            .iter()
            .flat_map(|db| db.collections.iter())
            .map(|c| c.documents.len())
            .sum()
    }

    fn insert_document(
        &self,
        collection: &ResourceLink,
        mut document: Document,
        options: &RequestOptions,
        upsert: bool,
    ) -> DocDbResult<ResourceResponse<Document>> {
        require_id(&document.id)?;
        let mut state = self.state.write();
        let entry = state.collection_mut(collection)?;
        entry.check_partition_key(&document, options)?;

        let charge = write_charge(serialized_size(&document));
        match entry.position(&document.id) {
            Some(index) if upsert => {
                document.system = entry.documents[index].system.clone();
                touch(&mut document.system);
                entry.documents[index] = document.clone();
                debug!(id = %document.id, "document upserted over existing");
                respond(document, StatusCode::Ok, charge)
            }
            Some(_) => Err(DocDbError::conflict(CONFLICT_MESSAGE)),
            None => {
                let rid = new_rid();
                let self_link = entry.document_self_link(&rid);
                stamp(&mut document.system, rid, self_link);
                entry.documents.push(document.clone());
                debug!(id = %document.id, collection = %collection, "document created");
                respond(document, StatusCode::Created, charge)
            }
        }
    }
}

#[async_trait]
impl DocumentClient for InMemoryClient {
    async fn create_database(
        &self,
        mut database: Database,
    ) -> DocDbResult<ResourceResponse<Database>> {
        require_id(&database.id)?;
        let mut state = self.state.write();
        if state.database(&database.id).is_some() {
            return Err(DocDbError::conflict(CONFLICT_MESSAGE));
        }

        let rid = new_rid();
        let self_link = format!("dbs/{}/", rid);
        stamp(&mut database.system, rid, self_link);
        state.databases.push(DatabaseEntry {
            database: database.clone(),
            collections: Vec::new(),
        });

        debug!(id = %database.id, "database created");
        let charge = write_charge(serialized_size(&database));
        respond(database, StatusCode::Created, charge)
    }

    async fn read_database(&self, link: &ResourceLink) -> DocDbResult<ResourceResponse<Database>> {
        let id = link.expect_database()?;
        let state = self.state.read();
        let entry = state.database(id).ok_or_else(|| not_found(link))?;
        respond(entry.database.clone(), StatusCode::Ok, POINT_READ_CHARGE)
    }

    async fn delete_database(&self, link: &ResourceLink) -> DocDbResult<ResourceResponse<()>> {
        let id = link.expect_database()?;
        let mut state = self.state.write();
        let index = state
            .databases
            .iter()
            .position(|e| e.database.id == id)
            .ok_or_else(|| not_found(link))?;

        let removed = state.databases.remove(index);
        let rids: Vec<String> = removed
            .collections
            .iter()
            .map(|c| rid_of(&c.collection).to_string())
            .collect();
        state.drop_offers_for(&rids);

        debug!(id, "database deleted");
        respond((), StatusCode::NoContent, write_charge(0))
    }

    fn read_databases(&self, options: &FeedOptions) -> FeedStream<Database> {
        let state = Arc::clone(&self.state);
        paginate(
            move || {
                Ok(state
                    .read()
                    .databases
                    .iter()
                    .map(|e| e.database.clone())
                    .collect())
            },
            options,
            feed_charge,
        )
    }

    async fn create_collection(
        &self,
        database: &ResourceLink,
        mut collection: DocumentCollection,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<DocumentCollection>> {
        require_id(&collection.id)?;
        let throughput = options.offer_throughput.unwrap_or(DEFAULT_OFFER_THROUGHPUT);
        if throughput < MIN_OFFER_THROUGHPUT {
            return Err(DocDbError::bad_request(format!(
                "The offer throughput must be at least {}",
                MIN_OFFER_THROUGHPUT
            )));
        }

        let db_id = database.expect_database()?;
        let mut state = self.state.write();
        let entry = state.database_mut(db_id).ok_or_else(|| not_found(database))?;
        if entry.collections.iter().any(|c| c.collection.id == collection.id) {
            return Err(DocDbError::conflict(CONFLICT_MESSAGE));
        }

        let rid = new_rid();
        let self_link = format!("{}colls/{}/", entry.database.self_link().unwrap_or_default(), rid);
        stamp(&mut collection.system, rid.clone(), self_link.clone());
        entry.collections.push(CollectionEntry {
            collection: collection.clone(),
            documents: Vec::new(),
        });

        let offer_id = new_rid();
        let mut offer = Offer {
            id: offer_id.clone(),
            offer_version: "V2".to_string(),
            resource: self_link,
            offer_resource_id: rid,
            content: OfferContent {
                offer_throughput: throughput,
            },
            system: SystemProperties::default(),
        };
        stamp(&mut offer.system, offer_id.clone(), format!("offers/{}/", offer_id));
        state.offers.push(offer);

        debug!(id = %collection.id, throughput, "collection created");
        let charge = write_charge(serialized_size(&collection));
        respond(collection, StatusCode::Created, charge)
    }

    async fn read_collection(
        &self,
        link: &ResourceLink,
    ) -> DocDbResult<ResourceResponse<DocumentCollection>> {
        link.expect_collection()?;
        let state = self.state.read();
        let entry = state.collection(link)?;
        respond(entry.collection.clone(), StatusCode::Ok, POINT_READ_CHARGE)
    }

    async fn delete_collection(&self, link: &ResourceLink) -> DocDbResult<ResourceResponse<()>> {
        let (db_id, coll_id) = link.expect_collection()?;
        let mut state = self.state.write();
        let entry = state.database_mut(db_id).ok_or_else(|| not_found(link))?;
        let index = entry
            .collections
            .iter()
            .position(|c| c.collection.id == coll_id)
            .ok_or_else(|| not_found(link))?;

        let removed = entry.collections.remove(index);
        state.drop_offers_for(&[rid_of(&removed.collection).to_string()]);

        debug!(id = coll_id, "collection deleted");
        respond((), StatusCode::NoContent, write_charge(0))
    }

    fn read_collections(
        &self,
        database: &ResourceLink,
        options: &FeedOptions,
    ) -> FeedStream<DocumentCollection> {
        let state = Arc::clone(&self.state);
        let link = database.clone();
        paginate(
            move || {
                let db_id = link.expect_database()?;
                let state = state.read();
                let entry = state.database(db_id).ok_or_else(|| not_found(&link))?;
                Ok(entry.collections.iter().map(|c| c.collection.clone()).collect())
            },
            options,
            feed_charge,
        )
    }

    async fn create_document(
        &self,
        collection: &ResourceLink,
        document: Document,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<Document>> {
        self.insert_document(collection, document, options, false)
    }

    async fn upsert_document(
        &self,
        collection: &ResourceLink,
        document: Document,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<Document>> {
        self.insert_document(collection, document, options, true)
    }

    async fn read_document(
        &self,
        link: &ResourceLink,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<Document>> {
        let (_, _, id) = link.expect_document()?;
        let state = self.state.read();
        let entry = state.collection(link)?;
        let index = entry.locate(id, options)?.ok_or_else(|| not_found(link))?;
        respond(entry.documents[index].clone(), StatusCode::Ok, POINT_READ_CHARGE)
    }

    async fn replace_document(
        &self,
        link: &ResourceLink,
        mut document: Document,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<Document>> {
        let (_, _, id) = link.expect_document()?;
        if document.id != id {
            return Err(DocDbError::bad_request(format!(
                "Document id {:?} does not match the addressed id {:?}",
                document.id, id
            )));
        }

        let mut state = self.state.write();
        let entry = state.collection_mut(link)?;
        let index = entry.locate(id, options)?.ok_or_else(|| not_found(link))?;
        entry.check_partition_key(&document, options)?;

        document.system = entry.documents[index].system.clone();
        touch(&mut document.system);
        entry.documents[index] = document.clone();

        let charge = write_charge(serialized_size(&document));
        respond(document, StatusCode::Ok, charge)
    }

    async fn delete_document(
        &self,
        link: &ResourceLink,
        options: &RequestOptions,
    ) -> DocDbResult<ResourceResponse<()>> {
        let (_, _, id) = link.expect_document()?;
        let mut state = self.state.write();
        let entry = state.collection_mut(link)?;
        let index = entry.locate(id, options)?.ok_or_else(|| not_found(link))?;
        entry.documents.remove(index);

        debug!(id, "document deleted");
        respond((), StatusCode::NoContent, write_charge(0))
    }

    fn read_documents(
        &self,
        collection: &ResourceLink,
        options: &FeedOptions,
    ) -> FeedStream<Document> {
        let state = Arc::clone(&self.state);
        let link = collection.clone();
        let partition_key = options.partition_key.clone();
        paginate(
            move || {
                link.expect_collection()?;
                let state = state.read();
                let entry = state.collection(&link)?;
                Ok(entry.in_partition(partition_key.as_ref()).cloned().collect())
            },
            options,
            feed_charge,
        )
    }

    fn query_documents(
        &self,
        collection: &ResourceLink,
        query: &Query,
        options: &FeedOptions,
    ) -> FeedStream<Document> {
        let state = Arc::clone(&self.state);
        let link = collection.clone();
        let query = query.clone();
        let partition_key = options.partition_key.clone();
        let cross_partition = options.enable_cross_partition_query;

        paginate(
            move || {
                link.expect_collection()?;
                let state = state.read();
                let entry = state.collection(&link)?;

                if let Some(definition) = &entry.collection.partition_key {
                    let pinned = partition_key.is_some()
                        || query.partition_key_filter(definition).is_some();
                    if !pinned && !cross_partition {
                        return Err(DocDbError::bad_request(CROSS_PARTITION_DISABLED_MESSAGE));
                    }
                }

                Ok(entry
                    .in_partition(partition_key.as_ref())
                    .filter(|doc| query.matches(doc))
                    .cloned()
                    .collect())
            },
            options,
            feed_charge,
        )
    }

    async fn read_offer(&self, link: &ResourceLink) -> DocDbResult<ResourceResponse<Offer>> {
        let id = link.expect_offer()?;
        let state = self.state.read();
        let offer = state
            .offers
            .iter()
            .find(|o| o.id == id)
            .ok_or_else(|| not_found(link))?;
        respond(offer.clone(), StatusCode::Ok, POINT_READ_CHARGE)
    }

    async fn replace_offer(&self, mut offer: Offer) -> DocDbResult<ResourceResponse<Offer>> {
        if offer.throughput() < MIN_OFFER_THROUGHPUT {
            return Err(DocDbError::bad_request(format!(
                "The offer throughput must be at least {}",
                MIN_OFFER_THROUGHPUT
            )));
        }

        let mut state = self.state.write();
        let link = ResourceLink::offer(offer.id.clone());
        let existing = state
            .offers
            .iter_mut()
            .find(|o| o.id == offer.id)
            .ok_or_else(|| not_found(&link))?;
        if existing.offer_resource_id != offer.offer_resource_id {
            return Err(DocDbError::bad_request(
                "Offer does not belong to the addressed collection",
            ));
        }

        offer.system = existing.system.clone();
        touch(&mut offer.system);
        *existing = offer.clone();

        debug!(id = %offer.id, throughput = offer.throughput(), "offer replaced");
        let charge = write_charge(serialized_size(&offer));
        respond(offer, StatusCode::Ok, charge)
    }

    fn read_offers(&self, options: &FeedOptions) -> FeedStream<Offer> {
        let state = Arc::clone(&self.state);
        paginate(move || Ok(state.read().offers.clone()), options, feed_charge)
    }
}
