// Wire model of the document service
// Resource types and the query representation shared by both clients

pub mod links;
pub mod query;
pub mod resources;

// Re-export key types
pub use links::ResourceLink;
pub use query::{Query, SqlParameter, SqlQuerySpec};
pub use resources::{
    is_valid_id, Database, Document, DocumentCollection, Offer, OfferContent,
    PartitionKeyDefinition, Resource, ResourceResponse, SystemProperties,
};
