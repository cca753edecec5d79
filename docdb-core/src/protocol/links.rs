// Resource links
// Id-based addresses such as `dbs/{db}/colls/{coll}/docs/{doc}`

use crate::error::{DocDbError, DocDbResult};
use std::fmt;

/// A parsed id-based resource link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLink {
    Database { database: String },
    Collection { database: String, collection: String },
    Document { database: String, collection: String, document: String },
    Offer { offer: String },
}

impl ResourceLink {
    pub fn database(database: impl Into<String>) -> Self {
        Self::Database {
            database: database.into(),
        }
    }

    pub fn collection(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::Collection {
            database: database.into(),
            collection: collection.into(),
        }
    }

    pub fn document(
        database: impl Into<String>,
        collection: impl Into<String>,
        document: impl Into<String>,
    ) -> Self {
        Self::Document {
            database: database.into(),
            collection: collection.into(),
            document: document.into(),
        }
    }

    pub fn offer(offer: impl Into<String>) -> Self {
        Self::Offer {
            offer: offer.into(),
        }
    }

    pub fn parse(link: &str) -> DocDbResult<Self> {
        let segments: Vec<&str> = link.trim_matches('/').split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(invalid_link(link));
        }

        match segments.as_slice() {
            ["dbs", db] => Ok(Self::database(*db)),
            ["dbs", db, "colls", coll] => Ok(Self::collection(*db, *coll)),
            ["dbs", db, "colls", coll, "docs", doc] => Ok(Self::document(*db, *coll, *doc)),
            ["offers", offer] => Ok(Self::offer(*offer)),
            _ => Err(invalid_link(link)),
        }
    }

    /// Path segment naming the resource type, as used when signing requests
    pub fn resource_type(&self) -> &'static str {
        match self {
            Self::Database { .. } => "dbs",
            Self::Collection { .. } => "colls",
            Self::Document { .. } => "docs",
            Self::Offer { .. } => "offers",
        }
    }

    /// Link of the owning resource; `None` for top-level resources
    pub fn parent(&self) -> Option<ResourceLink> {
        match self {
            Self::Database { .. } | Self::Offer { .. } => None,
            Self::Collection { database, .. } => Some(Self::database(database.clone())),
            Self::Document {
                database,
                collection,
                ..
            } => Some(Self::collection(database.clone(), collection.clone())),
        }
    }

    pub fn expect_database(&self) -> DocDbResult<&str> {
        match self {
            Self::Database { database } => Ok(database),
            other => Err(unexpected_kind("database", other)),
        }
    }

    pub fn expect_collection(&self) -> DocDbResult<(&str, &str)> {
        match self {
            Self::Collection {
                database,
                collection,
            } => Ok((database, collection)),
            other => Err(unexpected_kind("collection", other)),
        }
    }

    pub fn expect_document(&self) -> DocDbResult<(&str, &str, &str)> {
        match self {
            Self::Document {
                database,
                collection,
                document,
            } => Ok((database, collection, document)),
            other => Err(unexpected_kind("document", other)),
        }
    }

    pub fn expect_offer(&self) -> DocDbResult<&str> {
        match self {
            Self::Offer { offer } => Ok(offer),
            other => Err(unexpected_kind("offer", other)),
        }
    }
}

impl fmt::Display for ResourceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database { database } => write!(f, "dbs/{}", database),
            Self::Collection {
                database,
                collection,
            } => write!(f, "dbs/{}/colls/{}", database, collection),
            Self::Document {
                database,
                collection,
                document,
            } => write!(f, "dbs/{}/colls/{}/docs/{}", database, collection, document),
            Self::Offer { offer } => write!(f, "offers/{}", offer),
        }
    }
}

fn invalid_link(link: &str) -> DocDbError {
    DocDbError::InvalidArgument {
        message: format!("Invalid resource link: {}", link),
        source: None,
    }
}

fn unexpected_kind(expected: &str, link: &ResourceLink) -> DocDbError {
    DocDbError::InvalidArgument {
        message: format!("Expected a {} link, got {}", expected, link),
        source: None,
    }
}
