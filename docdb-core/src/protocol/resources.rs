// Resource model of the document service
// Databases, collections, documents and offers as they appear on the wire

use crate::error::{DocDbError, DocDbResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Anything addressable by a user id and a service-assigned resource id
pub trait Resource {
    fn id(&self) -> &str;

    fn system(&self) -> &SystemProperties;

    fn resource_id(&self) -> Option<&str> {
        self.system().rid.as_deref()
    }

    fn self_link(&self) -> Option<&str> {
        self.system().self_link.as_deref()
    }
}

/// A user id is usable when it holds something other than whitespace
pub fn is_valid_id(id: &str) -> bool {
    !id.trim().is_empty()
}

/// Properties the service stamps on every resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemProperties {
    #[serde(rename = "_rid", default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,

    #[serde(rename = "_self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,

    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(rename = "_ts", default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub id: String,

    #[serde(flatten)]
    pub system: SystemProperties,
}

impl Database {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            system: SystemProperties::default(),
        }
    }
}

/// Partition key definition of a collection, e.g. paths `["/mypk"]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionKeyDefinition {
    pub paths: Vec<String>,
    #[serde(default = "default_partition_kind")]
    pub kind: String,
}

fn default_partition_kind() -> String {
    "Hash".to_string()
}

impl PartitionKeyDefinition {
    pub fn hash(path: impl Into<String>) -> Self {
        Self {
            paths: vec![path.into()],
            kind: default_partition_kind(),
        }
    }

    /// The partition key path as a property name, `"/a/b"` becomes `"a.b"`
    pub fn property_path(&self) -> Option<String> {
        self.paths
            .first()
            .map(|p| p.trim_start_matches('/').replace('/', "."))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentCollection {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<PartitionKeyDefinition>,

    #[serde(flatten)]
    pub system: SystemProperties,
}

impl DocumentCollection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            partition_key: None,
            system: SystemProperties::default(),
        }
    }

    pub fn partitioned(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            partition_key: Some(PartitionKeyDefinition::hash(path)),
            ..Self::new(id)
        }
    }

    pub fn is_partitioned(&self) -> bool {
        self.partition_key.is_some()
    }
}

/// A JSON document: an id plus arbitrary user properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,

    #[serde(flatten)]
    pub system: SystemProperties,

    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            system: SystemProperties::default(),
            properties: Map::new(),
        }
    }

    /// Builder-style property setter for plain JSON values
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Set a property from any serializable value.
    ///
    /// Fails with `InvalidArgument` when the value's serializer raises.
    pub fn set_serializable<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> DocDbResult<()> {
        let value = serde_json::to_value(value).map_err(DocDbError::unserializable)?;
        self.properties.insert(key.into(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Look up a dotted property path such as `"address.city"`
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.properties.get(segments.next()?)?;
        for segment in segments {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Encode any serializable payload as a document.
    ///
    /// The payload must serialize to a JSON object with a non-empty string `id`.
    pub fn from_serializable<T: Serialize>(payload: &T) -> DocDbResult<Self> {
        let value = serde_json::to_value(payload).map_err(DocDbError::unserializable)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> DocDbResult<Self> {
        let Value::Object(mut map) = value else {
            return Err(DocDbError::InvalidArgument {
                message: "Document body must be a JSON object".to_string(),
                source: None,
            });
        };

        let id = match map.remove("id") {
            Some(Value::String(id)) if is_valid_id(&id) => id,
            _ => {
                return Err(DocDbError::InvalidArgument {
                    message: "Document must carry a non-empty string id".to_string(),
                    source: None,
                })
            }
        };

        let take = |map: &mut Map<String, Value>, key: &str| match map.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        let system = SystemProperties {
            rid: take(&mut map, "_rid"),
            self_link: take(&mut map, "_self"),
            etag: take(&mut map, "_etag"),
            ts: map.remove("_ts").and_then(|v| v.as_i64()),
        };

        Ok(Self {
            id,
            system,
            properties: map,
        })
    }

    pub fn to_value(&self) -> DocDbResult<Value> {
        serde_json::to_value(self).map_err(DocDbError::serialization)
    }

    /// Value of the collection's partition key in this document
    pub fn partition_key_value(&self, definition: &PartitionKeyDefinition) -> Option<&Value> {
        definition
            .property_path()
            .and_then(|path| self.get_path(&path))
    }

    /// Serialized size in bytes, used for request charge accounting
    pub fn size_in_bytes(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferContent {
    pub offer_throughput: u32,
}

/// Provisioned throughput attached to a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: String,

    #[serde(default = "default_offer_version")]
    pub offer_version: String,

    /// Self link of the collection the offer belongs to
    pub resource: String,

    /// Resource id of the collection the offer belongs to
    pub offer_resource_id: String,

    pub content: OfferContent,

    #[serde(flatten)]
    pub system: SystemProperties,
}

fn default_offer_version() -> String {
    "V2".to_string()
}

impl Offer {
    pub fn throughput(&self) -> u32 {
        self.content.offer_throughput
    }

    pub fn set_throughput(&mut self, throughput: u32) {
        self.content.offer_throughput = throughput;
    }
}

macro_rules! impl_resource {
    ($($ty:ty),*) => {
        $(
            impl Resource for $ty {
                fn id(&self) -> &str {
                    &self.id
                }

                fn system(&self) -> &SystemProperties {
                    &self.system
                }
            }
        )*
    };
}

impl_resource!(Database, DocumentCollection, Document, Offer);

/// Success payload of a single-result operation
#[derive(Debug, Clone)]
pub struct ResourceResponse<T> {
    pub resource: T,
    pub status_code: u16,
    pub request_charge: f64,
    pub activity_id: Option<String>,
}

impl<T> ResourceResponse<T> {
    pub fn new(resource: T, status_code: u16, request_charge: f64) -> Self {
        Self {
            resource,
            status_code,
            request_charge,
            activity_id: None,
        }
    }

    pub fn with_activity_id(mut self, id: impl Into<String>) -> Self {
        self.activity_id = Some(id.into());
        self
    }
}
