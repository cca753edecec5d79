// Document queries
// Equality filters over document properties, rendered to the service's SQL dialect

use super::resources::{Document, PartitionKeyDefinition};
use serde::Serialize;
use serde_json::Value;

/// A conjunction of `property == value` filters. An empty query selects every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<(String, Value)>,
}

/// Parameterised SQL body sent to the service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlQuerySpec {
    pub query: String,
    pub parameters: Vec<SqlParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlParameter {
    pub name: String,
    pub value: Value,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a filter on a dotted property path; `"id"` matches the document id
    pub fn filter_eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((path.into(), value.into()));
        self
    }

    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.filters.iter().all(|(path, expected)| {
            if path == "id" {
                expected.as_str() == Some(document.id.as_str())
            } else {
                document.get_path(path) == Some(expected)
            }
        })
    }

    /// The partition key value this query is pinned to, if it filters on the key path
    pub fn partition_key_filter(&self, definition: &PartitionKeyDefinition) -> Option<&Value> {
        let key_path = definition.property_path()?;
        self.filters
            .iter()
            .find(|(path, _)| *path == key_path)
            .map(|(_, value)| value)
    }

    pub fn to_sql(&self) -> SqlQuerySpec {
        let mut query = "SELECT * FROM root r".to_string();
        let mut parameters = Vec::with_capacity(self.filters.len());

        for (index, (path, value)) in self.filters.iter().enumerate() {
            let name = format!("@p{}", index);
            let accessor: String = path
                .split('.')
                .map(|segment| format!("[\"{}\"]", segment.replace('"', "\\\"")))
                .collect();

            query.push_str(if index == 0 { " WHERE " } else { " AND " });
            query.push_str(&format!("r{} = {}", accessor, name));
            parameters.push(SqlParameter {
                name,
                value: value.clone(),
            });
        }

        SqlQuerySpec { query, parameters }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matches_id_and_nested_paths() {
        let doc = Document::new("d1").with("owner", json!({"name": "ana"}));

        assert!(Query::all().matches(&doc));
        assert!(Query::all().filter_eq("id", "d1").matches(&doc));
        assert!(Query::all().filter_eq("owner.name", "ana").matches(&doc));
        assert!(!Query::all().filter_eq("owner.name", "bo").matches(&doc));
        assert!(!Query::all().filter_eq("missing", 1).matches(&doc));
    }

    #[test]
    fn test_to_sql_renders_parameters() {
        let spec = Query::all().filter_eq("mypk", "p1").filter_eq("n", 3).to_sql();

        assert_eq!(
            spec.query,
            "SELECT * FROM root r WHERE r[\"mypk\"] = @p0 AND r[\"n\"] = @p1"
        );
        assert_eq!(spec.parameters[1].value, json!(3));
        assert_eq!(Query::all().to_sql().query, "SELECT * FROM root r");
    }

    #[test]
    fn test_partition_key_filter() {
        let definition = PartitionKeyDefinition::hash("/mypk");
        let query = Query::all().filter_eq("mypk", "p1");

        assert_eq!(query.partition_key_filter(&definition), Some(&json!("p1")));
        assert!(Query::all().partition_key_filter(&definition).is_none());
    }
}
