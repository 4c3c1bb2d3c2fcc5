//! Common types used across store operations.
//!
//! These are the values that cross the [`DocumentStore`](crate::DocumentStore)
//! boundary: resource identities, container definitions, query requests and
//! the [`Response`] envelope every operation returns.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Partition-key path used by the household containers.
pub const DEFAULT_PARTITION_KEY_PATH: &str = "/partitionKey";

/// Smallest dedicated throughput (RU/s) a container may be provisioned with.
pub const MIN_THROUGHPUT: u32 = 400;

/// Value of a document's partition-key field.
///
/// Every point operation needs this alongside the document `id`; the pair is
/// the document's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Wraps a partition-key value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders the value the way the service expects it in request headers:
    /// a JSON array holding the single key value.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        Value::Array(vec![Value::String(self.0.clone())]).to_string()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PartitionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Field path (JSON pointer) a container shards its documents by.
///
/// Immutable once the container exists. The field must be present on every
/// document stored in the container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionKeyPath(String);

impl PartitionKeyPath {
    /// Validates and wraps a partition-key path such as `/partitionKey`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] unless the path starts with `/`,
    /// names at least one field and has no empty segments.
    pub fn new(path: impl Into<String>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(ConfigError::invalid("partition_key_path", format!("`{path}` must start with '/'")));
        }
        if path[1..].split('/').any(str::is_empty) {
            return Err(ConfigError::invalid("partition_key_path", format!("`{path}` has an empty segment")));
        }
        Ok(Self(path))
    }

    /// Returns the path as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the field names the path walks through.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split('/')
    }

    /// Reads the partition-key value out of a document.
    ///
    /// Returns `None` when the field is missing or not a string.
    #[must_use]
    pub fn extract(&self, document: &Value) -> Option<PartitionKey> {
        document.pointer(&self.0).and_then(Value::as_str).map(PartitionKey::new)
    }
}

impl Default for PartitionKeyPath {
    fn default() -> Self {
        Self(DEFAULT_PARTITION_KEY_PATH.to_owned())
    }
}

impl fmt::Display for PartitionKeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PartitionKeyPath {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PartitionKeyPath> for String {
    fn from(path: PartitionKeyPath) -> Self {
        path.0
    }
}

/// How a container is charged for throughput.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "ru")]
pub enum ThroughputSpec {
    /// Dedicated, manually provisioned RU/s. Readable and adjustable.
    Manual(u32),
    /// Capacity shared with the rest of the database. Reading it yields no
    /// value.
    Shared,
    /// Consumption-billed account. The service rejects throughput reads with
    /// a bad request.
    Serverless,
}

impl Default for ThroughputSpec {
    fn default() -> Self {
        Self::Manual(MIN_THROUGHPUT)
    }
}

/// Definition used to create a container if it does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct ContainerSpec {
    /// Container id, unique within its database.
    #[builder(into)]
    pub id: String,

    /// Field path documents are partitioned by.
    #[builder(default)]
    pub partition_key_path: PartitionKeyPath,

    /// Throughput to provision on creation. Ignored when the container
    /// already exists.
    #[builder(default)]
    pub throughput: ThroughputSpec,
}

/// Address of a container: `dbs/{database}/colls/{container}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerLink {
    database: String,
    container: String,
}

impl ContainerLink {
    /// Creates a link to `container` inside `database`.
    pub fn new(database: impl Into<String>, container: impl Into<String>) -> Self {
        Self { database: database.into(), container: container.into() }
    }

    /// Returns the database id.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the container id.
    #[must_use]
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Returns the link of an item inside this container.
    #[must_use]
    pub fn item_link(&self, id: &str) -> String {
        format!("{self}/docs/{id}")
    }
}

impl fmt::Display for ContainerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dbs/{}/colls/{}", self.database, self.container)
    }
}

/// Properties of a database as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseProperties {
    /// Database id.
    pub id: String,
    /// Service-assigned resource id.
    #[serde(rename = "_rid", default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
}

/// Properties of a container as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerProperties {
    /// Container id.
    pub id: String,
    /// Partition-key path bound at creation.
    pub partition_key_path: PartitionKeyPath,
    /// Service-assigned resource id.
    pub rid: Option<String>,
}

/// Envelope returned by every store operation.
///
/// Besides the payload the service reports what the call cost, its status
/// and, for items, the ETag of the stored version.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    /// Operation payload.
    pub resource: T,
    /// Status the service answered with.
    pub status: StatusCode,
    /// Request units consumed by the operation.
    pub request_charge: f64,
    /// Version tag of the returned item, when the operation returns one.
    pub etag: Option<String>,
    /// Token to fetch the next page of a query, `None` on the last page.
    pub continuation: Option<String>,
}

impl<T> Response<T> {
    /// Creates a response without ETag or continuation.
    pub fn new(resource: T, status: StatusCode, request_charge: f64) -> Self {
        Self { resource, status, request_charge, etag: None, continuation: None }
    }

    /// Attaches an ETag.
    #[must_use]
    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    /// Attaches a continuation token.
    #[must_use]
    pub fn with_continuation(mut self, continuation: Option<String>) -> Self {
        self.continuation = continuation;
        self
    }

    /// Transforms the payload, keeping the metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            resource: f(self.resource),
            status: self.status,
            request_charge: self.request_charge,
            etag: self.etag,
            continuation: self.continuation,
        }
    }

    /// Transforms the payload with a fallible function, keeping the
    /// metadata.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Response<U>, E> {
        Ok(Response {
            resource: f(self.resource)?,
            status: self.status,
            request_charge: self.request_charge,
            etag: self.etag,
            continuation: self.continuation,
        })
    }
}

/// Named parameter bound into a query (`@name`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    /// Parameter name including the leading `@`.
    pub name: String,
    /// Bound value.
    pub value: Value,
}

/// A single page request for a query.
///
/// The query text is opaque to the client: it is handed to the service as
/// is. `partition_key` pins the query to one partition; without it the
/// service fans out unless the filter itself pins the key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRequest {
    /// SQL-like query text.
    pub query: String,
    /// Named parameters referenced by the query.
    pub parameters: Vec<QueryParameter>,
    /// Partition to route the query to.
    pub partition_key: Option<PartitionKey>,
    /// Upper bound of documents in the returned page.
    pub max_item_count: Option<u32>,
    /// Continuation token from the previous page.
    pub continuation: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_partition_key_header_value_is_json_array() {
        assert_eq!(PartitionKey::from("Andersen").to_header_value(), r#"["Andersen"]"#);
        assert_eq!(PartitionKey::from("O\"Neil").to_header_value(), r#"["O\"Neil"]"#);
    }

    #[test]
    fn test_partition_key_path_validation() {
        assert!(PartitionKeyPath::new("/partitionKey").is_ok());
        assert!(PartitionKeyPath::new("/address/state").is_ok());
        assert!(PartitionKeyPath::new("partitionKey").is_err());
        assert!(PartitionKeyPath::new("/").is_err());
        assert!(PartitionKeyPath::new("/a//b").is_err());
        assert!(PartitionKeyPath::new("/a/").is_err());
    }

    #[test]
    fn test_partition_key_path_extracts_nested_value() {
        let path = PartitionKeyPath::new("/address/state").unwrap();
        let doc = json!({"id": "1", "address": {"state": "WA"}});
        assert_eq!(path.extract(&doc), Some(PartitionKey::from("WA")));
        assert_eq!(path.segments().collect::<Vec<_>>(), vec!["address", "state"]);
    }

    #[test]
    fn test_partition_key_path_ignores_non_string_values() {
        let path = PartitionKeyPath::default();
        assert_eq!(path.extract(&json!({"partitionKey": 7})), None);
        assert_eq!(path.extract(&json!({"id": "x"})), None);
    }

    #[test]
    fn test_partition_key_path_deserialization_validates() {
        let ok: PartitionKeyPath = serde_json::from_str(r#""/partitionKey""#).unwrap();
        assert_eq!(ok.as_str(), DEFAULT_PARTITION_KEY_PATH);
        assert!(serde_json::from_str::<PartitionKeyPath>(r#""partitionKey""#).is_err());
    }

    #[test]
    fn test_container_spec_builder_defaults() {
        let spec = ContainerSpec::builder().id("Items").build();
        assert_eq!(spec.partition_key_path.as_str(), "/partitionKey");
        assert_eq!(spec.throughput, ThroughputSpec::Manual(MIN_THROUGHPUT));
    }

    #[test]
    fn test_container_link_rendering() {
        let link = ContainerLink::new("ToDoList", "Items");
        assert_eq!(link.to_string(), "dbs/ToDoList/colls/Items");
        assert_eq!(link.item_link("Andersen.1"), "dbs/ToDoList/colls/Items/docs/Andersen.1");
    }

    #[test]
    fn test_response_map_keeps_metadata() {
        let response = Response::new(2, StatusCode::OK, 1.5)
            .with_etag(Some("\"e1\"".into()))
            .with_continuation(Some("next".into()));
        let mapped = response.map(|n| n * 10);
        assert_eq!(mapped.resource, 20);
        assert_eq!(mapped.request_charge, 1.5);
        assert_eq!(mapped.etag.as_deref(), Some("\"e1\""));
        assert_eq!(mapped.continuation.as_deref(), Some("next"));
    }
}
