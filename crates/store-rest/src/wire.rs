//! JSON bodies of the REST protocol.

use docshard_store::{ContainerProperties, ContainerSpec, PartitionKeyPath, QueryParameter};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RestStoreError, Result};

const HASH_PARTITIONING: &str = "Hash";

/// Partition-key definition of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PartitionKeyDefinition {
    pub paths: Vec<String>,
    #[serde(default = "hash_partitioning")]
    pub kind: String,
}

fn hash_partitioning() -> String {
    HASH_PARTITIONING.to_owned()
}

/// Container resource as sent on create and returned on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ContainerBody {
    pub id: String,
    #[serde(rename = "partitionKey")]
    pub partition_key: PartitionKeyDefinition,
    #[serde(rename = "_rid", default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
}

impl ContainerBody {
    pub fn from_spec(spec: &ContainerSpec) -> Self {
        Self {
            id: spec.id.clone(),
            partition_key: PartitionKeyDefinition {
                paths: vec![spec.partition_key_path.to_string()],
                kind: hash_partitioning(),
            },
            rid: None,
        }
    }

    #[cfg(any(test, feature = "testutil"))]
    pub fn from_properties(properties: ContainerProperties) -> Self {
        Self {
            id: properties.id,
            partition_key: PartitionKeyDefinition {
                paths: vec![properties.partition_key_path.into()],
                kind: hash_partitioning(),
            },
            rid: properties.rid,
        }
    }

    /// Returns the single partition-key path of this container.
    pub fn partition_key_path(&self) -> Result<PartitionKeyPath> {
        match self.partition_key.paths.as_slice() {
            [path] => PartitionKeyPath::new(path.clone()).map_err(RestStoreError::from),
            paths => Err(RestStoreError::Protocol(format!(
                "container `{}` has {} partition-key paths, expected one",
                self.id,
                paths.len()
            ))),
        }
    }

    pub fn into_properties(self) -> Result<ContainerProperties> {
        let partition_key_path = self.partition_key_path()?;
        Ok(ContainerProperties { id: self.id, partition_key_path, rid: self.rid })
    }
}

/// Body of a query request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct QueryBody {
    pub query: String,
    #[serde(default)]
    pub parameters: Vec<QueryParameter>,
}

/// One page of a document query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DocumentsPage {
    #[serde(rename = "Documents")]
    pub documents: Vec<Value>,
    #[serde(rename = "_count", default)]
    pub count: usize,
}

/// Result of an offers query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct OffersPage {
    #[serde(rename = "Offers")]
    pub offers: Vec<Value>,
}

/// Error body the service sends with a failure status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ServiceError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Builds the offer resource for a container with dedicated throughput.
#[cfg(any(test, feature = "testutil"))]
pub(crate) fn offer(container_rid: &str, throughput: u32) -> Value {
    serde_json::json!({
        "id": container_rid.to_lowercase(),
        "_rid": container_rid.to_lowercase(),
        "offerResourceId": container_rid,
        "offerVersion": "V2",
        "content": { "offerThroughput": throughput },
    })
}

/// Reads `content.offerThroughput` of an offer.
pub(crate) fn offer_throughput(offer: &Value) -> Result<u32> {
    offer
        .pointer("/content/offerThroughput")
        .and_then(Value::as_u64)
        .and_then(|ru| u32::try_from(ru).ok())
        .ok_or_else(|| RestStoreError::Protocol("offer has no numeric content.offerThroughput".into()))
}

/// Reads the id an offer is addressed by.
pub(crate) fn offer_id(offer: &Value) -> Result<&str> {
    offer
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| RestStoreError::Protocol("offer has no id".into()))
}
