//! Typed documents and lookup outcomes.

use serde::{Serialize, de::DeserializeOwned};

use crate::types::{PartitionKey, Response};

/// A domain type stored as one JSON document.
///
/// The pair ([`id`](Document::id), [`partition_key`](Document::partition_key))
/// is the document's identity. The serialized form must carry both: the `id`
/// under `"id"` and the partition-key value at the container's
/// partition-key path.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Returns the document id, unique within its partition.
    fn id(&self) -> &str;

    /// Returns the partition-key value.
    fn partition_key(&self) -> PartitionKey;
}

/// Outcome of a point read where absence is an expected answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// The item exists.
    Found(Response<T>),
    /// No item with this identity exists.
    Absent,
}

impl<T> Lookup<T> {
    /// Returns `true` when the item exists.
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Converts into an `Option` of the response.
    pub fn into_option(self) -> Option<Response<T>> {
        match self {
            Self::Found(response) => Some(response),
            Self::Absent => None,
        }
    }
}

/// Result of [`ContainerHandle::create_if_absent`](crate::ContainerHandle::create_if_absent).
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOutcome<T> {
    /// `true` when this call created the item, `false` when it already
    /// existed.
    pub created: bool,
    /// The stored item: the new one when created, the existing one
    /// otherwise.
    pub resource: T,
    /// Request units consumed by the creation, or by the existence check
    /// when nothing was created.
    pub request_charge: f64,
}
