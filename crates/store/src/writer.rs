//! Idempotent item creation.
//!
//! A document is never written blindly: a point read decides between
//! "already exists" and create.

use serde::de::DeserializeOwned;

use crate::{
    backend::DocumentStore,
    document::{CreateOutcome, Document, Lookup},
    error::{StoreError, StoreResult},
    types::PartitionKey,
    workspace::ContainerHandle,
};

impl<S: DocumentStore> ContainerHandle<S> {
    /// Point-reads an item, treating absence as an answer.
    ///
    /// # Errors
    ///
    /// Any store error other than [`StoreError::NotFound`], and
    /// [`StoreError::Serialization`] when the stored JSON does not decode
    /// into `T`.
    #[tracing::instrument(skip(self, partition_key), fields(container = %self.link, %partition_key))]
    pub async fn read_if_exists<T>(
        &self,
        id: &str,
        partition_key: &PartitionKey,
    ) -> StoreResult<Lookup<T>>
    where
        T: DeserializeOwned + Send,
    {
        let store = self.workspace.store();
        let link = &self.link;
        match self.workspace.metered("read_item", move || store.read_item(link, id, partition_key)).await
        {
            Ok(response) => {
                let typed = response.try_map(serde_json::from_value)?;
                Ok(Lookup::Found(typed))
            },
            Err(StoreError::NotFound { .. }) => Ok(Lookup::Absent),
            Err(err) => Err(err),
        }
    }

    /// Creates `document` unless an item with its identity already exists.
    ///
    /// # Returns
    ///
    /// - `created: true` with the stored item when this call created it
    /// - `created: false` with the existing item, unmodified, otherwise
    ///
    /// A create that loses a race to a concurrent writer (the store answers
    /// with a conflict after the read found nothing) re-reads and reports
    /// `created: false`.
    ///
    /// # Errors
    ///
    /// Any store error from the read or the create other than the ones
    /// above. Nothing is written when the read fails. A create that times
    /// out is not retried, since it may have been applied; the error is
    /// returned and a later call settles the outcome.
    #[tracing::instrument(
        skip(self, document),
        fields(container = %self.link, id = document.id(), partition_key = %document.partition_key()),
    )]
    pub async fn create_if_absent<T: Document>(&self, document: &T) -> StoreResult<CreateOutcome<T>> {
        let id = document.id();
        let partition_key = document.partition_key();

        if let Lookup::Found(existing) = self.read_if_exists::<T>(id, &partition_key).await? {
            tracing::info!(request_charge = existing.request_charge, "item already exists");
            return Ok(CreateOutcome {
                created: false,
                resource: existing.resource,
                request_charge: existing.request_charge,
            });
        }

        let body = serde_json::to_value(document)?;
        if self.partition_key_path.extract(&body).as_ref() != Some(&partition_key) {
            return Err(StoreError::bad_request(format!(
                "serialized document does not carry partition key `{partition_key}` at `{}`",
                self.partition_key_path
            )));
        }

        let store = self.workspace.store();
        let link = &self.link;
        let pk = &partition_key;
        let created = self
            .workspace
            .metered_write("create_item", move || store.create_item(link, pk, body.clone()))
            .await;

        match created {
            Ok(response) => {
                tracing::info!(request_charge = response.request_charge, "item created");
                let response = response.try_map(serde_json::from_value)?;
                Ok(CreateOutcome {
                    created: true,
                    resource: response.resource,
                    request_charge: response.request_charge,
                })
            },
            Err(StoreError::Conflict { .. }) => {
                tracing::info!("item created concurrently, reading the winner");
                match self.read_if_exists::<T>(id, &partition_key).await? {
                    Lookup::Found(existing) => Ok(CreateOutcome {
                        created: false,
                        resource: existing.resource,
                        request_charge: existing.request_charge,
                    }),
                    Lookup::Absent => Err(StoreError::conflict(self.link.item_link(id))),
                }
            },
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testutil::{TestDoc, provisioned_container};

    #[tokio::test]
    async fn test_create_if_absent_is_idempotent() {
        let (store, items) = provisioned_container().await;
        let doc = TestDoc::new("a", "P", "first");

        let first = items.create_if_absent(&doc).await.unwrap();
        assert!(first.created);
        assert_eq!(first.resource, doc);
        assert!(first.request_charge > 0.0);

        let changed = TestDoc::new("a", "P", "second");
        let second = items.create_if_absent(&changed).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.resource, doc, "existing item must be left unmodified");

        // Two provisioning calls, then read + create, then a single read.
        assert_eq!(store.request_count(), 5);
    }

    #[tokio::test]
    async fn test_read_if_exists() {
        let (_, items) = provisioned_container().await;
        let doc = TestDoc::new("a", "P", "v");
        items.create_if_absent(&doc).await.unwrap();

        let found = items.read_if_exists::<TestDoc>("a", &"P".into()).await.unwrap();
        assert_eq!(found.into_option().unwrap().resource, doc);

        let absent = items.read_if_exists::<TestDoc>("a", &"Q".into()).await.unwrap();
        assert!(!absent.is_found());
    }

    #[tokio::test]
    async fn test_read_fault_propagates_without_write() {
        let (store, items) = provisioned_container().await;
        store.fail_next(1);

        let result = items.create_if_absent(&TestDoc::new("a", "P", "v")).await;
        assert!(matches!(result, Err(StoreError::Internal { .. })));
        assert!(!items.read_if_exists::<TestDoc>("a", &"P".into()).await.unwrap().is_found());
    }

    #[tokio::test]
    async fn test_create_with_lost_ack_is_not_replayed() {
        let (store, items) = provisioned_container().await;
        let before = store.request_count();
        store.lose_next_acks(1);

        let result = items.create_if_absent(&TestDoc::new("a", "P", "v")).await;
        assert!(matches!(result, Err(StoreError::Timeout)), "got: {result:?}");
        // One read, one create, no replay.
        assert_eq!(store.request_count(), before + 2);

        let stored = items.read_if_exists::<TestDoc>("a", &"P".into()).await.unwrap();
        assert_eq!(stored.into_option().unwrap().resource, TestDoc::new("a", "P", "v"));
    }

    #[tokio::test]
    async fn test_decode_failure_is_serialization_error() {
        let (store, items) = provisioned_container().await;
        let body = serde_json::json!({"id": "a", "partitionKey": "P", "value": 42});
        store.create_item(items.link(), &"P".into(), body).await.unwrap();

        let result = items.read_if_exists::<TestDoc>("a", &"P".into()).await;
        assert!(matches!(result, Err(StoreError::Serialization { .. })));
    }
}
