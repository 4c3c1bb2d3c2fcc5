//! Resource provisioning: databases, containers and throughput.
//!
//! Creation is idempotent and throughput adjustment is best effort: a
//! container without adjustable capacity is reported and skipped rather than
//! failing the caller.

use http::StatusCode;

use crate::{
    backend::DocumentStore,
    error::{StoreError, StoreResult},
    types::ContainerSpec,
    workspace::{ContainerHandle, DatabaseHandle, Workspace},
};

/// Result of a throughput raise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputChange {
    /// RU/s before the change.
    pub previous: u32,
    /// RU/s after the change.
    pub current: u32,
    /// Request units consumed by the read and the replace.
    pub request_charge: f64,
}

impl<S: DocumentStore> Workspace<S> {
    /// Creates the database unless it exists and returns a handle to it.
    ///
    /// Issues exactly one creation request; the store's create-if-absent
    /// semantics keep concurrent callers from creating duplicates.
    ///
    /// # Errors
    ///
    /// Returns any error the store reports after retries.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_database(&self, id: &str) -> StoreResult<DatabaseHandle<S>> {
        let store = self.store();
        let response = self
            .metered("create_database_if_not_exists", move || {
                store.create_database_if_not_exists(id)
            })
            .await?;

        tracing::info!(
            database = id,
            created = response.status == StatusCode::CREATED,
            request_charge = response.request_charge,
            "database ready",
        );
        Ok(self.database(id))
    }
}

impl<S: DocumentStore> DatabaseHandle<S> {
    /// Creates the container unless it exists and returns a handle to it.
    ///
    /// The returned handle carries the partition-key path the container
    /// actually has, which differs from `spec` when the container existed
    /// before with another path.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the database does not exist, or any
    /// other error the store reports after retries.
    #[tracing::instrument(skip(self, spec), fields(database = %self.id, container = %spec.id))]
    pub async fn ensure_container(&self, spec: &ContainerSpec) -> StoreResult<ContainerHandle<S>> {
        let store = self.workspace.store();
        let database = self.id.as_str();
        let response = self
            .workspace
            .metered("create_container_if_not_exists", move || {
                store.create_container_if_not_exists(database, spec)
            })
            .await?;

        let properties = response.resource;
        if properties.partition_key_path != spec.partition_key_path {
            tracing::warn!(
                requested = %spec.partition_key_path,
                actual = %properties.partition_key_path,
                "container exists with a different partition key path",
            );
        }
        tracing::info!(
            created = response.status == StatusCode::CREATED,
            partition_key_path = %properties.partition_key_path,
            request_charge = response.request_charge,
            "container ready",
        );

        Ok(self.container(properties.id, properties.partition_key_path))
    }

    /// Deletes the database together with its containers and items.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the database does not exist.
    #[tracing::instrument(skip(self), fields(database = %self.id))]
    pub async fn delete(&self) -> StoreResult<()> {
        let store = self.workspace.store();
        let database = self.id.as_str();
        let response =
            self.workspace.metered_write("delete_database", move || store.delete_database(database)).await?;
        tracing::info!(request_charge = response.request_charge, "database deleted");
        Ok(())
    }
}

impl<S: DocumentStore> ContainerHandle<S> {
    /// Reads the container's dedicated throughput.
    ///
    /// Returns `Ok(None)` when the container has no dedicated throughput,
    /// including when the account rejects the read as a bad request. That
    /// condition is logged, not propagated.
    ///
    /// # Errors
    ///
    /// Any other store error.
    #[tracing::instrument(skip(self), fields(container = %self.link))]
    pub async fn read_throughput(&self) -> StoreResult<Option<u32>> {
        let store = self.workspace.store();
        let link = &self.link;
        match self.workspace.metered("read_throughput", move || store.read_throughput(link)).await {
            Ok(response) => Ok(response.resource),
            Err(StoreError::BadRequest { message }) => {
                tracing::warn!(%message, "throughput is not readable for this container");
                Ok(None)
            },
            Err(err) => Err(err),
        }
    }

    /// Raises the container's throughput by `delta` RU/s.
    ///
    /// Returns `Ok(None)` when the adjustment was skipped because the
    /// container has no adjustable throughput; the skip is logged.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadRequest`] when the new value would overflow, or any
    /// store error other than the throughput-unsupported bad request.
    #[tracing::instrument(skip(self), fields(container = %self.link))]
    pub async fn increase_throughput(&self, delta: u32) -> StoreResult<Option<ThroughputChange>> {
        let before = self.workspace.total_request_charge();
        let Some(previous) = self.read_throughput().await? else {
            tracing::info!("container has no dedicated throughput, skipping adjustment");
            return Ok(None);
        };

        let target = previous.checked_add(delta).ok_or_else(|| {
            StoreError::bad_request(format!("throughput {previous} + {delta} overflows"))
        })?;

        let store = self.workspace.store();
        let link = &self.link;
        let replaced = self
            .workspace
            .metered("replace_throughput", move || store.replace_throughput(link, target))
            .await;

        match replaced {
            Ok(response) => {
                let change = ThroughputChange {
                    previous,
                    current: response.resource,
                    request_charge: self.workspace.total_request_charge() - before,
                };
                tracing::info!(
                    previous = change.previous,
                    current = change.current,
                    request_charge = change.request_charge,
                    "throughput raised",
                );
                Ok(Some(change))
            },
            Err(StoreError::BadRequest { message }) => {
                tracing::warn!(%message, target, "throughput replace rejected, skipping adjustment");
                Ok(None)
            },
            Err(err) => Err(err),
        }
    }
}
