//! Explicit context object for the access-pattern layer.
//!
//! A [`Workspace`] owns the process-wide store handle together with the
//! retry policy and a running total of request charges. Provisioning hands
//! out [`DatabaseHandle`]s and [`ContainerHandle`]s that carry the workspace
//! along, so no state lives in globals and every call goes through the same
//! retry and metering path.
//!
//! # Example
//!
//! ```
//! use docshard_store::{ContainerSpec, MemoryStore, Teardown, Workspace};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let workspace = Workspace::new(MemoryStore::new());
//! let result = workspace
//!     .scoped(Teardown::DeleteDatabase("ToDoList".into()), |ws| async move {
//!         let db = ws.ensure_database("ToDoList").await?;
//!         let items = db.ensure_container(&ContainerSpec::builder().id("Items").build()).await?;
//!         items.read_throughput().await
//!     })
//!     .await;
//! assert_eq!(result.unwrap(), Some(400));
//! # });
//! ```

use std::{fmt, future::Future, sync::Arc};

use parking_lot::Mutex;

use crate::{
    backend::DocumentStore,
    error::{StoreError, StoreResult},
    retry::{EtagRetryConfig, RetryConfig, with_retry, with_write_retry},
    types::{ContainerLink, PartitionKeyPath, Response},
};

#[derive(Debug, Default)]
struct ChargeMeter {
    total: f64,
    responses: u64,
}

/// What [`Workspace::scoped`] does once the work finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// Only release the store handle.
    Release,
    /// Delete the named database, then release the store handle.
    DeleteDatabase(String),
}

/// Context shared by every access-pattern component.
///
/// Cloning is cheap; clones share the store handle and the charge meter.
pub struct Workspace<S> {
    store: Arc<S>,
    retry: RetryConfig,
    etag_retry: EtagRetryConfig,
    meter: Arc<Mutex<ChargeMeter>>,
}

impl<S> Clone for Workspace<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry.clone(),
            etag_retry: self.etag_retry.clone(),
            meter: Arc::clone(&self.meter),
        }
    }
}

impl<S> fmt::Debug for Workspace<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meter = self.meter.lock();
        f.debug_struct("Workspace")
            .field("retry", &self.retry)
            .field("etag_retry", &self.etag_retry)
            .field("total_request_charge", &meter.total)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore> Workspace<S> {
    /// Creates a workspace around a store with the default retry policies.
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    /// Creates a workspace around an already shared store.
    pub fn from_shared(store: Arc<S>) -> Self {
        Self {
            store,
            retry: RetryConfig::default(),
            etag_retry: EtagRetryConfig::default(),
            meter: Arc::new(Mutex::new(ChargeMeter::default())),
        }
    }

    /// Replaces the policy for transient failures.
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the policy for version-checked replaces.
    #[must_use]
    pub fn with_etag_retry_config(mut self, etag_retry: EtagRetryConfig) -> Self {
        self.etag_retry = etag_retry;
        self
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the policy for transient failures.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub(crate) fn etag_retry_config(&self) -> &EtagRetryConfig {
        &self.etag_retry
    }

    /// Returns the request units consumed by every successful call made
    /// through this workspace and its clones.
    #[must_use]
    pub fn total_request_charge(&self) -> f64 {
        self.meter.lock().total
    }

    /// Returns the number of successful calls metered so far.
    #[must_use]
    pub fn metered_responses(&self) -> u64 {
        self.meter.lock().responses
    }

    /// Returns a handle to a database without contacting the store.
    ///
    /// Use [`ensure_database`](Self::ensure_database) to create it when it
    /// may be missing.
    pub fn database(&self, id: impl Into<String>) -> DatabaseHandle<S> {
        DatabaseHandle { workspace: self.clone(), id: id.into() }
    }

    /// Releases the store handle.
    ///
    /// Every clone shares the handle, so calls through any of them fail
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns whatever the store reports while shutting down.
    pub async fn close(&self) -> StoreResult<()> {
        tracing::debug!(total_request_charge = self.total_request_charge(), "releasing store handle");
        self.store.shutdown().await
    }

    /// Runs `work` and tears the workspace down on every exit path.
    ///
    /// The teardown runs whether `work` succeeded or failed. The result of
    /// `work` wins: a teardown failure is only returned when `work`
    /// succeeded, otherwise it is logged.
    ///
    /// # Errors
    ///
    /// Returns the error of `work`, or the teardown error when `work`
    /// succeeded.
    pub async fn scoped<F, Fut, T>(self, teardown: Teardown, work: F) -> StoreResult<T>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let outcome = work(self.clone()).await;
        let cleanup = self.teardown(teardown).await;

        match (outcome, cleanup) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup_err)) => {
                tracing::warn!(error = %cleanup_err, "teardown failed after workflow error");
                Err(err)
            },
        }
    }

    async fn teardown(&self, teardown: Teardown) -> StoreResult<()> {
        let deleted = match teardown {
            Teardown::Release => Ok(()),
            Teardown::DeleteDatabase(id) => match self.database(id.as_str()).delete().await {
                Ok(()) => Ok(()),
                Err(StoreError::NotFound { .. }) => {
                    tracing::debug!(database = %id, "database already gone");
                    Ok(())
                },
                Err(err) => Err(err),
            },
        };
        let closed = self.close().await;
        deleted.and(closed)
    }

    /// Issues one store call through the retry policy and meters its
    /// charge.
    pub(crate) async fn metered<T, F, Fut>(
        &self,
        operation: &str,
        call: F,
    ) -> StoreResult<Response<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<Response<T>>>,
    {
        let response = with_retry(&self.retry, operation, call).await?;
        Ok(self.record(operation, response))
    }

    /// Like [`metered`](Self::metered) for writes that are not idempotent.
    ///
    /// A timeout or dropped connection is returned instead of retried: the
    /// write may already have been applied.
    pub(crate) async fn metered_write<T, F, Fut>(
        &self,
        operation: &str,
        call: F,
    ) -> StoreResult<Response<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<Response<T>>>,
    {
        match with_write_retry(&self.retry, operation, call).await {
            Ok(response) => Ok(self.record(operation, response)),
            Err(err) => {
                if err.is_ambiguous() {
                    tracing::warn!(operation, error = %err, "write outcome unknown, not retried");
                }
                Err(err)
            },
        }
    }

    fn record<T>(&self, operation: &str, response: Response<T>) -> Response<T> {
        {
            let mut meter = self.meter.lock();
            meter.total += response.request_charge;
            meter.responses += 1;
        }
        tracing::debug!(
            operation,
            status = response.status.as_u16(),
            request_charge = response.request_charge,
            "store call completed",
        );
        response
    }
}

/// Handle to a database inside a [`Workspace`].
pub struct DatabaseHandle<S> {
    pub(crate) workspace: Workspace<S>,
    pub(crate) id: String,
}

impl<S> Clone for DatabaseHandle<S> {
    fn clone(&self) -> Self {
        Self { workspace: self.workspace.clone(), id: self.id.clone() }
    }
}

impl<S> fmt::Debug for DatabaseHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<S: DocumentStore> DatabaseHandle<S> {
    /// Returns the database id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the workspace this handle belongs to.
    pub fn workspace(&self) -> &Workspace<S> {
        &self.workspace
    }

    /// Returns a handle to a container without contacting the store.
    ///
    /// `partition_key_path` must be the path the container was created
    /// with.
    pub fn container(
        &self,
        id: impl Into<String>,
        partition_key_path: PartitionKeyPath,
    ) -> ContainerHandle<S> {
        ContainerHandle {
            workspace: self.workspace.clone(),
            link: ContainerLink::new(self.id.clone(), id),
            partition_key_path,
        }
    }
}

/// Handle to a container inside a [`Workspace`].
///
/// Every item operation of the access-pattern layer hangs off this type.
pub struct ContainerHandle<S> {
    pub(crate) workspace: Workspace<S>,
    pub(crate) link: ContainerLink,
    pub(crate) partition_key_path: PartitionKeyPath,
}

impl<S> Clone for ContainerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            workspace: self.workspace.clone(),
            link: self.link.clone(),
            partition_key_path: self.partition_key_path.clone(),
        }
    }
}

impl<S> fmt::Debug for ContainerHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("link", &self.link)
            .field("partition_key_path", &self.partition_key_path)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore> ContainerHandle<S> {
    /// Returns the container's address.
    pub fn link(&self) -> &ContainerLink {
        &self.link
    }

    /// Returns the path the container partitions by.
    pub fn partition_key_path(&self) -> &PartitionKeyPath {
        &self.partition_key_path
    }

    /// Returns the workspace this handle belongs to.
    pub fn workspace(&self) -> &Workspace<S> {
        &self.workspace
    }
}
