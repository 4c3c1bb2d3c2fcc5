//! The walkthrough: one pass over the database, container and item
//! lifecycle.
//!
//! Steps run in order against a single [`Workspace`]:
//!
//! 1. ensure the database
//! 2. ensure the container, partitioned by `/partitionKey`
//! 3. raise its throughput (skipped when the account cannot adjust it)
//! 4. create the Andersen and Wakefield households unless present
//! 5. query the Andersen partition
//! 6. register the Wakefields and promote their first child
//! 7. delete the Wakefield household
//!
//! The database is deleted and the store released afterwards, also when a
//! step failed.

use std::future::Future;

use docshard_store::{
    ContainerHandle, ContainerSpec, Document, DocumentStore, PartitionKey, PartitionKeyPath,
    QuerySpec, StoreResult, Teardown, ThroughputChange, Workspace,
};

use crate::{
    config::WalkthroughConfig,
    household::{self, Household, WAKEFIELD_ID},
};

/// Query of the Andersen partition. The filter pins the partition key, so
/// the query is routed to a single partition.
pub const ANDERSEN_QUERY: &str = "SELECT * FROM c WHERE c.partitionKey = 'Andersen'";

const WAKEFIELD_PARTITION: &str = "Wakefield";

/// Outcome of a create-if-absent step.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedItem {
    pub id: String,
    /// `false` when the item was already there.
    pub created: bool,
    pub request_charge: f64,
}

/// What a completed walkthrough did.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Throughput before and after scaling; `None` when scaling was skipped.
    pub throughput: Option<ThroughputChange>,
    pub created: Vec<CreatedItem>,
    /// Households the Andersen query returned.
    pub andersen: Vec<Household>,
    /// The Wakefield household as replaced.
    pub updated: Household,
    /// Request units of every step, excluding the final cleanup.
    pub request_charge: f64,
}

/// Runs every step, then tears the workspace down.
///
/// Unless `keep_database` is set the database is deleted, on success and on
/// failure alike; the store handle is released either way.
///
/// # Errors
///
/// Returns the error of the first failing step, or the cleanup error when
/// every step succeeded.
pub async fn run<S: DocumentStore>(workspace: Workspace<S>, config: &WalkthroughConfig) -> StoreResult<Report> {
    let teardown = if config.keep_database() {
        Teardown::Release
    } else {
        Teardown::DeleteDatabase(config.database().to_owned())
    };

    tracing::info!(database = config.database(), container = config.container(), "beginning operations");
    let report = workspace.scoped(teardown, |ws| async move { steps(&ws, config).await }).await?;
    tracing::info!(request_charge = report.request_charge, "walkthrough finished");
    Ok(report)
}

async fn steps<S: DocumentStore>(ws: &Workspace<S>, config: &WalkthroughConfig) -> StoreResult<Report> {
    let database = charged(ws, "create_database", ws.ensure_database(config.database())).await?;

    let spec = ContainerSpec::builder()
        .id(config.container())
        .partition_key_path(PartitionKeyPath::default())
        .build();
    let items = charged(ws, "create_container", database.ensure_container(&spec)).await?;

    let throughput = charged(ws, "scale_container", scale(&items, config.throughput_delta())).await?;
    let created = charged(ws, "add_items", add_households(&items)).await?;
    let andersen = charged(ws, "query_items", query_andersen(&items)).await?;
    let updated = charged(ws, "replace_item", replace_wakefield(&items)).await?;
    charged(ws, "delete_item", delete_wakefield(&items)).await?;

    Ok(Report { throughput, created, andersen, updated, request_charge: ws.total_request_charge() })
}

/// Awaits one step and logs what it cost.
async fn charged<S, T, Fut>(ws: &Workspace<S>, step: &'static str, work: Fut) -> StoreResult<T>
where
    S: DocumentStore,
    Fut: Future<Output = StoreResult<T>>,
{
    let before = ws.total_request_charge();
    let result = work.await;
    let request_charge = ws.total_request_charge() - before;

    match &result {
        Ok(_) => tracing::info!(step, request_charge, "step completed"),
        Err(err) => tracing::error!(
            step,
            request_charge,
            status = err.status().map(|s| s.as_u16()),
            error = %err,
            "step failed",
        ),
    }
    result
}

async fn scale<S: DocumentStore>(
    items: &ContainerHandle<S>,
    delta: u32,
) -> StoreResult<Option<ThroughputChange>> {
    let change = items.increase_throughput(delta).await?;
    match &change {
        Some(change) => tracing::info!(
            previous = change.previous,
            current = change.current,
            "provisioned throughput raised"
        ),
        None => tracing::info!("container throughput cannot be adjusted, scaling skipped"),
    }
    Ok(change)
}

async fn add_households<S: DocumentStore>(items: &ContainerHandle<S>) -> StoreResult<Vec<CreatedItem>> {
    let mut created = Vec::with_capacity(2);
    for household in [household::andersen(), household::wakefield()] {
        let outcome = items.create_if_absent(&household).await?;
        if outcome.created {
            tracing::info!(id = household.id(), request_charge = outcome.request_charge, "created item");
        } else {
            tracing::info!(id = household.id(), "item already exists");
        }
        created.push(CreatedItem {
            id: household.id,
            created: outcome.created,
            request_charge: outcome.request_charge,
        });
    }
    Ok(created)
}

async fn query_andersen<S: DocumentStore>(items: &ContainerHandle<S>) -> StoreResult<Vec<Household>> {
    tracing::info!(query = ANDERSEN_QUERY, "running query");
    let found: Vec<Household> = items.query(QuerySpec::new(ANDERSEN_QUERY)).try_collect_all().await?;
    for household in &found {
        tracing::info!(%household, "read household");
    }
    Ok(found)
}

async fn replace_wakefield<S: DocumentStore>(items: &ContainerHandle<S>) -> StoreResult<Household> {
    let partition_key = PartitionKey::new(WAKEFIELD_PARTITION);
    let response = items
        .replace_checked(WAKEFIELD_ID, &partition_key, household::register_and_promote)
        .await?;
    tracing::info!(
        id = WAKEFIELD_ID,
        request_charge = response.request_charge,
        body = %response.resource,
        "updated household",
    );
    Ok(response.resource)
}

async fn delete_wakefield<S: DocumentStore>(items: &ContainerHandle<S>) -> StoreResult<()> {
    let partition_key = PartitionKey::new(WAKEFIELD_PARTITION);
    let response = items.delete_item(WAKEFIELD_ID, &partition_key).await?;
    tracing::info!(
        id = WAKEFIELD_ID,
        partition_key = WAKEFIELD_PARTITION,
        request_charge = response.request_charge,
        "deleted household",
    );
    Ok(())
}
