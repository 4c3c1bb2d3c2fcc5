//! Shared test utilities for REST store testing.
//!
//! This module provides [`FakeService`], an in-process HTTP server that
//! speaks the service's REST protocol on top of a
//! [`MemoryStore`](docshard_store::MemoryStore), plus helpers that point a
//! [`RestStore`] at it. Signatures are verified, so a request the real
//! service would reject for its authorization header is rejected here too.
//! It is feature-gated behind `testutil` to prevent leaking into production
//! builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! docshard-store-rest = { path = "../store-rest", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use docshard_store_rest::testutil::{FakeService, create_test_store};
//! ```
//!
//! # Throughput
//!
//! A container created with `x-ms-offer-throughput` gets dedicated
//! throughput; without the header it shares its database's. Offers are
//! addressed by the container resource ids the fake has handed out.

use std::{borrow::Cow, collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response as HttpResponse},
    routing::{get, post, put},
};
use docshard_store::{
    ContainerLink, ContainerSpec, DocumentStore, MemoryStore, PartitionKey, QueryRequest,
    StoreError, StoreResult, ThroughputSpec,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::{
    RestStore, RestStoreConfig,
    auth::{MasterKeySigner, ResourceType},
    headers,
    wire::{self, ContainerBody, DocumentsPage, OffersPage, QueryBody},
};

/// Master key the fake verifies signatures with.
pub const TEST_MASTER_KEY: &str = "ZG9jc2hhcmQtdGVzdC1tYXN0ZXIta2V5LTAxMjM0NTY3ODk=";

/// In-process fake of the document service.
///
/// The server task stops when the value is dropped.
pub struct FakeService {
    address: SocketAddr,
    store: MemoryStore,
    task: tokio::task::JoinHandle<()>,
}

impl FakeService {
    /// Starts a fake over an empty emulator on an ephemeral port.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start() -> Self {
        Self::start_with(MemoryStore::new()).await
    }

    /// Starts a fake serving `store`.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start_with(store: MemoryStore) -> Self {
        let state = FakeState {
            store: store.clone(),
            signer: MasterKeySigner::new(TEST_MASTER_KEY).expect("test key decodes"),
            offers: Arc::new(Mutex::new(HashMap::new())),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind fake service");
        let address = listener.local_addr().expect("fake service address");
        let router = router(state);
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                tracing::error!(error = %err, "fake service stopped");
            }
        });

        Self { address, store, task }
    }

    /// Returns the endpoint URL clients should use.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("http://{}/", self.address)
    }

    /// Returns the emulator behind the fake, for fault injection and
    /// request counting.
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl Drop for FakeService {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Create a [`RestStoreConfig`] pointing at the given fake.
///
/// # Panics
///
/// Panics if the configuration is rejected (should not happen).
#[must_use]
pub fn test_config(service: &FakeService) -> RestStoreConfig {
    RestStoreConfig::builder()
        .endpoint(service.endpoint())
        .master_key(TEST_MASTER_KEY)
        .build()
        .expect("valid test config")
}

/// Create a [`RestStore`] connected to the given fake.
///
/// # Panics
///
/// Panics if store creation fails.
#[must_use]
pub fn create_test_store(service: &FakeService) -> RestStore {
    RestStore::new(test_config(service)).expect("rest store creation should succeed")
}

// ============================================================================
// Server
// ============================================================================

#[derive(Clone)]
struct FakeState {
    store: MemoryStore,
    signer: MasterKeySigner,
    /// lowercased container rid -> (rid, container)
    offers: Arc<Mutex<HashMap<String, (String, ContainerLink)>>>,
}

impl FakeState {
    fn remember(&self, rid: Option<&str>, link: ContainerLink) {
        if let Some(rid) = rid {
            self.offers.lock().insert(rid.to_lowercase(), (rid.to_owned(), link));
        }
    }

    fn container_for(&self, rid: &str) -> Option<(String, ContainerLink)> {
        self.offers.lock().get(&rid.to_lowercase()).cloned()
    }
}

fn router(state: FakeState) -> Router {
    Router::new()
        .route("/dbs", post(create_database))
        .route("/dbs/{db}", get(read_database).delete(delete_database))
        .route("/dbs/{db}/colls", post(create_container))
        .route("/dbs/{db}/colls/{coll}", get(read_container))
        .route("/dbs/{db}/colls/{coll}/docs", post(create_or_query))
        .route(
            "/dbs/{db}/colls/{coll}/docs/{id}",
            get(read_item).put(replace_item).delete(delete_item),
        )
        .route("/offers", post(query_offers))
        .route("/offers/{id}", put(replace_offer))
        .layer(middleware::from_fn_with_state(state.clone(), verify_signature))
        .with_state(state)
}

/// Store error rendered as a service error answer.
struct Fault(StoreError);

impl From<StoreError> for Fault {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for Fault {
    fn into_response(self) -> HttpResponse {
        let status = self.0.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "code": status.canonical_reason().unwrap_or("Error"),
            "message": self.0.to_string(),
        });
        let mut response = (status, Json(body)).into_response();
        if let Some(delay) = self.0.retry_after() {
            set_header(response.headers_mut(), headers::RETRY_AFTER_MS, &delay.as_millis().to_string());
        }
        response
    }
}

type Answer = Result<HttpResponse, Fault>;

fn bad_request(err: impl std::fmt::Display) -> Fault {
    Fault(StoreError::bad_request(err.to_string()))
}

fn set_header(map: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        map.insert(HeaderName::from_static(name), value);
    }
}

fn header<'a>(map: &'a HeaderMap, name: &str) -> Option<&'a str> {
    map.get(name).and_then(|v| v.to_str().ok())
}

/// Builds a success answer carrying the call's metadata headers.
fn reply<R, T: Serialize>(
    status: StatusCode,
    response: &docshard_store::Response<R>,
    body: Option<&T>,
) -> HttpResponse {
    let mut answer = match body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    };
    let map = answer.headers_mut();
    set_header(map, headers::REQUEST_CHARGE, &response.request_charge.to_string());
    if let Some(etag) = &response.etag {
        set_header(map, "etag", etag);
    }
    if let Some(continuation) = &response.continuation {
        set_header(map, headers::CONTINUATION, continuation);
    }
    answer
}

fn partition_key(map: &HeaderMap) -> Result<PartitionKey, Fault> {
    let raw = header(map, headers::PARTITION_KEY)
        .ok_or_else(|| bad_request("partition key header is required"))?;
    match serde_json::from_str::<Vec<String>>(raw).map_err(bad_request)?.as_slice() {
        [value] => Ok(PartitionKey::new(value.clone())),
        _ => Err(bad_request("partition key header must hold exactly one value")),
    }
}

async fn verify_signature(State(state): State<FakeState>, request: Request, next: Next) -> HttpResponse {
    match authorize(&state, &request) {
        Ok(()) => next.run(request).await,
        Err(err) => Fault(err).into_response(),
    }
}

fn authorize(state: &FakeState, request: &Request) -> StoreResult<()> {
    let date = header(request.headers(), headers::DATE)
        .ok_or_else(|| StoreError::unauthorized("missing x-ms-date header"))?;
    let presented = header(request.headers(), AUTHORIZATION.as_str())
        .ok_or_else(|| StoreError::unauthorized("missing authorization header"))?;

    let path = request.uri().path();
    let decoded = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::decode(segment).map(Cow::into_owned))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| StoreError::bad_request(err.to_string()))?;
    let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();
    let (resource_type, resource_link) =
        ResourceType::resolve(&segments).ok_or_else(|| StoreError::not_found(path))?;

    let expected = state.signer.sign(request.method(), resource_type, &resource_link, date)?;
    if expected != presented {
        return Err(StoreError::unauthorized(format!("signature mismatch for {resource_type} `{resource_link}`")));
    }
    Ok(())
}

async fn create_database(State(state): State<FakeState>, Json(body): Json<Value>) -> Answer {
    let id = body.get("id").and_then(Value::as_str).ok_or_else(|| bad_request("database id is required"))?;
    let response = state.store.create_database_if_not_exists(id).await?;
    if response.status == StatusCode::OK {
        return Err(StoreError::conflict(format!("dbs/{id}")).into());
    }
    Ok(reply(StatusCode::CREATED, &response, Some(&response.resource)))
}

async fn read_database(State(state): State<FakeState>, Path(db): Path<String>) -> Answer {
    let response = state.store.read_database(&db)?;
    Ok(reply(StatusCode::OK, &response, Some(&response.resource)))
}

async fn delete_database(State(state): State<FakeState>, Path(db): Path<String>) -> Answer {
    let response = state.store.delete_database(&db).await?;
    Ok(reply::<_, ()>(StatusCode::NO_CONTENT, &response, None))
}

async fn create_container(
    State(state): State<FakeState>,
    Path(db): Path<String>,
    map: HeaderMap,
    Json(body): Json<ContainerBody>,
) -> Answer {
    let partition_key_path = body.partition_key_path().map_err(bad_request)?;
    let throughput = match header(&map, headers::OFFER_THROUGHPUT) {
        Some(raw) => ThroughputSpec::Manual(raw.parse().map_err(bad_request)?),
        None => ThroughputSpec::Shared,
    };
    let spec = ContainerSpec::builder()
        .id(body.id.as_str())
        .partition_key_path(partition_key_path)
        .throughput(throughput)
        .build();

    let response = state.store.create_container_if_not_exists(&db, &spec).await?;
    if response.status == StatusCode::OK {
        return Err(StoreError::conflict(format!("dbs/{db}/colls/{}", spec.id)).into());
    }
    state.remember(response.resource.rid.as_deref(), ContainerLink::new(db, spec.id.as_str()));
    let container = ContainerBody::from_properties(response.resource.clone());
    Ok(reply(StatusCode::CREATED, &response, Some(&container)))
}

async fn read_container(
    State(state): State<FakeState>,
    Path((db, coll)): Path<(String, String)>,
) -> Answer {
    let link = ContainerLink::new(db, coll);
    let response = state.store.read_container(&link)?;
    state.remember(response.resource.rid.as_deref(), link);
    let container = ContainerBody::from_properties(response.resource.clone());
    Ok(reply(StatusCode::OK, &response, Some(&container)))
}

async fn create_or_query(
    State(state): State<FakeState>,
    Path((db, coll)): Path<(String, String)>,
    map: HeaderMap,
    body: Bytes,
) -> Answer {
    let link = ContainerLink::new(db, coll);
    let is_query = header(&map, headers::IS_QUERY).is_some_and(|v| v.eq_ignore_ascii_case("true"));

    if !is_query {
        let partition_key = partition_key(&map)?;
        let document: Value = serde_json::from_slice(&body).map_err(bad_request)?;
        let response = state.store.create_item(&link, &partition_key, document).await?;
        return Ok(reply(StatusCode::CREATED, &response, Some(&response.resource)));
    }

    let query: QueryBody = serde_json::from_slice(&body).map_err(bad_request)?;
    let partition_key = match header(&map, headers::PARTITION_KEY) {
        Some(_) => Some(partition_key(&map)?),
        None => None,
    };
    let max_item_count = header(&map, headers::MAX_ITEM_COUNT)
        .map(|raw| raw.parse::<i64>().map_err(bad_request))
        .transpose()?
        .filter(|count| *count != -1)
        .map(|count| u32::try_from(count).map_err(bad_request))
        .transpose()?;
    let request = QueryRequest {
        query: query.query,
        parameters: query.parameters,
        partition_key,
        max_item_count,
        continuation: header(&map, headers::CONTINUATION).map(str::to_owned),
    };

    let response = state.store.query_items(&link, &request).await?;
    let page = DocumentsPage { count: response.resource.len(), documents: response.resource.clone() };
    Ok(reply(StatusCode::OK, &response, Some(&page)))
}

async fn read_item(
    State(state): State<FakeState>,
    Path((db, coll, id)): Path<(String, String, String)>,
    map: HeaderMap,
) -> Answer {
    let partition_key = partition_key(&map)?;
    let response = state.store.read_item(&ContainerLink::new(db, coll), &id, &partition_key).await?;
    Ok(reply(StatusCode::OK, &response, Some(&response.resource)))
}

async fn replace_item(
    State(state): State<FakeState>,
    Path((db, coll, id)): Path<(String, String, String)>,
    map: HeaderMap,
    Json(document): Json<Value>,
) -> Answer {
    let partition_key = partition_key(&map)?;
    let if_match = header(&map, "if-match");
    let response = state
        .store
        .replace_item(&ContainerLink::new(db, coll), &id, &partition_key, document, if_match)
        .await?;
    Ok(reply(StatusCode::OK, &response, Some(&response.resource)))
}

async fn delete_item(
    State(state): State<FakeState>,
    Path((db, coll, id)): Path<(String, String, String)>,
    map: HeaderMap,
) -> Answer {
    let partition_key = partition_key(&map)?;
    let response = state.store.delete_item(&ContainerLink::new(db, coll), &id, &partition_key).await?;
    Ok(reply::<_, ()>(StatusCode::NO_CONTENT, &response, None))
}

async fn query_offers(State(state): State<FakeState>, body: Bytes) -> Answer {
    let query: QueryBody = serde_json::from_slice(&body).map_err(bad_request)?;
    let rid = query
        .parameters
        .iter()
        .find(|p| p.name == "@rid")
        .and_then(|p| p.value.as_str())
        .ok_or_else(|| bad_request("offers are looked up by @rid"))?;

    let Some((rid, link)) = state.container_for(rid) else {
        let empty = OffersPage { offers: Vec::new() };
        return Ok((StatusCode::OK, Json(empty)).into_response());
    };
    let response = state.store.read_throughput(&link).await?;
    let page = OffersPage {
        offers: response.resource.map(|ru| wire::offer(&rid, ru)).into_iter().collect(),
    };
    Ok(reply(StatusCode::OK, &response, Some(&page)))
}

async fn replace_offer(
    State(state): State<FakeState>,
    Path(id): Path<String>,
    Json(offer): Json<Value>,
) -> Answer {
    let (rid, link) =
        state.container_for(&id).ok_or_else(|| Fault(StoreError::not_found(format!("offers/{id}"))))?;
    let throughput = wire::offer_throughput(&offer).map_err(bad_request)?;
    let response = state.store.replace_throughput(&link, throughput).await?;
    let replaced = wire::offer(&rid, response.resource);
    Ok(reply(StatusCode::OK, &response, Some(&replaced)))
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_store_is_functional() {
        let service = FakeService::start().await;
        let store = create_test_store(&service);

        let created = store.create_database_if_not_exists("db").await.expect("create database");
        assert_eq!(created.status, StatusCode::CREATED);
        assert!(service.store().read_database("db").is_ok());
    }

    #[tokio::test]
    async fn test_endpoint_is_local() {
        let service = FakeService::start().await;
        assert!(service.endpoint().starts_with("http://127.0.0.1:"));
        assert!(service.endpoint().ends_with('/'));
    }
}
