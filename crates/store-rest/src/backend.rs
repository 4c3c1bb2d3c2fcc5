//! [`DocumentStore`] implementation over the service's REST API.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use docshard_store::{
    ContainerLink, ContainerProperties, ContainerSpec, DatabaseProperties, DocumentStore,
    PartitionKey, QueryRequest, Response, StoreError, StoreResult, ThroughputSpec,
};
use http::{
    HeaderMap, Method, StatusCode,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, ETAG, IF_MATCH},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use crate::{
    auth::{MasterKeySigner, ResourceType, http_date},
    config::RestStoreConfig,
    error::{RestStoreError, Result},
    headers,
    wire::{self, ContainerBody, DocumentsPage, OffersPage, QueryBody, ServiceError},
};

/// Raw answer of a successful call.
#[derive(Debug)]
struct Body {
    status: StatusCode,
    request_charge: f64,
    etag: Option<String>,
    continuation: Option<String>,
    bytes: Vec<u8>,
}

impl Body {
    fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_slice(&self.bytes).map_err(StoreError::from)
    }

    fn into_response<T>(self, resource: T) -> Response<T> {
        Response::new(resource, self.status, self.request_charge)
            .with_etag(self.etag)
            .with_continuation(self.continuation)
    }
}

/// Document store backed by the hosted service.
///
/// Requests are signed with the account master key and sent with
/// [`reqwest`]. Service answers map onto [`StoreError`] by status code;
/// the request charge, ETag and continuation come from response headers.
///
/// # Thread Safety
///
/// `RestStore` is `Send + Sync`. The underlying HTTP client pools
/// connections, so one instance serves the whole process.
///
/// # Throughput
///
/// Dedicated throughput lives in a separate offer resource. Reading it
/// resolves the container's resource id, then queries the offer bound to
/// it; a container without an offer shares its database's throughput.
///
/// # Example
///
/// ```no_run
/// use docshard_store::{DocumentStore, Workspace};
/// use docshard_store_rest::{RestStore, RestStoreConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RestStoreConfig::builder()
///     .endpoint(std::env::var("DOCSHARD_ENDPOINT")?)
///     .master_key(std::env::var("DOCSHARD_KEY")?)
///     .build()?;
/// let workspace = Workspace::new(RestStore::new(config)?);
/// workspace.ensure_database("ToDoList").await?;
/// # Ok(())
/// # }
/// ```
pub struct RestStore {
    client: reqwest::Client,
    endpoint: Url,
    api_version: String,
    signer: MasterKeySigner,
    closed: AtomicBool,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_version", &self.api_version)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl RestStore {
    /// Creates a store from a validated configuration.
    ///
    /// No request is made until the first operation.
    ///
    /// # Errors
    ///
    /// - [`RestStoreError::Config`] when the configuration is invalid.
    /// - [`RestStoreError::Signing`] when the master key does not decode.
    /// - [`RestStoreError::Transport`] when the HTTP client cannot be built.
    pub fn new(config: RestStoreConfig) -> Result<Self> {
        config.validate()?;
        let signer = MasterKeySigner::new(&config.master_key)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        tracing::debug!(endpoint = %config.endpoint, "rest store configured");
        Ok(Self {
            client,
            endpoint: config.endpoint,
            api_version: config.api_version,
            signer,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the account endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::internal("endpoint cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Starts a signed request to the resource at `segments`.
    fn request(&self, method: Method, segments: &[&str]) -> StoreResult<reqwest::RequestBuilder> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::closed());
        }

        let (resource_type, resource_link) = ResourceType::resolve(segments)
            .ok_or_else(|| StoreError::internal(format!("no resource at /{}", segments.join("/"))))?;
        let date = http_date(Utc::now());
        let authorization = self.signer.sign(&method, resource_type, &resource_link, &date)?;
        let url = self.url(segments)?;

        Ok(self
            .client
            .request(method, url)
            .header(headers::DATE, date)
            .header(headers::VERSION, &self.api_version)
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, "application/json"))
    }

    /// Sends a request and splits the answer into body and metadata.
    ///
    /// `resource` names what was addressed in errors.
    async fn execute(&self, request: reqwest::RequestBuilder, resource: &str) -> StoreResult<Body> {
        let response = request.send().await.map_err(RestStoreError::from)?;
        let status = response.status();
        let meta = response.headers().clone();
        let bytes = response.bytes().await.map_err(RestStoreError::from)?.to_vec();

        let request_charge = request_charge(&meta, resource);

        if status.is_success() {
            return Ok(Body {
                status,
                request_charge,
                etag: header(&meta, ETAG.as_str()).map(str::to_owned),
                continuation: header(&meta, headers::CONTINUATION).map(str::to_owned),
                bytes,
            });
        }

        let retry_after = header(&meta, headers::RETRY_AFTER_MS)
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis);
        let error = serde_json::from_slice::<ServiceError>(&bytes).unwrap_or_else(|_| ServiceError {
            code: String::new(),
            message: String::from_utf8_lossy(&bytes).into_owned(),
        });

        tracing::debug!(
            status = status.as_u16(),
            code = %error.code,
            request_charge,
            %resource,
            "service rejected request",
        );
        Err(StoreError::from_status(status, resource, error.message, retry_after))
    }

    async fn read_container(&self, link: &ContainerLink) -> StoreResult<Response<ContainerProperties>> {
        let segments = ["dbs", link.database(), "colls", link.container()];
        let request = self.request(Method::GET, &segments)?;
        let body = self.execute(request, &link.to_string()).await?;
        let container = body.decode::<ContainerBody>()?.into_properties()?;
        Ok(body.into_response(container))
    }

    /// Finds the offer bound to a container, with the charge of both
    /// lookups.
    async fn find_offer(&self, link: &ContainerLink) -> StoreResult<(Option<Value>, f64)> {
        let container = self.read_container(link).await?;
        let rid = container.resource.rid.ok_or_else(|| {
            StoreError::from(RestStoreError::Protocol(format!("container {link} has no _rid")))
        })?;

        let query = QueryBody {
            query: "SELECT * FROM root WHERE root.offerResourceId = @rid".to_owned(),
            parameters: vec![docshard_store::QueryParameter { name: "@rid".to_owned(), value: json!(rid) }],
        };
        let request = self
            .request(Method::POST, &["offers"])?
            .header(headers::IS_QUERY, "True")
            .header(CONTENT_TYPE, headers::QUERY_CONTENT_TYPE)
            .body(serde_json::to_vec(&query)?);
        let body = self.execute(request, &link.to_string()).await?;
        let page = body.decode::<OffersPage>()?;

        let charge = container.request_charge + body.request_charge;
        Ok((page.offers.into_iter().next(), charge))
    }

    fn item_segments<'a>(link: &'a ContainerLink, id: &'a str) -> [&'a str; 6] {
        ["dbs", link.database(), "colls", link.container(), "docs", id]
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Reads the request units a response was charged.
///
/// A missing header counts as free. A header that is present but not a
/// non-negative number is logged and also counted as 0.
fn request_charge(meta: &HeaderMap, resource: &str) -> f64 {
    let Some(raw) = meta.get(headers::REQUEST_CHARGE) else {
        tracing::debug!(resource, "response carries no request charge");
        return 0.0;
    };
    match raw.to_str().ok().and_then(|v| v.trim().parse::<f64>().ok()) {
        Some(charge) if charge.is_finite() && charge >= 0.0 => charge,
        _ => {
            tracing::warn!(resource, value = ?raw, "unparseable request charge header, counted as 0");
            0.0
        },
    }
}

#[async_trait]
impl DocumentStore for RestStore {
    #[tracing::instrument(skip(self))]
    async fn create_database_if_not_exists(
        &self,
        id: &str,
    ) -> StoreResult<Response<DatabaseProperties>> {
        let link = format!("dbs/{id}");
        let request = self.request(Method::POST, &["dbs"])?.json(&json!({ "id": id }));
        match self.execute(request, &link).await {
            Ok(body) => {
                let props = body.decode::<DatabaseProperties>()?;
                Ok(body.into_response(props))
            },
            Err(StoreError::Conflict { .. }) => {
                let request = self.request(Method::GET, &["dbs", id])?;
                let body = self.execute(request, &link).await?;
                let props = body.decode::<DatabaseProperties>()?;
                Ok(body.into_response(props))
            },
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn delete_database(&self, id: &str) -> StoreResult<Response<()>> {
        let request = self.request(Method::DELETE, &["dbs", id])?;
        let body = self.execute(request, &format!("dbs/{id}")).await?;
        Ok(body.into_response(()))
    }

    #[tracing::instrument(skip(self, spec), fields(container = %spec.id))]
    async fn create_container_if_not_exists(
        &self,
        database: &str,
        spec: &ContainerSpec,
    ) -> StoreResult<Response<ContainerProperties>> {
        let mut request = self
            .request(Method::POST, &["dbs", database, "colls"])?
            .json(&ContainerBody::from_spec(spec));
        if let ThroughputSpec::Manual(ru) = spec.throughput {
            request = request.header(headers::OFFER_THROUGHPUT, ru.to_string());
        }

        match self.execute(request, &format!("dbs/{database}")).await {
            Ok(body) => {
                let props = body.decode::<ContainerBody>()?.into_properties()?;
                Ok(body.into_response(props))
            },
            Err(StoreError::Conflict { .. }) => {
                self.read_container(&ContainerLink::new(database, spec.id.as_str())).await
            },
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(skip(self), fields(container = %container))]
    async fn read_throughput(&self, container: &ContainerLink) -> StoreResult<Response<Option<u32>>> {
        let (offer, charge) = self.find_offer(container).await?;
        let throughput = offer.as_ref().map(wire::offer_throughput).transpose()?;
        Ok(Response::new(throughput, StatusCode::OK, charge))
    }

    #[tracing::instrument(skip(self), fields(container = %container))]
    async fn replace_throughput(
        &self,
        container: &ContainerLink,
        throughput: u32,
    ) -> StoreResult<Response<u32>> {
        let (offer, lookup_charge) = self.find_offer(container).await?;
        let Some(mut offer) = offer else {
            return Err(StoreError::bad_request(format!(
                "container {container} has no dedicated throughput"
            )));
        };

        let offer_id = wire::offer_id(&offer)?.to_owned();
        if let Some(content) = offer.get_mut("content").and_then(Value::as_object_mut) {
            content.insert("offerThroughput".to_owned(), json!(throughput));
        }

        let request = self.request(Method::PUT, &["offers", &offer_id])?.json(&offer);
        let body = self.execute(request, &format!("offers/{offer_id}")).await?;
        let replaced = wire::offer_throughput(&body.decode::<Value>()?)?;
        let mut response = body.into_response(replaced);
        response.request_charge += lookup_charge;
        Ok(response)
    }

    #[tracing::instrument(skip(self, partition_key), fields(container = %container))]
    async fn read_item(
        &self,
        container: &ContainerLink,
        id: &str,
        partition_key: &PartitionKey,
    ) -> StoreResult<Response<Value>> {
        let request = self
            .request(Method::GET, &Self::item_segments(container, id))?
            .header(headers::PARTITION_KEY, partition_key.to_header_value());
        let body = self.execute(request, &container.item_link(id)).await?;
        let document = body.decode::<Value>()?;
        Ok(body.into_response(document))
    }

    #[tracing::instrument(skip(self, partition_key, document), fields(container = %container))]
    async fn create_item(
        &self,
        container: &ContainerLink,
        partition_key: &PartitionKey,
        document: Value,
    ) -> StoreResult<Response<Value>> {
        let resource = match document.get("id").and_then(Value::as_str) {
            Some(id) => container.item_link(id),
            None => container.to_string(),
        };
        let request = self
            .request(Method::POST, &["dbs", container.database(), "colls", container.container(), "docs"])?
            .header(headers::PARTITION_KEY, partition_key.to_header_value())
            .json(&document);
        let body = self.execute(request, &resource).await?;
        let stored = body.decode::<Value>()?;
        Ok(body.into_response(stored))
    }

    #[tracing::instrument(skip(self, partition_key, document, if_match), fields(container = %container))]
    async fn replace_item(
        &self,
        container: &ContainerLink,
        id: &str,
        partition_key: &PartitionKey,
        document: Value,
        if_match: Option<&str>,
    ) -> StoreResult<Response<Value>> {
        let mut request = self
            .request(Method::PUT, &Self::item_segments(container, id))?
            .header(headers::PARTITION_KEY, partition_key.to_header_value())
            .json(&document);
        if let Some(etag) = if_match {
            request = request.header(IF_MATCH, etag);
        }
        let body = self.execute(request, &container.item_link(id)).await?;
        let stored = body.decode::<Value>()?;
        Ok(body.into_response(stored))
    }

    #[tracing::instrument(skip(self, partition_key), fields(container = %container))]
    async fn delete_item(
        &self,
        container: &ContainerLink,
        id: &str,
        partition_key: &PartitionKey,
    ) -> StoreResult<Response<()>> {
        let request = self
            .request(Method::DELETE, &Self::item_segments(container, id))?
            .header(headers::PARTITION_KEY, partition_key.to_header_value());
        let body = self.execute(request, &container.item_link(id)).await?;
        Ok(body.into_response(()))
    }

    #[tracing::instrument(skip(self, request), fields(container = %container, query = %request.query))]
    async fn query_items(
        &self,
        container: &ContainerLink,
        request: &QueryRequest,
    ) -> StoreResult<Response<Vec<Value>>> {
        let query = QueryBody { query: request.query.clone(), parameters: request.parameters.clone() };
        let mut call = self
            .request(Method::POST, &["dbs", container.database(), "colls", container.container(), "docs"])?
            .header(headers::IS_QUERY, "True")
            .header(CONTENT_TYPE, headers::QUERY_CONTENT_TYPE)
            .body(serde_json::to_vec(&query)?);

        call = match &request.partition_key {
            Some(partition_key) => call.header(headers::PARTITION_KEY, partition_key.to_header_value()),
            None => call.header(headers::ENABLE_CROSS_PARTITION, "True"),
        };
        if let Some(max_item_count) = request.max_item_count {
            call = call.header(headers::MAX_ITEM_COUNT, max_item_count.to_string());
        }
        if let Some(continuation) = &request.continuation {
            call = call.header(headers::CONTINUATION, continuation);
        }

        let body = self.execute(call, &container.to_string()).await?;
        let page = body.decode::<DocumentsPage>()?;
        tracing::debug!(returned = page.count, has_more = body.continuation.is_some(), "query page received");
        Ok(body.into_response(page.documents))
    }

    async fn shutdown(&self) -> StoreResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(endpoint = %self.endpoint, "rest store shut down");
        }
        Ok(())
    }
}
