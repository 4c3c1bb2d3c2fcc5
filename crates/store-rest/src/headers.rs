//! Header names of the service's REST protocol.

/// Request date the signature covers.
pub const DATE: &str = "x-ms-date";
/// REST API version.
pub const VERSION: &str = "x-ms-version";
/// Partition key of the addressed item, as a JSON array.
pub const PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";
/// Marks a POST on a document feed as a query.
pub const IS_QUERY: &str = "x-ms-documentdb-isquery";
/// Allows a query without a partition key to fan out.
pub const ENABLE_CROSS_PARTITION: &str = "x-ms-documentdb-query-enablecrosspartition";
/// Page size of a query.
pub const MAX_ITEM_COUNT: &str = "x-ms-max-item-count";
/// Continuation token of a query, in both directions.
pub const CONTINUATION: &str = "x-ms-continuation";
/// Request units the call consumed.
pub const REQUEST_CHARGE: &str = "x-ms-request-charge";
/// Delay a throttled client should wait, in milliseconds.
pub const RETRY_AFTER_MS: &str = "x-ms-retry-after-ms";
/// Dedicated throughput requested at container creation.
pub const OFFER_THROUGHPUT: &str = "x-ms-offer-throughput";

/// Content type of a query body.
pub const QUERY_CONTENT_TYPE: &str = "application/query+json";
