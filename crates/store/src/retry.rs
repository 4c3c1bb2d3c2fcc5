//! Retry logic for transient store failures.
//!
//! [`with_retry`] wraps a single store call and re-issues it while it fails
//! with a transient error ([`StoreError::is_transient`]): throttling,
//! timeouts, unavailability and connection resets. Expected conditions such
//! as `NotFound` or `BadRequest` are returned immediately, so the access
//! layer still sees them as control flow.
//!
//! [`with_etag_retry`] re-runs a whole read-modify-write cycle when the
//! conditional write loses the race to another writer.
//!
//! # Backoff Strategy
//!
//! - A throttled response carrying a retry-after hint waits for that hint, capped at `max_backoff`
//! - Otherwise the delay doubles with each attempt: `initial_backoff * 2^attempt`, capped at
//!   `max_backoff`
//! - Random jitter of 0–50% of the computed delay is added on top

use std::{future::Future, time::Duration};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StoreError, StoreResult};

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

const DEFAULT_ETAG_MAX_RETRIES: u32 = 3;
const DEFAULT_ETAG_BASE_DELAY: Duration = Duration::from_millis(10);

/// Retry policy for transient failures of single store calls.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use docshard_store::RetryConfig;
///
/// let config = RetryConfig::builder()
///     .max_retries(3)
///     .initial_backoff(Duration::from_millis(50))
///     .build()?;
/// assert_eq!(config.max_backoff(), Duration::from_secs(10));
/// # Ok::<(), docshard_store::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt. `0` disables retrying.
    #[serde(default = "default_max_retries")]
    pub(crate) max_retries: u32,

    /// Delay before the first retry.
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    pub(crate) initial_backoff: Duration,

    /// Upper bound for any single delay, service hints included.
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    pub(crate) max_backoff: Duration,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_backoff() -> Duration {
    DEFAULT_INITIAL_BACKOFF
}

fn default_max_backoff() -> Duration {
    DEFAULT_MAX_BACKOFF
}

#[bon::bon]
impl RetryConfig {
    /// Creates a retry policy.
    ///
    /// # Optional Fields
    ///
    /// * `max_retries` - Retries after the first attempt (default: 5).
    /// * `initial_backoff` - First retry delay (default: 100ms).
    /// * `max_backoff` - Cap for any single delay (default: 10s).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `initial_backoff` is zero or
    /// larger than `max_backoff`.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_RETRIES)] max_retries: u32,
        #[builder(default = DEFAULT_INITIAL_BACKOFF)] initial_backoff: Duration,
        #[builder(default = DEFAULT_MAX_BACKOFF)] max_backoff: Duration,
    ) -> Result<Self, ConfigError> {
        if initial_backoff.is_zero() {
            return Err(ConfigError::invalid("initial_backoff", "must be greater than zero"));
        }
        if initial_backoff > max_backoff {
            return Err(ConfigError::invalid(
                "initial_backoff",
                format!("{initial_backoff:?} exceeds max_backoff {max_backoff:?}"),
            ));
        }
        Ok(Self { max_retries, initial_backoff, max_backoff })
    }

    /// Returns the number of retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the cap for any single delay.
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Retry policy for version-checked read-modify-write cycles.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EtagRetryConfig {
    /// Re-runs of the cycle after the first one lost the race.
    #[serde(default = "default_etag_max_retries")]
    #[builder(default = DEFAULT_ETAG_MAX_RETRIES)]
    pub max_retries: u32,

    /// Minimum pause between cycles; up to the same amount again is added
    /// as jitter.
    #[serde(with = "humantime_serde", default = "default_etag_base_delay")]
    #[builder(default = DEFAULT_ETAG_BASE_DELAY)]
    pub base_delay: Duration,
}

fn default_etag_max_retries() -> u32 {
    DEFAULT_ETAG_MAX_RETRIES
}

fn default_etag_base_delay() -> Duration {
    DEFAULT_ETAG_BASE_DELAY
}

impl Default for EtagRetryConfig {
    fn default() -> Self {
        Self { max_retries: DEFAULT_ETAG_MAX_RETRIES, base_delay: DEFAULT_ETAG_BASE_DELAY }
    }
}

/// Executes `operation` with automatic retry on transient errors.
///
/// Returns the result of the first successful call, the first
/// non-transient error, or the last transient error once all retries are
/// spent.
///
/// # Example
///
/// ```
/// use docshard_store::{RetryConfig, StoreError, retry::with_retry};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let result = with_retry(&RetryConfig::default(), "read_item", || async {
///     Err::<(), _>(StoreError::not_found("Andersen.1"))
/// })
/// .await;
/// assert!(matches!(result, Err(StoreError::NotFound { .. })));
/// # });
/// ```
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    with_retry_when(config, operation_name, StoreError::is_transient, operation).await
}

/// Executes a write that must not be applied twice.
///
/// Like [`with_retry`], but only retries transient errors the service
/// reports before applying anything (throttling, unavailability). A timeout
/// or dropped connection may hide a write that already landed, so those
/// are returned to the caller on the first occurrence.
///
/// # Errors
///
/// Returns the first error that is not retried, or the last retried error
/// once all retries are spent.
pub async fn with_write_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    with_retry_when(config, operation_name, |err| err.is_transient() && !err.is_ambiguous(), operation)
        .await
}

#[tracing::instrument(skip(config, retryable, operation), fields(max_retries = config.max_retries))]
async fn with_retry_when<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    retryable: impl Fn(&StoreError) -> bool,
    mut operation: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut last_error: Option<StoreError> = None;

    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "operation succeeded after retry",
                    );
                }
                return Ok(value);
            },
            Err(err) if retryable(&err) && attempt < config.max_retries => {
                let delay = match err.retry_after() {
                    Some(hint) => hint.min(config.max_backoff),
                    None => compute_backoff(config, attempt),
                };
                tracing::debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient error, retrying after backoff",
                );
                tokio::time::sleep(delay).await;
                last_error = Some(err);
            },
            Err(err) => {
                if attempt > 0 && retryable(&err) {
                    tracing::warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %err,
                        "retries exhausted",
                    );
                }
                return Err(err);
            },
        }
    }

    Err(last_error
        .unwrap_or_else(|| StoreError::internal("retry loop completed without result or error")))
}

/// Retries a read-modify-write cycle while its conditional write fails.
///
/// `operation` performs the full cycle: read the item with its ETag, apply
/// the change, write it back with `If-Match`. On
/// [`StoreError::PreconditionFailed`] the cycle is re-run up to
/// `config.max_retries` times with jitter between attempts.
///
/// # Errors
///
/// Returns [`StoreError::RetriesExhausted`] when every attempt lost the
/// race. Any other error is returned immediately.
#[tracing::instrument(skip(config, operation), fields(max_retries = config.max_retries))]
pub async fn with_etag_retry<F, Fut, T>(config: &EtagRetryConfig, mut operation: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(StoreError::PreconditionFailed { .. }) if attempt < config.max_retries => {
                let jitter = if config.base_delay.as_millis() > 0 {
                    let range = config.base_delay.as_millis() as u64;
                    Duration::from_millis(rand::rng().random_range(0..=range))
                } else {
                    Duration::ZERO
                };
                let delay = config.base_delay + jitter;
                tracing::debug!(
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    "etag mismatch, re-reading after jitter",
                );
                tokio::time::sleep(delay).await;
            },
            Err(StoreError::PreconditionFailed { .. }) => {
                return Err(StoreError::RetriesExhausted { attempts: config.max_retries + 1 });
            },
            Err(e) => return Err(e),
        }
    }

    Err(StoreError::RetriesExhausted { attempts: config.max_retries + 1 })
}

/// Computes the backoff duration for the given attempt number:
/// `min(initial_backoff * 2^attempt, max_backoff) + random(0..50% of delay)`.
fn compute_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.initial_backoff.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = base.min(config.max_backoff);

    let jitter_range = capped.as_millis() as u64 / 2;
    if jitter_range > 0 {
        let jitter = rand::rng().random_range(0..=jitter_range);
        capped + Duration::from_millis(jitter)
    } else {
        capped
    }
}
