//! Configuration for the REST store.
//!
//! This module provides [`RestStoreConfig`], which names the account
//! endpoint, holds the master key and sets request timeouts.

use std::{fmt, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use docshard_store::ConfigError;
use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::Zeroizing;

/// Default request timeout (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// REST API version sent in `x-ms-version`.
pub const DEFAULT_API_VERSION: &str = "2018-12-31";

/// Configuration for [`RestStore`](crate::RestStore).
///
/// The master key is held in a [`Zeroizing`] buffer, is never serialized
/// and is redacted from `Debug` output.
///
/// # Example
///
/// ```no_run
/// use docshard_store_rest::RestStoreConfig;
///
/// let config = RestStoreConfig::builder()
///     .endpoint("https://my-account.documents.example.com:443/")
///     .master_key(std::env::var("DOCSHARD_KEY")?)
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestStoreConfig {
    /// Account endpoint.
    pub(crate) endpoint: Url,

    /// Base64 master key.
    #[serde(skip_serializing)]
    pub(crate) master_key: Zeroizing<String>,

    /// Request timeout.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub(crate) timeout: Duration,

    /// Connection timeout.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub(crate) connect_timeout: Duration,

    /// REST API version.
    #[serde(default = "default_api_version")]
    pub(crate) api_version: String,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_owned()
}

impl fmt::Debug for RestStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestStoreConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("master_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("api_version", &self.api_version)
            .finish()
    }
}

#[bon::bon]
impl RestStoreConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Account endpoint URL (`http` or `https`).
    /// * `master_key` - Base64 master key of the account.
    ///
    /// # Optional Fields
    ///
    /// * `timeout` - Request timeout (default: 30 seconds).
    /// * `connect_timeout` - Connection timeout (default: 5 seconds).
    /// * `api_version` - REST API version (default: `2018-12-31`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - The endpoint is not an absolute `http`/`https` URL
    /// - The master key is empty or not valid base64
    /// - A timeout is zero
    #[builder]
    pub fn new(
        #[builder(into)] endpoint: String,
        #[builder(into)] master_key: String,
        #[builder(default = DEFAULT_TIMEOUT)] timeout: Duration,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
        #[builder(into, default = DEFAULT_API_VERSION.to_owned())] api_version: String,
    ) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(&endpoint)
            .map_err(|err| ConfigError::invalid("endpoint", format!("`{endpoint}`: {err}")))?;
        let config = Self {
            endpoint,
            master_key: Zeroizing::new(master_key),
            timeout,
            connect_timeout,
            api_version,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks a configuration, including one that was deserialized.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::invalid("endpoint", "scheme must be http or https"));
        }
        if self.endpoint.host_str().is_none() || self.endpoint.cannot_be_a_base() {
            return Err(ConfigError::invalid("endpoint", "must name a host"));
        }
        if self.master_key.trim().is_empty() {
            return Err(ConfigError::Missing("master_key"));
        }
        if STANDARD.decode(self.master_key.trim()).is_err() {
            return Err(ConfigError::invalid("master_key", "must be base64"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid("timeout", "must be positive"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::invalid("connect_timeout", "must be positive"));
        }
        if self.api_version.is_empty() {
            return Err(ConfigError::Missing("api_version"));
        }
        Ok(())
    }

    /// Returns the account endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the REST API version.
    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const KEY: &str = "ZG9jc2hhcmQtdGVzdC1tYXN0ZXIta2V5LTAxMjM0NTY3ODk=";

    #[test]
    fn test_valid_config() {
        let config = RestStoreConfig::builder()
            .endpoint("https://account.example.com:443/")
            .master_key(KEY)
            .build()
            .unwrap();

        assert_eq!(config.endpoint().as_str(), "https://account.example.com/");
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.api_version(), DEFAULT_API_VERSION);
    }

    #[test]
    fn test_custom_timeouts() {
        let config = RestStoreConfig::builder()
            .endpoint("http://localhost:8081")
            .master_key(KEY)
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_validation_rejects_bad_endpoints() {
        for endpoint in ["not a url", "ftp://account.example.com", "mailto:ops@example.com"] {
            let result = RestStoreConfig::builder().endpoint(endpoint).master_key(KEY).build();
            assert!(
                matches!(result, Err(ConfigError::Invalid { field: "endpoint", .. })),
                "{endpoint} should be rejected"
            );
        }
    }

    #[test]
    fn test_validation_rejects_bad_keys() {
        let empty = RestStoreConfig::builder().endpoint("https://a.example.com").master_key("").build();
        assert!(matches!(empty, Err(ConfigError::Missing("master_key"))));

        let garbage =
            RestStoreConfig::builder().endpoint("https://a.example.com").master_key("%%%").build();
        assert!(matches!(garbage, Err(ConfigError::Invalid { field: "master_key", .. })));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let result = RestStoreConfig::builder()
            .endpoint("https://a.example.com")
            .master_key(KEY)
            .timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(ConfigError::Invalid { field: "timeout", .. })));
    }

    #[test]
    fn test_debug_redacts_master_key() {
        let config =
            RestStoreConfig::builder().endpoint("https://a.example.com").master_key(KEY).build().unwrap();
        let rendered = format!("{config:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains(KEY));
    }

    #[test]
    fn test_master_key_is_never_serialized() {
        let config =
            RestStoreConfig::builder().endpoint("https://a.example.com").master_key(KEY).build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains(KEY));
        assert!(!json.contains("master_key"));
    }

    #[test]
    fn test_deserialization_with_defaults() {
        let json = format!(r#"{{"endpoint": "https://a.example.com/", "master_key": "{KEY}"}}"#);
        let config: RestStoreConfig = serde_json::from_str(&json).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
    }

    #[test]
    fn test_deserialization_with_humantime() {
        let json = format!(
            r#"{{"endpoint": "https://a.example.com/", "master_key": "{KEY}", "timeout": "2m", "connect_timeout": "750ms"}}"#
        );
        let config: RestStoreConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.timeout(), Duration::from_secs(120));
        assert_eq!(config.connect_timeout(), Duration::from_millis(750));
    }
}
