//! Walkthrough settings and service credentials.
//!
//! The service endpoint and master key never appear in code: they come from
//! `DOCSHARD_ENDPOINT` and `DOCSHARD_KEY`, optionally loaded from a `.env`
//! file.

use docshard_store::ConfigError;
use docshard_store_rest::RestStoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::WalkthroughError;

/// Database the walkthrough provisions by default.
pub const DEFAULT_DATABASE: &str = "ToDoList";

/// Container the walkthrough provisions by default.
pub const DEFAULT_CONTAINER: &str = "Items";

/// RU/s added to the container's throughput by default.
pub const DEFAULT_THROUGHPUT_DELTA: u32 = 100;

/// Environment variable holding the account endpoint.
pub const ENDPOINT_VAR: &str = "DOCSHARD_ENDPOINT";

/// Environment variable holding the base64 master key.
pub const KEY_VAR: &str = "DOCSHARD_KEY";

const RESERVED_ID_CHARS: [char; 4] = ['/', '\\', '?', '#'];

/// What the walkthrough provisions and how it leaves the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalkthroughConfig {
    pub(crate) database: String,
    pub(crate) container: String,
    pub(crate) throughput_delta: u32,
    pub(crate) keep_database: bool,
}

#[bon::bon]
impl WalkthroughConfig {
    /// Creates a walkthrough configuration.
    ///
    /// # Optional Fields
    ///
    /// * `database` - Database id (default: `ToDoList`).
    /// * `container` - Container id (default: `Items`).
    /// * `throughput_delta` - RU/s added by the scaling step (default: 100).
    /// * `keep_database` - Skip the final database deletion (default: false).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an id is empty or contains `/`,
    /// `\`, `?` or `#`.
    #[builder]
    pub fn new(
        #[builder(into, default = DEFAULT_DATABASE.to_owned())] database: String,
        #[builder(into, default = DEFAULT_CONTAINER.to_owned())] container: String,
        #[builder(default = DEFAULT_THROUGHPUT_DELTA)] throughput_delta: u32,
        #[builder(default)] keep_database: bool,
    ) -> Result<Self, ConfigError> {
        validate_id("database", &database)?;
        validate_id("container", &container)?;
        Ok(Self { database, container, throughput_delta, keep_database })
    }

    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[must_use]
    pub fn container(&self) -> &str {
        &self.container
    }

    #[must_use]
    pub fn throughput_delta(&self) -> u32 {
        self.throughput_delta
    }

    #[must_use]
    pub fn keep_database(&self) -> bool {
        self.keep_database
    }
}

fn validate_id(field: &'static str, id: &str) -> Result<(), ConfigError> {
    if id.trim().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    if let Some(c) = id.chars().find(|c| RESERVED_ID_CHARS.contains(c)) {
        return Err(ConfigError::invalid(field, format!("must not contain `{c}`")));
    }
    Ok(())
}

/// Builds the REST store configuration from the environment.
///
/// Calls `dotenvy::dotenv()` to load from `.env` file if present.
///
/// # Errors
///
/// - [`WalkthroughError::MissingEnvVar`] when `DOCSHARD_ENDPOINT` or `DOCSHARD_KEY` is unset.
/// - [`WalkthroughError::Config`] when either value is rejected.
pub fn rest_config_from_env() -> Result<RestStoreConfig, WalkthroughError> {
    // .env is optional
    let _ = dotenvy::dotenv();
    rest_config_from(|name| std::env::var(name).ok())
}

fn rest_config_from(
    lookup: impl Fn(&'static str) -> Option<String>,
) -> Result<RestStoreConfig, WalkthroughError> {
    let required = |name| lookup(name).filter(|v| !v.is_empty()).ok_or(WalkthroughError::MissingEnvVar(name));
    let config = RestStoreConfig::builder()
        .endpoint(required(ENDPOINT_VAR)?)
        .master_key(required(KEY_VAR)?)
        .build()?;
    Ok(config)
}
