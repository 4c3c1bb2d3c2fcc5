//! Master-key request signing.
//!
//! Every request carries an `authorization` header holding an HMAC-SHA256
//! signature over the verb, the resource type, the resource link and the
//! request date, keyed with the account's base64 master key:
//!
//! ```text
//! payload = lower(verb) \n lower(resource type) \n resource link \n lower(x-ms-date) \n \n
//! token   = url_encode("type=master&ver=1.0&sig=" + base64(hmac_sha256(key, payload)))
//! ```
//!
//! The resource link keeps its case; only offers are addressed by their
//! lowercased resource id.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::Method;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{RestStoreError, Result};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_TYPE: &str = "master";
const TOKEN_VERSION: &str = "1.0";

/// Kind of resource a request addresses, as named in the signature payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    /// `dbs`
    Databases,
    /// `colls`
    Containers,
    /// `docs`
    Documents,
    /// `offers`
    Offers,
}

impl ResourceType {
    /// Returns the path segment naming this resource type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Databases => "dbs",
            Self::Containers => "colls",
            Self::Documents => "docs",
            Self::Offers => "offers",
        }
    }

    /// Parses a path segment.
    #[must_use]
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "dbs" => Some(Self::Databases),
            "colls" => Some(Self::Containers),
            "docs" => Some(Self::Documents),
            "offers" => Some(Self::Offers),
            _ => None,
        }
    }

    /// Derives the resource type and link a request path is signed with.
    ///
    /// `segments` are the decoded path segments. A path ending in a type
    /// name (`dbs/ToDoList/colls`) addresses the feed of its parent; a path
    /// ending in an id addresses that resource.
    #[must_use]
    pub fn resolve(segments: &[&str]) -> Option<(Self, String)> {
        match segments {
            [] => None,
            [kind] => Some((Self::from_segment(kind)?, String::new())),
            ["offers", id] => Some((Self::Offers, id.to_lowercase())),
            _ if segments.len() % 2 == 1 => {
                let (kind, parent) = segments.split_last()?;
                Some((Self::from_segment(kind)?, parent.join("/")))
            },
            _ => {
                let kind = segments[segments.len() - 2];
                Some((Self::from_segment(kind)?, segments.join("/")))
            },
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats a timestamp the way the `x-ms-date` header expects it
/// (RFC 1123, `Tue, 01 Sep 2026 12:00:00 GMT`).
#[must_use]
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Signs requests with a decoded master key.
#[derive(Clone)]
pub struct MasterKeySigner {
    key: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for MasterKeySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKeySigner").field("key", &"[REDACTED]").finish()
    }
}

impl MasterKeySigner {
    /// Decodes a base64 master key.
    ///
    /// # Errors
    ///
    /// [`RestStoreError::Signing`] when the key is empty or not valid base64.
    pub fn new(encoded_key: &str) -> Result<Self> {
        let key = STANDARD
            .decode(encoded_key.trim())
            .map_err(|err| RestStoreError::Signing(format!("master key is not valid base64: {err}")))?;
        if key.is_empty() {
            return Err(RestStoreError::Signing("master key is empty".into()));
        }
        Ok(Self { key: Zeroizing::new(key) })
    }

    /// Produces the URL-encoded `authorization` header value for a request.
    ///
    /// # Errors
    ///
    /// [`RestStoreError::Signing`] when the MAC cannot be keyed.
    pub fn sign(
        &self,
        verb: &Method,
        resource_type: ResourceType,
        resource_link: &str,
        date: &str,
    ) -> Result<String> {
        let payload = format!(
            "{}\n{}\n{}\n{}\n\n",
            verb.as_str().to_lowercase(),
            resource_type.as_str(),
            resource_link,
            date.to_lowercase(),
        );

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|err| RestStoreError::Signing(err.to_string()))?;
        mac.update(payload.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        let token = format!("type={TOKEN_TYPE}&ver={TOKEN_VERSION}&sig={signature}");
        Ok(urlencoding::encode(&token).into_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const KEY: &str = "ZG9jc2hhcmQtdGVzdC1tYXN0ZXIta2V5LTAxMjM0NTY3ODk=";

    #[test]
    fn test_http_date_format() {
        let at = Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap();
        assert_eq!(http_date(at), "Tue, 01 Sep 2026 12:00:00 GMT");
    }

    #[test]
    fn test_known_signature() {
        let signer = MasterKeySigner::new(KEY).unwrap();
        let token = signer
            .sign(
                &Method::GET,
                ResourceType::Documents,
                "dbs/ToDoList/colls/Items/docs/Andersen.1",
                "Tue, 01 Sep 2026 12:00:00 GMT",
            )
            .unwrap();

        assert_eq!(
            token,
            "type%3Dmaster%26ver%3D1.0%26sig%3D%2F2w90lsMxwxgNiiTeBR0CQa7ZhHG9aqrat14Ft6WCVw%3D"
        );
    }

    #[test]
    fn test_signature_depends_on_every_input() {
        let signer = MasterKeySigner::new(KEY).unwrap();
        let date = "Tue, 01 Sep 2026 12:00:00 GMT";
        let base = signer.sign(&Method::GET, ResourceType::Documents, "dbs/a", date).unwrap();

        for other in [
            signer.sign(&Method::PUT, ResourceType::Documents, "dbs/a", date).unwrap(),
            signer.sign(&Method::GET, ResourceType::Containers, "dbs/a", date).unwrap(),
            signer.sign(&Method::GET, ResourceType::Documents, "dbs/b", date).unwrap(),
            signer
                .sign(&Method::GET, ResourceType::Documents, "dbs/a", "Wed, 02 Sep 2026 12:00:00 GMT")
                .unwrap(),
        ] {
            assert_ne!(base, other);
        }
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(matches!(MasterKeySigner::new("not base64!"), Err(RestStoreError::Signing(_))));
        assert!(matches!(MasterKeySigner::new(""), Err(RestStoreError::Signing(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let signer = MasterKeySigner::new(KEY).unwrap();
        assert!(format!("{signer:?}").contains("[REDACTED]"));
    }

    #[test]
    fn test_resolve_paths() {
        assert_eq!(ResourceType::resolve(&["dbs"]), Some((ResourceType::Databases, String::new())));
        assert_eq!(
            ResourceType::resolve(&["dbs", "ToDoList"]),
            Some((ResourceType::Databases, "dbs/ToDoList".into()))
        );
        assert_eq!(
            ResourceType::resolve(&["dbs", "ToDoList", "colls"]),
            Some((ResourceType::Containers, "dbs/ToDoList".into()))
        );
        assert_eq!(
            ResourceType::resolve(&["dbs", "ToDoList", "colls", "Items", "docs", "Andersen.1"]),
            Some((ResourceType::Documents, "dbs/ToDoList/colls/Items/docs/Andersen.1".into()))
        );
        assert_eq!(
            ResourceType::resolve(&["offers", "RID-X"]),
            Some((ResourceType::Offers, "rid-x".into()))
        );
        assert_eq!(ResourceType::resolve(&["bogus"]), None);
    }
}
