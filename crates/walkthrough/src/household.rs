//! Household documents and the two families the walkthrough stores.
//!
//! Field names on the wire are camelCase and case-sensitive. A household is
//! partitioned by its family surname, held in `partitionKey`.

use std::fmt;

use docshard_store::{Document, PartitionKey};
use serde::{Deserialize, Serialize};

/// Id of the Andersen household.
pub const ANDERSEN_ID: &str = "Andersen.1";

/// Id of the Wakefield household.
pub const WAKEFIELD_ID: &str = "Wakefield.7";

/// A family stored as one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Household {
    pub id: String,
    /// Family surname; the partition-key value.
    pub partition_key: String,
    pub last_name: String,
    #[serde(default)]
    pub parents: Vec<Parent>,
    #[serde(default)]
    pub children: Vec<Child>,
    pub address: Address,
    pub is_registered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    pub first_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    pub first_name: String,
    pub gender: String,
    pub grade: i32,
    #[serde(default)]
    pub pets: Vec<Pet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    pub given_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub state: String,
    pub county: String,
    pub city: String,
}

impl Document for Household {
    fn id(&self) -> &str {
        &self.id
    }

    fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.partition_key.clone())
    }
}

/// Renders the household as its JSON document.
impl fmt::Display for Household {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl Parent {
    fn new(family_name: Option<&str>, first_name: &str) -> Self {
        Self { family_name: family_name.map(str::to_owned), first_name: first_name.to_owned() }
    }
}

impl Pet {
    fn named(given_name: &str) -> Self {
        Self { given_name: given_name.to_owned() }
    }
}

/// The Andersen family: one child in grade 5, not registered.
#[must_use]
pub fn andersen() -> Household {
    Household {
        id: ANDERSEN_ID.to_owned(),
        partition_key: "Andersen".to_owned(),
        last_name: "Andersen".to_owned(),
        parents: vec![Parent::new(None, "Thomas"), Parent::new(None, "Mary Kay")],
        children: vec![Child {
            family_name: None,
            first_name: "Henriette Thaulow".to_owned(),
            gender: "female".to_owned(),
            grade: 5,
            pets: vec![Pet::named("Fluffy")],
        }],
        address: Address { state: "WA".to_owned(), county: "King".to_owned(), city: "Seattle".to_owned() },
        is_registered: false,
    }
}

/// The Wakefield family: two children, not yet registered.
#[must_use]
pub fn wakefield() -> Household {
    Household {
        id: WAKEFIELD_ID.to_owned(),
        partition_key: "Wakefield".to_owned(),
        last_name: "Wakefield".to_owned(),
        parents: vec![Parent::new(Some("Wakefield"), "Robin"), Parent::new(Some("Miller"), "Ben")],
        children: vec![
            Child {
                family_name: Some("Merriam".to_owned()),
                first_name: "Jesse".to_owned(),
                gender: "female".to_owned(),
                grade: 8,
                pets: vec![Pet::named("Goofy"), Pet::named("Shadow")],
            },
            Child {
                family_name: Some("Miller".to_owned()),
                first_name: "Lisa".to_owned(),
                gender: "female".to_owned(),
                grade: 1,
                pets: Vec::new(),
            },
        ],
        address: Address { state: "NY".to_owned(), county: "Manhattan".to_owned(), city: "NY".to_owned() },
        is_registered: false,
    }
}

/// Marks the household registered and moves its first child to grade 6.
pub fn register_and_promote(household: &mut Household) {
    household.is_registered = true;
    if let Some(child) = household.children.first_mut() {
        child.grade = 6;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_wire_field_names() {
        let value = serde_json::to_value(andersen()).unwrap();
        assert_eq!(value["id"], "Andersen.1");
        assert_eq!(value["partitionKey"], "Andersen");
        assert_eq!(value["lastName"], "Andersen");
        assert_eq!(value["isRegistered"], false);
        assert_eq!(value["parents"][1], json!({"firstName": "Mary Kay"}));
        assert_eq!(value["children"][0]["pets"][0], json!({"givenName": "Fluffy"}));
        assert_eq!(value["address"], json!({"state": "WA", "county": "King", "city": "Seattle"}));
    }

    #[test]
    fn test_optional_family_name_roundtrips() {
        let household = wakefield();
        let value = serde_json::to_value(&household).unwrap();
        assert_eq!(value["parents"][0]["familyName"], "Wakefield");
        assert_eq!(value["children"][1]["pets"], json!([]));

        let back: Household = serde_json::from_value(value).unwrap();
        assert_eq!(back, household);
    }

    #[test]
    fn test_missing_collections_default_to_empty() {
        let household: Household = serde_json::from_value(json!({
            "id": "Solo.1",
            "partitionKey": "Solo",
            "lastName": "Solo",
            "address": {"state": "WA", "county": "King", "city": "Seattle"},
            "isRegistered": true,
        }))
        .unwrap();
        assert!(household.parents.is_empty());
        assert!(household.children.is_empty());
    }

    #[test]
    fn test_identity_comes_from_the_document() {
        let household = wakefield();
        assert_eq!(household.id(), WAKEFIELD_ID);
        assert_eq!(household.partition_key(), PartitionKey::new("Wakefield"));
    }

    #[test]
    fn test_register_and_promote_touches_only_two_fields() {
        let mut household = andersen();
        register_and_promote(&mut household);

        let mut expected = andersen();
        expected.is_registered = true;
        expected.children[0].grade = 6;
        assert_eq!(household, expected);
    }

    #[test]
    fn test_display_renders_json() {
        let rendered = andersen().to_string();
        assert!(rendered.starts_with('{'));
        assert!(rendered.contains(r#""partitionKey":"Andersen""#));
    }
}
