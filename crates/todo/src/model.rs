//! Task item exchanged with the front-end.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A task on the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Globally unique id.
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl Todo {
    /// The task the list starts with: titled `Test`, due one day before
    /// `now`.
    #[must_use]
    pub fn seed(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: Some("Test".to_owned()),
            description: Some("Test".to_owned()),
            is_completed: false,
            due_date: Some(now - Duration::days(1)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_seed_is_overdue_by_one_day() {
        let now = Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap();
        let todo = Todo::seed(now);

        assert_eq!(todo.title.as_deref(), Some("Test"));
        assert!(!todo.is_completed);
        assert_eq!(todo.due_date, Some(Utc.with_ymd_and_hms(2026, 8, 31, 12, 0, 0).unwrap()));
    }

    #[test]
    fn test_seeds_get_distinct_ids() {
        let now = Utc::now();
        assert_ne!(Todo::seed(now).id, Todo::seed(now).id);
    }

    #[test]
    fn test_wire_field_names() {
        let now = Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap();
        let value = serde_json::to_value(Todo::seed(now)).unwrap();

        assert_eq!(value["isCompleted"], false);
        assert_eq!(value["dueDate"], "2026-08-31T12:00:00Z");
        assert!(value.get("is_completed").is_none());
    }

    #[test]
    fn test_optional_fields_may_be_absent() {
        let todo: Todo =
            serde_json::from_str(r#"{"id": "6f1c2a44-58b3-4c1e-9d55-0d2f4f7f2a10", "title": null, "description": null}"#)
                .unwrap();
        assert!(!todo.is_completed);
        assert_eq!(todo.due_date, None);
    }
}
