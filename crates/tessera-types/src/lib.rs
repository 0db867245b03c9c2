//! Shared domain DTOs for the tessera sync layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Backlog,
    Todo,
    InProgress,
    Done,
    Canceled,
    Duplicate,
}

impl Status {
    /// All statuses in board group order.
    pub const ALL: [Status; 6] = [
        Status::Backlog,
        Status::Todo,
        Status::InProgress,
        Status::Done,
        Status::Canceled,
        Status::Duplicate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Backlog => "backlog",
            Status::Todo => "todo",
            Status::InProgress => "in_progress",
            Status::Done => "done",
            Status::Canceled => "canceled",
            Status::Duplicate => "duplicate",
        }
    }

    /// Human-readable group title, e.g. "In Progress".
    pub fn display_label(self) -> &'static str {
        match self {
            Status::Backlog => "Backlog",
            Status::Todo => "Todo",
            Status::InProgress => "In Progress",
            Status::Done => "Done",
            Status::Canceled => "Canceled",
            Status::Duplicate => "Duplicate",
        }
    }

    /// Resolves legacy or free-form status strings deterministically.
    /// Unrecognized input maps to `Backlog`.
    pub fn normalize(raw: &str) -> Status {
        let cleaned = raw.trim().to_lowercase().replace([' ', '-'], "_");
        match cleaned.as_str() {
            "backlog" => Status::Backlog,
            "todo" => Status::Todo,
            "in_progress" => Status::InProgress,
            "done" => Status::Done,
            "canceled" | "cancelled" => Status::Canceled,
            "duplicate" => Status::Duplicate,
            _ => Status::Backlog,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
    NoPriority,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::NoPriority => "no_priority",
        }
    }

    pub fn display_label(self) -> &'static str {
        match self {
            Priority::Urgent => "Urgent",
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
            Priority::NoPriority => "No priority",
        }
    }

    /// Sort weight: urgent(4) > high(3) > medium(2) > low(1) > no_priority(0).
    pub fn sort_weight(self) -> u8 {
        match self {
            Priority::Urgent => 4,
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
            Priority::NoPriority => 0,
        }
    }

    /// Legacy dropdown id: 0=no_priority, 1=urgent, 2=high, 3=medium, 4=low.
    pub fn legacy_id(self) -> u8 {
        match self {
            Priority::NoPriority => 0,
            Priority::Urgent => 1,
            Priority::High => 2,
            Priority::Medium => 3,
            Priority::Low => 4,
        }
    }

    pub fn from_legacy_id(id: u64) -> Priority {
        match id {
            1 => Priority::Urgent,
            2 => Priority::High,
            3 => Priority::Medium,
            4 => Priority::Low,
            _ => Priority::NoPriority,
        }
    }

    /// Resolves the duck-typed priority representations found in stored
    /// records: a legacy numeric id, a canonical string, or a display
    /// name ("No priority"). Anything else maps to `NoPriority`.
    pub fn normalize(raw: &Value) -> Priority {
        match raw {
            Value::Number(n) => Priority::from_legacy_id(n.as_u64().unwrap_or(0)),
            Value::String(s) => Priority::normalize_str(s),
            _ => Priority::NoPriority,
        }
    }

    pub fn normalize_str(raw: &str) -> Priority {
        let cleaned = raw.trim().to_lowercase().replace([' ', '-'], "_");
        match cleaned.as_str() {
            "urgent" => Priority::Urgent,
            "high" => Priority::High,
            "medium" => Priority::Medium,
            "low" => Priority::Low,
            _ => Priority::NoPriority,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: Uuid,
    #[serde(default)]
    pub issue_key: String,
    #[serde(default)]
    pub issue_number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Denormalized primary label name (legacy column), mirrors the
    /// first entry of the label set.
    #[serde(default)]
    pub label: Option<String>,
    pub workspace_id: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub color: String,
    pub workspace_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: Uuid,
    pub issue_id: Uuid,
    pub workspace_id: Uuid,
    pub created_by: Uuid,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub comment_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Create,
    UpdateStatus,
    UpdatePriority,
    UpdateTitle,
    UpdateDescription,
    UpdateDueDate,
    AddLabel,
    RemoveLabel,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueEvent {
    pub id: Uuid,
    pub issue_id: Uuid,
    pub workspace_id: Uuid,
    pub actor_id: Uuid,
    #[serde(default)]
    pub actor_email: Option<String>,
    pub event_type: EventKind,
    #[serde(default)]
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

/// Single-field update payload for `issues`. `None` fields are omitted
/// from the wire patch; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct IssuePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Option<String>>,
}

/// Insert payload for a new issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewIssue {
    pub workspace_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    pub issue_number: u64,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub label: Option<String>,
}

/// Structured output of the AI issue-generation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn priority_normalizes_legacy_ids_and_display_names() {
        assert_eq!(Priority::normalize(&json!(1)), Priority::Urgent);
        assert_eq!(Priority::normalize(&json!(4)), Priority::Low);
        assert_eq!(Priority::normalize(&json!(0)), Priority::NoPriority);
        assert_eq!(Priority::normalize(&json!(99)), Priority::NoPriority);
        assert_eq!(Priority::normalize(&json!("high")), Priority::High);
        assert_eq!(Priority::normalize(&json!("No priority")), Priority::NoPriority);
        assert_eq!(Priority::normalize(&json!(null)), Priority::NoPriority);
    }

    #[test]
    fn priority_legacy_id_round_trips() {
        for p in [
            Priority::Urgent,
            Priority::High,
            Priority::Medium,
            Priority::Low,
            Priority::NoPriority,
        ] {
            assert_eq!(Priority::from_legacy_id(u64::from(p.legacy_id())), p);
        }
    }

    #[test]
    fn priority_sort_weights_are_strictly_ordered() {
        assert!(Priority::Urgent.sort_weight() > Priority::High.sort_weight());
        assert!(Priority::High.sort_weight() > Priority::Medium.sort_weight());
        assert!(Priority::Medium.sort_weight() > Priority::Low.sort_weight());
        assert!(Priority::Low.sort_weight() > Priority::NoPriority.sort_weight());
    }

    #[test]
    fn status_normalizes_unknown_values_to_backlog() {
        assert_eq!(Status::normalize("In Progress"), Status::InProgress);
        assert_eq!(Status::normalize("cancelled"), Status::Canceled);
        assert_eq!(Status::normalize("???"), Status::Backlog);
        assert_eq!(Status::normalize(""), Status::Backlog);
    }

    #[test]
    fn event_kind_tolerates_unknown_types() {
        let kind: EventKind = serde_json::from_value(json!("update_status")).expect("known kind");
        assert_eq!(kind, EventKind::UpdateStatus);
        let kind: EventKind = serde_json::from_value(json!("archived")).expect("unknown kind");
        assert_eq!(kind, EventKind::Other);
    }

    #[test]
    fn issue_patch_serializes_only_touched_fields() {
        let patch = IssuePatch {
            status: Some(Status::Done),
            ..IssuePatch::default()
        };
        let value = serde_json::to_value(&patch).expect("serialize patch");
        assert_eq!(value, json!({ "status": "done" }));

        let clear = IssuePatch {
            due_date: Some(None),
            ..IssuePatch::default()
        };
        let value = serde_json::to_value(&clear).expect("serialize clear");
        assert_eq!(value, json!({ "due_date": null }));
    }

    #[test]
    fn issue_deserializes_partial_records_with_defaults() {
        let raw = json!({
            "id": Uuid::nil(),
            "status": "todo",
            "priority": "no_priority",
            "workspace_id": Uuid::nil(),
            "created_by": Uuid::nil(),
            "created_at": "2026-01-17T09:15:30Z"
        });
        let issue: Issue = serde_json::from_value(raw).expect("partial issue");
        assert_eq!(issue.title, "");
        assert_eq!(issue.due_date, None);
        assert_eq!(issue.label, None);
    }
}
