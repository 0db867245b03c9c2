//! Change-Event Normalizer: raw store notifications in, typed domain
//! events out. The store may deliver a noisier or coarser stream than a
//! view consumes, so everything is scope-filtered and partial-record
//! tolerant here, before any view sees it.

use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;

use tessera_types::{Comment, Issue, IssueEvent, Priority, Status};

use crate::store::{ChangeNotification, Operation, tables};

/// Typed event delivered to views.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    IssueCreated(Issue),
    IssueUpdated(Issue),
    IssueDeleted(Uuid),
    CommentAdded(Comment),
    EventAdded(IssueEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Workspace(Uuid),
    Issue(Uuid),
}

/// Per-view normalizer. Constructed with the view's scope; notifications
/// outside the scope, on unknown tables, or too malformed to type are
/// dropped, never errors.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    scope: Scope,
}

impl Normalizer {
    pub fn for_workspace(workspace_id: Uuid) -> Normalizer {
        Normalizer {
            scope: Scope::Workspace(workspace_id),
        }
    }

    pub fn for_issue(issue_id: Uuid) -> Normalizer {
        Normalizer {
            scope: Scope::Issue(issue_id),
        }
    }

    pub fn normalize(&self, change: &ChangeNotification) -> Option<DomainEvent> {
        match change.table.as_str() {
            tables::ISSUES => self.normalize_issue(change),
            tables::ISSUE_COMMENTS => self.normalize_comment(change),
            tables::ISSUE_EVENTS => self.normalize_event(change),
            other => {
                trace!(table = other, "ignoring change on unhandled table");
                None
            }
        }
    }

    fn normalize_issue(&self, change: &ChangeNotification) -> Option<DomainEvent> {
        if change.operation == Operation::Delete {
            // Deletes may carry only the primary key. Scope-check when the
            // payload allows it; otherwise pass through, since removal by id is
            // idempotent and a foreign id is a no-op downstream.
            let id = record_uuid(&change.record, "id")
                .or_else(|| change.old_record.as_ref().and_then(|r| record_uuid(r, "id")))?;
            if !self.delete_in_scope(change, id) {
                return None;
            }
            return Some(DomainEvent::IssueDeleted(id));
        }

        let issue = issue_from_record(&change.record)?;
        let in_scope = match self.scope {
            Scope::Workspace(w) => issue.workspace_id == w,
            Scope::Issue(i) => issue.id == i,
        };
        if !in_scope {
            debug!(issue = %issue.id, "dropping out-of-scope issue change");
            return None;
        }
        Some(match change.operation {
            Operation::Insert => DomainEvent::IssueCreated(issue),
            _ => DomainEvent::IssueUpdated(issue),
        })
    }

    fn normalize_comment(&self, change: &ChangeNotification) -> Option<DomainEvent> {
        if change.operation != Operation::Insert {
            return None;
        }
        if !self.child_in_scope(&change.record) {
            return None;
        }
        let comment: Comment = serde_json::from_value(change.record.clone()).ok()?;
        Some(DomainEvent::CommentAdded(comment))
    }

    fn normalize_event(&self, change: &ChangeNotification) -> Option<DomainEvent> {
        if change.operation != Operation::Insert {
            return None;
        }
        if !self.child_in_scope(&change.record) {
            return None;
        }
        let event: IssueEvent = serde_json::from_value(change.record.clone()).ok()?;
        Some(DomainEvent::EventAdded(event))
    }

    /// Scope check for comment/event records, which carry both issue_id
    /// and workspace_id.
    fn child_in_scope(&self, record: &Value) -> bool {
        match self.scope {
            Scope::Workspace(w) => record_uuid(record, "workspace_id") == Some(w),
            Scope::Issue(i) => record_uuid(record, "issue_id") == Some(i),
        }
    }

    fn delete_in_scope(&self, change: &ChangeNotification, id: Uuid) -> bool {
        match self.scope {
            Scope::Issue(i) => id == i,
            Scope::Workspace(w) => {
                let ws = record_uuid(&change.record, "workspace_id").or_else(|| {
                    change
                        .old_record
                        .as_ref()
                        .and_then(|r| record_uuid(r, "workspace_id"))
                });
                // Key-only payloads cannot be workspace-filtered.
                ws.is_none_or(|found| found == w)
            }
        }
    }
}

/// Types an issue row, resolving the duck-typed status/priority
/// representations (legacy numeric priority ids, raw strings) into the
/// closed enums before deserialization. Returns `None` for rows that
/// cannot be typed even after normalization.
pub fn issue_from_record(record: &Value) -> Option<Issue> {
    let mut row = record.clone();
    let obj = row.as_object_mut()?;

    let priority = obj
        .get("priority")
        .map(Priority::normalize)
        .unwrap_or(Priority::NoPriority);
    obj.insert("priority".to_string(), Value::String(priority.as_str().to_string()));

    let status = obj
        .get("status")
        .and_then(Value::as_str)
        .map(Status::normalize)
        .unwrap_or(Status::Backlog);
    obj.insert("status".to_string(), Value::String(status.as_str().to_string()));

    // A null due_date is absent, and anything unparseable is dropped
    // rather than failing the whole record.
    if let Some(due) = obj.get("due_date")
        && !due.is_null()
        && serde_json::from_value::<chrono::NaiveDate>(due.clone()).is_err()
    {
        obj.insert("due_date".to_string(), Value::Null);
    }

    serde_json::from_value(row).ok()
}

fn record_uuid(record: &Value, key: &str) -> Option<Uuid> {
    record
        .get(key)
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}
