//! Activity timeline: merges the comment and event collections for one
//! issue into a single chronological feed, with live append.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use tessera_types::{Comment, EventKind, Issue, IssueEvent};

use crate::error::StoreError;
use crate::events::DomainEvent;
use crate::store::{Database, Filter, Subscription, TableFilter, activity_channel, tables};

/// One feed row: a chat-bubble comment or a single-line structured event.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEntry {
    Comment {
        /// Composite id, `c-<record id>`, unique across both sources.
        id: String,
        author: String,
        text: String,
        created_at: DateTime<Utc>,
    },
    Event {
        /// Composite id, `e-<record id>`, unique across both sources.
        id: String,
        actor: String,
        kind: EventKind,
        details: Value,
        created_at: DateTime<Utc>,
        /// True only for the virtual "create" origin entry, which is never
        /// persisted and is recomputed on every fetch.
        synthetic: bool,
    },
}

impl ActivityEntry {
    pub fn from_comment(comment: &Comment) -> ActivityEntry {
        ActivityEntry::Comment {
            id: format!("c-{}", comment.id),
            author: comment
                .user_email
                .clone()
                .unwrap_or_else(|| "User".to_string()),
            text: comment.comment_text.clone(),
            created_at: comment.created_at,
        }
    }

    pub fn from_event(event: &IssueEvent) -> ActivityEntry {
        ActivityEntry::Event {
            id: format!("e-{}", event.id),
            actor: event
                .actor_email
                .clone()
                .unwrap_or_else(|| "User".to_string()),
            kind: event.event_type,
            details: event.details.clone(),
            created_at: event.created_at,
            synthetic: false,
        }
    }

    fn synthetic_create(issue: &Issue) -> ActivityEntry {
        ActivityEntry::Event {
            id: format!("e-create-{}", issue.id),
            actor: issue.created_by.to_string(),
            kind: EventKind::Create,
            details: Value::Null,
            created_at: issue.created_at,
            synthetic: true,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ActivityEntry::Comment { id, .. } | ActivityEntry::Event { id, .. } => id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            ActivityEntry::Comment { created_at, .. }
            | ActivityEntry::Event { created_at, .. } => *created_at,
        }
    }

    pub fn actor(&self) -> &str {
        match self {
            ActivityEntry::Comment { author, .. } => author,
            ActivityEntry::Event { actor, .. } => actor,
        }
    }

    /// Single-line rendering for event entries: "<actor> <verb> <value>".
    /// Comments render as "<author> commented: <text>".
    pub fn sentence(&self) -> String {
        match self {
            ActivityEntry::Comment { author, text, .. } => {
                format!("{author} commented: {text}")
            }
            ActivityEntry::Event {
                actor,
                kind,
                details,
                ..
            } => format!("{actor} {}", event_phrase(*kind, details)),
        }
    }
}

fn detail_str<'a>(details: &'a Value, key: &str) -> Option<&'a str> {
    details.get(key).and_then(Value::as_str)
}

fn event_phrase(kind: EventKind, details: &Value) -> String {
    match kind {
        EventKind::Create => "created the issue".to_string(),
        EventKind::UpdateStatus => format!(
            "changed status to {}",
            detail_str(details, "to").unwrap_or("unknown")
        ),
        EventKind::UpdatePriority => format!(
            "changed priority to {}",
            detail_str(details, "to").unwrap_or("unknown")
        ),
        EventKind::UpdateTitle => "changed title".to_string(),
        EventKind::UpdateDescription => "updated description".to_string(),
        EventKind::UpdateDueDate => format!(
            "set due date to {}",
            detail_str(details, "to").unwrap_or("No Date")
        ),
        EventKind::AddLabel => format!(
            "added label {}",
            detail_str(details, "label").unwrap_or("unknown")
        ),
        EventKind::RemoveLabel => format!(
            "removed label {}",
            detail_str(details, "label").unwrap_or("unknown")
        ),
        EventKind::Other => "updated issue".to_string(),
    }
}

/// Merged, ascending-time feed for one issue.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Vec<ActivityEntry>,
}

impl Timeline {
    /// Tags and merges the two fetched collections, sorted by created_at
    /// ascending (stable sort, so ties keep push order). When no stored event has
    /// type `create`, a virtual create entry is synthesized from the
    /// issue's own created_at/created_by so every timeline has a visible
    /// origin point.
    pub fn assemble(issue: &Issue, comments: &[Comment], events: &[IssueEvent]) -> Timeline {
        let mut entries: Vec<ActivityEntry> = Vec::with_capacity(comments.len() + events.len() + 1);
        entries.extend(comments.iter().map(ActivityEntry::from_comment));
        entries.extend(events.iter().map(ActivityEntry::from_event));

        if !events.iter().any(|e| e.event_type == EventKind::Create) {
            entries.push(ActivityEntry::synthetic_create(issue));
        }

        entries.sort_by_key(ActivityEntry::created_at);
        Timeline { entries }
    }

    /// Fetches both collections and opens the issue's activity channel.
    #[tracing::instrument(skip(db, issue), fields(issue = %issue.id))]
    pub async fn open<D: Database + ?Sized>(
        db: &D,
        issue: &Issue,
    ) -> Result<(Timeline, Subscription), StoreError> {
        let issue_filter = Filter::eq("issue_id", issue.id.to_string());
        let (comment_rows, event_rows) = futures::try_join!(
            db.select(tables::ISSUE_COMMENTS, std::slice::from_ref(&issue_filter)),
            db.select(tables::ISSUE_EVENTS, std::slice::from_ref(&issue_filter)),
        )?;

        let comments: Vec<Comment> = comment_rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect();
        let events: Vec<IssueEvent> = event_rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect();

        let subscription = db.subscribe(
            &activity_channel(issue.id),
            vec![
                TableFilter::new(tables::ISSUE_COMMENTS, issue_filter.clone()),
                TableFilter::new(tables::ISSUE_EVENTS, issue_filter),
            ],
        )?;

        Ok((Timeline::assemble(issue, &comments, &events), subscription))
    }

    /// Appends a live arrival. New items are assumed newer than everything
    /// buffered, so no re-sort happens; out-of-order arrival across
    /// reconnects is not corrected. Duplicate delivery of an id already in
    /// the feed is dropped. Returns whether the entry was added.
    pub fn append(&mut self, entry: ActivityEntry) -> bool {
        if self.entries.iter().any(|e| e.id() == entry.id()) {
            debug!(id = entry.id(), "dropping duplicate activity entry");
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Routes a normalized event into the feed.
    pub fn apply(&mut self, event: &DomainEvent) -> bool {
        match event {
            DomainEvent::CommentAdded(comment) => self.append(ActivityEntry::from_comment(comment)),
            DomainEvent::EventAdded(event) => self.append(ActivityEntry::from_event(event)),
            _ => false,
        }
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trailing window used as summarizer input.
    pub fn tail(&self, n: usize) -> &[ActivityEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use uuid::Uuid;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 17, 9, minute, 0)
            .single()
            .expect("ts")
    }

    fn issue_at(created_at: DateTime<Utc>) -> Issue {
        Issue {
            id: Uuid::new_v4(),
            issue_key: "TES-1".to_string(),
            issue_number: 1,
            title: "Wire the board".to_string(),
            description: String::new(),
            status: tessera_types::Status::Todo,
            priority: tessera_types::Priority::NoPriority,
            due_date: None,
            label: None,
            workspace_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            created_at,
        }
    }

    fn comment_at(issue: &Issue, minute: u32, text: &str) -> Comment {
        Comment {
            id: Uuid::new_v4(),
            issue_id: issue.id,
            workspace_id: issue.workspace_id,
            created_by: issue.created_by,
            user_email: Some("ada@example.com".to_string()),
            comment_text: text.to_string(),
            created_at: ts(minute),
        }
    }

    fn event_at(issue: &Issue, minute: u32, kind: EventKind, details: Value) -> IssueEvent {
        IssueEvent {
            id: Uuid::new_v4(),
            issue_id: issue.id,
            workspace_id: issue.workspace_id,
            actor_id: issue.created_by,
            actor_email: Some("ada@example.com".to_string()),
            event_type: kind,
            details,
            created_at: ts(minute),
        }
    }

    #[test]
    fn merge_order_is_deterministic() {
        let issue = issue_at(ts(0));
        let c1 = comment_at(&issue, 2, "c1");
        let c2 = comment_at(&issue, 5, "c2");
        let e1 = event_at(&issue, 1, EventKind::Create, Value::Null);
        let e2 = event_at(&issue, 4, EventKind::UpdateStatus, json!({ "to": "Done" }));

        let timeline = Timeline::assemble(&issue, &[c1.clone(), c2.clone()], &[e1.clone(), e2.clone()]);
        let ids: Vec<&str> = timeline.entries().iter().map(ActivityEntry::id).collect();
        assert_eq!(
            ids,
            [
                format!("e-{}", e1.id),
                format!("c-{}", c1.id),
                format!("e-{}", e2.id),
                format!("c-{}", c2.id),
            ]
        );
    }

    #[test]
    fn synthetic_create_appears_when_no_create_event_is_stored() {
        let issue = issue_at(ts(0));
        let update = event_at(&issue, 3, EventKind::UpdateTitle, Value::Null);
        let timeline = Timeline::assemble(&issue, &[], &[update]);

        let first = &timeline.entries()[0];
        let ActivityEntry::Event { kind, synthetic, created_at, .. } = first else {
            panic!("expected event entry first");
        };
        assert_eq!(*kind, EventKind::Create);
        assert!(synthetic);
        assert_eq!(*created_at, issue.created_at);
        assert_eq!(timeline.entries().len(), 2);
    }

    #[test]
    fn stored_create_event_suppresses_the_synthetic_one() {
        let issue = issue_at(ts(0));
        let create = event_at(&issue, 0, EventKind::Create, Value::Null);
        let timeline = Timeline::assemble(&issue, &[], &[create]);
        assert_eq!(timeline.entries().len(), 1);
        let ActivityEntry::Event { synthetic, .. } = &timeline.entries()[0] else {
            panic!("expected event entry");
        };
        assert!(!synthetic);
    }

    #[test]
    fn live_append_keeps_order_and_drops_duplicates() {
        let issue = issue_at(ts(0));
        let mut timeline = Timeline::assemble(&issue, &[], &[]);

        let comment = comment_at(&issue, 7, "late");
        let entry = ActivityEntry::from_comment(&comment);
        assert!(timeline.append(entry.clone()));
        assert!(!timeline.append(entry));
        assert_eq!(timeline.entries().len(), 2); // synthetic create + comment
    }

    #[test]
    fn event_sentences_match_feed_wording() {
        let issue = issue_at(ts(0));
        let cases = [
            (EventKind::Create, Value::Null, "created the issue"),
            (
                EventKind::UpdateStatus,
                json!({ "from": "todo", "to": "Done" }),
                "changed status to Done",
            ),
            (
                EventKind::UpdatePriority,
                json!({ "from": "Low", "to": "Urgent" }),
                "changed priority to Urgent",
            ),
            (EventKind::UpdateTitle, Value::Null, "changed title"),
            (EventKind::UpdateDescription, Value::Null, "updated description"),
            (
                EventKind::UpdateDueDate,
                json!({ "to": "Feb 10" }),
                "set due date to Feb 10",
            ),
            (
                EventKind::UpdateDueDate,
                json!({ "to": null }),
                "set due date to No Date",
            ),
            (
                EventKind::AddLabel,
                json!({ "label": "Bug" }),
                "added label Bug",
            ),
            (
                EventKind::RemoveLabel,
                json!({ "label": "Bug" }),
                "removed label Bug",
            ),
            (EventKind::Other, Value::Null, "updated issue"),
        ];
        for (kind, details, expected) in cases {
            let entry = ActivityEntry::from_event(&event_at(&issue, 1, kind, details));
            assert_eq!(entry.sentence(), format!("ada@example.com {expected}"));
        }
    }
}
