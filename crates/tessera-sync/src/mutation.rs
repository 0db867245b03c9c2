//! Optimistic mutation coordinator for a single open issue.
//!
//! Every edit follows the same ticket protocol: `stage` applies the new
//! value locally and returns a generation token, the caller persists the
//! staged patch, then settles the ticket with `commit` (sync the
//! server-confirmed snapshot, emit the activity event) or `reject`
//! (revert the one touched field). A superseded ticket, one that had a
//! newer mutation staged on the same field, settles as a no-op, so the
//! last local intent always wins regardless of response ordering.

use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{Value, json};
use tracing::warn;
use uuid::Uuid;

use tessera_types::{EventKind, Issue, IssuePatch, Label, Priority, Status};

use crate::config::SyncConfig;
use crate::datetime::{short_date, slugify, to_wire_date};
use crate::error::ValidationError;
use crate::store::{Database, Filter, tables};

/// The signed-in user performing mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueField {
    Title,
    Description,
    Status,
    Priority,
    DueDate,
}

/// Ticket identifying one staged mutation of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationToken {
    field: IssueField,
    generation: u64,
}

/// Activity event to append once a mutation is confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRequest {
    pub kind: EventKind,
    pub details: Value,
}

/// A staged mutation: the token to settle it with plus the wire patch
/// the caller should persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Staged {
    pub token: MutationToken,
    pub patch: IssuePatch,
}

#[derive(Debug, Clone)]
struct Pending {
    generation: u64,
    event: EventRequest,
}

#[derive(Debug, Clone)]
struct TitleDraft {
    text: String,
    deadline: DateTime<Utc>,
}

/// Result of a confirmed title flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleFlush {
    /// URL slug derived from the new title.
    pub slug: String,
}

/// Editing session over one issue: the local optimistic state, the last
/// server-confirmed snapshot (the revert target), and the per-field
/// pending tickets.
#[derive(Debug)]
pub struct IssueEditor {
    issue: Issue,
    server: Issue,
    labels: Vec<Label>,
    generations: HashMap<IssueField, u64>,
    pending: HashMap<IssueField, Pending>,
    title_draft: Option<TitleDraft>,
    comment_draft: String,
    cfg: SyncConfig,
}

impl IssueEditor {
    pub fn new(issue: Issue, labels: Vec<Label>, cfg: SyncConfig) -> IssueEditor {
        IssueEditor {
            server: issue.clone(),
            issue,
            labels,
            generations: HashMap::new(),
            pending: HashMap::new(),
            title_draft: None,
            comment_draft: String::new(),
            cfg,
        }
    }

    /// Current local (optimistic) view of the issue.
    pub fn issue(&self) -> &Issue {
        &self.issue
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn has_label(&self, label_id: Uuid) -> bool {
        self.labels.iter().any(|l| l.id == label_id)
    }

    pub fn comment_draft(&self) -> &str {
        &self.comment_draft
    }

    pub fn edit_comment(&mut self, text: impl Into<String>) {
        self.comment_draft = text.into();
    }

    fn next_token(&mut self, field: IssueField) -> MutationToken {
        let generation = self.generations.entry(field).or_insert(0);
        *generation += 1;
        MutationToken {
            field,
            generation: *generation,
        }
    }

    fn stage(&mut self, token: MutationToken, event: EventRequest) {
        self.pending.insert(
            token.field,
            Pending {
                generation: token.generation,
                event,
            },
        );
    }

    fn is_latest(&self, token: MutationToken) -> bool {
        self.pending
            .get(&token.field)
            .is_some_and(|p| p.generation == token.generation)
    }

    /// Settles a confirmed mutation: syncs the server snapshot and yields
    /// the activity event to append. Superseded tokens yield `None`.
    pub fn commit(&mut self, token: MutationToken) -> Option<EventRequest> {
        if !self.is_latest(token) {
            return None;
        }
        let pending = self.pending.remove(&token.field)?;
        copy_field(&mut self.server, &self.issue, token.field);
        Some(pending.event)
    }

    /// Settles a failed mutation: reverts the one touched field to the
    /// server snapshot. Superseded tokens are ignored; a newer staged
    /// value already replaced the one that failed.
    pub fn reject(&mut self, token: MutationToken) {
        if !self.is_latest(token) {
            return;
        }
        self.pending.remove(&token.field);
        copy_field(&mut self.issue, &self.server, token.field);
    }

    /// Reconciles a server-originated update (from the issue channel).
    /// Fields with a pending local mutation keep the local value; the
    /// title also defers to an unflushed draft.
    pub fn apply_remote(&mut self, remote: &Issue) {
        self.server = remote.clone();
        for field in [
            IssueField::Title,
            IssueField::Description,
            IssueField::Status,
            IssueField::Priority,
            IssueField::DueDate,
        ] {
            if self.pending.contains_key(&field) {
                continue;
            }
            if field == IssueField::Title && self.title_draft.is_some() {
                continue;
            }
            copy_field(&mut self.issue, remote, field);
        }
        self.issue.label = remote.label.clone();
    }

    // --- staging ---------------------------------------------------------

    pub fn stage_status(&mut self, status: Status) -> Staged {
        let token = self.next_token(IssueField::Status);
        let event = EventRequest {
            kind: EventKind::UpdateStatus,
            details: json!({
                "from": self.server.status.as_str(),
                "to": status.display_label(),
            }),
        };
        self.issue.status = status;
        self.stage(token, event);
        Staged {
            token,
            patch: IssuePatch {
                status: Some(status),
                ..IssuePatch::default()
            },
        }
    }

    pub fn stage_priority(&mut self, priority: Priority) -> Staged {
        let token = self.next_token(IssueField::Priority);
        let event = EventRequest {
            kind: EventKind::UpdatePriority,
            details: json!({
                "from": self.server.priority.display_label(),
                "to": priority.display_label(),
            }),
        };
        self.issue.priority = priority;
        self.stage(token, event);
        Staged {
            token,
            patch: IssuePatch {
                priority: Some(priority),
                ..IssuePatch::default()
            },
        }
    }

    pub fn stage_due_date(&mut self, due_date: Option<NaiveDate>) -> Staged {
        let token = self.next_token(IssueField::DueDate);
        let event = EventRequest {
            kind: EventKind::UpdateDueDate,
            details: json!({ "to": due_date.map(short_date) }),
        };
        self.issue.due_date = due_date;
        self.stage(token, event);
        Staged {
            token,
            patch: IssuePatch {
                due_date: Some(due_date),
                ..IssuePatch::default()
            },
        }
    }

    fn stage_title(&mut self, title: String) -> Staged {
        let token = self.next_token(IssueField::Title);
        self.issue.title = title.clone();
        self.stage(
            token,
            EventRequest {
                kind: EventKind::UpdateTitle,
                details: json!({}),
            },
        );
        Staged {
            token,
            patch: IssuePatch {
                title: Some(title),
                ..IssuePatch::default()
            },
        }
    }

    fn stage_description(&mut self) -> Staged {
        let token = self.next_token(IssueField::Description);
        self.stage(
            token,
            EventRequest {
                kind: EventKind::UpdateDescription,
                details: json!({}),
            },
        );
        Staged {
            token,
            patch: IssuePatch {
                description: Some(self.issue.description.clone()),
                ..IssuePatch::default()
            },
        }
    }

    // --- async convenience wrappers --------------------------------------

    async fn persist<D: Database + ?Sized>(
        &mut self,
        db: &D,
        actor: &Actor,
        staged: Staged,
    ) -> anyhow::Result<()> {
        let patch = serde_json::to_value(&staged.patch).context("encode issue patch")?;
        match db.update(tables::ISSUES, self.issue.id, patch).await {
            Ok(_) => {
                if let Some(event) = self.commit(staged.token) {
                    log_event(db, actor, self.issue.id, self.issue.workspace_id, event).await;
                }
                Ok(())
            }
            Err(err) => {
                warn!(issue = %self.issue.id, field = ?staged.token.field, error = %err,
                    "mutation failed, reverting");
                self.reject(staged.token);
                Err(err).context("persist issue update")
            }
        }
    }

    #[tracing::instrument(skip(self, db, actor), fields(issue = %self.issue.id))]
    pub async fn set_status<D: Database + ?Sized>(
        &mut self,
        db: &D,
        actor: &Actor,
        status: Status,
    ) -> anyhow::Result<()> {
        let staged = self.stage_status(status);
        self.persist(db, actor, staged).await
    }

    #[tracing::instrument(skip(self, db, actor), fields(issue = %self.issue.id))]
    pub async fn set_priority<D: Database + ?Sized>(
        &mut self,
        db: &D,
        actor: &Actor,
        priority: Priority,
    ) -> anyhow::Result<()> {
        let staged = self.stage_priority(priority);
        self.persist(db, actor, staged).await
    }

    /// Legacy dropdown entry point: 0 = no priority, 1 = urgent, 2 = high,
    /// 3 = medium, 4 = low.
    pub async fn set_priority_legacy<D: Database + ?Sized>(
        &mut self,
        db: &D,
        actor: &Actor,
        legacy_id: u64,
    ) -> anyhow::Result<()> {
        self.set_priority(db, actor, Priority::from_legacy_id(legacy_id))
            .await
    }

    #[tracing::instrument(skip(self, db, actor), fields(issue = %self.issue.id))]
    pub async fn set_due_date<D: Database + ?Sized>(
        &mut self,
        db: &D,
        actor: &Actor,
        due_date: Option<NaiveDate>,
    ) -> anyhow::Result<()> {
        let staged = self.stage_due_date(due_date);
        self.persist(db, actor, staged).await
    }

    // --- title debounce ---------------------------------------------------

    /// Records a keystroke's worth of title text. The local view updates
    /// immediately; persistence waits for a quiet window.
    pub fn type_title(&mut self, text: impl Into<String>, now: DateTime<Utc>) {
        let text = text.into();
        self.issue.title = text.clone();
        self.title_draft = Some(TitleDraft {
            text,
            deadline: now + Duration::milliseconds(self.cfg.title_debounce_ms as i64),
        });
    }

    /// Whether the debounce window has elapsed and `flush_title` would act.
    pub fn title_flush_due(&self, now: DateTime<Utc>) -> bool {
        self.title_draft
            .as_ref()
            .is_some_and(|draft| now >= draft.deadline)
    }

    /// Persists the debounced title if its quiet window has elapsed.
    /// Returns the slug for URL replacement on a confirmed change, `None`
    /// when nothing was due or the text matches the server title. An
    /// empty draft is discarded and the title reverts to the server copy.
    #[tracing::instrument(skip(self, db, actor), fields(issue = %self.issue.id))]
    pub async fn flush_title<D: Database + ?Sized>(
        &mut self,
        db: &D,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<TitleFlush>> {
        if !self.title_flush_due(now) {
            return Ok(None);
        }
        let Some(draft) = self.title_draft.take() else {
            return Ok(None);
        };
        if draft.text.trim().is_empty() {
            self.issue.title = self.server.title.clone();
            return Ok(None);
        }
        if draft.text == self.server.title {
            return Ok(None);
        }
        let staged = self.stage_title(draft.text.clone());
        self.persist(db, actor, staged).await?;
        Ok(Some(TitleFlush {
            slug: slugify(&draft.text),
        }))
    }

    // --- description ------------------------------------------------------

    /// Local-only edit; persistence happens on blur.
    pub fn edit_description(&mut self, text: impl Into<String>) {
        self.issue.description = text.into();
    }

    /// Persists the description if it differs from the server copy.
    /// Returns whether a write happened.
    #[tracing::instrument(skip(self, db, actor), fields(issue = %self.issue.id))]
    pub async fn blur_description<D: Database + ?Sized>(
        &mut self,
        db: &D,
        actor: &Actor,
    ) -> anyhow::Result<bool> {
        if self.issue.description == self.server.description {
            return Ok(false);
        }
        let staged = self.stage_description();
        self.persist(db, actor, staged).await?;
        Ok(true)
    }

    // --- labels -----------------------------------------------------------

    /// Attaches or detaches a label. The in-memory set updates first; a
    /// failed join-row write reverts it. On success the denormalized
    /// `issues.label` column is mirrored to the first attached label name
    /// (mirror failures are logged and left to the next sync).
    /// Returns whether the label is attached after the toggle.
    #[tracing::instrument(skip(self, db, actor), fields(issue = %self.issue.id, label = %label.name))]
    pub async fn toggle_label<D: Database + ?Sized>(
        &mut self,
        db: &D,
        actor: &Actor,
        label: &Label,
    ) -> anyhow::Result<bool> {
        let attaching = !self.has_label(label.id);

        if attaching {
            self.labels.push(label.clone());
            let row = json!({
                "issue_id": self.issue.id,
                "label_id": label.id,
                "workspace_id": self.issue.workspace_id,
            });
            if let Err(err) = db.insert(tables::ISSUE_LABELS, row).await {
                self.labels.retain(|l| l.id != label.id);
                return Err(err).context("attach label");
            }
        } else {
            self.labels.retain(|l| l.id != label.id);
            let filters = [
                Filter::eq("issue_id", self.issue.id.to_string()),
                Filter::eq("label_id", label.id.to_string()),
            ];
            if let Err(err) = db.delete(tables::ISSUE_LABELS, &filters).await {
                self.labels.push(label.clone());
                return Err(err).context("detach label");
            }
        }

        let kind = if attaching {
            EventKind::AddLabel
        } else {
            EventKind::RemoveLabel
        };
        log_event(
            db,
            actor,
            self.issue.id,
            self.issue.workspace_id,
            EventRequest {
                kind,
                details: json!({ "label": label.name }),
            },
        )
        .await;

        self.mirror_primary_label(db).await;
        Ok(attaching)
    }

    /// Keeps the legacy `issues.label` column equal to the first attached
    /// label name (or null).
    async fn mirror_primary_label<D: Database + ?Sized>(&mut self, db: &D) {
        let primary = self.labels.first().map(|l| l.name.clone());
        if primary == self.issue.label {
            return;
        }
        self.issue.label = primary.clone();
        let patch = json!({ "label": primary });
        match db.update(tables::ISSUES, self.issue.id, patch).await {
            Ok(_) => self.server.label = primary,
            Err(err) => {
                warn!(issue = %self.issue.id, error = %err, "primary label mirror failed");
            }
        }
    }

    // --- comments ---------------------------------------------------------

    /// Posts the current comment draft. The draft clears optimistically
    /// and is restored if the insert fails.
    #[tracing::instrument(skip(self, db, actor), fields(issue = %self.issue.id))]
    pub async fn post_comment<D: Database + ?Sized>(
        &mut self,
        db: &D,
        actor: &Actor,
    ) -> anyhow::Result<Value> {
        let text = self.comment_draft.trim().to_string();
        if text.is_empty() {
            return Err(ValidationError::EmptyComment.into());
        }
        let draft = std::mem::take(&mut self.comment_draft);
        let row = json!({
            "issue_id": self.issue.id,
            "workspace_id": self.issue.workspace_id,
            "created_by": actor.id,
            "user_email": actor.email,
            "comment_text": text,
        });
        match db.insert(tables::ISSUE_COMMENTS, row).await {
            Ok(stored) => Ok(stored),
            Err(err) => {
                self.comment_draft = draft;
                Err(err).context("post comment")
            }
        }
    }
}

fn copy_field(dst: &mut Issue, src: &Issue, field: IssueField) {
    match field {
        IssueField::Title => dst.title = src.title.clone(),
        IssueField::Description => dst.description = src.description.clone(),
        IssueField::Status => dst.status = src.status,
        IssueField::Priority => dst.priority = src.priority,
        IssueField::DueDate => dst.due_date = src.due_date,
    }
}

/// Fire-and-forget activity logging. A lost event degrades the feed but
/// never fails the mutation that produced it.
async fn log_event<D: Database + ?Sized>(
    db: &D,
    actor: &Actor,
    issue_id: Uuid,
    workspace_id: Uuid,
    event: EventRequest,
) {
    let row = json!({
        "issue_id": issue_id,
        "workspace_id": workspace_id,
        "actor_id": actor.id,
        "actor_email": actor.email,
        "event_type": serde_json::to_value(event.kind).unwrap_or(Value::Null),
        "details": event.details,
    });
    if let Err(err) = db.insert(tables::ISSUE_EVENTS, row).await {
        warn!(issue = %issue_id, error = %err, "activity event append failed");
    }
}

/// Input for issue creation, before key and number assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueInput {
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub label: Option<String>,
}

impl Default for IssueInput {
    fn default() -> Self {
        IssueInput {
            title: String::new(),
            description: String::new(),
            status: Status::Todo,
            priority: Priority::NoPriority,
            due_date: None,
            label: None,
        }
    }
}

/// Creates an issue: assigns the next per-workspace issue number and key
/// (`TEAM-7`), inserts the row, then logs the create event.
#[tracing::instrument(skip(db, actor, input), fields(workspace = %workspace_id))]
pub async fn create_issue<D: Database + ?Sized>(
    db: &D,
    actor: &Actor,
    workspace_id: Uuid,
    team_key: &str,
    input: IssueInput,
) -> anyhow::Result<Issue> {
    if input.title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle.into());
    }

    let existing = db
        .select(
            tables::ISSUES,
            &[Filter::eq("workspace_id", workspace_id.to_string())],
        )
        .await
        .context("count workspace issues")?;
    let next_number = existing
        .iter()
        .filter_map(|row| row.get("issue_number").and_then(Value::as_u64))
        .max()
        .unwrap_or(0)
        + 1;

    let row = json!({
        "workspace_id": workspace_id,
        "created_by": actor.id,
        "title": input.title.trim(),
        "description": input.description,
        "status": input.status.as_str(),
        "priority": input.priority.as_str(),
        "due_date": input.due_date.map(to_wire_date),
        "label": input.label,
        "issue_number": next_number,
        "issue_key": format!("{team_key}-{next_number}"),
    });
    let stored = db
        .insert(tables::ISSUES, row)
        .await
        .context("insert issue")?;
    let issue = crate::events::issue_from_record(&stored)
        .context("stored issue row did not round-trip")?;

    log_event(
        db,
        actor,
        issue.id,
        workspace_id,
        EventRequest {
            kind: EventKind::Create,
            details: json!({ "status": input.status.as_str() }),
        },
    )
    .await;

    Ok(issue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use chrono::TimeZone;

    fn actor() -> Actor {
        Actor {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
        }
    }

    fn ts(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 17, 9, 0, second)
            .single()
            .expect("ts")
    }

    fn issue() -> Issue {
        Issue {
            id: Uuid::new_v4(),
            issue_key: "TES-1".to_string(),
            issue_number: 1,
            title: "Wire the board".to_string(),
            description: "old".to_string(),
            status: Status::Todo,
            priority: Priority::NoPriority,
            due_date: None,
            label: None,
            workspace_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            created_at: ts(0),
        }
    }

    fn editor() -> IssueEditor {
        IssueEditor::new(issue(), Vec::new(), SyncConfig::default())
    }

    async fn seeded(db: &MemoryDatabase, issue: &Issue) {
        let row = serde_json::to_value(issue).expect("issue row");
        db.insert(tables::ISSUES, row).await.expect("seed issue");
    }

    #[test]
    fn reject_reverts_only_the_latest_generation() {
        let mut editor = editor();
        let first = editor.stage_status(Status::Done);
        let second = editor.stage_status(Status::InProgress);

        // The first mutation's failure arrives after the second staged.
        editor.reject(first.token);
        assert_eq!(editor.issue().status, Status::InProgress);

        editor.reject(second.token);
        assert_eq!(editor.issue().status, Status::Todo);
    }

    #[test]
    fn commit_emits_activity_event_payloads() {
        let mut editor = editor();
        let staged = editor.stage_status(Status::Done);
        let event = editor.commit(staged.token).expect("event");
        assert_eq!(event.kind, EventKind::UpdateStatus);
        assert_eq!(event.details, json!({ "from": "todo", "to": "Done" }));

        let staged = editor.stage_priority(Priority::Urgent);
        let event = editor.commit(staged.token).expect("event");
        assert_eq!(
            event.details,
            json!({ "from": "No priority", "to": "Urgent" })
        );

        let date = NaiveDate::from_ymd_opt(2026, 2, 10).expect("date");
        let staged = editor.stage_due_date(Some(date));
        let event = editor.commit(staged.token).expect("event");
        assert_eq!(event.details, json!({ "to": "Feb 10" }));

        let staged = editor.stage_due_date(None);
        let event = editor.commit(staged.token).expect("event");
        assert_eq!(event.details, json!({ "to": null }));
    }

    #[test]
    fn superseded_commit_is_a_no_op() {
        let mut editor = editor();
        let first = editor.stage_status(Status::Done);
        let _second = editor.stage_status(Status::InProgress);
        assert!(editor.commit(first.token).is_none());
        assert_eq!(editor.issue().status, Status::InProgress);
    }

    #[test]
    fn apply_remote_keeps_pending_fields_local() {
        let mut editor = editor();
        let _staged = editor.stage_status(Status::Done);

        let mut remote = editor.issue().clone();
        remote.status = Status::Canceled;
        remote.description = "remote".to_string();
        editor.apply_remote(&remote);

        assert_eq!(editor.issue().status, Status::Done);
        assert_eq!(editor.issue().description, "remote");
    }

    #[tokio::test]
    async fn set_status_persists_and_logs_activity() {
        let db = MemoryDatabase::new();
        let base = issue();
        seeded(&db, &base).await;
        let mut editor = IssueEditor::new(base.clone(), Vec::new(), SyncConfig::default());

        editor
            .set_status(&db, &actor(), Status::Done)
            .await
            .expect("set status");

        let rows = db
            .select(tables::ISSUES, &[])
            .await
            .expect("select issues");
        assert_eq!(rows[0]["status"], json!("done"));

        let events = db
            .select(tables::ISSUE_EVENTS, &[])
            .await
            .expect("select events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event_type"], json!("update_status"));
        assert_eq!(events[0]["details"], json!({ "from": "todo", "to": "Done" }));
    }

    #[tokio::test]
    async fn failed_mutation_reverts_and_surfaces_the_error() {
        let db = MemoryDatabase::new();
        let base = issue();
        seeded(&db, &base).await;
        let mut editor = IssueEditor::new(base, Vec::new(), SyncConfig::default());

        db.fail_next_write("injected");
        let result = editor.set_status(&db, &actor(), Status::Done).await;
        assert!(result.is_err());
        assert_eq!(editor.issue().status, Status::Todo);

        let events = db
            .select(tables::ISSUE_EVENTS, &[])
            .await
            .expect("select events");
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn title_debounce_flushes_once_after_the_quiet_window() {
        let db = MemoryDatabase::new();
        let base = issue();
        seeded(&db, &base).await;
        let mut editor = IssueEditor::new(base, Vec::new(), SyncConfig::default());
        let user = actor();

        editor.type_title("Wire the board v", ts(0));
        editor.type_title("Wire the board v2!", ts(0));
        assert_eq!(editor.issue().title, "Wire the board v2!");

        // Still within the 500ms window.
        let early = ts(0) + Duration::milliseconds(200);
        assert!(editor.flush_title(&db, &user, early).await.expect("flush").is_none());

        let due = ts(1);
        let flush = editor
            .flush_title(&db, &user, due)
            .await
            .expect("flush")
            .expect("flushed");
        assert_eq!(flush.slug, "wire-the-board-v2");

        // A second flush with nothing typed is a no-op.
        assert!(editor.flush_title(&db, &user, ts(2)).await.expect("flush").is_none());

        let events = db
            .select(tables::ISSUE_EVENTS, &[])
            .await
            .expect("select events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event_type"], json!("update_title"));
    }

    #[tokio::test]
    async fn unchanged_title_flush_writes_nothing() {
        let db = MemoryDatabase::new();
        let base = issue();
        seeded(&db, &base).await;
        let mut editor = IssueEditor::new(base.clone(), Vec::new(), SyncConfig::default());

        editor.type_title(base.title.clone(), ts(0));
        let flushed = editor
            .flush_title(&db, &actor(), ts(1))
            .await
            .expect("flush");
        assert!(flushed.is_none());
        let events = db
            .select(tables::ISSUE_EVENTS, &[])
            .await
            .expect("select events");
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn description_blur_writes_only_on_change() {
        let db = MemoryDatabase::new();
        let base = issue();
        seeded(&db, &base).await;
        let mut editor = IssueEditor::new(base, Vec::new(), SyncConfig::default());
        let user = actor();

        assert!(!editor.blur_description(&db, &user).await.expect("blur"));

        editor.edit_description("new body");
        assert!(editor.blur_description(&db, &user).await.expect("blur"));

        let events = db
            .select(tables::ISSUE_EVENTS, &[])
            .await
            .expect("select events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event_type"], json!("update_description"));
    }

    #[tokio::test]
    async fn toggle_label_syncs_join_rows_and_the_primary_mirror() {
        let db = MemoryDatabase::new();
        let base = issue();
        seeded(&db, &base).await;
        let mut editor = IssueEditor::new(base.clone(), Vec::new(), SyncConfig::default());
        let user = actor();
        let label = Label {
            id: Uuid::new_v4(),
            name: "Bug".to_string(),
            color: "#ff0000".to_string(),
            workspace_id: base.workspace_id,
        };

        let attached = editor
            .toggle_label(&db, &user, &label)
            .await
            .expect("toggle on");
        assert!(attached);
        assert_eq!(editor.issue().label.as_deref(), Some("Bug"));

        let joins = db
            .select(tables::ISSUE_LABELS, &[])
            .await
            .expect("select joins");
        assert_eq!(joins.len(), 1);

        let rows = db.select(tables::ISSUES, &[]).await.expect("select issues");
        assert_eq!(rows[0]["label"], json!("Bug"));

        let attached = editor
            .toggle_label(&db, &user, &label)
            .await
            .expect("toggle off");
        assert!(!attached);
        assert_eq!(editor.issue().label, None);
        let joins = db
            .select(tables::ISSUE_LABELS, &[])
            .await
            .expect("select joins");
        assert!(joins.is_empty());

        let events = db
            .select(tables::ISSUE_EVENTS, &[])
            .await
            .expect("select events");
        let kinds: Vec<&Value> = events.iter().map(|e| &e["event_type"]).collect();
        assert_eq!(kinds, [&json!("add_label"), &json!("remove_label")]);
    }

    #[tokio::test]
    async fn failed_label_attach_reverts_the_set() {
        let db = MemoryDatabase::new();
        let base = issue();
        seeded(&db, &base).await;
        let mut editor = IssueEditor::new(base.clone(), Vec::new(), SyncConfig::default());
        let label = Label {
            id: Uuid::new_v4(),
            name: "Bug".to_string(),
            color: String::new(),
            workspace_id: base.workspace_id,
        };

        db.fail_next_write("injected");
        let result = editor.toggle_label(&db, &actor(), &label).await;
        assert!(result.is_err());
        assert!(!editor.has_label(label.id));
        assert_eq!(editor.issue().label, None);
    }

    #[tokio::test]
    async fn comment_post_failure_restores_the_draft() {
        let db = MemoryDatabase::new();
        let base = issue();
        let mut editor = IssueEditor::new(base, Vec::new(), SyncConfig::default());
        let user = actor();

        editor.edit_comment("   ");
        assert!(editor.post_comment(&db, &user).await.is_err());

        editor.edit_comment("looks good");
        db.fail_next_write("injected");
        assert!(editor.post_comment(&db, &user).await.is_err());
        assert_eq!(editor.comment_draft(), "looks good");

        let stored = editor.post_comment(&db, &user).await.expect("post");
        assert_eq!(stored["comment_text"], json!("looks good"));
        assert_eq!(editor.comment_draft(), "");
    }

    #[tokio::test]
    async fn create_issue_assigns_sequential_keys() {
        let db = MemoryDatabase::new();
        let workspace = Uuid::new_v4();
        let user = actor();

        let first = create_issue(
            &db,
            &user,
            workspace,
            "TES",
            IssueInput {
                title: "First".to_string(),
                ..IssueInput::default()
            },
        )
        .await
        .expect("create");
        assert_eq!(first.issue_key, "TES-1");

        let second = create_issue(
            &db,
            &user,
            workspace,
            "TES",
            IssueInput {
                title: "Second".to_string(),
                ..IssueInput::default()
            },
        )
        .await
        .expect("create");
        assert_eq!(second.issue_key, "TES-2");
        assert_eq!(second.issue_number, 2);

        let events = db
            .select(tables::ISSUE_EVENTS, &[])
            .await
            .expect("select events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event_type"], json!("create"));
    }

    #[tokio::test]
    async fn create_issue_rejects_blank_titles() {
        let db = MemoryDatabase::new();
        let result = create_issue(
            &db,
            &actor(),
            Uuid::new_v4(),
            "TES",
            IssueInput {
                title: "   ".to_string(),
                ..IssueInput::default()
            },
        )
        .await;
        assert!(result.is_err());
        let rows = db.select(tables::ISSUES, &[]).await.expect("select");
        assert!(rows.is_empty());
    }
}
