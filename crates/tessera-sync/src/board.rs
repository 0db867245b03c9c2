//! Board view state: reconciles live issue events into the in-memory
//! collection and projects it as grouped, priority-sorted status columns.

use std::cmp::Reverse;

use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use tessera_types::{Issue, Status};

use crate::error::StoreError;
use crate::events::{DomainEvent, issue_from_record};
use crate::store::{Database, Filter, Subscription, TableFilter, board_channel, tables};

/// Which status groups a board renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardScope {
    /// Active work: todo + in progress.
    Active,
    /// Backlog only.
    Backlog,
    /// Every status group.
    All,
    Custom(Vec<Status>),
}

impl BoardScope {
    pub fn statuses(&self) -> Vec<Status> {
        match self {
            BoardScope::Active => vec![Status::Todo, Status::InProgress],
            BoardScope::Backlog => vec![Status::Backlog],
            BoardScope::All => Status::ALL.to_vec(),
            BoardScope::Custom(statuses) => statuses.clone(),
        }
    }

    pub fn contains(&self, status: Status) -> bool {
        self.statuses().contains(&status)
    }
}

/// One rendered status column.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusGroup {
    pub status: Status,
    pub title: &'static str,
    pub issues: Vec<Issue>,
}

/// In-memory issue collection for one board view.
///
/// Lifecycle: [`BoardView::open`] seeds from a fetch and opens the
/// workspace subscription; the caller feeds normalized events through
/// [`BoardView::apply`] and renders [`BoardView::groups`]; dropping the
/// subscription tears the channel down.
#[derive(Debug, Clone)]
pub struct BoardView {
    workspace_id: Uuid,
    scope: BoardScope,
    issues: Vec<Issue>,
}

impl BoardView {
    pub fn new(workspace_id: Uuid, scope: BoardScope) -> BoardView {
        BoardView {
            workspace_id,
            scope,
            issues: Vec::new(),
        }
    }

    /// Fetches the scoped issues (newest first) and opens the board's
    /// change channel.
    #[tracing::instrument(skip(db), fields(workspace = %workspace_id))]
    pub async fn open<D: Database + ?Sized>(
        db: &D,
        workspace_id: Uuid,
        scope: BoardScope,
    ) -> Result<(BoardView, Subscription), StoreError> {
        let status_values = scope.statuses().iter().map(|s| json!(s.as_str())).collect();
        let rows = db
            .select(
                tables::ISSUES,
                &[
                    Filter::eq("workspace_id", workspace_id.to_string()),
                    Filter::is_in("status", status_values),
                ],
            )
            .await?;

        let mut seeded: Vec<Issue> = rows.iter().filter_map(issue_from_record).collect();
        seeded.sort_by_key(|issue| Reverse(issue.created_at));

        let subscription = db.subscribe(
            &board_channel(workspace_id),
            vec![TableFilter::new(
                tables::ISSUES,
                Filter::eq("workspace_id", workspace_id.to_string()),
            )],
        )?;

        let mut view = BoardView::new(workspace_id, scope);
        view.seed(seeded);
        Ok((view, subscription))
    }

    pub fn workspace_id(&self) -> Uuid {
        self.workspace_id
    }

    pub fn scope(&self) -> &BoardScope {
        &self.scope
    }

    /// Replaces the collection from a fetch or prop re-seed. Out-of-scope
    /// rows and duplicate ids are discarded.
    pub fn seed(&mut self, issues: Vec<Issue>) {
        self.issues.clear();
        for issue in issues {
            if self.scope.contains(issue.status) && self.position(issue.id).is_none() {
                self.issues.push(issue);
            }
        }
    }

    /// Reconciles one normalized event into the collection. Idempotent:
    /// re-applying the same event leaves the collection unchanged.
    pub fn apply(&mut self, event: &DomainEvent) {
        match event {
            DomainEvent::IssueCreated(issue) => self.upsert(issue),
            DomainEvent::IssueUpdated(issue) => self.upsert(issue),
            DomainEvent::IssueDeleted(id) => {
                self.issues.retain(|existing| existing.id != *id);
            }
            DomainEvent::CommentAdded(_) | DomainEvent::EventAdded(_) => {}
        }
    }

    fn upsert(&mut self, issue: &Issue) {
        let in_scope = self.scope.contains(issue.status);
        match self.position(issue.id) {
            Some(idx) if in_scope => self.issues[idx] = issue.clone(),
            Some(idx) => {
                // Moved out of this view, e.g. todo -> done.
                debug!(issue = %issue.id, status = issue.status.as_str(), "issue left view");
                self.issues.remove(idx);
            }
            None if in_scope => self.issues.insert(0, issue.clone()),
            None => {}
        }
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.issues.iter().position(|issue| issue.id == id)
    }

    /// Flat working collection, arrival-ordered.
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Count of todo issues, surfaced on the board header regardless of
    /// which groups the view renders.
    pub fn todo_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.status == Status::Todo)
            .count()
    }

    /// Non-empty status columns in fixed group order, each sorted by
    /// priority weight descending with arrival order preserved on ties.
    pub fn groups(&self) -> Vec<StatusGroup> {
        let mut out = Vec::new();
        for status in Status::ALL {
            if !self.scope.contains(status) {
                continue;
            }
            let mut group: Vec<Issue> = self
                .issues
                .iter()
                .filter(|issue| issue.status == status)
                .cloned()
                .collect();
            if group.is_empty() {
                continue;
            }
            group.sort_by_key(|issue| Reverse(issue.priority.sort_weight()));
            out.push(StatusGroup {
                status,
                title: status.display_label(),
                issues: group,
            });
        }
        out
    }
}
