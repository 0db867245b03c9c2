//! The Database capability consumed by every view: CRUD over JSON rows
//! plus per-channel change subscriptions.

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;

pub mod tables {
    pub const ISSUES: &str = "issues";
    pub const ISSUE_COMMENTS: &str = "issue_comments";
    pub const ISSUE_EVENTS: &str = "issue_events";
    pub const LABELS: &str = "labels";
    pub const ISSUE_LABELS: &str = "issue_labels";
}

/// Channel identifier for a workspace board view.
pub fn board_channel(workspace_id: Uuid) -> String {
    format!("board-{workspace_id}")
}

/// Channel identifier for an issue detail view.
pub fn issue_channel(issue_id: Uuid) -> String {
    format!("issue-{issue_id}")
}

/// Channel identifier for an issue activity feed.
pub fn activity_channel(issue_id: Uuid) -> String {
    format!("activity-{issue_id}")
}

/// Row predicate supported by the store: equality and membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Eq { column: String, value: Value },
    In { column: String, values: Vec<Value> },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Filter {
        Filter::In {
            column: column.into(),
            values,
        }
    }

    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Filter::Eq { column, value } => record.get(column) == Some(value),
            Filter::In { column, values } => record
                .get(column)
                .is_some_and(|field| values.contains(field)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

/// Raw change notification delivered by the store's subscribe stream.
/// Delete notifications may carry only the primary key in `record`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub operation: Operation,
    pub table: String,
    pub record: Value,
    #[serde(default)]
    pub old_record: Option<Value>,
}

/// One table + filter pair a channel listens on. A channel may listen on
/// several tables (the activity feed watches comments and events at once).
#[derive(Debug, Clone, PartialEq)]
pub struct TableFilter {
    pub table: String,
    pub filter: Filter,
}

impl TableFilter {
    pub fn new(table: impl Into<String>, filter: Filter) -> TableFilter {
        TableFilter {
            table: table.into(),
            filter,
        }
    }
}

/// Live subscription handle. The channel identifier is owned by this
/// handle; dropping (or `close`-ing) it releases the identifier and ends
/// the stream. Losing the sender side ends the stream silently; the view
/// degrades to stale data, no reconnect is attempted.
pub struct Subscription {
    channel: String,
    rx: UnboundedReceiver<ChangeNotification>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        channel: impl Into<String>,
        rx: UnboundedReceiver<ChangeNotification>,
        on_close: Box<dyn FnOnce() + Send>,
    ) -> Subscription {
        Subscription {
            channel: channel.into(),
            rx,
            on_close: Some(on_close),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next notification, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<ChangeNotification> {
        self.rx.next().await
    }

    /// Drains one already-delivered notification without waiting.
    pub fn poll_now(&mut self) -> Option<ChangeNotification> {
        self.rx.try_next().ok().flatten()
    }

    pub fn close(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.on_close.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Persistent data store with change notifications. Records cross this
/// boundary as JSON rows; typed DTOs exist only on the client side.
#[async_trait]
pub trait Database: Send + Sync {
    async fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>, StoreError>;

    async fn insert(&self, table: &str, record: Value) -> Result<Value, StoreError>;

    async fn update(&self, table: &str, id: Uuid, patch: Value) -> Result<Value, StoreError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError>;

    /// Opens a named channel delivering change notifications for the given
    /// table/filter pairs. A channel identifier may be held by at most one
    /// live [`Subscription`]; a second subscribe on the same identifier
    /// fails with [`StoreError::ChannelInUse`].
    fn subscribe(&self, channel: &str, specs: Vec<TableFilter>) -> Result<Subscription, StoreError>;
}
