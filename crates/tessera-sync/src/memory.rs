//! Reference in-memory [`Database`] with change-notification fan-out.
//!
//! Rows are plain JSON objects keyed by an `id` column, one vector per
//! table, and every write is broadcast to the subscriptions whose
//! table/filter pairs match. Integration tests and demos run against
//! this store; a production deployment substitutes its own `Database`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use futures::channel::mpsc::{self, UnboundedSender};
use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{
    ChangeNotification, Database, Filter, Operation, Subscription, TableFilter, tables,
};

const KNOWN_TABLES: [&str; 5] = [
    tables::ISSUES,
    tables::ISSUE_COMMENTS,
    tables::ISSUE_EVENTS,
    tables::LABELS,
    tables::ISSUE_LABELS,
];

#[derive(Default)]
struct Inner {
    issues: Vec<Value>,
    issue_comments: Vec<Value>,
    issue_events: Vec<Value>,
    labels: Vec<Value>,
    issue_labels: Vec<Value>,
    subscribers: Vec<Subscriber>,
    channels: HashSet<String>,
    fail_next_write: Option<String>,
}

struct Subscriber {
    channel: String,
    specs: Vec<TableFilter>,
    tx: UnboundedSender<ChangeNotification>,
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDatabase {
    pub fn new() -> MemoryDatabase {
        MemoryDatabase::default()
    }

    /// Makes the next write (insert/update/delete) fail with the given
    /// reason. Used to exercise optimistic-rollback paths.
    pub fn fail_next_write(&self, reason: impl Into<String>) {
        self.lock().fail_next_write = Some(reason.into());
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Inner {
    fn rows(&self, table: &str) -> Result<&Vec<Value>, StoreError> {
        match table {
            tables::ISSUES => Ok(&self.issues),
            tables::ISSUE_COMMENTS => Ok(&self.issue_comments),
            tables::ISSUE_EVENTS => Ok(&self.issue_events),
            tables::LABELS => Ok(&self.labels),
            tables::ISSUE_LABELS => Ok(&self.issue_labels),
            other => Err(StoreError::UnknownTable(other.to_string())),
        }
    }

    fn rows_mut(&mut self, table: &str) -> Result<&mut Vec<Value>, StoreError> {
        match table {
            tables::ISSUES => Ok(&mut self.issues),
            tables::ISSUE_COMMENTS => Ok(&mut self.issue_comments),
            tables::ISSUE_EVENTS => Ok(&mut self.issue_events),
            tables::LABELS => Ok(&mut self.labels),
            tables::ISSUE_LABELS => Ok(&mut self.issue_labels),
            other => Err(StoreError::UnknownTable(other.to_string())),
        }
    }

    fn take_write_failure(&mut self, table: &str) -> Result<(), StoreError> {
        if let Some(reason) = self.fail_next_write.take() {
            return Err(StoreError::WriteFailed {
                table: table.to_string(),
                reason,
            });
        }
        Ok(())
    }

    fn broadcast(&mut self, note: &ChangeNotification) {
        // The match key is the new record except for deletes, where only
        // the old row still carries the filterable columns.
        let match_target = match note.operation {
            Operation::Delete => note.old_record.as_ref().unwrap_or(&note.record),
            _ => &note.record,
        };
        self.subscribers.retain(|sub| {
            let interested = sub
                .specs
                .iter()
                .any(|spec| spec.table == note.table && spec.filter.matches(match_target));
            if !interested {
                return !sub.tx.is_closed();
            }
            sub.tx.unbounded_send(note.clone()).is_ok()
        });
    }
}

fn ensure_identity(record: &mut Value) {
    let Some(obj) = record.as_object_mut() else {
        return;
    };
    if !obj.contains_key("id") {
        obj.insert("id".to_string(), json!(Uuid::new_v4()));
    }
    if !obj.contains_key("created_at") {
        obj.insert("created_at".to_string(), json!(Utc::now()));
    }
}

fn row_id_matches(row: &Value, id: Uuid) -> bool {
    row.get("id").and_then(Value::as_str) == Some(id.to_string().as_str())
}

#[async_trait]
impl Database for MemoryDatabase {
    #[tracing::instrument(skip(self, filters))]
    async fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>, StoreError> {
        let inner = self.lock();
        let rows = inner.rows(table)?;
        let out: Vec<Value> = rows
            .iter()
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .cloned()
            .collect();
        debug!(count = out.len(), "selected rows");
        Ok(out)
    }

    #[tracing::instrument(skip(self, record))]
    async fn insert(&self, table: &str, mut record: Value) -> Result<Value, StoreError> {
        let mut inner = self.lock();
        inner.take_write_failure(table)?;
        ensure_identity(&mut record);
        inner.rows_mut(table)?.push(record.clone());
        inner.broadcast(&ChangeNotification {
            operation: Operation::Insert,
            table: table.to_string(),
            record: record.clone(),
            old_record: None,
        });
        Ok(record)
    }

    #[tracing::instrument(skip(self, patch), fields(id = %id))]
    async fn update(&self, table: &str, id: Uuid, patch: Value) -> Result<Value, StoreError> {
        let mut inner = self.lock();
        inner.take_write_failure(table)?;
        let rows = inner.rows_mut(table)?;
        let Some(row) = rows.iter_mut().find(|row| row_id_matches(row, id)) else {
            return Err(StoreError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            });
        };
        let old = row.clone();
        if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        let updated = row.clone();
        inner.broadcast(&ChangeNotification {
            operation: Operation::Update,
            table: table.to_string(),
            record: updated.clone(),
            old_record: Some(old),
        });
        Ok(updated)
    }

    #[tracing::instrument(skip(self, filters))]
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.take_write_failure(table)?;
        let rows = inner.rows_mut(table)?;
        let mut removed = Vec::new();
        rows.retain(|row| {
            if filters.iter().all(|f| f.matches(row)) {
                removed.push(row.clone());
                false
            } else {
                true
            }
        });
        debug!(count = removed.len(), "deleted rows");
        for row in removed {
            // Delete payloads carry only the primary key, the way coarse
            // change streams deliver them; the full row rides in old_record.
            let key_only = match row.get("id") {
                Some(id) => json!({ "id": id }),
                None => json!({}),
            };
            inner.broadcast(&ChangeNotification {
                operation: Operation::Delete,
                table: table.to_string(),
                record: key_only,
                old_record: Some(row),
            });
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, specs))]
    fn subscribe(&self, channel: &str, specs: Vec<TableFilter>) -> Result<Subscription, StoreError> {
        for spec in &specs {
            if !KNOWN_TABLES.contains(&spec.table.as_str()) {
                warn!(table = %spec.table, "subscription on unknown table; it will never fire");
            }
        }
        let mut inner = self.lock();
        if !inner.channels.insert(channel.to_string()) {
            return Err(StoreError::ChannelInUse(channel.to_string()));
        }
        let (tx, rx) = mpsc::unbounded();
        inner.subscribers.push(Subscriber {
            channel: channel.to_string(),
            specs,
            tx,
        });
        debug!(channel, "channel opened");

        let registry = Arc::clone(&self.inner);
        let name = channel.to_string();
        let release = Box::new(move || {
            let mut inner = match registry.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            inner.channels.remove(&name);
            inner.subscribers.retain(|sub| sub.channel != name);
        });
        Ok(Subscription::new(channel, rx, release))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn double_subscribe_on_same_channel_errors_until_released() {
        let db = MemoryDatabase::new();
        let spec = vec![TableFilter::new(tables::ISSUES, Filter::eq("workspace_id", "w"))];

        let first = db.subscribe("board-w", spec.clone()).expect("first subscribe");
        let second = db.subscribe("board-w", spec.clone());
        assert!(matches!(second, Err(StoreError::ChannelInUse(_))));

        first.close();
        db.subscribe("board-w", spec).expect("subscribe after release");
    }

    #[tokio::test]
    async fn writes_notify_matching_subscribers_only() {
        let db = MemoryDatabase::new();
        let mut sub = db
            .subscribe(
                "board-a",
                vec![TableFilter::new(tables::ISSUES, Filter::eq("workspace_id", "a"))],
            )
            .expect("subscribe");

        db.insert(tables::ISSUES, json!({ "workspace_id": "b", "title": "other" }))
            .await
            .expect("insert b");
        db.insert(tables::ISSUES, json!({ "workspace_id": "a", "title": "mine" }))
            .await
            .expect("insert a");

        let note = sub.poll_now().expect("one notification");
        assert_eq!(note.record["title"], json!("mine"));
        assert!(sub.poll_now().is_none());
    }

    #[tokio::test]
    async fn delete_notification_carries_only_the_key() {
        let db = MemoryDatabase::new();
        let row = db
            .insert(tables::ISSUES, json!({ "workspace_id": "a", "title": "gone" }))
            .await
            .expect("insert");
        let id: Uuid = serde_json::from_value(row["id"].clone()).expect("id");

        let mut sub = db
            .subscribe(
                "board-a",
                vec![TableFilter::new(tables::ISSUES, Filter::eq("workspace_id", "a"))],
            )
            .expect("subscribe");

        db.delete(tables::ISSUES, &[Filter::eq("id", id.to_string())])
            .await
            .expect("delete");

        let note = sub.poll_now().expect("delete notification");
        assert_eq!(note.operation, Operation::Delete);
        assert_eq!(note.record, json!({ "id": id }));
        assert_eq!(note.old_record.expect("old record")["title"], json!("gone"));
    }

    #[tokio::test]
    async fn injected_failure_hits_exactly_one_write() {
        let db = MemoryDatabase::new();
        db.fail_next_write("network down");

        let err = db
            .insert(tables::ISSUES, json!({ "workspace_id": "a" }))
            .await
            .expect_err("injected failure");
        assert!(matches!(err, StoreError::WriteFailed { .. }));

        db.insert(tables::ISSUES, json!({ "workspace_id": "a" }))
            .await
            .expect("next write succeeds");
    }
}
