//! Embedded store backed by redb.
//!
//! # Table design
//!
//! Tasks and workers live in one table per task type / worker pool, keyed by
//! id with JSON values. Keys are ordered, so "storage order" is id order.
//!
//! The `AUDIT_LOG` table uses a 16-byte composite key:
//! ```text
//! [ created_at_ms: u64 big-endian (8 bytes) | seq: u64 big-endian (8 bytes) ]
//! ```
//! `seq` is a counter kept in `META` and bumped inside the same write
//! transaction, so entries written in the same millisecond still sort in
//! append order and a reverse scan yields newest-first.
//!
//! redb runs one write transaction at a time, which makes the read-compare-
//! write in [`TaskStore::update_status`] atomic.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use crate::audit::{AuditLogEntry, AuditQuery};
use crate::error::{DispatchError, Result};
use crate::task::{Task, TaskPatch};
use crate::types::{TaskStatus, TaskType, WorkerPool};
use crate::worker::Worker;

use super::{AuditLog, TaskStore, WorkerDirectory};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const DELIVERY_TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("delivery_tasks");
const REPAIR_TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("repair_tasks");
const DRIVERS: TableDefinition<&str, &[u8]> = TableDefinition::new("drivers");
const TECHNICIANS: TableDefinition<&str, &[u8]> = TableDefinition::new("technicians");

/// Key: 16-byte composite (created_at_ms ++ seq), value: JSON AuditLogEntry
const AUDIT_LOG: TableDefinition<&[u8], &[u8]> = TableDefinition::new("audit_log");

const META: TableDefinition<&str, u64> = TableDefinition::new("meta");
const AUDIT_SEQ: &str = "audit_seq";

fn task_table(task_type: TaskType) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match task_type {
        TaskType::Delivery => DELIVERY_TASKS,
        TaskType::Repair => REPAIR_TASKS,
    }
}

fn worker_table(pool: WorkerPool) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match pool {
        WorkerPool::Driver => DRIVERS,
        WorkerPool::Technician => TECHNICIANS,
    }
}

fn audit_key(entry: &AuditLogEntry, seq: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    let ms = entry.created_at.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(&seq.to_be_bytes());
    key
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path`, creating every table.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        let db = Database::create(path).map_err(DispatchError::upstream)?;
        let wt = db.begin_write().map_err(DispatchError::upstream)?;
        for def in [DELIVERY_TASKS, REPAIR_TASKS, DRIVERS, TECHNICIANS] {
            wt.open_table(def).map_err(DispatchError::upstream)?;
        }
        wt.open_table(AUDIT_LOG).map_err(DispatchError::upstream)?;
        wt.open_table(META).map_err(DispatchError::upstream)?;
        wt.commit().map_err(DispatchError::upstream)?;
        Ok(Self { db })
    }

    /// Open the database under a project root (`.dispatch/dispatch.db`).
    pub fn open_root(root: &Path) -> Result<Self> {
        Self::open(&crate::paths::database_path(root))
    }

    fn read_all<T: serde::de::DeserializeOwned>(
        &self,
        def: TableDefinition<'_, &'static str, &'static [u8]>,
    ) -> Result<Vec<T>> {
        let rt = self.db.begin_read().map_err(DispatchError::upstream)?;
        let table = rt.open_table(def).map_err(DispatchError::upstream)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(DispatchError::upstream)? {
            let (_, v) = entry.map_err(DispatchError::upstream)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    fn read_one<T: serde::de::DeserializeOwned>(
        &self,
        def: TableDefinition<'_, &'static str, &'static [u8]>,
        id: &str,
    ) -> Result<Option<T>> {
        let rt = self.db.begin_read().map_err(DispatchError::upstream)?;
        let table = rt.open_table(def).map_err(DispatchError::upstream)?;
        let found = match table.get(id).map_err(DispatchError::upstream)? {
            Some(v) => Some(serde_json::from_slice(v.value())?),
            None => None,
        };
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// TaskStore
// ---------------------------------------------------------------------------

impl TaskStore for RedbStore {
    fn get_task(&self, task_type: TaskType, id: &str) -> Result<Task> {
        self.read_one(task_table(task_type), id)?
            .ok_or_else(|| DispatchError::TaskNotFound(id.to_string()))
    }

    /// Ids are unique across every task table, so an id alone names one task.
    fn insert_task(&self, task: &Task) -> Result<()> {
        let value = serde_json::to_vec(task)?;
        let wt = self.db.begin_write().map_err(DispatchError::upstream)?;
        {
            for &t in TaskType::all() {
                let table = wt
                    .open_table(task_table(t))
                    .map_err(DispatchError::upstream)?;
                if table
                    .get(task.id.as_str())
                    .map_err(DispatchError::upstream)?
                    .is_some()
                {
                    return Err(DispatchError::InvalidInput(format!(
                        "task already exists: {} ({t})",
                        task.id
                    )));
                }
            }
            let mut table = wt
                .open_table(task_table(task.task_type))
                .map_err(DispatchError::upstream)?;
            table
                .insert(task.id.as_str(), value.as_slice())
                .map_err(DispatchError::upstream)?;
        }
        wt.commit().map_err(DispatchError::upstream)?;
        Ok(())
    }

    fn list_tasks(&self, task_type: TaskType) -> Result<Vec<Task>> {
        self.read_all(task_table(task_type))
    }

    fn update_status(
        &self,
        task_type: TaskType,
        id: &str,
        from: TaskStatus,
        to: TaskStatus,
        patch: TaskPatch,
    ) -> Result<Task> {
        let wt = self.db.begin_write().map_err(DispatchError::upstream)?;
        let updated = {
            let mut table = wt
                .open_table(task_table(task_type))
                .map_err(DispatchError::upstream)?;
            let current: Option<Task> = match table.get(id).map_err(DispatchError::upstream)? {
                Some(v) => Some(serde_json::from_slice(v.value())?),
                None => None,
            };
            let mut task = match current {
                Some(t) if t.status == from => t,
                _ => return Err(DispatchError::Conflict(id.to_string())),
            };
            task.status = to;
            if let Some(worker_id) = patch.assigned_worker_id {
                task.assigned_worker_id = Some(worker_id);
            }
            task.updated_at = Utc::now();
            let value = serde_json::to_vec(&task)?;
            table
                .insert(id, value.as_slice())
                .map_err(DispatchError::upstream)?;
            task
        };
        wt.commit().map_err(DispatchError::upstream)?;
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// WorkerDirectory
// ---------------------------------------------------------------------------

impl WorkerDirectory for RedbStore {
    fn list_workers(&self, pool: WorkerPool) -> Result<Vec<Worker>> {
        self.read_all(worker_table(pool))
    }

    fn get_worker(&self, pool: WorkerPool, id: &str) -> Result<Worker> {
        self.read_one(worker_table(pool), id)?
            .ok_or_else(|| DispatchError::WorkerNotFound(id.to_string()))
    }

    fn upsert_worker(&self, worker: &Worker) -> Result<()> {
        let value = serde_json::to_vec(worker)?;
        let wt = self.db.begin_write().map_err(DispatchError::upstream)?;
        {
            let mut table = wt
                .open_table(worker_table(worker.pool))
                .map_err(DispatchError::upstream)?;
            table
                .insert(worker.id.as_str(), value.as_slice())
                .map_err(DispatchError::upstream)?;
        }
        wt.commit().map_err(DispatchError::upstream)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

impl AuditLog for RedbStore {
    fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        let value = serde_json::to_vec(entry)?;
        let wt = self.db.begin_write().map_err(DispatchError::upstream)?;
        {
            let mut meta = wt.open_table(META).map_err(DispatchError::upstream)?;
            let seq = meta
                .get(AUDIT_SEQ)
                .map_err(DispatchError::upstream)?
                .map(|v| v.value())
                .unwrap_or(0)
                + 1;
            meta.insert(AUDIT_SEQ, seq).map_err(DispatchError::upstream)?;

            let mut table = wt.open_table(AUDIT_LOG).map_err(DispatchError::upstream)?;
            let key = audit_key(entry, seq);
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(DispatchError::upstream)?;
        }
        wt.commit().map_err(DispatchError::upstream)?;
        Ok(())
    }

    fn query(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>> {
        let rt = self.db.begin_read().map_err(DispatchError::upstream)?;
        let table = rt.open_table(AUDIT_LOG).map_err(DispatchError::upstream)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(DispatchError::upstream)?.rev() {
            let (_, v) = entry.map_err(DispatchError::upstream)?;
            let entry: AuditLogEntry = serde_json::from_slice(v.value())?;
            if query.matches(&entry) {
                result.push(entry);
                if query.limit.is_some_and(|n| result.len() >= n) {
                    break;
                }
            }
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditEvent, StatusChangeEvent};
    use crate::types::DeliveryStatus;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, RedbStore) {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn status_entry(task_id: &str, to: &str) -> AuditLogEntry {
        AuditLogEntry::for_task(
            None,
            AuditEvent::TaskStatusChanged(StatusChangeEvent {
                task_id: task_id.into(),
                task_type: TaskType::Delivery,
                from_status: "pending".into(),
                to_status: to.into(),
            }),
        )
    }

    #[test]
    fn insert_and_get_task() {
        let (_dir, store) = open_tmp();
        let task = Task::new("T1", TaskType::Delivery, Some("A".into()));
        store.insert_task(&task).unwrap();
        assert_eq!(store.get_task(TaskType::Delivery, "T1").unwrap(), task);
        assert!(matches!(
            store.get_task(TaskType::Repair, "T1"),
            Err(DispatchError::TaskNotFound(_))
        ));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let (_dir, store) = open_tmp();
        let task = Task::new("T1", TaskType::Delivery, None);
        store.insert_task(&task).unwrap();
        assert!(store.insert_task(&task).is_err());
    }

    #[test]
    fn same_id_cannot_exist_under_two_task_types() {
        let (_dir, store) = open_tmp();
        store
            .insert_task(&Task::new("X1", TaskType::Delivery, Some("A".into())))
            .unwrap();
        let err = store
            .insert_task(&Task::new("X1", TaskType::Repair, Some("B".into())))
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        assert!(matches!(
            store.get_task(TaskType::Repair, "X1"),
            Err(DispatchError::TaskNotFound(_))
        ));
        assert_eq!(store.find_task("X1", None).unwrap().task_type, TaskType::Delivery);
    }

    #[test]
    fn find_task_searches_every_table_without_hint() {
        let (_dir, store) = open_tmp();
        store
            .insert_task(&Task::new("R1", TaskType::Repair, None))
            .unwrap();
        assert_eq!(store.find_task("R1", None).unwrap().task_type, TaskType::Repair);
        assert!(store.find_task("R1", Some(TaskType::Delivery)).is_err());
        assert!(store.find_task("nope", None).is_err());
    }

    #[test]
    fn update_status_is_conditional_on_from() {
        let (_dir, store) = open_tmp();
        store
            .insert_task(&Task::new("T1", TaskType::Delivery, None))
            .unwrap();
        let pending = TaskStatus::Delivery(DeliveryStatus::Pending);
        let delivering = TaskStatus::Delivery(DeliveryStatus::Delivering);

        let patch = TaskPatch {
            assigned_worker_id: Some("W1".into()),
        };
        let t = store
            .update_status(TaskType::Delivery, "T1", pending, delivering, patch)
            .unwrap();
        assert_eq!(t.assigned_worker_id.as_deref(), Some("W1"));

        // Second writer still believes the task is pending.
        let stale = store.update_status(
            TaskType::Delivery,
            "T1",
            pending,
            delivering,
            TaskPatch {
                assigned_worker_id: Some("W2".into()),
            },
        );
        assert!(matches!(stale, Err(DispatchError::Conflict(_))));
        let t = store.get_task(TaskType::Delivery, "T1").unwrap();
        assert_eq!(t.assigned_worker_id.as_deref(), Some("W1"));
    }

    #[test]
    fn update_status_on_missing_row_is_a_conflict() {
        let (_dir, store) = open_tmp();
        let r = store.update_status(
            TaskType::Delivery,
            "ghost",
            TaskStatus::Delivery(DeliveryStatus::Pending),
            TaskStatus::Delivery(DeliveryStatus::Delivering),
            TaskPatch::default(),
        );
        assert!(matches!(r, Err(DispatchError::Conflict(_))));
    }

    #[test]
    fn concurrent_updates_commit_exactly_once() {
        let (_dir, store) = open_tmp();
        let store = Arc::new(store);
        store
            .insert_task(&Task::new("T1", TaskType::Delivery, None))
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .update_status(
                            TaskType::Delivery,
                            "T1",
                            TaskStatus::Delivery(DeliveryStatus::Pending),
                            TaskStatus::Delivery(DeliveryStatus::Delivering),
                            TaskPatch {
                                assigned_worker_id: Some(format!("W{i}")),
                            },
                        )
                        .is_ok()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn workers_upsert_and_list_in_id_order() {
        let (_dir, store) = open_tmp();
        store
            .upsert_worker(&Worker::new("W2", WorkerPool::Driver, None))
            .unwrap();
        store
            .upsert_worker(&Worker::new("W1", WorkerPool::Driver, None))
            .unwrap();
        store
            .upsert_worker(&Worker::new("X1", WorkerPool::Technician, None))
            .unwrap();
        let ids: Vec<_> = store
            .list_workers(WorkerPool::Driver)
            .unwrap()
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(ids, vec!["W1", "W2"]);
        assert!(store.get_worker(WorkerPool::Technician, "W1").is_err());
    }

    #[test]
    fn audit_query_is_newest_first_within_same_millisecond() {
        let (_dir, store) = open_tmp();
        let first = status_entry("T1", "delivering");
        let mut second = status_entry("T1", "completed");
        second.created_at = first.created_at;
        store.append(&first).unwrap();
        store.append(&second).unwrap();
        store.append(&status_entry("T2", "delivering")).unwrap();

        let found = store
            .query(&AuditQuery::for_task("T1", AuditAction::replay_set()))
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, second.id);
        assert_eq!(found[1].id, first.id);
    }

    #[test]
    fn audit_query_respects_limit() {
        let (_dir, store) = open_tmp();
        for _ in 0..5 {
            store.append(&status_entry("T1", "delivering")).unwrap();
        }
        let q = AuditQuery {
            limit: Some(2),
            ..AuditQuery::default()
        };
        assert_eq!(store.query(&q).unwrap().len(), 2);
    }

    #[test]
    fn empty_audit_log_returns_empty() {
        let (_dir, store) = open_tmp();
        assert!(store.query(&AuditQuery::default()).unwrap().is_empty());
    }
}
