//! Persistence seams: tasks, workers, and the audit ledger.
//!
//! The services in this crate only see these traits. [`RedbStore`] is the
//! embedded implementation used by the server and CLI; it stands in for the
//! hosted datastore and preserves its one concurrency primitive, the
//! conditional status update.

pub mod db;

pub use db::RedbStore;

use crate::audit::{AuditLogEntry, AuditQuery};
use crate::error::{DispatchError, Result};
use crate::task::{Task, TaskPatch};
use crate::types::{TaskStatus, TaskType, WorkerPool};
use crate::worker::Worker;

pub trait TaskStore: Send + Sync {
    fn get_task(&self, task_type: TaskType, id: &str) -> Result<Task>;

    fn insert_task(&self, task: &Task) -> Result<()>;

    /// Tasks of one type in storage order.
    fn list_tasks(&self, task_type: TaskType) -> Result<Vec<Task>>;

    /// Compare-and-swap on `status`.
    ///
    /// Writes `to` (plus `patch`) only when the stored status still equals
    /// `from`. Returns [`DispatchError::Conflict`] when zero rows match, either
    /// because another writer moved the status or the row is gone.
    fn update_status(
        &self,
        task_type: TaskType,
        id: &str,
        from: TaskStatus,
        to: TaskStatus,
        patch: TaskPatch,
    ) -> Result<Task>;

    /// Look up a task by id, in the hinted table or in every table.
    fn find_task(&self, id: &str, hint: Option<TaskType>) -> Result<Task> {
        let types: &[TaskType] = match &hint {
            Some(t) => std::slice::from_ref(t),
            None => TaskType::all(),
        };
        for &t in types {
            match self.get_task(t, id) {
                Ok(task) => return Ok(task),
                Err(DispatchError::TaskNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(DispatchError::TaskNotFound(id.to_string()))
    }
}

pub trait WorkerDirectory: Send + Sync {
    /// Workers of one pool in storage order.
    fn list_workers(&self, pool: WorkerPool) -> Result<Vec<Worker>>;

    fn get_worker(&self, pool: WorkerPool, id: &str) -> Result<Worker>;

    fn upsert_worker(&self, worker: &Worker) -> Result<()>;
}

pub trait AuditLog: Send + Sync {
    fn append(&self, entry: &AuditLogEntry) -> Result<()>;

    /// Matching entries, newest first.
    fn query(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>>;
}
