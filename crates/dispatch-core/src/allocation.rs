//! Committing workers to tasks and advancing task status.
//!
//! This service is the only writer of `status` and `assigned_worker_id`.
//! Every write goes through [`TaskStore::update_status`], whose
//! compare-and-swap is what guarantees a single winner per task. A lost race
//! is reported as `AlreadyAllocated` and never retried here.

use serde::Serialize;

use crate::audit::{AllocationEvent, AuditEvent, AuditLogEntry, StatusChangeEvent};
use crate::error::{DispatchError, Result};
use crate::identity::TenantScope;
use crate::store::{AuditLog, TaskStore, WorkerDirectory};
use crate::task::{Task, TaskPatch};
use crate::transition::ensure_transition;
use crate::types::{TaskStatus, TaskType};

#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub task_id: String,
    pub worker_id: String,
    pub scope: TenantScope,
    pub actor_id: Option<String>,
    pub task_type: Option<TaskType>,
    pub decision_trace: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationResult {
    /// Backing table of the allocated task.
    pub table: String,
    pub committed: bool,
    pub task: Task,
}

#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub task_id: String,
    pub scope: TenantScope,
    pub actor_id: Option<String>,
    pub task_type: Option<TaskType>,
    /// Raw status text; parsed against the task's own vocabulary.
    pub target: String,
}

pub struct AllocationService<'a> {
    tasks: &'a dyn TaskStore,
    workers: &'a dyn WorkerDirectory,
    audit: &'a dyn AuditLog,
}

impl<'a> AllocationService<'a> {
    pub fn new(
        tasks: &'a dyn TaskStore,
        workers: &'a dyn WorkerDirectory,
        audit: &'a dyn AuditLog,
    ) -> Self {
        Self {
            tasks,
            workers,
            audit,
        }
    }

    pub fn allocate(&self, req: AllocationRequest) -> Result<AllocationResult> {
        let task = self.tasks.find_task(&req.task_id, req.task_type)?;

        if !req.scope.allows(task.tenant_id.as_deref()) {
            return Err(DispatchError::Forbidden(format!(
                "task {} belongs to another tenant",
                task.id
            )));
        }

        if task.assigned_worker_id.is_some() {
            return Err(DispatchError::AlreadyAllocated(task.id.clone()));
        }
        let from = task.status;
        let to = task.task_type.allocated_status();
        ensure_transition(from, to)?;

        let worker = self.workers.get_worker(task.task_type.pool(), &req.worker_id)?;
        if !req.scope.allows(worker.tenant_id.as_deref()) {
            return Err(DispatchError::Forbidden(format!(
                "worker {} belongs to another tenant",
                worker.id
            )));
        }

        let patch = TaskPatch {
            assigned_worker_id: Some(worker.id.clone()),
        };
        let updated = match self
            .tasks
            .update_status(task.task_type, &task.id, from, to, patch)
        {
            Ok(t) => t,
            Err(DispatchError::Conflict(id)) => {
                tracing::info!(task_id = %id, worker_id = %worker.id, "allocation lost race");
                return Err(DispatchError::AlreadyAllocated(id));
            }
            Err(e) => return Err(e),
        };

        let table = task.task_type.table().to_string();
        tracing::info!(
            task_id = %updated.id,
            worker_id = %worker.id,
            table = %table,
            status = %to,
            "task allocated"
        );

        self.record(
            req.actor_id,
            AuditEvent::DispatchAllocate(AllocationEvent {
                task_id: updated.id.clone(),
                task_type: updated.task_type,
                worker_id: worker.id,
                table: table.clone(),
                from_status: from.to_string(),
                to_status: to.to_string(),
                decision_trace: req.decision_trace,
            }),
        );

        Ok(AllocationResult {
            table,
            committed: true,
            task: updated,
        })
    }

    /// Move a task along its lifecycle graph.
    ///
    /// Entering the post-allocation status requires a worker already on the
    /// task; fresh assignments must go through [`Self::allocate`].
    pub fn transition(&self, req: TransitionRequest) -> Result<Task> {
        let task = self.tasks.find_task(&req.task_id, req.task_type)?;
        if !req.scope.allows(task.tenant_id.as_deref()) {
            return Err(DispatchError::Forbidden(format!(
                "task {} belongs to another tenant",
                task.id
            )));
        }

        let from = task.status;
        let to = TaskStatus::parse(task.task_type, &req.target)?;
        ensure_transition(from, to)?;
        if to == task.task_type.allocated_status() && task.assigned_worker_id.is_none() {
            return Err(DispatchError::InvalidInput(format!(
                "task {} has no worker; allocate it instead",
                task.id
            )));
        }

        let updated = self
            .tasks
            .update_status(task.task_type, &task.id, from, to, TaskPatch::default())?;
        tracing::info!(task_id = %updated.id, from = %from, to = %to, "task status changed");

        self.record(
            req.actor_id,
            AuditEvent::TaskStatusChanged(StatusChangeEvent {
                task_id: updated.id.clone(),
                task_type: updated.task_type,
                from_status: from.to_string(),
                to_status: to.to_string(),
            }),
        );
        Ok(updated)
    }

    /// Best-effort audit append; the state change already committed.
    fn record(&self, actor_id: Option<String>, event: AuditEvent) {
        let entry = AuditLogEntry::for_task(actor_id, event);
        if let Err(e) = self.audit.append(&entry) {
            tracing::warn!(
                error = %e,
                action = %entry.action(),
                task_id = %entry.target_id,
                "audit append failed; state change kept"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
