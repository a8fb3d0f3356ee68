//! Builds scoring contexts from stored tasks and workers.

use std::collections::HashMap;

use crate::error::{DispatchError, Result};
use crate::matcher::Candidate;
use crate::store::{TaskStore, WorkerDirectory};
use crate::strategy::{TaskContext, WorkerContext};
use crate::task::Task;

pub fn task_context(task: &Task) -> TaskContext {
    TaskContext {
        task_id: Some(task.id.clone()),
        task_type: Some(task.task_type),
        zone: task.zone.clone(),
        required_skills: task.required_skills.clone(),
    }
}

/// One context per candidate, in candidate order.
///
/// Load is the number of non-terminal tasks of the same type currently held
/// by the worker. Candidates missing from the directory get a bare context.
pub fn worker_contexts(
    tasks: &dyn TaskStore,
    workers: &dyn WorkerDirectory,
    task: &Task,
    candidates: &[Candidate],
) -> Result<Vec<WorkerContext>> {
    let mut load: HashMap<String, u32> = HashMap::new();
    for t in tasks.list_tasks(task.task_type)? {
        if t.status.is_terminal() {
            continue;
        }
        if let Some(w) = t.assigned_worker_id {
            *load.entry(w).or_default() += 1;
        }
    }

    let pool = task.task_type.pool();
    let mut out = Vec::with_capacity(candidates.len());
    for c in candidates {
        let mut ctx = match workers.get_worker(pool, &c.worker_id) {
            Ok(w) => WorkerContext {
                worker_id: w.id,
                rating: w.rating,
                active_assignments: 0,
                completed_tasks: w.completed_tasks,
                zone: w.zone,
                skills: w.skills,
            },
            Err(DispatchError::WorkerNotFound(_)) => WorkerContext::new(c.worker_id.clone()),
            Err(e) => return Err(e),
        };
        ctx.active_assignments = load.get(&c.worker_id).copied().unwrap_or(0);
        out.push(ctx);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RedbStore;
    use crate::task::TaskPatch;
    use crate::types::{DeliveryStatus, TaskStatus, TaskType, WorkerPool};
    use crate::worker::Worker;
    use tempfile::TempDir;

    fn candidate(worker_id: &str) -> Candidate {
        Candidate {
            worker_id: worker_id.into(),
            task_id: "T1".into(),
            reason: "test".into(),
            secondary_factors: vec![],
        }
    }

    #[test]
    fn load_counts_only_open_assignments() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("c.db")).unwrap();
        store
            .upsert_worker(&Worker::new("W1", WorkerPool::Driver, None).with_rating(4.5))
            .unwrap();
        let pending = TaskStatus::Delivery(DeliveryStatus::Pending);
        let delivering = TaskStatus::Delivery(DeliveryStatus::Delivering);
        let completed = TaskStatus::Delivery(DeliveryStatus::Completed);
        for id in ["A", "B"] {
            store
                .insert_task(&Task::new(id, TaskType::Delivery, None))
                .unwrap();
            store
                .update_status(
                    TaskType::Delivery,
                    id,
                    pending,
                    delivering,
                    TaskPatch {
                        assigned_worker_id: Some("W1".into()),
                    },
                )
                .unwrap();
        }
        store
            .update_status(TaskType::Delivery, "B", delivering, completed, TaskPatch::default())
            .unwrap();

        let task = Task::new("T1", TaskType::Delivery, None);
        let ctx = worker_contexts(&store, &store, &task, &[candidate("W1"), candidate("ghost")])
            .unwrap();
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx[0].active_assignments, 1);
        assert_eq!(ctx[0].rating, Some(4.5));
        assert_eq!(ctx[1].worker_id, "ghost");
        assert_eq!(ctx[1].active_assignments, 0);
    }

    #[test]
    fn task_context_copies_matching_fields() {
        let task = Task::new("R1", TaskType::Repair, None)
            .with_zone("east")
            .with_skills(vec!["fryer".into()]);
        let ctx = task_context(&task);
        assert_eq!(ctx.task_id.as_deref(), Some("R1"));
        assert_eq!(ctx.zone.as_deref(), Some("east"));
        assert_eq!(ctx.required_skills, vec!["fryer"]);
    }
}
