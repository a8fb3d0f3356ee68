//! Point-in-time dispatch metrics computed from the store and audit log.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::audit::{AuditEvent, AuditQuery};
use crate::error::Result;
use crate::store::{AuditLog, TaskStore};
use crate::types::TaskType;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraceMetrics {
    pub total: usize,
    pub failed: usize,
    /// Mean score of the selected worker over committed traces.
    pub mean_selected_score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchMetrics {
    /// task type -> status -> count
    pub tasks: BTreeMap<String, BTreeMap<String, usize>>,
    pub allocations: usize,
    pub status_changes: usize,
    pub decision_traces: TraceMetrics,
    pub learning_records: usize,
    /// Tasks holding a worker with no allocation entry in the audit log.
    pub audit_gaps: Vec<String>,
}

pub fn collect(tasks: &dyn TaskStore, audit: &dyn AuditLog) -> Result<DispatchMetrics> {
    let mut m = DispatchMetrics::default();

    let mut allocated_ids = HashSet::new();
    let mut selected_scores = Vec::new();
    for entry in audit.query(&AuditQuery::default())? {
        match &entry.event {
            AuditEvent::DispatchAllocate(e) => {
                m.allocations += 1;
                allocated_ids.insert(e.task_id.clone());
            }
            AuditEvent::DecisionTrace(t) => {
                m.decision_traces.total += 1;
                if !t.outcome.committed {
                    m.decision_traces.failed += 1;
                    continue;
                }
                let selected = t
                    .selected_worker_id
                    .as_deref()
                    .and_then(|w| t.scores.iter().find(|s| s.worker_id == w));
                if let Some(s) = selected {
                    selected_scores.push(s.score);
                }
            }
            AuditEvent::LearningRecord(_) => m.learning_records += 1,
            AuditEvent::TaskStatusChanged(_) => m.status_changes += 1,
        }
    }
    if !selected_scores.is_empty() {
        let mean = selected_scores.iter().sum::<f64>() / selected_scores.len() as f64;
        m.decision_traces.mean_selected_score = Some((mean * 10_000.0).round() / 10_000.0);
    }

    for &task_type in TaskType::all() {
        let by_status = m.tasks.entry(task_type.as_str().to_string()).or_default();
        for task in tasks.list_tasks(task_type)? {
            *by_status.entry(task.status.as_str().to_string()).or_default() += 1;
            if task.assigned_worker_id.is_some() && !allocated_ids.contains(&task.id) {
                m.audit_gaps.push(task.id);
            }
        }
    }

    if !m.audit_gaps.is_empty() {
        tracing::warn!(count = m.audit_gaps.len(), "allocated tasks missing audit entries");
    }
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{AllocationRequest, AllocationService};
    use crate::identity::TenantScope;
    use crate::store::{RedbStore, WorkerDirectory};
    use crate::task::{Task, TaskPatch};
    use crate::types::WorkerPool;
    use crate::worker::Worker;
    use tempfile::TempDir;

    #[test]
    fn counts_tasks_and_flags_gaps() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("m.db")).unwrap();
        store
            .upsert_worker(&Worker::new("W1", WorkerPool::Driver, None))
            .unwrap();
        for id in ["T1", "T2", "T3"] {
            store
                .insert_task(&Task::new(id, TaskType::Delivery, None))
                .unwrap();
        }
        store
            .insert_task(&Task::new("R1", TaskType::Repair, None))
            .unwrap();

        AllocationService::new(&store, &store, &store)
            .allocate(AllocationRequest {
                task_id: "T1".into(),
                worker_id: "W1".into(),
                scope: TenantScope::Platform,
                actor_id: None,
                task_type: None,
                decision_trace: None,
            })
            .unwrap();

        // Written behind the service's back: no audit entry.
        let t2 = store.get_task(TaskType::Delivery, "T2").unwrap();
        store
            .update_status(
                TaskType::Delivery,
                "T2",
                t2.status,
                TaskType::Delivery.allocated_status(),
                TaskPatch {
                    assigned_worker_id: Some("W1".into()),
                },
            )
            .unwrap();

        let m = collect(&store, &store).unwrap();
        assert_eq!(m.tasks["delivery"]["delivering"], 2);
        assert_eq!(m.tasks["delivery"]["pending"], 1);
        assert_eq!(m.tasks["repair"]["pending"], 1);
        assert_eq!(m.allocations, 1);
        assert_eq!(m.audit_gaps, vec!["T2"]);
        assert_eq!(m.decision_traces.total, 0);
        assert!(m.decision_traces.mean_selected_score.is_none());
    }

    #[test]
    fn empty_store_has_zeroed_metrics() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("e.db")).unwrap();
        let m = collect(&store, &store).unwrap();
        assert!(m.tasks["delivery"].is_empty());
        assert_eq!(m.allocations, 0);
        assert!(m.audit_gaps.is_empty());
    }
}
