//! Candidate matching: which workers may take a task.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identity::TenantScope;
use crate::store::{TaskStore, WorkerDirectory};
use crate::types::TaskType;
use crate::worker::Worker;

/// A worker proposed for a task, prior to scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub worker_id: String,
    pub task_id: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_factors: Vec<String>,
}

pub struct CandidateMatcher<'a> {
    tasks: &'a dyn TaskStore,
    workers: &'a dyn WorkerDirectory,
}

impl<'a> CandidateMatcher<'a> {
    pub fn new(tasks: &'a dyn TaskStore, workers: &'a dyn WorkerDirectory) -> Self {
        Self { tasks, workers }
    }

    /// Eligible workers for `task_id`, in the pool's storage order.
    ///
    /// A task outside the caller's tenant yields an empty list rather than an
    /// error, so the response never reveals another tenant's workers.
    pub fn match_candidates(
        &self,
        task_id: &str,
        scope: &TenantScope,
        task_type: Option<TaskType>,
    ) -> Result<Vec<Candidate>> {
        let task = self.tasks.find_task(task_id, task_type)?;
        if !scope.allows(task.tenant_id.as_deref()) {
            tracing::warn!(
                task_id,
                scope = ?scope,
                "match requested for task outside caller tenant"
            );
            return Ok(Vec::new());
        }

        let pool = task.task_type.pool();
        let candidates: Vec<Candidate> = self
            .workers
            .list_workers(pool)?
            .into_iter()
            .filter(|w| w.active && scope.allows(w.tenant_id.as_deref()))
            .map(|w| Candidate {
                reason: candidate_reason(&w, scope),
                secondary_factors: secondary_factors(&w, task.zone.as_deref()),
                worker_id: w.id,
                task_id: task.id.clone(),
            })
            .collect();

        tracing::debug!(
            task_id,
            pool = %pool,
            count = candidates.len(),
            "matched candidates"
        );
        Ok(candidates)
    }
}

fn candidate_reason(worker: &Worker, scope: &TenantScope) -> String {
    match (scope, worker.tenant_id.as_deref()) {
        (TenantScope::Tenant(t), _) => format!("active {} in tenant {t}", worker.pool),
        (TenantScope::Platform, Some(t)) => {
            format!("active {} in tenant {t} (platform scope)", worker.pool)
        }
        (TenantScope::Platform, None) => format!("active platform {}", worker.pool),
    }
}

fn secondary_factors(worker: &Worker, task_zone: Option<&str>) -> Vec<String> {
    let mut factors = Vec::new();
    if let (Some(wz), Some(tz)) = (worker.zone.as_deref(), task_zone) {
        if wz.eq_ignore_ascii_case(tz) {
            factors.push(format!("same_zone:{tz}"));
        }
    }
    if let Some(r) = worker.rating {
        factors.push(format!("rating:{r:.1}"));
    }
    if worker.completed_tasks > 0 {
        factors.push(format!("completed:{}", worker.completed_tasks));
    }
    factors
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::store::RedbStore;
    use crate::task::Task;
    use crate::types::WorkerPool;
    use tempfile::TempDir;

    fn seeded() -> (TempDir, RedbStore) {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("m.db")).unwrap();
        store
            .insert_task(&Task::new("T1", TaskType::Delivery, Some("A".into())).with_zone("north"))
            .unwrap();
        store
            .insert_task(&Task::new("R1", TaskType::Repair, Some("A".into())))
            .unwrap();
        for w in [
            Worker::new("W1", WorkerPool::Driver, Some("A".into())).with_zone("north"),
            Worker::new("W2", WorkerPool::Driver, Some("A".into())).with_rating(4.0),
            Worker::new("W3", WorkerPool::Driver, Some("B".into())),
            Worker::new("W4", WorkerPool::Driver, Some("A".into())).inactive(),
            Worker::new("X1", WorkerPool::Technician, Some("A".into())),
        ] {
            store.upsert_worker(&w).unwrap();
        }
        (dir, store)
    }

    fn ids(c: &[Candidate]) -> Vec<&str> {
        c.iter().map(|c| c.worker_id.as_str()).collect()
    }

    #[test]
    fn tenant_scope_sees_only_own_active_workers() {
        let (_dir, store) = seeded();
        let m = CandidateMatcher::new(&store, &store);
        let c = m
            .match_candidates("T1", &TenantScope::Tenant("A".into()), None)
            .unwrap();
        assert_eq!(ids(&c), vec!["W1", "W2"]);
        assert!(c[0].secondary_factors.contains(&"same_zone:north".to_string()));
    }

    #[test]
    fn platform_scope_sees_all_tenants() {
        let (_dir, store) = seeded();
        let m = CandidateMatcher::new(&store, &store);
        let c = m
            .match_candidates("T1", &TenantScope::Platform, Some(TaskType::Delivery))
            .unwrap();
        assert_eq!(ids(&c), vec!["W1", "W2", "W3"]);
    }

    #[test]
    fn repair_tasks_use_technician_pool() {
        let (_dir, store) = seeded();
        let m = CandidateMatcher::new(&store, &store);
        let c = m
            .match_candidates("R1", &TenantScope::Platform, None)
            .unwrap();
        assert_eq!(ids(&c), vec!["X1"]);
    }

    #[test]
    fn cross_tenant_task_yields_no_candidates() {
        let (_dir, store) = seeded();
        let m = CandidateMatcher::new(&store, &store);
        let c = m
            .match_candidates("T1", &TenantScope::Tenant("B".into()), None)
            .unwrap();
        assert!(c.is_empty());
    }

    #[test]
    fn empty_pool_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("e.db")).unwrap();
        store
            .insert_task(&Task::new("T1", TaskType::Delivery, None))
            .unwrap();
        let m = CandidateMatcher::new(&store, &store);
        assert!(m
            .match_candidates("T1", &TenantScope::Platform, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn unknown_task_is_not_found() {
        let (_dir, store) = seeded();
        let m = CandidateMatcher::new(&store, &store);
        let err = m
            .match_candidates("nope", &TenantScope::Platform, None)
            .unwrap_err();
        assert!(matches!(err, DispatchError::TaskNotFound(_)));
    }
}
