//! The `dispatch` flow: match, evaluate, allocate.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::allocation::{AllocationRequest, AllocationService};
use crate::config::Config;
use crate::context::{task_context, worker_contexts};
use crate::error::{DispatchError, Result};
use crate::identity::TenantScope;
use crate::matcher::{Candidate, CandidateMatcher};
use crate::store::{AuditLog, TaskStore, WorkerDirectory};
use crate::strategy::{select_top, Score, StrategyEvaluator};
use crate::task::Task;
use crate::trace::{DecisionTrace, TraceOutcome, TraceRecorder};
use crate::types::TaskType;

use super::engine::{Engine, Flow, FlowEvent, FlowState};

pub const DISPATCH_FLOW: &str = "dispatch";
pub const DISPATCH_REQUESTED: &str = "dispatch.requested";

/// Everything the storage seams offer, behind one handle.
pub trait Backend: TaskStore + WorkerDirectory + AuditLog {}

impl<T: TaskStore + WorkerDirectory + AuditLog> Backend for T {}

/// Payload of a `dispatch.requested` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub task_id: String,
    pub scope: TenantScope,
    #[serde(default)]
    pub actor_id: Option<String>,
    /// Preferred worker; must be one of the candidates.
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub model_version: Option<String>,
    /// Pre-computed candidates; matching is skipped when present.
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
}

impl DispatchRequest {
    pub fn new(task_id: impl Into<String>, scope: TenantScope) -> Self {
        Self {
            task_id: task_id.into(),
            scope,
            actor_id: None,
            worker_id: None,
            task_type: None,
            model_version: None,
            candidates: None,
        }
    }

    fn from_event(event: &FlowEvent) -> Result<Self> {
        serde_json::from_value(event.payload.clone())
            .map_err(|e| DispatchError::InvalidInput(format!("dispatch payload: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Recommendation
// ---------------------------------------------------------------------------

/// Scored candidates for a task without committing anything.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub task_id: String,
    pub recommended_worker_id: Option<String>,
    pub reason: Option<String>,
    /// The strategy's top score, when there is one.
    pub platform_recommendation: Option<Score>,
    pub candidates: Vec<Candidate>,
    pub scores: Vec<Score>,
}

/// Match and score workers for `task_id`. Read-only.
pub fn recommend<S: Backend>(
    store: &S,
    evaluator: &StrategyEvaluator,
    task_id: &str,
    scope: &TenantScope,
    task_type: Option<TaskType>,
    model_version: Option<&str>,
) -> Result<Recommendation> {
    let task = store.find_task(task_id, task_type)?;
    let candidates =
        CandidateMatcher::new(store, store).match_candidates(task_id, scope, Some(task.task_type))?;
    let contexts = worker_contexts(store, store, &task, &candidates)?;
    let scores = evaluator.evaluate(&task_context(&task), &contexts, model_version);
    let top = select_top(&scores).cloned();
    Ok(Recommendation {
        task_id: task.id,
        recommended_worker_id: top.as_ref().map(|s| s.worker_id.clone()),
        reason: top.as_ref().map(|s| s.factors.primary_reason.clone()),
        platform_recommendation: top,
        candidates,
        scores,
    })
}

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

/// Build the `dispatch` flow over `store`.
///
/// State keys: `task`, `candidates`, `scores`, `model_version`,
/// `selected_worker_id`, `allocation`.
pub fn dispatch_flow<S: Backend + 'static>(store: Arc<S>, evaluator: StrategyEvaluator) -> Flow {
    let match_store = Arc::clone(&store);
    let eval_store = Arc::clone(&store);
    let alloc_store = store;

    Flow::new()
        .step(DISPATCH_REQUESTED, "match_candidates", move |state, event| {
            let req = DispatchRequest::from_event(event)?;
            let task = match_store.find_task(&req.task_id, req.task_type)?;
            if !req.scope.allows(task.tenant_id.as_deref()) {
                return Err(DispatchError::Forbidden(format!(
                    "task {} belongs to another tenant",
                    task.id
                )));
            }
            state.put("task", &task)?;

            let candidates = match req.candidates {
                Some(c) => {
                    tracing::debug!(task_id = %task.id, count = c.len(), "using supplied candidates");
                    c
                }
                None => CandidateMatcher::new(&*match_store, &*match_store).match_candidates(
                    &task.id,
                    &req.scope,
                    Some(task.task_type),
                )?,
            };
            state.put("candidates", &candidates)
        })
        .step(DISPATCH_REQUESTED, "evaluate", move |state, event| {
            let req = DispatchRequest::from_event(event)?;
            let task: Task = state.get("task")?;
            let candidates: Vec<Candidate> = state.get("candidates")?;
            if candidates.is_empty() {
                return Err(DispatchError::NoCandidates(task.id));
            }

            let contexts = worker_contexts(&*eval_store, &*eval_store, &task, &candidates)?;
            let version = evaluator.resolve(req.model_version.as_deref());
            let scores = evaluator.evaluate(
                &task_context(&task),
                &contexts,
                Some(version.as_str()),
            );
            state.put("scores", &scores)?;
            state.put("model_version", &version.as_str())?;

            let selected = match req.worker_id {
                Some(w) if candidates.iter().any(|c| c.worker_id == w) => w,
                Some(w) => {
                    return Err(DispatchError::WorkerNotEligible {
                        task_id: task.id,
                        worker_id: w,
                    })
                }
                None => select_top(&scores)
                    .map(|s| s.worker_id.clone())
                    .ok_or_else(|| DispatchError::NoCandidates(task.id.clone()))?,
            };
            state.put("selected_worker_id", &selected)
        })
        .step(DISPATCH_REQUESTED, "allocate", move |state, event| {
            let req = DispatchRequest::from_event(event)?;
            let task: Task = state.get("task")?;
            let worker_id: String = state.get("selected_worker_id")?;
            let trace_so_far = serde_json::json!({
                "candidates": state.data.get("candidates"),
                "scores": state.data.get("scores"),
                "model_version": state.data.get("model_version"),
                "selected_worker_id": worker_id,
            });

            let result = AllocationService::new(&*alloc_store, &*alloc_store, &*alloc_store)
                .allocate(AllocationRequest {
                    task_id: task.id,
                    worker_id,
                    scope: req.scope,
                    actor_id: req.actor_id,
                    task_type: Some(task.task_type),
                    decision_trace: Some(trace_so_far),
                })?;
            state.put(
                "allocation",
                &serde_json::json!({ "committed": result.committed, "table": result.table }),
            )?;
            state.put("task", &result.task)
        })
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Runs the dispatch flow and records a decision trace for each run.
pub struct Dispatcher<S> {
    store: Arc<S>,
    engine: Engine,
    evaluator: StrategyEvaluator,
    record_failed: bool,
}

impl<S: Backend + 'static> Dispatcher<S> {
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        let evaluator = StrategyEvaluator::new(&config.strategy.default_model_version);
        let mut engine = Engine::new(config.orchestration.flow_timeout());
        engine.register_flow(
            DISPATCH_FLOW,
            dispatch_flow(Arc::clone(&store), evaluator.clone()),
        );
        Self {
            store,
            engine,
            evaluator,
            record_failed: config.orchestration.record_failed_traces,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn evaluator(&self) -> &StrategyEvaluator {
        &self.evaluator
    }

    pub fn recommend(
        &self,
        task_id: &str,
        scope: &TenantScope,
        task_type: Option<TaskType>,
        model_version: Option<&str>,
    ) -> Result<Recommendation> {
        recommend(
            &*self.store,
            &self.evaluator,
            task_id,
            scope,
            task_type,
            model_version,
        )
    }

    /// Run one dispatch. Flow failures come back inside the state.
    ///
    /// A trace is recorded once the task has been loaded in scope: always on
    /// commit, and on failure unless `record_failed_traces` is off.
    pub fn dispatch(&self, req: DispatchRequest) -> Result<FlowState> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let event = FlowEvent::new(DISPATCH_REQUESTED, serde_json::to_value(&req)?);
        let state = self.engine.on_event(DISPATCH_FLOW, &event)?;

        let Some(task) = state.get_opt::<Task>("task")? else {
            return Ok(state);
        };
        // A run can time out after the allocate step committed.
        let committed = state
            .data
            .get("allocation")
            .and_then(|a| a["committed"].as_bool())
            .unwrap_or(false);
        if committed || self.record_failed {
            let trace = DecisionTrace {
                task_id: task.id.clone(),
                task_type: Some(task.task_type),
                tenant_id: task.tenant_id.clone(),
                flow: DISPATCH_FLOW.to_string(),
                candidates: state.get_opt("candidates")?.unwrap_or_default(),
                scores: state.get_opt("scores")?.unwrap_or_default(),
                selected_worker_id: state.get_opt("selected_worker_id")?,
                model_version: state.get_opt("model_version")?,
                outcome: TraceOutcome {
                    committed,
                    table: committed.then(|| task.task_type.table().to_string()),
                    error: state.error.clone(),
                },
                started_at,
                duration_ms: clock.elapsed().as_millis() as u64,
            };
            TraceRecorder::new(&*self.store).record(trace, req.actor_id.clone());
        }

        if committed {
            tracing::info!(task_id = %task.id, "dispatch committed");
        }
        Ok(state)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditEvent};
    use crate::store::RedbStore;
    use crate::trace::replay_task;
    use crate::types::{DeliveryStatus, TaskStatus, WorkerPool};
    use crate::worker::Worker;
    use tempfile::TempDir;

    /// T1 (delivery, tenant A) and T2 (delivery, tenant B); drivers W1 and
    /// W2 in tenant A, W1 clearly the stronger match.
    fn seeded() -> (TempDir, Arc<RedbStore>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RedbStore::open(&dir.path().join("d.db")).unwrap());
        store
            .insert_task(&Task::new("T1", TaskType::Delivery, Some("A".into())).with_zone("north"))
            .unwrap();
        store
            .insert_task(&Task::new("T2", TaskType::Delivery, Some("B".into())))
            .unwrap();
        store
            .upsert_worker(
                &Worker::new("W1", WorkerPool::Driver, Some("A".into()))
                    .with_rating(4.8)
                    .with_zone("north")
                    .with_completed(40),
            )
            .unwrap();
        store
            .upsert_worker(
                &Worker::new("W2", WorkerPool::Driver, Some("A".into()))
                    .with_rating(2.5)
                    .with_zone("south"),
            )
            .unwrap();
        (dir, store)
    }

    fn tenant(t: &str) -> TenantScope {
        TenantScope::Tenant(t.into())
    }

    #[test]
    fn dispatch_selects_best_worker_and_allocates() {
        let (_dir, store) = seeded();
        let d = Dispatcher::new(Arc::clone(&store), &Config::default());

        let state = d.dispatch(DispatchRequest::new("T1", tenant("A"))).unwrap();
        assert!(state.is_ok(), "{:?}", state.error);
        assert_eq!(
            state.completed_steps,
            vec!["match_candidates", "evaluate", "allocate"]
        );
        assert_eq!(state.data["selected_worker_id"], "W1");
        assert_eq!(state.data["allocation"]["table"], "delivery_tasks");

        let scores: Vec<Score> = state.get("scores").unwrap();
        assert_eq!(scores[0].worker_id, "W1");
        assert!(scores[0].score > scores[1].score);

        let task = store.get_task(TaskType::Delivery, "T1").unwrap();
        assert_eq!(task.status, TaskStatus::Delivery(DeliveryStatus::Delivering));
        assert_eq!(task.assigned_worker_id.as_deref(), Some("W1"));
    }

    #[test]
    fn repeat_dispatch_reports_already_allocated() {
        let (_dir, store) = seeded();
        let d = Dispatcher::new(Arc::clone(&store), &Config::default());
        d.dispatch(DispatchRequest::new("T1", tenant("A"))).unwrap();

        let mut again = DispatchRequest::new("T1", tenant("A"));
        again.worker_id = Some("W2".into());
        let state = d.dispatch(again).unwrap();
        let err = state.error.unwrap();
        assert_eq!(err.step.as_deref(), Some("allocate"));
        assert_eq!(err.code, "already_allocated");

        let task = store.get_task(TaskType::Delivery, "T1").unwrap();
        assert_eq!(task.assigned_worker_id.as_deref(), Some("W1"));
    }

    #[test]
    fn failed_repeat_does_not_replace_the_committed_decision() {
        let (_dir, store) = seeded();
        let d = Dispatcher::new(Arc::clone(&store), &Config::default());
        d.dispatch(DispatchRequest::new("T1", tenant("A"))).unwrap();

        let mut again = DispatchRequest::new("T1", tenant("A"));
        again.worker_id = Some("W2".into());
        let state = d.dispatch(again).unwrap();
        assert_eq!(state.error.unwrap().code, "already_allocated");

        let replay = replay_task(&*store, "T1").unwrap();
        let trace = replay.trace().unwrap();
        assert!(trace.outcome.committed);
        assert_eq!(trace.selected_worker_id.as_deref(), Some("W1"));

        let traces = replay
            .all_related
            .iter()
            .filter(|e| e.action() == AuditAction::DecisionTrace)
            .count();
        assert_eq!(traces, 2);
    }

    #[test]
    fn cross_tenant_dispatch_is_forbidden_without_side_effects() {
        let (_dir, store) = seeded();
        let d = Dispatcher::new(Arc::clone(&store), &Config::default());

        let state = d.dispatch(DispatchRequest::new("T2", tenant("A"))).unwrap();
        assert_eq!(state.error.unwrap().code, "forbidden");
        assert!(state.data.is_empty());

        let task = store.get_task(TaskType::Delivery, "T2").unwrap();
        assert!(task.assigned_worker_id.is_none());
        assert!(replay_task(&*store, "T2").unwrap().all_related.is_empty());
    }

    #[test]
    fn replay_after_dispatch_shows_selected_worker() {
        let (_dir, store) = seeded();
        let d = Dispatcher::new(Arc::clone(&store), &Config::default());
        let mut req = DispatchRequest::new("T1", tenant("A"));
        req.actor_id = Some("user-1".into());
        d.dispatch(req).unwrap();

        let replay = replay_task(&*store, "T1").unwrap();
        let trace = replay.trace().unwrap();
        assert_eq!(trace.selected_worker_id.as_deref(), Some("W1"));
        assert!(trace.outcome.committed);
        assert_eq!(trace.candidates.len(), 2);
        assert_eq!(
            replay.decision_trace.as_ref().unwrap().actor_id.as_deref(),
            Some("user-1")
        );
        let actions: Vec<AuditAction> = replay.all_related.iter().map(|e| e.action()).collect();
        assert_eq!(
            actions,
            vec![AuditAction::DecisionTrace, AuditAction::DispatchAllocate]
        );
    }

    #[test]
    fn ineligible_worker_fails_evaluate_and_records_failed_trace() {
        let (_dir, store) = seeded();
        let d = Dispatcher::new(Arc::clone(&store), &Config::default());
        let mut req = DispatchRequest::new("T1", tenant("A"));
        req.worker_id = Some("W9".into());

        let state = d.dispatch(req).unwrap();
        let err = state.error.clone().unwrap();
        assert_eq!(err.code, "worker_not_eligible");
        assert_eq!(err.step.as_deref(), Some("evaluate"));
        assert!(state.data.contains_key("scores"));

        let replay = replay_task(&*store, "T1").unwrap();
        assert!(replay.decision_trace.is_none());
        let failed = replay
            .all_related
            .iter()
            .find_map(|e| match &e.event {
                AuditEvent::DecisionTrace(t) => Some(t.clone()),
                _ => None,
            })
            .unwrap();
        assert!(!failed.outcome.committed);
        assert_eq!(failed.outcome.error.unwrap().code, "worker_not_eligible");
        assert!(store
            .get_task(TaskType::Delivery, "T1")
            .unwrap()
            .assigned_worker_id
            .is_none());
    }

    #[test]
    fn failed_traces_can_be_switched_off() {
        let (_dir, store) = seeded();
        let mut config = Config::default();
        config.orchestration.record_failed_traces = false;
        let d = Dispatcher::new(Arc::clone(&store), &config);
        let mut req = DispatchRequest::new("T1", tenant("A"));
        req.worker_id = Some("W9".into());
        d.dispatch(req).unwrap();
        assert!(replay_task(&*store, "T1").unwrap().all_related.is_empty());
    }

    #[test]
    fn run_past_the_bound_stops_before_allocating() {
        let (_dir, store) = seeded();
        let mut config = Config::default();
        config.orchestration.flow_timeout_secs = 0;
        let d = Dispatcher::new(Arc::clone(&store), &config);

        let state = d.dispatch(DispatchRequest::new("T1", tenant("A"))).unwrap();
        let err = state.error.unwrap();
        assert_eq!(err.code, "timeout");
        assert_eq!(err.step.as_deref(), Some("match_candidates"));
        assert_eq!(state.completed_steps, vec!["match_candidates"]);
        assert!(store
            .get_task(TaskType::Delivery, "T1")
            .unwrap()
            .assigned_worker_id
            .is_none());
        assert!(replay_task(&*store, "T1").unwrap().decision_trace.is_none());
    }

    #[test]
    fn empty_pool_fails_with_no_candidates() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RedbStore::open(&dir.path().join("e.db")).unwrap());
        store
            .insert_task(&Task::new("R1", TaskType::Repair, None))
            .unwrap();
        let d = Dispatcher::new(Arc::clone(&store), &Config::default());
        let state = d
            .dispatch(DispatchRequest::new("R1", TenantScope::Platform))
            .unwrap();
        assert_eq!(state.error.unwrap().code, "no_candidates");
        assert_eq!(state.data["candidates"], serde_json::json!([]));
    }

    #[test]
    fn supplied_candidates_skip_matching() {
        let (_dir, store) = seeded();
        let d = Dispatcher::new(Arc::clone(&store), &Config::default());
        let mut req = DispatchRequest::new("T1", tenant("A"));
        req.candidates = Some(vec![Candidate {
            worker_id: "W2".into(),
            task_id: "T1".into(),
            reason: "preferred".into(),
            secondary_factors: vec![],
        }]);
        let state = d.dispatch(req).unwrap();
        assert!(state.is_ok());
        assert_eq!(state.data["selected_worker_id"], "W2");
    }

    #[test]
    fn recommend_is_read_only() {
        let (_dir, store) = seeded();
        let d = Dispatcher::new(Arc::clone(&store), &Config::default());
        let r = d.recommend("T1", &tenant("A"), None, None).unwrap();
        assert_eq!(r.recommended_worker_id.as_deref(), Some("W1"));
        assert_eq!(r.candidates.len(), 2);
        assert_eq!(
            r.platform_recommendation.unwrap().model_version,
            "zone-skill-v2"
        );
        assert!(store
            .get_task(TaskType::Delivery, "T1")
            .unwrap()
            .assigned_worker_id
            .is_none());
    }

    #[test]
    fn recommend_for_other_tenant_is_empty() {
        let (_dir, store) = seeded();
        let d = Dispatcher::new(Arc::clone(&store), &Config::default());
        let r = d.recommend("T2", &tenant("A"), None, None).unwrap();
        assert!(r.recommended_worker_id.is_none());
        assert!(r.candidates.is_empty());
    }
}
