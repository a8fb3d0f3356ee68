use crate::output::{cell, print_json, print_table};
use dispatch_core::allocation::{AllocationRequest, AllocationService};
use dispatch_core::matcher::CandidateMatcher;
use dispatch_core::orchestrator::{DispatchRequest, Dispatcher};
use dispatch_core::trace::replay_task;
use dispatch_core::types::TaskType;
use std::path::Path;
use std::sync::Arc;

use super::{cli_scope, open, CLI_ACTOR};

pub fn match_candidates(
    root: &Path,
    task_id: &str,
    task_type: Option<TaskType>,
    json: bool,
) -> anyhow::Result<()> {
    let (_, store) = open(root)?;
    let candidates =
        CandidateMatcher::new(&store, &store).match_candidates(task_id, &cli_scope(), task_type)?;

    if json {
        return print_json(&serde_json::json!({ "candidates": candidates }));
    }
    let rows = candidates
        .iter()
        .map(|c| {
            vec![
                c.worker_id.clone(),
                c.reason.clone(),
                c.secondary_factors.join(" "),
            ]
        })
        .collect();
    print_table(&["WORKER", "REASON", "FACTORS"], rows);
    Ok(())
}

pub fn allocate(
    root: &Path,
    task_id: &str,
    worker_id: &str,
    task_type: Option<TaskType>,
    json: bool,
) -> anyhow::Result<()> {
    let (_, store) = open(root)?;
    let result = AllocationService::new(&store, &store, &store).allocate(AllocationRequest {
        task_id: task_id.to_string(),
        worker_id: worker_id.to_string(),
        scope: cli_scope(),
        actor_id: Some(CLI_ACTOR.to_string()),
        task_type,
        decision_trace: None,
    })?;

    if json {
        print_json(&serde_json::json!({ "allocated": result.committed, "table": result.table }))?;
    } else {
        println!(
            "Allocated [{}] to {} ({}, {})",
            result.task.id, worker_id, result.task.status, result.table
        );
    }
    Ok(())
}

pub fn run_flow(
    root: &Path,
    task_id: &str,
    worker: Option<String>,
    task_type: Option<TaskType>,
    model: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let (config, store) = open(root)?;
    let dispatcher = Dispatcher::new(Arc::new(store), &config);

    let mut req = DispatchRequest::new(task_id, cli_scope());
    req.actor_id = Some(CLI_ACTOR.to_string());
    req.worker_id = worker;
    req.task_type = task_type;
    req.model_version = model;
    let state = dispatcher.dispatch(req)?;

    if json {
        print_json(&state)?;
    } else {
        println!("Steps: {}", state.completed_steps.join(" → "));
        if let Some(w) = state.data.get("selected_worker_id").and_then(|v| v.as_str()) {
            println!("Selected: {w}");
        }
    }

    match state.error {
        None => Ok(()),
        Some(err) => anyhow::bail!(
            "step '{}' failed [{}]: {}",
            err.step.as_deref().unwrap_or("-"),
            err.code,
            err.message
        ),
    }
}

pub fn replay(root: &Path, task_id: &str, json: bool) -> anyhow::Result<()> {
    let (_, store) = open(root)?;
    let replay = replay_task(&store, task_id)?;

    if json {
        return print_json(&replay);
    }
    match replay.trace() {
        Some(t) => println!(
            "Latest decision: {} (committed: {}, model: {})",
            cell(t.selected_worker_id.as_deref()),
            t.outcome.committed,
            cell(t.model_version.as_deref())
        ),
        None => println!("No decision trace for [{task_id}]"),
    }
    let rows = replay
        .all_related
        .iter()
        .map(|e| {
            vec![
                e.created_at.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                e.action().to_string(),
                cell(e.actor_id.as_deref()),
            ]
        })
        .collect();
    print_table(&["AT", "ACTION", "ACTOR"], rows);
    Ok(())
}
