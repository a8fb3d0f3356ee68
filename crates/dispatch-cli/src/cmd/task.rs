use crate::output::{cell, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use dispatch_core::allocation::{AllocationService, TransitionRequest};
use dispatch_core::store::TaskStore;
use dispatch_core::task::Task;
use dispatch_core::types::TaskType;
use std::path::Path;

use super::{cli_scope, open, CLI_ACTOR};

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// Add a pending task
    Add {
        id: String,
        #[arg(long = "type", default_value = "delivery")]
        task_type: TaskType,
        /// Owning tenant (omit for a platform-owned task)
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        zone: Option<String>,
        /// Required skill; repeat for several
        #[arg(long = "skill")]
        skills: Vec<String>,
    },
    /// List tasks
    List {
        #[arg(long = "type")]
        task_type: Option<TaskType>,
    },
    /// Show one task
    Show {
        id: String,
        #[arg(long = "type")]
        task_type: Option<TaskType>,
    },
    /// Move a task to a new status
    Status {
        id: String,
        status: String,
        #[arg(long = "type")]
        task_type: Option<TaskType>,
    },
}

pub fn run(root: &Path, subcmd: TaskSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TaskSubcommand::Add {
            id,
            task_type,
            tenant,
            title,
            zone,
            skills,
        } => {
            let mut task = Task::new(id, task_type, tenant).with_skills(skills);
            if let Some(t) = title {
                task = task.with_title(t);
            }
            if let Some(z) = zone {
                task = task.with_zone(z);
            }
            add(root, task, json)
        }
        TaskSubcommand::List { task_type } => list(root, task_type, json),
        TaskSubcommand::Show { id, task_type } => show(root, &id, task_type, json),
        TaskSubcommand::Status {
            id,
            status,
            task_type,
        } => set_status(root, &id, &status, task_type, json),
    }
}

fn add(root: &Path, task: Task, json: bool) -> anyhow::Result<()> {
    let (_, store) = open(root)?;
    store
        .insert_task(&task)
        .with_context(|| format!("failed to add task '{}'", task.id))?;

    if json {
        print_json(&task)?;
    } else {
        println!("Added {} task [{}] ({})", task.task_type, task.id, task.status);
    }
    Ok(())
}

fn list(root: &Path, task_type: Option<TaskType>, json: bool) -> anyhow::Result<()> {
    let (_, store) = open(root)?;
    let types: Vec<TaskType> = match task_type {
        Some(t) => vec![t],
        None => TaskType::all().to_vec(),
    };
    let mut tasks = Vec::new();
    for t in types {
        tasks.extend(store.list_tasks(t)?);
    }

    if json {
        return print_json(&tasks);
    }
    let rows = tasks
        .iter()
        .map(|t| {
            vec![
                t.id.clone(),
                t.task_type.to_string(),
                t.status.to_string(),
                cell(t.assigned_worker_id.as_deref()),
                cell(t.tenant_id.as_deref()),
                cell(t.zone.as_deref()),
            ]
        })
        .collect();
    print_table(&["ID", "TYPE", "STATUS", "WORKER", "TENANT", "ZONE"], rows);
    Ok(())
}

fn show(root: &Path, id: &str, task_type: Option<TaskType>, json: bool) -> anyhow::Result<()> {
    let (_, store) = open(root)?;
    let task = store.find_task(id, task_type)?;

    if json {
        return print_json(&task);
    }
    println!("Task:     {}", task.id);
    println!("Type:     {}", task.task_type);
    println!("Status:   {}", task.status);
    println!("Worker:   {}", cell(task.assigned_worker_id.as_deref()));
    println!("Tenant:   {}", cell(task.tenant_id.as_deref()));
    if let Some(title) = &task.title {
        println!("Title:    {title}");
    }
    if let Some(zone) = &task.zone {
        println!("Zone:     {zone}");
    }
    if !task.required_skills.is_empty() {
        println!("Skills:   {}", task.required_skills.join(", "));
    }
    println!(
        "Next:     {}",
        task.status
            .allowed_next()
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

fn set_status(
    root: &Path,
    id: &str,
    status: &str,
    task_type: Option<TaskType>,
    json: bool,
) -> anyhow::Result<()> {
    let (_, store) = open(root)?;
    let before = store.find_task(id, task_type)?.status;
    let task = AllocationService::new(&store, &store, &store).transition(TransitionRequest {
        task_id: id.to_string(),
        scope: cli_scope(),
        actor_id: Some(CLI_ACTOR.to_string()),
        task_type,
        target: status.to_string(),
    })?;

    if json {
        print_json(&task)?;
    } else {
        println!("Task [{}]: {} → {}", task.id, before, task.status);
    }
    Ok(())
}
