use crate::output::{cell, print_json, print_table};
use clap::Subcommand;
use dispatch_core::store::WorkerDirectory;
use dispatch_core::types::WorkerPool;
use dispatch_core::worker::Worker;
use std::path::Path;

use super::open;

#[derive(Subcommand)]
pub enum WorkerSubcommand {
    /// Add or replace a worker
    Add {
        id: String,
        /// driver or technician
        #[arg(long, default_value = "driver")]
        pool: WorkerPool,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        tenant: Option<String>,
        /// Rating on a 0-5 scale
        #[arg(long)]
        rating: Option<f64>,
        #[arg(long)]
        zone: Option<String>,
        /// Skill; repeat for several
        #[arg(long = "skill")]
        skills: Vec<String>,
        #[arg(long, default_value_t = 0)]
        completed: u32,
        /// Register as inactive (never matched)
        #[arg(long)]
        inactive: bool,
    },
    /// List workers
    List {
        #[arg(long)]
        pool: Option<WorkerPool>,
    },
}

pub fn run(root: &Path, subcmd: WorkerSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        WorkerSubcommand::Add {
            id,
            pool,
            name,
            tenant,
            rating,
            zone,
            skills,
            completed,
            inactive,
        } => {
            let mut worker = Worker::new(id, pool, tenant)
                .with_skills(skills)
                .with_completed(completed);
            if let Some(n) = name {
                worker.name = n;
            }
            if let Some(r) = rating {
                worker = worker.with_rating(r);
            }
            if let Some(z) = zone {
                worker = worker.with_zone(z);
            }
            if inactive {
                worker = worker.inactive();
            }
            add(root, worker, json)
        }
        WorkerSubcommand::List { pool } => list(root, pool, json),
    }
}

fn add(root: &Path, worker: Worker, json: bool) -> anyhow::Result<()> {
    let (_, store) = open(root)?;
    store.upsert_worker(&worker)?;

    if json {
        print_json(&worker)?;
    } else {
        println!("Saved {} [{}] {}", worker.pool, worker.id, worker.name);
    }
    Ok(())
}

fn list(root: &Path, pool: Option<WorkerPool>, json: bool) -> anyhow::Result<()> {
    let (_, store) = open(root)?;
    let pools = match pool {
        Some(p) => vec![p],
        None => vec![WorkerPool::Driver, WorkerPool::Technician],
    };
    let mut workers = Vec::new();
    for p in pools {
        workers.extend(store.list_workers(p)?);
    }

    if json {
        return print_json(&workers);
    }
    let rows = workers
        .iter()
        .map(|w| {
            vec![
                w.id.clone(),
                w.pool.to_string(),
                cell(w.tenant_id.as_deref()),
                if w.active { "yes" } else { "no" }.to_string(),
                w.rating.map(|r| format!("{r:.1}")).unwrap_or_else(|| "-".into()),
                cell(w.zone.as_deref()),
            ]
        })
        .collect();
    print_table(&["ID", "POOL", "TENANT", "ACTIVE", "RATING", "ZONE"], rows);
    Ok(())
}
