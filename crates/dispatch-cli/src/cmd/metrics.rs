use crate::output::{print_json, print_table};
use dispatch_core::metrics;
use std::path::Path;

use super::open;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, store) = open(root)?;
    let m = metrics::collect(&store, &store)?;

    if json {
        return print_json(&m);
    }
    let rows = m
        .tasks
        .iter()
        .flat_map(|(task_type, by_status)| {
            by_status
                .iter()
                .map(move |(status, n)| vec![task_type.clone(), status.clone(), n.to_string()])
        })
        .collect();
    print_table(&["TYPE", "STATUS", "COUNT"], rows);
    println!();
    println!("Allocations:       {}", m.allocations);
    println!("Status changes:    {}", m.status_changes);
    println!(
        "Decision traces:   {} ({} failed)",
        m.decision_traces.total, m.decision_traces.failed
    );
    if let Some(mean) = m.decision_traces.mean_selected_score {
        println!("Mean chosen score: {mean:.4}");
    }
    println!("Learning records:  {}", m.learning_records);
    if !m.audit_gaps.is_empty() {
        println!("Audit gaps:        {}", m.audit_gaps.join(", "));
    }
    Ok(())
}
