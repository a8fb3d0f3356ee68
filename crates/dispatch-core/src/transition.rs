//! Per-type task status graphs.
//!
//! Each task type owns a hand-authored whitelist `status → allowed next`.
//! Terminal statuses map to an empty slice and are absorbing. Lookups work on
//! the typed status enums; [`can_transition`] is the string entry point and
//! treats anything it cannot parse as "not allowed".

use crate::error::{DispatchError, Result};
use crate::types::{DeliveryStatus, RepairStatus, TaskStatus, TaskType};

// ---------------------------------------------------------------------------
// Graphs
// ---------------------------------------------------------------------------

fn delivery_next(status: DeliveryStatus) -> &'static [DeliveryStatus] {
    use DeliveryStatus::*;
    match status {
        Pending => &[Delivering, Cancelled, Rejected],
        Delivering => &[Completed, Exception, Cancelled],
        Exception => &[Delivering, Cancelled],
        Completed | Cancelled | Rejected => &[],
    }
}

fn repair_next(status: RepairStatus) -> &'static [RepairStatus] {
    use RepairStatus::*;
    match status {
        Pending => &[Assigned, Cancelled, Rejected],
        Assigned => &[InProgress, Cancelled],
        InProgress => &[Completed, OnHold],
        OnHold => &[InProgress, Cancelled],
        Completed | Cancelled | Rejected => &[],
    }
}

impl TaskStatus {
    pub fn allowed_next(self) -> Vec<TaskStatus> {
        match self {
            TaskStatus::Delivery(s) => delivery_next(s)
                .iter()
                .copied()
                .map(TaskStatus::Delivery)
                .collect(),
            TaskStatus::Repair(s) => repair_next(s)
                .iter()
                .copied()
                .map(TaskStatus::Repair)
                .collect(),
        }
    }

    pub fn is_terminal(self) -> bool {
        match self {
            TaskStatus::Delivery(s) => delivery_next(s).is_empty(),
            TaskStatus::Repair(s) => repair_next(s).is_empty(),
        }
    }

    pub fn can_transition_to(self, target: TaskStatus) -> bool {
        match (self, target) {
            (TaskStatus::Delivery(from), TaskStatus::Delivery(to)) => {
                delivery_next(from).contains(&to)
            }
            (TaskStatus::Repair(from), TaskStatus::Repair(to)) => repair_next(from).contains(&to),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation entry points
// ---------------------------------------------------------------------------

/// String-level check used at the edges. Unknown statuses yield `false`.
pub fn can_transition(task_type: TaskType, current: &str, target: &str) -> bool {
    match (
        TaskStatus::parse(task_type, current),
        TaskStatus::parse(task_type, target),
    ) {
        (Ok(from), Ok(to)) => from.can_transition_to(to),
        _ => false,
    }
}

/// Typed check returning `InvalidTransition` when the graph forbids the move.
pub fn ensure_transition(from: TaskStatus, to: TaskStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(DispatchError::InvalidTransition {
            task_type: from.task_type().to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
