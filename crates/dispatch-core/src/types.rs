use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::error::DispatchError;

// ---------------------------------------------------------------------------
// TaskType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Delivery,
    Repair,
}

impl TaskType {
    pub fn all() -> &'static [TaskType] {
        &[TaskType::Delivery, TaskType::Repair]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Delivery => "delivery",
            TaskType::Repair => "repair",
        }
    }

    /// Name of the backing table holding tasks of this type.
    pub fn table(self) -> &'static str {
        match self {
            TaskType::Delivery => "delivery_tasks",
            TaskType::Repair => "repair_tasks",
        }
    }

    /// Worker pool that serves this task type.
    pub fn pool(self) -> WorkerPool {
        match self {
            TaskType::Delivery => WorkerPool::Driver,
            TaskType::Repair => WorkerPool::Technician,
        }
    }

    pub fn initial_status(self) -> TaskStatus {
        match self {
            TaskType::Delivery => TaskStatus::Delivery(DeliveryStatus::Pending),
            TaskType::Repair => TaskStatus::Repair(RepairStatus::Pending),
        }
    }

    /// Status a task enters when a worker is committed to it.
    pub fn allocated_status(self) -> TaskStatus {
        match self {
            TaskType::Delivery => TaskStatus::Delivery(DeliveryStatus::Delivering),
            TaskType::Repair => TaskStatus::Repair(RepairStatus::Assigned),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delivery" | "order" => Ok(TaskType::Delivery),
            "repair" => Ok(TaskType::Repair),
            other => Err(DispatchError::InvalidInput(format!(
                "unknown task type '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// DeliveryStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivering,
    Exception,
    Completed,
    Cancelled,
    Rejected,
}

impl DeliveryStatus {
    pub fn all() -> &'static [DeliveryStatus] {
        &[
            DeliveryStatus::Pending,
            DeliveryStatus::Delivering,
            DeliveryStatus::Exception,
            DeliveryStatus::Completed,
            DeliveryStatus::Cancelled,
            DeliveryStatus::Rejected,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivering => "delivering",
            DeliveryStatus::Exception => "exception",
            DeliveryStatus::Completed => "completed",
            DeliveryStatus::Cancelled => "cancelled",
            DeliveryStatus::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        DeliveryStatus::all().iter().copied().find(|st| st.as_str() == s)
    }
}

// ---------------------------------------------------------------------------
// RepairStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Pending,
    Assigned,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
    Rejected,
}

impl RepairStatus {
    pub fn all() -> &'static [RepairStatus] {
        &[
            RepairStatus::Pending,
            RepairStatus::Assigned,
            RepairStatus::InProgress,
            RepairStatus::OnHold,
            RepairStatus::Completed,
            RepairStatus::Cancelled,
            RepairStatus::Rejected,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RepairStatus::Pending => "pending",
            RepairStatus::Assigned => "assigned",
            RepairStatus::InProgress => "in_progress",
            RepairStatus::OnHold => "on_hold",
            RepairStatus::Completed => "completed",
            RepairStatus::Cancelled => "cancelled",
            RepairStatus::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        RepairStatus::all().iter().copied().find(|st| st.as_str() == s)
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// A status tagged with the vocabulary of its task type.
///
/// Serialized as the bare status string; the task type travels alongside it
/// on [`crate::task::Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Delivery(DeliveryStatus),
    Repair(RepairStatus),
}

impl TaskStatus {
    /// Parse a raw status for the given task type.
    ///
    /// Input is trimmed and compared case-insensitively; `-` and spaces are
    /// accepted in place of `_` ("In Progress" → `in_progress`).
    pub fn parse(task_type: TaskType, raw: &str) -> Result<Self, DispatchError> {
        let norm = normalize(raw);
        let parsed = match task_type {
            TaskType::Delivery => DeliveryStatus::parse(&norm).map(TaskStatus::Delivery),
            TaskType::Repair => RepairStatus::parse(&norm).map(TaskStatus::Repair),
        };
        parsed.ok_or_else(|| DispatchError::InvalidStatus {
            task_type: task_type.to_string(),
            status: raw.to_string(),
        })
    }

    pub fn task_type(self) -> TaskType {
        match self {
            TaskStatus::Delivery(_) => TaskType::Delivery,
            TaskStatus::Repair(_) => TaskType::Repair,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Delivery(s) => s.as_str(),
            TaskStatus::Repair(s) => s.as_str(),
        }
    }

    /// Every status of the given type, in declaration order.
    pub fn all_for(task_type: TaskType) -> Vec<TaskStatus> {
        match task_type {
            TaskType::Delivery => DeliveryStatus::all()
                .iter()
                .copied()
                .map(TaskStatus::Delivery)
                .collect(),
            TaskType::Repair => RepairStatus::all()
                .iter()
                .copied()
                .map(TaskStatus::Repair)
                .collect(),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

pub(crate) fn normalize(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .replace(['-', ' '], "_")
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPool {
    Driver,
    Technician,
}

impl WorkerPool {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerPool::Driver => "driver",
            WorkerPool::Technician => "technician",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            WorkerPool::Driver => "drivers",
            WorkerPool::Technician => "technicians",
        }
    }
}

impl fmt::Display for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkerPool {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "driver" | "delivery" => Ok(WorkerPool::Driver),
            "technician" | "repair" => Ok(WorkerPool::Technician),
            other => Err(DispatchError::InvalidInput(format!(
                "unknown worker pool '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(
            TaskStatus::parse(TaskType::Delivery, "  DELIVERING ").unwrap(),
            TaskStatus::Delivery(DeliveryStatus::Delivering)
        );
        assert_eq!(
            TaskStatus::parse(TaskType::Repair, "In Progress").unwrap(),
            TaskStatus::Repair(RepairStatus::InProgress)
        );
    }

    #[test]
    fn parse_rejects_other_vocabulary() {
        let err = TaskStatus::parse(TaskType::Delivery, "assigned").unwrap_err();
        assert_eq!(err.code(), "invalid_status");
    }

    #[test]
    fn status_serializes_as_bare_string() {
        let json = serde_json::to_string(&TaskStatus::Repair(RepairStatus::OnHold)).unwrap();
        assert_eq!(json, "\"on_hold\"");
    }

    #[test]
    fn task_type_accepts_order_alias() {
        assert_eq!("Order".parse::<TaskType>().unwrap(), TaskType::Delivery);
        assert!("boat".parse::<TaskType>().is_err());
    }

    #[test]
    fn allocated_status_matches_task_type() {
        for &t in TaskType::all() {
            assert_eq!(t.allocated_status().task_type(), t);
            assert_eq!(t.initial_status().as_str(), "pending");
        }
    }
}
