use crate::types::WorkerPool;
use serde::{Deserialize, Serialize};

/// A field worker: a driver for deliveries or a technician for repairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub pool: WorkerPool,
    pub tenant_id: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Customer rating on a 0–5 scale, absent until the first review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub completed_tasks: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Worker {
    pub fn new(id: impl Into<String>, pool: WorkerPool, tenant_id: Option<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            pool,
            tenant_id,
            active: true,
            rating: None,
            completed_tasks: 0,
            skills: Vec::new(),
            zone: None,
        }
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating.clamp(0.0, 5.0));
        self
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_skills(mut self, skills: Vec<String>) -> Self {
        self.skills = skills;
        self
    }

    pub fn with_completed(mut self, completed: u32) -> Self {
        self.completed_tasks = completed;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}
