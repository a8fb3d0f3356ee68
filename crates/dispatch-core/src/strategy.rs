//! Scoring workers against a task.
//!
//! Scores are deterministic for a given model version: the same task and
//! worker contexts always produce the same numbers, so a stored decision
//! trace can be re-evaluated later. Every score echoes the version that
//! produced it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::TaskType;

pub const DEFAULT_MODEL_VERSION: &str = "zone-skill-v2";

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerContext {
    pub worker_id: String,
    #[serde(default)]
    pub rating: Option<f64>,
    /// Non-terminal tasks currently held by the worker.
    #[serde(default)]
    pub active_assignments: u32,
    #[serde(default)]
    pub completed_tasks: u32,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl WorkerContext {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            rating: None,
            active_assignments: 0,
            completed_tasks: 0,
            zone: None,
            skills: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub primary_reason: String,
    #[serde(default)]
    pub secondary_factors: Vec<String>,
    /// How much signal backed the score, 0..=1.
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub worker_id: String,
    /// 0..=1, higher is better.
    pub score: f64,
    pub model_version: String,
    pub factors: ScoreFactors,
}

// ---------------------------------------------------------------------------
// ModelVersion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVersion {
    /// Rating and current load only.
    LoadRatingV1,
    /// Adds zone proximity and skill coverage.
    ZoneSkillV2,
}

impl ModelVersion {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "load-rating-v1" => Some(ModelVersion::LoadRatingV1),
            "zone-skill-v2" => Some(ModelVersion::ZoneSkillV2),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelVersion::LoadRatingV1 => "load-rating-v1",
            ModelVersion::ZoneSkillV2 => "zone-skill-v2",
        }
    }

    fn weights(self) -> Weights {
        match self {
            ModelVersion::LoadRatingV1 => Weights {
                rating: 0.5,
                load: 0.5,
                zone: 0.0,
                skill: 0.0,
            },
            ModelVersion::ZoneSkillV2 => Weights {
                rating: 0.35,
                load: 0.30,
                zone: 0.20,
                skill: 0.15,
            },
        }
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Weights {
    rating: f64,
    load: f64,
    zone: f64,
    skill: f64,
}

// ---------------------------------------------------------------------------
// StrategyEvaluator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StrategyEvaluator {
    default_version: ModelVersion,
}

impl Default for StrategyEvaluator {
    fn default() -> Self {
        Self {
            default_version: ModelVersion::ZoneSkillV2,
        }
    }
}

impl StrategyEvaluator {
    /// Evaluator whose default is `default_version`; unknown names keep the
    /// built-in default.
    pub fn new(default_version: &str) -> Self {
        let default_version = ModelVersion::parse(default_version).unwrap_or_else(|| {
            tracing::warn!(
                requested = default_version,
                fallback = DEFAULT_MODEL_VERSION,
                "unknown default model version"
            );
            ModelVersion::ZoneSkillV2
        });
        Self { default_version }
    }

    pub fn resolve(&self, model_version: Option<&str>) -> ModelVersion {
        model_version
            .and_then(ModelVersion::parse)
            .unwrap_or(self.default_version)
    }

    /// Score every worker and return them best-first.
    ///
    /// The sort is stable, so equal scores keep the order the workers were
    /// given in (the matcher's order).
    pub fn evaluate(
        &self,
        task: &TaskContext,
        workers: &[WorkerContext],
        model_version: Option<&str>,
    ) -> Vec<Score> {
        let version = self.resolve(model_version);
        let mut scores: Vec<Score> = workers
            .iter()
            .map(|w| score_worker(version, task, w))
            .collect();
        scores.sort_by(|a, b| b.score.total_cmp(&a.score));
        scores
    }
}

/// Highest score; on a tie the earliest entry wins.
pub fn select_top(scores: &[Score]) -> Option<&Score> {
    let mut best: Option<&Score> = None;
    for s in scores {
        match best {
            Some(b) if s.score <= b.score => {}
            _ => best = Some(s),
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

const HISTORY_SATURATION: f64 = 20.0;

fn score_worker(version: ModelVersion, task: &TaskContext, w: &WorkerContext) -> Score {
    let weights = version.weights();

    let rating = w.rating.map(|r| (r / 5.0).clamp(0.0, 1.0)).unwrap_or(0.5);
    let load = 1.0 / (1.0 + f64::from(w.active_assignments));
    let zone = match (task.zone.as_deref(), w.zone.as_deref()) {
        (Some(tz), Some(wz)) if tz.eq_ignore_ascii_case(wz) => 1.0,
        (Some(_), Some(_)) => 0.0,
        _ => 0.5,
    };
    let missing: Vec<&str> = task
        .required_skills
        .iter()
        .filter(|s| !w.skills.iter().any(|ws| ws.eq_ignore_ascii_case(s)))
        .map(String::as_str)
        .collect();
    let skill = if task.required_skills.is_empty() {
        1.0
    } else {
        1.0 - missing.len() as f64 / task.required_skills.len() as f64
    };

    // (tag, weighted contribution, raw factor)
    let mut parts = vec![
        ("high_rating", weights.rating * rating, rating),
        ("low_load", weights.load * load, load),
    ];
    if weights.zone > 0.0 {
        parts.push(("same_zone", weights.zone * zone, zone));
    }
    if weights.skill > 0.0 {
        parts.push(("skill_match", weights.skill * skill, skill));
    }

    let total: f64 = parts.iter().map(|(_, c, _)| c).sum();

    let mut primary = parts[0];
    for p in &parts[1..] {
        if p.1 > primary.1 {
            primary = *p;
        }
    }

    let mut secondary: Vec<String> = parts
        .iter()
        .filter(|(tag, _, raw)| *tag != primary.0 && *raw >= 0.75)
        .map(|(tag, _, _)| tag.to_string())
        .collect();
    if w.rating.is_none() {
        secondary.push("unrated".to_string());
    }
    if weights.zone > 0.0 && zone == 0.0 {
        secondary.push("zone_mismatch".to_string());
    }
    if weights.skill > 0.0 && !missing.is_empty() {
        secondary.push(format!("missing_skills:{}", missing.join(",")));
    }

    let rated = if w.rating.is_some() { 1.0 } else { 0.0 };
    let history = (f64::from(w.completed_tasks) / HISTORY_SATURATION).min(1.0);
    let confidence = match version {
        ModelVersion::LoadRatingV1 => 0.4 + 0.3 * rated + 0.3 * history,
        ModelVersion::ZoneSkillV2 => {
            let zone_known = if task.zone.is_some() && w.zone.is_some() {
                1.0
            } else {
                0.0
            };
            0.3 + 0.25 * rated + 0.25 * history + 0.2 * zone_known
        }
    };

    Score {
        worker_id: w.worker_id.clone(),
        score: round4(total.clamp(0.0, 1.0)),
        model_version: version.as_str().to_string(),
        factors: ScoreFactors {
            primary_reason: primary.0.to_string(),
            secondary_factors: secondary,
            confidence_score: round4(confidence.clamp(0.0, 1.0)),
        },
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
