//! Sequential step runner.
//!
//! A [`Flow`] maps event kinds to ordered, named steps. [`Engine::on_event`]
//! runs the steps for one event against a fresh [`FlowState`], stopping at the
//! first error. Partial state is returned as-is; steps own their own
//! compensation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};

// ---------------------------------------------------------------------------
// Event and state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl FlowEvent {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowError {
    /// Step that failed; `None` when the run never reached a step.
    #[serde(default)]
    pub step: Option<String>,
    pub code: String,
    pub message: String,
}

impl FlowError {
    fn from_error(step: Option<&str>, e: &DispatchError) -> Self {
        Self {
            step: step.map(str::to_string),
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    pub data: serde_json::Map<String, serde_json::Value>,
    pub error: Option<FlowError>,
    pub completed_steps: Vec<String>,
}

impl FlowState {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.data
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Typed read of a value an earlier step stored.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get_opt(key)?
            .ok_or_else(|| DispatchError::InvalidInput(format!("flow state has no '{key}'")))
    }

    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.data.get(key) {
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
        }
    }
}

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

pub type StepFn = Box<dyn Fn(&mut FlowState, &FlowEvent) -> Result<()> + Send + Sync>;

pub struct Step {
    name: String,
    run: StepFn,
}

#[derive(Default)]
pub struct Flow {
    steps: HashMap<String, Vec<Step>>,
}

impl Flow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step to the sequence run for `event_kind`.
    pub fn step<F>(mut self, event_kind: &str, name: &str, run: F) -> Self
    where
        F: Fn(&mut FlowState, &FlowEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.steps
            .entry(event_kind.to_string())
            .or_default()
            .push(Step {
                name: name.to_string(),
                run: Box::new(run),
            });
        self
    }

    pub fn step_names(&self, event_kind: &str) -> Vec<&str> {
        self.steps
            .get(event_kind)
            .map(|s| s.iter().map(|s| s.name.as_str()).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    flows: HashMap<String, Flow>,
    timeout: Duration,
}

impl Engine {
    pub fn new(timeout: Duration) -> Self {
        Self {
            flows: HashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register `flow` under `name`, replacing any previous flow of that name.
    pub fn register_flow(&mut self, name: impl Into<String>, flow: Flow) {
        self.flows.insert(name.into(), flow);
    }

    pub fn flow(&self, name: &str) -> Option<&Flow> {
        self.flows.get(name)
    }

    /// Run the steps `flow_name` has for `event.kind`.
    ///
    /// Only an unknown flow is an `Err`. Step failures, a missing event
    /// handler, and the timeout are reported in [`FlowState::error`] with the
    /// state accumulated so far. The timeout is checked as each step returns;
    /// a running step is never interrupted, but a run that ends past the
    /// bound is reported as timed out even when its last step succeeded.
    pub fn on_event(&self, flow_name: &str, event: &FlowEvent) -> Result<FlowState> {
        let flow = self
            .flows
            .get(flow_name)
            .ok_or_else(|| DispatchError::FlowNotFound(flow_name.to_string()))?;

        let mut state = FlowState::default();
        let steps = match flow.steps.get(&event.kind) {
            Some(steps) if !steps.is_empty() => steps,
            _ => {
                state.error = Some(FlowError {
                    step: None,
                    code: "unhandled_event".to_string(),
                    message: format!("flow '{flow_name}' has no steps for '{}'", event.kind),
                });
                return Ok(state);
            }
        };

        let started = Instant::now();
        for step in steps {
            match (step.run)(&mut state, event) {
                Ok(()) => state.completed_steps.push(step.name.clone()),
                Err(e) => {
                    tracing::info!(
                        flow = flow_name,
                        step = %step.name,
                        code = e.code(),
                        error = %e,
                        "flow step failed"
                    );
                    state.error = Some(FlowError::from_error(Some(&step.name), &e));
                    break;
                }
            }
            let elapsed = started.elapsed();
            if elapsed > self.timeout {
                let e = DispatchError::Timeout {
                    flow: flow_name.to_string(),
                    limit_ms: self.timeout.as_millis() as u64,
                };
                tracing::warn!(
                    flow = flow_name,
                    step = %step.name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "flow timed out"
                );
                state.error = Some(FlowError::from_error(Some(&step.name), &e));
                break;
            }
        }

        tracing::debug!(
            flow = flow_name,
            event = %event.kind,
            completed = state.completed_steps.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "flow finished"
        );
        Ok(state)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counting_flow() -> Flow {
        Flow::new()
            .step("go", "one", |s, _| s.put("one", &1))
            .step("go", "two", |s, e| {
                let one: i64 = s.get("one")?;
                s.put("two", &(one + e.payload["add"].as_i64().unwrap_or(0)))
            })
    }

    #[test]
    fn steps_run_in_order_and_accumulate() {
        let mut engine = Engine::new(Duration::from_secs(5));
        engine.register_flow("count", counting_flow());
        let state = engine
            .on_event("count", &FlowEvent::new("go", json!({ "add": 4 })))
            .unwrap();
        assert!(state.is_ok());
        assert_eq!(state.completed_steps, vec!["one", "two"]);
        assert_eq!(state.data["two"], json!(5));
    }

    #[test]
    fn first_error_stops_the_run_and_keeps_partial_state() {
        let mut engine = Engine::new(Duration::from_secs(5));
        let flow = Flow::new()
            .step("go", "seed", |s, _| s.put("seeded", &true))
            .step("go", "fail", |_, _| {
                Err(DispatchError::NoCandidates("T1".into()))
            })
            .step("go", "never", |s, _| s.put("never", &true));
        engine.register_flow("f", flow);

        let state = engine.on_event("f", &FlowEvent::new("go", json!({}))).unwrap();
        let err = state.error.unwrap();
        assert_eq!(err.step.as_deref(), Some("fail"));
        assert_eq!(err.code, "no_candidates");
        assert_eq!(state.completed_steps, vec!["seed"]);
        assert_eq!(state.data["seeded"], json!(true));
        assert!(!state.data.contains_key("never"));
    }

    #[test]
    fn timeout_stops_before_the_next_step() {
        let mut engine = Engine::new(Duration::from_millis(10));
        let flow = Flow::new()
            .step("go", "slow", |_, _| {
                std::thread::sleep(Duration::from_millis(30));
                Ok(())
            })
            .step("go", "after", |s, _| s.put("after", &true));
        engine.register_flow("f", flow);

        let state = engine.on_event("f", &FlowEvent::new("go", json!({}))).unwrap();
        let err = state.error.unwrap();
        assert_eq!(err.code, "timeout");
        assert_eq!(err.step.as_deref(), Some("slow"));
        assert_eq!(state.completed_steps, vec!["slow"]);
        assert!(!state.data.contains_key("after"));
    }

    #[test]
    fn overrunning_last_step_is_a_timeout() {
        let mut engine = Engine::new(Duration::from_millis(10));
        let flow = Flow::new().step("go", "only", |s, _| {
            std::thread::sleep(Duration::from_millis(50));
            s.put("done", &true)
        });
        engine.register_flow("f", flow);

        let state = engine.on_event("f", &FlowEvent::new("go", json!({}))).unwrap();
        assert!(!state.is_ok());
        let err = state.error.unwrap();
        assert_eq!(err.code, "timeout");
        assert_eq!(err.step.as_deref(), Some("only"));
        assert_eq!(state.completed_steps, vec!["only"]);
        assert_eq!(state.data["done"], json!(true));
    }


    #[test]
    fn unknown_flow_is_an_error() {
        let engine = Engine::new(Duration::from_secs(1));
        let err = engine
            .on_event("missing", &FlowEvent::new("go", json!({})))
            .unwrap_err();
        assert!(matches!(err, DispatchError::FlowNotFound(_)));
    }

    #[test]
    fn unhandled_event_runs_nothing() {
        let mut engine = Engine::new(Duration::from_secs(1));
        engine.register_flow("count", counting_flow());
        let state = engine
            .on_event("count", &FlowEvent::new("stop", json!({})))
            .unwrap();
        assert_eq!(state.error.unwrap().code, "unhandled_event");
        assert!(state.completed_steps.is_empty());
        assert!(state.data.is_empty());
    }

    #[test]
    fn missing_state_key_is_reported() {
        let state = FlowState::default();
        assert!(state.get::<String>("task").is_err());
        assert!(state.get_opt::<String>("task").unwrap().is_none());
    }
}
