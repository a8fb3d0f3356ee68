//! Flow runner and the concrete dispatch flow built on it.

pub mod dispatch;
pub mod engine;

pub use dispatch::{
    dispatch_flow, recommend, Backend, DispatchRequest, Dispatcher, Recommendation,
    DISPATCH_FLOW, DISPATCH_REQUESTED,
};
pub use engine::{Engine, Flow, FlowError, FlowEvent, FlowState, StepFn};
