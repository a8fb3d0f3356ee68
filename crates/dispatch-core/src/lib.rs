pub mod allocation;
pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod io;
pub mod matcher;
pub mod metrics;
pub mod orchestrator;
pub mod paths;
pub mod store;
pub mod strategy;
pub mod task;
pub mod trace;
pub mod transition;
pub mod types;
pub mod worker;

pub use error::{DispatchError, Result};
