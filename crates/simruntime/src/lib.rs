//! Flow execution runtime
//!
//! This crate turns a validated flow definition into results: the resolver
//! derives a deterministic execution order and input-binding table, the
//! executor dispatches each node to its external capability, and the runner
//! drives a whole run from entry node to terminal node.

mod executor;
mod resolver;
mod runner;

pub use executor::NodeExecutor;
pub use resolver::{resolve, Binding, ResolvedFlow};
pub use runner::{FlowRunner, RunnerConfig};
