//! Capability client library
//!
//! HTTP-backed implementations of the engine's capability interfaces, plus
//! template resolvers. Everything here is constructed explicitly and
//! injected into the runtime; no client state is process-global.

mod http;
mod template;

pub use http::{HttpComputeInvoker, HttpModelInvoker, HttpRetriever};
pub use template::{scan_variables, InlineTemplateResolver, StaticTemplateResolver};
