//! LLM provider integrations and failure-isolated adapters

mod adapter;
mod provider;
mod provider_id;
mod registry;

pub use adapter::*;
pub use provider::*;
pub use provider_id::*;
pub use registry::*;
