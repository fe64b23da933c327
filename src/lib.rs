//! multiask - ask several LLM providers at once
//!
//! A question is sent to every selected provider concurrently. Each answer
//! (or failure) is streamed as a `partial` event in completion order, and a
//! final `summary` event carries the aggregate of all providers.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod llm;
pub mod question;

pub use config::Config;
pub use dispatch::{Dispatcher, ResultStream, StreamEvent};
pub use error::{FanoutError, Result};
pub use llm::{ProviderId, ProviderRegistry, ProviderResult};
pub use question::Question;
