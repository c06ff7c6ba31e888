//! Job orchestration for the clipchain generation pipeline.
//!
//! The [`orchestrator::Orchestrator`] owns the whole job lifecycle:
//! strategy resolution, submission with one-shot fallback, rate-limit
//! recovery with provider-supplied continuation state, interval polling
//! through the normalized state machine, segment chaining for
//! duration-capped providers, and reload resumption from the job store.
//! It is the sole writer of the active [`clipchain_core::job::VideoJob`];
//! consumers observe it through a watch channel and discrete job events.

pub mod config;
pub mod events;
pub mod orchestrator;

pub use config::OrchestratorConfig;
pub use events::JobEvent;
pub use orchestrator::{Orchestrator, OrchestratorError};
