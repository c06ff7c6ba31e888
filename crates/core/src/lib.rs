//! Pure domain logic for the clipchain generation pipeline.
//!
//! Everything in this crate is synchronous and side-effect free: dialogue
//! and job types, spoken-duration estimation, sentence-level segment
//! splitting, strategy selection, the job state machine, and the settings
//! abstraction. This crate has zero internal dependencies so it can be
//! used by the provider adapters, the store, and the orchestrator alike.

pub mod error;
pub mod estimate;
pub mod job;
pub mod request;
pub mod segment;
pub mod settings;
pub mod strategy;

pub use error::CoreError;
