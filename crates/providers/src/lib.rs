//! Provider adapters for the clipchain generation pipeline.
//!
//! One module per external provider, each owning its submission payload
//! shape, its total status-vocabulary mapping onto the normalized
//! [`clipchain_core::job::PollResult`], and the detection of its own
//! rate-limit signal. The orchestrator only ever sees the
//! [`adapter::ProviderAdapter`] trait.

pub mod adapter;
pub mod avatar;
pub mod motion;
pub mod registry;
pub mod replica;
