//! Background caching agent.
//!
//! The agent owns every pack partition and the pack registry. Clients never
//! touch either directly; they reach the agent through an `AgentController`
//! handed out by the `AgentRegistrar`.

pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod registry;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{CacheError, CacheResult};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use lifecycle::{AgentController, AgentRegistrar};
pub use registry::PackRegistry;
pub use worker::{AgentConfig, CachingAgent};
