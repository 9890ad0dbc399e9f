//! packcache core - offline city packs that survive a lost connection.
//!
//! A background caching agent downloads every resource of a pack into a
//! fresh partition and swaps it in only when the whole set succeeded. A
//! foreground coordinator asks the agent to do that over a message channel
//! and keeps the launch state that any client context can read.

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod models;
pub mod offline;
pub mod provider;
pub mod rpc;
pub mod store;

pub use agent::{AgentConfig, AgentController, AgentRegistrar, CachingAgent, HttpFetcher};
pub use config::Config;
pub use coordinator::{DownloadError, OfflinePackCoordinator, Subscription};
pub use models::{CityPack, DownloadedPackMap, DownloadedPackRecord, PackCatalogEntry};
pub use provider::{ApiPackProvider, PackProvider, PackRepository, StaticPackProvider};
pub use rpc::{AgentTransport, TransportError};
pub use store::{CacheStorage, LocalStorage, StorageArea};
