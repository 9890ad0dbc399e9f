//! Foreground coordinator.
//!
//! Bridges client intent to agent requests, keeps the locally readable
//! offline state (active launch pack, downloaded packs) in the key-value
//! store, and tells subscribers whenever that state changes.

pub mod error;
pub mod listeners;
pub mod resources;
pub mod service;

pub use error::DownloadError;
pub use listeners::{ListenerRegistry, Subscription};
pub use resources::build_offline_resource_set;
pub use service::OfflinePackCoordinator;
