//! Request/response bridge between the foreground coordinator and the
//! background caching agent.
//!
//! Messages cross the boundary as JSON values. Each call gets its own
//! one-shot reply port, so responses are matched structurally rather than
//! by a request id on a shared path.

pub mod error;
pub mod message;
pub mod transport;

pub use error::TransportError;
pub use message::{AgentRequest, AgentResponse, CachePackConfirmation, CachePackPayload, ResponseEnvelope};
pub use transport::{AgentTransport, DEFAULT_RPC_TIMEOUT};
