//! Running the agent as its own task and handing clients a controller.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, OnceCell};
use tracing::{debug, info, warn};

use super::worker::CachingAgent;
use crate::rpc::{ResponseEnvelope, TransportError};
use crate::store::CachedResponse;

/// Buffer size for the agent's inbound event channel.
/// 32 covers a burst of downloads plus lookups from several views.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Events delivered to the agent task.
pub(crate) enum AgentEvent {
    /// An RPC request with its dedicated reply port
    Message {
        data: Value,
        port: oneshot::Sender<Value>,
    },
    /// A cache-only lookup for a resource the client wants to load
    Fetch {
        url: String,
        respond: oneshot::Sender<Option<CachedResponse>>,
    },
}

/// Handle to the active agent, the only way a client reaches it.
#[derive(Clone)]
pub struct AgentController {
    tx: mpsc::Sender<AgentEvent>,
}

impl AgentController {
    pub(crate) fn new(tx: mpsc::Sender<AgentEvent>) -> Self {
        Self { tx }
    }

    /// Post a message with the port the reply should go to.
    pub async fn post_message(
        &self,
        data: Value,
        port: oneshot::Sender<Value>,
    ) -> Result<(), TransportError> {
        self.tx
            .send(AgentEvent::Message { data, port })
            .await
            .map_err(|_| TransportError::NotReady)
    }

    /// Serve a resource from the agent's committed pack partitions, without
    /// touching the network.
    pub async fn intercept(&self, url: &str) -> Option<CachedResponse> {
        let (respond, response) = oneshot::channel();
        self.tx
            .send(AgentEvent::Fetch {
                url: url.to_string(),
                respond,
            })
            .await
            .ok()?;
        response.await.ok().flatten()
    }
}

fn spawn_agent(agent: CachingAgent) -> AgentController {
    let (tx, mut rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            // Each event runs on its own; nothing carries over between them.
            let agent = agent.clone();
            tokio::spawn(async move {
                match event {
                    AgentEvent::Message { data, port } => {
                        if let Some(response) = agent.handle_message(data).await {
                            match serde_json::to_value(ResponseEnvelope::from(response)) {
                                Ok(value) => {
                                    if port.send(value).is_err() {
                                        debug!("Caller stopped waiting before the agent replied");
                                    }
                                }
                                Err(e) => warn!(error = %e, "Failed to encode agent response"),
                            }
                        }
                    }
                    AgentEvent::Fetch { url, respond } => {
                        let _ = respond.send(agent.match_resource(&url));
                    }
                }
            });
        }
        debug!("Agent event loop finished");
    });

    AgentController::new(tx)
}

/// Registers the caching agent once and tracks whether it is in control.
///
/// Registration is memoized: the first call installs and activates the
/// agent, later calls return the same controller.
pub struct AgentRegistrar {
    registration: OnceCell<AgentController>,
    active: watch::Sender<Option<AgentController>>,
}

impl Default for AgentRegistrar {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistrar {
    pub fn new() -> Self {
        let (active, _) = watch::channel(None);
        Self {
            registration: OnceCell::new(),
            active,
        }
    }

    /// Install, activate and start the agent, then claim this client.
    pub async fn register(&self, agent: CachingAgent) -> AgentController {
        self.registration
            .get_or_init(|| async move {
                if let Err(e) = agent.install().await {
                    warn!(error = %e, "Agent install step did not complete");
                }
                agent.activate();
                let controller = spawn_agent(agent);
                self.publish(controller.clone());
                info!("Caching agent active");
                controller
            })
            .await
            .clone()
    }

    pub(crate) fn publish(&self, controller: AgentController) {
        self.active.send_replace(Some(controller));
    }

    /// The controlling agent, if one is active right now.
    pub fn controller(&self) -> Option<AgentController> {
        self.active.borrow().clone()
    }

    /// Wait up to `timeout` for an agent to take control.
    pub async fn wait_for_controller(&self, timeout: Duration) -> Option<AgentController> {
        let mut rx = self.active.subscribe();
        let controller = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(controller)) => controller.clone(),
            _ => None,
        };
        controller
    }
}
