use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use super::error::TransportError;
use super::message::{AgentRequest, AgentResponse, ResponseEnvelope};
use crate::agent::AgentRegistrar;

/// How long a caller waits for the agent before giving up.
/// The agent keeps working after a timeout; only the caller stops waiting.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Client side of the agent channel.
/// Clone is cheap - the registrar is shared.
#[derive(Clone)]
pub struct AgentTransport {
    registrar: Arc<AgentRegistrar>,
    timeout: Duration,
}

impl AgentTransport {
    pub fn new(registrar: Arc<AgentRegistrar>) -> Self {
        Self {
            registrar,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one request and wait for its matching response.
    ///
    /// Fails immediately with `NotReady` when no agent controls this client.
    pub async fn request(&self, request: &AgentRequest) -> Result<AgentResponse, TransportError> {
        let controller = self.registrar.controller().ok_or(TransportError::NotReady)?;
        let data = serde_json::to_value(request).map_err(TransportError::Encode)?;
        let (port, reply) = oneshot::channel();

        let exchange = async {
            controller.post_message(data, port).await?;
            reply.await.map_err(|_| TransportError::Disconnected)
        };

        let value = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        let envelope: ResponseEnvelope =
            serde_json::from_value(value).map_err(TransportError::Decode)?;
        if envelope.ok != envelope.response.is_ok() {
            return Err(TransportError::Malformed(format!(
                "ok={} does not match response type",
                envelope.ok
            )));
        }
        debug!(ok = envelope.ok, "Received agent response");
        Ok(envelope.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use crate::agent::lifecycle::{AgentController, AgentEvent};

    /// A registrar whose agent replies to every message with `reply`, or
    /// never replies if `reply` is `None`.
    fn scripted_agent(reply: Option<Value>, hold_ports: bool) -> Arc<AgentRegistrar> {
        let (tx, mut rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Some(event) = rx.recv().await {
                if let AgentEvent::Message { port, .. } = event {
                    match &reply {
                        Some(reply) => {
                            let _ = port.send(reply.clone());
                        }
                        None if hold_ports => held.push(port),
                        None => drop(port),
                    }
                }
            }
        });
        let registrar = Arc::new(AgentRegistrar::new());
        registrar.publish(AgentController::new(tx));
        registrar
    }

    #[tokio::test]
    async fn test_request_without_agent_is_not_ready() {
        let transport = AgentTransport::new(Arc::new(AgentRegistrar::new()));
        let err = transport.request(&AgentRequest::GetPackRegistry).await.unwrap_err();
        assert!(matches!(err, TransportError::NotReady));
    }

    #[tokio::test]
    async fn test_request_decodes_reply() {
        let reply = json!({"ok": true, "type": "PACK_REGISTRY", "payload": {}});
        let transport = AgentTransport::new(scripted_agent(Some(reply), false));
        let response = transport.request(&AgentRequest::GetPackRegistry).await.unwrap();
        assert!(matches!(response, AgentResponse::PackRegistry { payload } if payload.is_empty()));
    }

    #[tokio::test]
    async fn test_silent_agent_times_out() {
        let transport = AgentTransport::new(scripted_agent(None, true))
            .with_timeout(Duration::from_millis(30));
        let err = transport.request(&AgentRequest::GetPackRegistry).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(d) if d == Duration::from_millis(30)));
    }

    #[tokio::test]
    async fn test_dropped_port_is_disconnected() {
        let transport = AgentTransport::new(scripted_agent(None, false));
        let err = transport.request(&AgentRequest::GetPackRegistry).await.unwrap_err();
        assert!(matches!(err, TransportError::Disconnected));
    }

    #[tokio::test]
    async fn test_mismatched_ok_flag_is_malformed() {
        let reply = json!({"ok": false, "type": "PACK_REGISTRY", "payload": {}});
        let transport = AgentTransport::new(scripted_agent(Some(reply), false));
        let err = transport.request(&AgentRequest::GetPackRegistry).await.unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));

        let reply = json!({"ok": true, "type": "SOMETHING_ELSE"});
        let transport = AgentTransport::new(scripted_agent(Some(reply), false));
        let err = transport.request(&AgentRequest::GetPackRegistry).await.unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }
}
