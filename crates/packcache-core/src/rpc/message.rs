//! Wire shapes exchanged with the caching agent.
//!
//! Requests:
//! - `{"type":"CACHE_PACK","payload":{"slug","version","resources"}}`
//! - `{"type":"CACHE_MANDATORY_PACKS"}`
//! - `{"type":"GET_PACK_REGISTRY"}`
//!
//! Responses carry an `ok` flag next to the type tag:
//! - `{"ok":true,"type":"CACHE_PACK_SUCCESS","payload":{"slug","version"}}`
//! - `{"ok":true,"type":"PACK_REGISTRY","payload":{...}}`
//! - `{"ok":false,"type":"CACHE_PACK_ERROR","error":"..."}`

use serde::{Deserialize, Serialize};

use crate::models::DownloadedPackMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CachePackPayload {
    pub slug: String,
    pub version: String,
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CachePackConfirmation {
    pub slug: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRequest {
    CachePack(CachePackPayload),
    CacheMandatoryPacks,
    GetPackRegistry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentResponse {
    CachePackSuccess { payload: CachePackConfirmation },
    PackRegistry { payload: DownloadedPackMap },
    CachePackError { error: String },
}

impl AgentResponse {
    pub fn is_ok(&self) -> bool {
        !matches!(self, AgentResponse::CachePackError { .. })
    }
}

/// An `AgentResponse` with its `ok` flag, as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub ok: bool,
    #[serde(flatten)]
    pub response: AgentResponse,
}

impl From<AgentResponse> for ResponseEnvelope {
    fn from(response: AgentResponse) -> Self {
        Self {
            ok: response.is_ok(),
            response,
        }
    }
}
