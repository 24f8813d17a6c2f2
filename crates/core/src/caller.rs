//! Caller side of the action protocol.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adaptor::LlmAdaptor;
use crate::codec;
use crate::dispatch::Dispatcher;
use crate::wire::{
    Action, ChatRequest, ChatResponse, ListResponse, ProviderActionResponse, ShowRequest,
    ShowResponse, StatusError, OP_CHAT, OP_LIST, OP_SHOW,
};

pub const PRE_CALL_STATUS: &str = "PreCall";
pub const FAILED_CALL_STATUS: &str = "FailedCall";
pub const INVALID_CALL_RESPONSE_STATUS: &str = "InvalidCallResponse";

#[derive(Error, Debug)]
#[error("transport: {0}")]
pub struct TransportError(pub String);

/// Delivers an encoded action to a provider and returns its encoded reply.
#[allow(async_fn_in_trait)]
pub trait ActionTransport: Send + Sync {
    async fn call(&self, operation: &str, payload: Bytes) -> Result<Bytes, TransportError>;
}

/// In-process loopback: the dispatcher answers directly.
impl<A: LlmAdaptor> ActionTransport for Dispatcher<A> {
    async fn call(&self, operation: &str, payload: Bytes) -> Result<Bytes, TransportError> {
        let action = Action {
            id: 0,
            operation: operation.to_string(),
            msg: payload,
        };
        let resp = self.handle_action(&CancellationToken::new(), &action).await;
        if !resp.error.is_empty() {
            return Err(TransportError(resp.error));
        }
        Ok(resp.msg)
    }
}

/// Typed client for the `Llm.*` operations.
pub struct ActionCaller<T> {
    transport: T,
}

impl<T: ActionTransport> ActionCaller<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, StatusError> {
        let payload = encode_request(req)?;
        self.call(OP_CHAT, payload.into()).await
    }

    pub async fn show(&self, req: &ShowRequest) -> Result<ShowResponse, StatusError> {
        let payload = encode_request(req)?;
        self.call(OP_SHOW, payload.into()).await
    }

    pub async fn list(&self) -> Result<ListResponse, StatusError> {
        self.call(OP_LIST, Bytes::new()).await
    }

    async fn call<R: DeserializeOwned>(
        &self,
        operation: &str,
        payload: Bytes,
    ) -> Result<R, StatusError> {
        debug!(target: "core::caller", operation, len = payload.len(), "call");
        let reply = self
            .transport
            .call(operation, payload)
            .await
            .map_err(|e| StatusError::new(FAILED_CALL_STATUS, e.to_string()))?;
        codec::decode_strict::<ProviderActionResponse<R>>(&reply)
            .map_err(|e| StatusError::new(INVALID_CALL_RESPONSE_STATUS, e.to_string()))?
            .into_result()
    }
}

fn encode_request<T: serde::Serialize>(req: &T) -> Result<Vec<u8>, StatusError> {
    codec::encode(req).map_err(|e| StatusError::new(PRE_CALL_STATUS, e.to_string()))
}
