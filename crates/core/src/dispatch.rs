use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adaptor::LlmAdaptor;
use crate::api::ApiChatResponse;
use crate::codec::{self, CodecError};
use crate::errors::{check_response_error, BackendError};
use crate::translate;
use crate::wire::{
    Action, ChatRequest, ChatResponse, ListResponse, ProviderActionResponse, ProviderResponse,
    ShowRequest, ShowResponse, StatusError, OP_CHAT, OP_LIST, OP_SHOW,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Chat,
    Show,
    List,
    Unknown,
}

impl Operation {
    pub fn from_name(name: &str) -> Self {
        match name {
            OP_CHAT => Operation::Chat,
            OP_SHOW => Operation::Show,
            OP_LIST => Operation::List,
            _ => Operation::Unknown,
        }
    }
}

/// Routes actions to an [`LlmAdaptor`] and encodes the outcome.
pub struct Dispatcher<A> {
    adaptor: A,
}

impl<A: LlmAdaptor> Dispatcher<A> {
    pub fn new(adaptor: A) -> Self {
        Self { adaptor }
    }

    pub fn adaptor(&self) -> &A {
        &self.adaptor
    }

    /// Never fails: decode and backend errors are encoded into the reply,
    /// and only a failure to encode the reply itself lands in `error`.
    pub async fn handle_action(
        &self,
        cancel: &CancellationToken,
        action: &Action,
    ) -> ProviderResponse {
        info!(
            target: "core::dispatch",
            operation = %action.operation,
            id = action.id,
            "handle action"
        );

        let encoded = match Operation::from_name(&action.operation) {
            Operation::Chat => match codec::decode::<ChatRequest>(&action.msg) {
                Ok(req) => encode_reply(self.handle_chat(cancel, req).await),
                Err(e) => decode_failure(e),
            },
            Operation::Show => match codec::decode::<ShowRequest>(&action.msg) {
                Ok(req) => encode_reply(self.handle_show(cancel, req).await),
                Err(e) => decode_failure(e),
            },
            Operation::List => encode_reply(self.handle_list(cancel).await),
            Operation::Unknown => encode_reply::<()>(Err(StatusError::new(
                "",
                format!("Invalid method name: {}", action.operation),
            ))),
        };

        match encoded {
            Ok(msg) => ProviderResponse {
                id: action.id,
                msg: msg.into(),
                error: String::new(),
            },
            Err(e) => {
                warn!(
                    target: "core::dispatch",
                    operation = %action.operation,
                    "encode reply: {}",
                    e
                );
                ProviderResponse {
                    id: action.id,
                    error: e.to_string(),
                    ..Default::default()
                }
            }
        }
    }

    async fn handle_chat(
        &self,
        cancel: &CancellationToken,
        req: ChatRequest,
    ) -> Result<ChatResponse, StatusError> {
        let request = translate::chat_request(&req);
        // only the final callback invocation is reported
        let mut last: Option<ApiChatResponse> = None;
        let mut on_response = |r: ApiChatResponse| -> Result<(), BackendError> {
            last = Some(r);
            Ok(())
        };
        let res = self.adaptor.chat(cancel, &request, &mut on_response).await;
        if let Some(e) = check_response_error(res.err()) {
            warn!(target: "core::dispatch", model = %req.model, "chat failed: {}", e);
            return Err(e);
        }
        Ok(last.as_ref().map(translate::chat_response).unwrap_or_default())
    }

    async fn handle_show(
        &self,
        cancel: &CancellationToken,
        req: ShowRequest,
    ) -> Result<ShowResponse, StatusError> {
        let request = translate::show_request(&req);
        match self.adaptor.show(cancel, &request).await {
            Ok(r) => Ok(translate::show_response(r)),
            Err(e) => {
                warn!(target: "core::dispatch", name = %req.name, "show failed: {}", e);
                Err(e.into())
            }
        }
    }

    async fn handle_list(&self, cancel: &CancellationToken) -> Result<ListResponse, StatusError> {
        match self.adaptor.list(cancel).await {
            Ok(r) => Ok(translate::list_response(r)),
            Err(e) => {
                warn!(target: "core::dispatch", "list failed: {}", e);
                Err(e.into())
            }
        }
    }
}

fn encode_reply<T: Serialize>(res: Result<T, StatusError>) -> Result<Vec<u8>, CodecError> {
    codec::encode(&ProviderActionResponse::from(res))
}

fn decode_failure(e: CodecError) -> Result<Vec<u8>, CodecError> {
    encode_reply::<()>(Err(StatusError::new("", e.to_string())))
}
