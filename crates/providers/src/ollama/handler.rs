use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use llm_core::api::{
    ApiChatRequest, ApiErrorBody, ApiListResponse, ApiShowRequest, ApiShowResponse,
};
use llm_core::{BackendError, CancellationToken, ChatResponseFn, LlmAdaptor};
use serde::{de::DeserializeOwned, Serialize};
use tower::ServiceExt;
use tracing::debug;

use crate::ollama::stream::parse_chat_line;
use crate::ollama::{CHAT_PATH, LIST_PATH, SHOW_PATH};

/// Serves requests from an in-process router that exposes the backend API,
/// without any network I/O.
#[derive(Clone)]
pub struct HandlerAdaptor {
    router: Router,
}

impl HandlerAdaptor {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    async fn call(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, BackendError> {
        debug!(target: "providers::ollama", "handler {} {}", method, path);
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .map_err(|e| BackendError::Other(e.to_string()))?;

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BackendError::Canceled),
            r = self.router.clone().oneshot(req) => match r {
                Ok(resp) => resp,
                Err(never) => match never {},
            },
        };
        let status = resp.status();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BackendError::Canceled),
            b = to_bytes(resp.into_body(), usize::MAX) => {
                b.map_err(|e| BackendError::Other(e.to_string()))?
            }
        };
        if status.as_u16() >= 400 {
            return Err(handler_status_err(status, &body));
        }
        Ok(body)
    }

    async fn call_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        req: Option<&Req>,
    ) -> Result<Resp, BackendError> {
        let body = req
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| BackendError::Other(e.to_string()))?;
        let out = self.call(cancel, method, path, body).await?;
        serde_json::from_slice(&out).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

impl LlmAdaptor for HandlerAdaptor {
    async fn chat(
        &self,
        cancel: &CancellationToken,
        req: &ApiChatRequest,
        f: &mut ChatResponseFn<'_>,
    ) -> Result<(), BackendError> {
        let body = serde_json::to_vec(req).map_err(|e| BackendError::Other(e.to_string()))?;
        let out = self.call(cancel, Method::POST, CHAT_PATH, Some(body)).await?;
        for line in out.split(|b| *b == b'\n') {
            if cancel.is_cancelled() {
                return Err(BackendError::Canceled);
            }
            if let Some(r) = parse_chat_line(line)? {
                f(r)?;
            }
        }
        Ok(())
    }

    async fn show(
        &self,
        cancel: &CancellationToken,
        req: &ApiShowRequest,
    ) -> Result<ApiShowResponse, BackendError> {
        self.call_json(cancel, Method::POST, SHOW_PATH, Some(req)).await
    }

    async fn list(&self, cancel: &CancellationToken) -> Result<ApiListResponse, BackendError> {
        self.call_json::<(), _>(cancel, Method::GET, LIST_PATH, None).await
    }
}

/// Status text is the bare reason phrase; an unparsable body's parse error
/// becomes the message.
fn handler_status_err(status: StatusCode, body: &[u8]) -> BackendError {
    let reason = status.canonical_reason().unwrap_or_default();
    let message = match serde_json::from_slice::<ApiErrorBody>(body) {
        Ok(b) if !b.error.is_empty() => b.error,
        Ok(_) => String::from_utf8_lossy(body).trim().to_string(),
        Err(e) => e.to_string(),
    };
    BackendError::status(u32::from(status.as_u16()), reason, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        routing::{get, post},
        Json,
    };
    use llm_core::codec;
    use llm_core::wire::{
        Action, ChatRequest, ChatResponse, ListResponse, Message, ProviderActionResponse,
        ShowRequest, ShowResponse, OP_CHAT, OP_LIST, OP_SHOW,
    };
    use llm_core::Dispatcher;
    use serde_json::{json, Value};

    fn fake_backend() -> Router {
        Router::new()
            .route(
                CHAT_PATH,
                post(|Json(body): Json<Value>| async move {
                    let prompt = body["messages"][0]["content"].as_str().unwrap_or("").to_string();
                    Json(json!({
                        "model": body["model"],
                        "created_at": "2024-05-01T12:00:00Z",
                        "message": {"role": "assistant", "content": format!("echo: {}", prompt)},
                        "done": true,
                        "total_duration": 1_500_000_000u64,
                        "eval_count": 4
                    }))
                }),
            )
            .route(
                SHOW_PATH,
                post(|Json(body): Json<Value>| async move {
                    if body["name"] == json!("llama2") {
                        (
                            StatusCode::OK,
                            Json(json!({
                                "license": "LLAMA 2",
                                "parameters": "stop [INST]",
                                "template": "[INST] {{ .Prompt }} [/INST]",
                                "details": {"family": "llama", "families": null}
                            })),
                        )
                    } else {
                        (
                            StatusCode::NOT_FOUND,
                            Json(json!({"error": format!(
                                "model '{}' not found",
                                body["name"].as_str().unwrap_or("")
                            )})),
                        )
                    }
                }),
            )
            .route(
                LIST_PATH,
                get(|| async {
                    Json(json!({"models": [
                        {"name": "b", "size": 2, "details": {"families": ["llama"]}},
                        {"name": "a", "size": 1, "details": {}}
                    ]}))
                }),
            )
    }

    fn action(operation: &str, msg: Vec<u8>) -> Action {
        Action {
            id: 1,
            operation: operation.into(),
            msg: msg.into(),
        }
    }

    fn ok_reply<T: serde::de::DeserializeOwned>(msg: &[u8]) -> T {
        codec::decode_strict::<ProviderActionResponse<T>>(msg)
            .unwrap()
            .into_result()
            .unwrap()
    }

    #[tokio::test]
    async fn chat_through_dispatcher() {
        let d = Dispatcher::new(HandlerAdaptor::new(fake_backend()));
        let req = ChatRequest {
            model: "m1".into(),
            messages: vec![Message::new("user", "hi")],
            ..Default::default()
        };
        let resp = d
            .handle_action(
                &CancellationToken::new(),
                &action(OP_CHAT, codec::encode(&req).unwrap()),
            )
            .await;
        let out: ProviderActionResponse<ChatResponse> = codec::decode_strict(&resp.msg).unwrap();
        let ok = out.into_result().unwrap();
        assert_eq!(ok.model, "m1");
        assert_eq!(ok.message.content, "echo: hi");
        assert_eq!(ok.metrics.total_duration, 1500);
        assert_eq!(ok.metrics.eval_count, 4);
        assert_eq!(ok.created_at, 1_714_564_800_000);
    }

    #[tokio::test]
    async fn show_not_found_through_dispatcher() {
        let d = Dispatcher::new(HandlerAdaptor::new(fake_backend()));
        let req = ShowRequest {
            name: "missing".into(),
            ..Default::default()
        };
        let resp = d
            .handle_action(
                &CancellationToken::new(),
                &action(OP_SHOW, codec::encode(&req).unwrap()),
            )
            .await;
        let out: ProviderActionResponse<ShowResponse> = codec::decode_strict(&resp.msg).unwrap();
        match out {
            ProviderActionResponse::Err(e) => {
                assert_eq!(e.status_code, 404);
                assert_eq!(e.status, "Not Found");
                assert_eq!(e.error, "model 'missing' not found");
            }
            ProviderActionResponse::Ok(_) => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn show_and_list_translate() {
        let d = Dispatcher::new(HandlerAdaptor::new(fake_backend()));
        let req = ShowRequest {
            name: "llama2".into(),
            ..Default::default()
        };
        let resp = d
            .handle_action(
                &CancellationToken::new(),
                &action(OP_SHOW, codec::encode(&req).unwrap()),
            )
            .await;
        let show: ShowResponse = ok_reply(&resp.msg);
        assert_eq!(show.license, "LLAMA 2");
        assert_eq!(show.template, "[INST] {{ .Prompt }} [/INST]");
        assert!(show.details.families.is_empty());

        let resp = d
            .handle_action(&CancellationToken::new(), &action(OP_LIST, vec![]))
            .await;
        let list: ListResponse = ok_reply(&resp.msg);
        let names: Vec<_> = list.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(list.models[0].details.families, ["llama"]);
        assert!(list.models[1].details.families.is_empty());
    }

    #[tokio::test]
    async fn unparsable_error_body_reports_parse_failure() {
        let router = Router::new().route(
            LIST_PATH,
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "warming up") }),
        );
        let err = HandlerAdaptor::new(router)
            .list(&CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            BackendError::Status {
                status_code,
                status,
                message,
            } => {
                assert_eq!(status_code, 503);
                assert_eq!(status, "Service Unavailable");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancelled_before_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = HandlerAdaptor::new(fake_backend())
            .list(&cancel)
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Canceled);
    }
}
