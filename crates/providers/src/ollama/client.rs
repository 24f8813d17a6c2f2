use crate::ollama::config::OllamaConfig;
use crate::ollama::stream::{ndjson_lines, parse_chat_line};
use crate::ollama::{CHAT_PATH, HEARTBEAT_PATH, LIST_PATH, SHOW_PATH};
use bytes::Bytes;
use futures::StreamExt;
use llm_core::api::{
    ApiChatRequest, ApiErrorBody, ApiListResponse, ApiShowRequest, ApiShowResponse,
};
use llm_core::{BackendError, CancellationToken, ChatResponseFn, LlmAdaptor};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::Duration;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to a running backend over its HTTP API.
#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    cfg: OllamaConfig,
}

impl OllamaClient {
    pub fn new(cfg: OllamaConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .connect_timeout(CONNECT_TIMEOUT);
        if let Some(t) = cfg.timeout {
            builder = builder.timeout(t);
        }
        // only the proxy resolved into the config is used; reqwest's own lookup is off
        builder = match &cfg.proxy {
            Some(p) => builder.proxy(reqwest::Proxy::all(p)?),
            None => builder.no_proxy(),
        };
        let http = builder.build()?;
        info!(target: "providers::ollama", "client for {}", cfg.base_url);
        Ok(Self { http, cfg })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.cfg
    }

    /// Succeeds once the server answers on its root path.
    pub async fn heartbeat(&self, cancel: &CancellationToken) -> Result<(), BackendError> {
        self.send(cancel, self.http.get(self.cfg.endpoint(HEARTBEAT_PATH)))
            .await
            .map(|_| ())
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        req: RequestBuilder,
    ) -> Result<Response, BackendError> {
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BackendError::Canceled),
            r = req.send() => r.map_err(map_reqwest_err)?,
        };
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.bytes().await.ok();
            warn!(target: "providers::ollama", "non-success status={} body={:?}", status, body);
            return Err(map_status_err(status, body));
        }
        Ok(resp)
    }

    async fn read_json<T: DeserializeOwned>(
        cancel: &CancellationToken,
        resp: Response,
    ) -> Result<T, BackendError> {
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BackendError::Canceled),
            b = resp.bytes() => b.map_err(map_reqwest_err)?,
        };
        serde_json::from_slice(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

impl LlmAdaptor for OllamaClient {
    async fn chat(
        &self,
        cancel: &CancellationToken,
        req: &ApiChatRequest,
        f: &mut ChatResponseFn<'_>,
    ) -> Result<(), BackendError> {
        let url = self.cfg.endpoint(CHAT_PATH);
        debug!(target: "providers::ollama", "chat model={} url={}", req.model, url);
        let resp = self.send(cancel, self.http.post(url).json(req)).await?;

        // a non-streaming reply is a single record, a streaming one is many
        let mut lines = Box::pin(ndjson_lines(
            resp.bytes_stream().map(|r| r.map_err(map_reqwest_err)),
        ));
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BackendError::Canceled),
                n = lines.next() => n,
            };
            match next {
                Some(line) => {
                    if let Some(r) = parse_chat_line(&line?)? {
                        f(r)?;
                    }
                }
                None => return Ok(()),
            }
        }
    }

    async fn show(
        &self,
        cancel: &CancellationToken,
        req: &ApiShowRequest,
    ) -> Result<ApiShowResponse, BackendError> {
        let url = self.cfg.endpoint(SHOW_PATH);
        debug!(target: "providers::ollama", "show name={} url={}", req.name, url);
        let resp = self.send(cancel, self.http.post(url).json(req)).await?;
        Self::read_json(cancel, resp).await
    }

    async fn list(&self, cancel: &CancellationToken) -> Result<ApiListResponse, BackendError> {
        let url = self.cfg.endpoint(LIST_PATH);
        debug!(target: "providers::ollama", "list url={}", url);
        let resp = self.send(cancel, self.http.get(url)).await?;
        Self::read_json(cancel, resp).await
    }
}

fn map_reqwest_err(e: reqwest::Error) -> BackendError {
    if e.is_decode() {
        BackendError::Decode(e.to_string())
    } else if e.is_timeout() || e.is_request() || e.is_connect() || e.is_body() {
        BackendError::Network(e.to_string())
    } else {
        BackendError::Other(e.to_string())
    }
}

/// Mirrors the backend's own client: `status` is the full status line and the
/// message comes from the body's `error` field when present.
fn map_status_err(status: StatusCode, body: Option<Bytes>) -> BackendError {
    let body = body.unwrap_or_default();
    let message = match serde_json::from_slice::<ApiErrorBody>(&body) {
        Ok(b) if !b.error.is_empty() => b.error,
        _ => String::from_utf8_lossy(&body).trim().to_string(),
    };
    BackendError::status(u32::from(status.as_u16()), status.to_string(), message)
}
