use std::process::Stdio;

use anyhow::{bail, Context};
use llm_core::api::{ApiChatRequest, ApiListResponse, ApiShowRequest, ApiShowResponse};
use llm_core::{BackendError, CancellationToken, ChatResponseFn, LlmAdaptor};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, info};

use crate::ollama::client::OllamaClient;
use crate::ollama::config::OllamaConfig;

/// Runs `ollama serve` as a child process and talks to it over HTTP.
/// The child is killed when this value is dropped.
pub struct EmbeddedServer {
    client: OllamaClient,
    child: Child,
}

impl EmbeddedServer {
    pub async fn start(cfg: OllamaConfig, cancel: &CancellationToken) -> anyhow::Result<Self> {
        info!(
            target: "providers::ollama",
            "starting {} serve on {}",
            cfg.ollama_bin,
            cfg.host_port()
        );
        // stdout belongs to the host wire protocol
        let child = Command::new(&cfg.ollama_bin)
            .arg("serve")
            .env("OLLAMA_HOST", cfg.host_port())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn {}", cfg.ollama_bin))?;
        let client = OllamaClient::new(cfg)?;
        let mut server = Self { client, child };
        server.wait_ready(cancel).await?;
        Ok(server)
    }

    async fn wait_ready(&mut self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let ready_timeout = self.client.config().ready_timeout;
        let deadline = Instant::now() + ready_timeout;
        let mut attempt = 0u64;
        loop {
            if let Some(status) = self.child.try_wait()? {
                bail!("ollama server exited early: {}", status);
            }
            // a server that accepts but never answers must not outlast the deadline
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.client.heartbeat(cancel)).await {
                Ok(Ok(())) => {
                    info!(
                        target: "providers::ollama",
                        "ollama server ready after {} attempts",
                        attempt + 1
                    );
                    return Ok(());
                }
                Ok(Err(BackendError::Canceled)) => {
                    bail!("canceled while waiting for ollama server")
                }
                Ok(Err(e)) => {
                    if Instant::now() >= deadline {
                        bail!("ollama server not ready: {}", e);
                    }
                    debug!(target: "providers::ollama", "waiting for ollama server: {}", e);
                }
                Err(_) => bail!("ollama server not ready after {:?}", ready_timeout),
            }
            attempt += 1;
            let backoff = Duration::from_millis((100 * attempt).min(1_000));
            tokio::select! {
                _ = cancel.cancelled() => bail!("canceled while waiting for ollama server"),
                _ = sleep(backoff) => {}
            }
        }
    }
}

impl LlmAdaptor for EmbeddedServer {
    async fn chat(
        &self,
        cancel: &CancellationToken,
        req: &ApiChatRequest,
        f: &mut ChatResponseFn<'_>,
    ) -> Result<(), BackendError> {
        self.client.chat(cancel, req, f).await
    }

    async fn show(
        &self,
        cancel: &CancellationToken,
        req: &ApiShowRequest,
    ) -> Result<ApiShowResponse, BackendError> {
        self.client.show(cancel, req).await
    }

    async fn list(&self, cancel: &CancellationToken) -> Result<ApiListResponse, BackendError> {
        self.client.list(cancel).await
    }
}
