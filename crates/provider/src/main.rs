mod cli;
mod host;
mod logging;
mod startup;

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Backend, Cli};
use llm_core::{CancellationToken, Dispatcher, LlmAdaptor};
use providers::ollama::{EmbeddedServer, OllamaClient, OllamaConfig};
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

/// How long shutdown waits for blocking-pool work such as a pending stdin read.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() {
    let cli = Cli::parse();

    // environment changes must happen before the runtime spawns threads
    let host_data = match startup::read_host_data(&mut std::io::stdin().lock()) {
        Ok(hd) => hd,
        Err(e) => fatal(&e),
    };
    let provider_cfg = match host_data.provider_config() {
        Ok(cfg) => cfg,
        Err(e) => fatal(&e),
    };
    let home = startup::ensure_home(&provider_cfg.work_path);

    let level = host_data.log_level.clone().unwrap_or_else(|| "info".to_string());
    let _guard = logging::init(&level);
    info!(
        target: "provider",
        host_id = %host_data.host_id,
        link_name = %host_data.link_name,
        "provider starting with {:?} backend",
        cli.backend
    );
    if let Some(home) = home {
        info!(target: "provider", "home directory set to {}", home.display());
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build runtime")
    {
        Ok(rt) => rt,
        Err(e) => fatal(&e),
    };
    if let Err(e) = run_to_completion(runtime, run(cli)) {
        error!(target: "provider", "{:#}", e);
        fatal(&e);
    }
    info!(target: "provider", "provider stopped");
}

async fn run(cli: Cli) -> Result<()> {
    let mut cfg = OllamaConfig::from_env_and_file()?;
    if let Some(bin) = cli.ollama_bin {
        cfg.ollama_bin = bin;
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "provider", "interrupt received");
            on_signal.cancel();
        }
    });

    match cli.backend {
        Backend::Remote => {
            let client = OllamaClient::new(cfg)?;
            if let Err(e) = client.heartbeat(&cancel).await {
                warn!(target: "provider", "backend not reachable yet: {}", e);
            }
            serve_stdio(Dispatcher::new(client), &cancel).await
        }
        Backend::Embedded => {
            let server = EmbeddedServer::start(cfg, &cancel).await?;
            serve_stdio(Dispatcher::new(server), &cancel).await
        }
    }
}

/// Drives `fut` and then stops the runtime without joining blocking reads that
/// never complete: stdin stays open after a Ctrl-C.
fn run_to_completion<F: Future>(runtime: Runtime, fut: F) -> F::Output {
    let out = runtime.block_on(fut);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    out
}

async fn serve_stdio<A: LlmAdaptor>(
    dispatcher: Dispatcher<A>,
    cancel: &CancellationToken,
) -> Result<()> {
    host::serve(&dispatcher, tokio::io::stdin(), tokio::io::stdout(), cancel).await
}

fn fatal(e: &anyhow::Error) -> ! {
    eprintln!("ollama-provider: {:#}", e);
    std::process::exit(1)
}
