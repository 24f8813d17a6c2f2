use anyhow::Context;
use directories::BaseDirs;
use serde::Deserialize;
use std::{env, fs, path::PathBuf, time::Duration};
use url::Url;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 11434;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OllamaFileConfig {
    pub host: Option<String>,
    pub timeout_ms: Option<u64>,
    pub ollama_bin: Option<String>,
    pub ready_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Normalized `scheme://host:port/`, as returned by [`parse_host`].
    pub base_url: String,
    /// Whole-request limit. Unset by default: generations may run for as long
    /// as the caller's cancellation token allows.
    pub timeout: Option<Duration>,
    pub proxy: Option<String>,
    /// Executable started by the embedded backend.
    pub ollama_bin: String,
    /// How long the embedded backend waits for the server to answer.
    pub ready_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        OllamaConfig {
            base_url: format!("http://{}:{}/", DEFAULT_HOST, DEFAULT_PORT),
            timeout: None,
            proxy: None,
            ollama_bin: "ollama".to_string(),
            ready_timeout: Duration::from_secs(30),
        }
    }
}

impl OllamaConfig {
    /// Defaults, then the optional config file, then `OLLAMA_HOST`.
    pub fn from_env_and_file() -> anyhow::Result<Self> {
        let mut cfg = OllamaConfig::default();

        if let Some(path) = Self::config_path() {
            if path.exists() {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("read config file: {}", path.display()))?;
                let file_cfg: OllamaFileConfig = toml::from_str(&raw)
                    .with_context(|| format!("parse config file: {}", path.display()))?;
                cfg.apply_file(file_cfg)?;
            }
        }

        if let Ok(host) = env::var("OLLAMA_HOST") {
            if !host.trim().is_empty() {
                cfg.base_url = parse_host(&host)?;
            }
        }

        cfg.proxy = env::var("HTTPS_PROXY")
            .ok()
            .or_else(|| env::var("HTTP_PROXY").ok());

        Ok(cfg)
    }

    pub fn apply_file(&mut self, file_cfg: OllamaFileConfig) -> anyhow::Result<()> {
        if let Some(h) = file_cfg.host {
            self.base_url = parse_host(&h)?;
        }
        if let Some(t) = file_cfg.timeout_ms {
            self.timeout = Some(Duration::from_millis(t));
        }
        if let Some(b) = file_cfg.ollama_bin {
            self.ollama_bin = b;
        }
        if let Some(r) = file_cfg.ready_timeout_ms {
            self.ready_timeout = Duration::from_millis(r);
        }
        Ok(())
    }

    /// `host:port` form of the base url, as the backend expects in `OLLAMA_HOST`.
    pub fn host_port(&self) -> String {
        let url = Url::parse(&self.base_url).ok();
        let host = url
            .as_ref()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = url
            .as_ref()
            .and_then(Url::port_or_known_default)
            .unwrap_or(DEFAULT_PORT);
        format!("{}:{}", host, port)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        let p = if cfg!(target_os = "windows") {
            base.home_dir().join(".ollama-provider").join("config.toml")
        } else {
            base.config_dir().join("ollama-provider").join("config.toml")
        };
        Some(p)
    }
}

/// Accepts `host`, `host:port`, `:port` or a full url. Bare hosts get the
/// default port.
pub fn parse_host(raw: &str) -> anyhow::Result<String> {
    let raw = raw.trim().trim_end_matches('/');
    let full = if raw.contains("://") {
        raw.to_string()
    } else {
        let raw = if raw.starts_with(':') {
            format!("{}{}", DEFAULT_HOST, raw)
        } else {
            raw.to_string()
        };
        if raw.contains(':') {
            format!("http://{}", raw)
        } else {
            format!("http://{}:{}", raw, DEFAULT_PORT)
        }
    };
    let url = Url::parse(&full).with_context(|| format!("invalid ollama host: {}", raw))?;
    Ok(url.to_string())
}
