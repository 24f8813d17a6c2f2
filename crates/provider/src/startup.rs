use std::{env, io::BufRead, path::PathBuf};

use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::Deserialize;

#[cfg(windows)]
const HOME_VAR: &str = "USERPROFILE";
#[cfg(not(windows))]
const HOME_VAR: &str = "HOME";

const MISSING_WORK_PATH: &str =
    "work path is not set, please specify the provider config when starting the provider";

/// Startup record the host writes as the first line on stdin.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HostData {
    pub host_id: String,
    pub provider_key: String,
    pub link_name: String,
    pub config_json: String,
    pub log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub work_path: String,
}

pub fn read_host_data<R: BufRead>(r: &mut R) -> Result<HostData> {
    let mut line = String::new();
    r.read_line(&mut line).context("read host data")?;
    let line = line.trim();
    if line.is_empty() {
        bail!("no host data on stdin");
    }
    serde_json::from_str(line).context("parse host data")
}

impl HostData {
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        let cfg: ProviderConfig = if self.config_json.trim().is_empty() {
            ProviderConfig::default()
        } else {
            serde_json::from_str(&self.config_json).context("parse provider config")?
        };
        if cfg.work_path.trim().is_empty() {
            bail!(MISSING_WORK_PATH);
        }
        Ok(cfg)
    }
}

/// The host scrubs most of the environment. When no home directory can be
/// resolved, point it at the work path so the backend finds its model store.
///
/// Mutates the process environment: call once, before any thread is spawned.
/// Returns the path that was set, if any.
pub fn ensure_home(work_path: &str) -> Option<PathBuf> {
    let home_set = env::var_os(HOME_VAR).is_some_and(|h| !h.is_empty());
    if home_set && BaseDirs::new().is_some() {
        return None;
    }
    env::set_var(HOME_VAR, work_path);
    Some(PathBuf::from(work_path))
}
