use std::path::PathBuf;
use tracing::warn;

use crate::placement::model::DEFAULT_CLASS_CAPACITY;

pub const ENV_WORKSPACE: &str = "CLASSLISTD_WORKSPACE";
pub const ENV_DEFAULT_CAPACITY: &str = "CLASSLISTD_DEFAULT_CAPACITY";
pub const ENV_LOG: &str = "CLASSLISTD_LOG";

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Workspace opened at startup, before any `workspace.select`.
    pub workspace: Option<PathBuf>,
    pub default_capacity: u32,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            default_capacity: DEFAULT_CLASS_CAPACITY,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(ws) = lookup(ENV_WORKSPACE).filter(|v| !v.trim().is_empty()) {
            cfg.workspace = Some(PathBuf::from(ws.trim()));
        }

        if let Some(raw) = lookup(ENV_DEFAULT_CAPACITY) {
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => cfg.default_capacity = n,
                _ => warn!(
                    value = %raw,
                    fallback = DEFAULT_CLASS_CAPACITY,
                    "ignoring invalid {ENV_DEFAULT_CAPACITY}"
                ),
            }
        }

        cfg.log_filter = log_filter_from(&lookup);
        cfg
    }
}

/// Log filter alone, so tracing can start before the rest of the config
/// is read and its warnings have somewhere to go.
pub fn log_filter_from_env() -> String {
    log_filter_from(&|key: &str| std::env::var(key).ok())
}

fn log_filter_from<F>(lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(ENV_LOG)
        .or_else(|| lookup("RUST_LOG"))
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

/// Logs go to stderr; stdout carries the IPC responses.
pub fn init_tracing(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
