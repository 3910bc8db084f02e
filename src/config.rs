//! Runtime configuration.
//!
//! Values come from an optional YAML file named by `DEVGATE_CONFIG`, then a
//! couple of environment overrides. The environment is only read in
//! [`Config::load`]; everything downstream receives plain values.
//!
//! ```yaml
//! server:
//!   listen_addr: "127.0.0.1:8080"
//! routing:
//!   upstream_origin: "http://localhost:5001"
//!   rules:
//!     - prefix: /api
//!       path_rewrite:
//!         - pattern: "^/api"
//!           replacement: "/api"
//!     - prefix: /login
//! static_files:
//!   root: dist
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::parser::MAX_BODY_BYTES;

/// Upstream used when `VITE_APP_API_URL` is unset or empty.
pub const DEFAULT_UPSTREAM_ORIGIN: &str = "http://localhost:5001";

pub const UPSTREAM_ORIGIN_ENV: &str = "VITE_APP_API_URL";
pub const LISTEN_ENV: &str = "LISTEN";
pub const CONFIG_PATH_ENV: &str = "DEVGATE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub routing: RoutingConfig,
    /// Local directory served for requests no rule forwards
    pub static_files: Option<StaticFilesConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Largest accepted request body; bigger ones get 413
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Input to [`RuleTable::from_config`](crate::routing::RuleTable::from_config).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Origin for every rule that doesn't name its own `target`
    pub upstream_origin: String,
    /// Checked top to bottom; first match wins
    pub rules: Vec<RuleConfig>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self::with_upstream(DEFAULT_UPSTREAM_ORIGIN)
    }
}

impl RoutingConfig {
    /// The default rule set pointed at `upstream_origin`.
    pub fn with_upstream(upstream_origin: impl Into<String>) -> Self {
        Self {
            upstream_origin: upstream_origin.into(),
            rules: default_rules(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    pub prefix: String,

    /// Overrides `upstream_origin` for this rule only
    #[serde(default)]
    pub target: Option<String>,

    #[serde(default = "default_change_origin")]
    pub change_origin: bool,

    #[serde(default)]
    pub path_rewrite: Vec<RewriteConfig>,
}

impl RuleConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            target: None,
            change_origin: default_change_origin(),
            path_rewrite: Vec::new(),
        }
    }

    pub fn rewrite(mut self, pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.path_rewrite.push(RewriteConfig {
            pattern: pattern.into(),
            replacement: replacement.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RewriteConfig {
    /// Regular expression, e.g. `^/api`
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    pub root: PathBuf,
    /// Served for extensionless paths that have no file (history-mode routing)
    pub index: String,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("dist"),
            index: "index.html".to_string(),
        }
    }
}

fn default_change_origin() -> bool {
    true
}

/// The rules the web client's dev server ships with.
pub fn default_rules() -> Vec<RuleConfig> {
    vec![
        RuleConfig::new("/api").rewrite("^/api", "/api"),
        RuleConfig::new("/login"),
        RuleConfig::new("/logout"),
        RuleConfig::new("/static").rewrite("^/static", "/static"),
        RuleConfig::new("/js").rewrite("^/js", "/js"),
        RuleConfig::new("/css").rewrite("^/css", "/css"),
    ]
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };

        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Applies `LISTEN` and `VITE_APP_API_URL`. Empty values count as unset.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get(LISTEN_ENV) {
            self.server.listen_addr = addr;
        }
        if let Some(origin) = get(UPSTREAM_ORIGIN_ENV) {
            self.routing.upstream_origin = origin;
        }
    }
}
