//! # Application Configuration
//!
//! [`AppConfig`] is loaded from YAML, every field has a default, and a few
//! environment variables are layered on top:
//!
//! ```yaml
//! server:
//!   addr: "127.0.0.1:8080"
//!   stack_size: 0x8000
//! templates:
//!   paths: ["templates"]
//!   theme: dark
//! pagination:
//!   default_limit: 20
//! auth:
//!   allowed_domains: ["example.com"]
//! ```
//!
//! | Variable | Overrides |
//! |---|---|
//! | `WAYPOST_ADDR` | `server.addr` |
//! | `WAYPOST_STACK_SIZE` | `server.stack_size`, decimal or `0x` hex |
//! | `WAYPOST_TEMPLATE_PATH` | prepended to `templates.paths` |
//!
//! The process-wide copy is set once with [`init`] and read with [`get`].
//! Request handling never mutates it.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

static CONFIG: OnceCell<AppConfig> = OnceCell::new();
static DEFAULT: Lazy<AppConfig> = Lazy::new(AppConfig::default);

/// Default coroutine stack size (32 KB).
pub const DEFAULT_STACK_SIZE: usize = 0x8000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub templates: TemplatesConfig,
    pub session: SessionConfig,
    pub pagination: PaginationConfig,
    pub auth: AuthConfig,
    pub json: JsonConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// Coroutine stack size in bytes.
    pub stack_size: usize,
    /// Worker threads; `None` uses the number of CPUs.
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            stack_size: DEFAULT_STACK_SIZE,
            workers: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Search path, first match wins. Built-in scaffold templates come last.
    pub paths: Vec<PathBuf>,
    pub extension: String,
    pub theme: Option<String>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            extension: "html".to_string(),
            theme: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "waypost_session".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: usize,
    /// Upper bound for a client-supplied `limit`.
    pub max_limit: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

/// Identity headers and the domain allow-list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub allowed_domains: Vec<String>,
    pub user_header: String,
    pub admin_header: String,
    pub user_id_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            user_header: "x-user-email".to_string(),
            admin_header: "x-user-admin".to_string(),
            user_id_header: "x-user-id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonConfig {
    /// Pretty-print JSON views.
    pub indent: bool,
}

/// Parse `0x8000` or `32768`.
pub fn parse_size(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

impl AppConfig {
    /// Read a YAML file. Missing sections take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Layer `WAYPOST_*` variables over the current values.
    pub fn apply_env(&mut self) {
        if let Ok(addr) = env::var("WAYPOST_ADDR") {
            self.server.addr = addr;
        }
        if let Ok(raw) = env::var("WAYPOST_STACK_SIZE") {
            match parse_size(&raw) {
                Some(size) => self.server.stack_size = size,
                None => warn!(value = %raw, "Ignoring invalid WAYPOST_STACK_SIZE"),
            }
        }
        if let Ok(path) = env::var("WAYPOST_TEMPLATE_PATH") {
            self.templates.paths.insert(0, PathBuf::from(path));
        }
    }
}

/// Set the process-wide configuration. Only the first call has an effect;
/// later calls return `false`.
pub fn init(config: AppConfig) -> bool {
    CONFIG.set(config).is_ok()
}

/// The process-wide configuration, or the defaults when [`init`] was never called.
pub fn get() -> &'static AppConfig {
    CONFIG.get().unwrap_or(&*DEFAULT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.addr, "0.0.0.0:8080");
        assert_eq!(config.server.stack_size, 0x8000);
        assert_eq!(config.templates.extension, "html");
        assert_eq!(config.session.cookie_name, "waypost_session");
        assert_eq!(config.pagination.default_limit, 10);
        assert_eq!(config.pagination.max_limit, 100);
        assert_eq!(config.auth.user_header, "x-user-email");
        assert!(!config.json.indent);
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  addr: \"127.0.0.1:9000\"\npagination:\n  default_limit: 25\ntemplates:\n  paths: [\"views\"]\n  theme: dark"
        )
        .unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:9000");
        assert_eq!(config.server.stack_size, DEFAULT_STACK_SIZE);
        assert_eq!(config.pagination.default_limit, 25);
        assert_eq!(config.pagination.max_limit, 100);
        assert_eq!(config.templates.paths, vec![PathBuf::from("views")]);
        assert_eq!(config.templates.theme.as_deref(), Some("dark"));
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let err = AppConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.yaml"));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("0x8000"), Some(32768));
        assert_eq!(parse_size("16384"), Some(16384));
        assert_eq!(parse_size("lots"), None);
    }
}
