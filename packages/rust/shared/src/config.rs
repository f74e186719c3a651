//! Notifier configuration.
//!
//! User config lives at `~/.errbit/errbit.toml`.
//! CLI flags and per-call options override config file values, which override
//! defaults. [`NotifierConfig`] is the partial, mergeable bag;
//! [`NotifierConfig::resolve`] validates it and fills every default, producing
//! the [`ResolvedConfig`] that notices and writers consume.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ErrbitError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "errbit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".errbit";

const DEFAULT_TIMEOUT_SECS: u64 = 3;
const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_AGENT: &str = "errbitRust";
const DEFAULT_PARAMS_FILTER: &str = "password";
const PROJECT_ROOT_REPLACEMENT: &str = "[PROJECT_ROOT]";
const UNKNOWN_HOSTNAME: &str = "<unknown>";

/// Written by [`init_config`].
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Errbit notifier configuration.
# `api_key` and `host` are required; everything else has a default.

# api_key = "your-project-api-key"
# host = "errbit.example.com"
# port = 443
# secure = true
# async = false
# connect_timeout = 3
# write_timeout = 3
# environment_name = "production"
# params_filters = ["password", "token"]
# skipped_exceptions = ["Notice"]
# ignore_user_agent = ["Googlebot"]
# default_writer = "socket"

# [[backtrace_filters]]
# pattern = "^/srv/app"
# replacement = "[PROJECT_ROOT]"
"#;

// ---------------------------------------------------------------------------
// Writer selection
// ---------------------------------------------------------------------------

/// Which transport the client instantiates when no writer was injected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterKind {
    /// Raw TCP/TLS/UDP socket writer.
    #[default]
    Socket,
    /// Pooled HTTP client writer.
    Http,
}

impl std::fmt::Display for WriterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Socket => write!(f, "socket"),
            Self::Http => write!(f, "http"),
        }
    }
}

impl FromStr for WriterKind {
    type Err = ErrbitError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "socket" => Ok(Self::Socket),
            "http" => Ok(Self::Http),
            other => Err(ErrbitError::config(format!(
                "unknown writer '{other}', expected 'socket' or 'http'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Partial config (file / per-call overrides)
// ---------------------------------------------------------------------------

/// A `pattern → replacement` pair as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktraceFilterConfig {
    /// Regular expression matched against file paths and method names.
    pub pattern: String,
    /// Replacement text; `$1`-style group references are expanded.
    pub replacement: String,
}

/// Partial notifier configuration. Every field is optional so that the
/// persistent client config and per-call overrides can be merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    /// Fire-and-forget UDP delivery with chunking.
    #[serde(rename = "async", skip_serializing_if = "Option::is_none")]
    pub async_mode: Option<bool>,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params_filters: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backtrace_filters: Option<Vec<BacktraceFilterConfig>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_exceptions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_user_agent: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_writer: Option<WriterKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Response bytes the socket writer drains before closing, for proxies
    /// that abort requests whose client hangs up early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_read_bytes: Option<usize>,
}

impl NotifierConfig {
    /// Config with just the two required keys set.
    pub fn new(api_key: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            host: Some(host.into()),
            ..Self::default()
        }
    }

    /// Overlay every value set in `other` onto `self`.
    pub fn merge(&mut self, other: &NotifierConfig) {
        fn overlay<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if let Some(v) = src {
                *dst = Some(v.clone());
            }
        }

        overlay(&mut self.api_key, &other.api_key);
        overlay(&mut self.host, &other.host);
        overlay(&mut self.port, &other.port);
        overlay(&mut self.secure, &other.secure);
        overlay(&mut self.async_mode, &other.async_mode);
        overlay(&mut self.connect_timeout, &other.connect_timeout);
        overlay(&mut self.write_timeout, &other.write_timeout);
        overlay(&mut self.project_root, &other.project_root);
        overlay(&mut self.environment_name, &other.environment_name);
        overlay(&mut self.params_filters, &other.params_filters);
        overlay(&mut self.backtrace_filters, &other.backtrace_filters);
        overlay(&mut self.skipped_exceptions, &other.skipped_exceptions);
        overlay(&mut self.ignore_user_agent, &other.ignore_user_agent);
        overlay(&mut self.default_writer, &other.default_writer);
        overlay(&mut self.agent, &other.agent);
        overlay(&mut self.hostname, &other.hostname);
        overlay(&mut self.proxy_read_bytes, &other.proxy_read_bytes);
    }

    /// Owned copy of `self` with `other` merged on top.
    pub fn merged(&self, other: &NotifierConfig) -> Self {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// Validate the config and fill every default (`checkConfig`).
    ///
    /// Fails if `api_key` or `host` is missing/empty, or if a filter pattern
    /// is not a valid regular expression.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let api_key = non_empty(&self.api_key)
            .ok_or_else(|| ErrbitError::config("`api_key' must be configured"))?;
        let host = non_empty(&self.host)
            .ok_or_else(|| ErrbitError::config("`host' must be configured"))?;

        let port = match self.port {
            Some(p) if p != 0 => p,
            _ if self.secure.unwrap_or(false) => 443,
            _ => 80,
        };
        let secure = self.secure.unwrap_or(port == 443);

        let project_root = non_empty(&self.project_root)
            .map(String::from)
            .unwrap_or_else(default_project_root);

        let params_filters = match &self.params_filters {
            Some(patterns) => patterns
                .iter()
                .map(|p| compile(p, "params_filters"))
                .collect::<Result<Vec<_>>>()?,
            None => vec![compile(DEFAULT_PARAMS_FILTER, "params_filters")?],
        };

        let backtrace_filters = match &self.backtrace_filters {
            Some(filters) => filters
                .iter()
                .map(|f| {
                    Ok(BacktraceFilter {
                        pattern: compile(&f.pattern, "backtrace_filters")?,
                        replacement: f.replacement.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => vec![BacktraceFilter {
                pattern: compile(
                    &format!("^{}", regex::escape(&project_root)),
                    "backtrace_filters",
                )?,
                replacement: PROJECT_ROOT_REPLACEMENT.into(),
            }],
        };

        Ok(ResolvedConfig {
            api_key: api_key.to_string(),
            host: host.to_string(),
            port,
            secure,
            async_mode: self.async_mode.unwrap_or(false),
            connect_timeout: Duration::from_secs(
                self.connect_timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            write_timeout: Duration::from_secs(self.write_timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            project_root,
            environment_name: non_empty(&self.environment_name)
                .unwrap_or(DEFAULT_ENVIRONMENT)
                .to_string(),
            params_filters,
            backtrace_filters,
            skipped_exceptions: self.skipped_exceptions.clone().unwrap_or_default(),
            ignore_user_agent: self.ignore_user_agent.clone().unwrap_or_default(),
            default_writer: self.default_writer.unwrap_or_default(),
            agent: self
                .agent
                .clone()
                .unwrap_or_else(|| DEFAULT_AGENT.to_string()),
            hostname: non_empty(&self.hostname)
                .map(String::from)
                .unwrap_or_else(default_hostname),
            proxy_read_bytes: self.proxy_read_bytes.filter(|n| *n > 0),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn compile(pattern: &str, key: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| ErrbitError::config(format!("invalid pattern '{pattern}' in `{key}': {e}")))
}

fn default_project_root() -> String {
    std::env::current_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn default_hostname() -> String {
    system_hostname()
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| UNKNOWN_HOSTNAME.to_string())
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .map(|name| name.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    None
}

// ---------------------------------------------------------------------------
// Resolved config
// ---------------------------------------------------------------------------

/// A compiled backtrace filter.
#[derive(Debug, Clone)]
pub struct BacktraceFilter {
    pub pattern: Regex,
    pub replacement: String,
}

/// Fully validated configuration with every default filled in.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub api_key: String,
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub async_mode: bool,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub project_root: String,
    pub environment_name: String,
    pub params_filters: Vec<Regex>,
    pub backtrace_filters: Vec<BacktraceFilter>,
    pub skipped_exceptions: Vec<String>,
    pub ignore_user_agent: Vec<String>,
    pub default_writer: WriterKind,
    pub agent: String,
    pub hostname: String,
    pub proxy_read_bytes: Option<usize>,
}

impl ResolvedConfig {
    /// Run every backtrace filter over `input`, in configured order.
    pub fn filter_trace(&self, input: &str) -> String {
        self.backtrace_filters
            .iter()
            .fold(input.to_string(), |acc, filter| {
                filter
                    .pattern
                    .replace_all(&acc, filter.replacement.as_str())
                    .into_owned()
            })
    }

    /// Whether a parameter key must be redacted.
    pub fn is_filtered_param(&self, key: &str) -> bool {
        self.params_filters.iter().any(|re| re.is_match(key))
    }

    /// Whether a user agent matches the ignore list.
    pub fn is_ignored_user_agent(&self, user_agent: &str) -> bool {
        !user_agent.is_empty()
            && self
                .ignore_user_agent
                .iter()
                .any(|ua| !ua.is_empty() && user_agent.contains(ua.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.errbit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ErrbitError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.errbit/errbit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the notifier config from disk. Returns an empty config if the file
/// does not exist.
pub fn load_config() -> Result<NotifierConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(NotifierConfig::default());
    }

    load_config_from(&path)
}

/// Load the notifier config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<NotifierConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ErrbitError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ErrbitError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a commented default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ErrbitError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE).map_err(|e| ErrbitError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
