//! Runtime configuration.
//!
//! Everything is read from the environment (after `.env` is loaded by the
//! binary). Unset variables fall back to defaults; set-but-unparseable ones
//! are an error.

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATA_ROOT: &str = "./data";
pub const DEFAULT_CLIENT_PREFIX: &str = "/mnt/data";
pub const DEFAULT_PUBLIC_DIR: &str = "./public/downloads";
pub const DEFAULT_FREE_LIMIT: u32 = 20;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_VERSION_FILE: &str = "version.json";

/// Binaries used for each wrapped tool.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub xmlstarlet: String,
    pub xmllint: String,
    pub xsltproc: String,
    pub jsonrepair: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            xmlstarlet: "xmlstarlet".to_string(),
            xmllint: "xmllint".to_string(),
            xsltproc: "xsltproc".to_string(),
            jsonrepair: "jsonrepair".to_string(),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Server-local directory every client path is rewritten into
    pub data_root: PathBuf,
    /// Prefix clients use for their view of the data root
    pub client_prefix: String,
    /// Directory served under `/downloads`
    pub public_dir: PathBuf,
    /// Base URL for download links (no trailing slash)
    pub public_url: String,
    /// Free requests per client before a key is required
    pub free_limit: u32,
    /// Accepted API keys
    pub api_keys: HashSet<String>,
    /// Per-invocation limit for external tools
    pub tool_timeout: Duration,
    /// External tool binaries
    pub tools: ToolPaths,
    /// Release bookkeeping file
    pub version_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            client_prefix: DEFAULT_CLIENT_PREFIX.to_string(),
            public_dir: PathBuf::from(DEFAULT_PUBLIC_DIR),
            public_url: default_public_url(DEFAULT_PORT),
            free_limit: DEFAULT_FREE_LIMIT,
            api_keys: HashSet::new(),
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            tools: ToolPaths::default(),
            version_file: PathBuf::from(DEFAULT_VERSION_FILE),
        }
    }
}

impl Config {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_var(&lookup, "PORT", DEFAULT_PORT)?;
        let free_limit = parse_var(&lookup, "XMLGATE_FREE_LIMIT", DEFAULT_FREE_LIMIT)?;
        let timeout_secs = parse_var(&lookup, "XMLGATE_TOOL_TIMEOUT_SECS", DEFAULT_TOOL_TIMEOUT_SECS)?;

        let defaults = ToolPaths::default();
        let tools = ToolPaths {
            xmlstarlet: lookup("XMLSTARLET_BIN").unwrap_or(defaults.xmlstarlet),
            xmllint: lookup("XMLLINT_BIN").unwrap_or(defaults.xmllint),
            xsltproc: lookup("XSLTPROC_BIN").unwrap_or(defaults.xsltproc),
            jsonrepair: lookup("JSONREPAIR_BIN").unwrap_or(defaults.jsonrepair),
        };

        let api_keys = lookup("XMLGATE_API_KEYS")
            .map(|raw| parse_keys(&raw))
            .unwrap_or_default();

        let public_url = lookup("XMLGATE_PUBLIC_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| default_public_url(port));

        Ok(Self {
            port,
            data_root: lookup("XMLGATE_DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_ROOT)),
            client_prefix: lookup("XMLGATE_CLIENT_PREFIX")
                .unwrap_or_else(|| DEFAULT_CLIENT_PREFIX.to_string()),
            public_dir: lookup("XMLGATE_PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PUBLIC_DIR)),
            public_url,
            free_limit,
            api_keys,
            tool_timeout: Duration::from_secs(timeout_secs),
            tools,
            version_file: lookup("XMLGATE_VERSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_VERSION_FILE)),
        })
    }

    /// Override the port, keeping a derived public URL in step.
    pub fn with_port(mut self, port: u16) -> Self {
        if self.public_url == default_public_url(self.port) {
            self.public_url = default_public_url(port);
        }
        self.port = port;
        self
    }
}

fn default_public_url(port: u16) -> String {
    format!("http://localhost:{}/downloads", port)
}

fn parse_keys(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<F, T>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidVar {
            var: var.to_string(),
            value,
        }),
    }
}
