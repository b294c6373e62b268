//! Configuration module for mailhog.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::release::OutgoingServer;
use crate::{MailhogError, Result};

/// SMTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Hostname announced in the greeting and HELO/EHLO replies.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle timeout in seconds (0 = never time out).
    #[serde(default)]
    pub idle_timeout_secs: u64,
    /// Maximum accepted message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Maximum recipients per message.
    #[serde(default = "default_max_recipients")]
    pub max_recipients: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_smtp_port() -> u16 {
    1025
}

fn default_hostname() -> String {
    "mailhog.example".to_string()
}

fn default_max_connections() -> usize {
    256
}

fn default_max_message_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_max_recipients() -> usize {
    100
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_smtp_port(),
            hostname: default_hostname(),
            max_connections: default_max_connections(),
            idle_timeout_secs: 0,
            max_message_size: default_max_message_size(),
            max_recipients: default_max_recipients(),
        }
    }
}

/// Web UI and API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number for the UI and API.
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Path prefix the UI and API are mounted under (e.g. "/mailhog").
    #[serde(default)]
    pub web_path: String,
    /// Optional directory with UI assets overriding the embedded ones.
    #[serde(default)]
    pub static_path: Option<String>,
}

fn default_web_port() -> u16 {
    8025
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_web_port(),
            cors_origins: vec![],
            web_path: String::new(),
            static_path: None,
        }
    }
}

/// Message storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// One file per message plus a journal, reloaded at startup.
    Maildir,
    /// Process memory only.
    Memory,
}

impl FromStr for StorageKind {
    type Err = MailhogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "maildir" => Ok(StorageKind::Maildir),
            "memory" => Ok(StorageKind::Memory),
            other => Err(MailhogError::Config(format!(
                "invalid storage type '{other}' (expected 'maildir' or 'memory')"
            ))),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Maildir => write!(f, "maildir"),
            StorageKind::Memory => write!(f, "memory"),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type.
    #[serde(default = "default_storage_kind")]
    pub kind: StorageKind,
    /// Directory for the maildir backend.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Maildir
}

fn default_storage_path() -> String {
    "./mailhog-data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: default_storage_kind(),
            path: default_storage_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file, written in addition to stdout.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Fault injection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChaosConfig {
    /// Whether fault injection starts enabled.
    #[serde(default)]
    pub enabled: bool,
    /// File the runtime settings are persisted to.
    /// Defaults to `chaos.json` inside the storage directory.
    #[serde(default)]
    pub state_file: Option<String>,
    /// Probability of rejecting a new connection.
    #[serde(default = "default_chance")]
    pub reject_connection_chance: f64,
    /// Probability of rejecting a MAIL FROM.
    #[serde(default = "default_chance")]
    pub reject_sender_chance: f64,
    /// Probability of rejecting a RCPT TO.
    #[serde(default = "default_chance")]
    pub reject_recipient_chance: f64,
    /// Probability of dropping the connection after a command.
    #[serde(default = "default_chance")]
    pub disconnect_chance: f64,
}

fn default_chance() -> f64 {
    0.05
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            state_file: None,
            reject_connection_chance: default_chance(),
            reject_sender_chance: default_chance(),
            reject_recipient_chance: default_chance(),
            disconnect_chance: default_chance(),
        }
    }
}

/// Release (outbound SMTP) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseConfig {
    /// Timeout for the whole outbound session in seconds.
    #[serde(default = "default_release_timeout")]
    pub timeout_secs: u64,
    /// JSON file with named outgoing servers.
    #[serde(default)]
    pub outgoing_file: Option<String>,
}

fn default_release_timeout() -> u64 {
    30
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_release_timeout(),
            outgoing_file: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// SMTP listener configuration.
    #[serde(default)]
    pub smtp: SmtpConfig,
    /// Web UI and API configuration.
    #[serde(default)]
    pub web: WebConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Fault injection configuration.
    #[serde(default)]
    pub chaos: ChaosConfig,
    /// Release configuration.
    #[serde(default)]
    pub release: ReleaseConfig,
    /// Named outgoing SMTP servers available for release.
    #[serde(default)]
    pub outgoing: HashMap<String, OutgoingServer>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(MailhogError::Io)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(s)
            .map_err(|e| MailhogError::Config(format!("config parse error: {e}")))?;
        for (name, server) in config.outgoing.iter_mut() {
            server.name = name.clone();
        }
        Ok(config)
    }

    /// Apply `MH_*` environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `lookup`.
    ///
    /// Supported keys:
    /// - `MH_SMTP_BIND_ADDR`, `MH_API_BIND_ADDR`: `host:port` or `:port`
    /// - `MH_HOSTNAME`, `MH_STORAGE`, `MH_MAILDIR_PATH`
    /// - `MH_CORS_ORIGIN`, `MH_OUTGOING_SMTP`, `MH_UI_WEB_PATH`
    /// - `MH_CHAOS`, `MH_CHAOS_STATE_FILE`, `MH_LOG_LEVEL`
    ///
    /// Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("MH_SMTP_BIND_ADDR") {
            let (host, port) = parse_bind_addr(&addr)?;
            self.smtp.host = host;
            self.smtp.port = port;
        }
        if let Some(addr) = get("MH_API_BIND_ADDR") {
            let (host, port) = parse_bind_addr(&addr)?;
            self.web.host = host;
            self.web.port = port;
        }
        if let Some(hostname) = get("MH_HOSTNAME") {
            self.smtp.hostname = hostname;
        }
        if let Some(kind) = get("MH_STORAGE") {
            self.storage.kind = kind.parse()?;
        }
        if let Some(path) = get("MH_MAILDIR_PATH") {
            self.storage.path = path;
        }
        if let Some(origin) = get("MH_CORS_ORIGIN") {
            self.web.cors_origins = vec![origin];
        }
        if let Some(file) = get("MH_OUTGOING_SMTP") {
            self.release.outgoing_file = Some(file);
        }
        if let Some(path) = get("MH_UI_WEB_PATH") {
            self.web.web_path = path;
        }
        if let Some(flag) = get("MH_CHAOS") {
            self.chaos.enabled = parse_bool(&flag)?;
        }
        if let Some(file) = get("MH_CHAOS_STATE_FILE") {
            self.chaos.state_file = Some(file);
        }
        if let Some(level) = get("MH_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Merge named servers from the JSON file in `release.outgoing_file`.
    ///
    /// Entries from the file replace config entries with the same name.
    pub fn load_outgoing_file(&mut self) -> Result<()> {
        let Some(path) = self.release.outgoing_file.clone() else {
            return Ok(());
        };
        let content = std::fs::read_to_string(&path)?;
        let servers: HashMap<String, OutgoingServer> = serde_json::from_str(&content)
            .map_err(|e| MailhogError::Config(format!("outgoing SMTP file {path}: {e}")))?;
        for (name, mut server) in servers {
            server.name = name.clone();
            self.outgoing.insert(name, server);
        }
        Ok(())
    }

    /// Path of the chaos settings file.
    pub fn chaos_state_file(&self) -> PathBuf {
        match &self.chaos.state_file {
            Some(file) => PathBuf::from(file),
            None => Path::new(&self.storage.path).join("chaos.json"),
        }
    }

    /// Normalized web path: empty, or starting with '/' and without a trailing '/'.
    pub fn web_path(&self) -> String {
        normalize_web_path(&self.web.web_path)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.smtp.max_connections == 0 {
            return Err(MailhogError::Config(
                "smtp.max_connections must be greater than 0".to_string(),
            ));
        }
        if self.smtp.max_recipients == 0 {
            return Err(MailhogError::Config(
                "smtp.max_recipients must be greater than 0".to_string(),
            ));
        }
        if self.smtp.max_message_size == 0 {
            return Err(MailhogError::Config(
                "smtp.max_message_size must be greater than 0".to_string(),
            ));
        }
        for (name, chance) in [
            ("reject_connection_chance", self.chaos.reject_connection_chance),
            ("reject_sender_chance", self.chaos.reject_sender_chance),
            ("reject_recipient_chance", self.chaos.reject_recipient_chance),
            ("disconnect_chance", self.chaos.disconnect_chance),
        ] {
            if !(0.0..=1.0).contains(&chance) {
                return Err(MailhogError::Config(format!(
                    "chaos.{name} must be between 0.0 and 1.0"
                )));
            }
        }
        Ok(())
    }
}

/// Parse a bind address of the form `host:port` or `:port`.
pub fn parse_bind_addr(addr: &str) -> Result<(String, u16)> {
    let addr = addr.trim();
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| MailhogError::Config(format!("invalid bind address '{addr}'")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| MailhogError::Config(format!("invalid port in bind address '{addr}'")))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = if host.is_empty() {
        default_host()
    } else {
        host.to_string()
    };
    Ok((host, port))
}

/// Format `host` and `port` for binding, bracketing IPv6 hosts.
pub fn format_bind_addr(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(MailhogError::Config(format!("invalid boolean '{other}'"))),
    }
}

fn normalize_web_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
