//! Bootstrap configuration for IVD services
//!
//! Settings come from a TOML file whose every section is optional, followed
//! by a small set of environment overrides for deployment secrets.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--config, --port, --database)
//! 2. Environment variables (KOBO_SERVER, API_TOKEN, FORM_UID, PORT, IVD_DATABASE_PATH)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "IVD_CONFIG";

/// Config file picked up from the working directory when nothing else is given
pub const LOCAL_CONFIG_FILE: &str = "ivd.toml";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime. The service must restart
/// to pick up changes to the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file (relative or absolute)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub kobo: KoboConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stdout only if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Remote form server access
#[derive(Debug, Clone, Deserialize)]
pub struct KoboConfig {
    /// Base URL of the form server, e.g. `https://kobo.example.org`
    #[serde(default)]
    pub server: String,

    /// API token sent as `Authorization: Token <api_token>`
    #[serde(default)]
    pub api_token: String,

    /// Form (asset) identifier
    #[serde(default)]
    pub form_uid: String,

    /// Prefix the audit locator is appended to
    #[serde(default = "default_audit_base_url")]
    pub audit_base_url: String,

    /// Field projection requested from the data endpoint
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upper bound on followed `next` links per fetch
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

/// Audit trail checkpoints and duration rounding
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_start_node")]
    pub start_node: String,

    #[serde(default = "default_end_node")]
    pub end_node: String,

    /// Decimal digits kept in the computed duration
    #[serde(default = "default_precision")]
    pub precision: u32,
}

/// Sync pipeline tuning
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Maximum concurrent audit fetches per cycle (clamped to 1..=16)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Scheduling mode for sync cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    /// Fixed interval between cycles
    Interval,
    /// Minute 0 of every hour inside a local working-hours window
    Hourly,
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_schedule_mode")]
    pub mode: ScheduleMode,

    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// First hour of the working window (inclusive, local time)
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,

    /// Last hour of the working window (inclusive, local time)
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,
}

pub const MAX_CONCURRENCY: usize = 16;

/// Decimal digits beyond this overflow the rounding factor
pub const MAX_PRECISION: u32 = 15;

fn default_database_path() -> PathBuf {
    PathBuf::from("db/interviews.db")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_audit_base_url() -> String {
    "https://kobocat.unhcr.org/media/original?media_file=".to_string()
}

fn default_fields() -> Vec<String> {
    vec![
        "metadata/enumerator_Id".to_string(),
        "_attachments".to_string(),
    ]
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_pages() -> usize {
    100
}

fn default_start_node() -> String {
    "/aDYFXRVSK37D2AKJAS4AB9/group_introduction/a_1_first_interaction_note".to_string()
}

fn default_end_node() -> String {
    "/aDYFXRVSK37D2AKJAS4AB9/group_main/group_interview_quality/interview_quality_note"
        .to_string()
}

fn default_precision() -> u32 {
    1
}

fn default_concurrency() -> usize {
    8
}

fn default_schedule_mode() -> ScheduleMode {
    ScheduleMode::Interval
}

fn default_interval_minutes() -> u64 {
    1
}

fn default_start_hour() -> u32 {
    7
}

fn default_end_hour() -> u32 {
    22
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            host: default_host(),
            port: default_port(),
            logging: LoggingConfig::default(),
            kobo: KoboConfig::default(),
            audit: AuditConfig::default(),
            sync: SyncConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for KoboConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            api_token: String::new(),
            form_uid: String::new(),
            audit_base_url: default_audit_base_url(),
            fields: default_fields(),
            request_timeout_secs: default_request_timeout_secs(),
            max_pages: default_max_pages(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            start_node: default_start_node(),
            end_node: default_end_node(),
            precision: default_precision(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl SyncConfig {
    /// Concurrency actually used by the pipeline
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            mode: default_schedule_mode(),
            interval_minutes: default_interval_minutes(),
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Apply environment overrides using the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Empty values are ignored so an exported-but-blank variable does not
    /// wipe a value from the file.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(server) = get("KOBO_SERVER") {
            self.kobo.server = server;
        }
        if let Some(token) = get("API_TOKEN") {
            self.kobo.api_token = token;
        }
        if let Some(form_uid) = get("FORM_UID") {
            self.kobo.form_uid = form_uid;
        }
        if let Some(port) = get("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("Invalid PORT '{}': {}", port, e)))?;
        }
        if let Some(path) = get("IVD_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Check that the configuration can drive a sync cycle
    pub fn validate(&self) -> Result<()> {
        if self.kobo.server.trim().is_empty() {
            return Err(Error::Config(
                "kobo.server is not set (TOML [kobo] server or KOBO_SERVER)".to_string(),
            ));
        }
        if self.kobo.api_token.trim().is_empty() {
            return Err(Error::Config(
                "kobo.api_token is not set (TOML [kobo] api_token or API_TOKEN)".to_string(),
            ));
        }
        if self.kobo.form_uid.trim().is_empty() {
            return Err(Error::Config(
                "kobo.form_uid is not set (TOML [kobo] form_uid or FORM_UID)".to_string(),
            ));
        }
        if self.audit.start_node.is_empty() || self.audit.end_node.is_empty() {
            return Err(Error::Config("audit checkpoint nodes must not be empty".to_string()));
        }
        if self.audit.precision > MAX_PRECISION {
            return Err(Error::Config(format!(
                "audit.precision must be at most {}, got {}",
                MAX_PRECISION, self.audit.precision
            )));
        }
        match self.schedule.mode {
            ScheduleMode::Interval if self.schedule.interval_minutes == 0 => {
                return Err(Error::Config("schedule.interval_minutes must be > 0".to_string()));
            }
            ScheduleMode::Hourly
                if self.schedule.start_hour > 23
                    || self.schedule.end_hour > 23
                    || self.schedule.start_hour > self.schedule.end_hour =>
            {
                return Err(Error::Config(format!(
                    "invalid working hours {}-{}",
                    self.schedule.start_hour, self.schedule.end_hour
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Resolve which config file to read
///
/// CLI argument, then `IVD_CONFIG`, then `./ivd.toml` if it exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    None
}

/// Where a loaded configuration came from
///
/// Config is read before logging exists, so the caller reports this once
/// the subscriber is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// A path was given but nothing is there
    MissingFile(PathBuf),
    Defaults,
}

/// Load the TOML config, falling back to defaults when the file is missing
///
/// A missing file is not fatal. A file that exists but does not parse is.
pub fn load_config(path: Option<&Path>) -> Result<(TomlConfig, ConfigSource)> {
    let Some(path) = path else {
        return Ok((TomlConfig::default(), ConfigSource::Defaults));
    };

    if !path.exists() {
        return Ok((
            TomlConfig::default(),
            ConfigSource::MissingFile(path.to_path_buf()),
        ));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config = TomlConfig::from_toml_str(&content)?;
    Ok((config, ConfigSource::File(path.to_path_buf())))
}
