//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::ValueEnum;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Directive;

use crate::engine::FilterAction;

mod cli;

pub use cli::{CliArgs, Command, RenderArgs, ServeArgs, ServeOverrides};

const LOCAL_CONFIG_BASENAME: &str = "scrivano";
const ENV_PREFIX: &str = "SCRIVANO";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_APPLICATION: &str = "scrivano";
const DEFAULT_BASE_PATH: &str = "/";
const DEFAULT_INDEX_DOCUMENT: &str = "index";
const DEFAULT_CACHE_KEY_PATTERN: &str = "{application}:{document}?{query}";
const DEFAULT_MEDIA_TYPE: &str = "text/html";
const DEFAULT_CHARSET: &str = "utf-8";
const DEFAULT_DOCUMENTS_ROOT: &str = "documents";
const DEFAULT_DOCUMENT_EXTENSION: &str = "rhai";
const DEFAULT_MAX_OPERATIONS: u64 = 1_000_000;
const DEFAULT_OUTPUT_LIMIT: usize = 256;
const DEFAULT_TASK_EVERY_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("configuration could not be loaded: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl SettingsError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl From<LogLevel> for Directive {
    fn from(level: LogLevel) -> Self {
        LevelFilter::from(level).into()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Compact,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub site: SiteSettings,
    pub documents: DocumentSettings,
    pub cache: CacheSettings,
    pub filters: Vec<FilterSettings>,
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            graceful_shutdown_secs: DEFAULT_GRACEFUL_SHUTDOWN_SECS,
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> Result<SocketAddr, SettingsError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| {
                SettingsError::invalid(format!(
                    "`{}:{}` is not a valid listen address",
                    self.host, self.port
                ))
            })
    }

    pub fn graceful_shutdown(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    /// Owning application name, exposed to cache-key patterns.
    pub application: String,
    pub base_path: String,
    pub index_document: String,
    pub cache_key_pattern: String,
    pub default_media_type: String,
    pub default_charset: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            application: DEFAULT_APPLICATION.to_string(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            index_document: DEFAULT_INDEX_DOCUMENT.to_string(),
            cache_key_pattern: DEFAULT_CACHE_KEY_PATTERN.to_string(),
            default_media_type: DEFAULT_MEDIA_TYPE.to_string(),
            default_charset: DEFAULT_CHARSET.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    pub root: PathBuf,
    pub extension: String,
    /// Per-evaluation operation budget for scripts; zero means unlimited.
    pub max_operations: u64,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_DOCUMENTS_ROOT),
            extension: DEFAULT_DOCUMENT_EXTENSION.to_string(),
            max_operations: DEFAULT_MAX_OPERATIONS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enable_output_cache: bool,
    pub output_limit: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enable_output_cache: true,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultAction {
    #[default]
    Continue,
    Skip,
    Stop,
}

impl DefaultAction {
    pub fn to_action(self) -> FilterAction {
        match self {
            Self::Continue => FilterAction::Continue,
            Self::Skip => FilterAction::Skip,
            Self::Stop => FilterAction::Stop,
        }
    }
}

/// One filter binding: a hook document guarding a path prefix.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterSettings {
    pub prefix: String,
    pub document: String,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub default_action: DefaultAction,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub tasks: Vec<ScheduledTaskSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledTaskSettings {
    pub document: String,
    pub entry: String,
    #[serde(default = "default_task_every_secs")]
    pub every_secs: u64,
}

fn default_task_every_secs() -> u64 {
    DEFAULT_TASK_EVERY_SECS
}

/// Load settings with layered precedence: local file, explicit file, env,
/// then CLI overrides.
pub fn load(args: &CliArgs) -> Result<Settings, SettingsError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = &args.config_file {
        builder = builder.add_source(File::from(path.as_path()));
    }

    let loaded = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let mut settings: Settings = loaded.try_deserialize()?;

    if let Some(overrides) = args.overrides() {
        settings.apply(overrides);
    }

    settings.validate()?;
    Ok(settings)
}

impl Settings {
    fn apply(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = &overrides.server_host {
            self.server.host = host.clone();
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(root) = &overrides.documents_root {
            self.documents.root = root.clone();
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if !self.site.base_path.starts_with('/') {
            return Err(SettingsError::invalid("site.base_path must start with `/`"));
        }
        if self.documents.extension.is_empty() {
            return Err(SettingsError::invalid("documents.extension must not be empty"));
        }
        if self.cache.output_limit == 0 {
            return Err(SettingsError::invalid("cache.output_limit must be positive"));
        }
        for filter in &self.filters {
            if !filter.prefix.starts_with('/') {
                return Err(SettingsError::invalid(format!(
                    "filter prefix `{}` must start with `/`",
                    filter.prefix
                )));
            }
            crate::domain::DocumentName::new(filter.document.clone())
                .map_err(|err| SettingsError::invalid(err.to_string()))?;
        }
        for task in &self.scheduler.tasks {
            if task.every_secs == 0 {
                return Err(SettingsError::invalid(format!(
                    "scheduled task `{}` must have a positive cadence",
                    task.document
                )));
            }
            crate::domain::DocumentName::new(task.document.clone())
                .map_err(|err| SettingsError::invalid(err.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_serviceable() {
        let settings = Settings::default();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.site.index_document, "index");
        assert_eq!(settings.site.cache_key_pattern, "{application}:{document}?{query}");
        assert_eq!(settings.documents.extension, "rhai");
        assert!(settings.cache.enable_output_cache);
        assert!(settings.filters.is_empty());
        assert!(settings.scheduler.tasks.is_empty());
        settings.validate().expect("defaults validate");
    }

    #[test]
    fn overrides_take_precedence() {
        let mut settings = Settings::default();
        settings.apply(&ServeOverrides {
            server_host: Some("0.0.0.0".to_string()),
            server_port: Some(8080),
            documents_root: Some(PathBuf::from("/srv/docs")),
            log_level: Some(LogLevel::Debug),
            log_format: Some(LogFormat::Json),
        });

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.documents.root, PathBuf::from("/srv/docs"));
        assert_eq!(settings.logging.level, LogLevel::Debug);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn rejects_relative_base_path() {
        let mut settings = Settings::default();
        settings.site.base_path = "app".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_invalid_filter_document() {
        let mut settings = Settings::default();
        settings.filters.push(FilterSettings {
            prefix: "/admin".to_string(),
            document: "../hooks".to_string(),
            before: Some("before".to_string()),
            after: None,
            default_action: DefaultAction::Continue,
        });
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_zero_cadence_task() {
        let mut settings = Settings::default();
        settings.scheduler.tasks.push(ScheduledTaskSettings {
            document: "jobs/cleanup".to_string(),
            entry: "tick".to_string(),
            every_secs: 0,
        });
        assert!(settings.validate().is_err());
    }

    #[test]
    fn settings_addr_parses() {
        let settings = Settings::default();
        let addr = settings.server.addr().expect("valid addr");
        assert_eq!(addr.port(), 3000);
    }
}
