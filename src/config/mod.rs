//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "stampa";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_ENGINE_COMMAND: &str = "carbone";
const DEFAULT_ENGINE_CONCURRENCY: usize = 2;
const DEFAULT_ENGINE_QUEUE_CAPACITY: usize = 8;
const DEFAULT_RENDER_DEADLINE_SECS: u64 = 30;
const DEFAULT_WORKSPACE_ROOT: &str = "/tmp/stampa";
const DEFAULT_MAX_REQUEST_BYTES: u64 = 15 * 1024 * 1024;

/// Command-line arguments for the stampa binary.
#[derive(Debug, Parser)]
#[command(name = "stampa", version, about = "stampa render service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "STAMPA_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the maximum request body size in bytes.
    #[arg(long = "server-max-request-bytes", value_name = "BYTES")]
    pub server_max_request_bytes: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the conversion engine executable path.
    #[arg(long = "engine-command", value_name = "PATH")]
    pub engine_command: Option<PathBuf>,

    /// Override the number of concurrent engine conversions.
    #[arg(long = "engine-concurrency", value_name = "COUNT")]
    pub engine_concurrency: Option<usize>,

    /// Override the admission queue capacity.
    #[arg(long = "engine-queue-capacity", value_name = "COUNT")]
    pub engine_queue_capacity: Option<usize>,

    /// Override the per-request render deadline in seconds.
    #[arg(long = "render-deadline-seconds", value_name = "SECONDS")]
    pub render_deadline_seconds: Option<u64>,

    /// Override the workspace root directory for request-scoped artifacts.
    #[arg(long = "workspace-root", value_name = "PATH")]
    pub workspace_root: Option<PathBuf>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub engine: EngineSettings,
    pub workspace: WorkspaceSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen_addr: SocketAddr,
    pub max_request_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub command: PathBuf,
    pub concurrency: NonZeroUsize,
    pub queue_capacity: usize,
    pub render_deadline: Duration,
}

#[derive(Debug, Clone)]
pub struct WorkspaceSettings {
    pub root: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Parse CLI arguments and load settings in one step.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("STAMPA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    engine: RawEngineSettings,
    workspace: RawWorkspaceSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    max_request_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEngineSettings {
    command: Option<PathBuf>,
    concurrency: Option<usize>,
    queue_capacity: Option<usize>,
    render_deadline_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWorkspaceSettings {
    root: Option<PathBuf>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(limit) = overrides.server_max_request_bytes {
            self.server.max_request_bytes = Some(limit);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(command) = overrides.engine_command.as_ref() {
            self.engine.command = Some(command.clone());
        }
        if let Some(concurrency) = overrides.engine_concurrency {
            self.engine.concurrency = Some(concurrency);
        }
        if let Some(capacity) = overrides.engine_queue_capacity {
            self.engine.queue_capacity = Some(capacity);
        }
        if let Some(seconds) = overrides.render_deadline_seconds {
            self.engine.render_deadline_seconds = Some(seconds);
        }
        if let Some(root) = overrides.workspace_root.as_ref() {
            self.workspace.root = Some(root.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            engine,
            workspace,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            engine: build_engine_settings(engine)?,
            workspace: build_workspace_settings(workspace),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let listen_addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.listen_addr", reason))?;

    let max_request_bytes = server.max_request_bytes.unwrap_or(DEFAULT_MAX_REQUEST_BYTES);
    if max_request_bytes == 0 {
        return Err(LoadError::invalid(
            "server.max_request_bytes",
            "request body limit must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        listen_addr,
        max_request_bytes,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(raw) => LevelFilter::from_str(raw.trim()).map_err(|_| {
            LoadError::invalid(
                "logging.level",
                format!("`{raw}` is not a valid level filter"),
            )
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_engine_settings(engine: RawEngineSettings) -> Result<EngineSettings, LoadError> {
    let command = engine
        .command
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENGINE_COMMAND));

    let concurrency = engine.concurrency.unwrap_or(DEFAULT_ENGINE_CONCURRENCY);
    let concurrency = NonZeroUsize::new(concurrency).ok_or_else(|| {
        LoadError::invalid("engine.concurrency", "concurrency must be at least one")
    })?;

    let queue_capacity = engine
        .queue_capacity
        .unwrap_or(DEFAULT_ENGINE_QUEUE_CAPACITY);

    let deadline_seconds = engine
        .render_deadline_seconds
        .unwrap_or(DEFAULT_RENDER_DEADLINE_SECS);
    if deadline_seconds == 0 {
        return Err(LoadError::invalid(
            "engine.render_deadline_seconds",
            "render deadline must be greater than zero",
        ));
    }

    Ok(EngineSettings {
        command,
        concurrency,
        queue_capacity,
        render_deadline: Duration::from_secs(deadline_seconds),
    })
}

fn build_workspace_settings(workspace: RawWorkspaceSettings) -> WorkspaceSettings {
    WorkspaceSettings {
        root: workspace
            .root
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE_ROOT)),
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    format!("{host}:{port}")
        .parse()
        .map_err(|err| format!("`{host}:{port}` is not a valid socket address: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with(overrides: Overrides) -> CliArgs {
        CliArgs {
            config_file: None,
            overrides,
        }
    }

    #[test]
    fn defaults_resolve_without_any_sources() {
        let settings = load(&cli_with(Overrides::default())).expect("settings");
        assert_eq!(settings.server.listen_addr.port(), DEFAULT_PORT);
        assert_eq!(
            settings.engine.concurrency.get(),
            DEFAULT_ENGINE_CONCURRENCY
        );
        assert_eq!(settings.engine.queue_capacity, DEFAULT_ENGINE_QUEUE_CAPACITY);
        assert_eq!(
            settings.engine.render_deadline,
            Duration::from_secs(DEFAULT_RENDER_DEADLINE_SECS)
        );
    }

    #[test]
    fn cli_overrides_take_precedence() {
        let settings = load(&cli_with(Overrides {
            server_port: Some(8080),
            engine_concurrency: Some(1),
            engine_queue_capacity: Some(0),
            render_deadline_seconds: Some(5),
            log_json: Some(true),
            ..Overrides::default()
        }))
        .expect("settings");

        assert_eq!(settings.server.listen_addr.port(), 8080);
        assert_eq!(settings.engine.concurrency.get(), 1);
        assert_eq!(settings.engine.queue_capacity, 0);
        assert_eq!(settings.engine.render_deadline, Duration::from_secs(5));
        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let result = load(&cli_with(Overrides {
            engine_concurrency: Some(0),
            ..Overrides::default()
        }));
        assert!(matches!(result, Err(LoadError::Invalid { key, .. }) if key == "engine.concurrency"));
    }

    #[test]
    fn zero_deadline_is_rejected() {
        let result = load(&cli_with(Overrides {
            render_deadline_seconds: Some(0),
            ..Overrides::default()
        }));
        assert!(matches!(
            result,
            Err(LoadError::Invalid { key, .. }) if key == "engine.render_deadline_seconds"
        ));
    }
}
