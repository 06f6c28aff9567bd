//! Configuration management for the deployment service.
//!
//! Loads the TOML configuration file, applies command-line overrides,
//! validates the result and converts it into the runtime settings the
//! deployment server takes.

use crate::cli::Args;
use deploy_server::{Credentials, Multiplexer, ReloadConfig, ReloadStrategy, RemoteConsoleSettings, ServerConfig};
use rcon_client::ConsoleEndpoint;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// FTP endpoint settings
    pub transfer: TransferSettings,
    /// Game server remote console settings
    pub remote_console: RemoteConsoleConfig,
    /// How uploaded plugins get reloaded
    #[serde(default)]
    pub reload: ReloadSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// FTP endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Network address to listen on (e.g., "0.0.0.0:2121")
    pub bind_address: String,
    /// Directory exposed as `/`, normally the game server's plugins folder
    pub root_directory: String,
    pub username: String,
    pub password: String,
    /// Inclusive passive port range; omit to let the OS choose
    #[serde(default)]
    pub passive_ports: Option<(u16, u16)>,
    /// Address advertised in PASV replies, for servers behind NAT
    #[serde(default)]
    pub masquerade_address: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Control connection idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Seconds to wait for a client to open a data connection or send more upload data
    #[serde(default = "default_data_timeout")]
    pub data_timeout_secs: u64,
    /// Uploads with this extension trigger a reload
    #[serde(default = "default_archive_extension")]
    pub archive_extension: String,
}

fn default_max_connections() -> usize {
    32
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_data_timeout() -> u64 {
    30
}

fn default_archive_extension() -> String {
    "jar".to_string()
}

/// Remote console (RCON) settings.
///
/// The password and port are written into `server.properties` at startup,
/// so the game server and this service always agree on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConsoleConfig {
    pub properties_path: String,
    #[serde(default = "default_rcon_host")]
    pub host: String,
    #[serde(default = "default_rcon_port")]
    pub port: u16,
    pub password: String,
    #[serde(default = "default_rcon_timeout")]
    pub timeout_secs: u64,
}

fn default_rcon_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rcon_port() -> u16 {
    25575
}

fn default_rcon_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyName {
    /// Type the command into a screen/tmux session
    ConsoleInjection,
    /// Send the command over RCON
    RemoteConsole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiplexerName {
    Screen,
    Tmux,
}

/// Reload trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadSettings {
    pub strategy: StrategyName,
    /// Command sent to the server; `{plugin}` becomes the plugin's name
    pub command: String,
    /// Only used by the console-injection strategy
    pub multiplexer: MultiplexerName,
    pub session: String,
    pub window: String,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            strategy: StrategyName::ConsoleInjection,
            command: "reload".to_string(),
            multiplexer: MultiplexerName::Screen,
            session: "minecraft".to_string(),
            window: "0".to_string(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for AppConfig {
    /// Defaults with freshly generated passwords.
    fn default() -> Self {
        Self {
            transfer: TransferSettings {
                bind_address: "0.0.0.0:2121".to_string(),
                root_directory: "plugins".to_string(),
                username: "admin".to_string(),
                password: generate_password(),
                passive_ports: Some((60000, 60100)),
                masquerade_address: None,
                max_connections: default_max_connections(),
                idle_timeout_secs: default_idle_timeout(),
                data_timeout_secs: default_data_timeout(),
                archive_extension: default_archive_extension(),
            },
            remote_console: RemoteConsoleConfig {
                properties_path: "server.properties".to_string(),
                host: default_rcon_host(),
                port: default_rcon_port(),
                password: generate_password(),
                timeout_secs: default_rcon_timeout(),
            },
            reload: ReloadSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

fn generate_password() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Outcome of [`AppConfig::load_from_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Existing,
    CreatedDefault,
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration is written there
    /// and returned.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The configuration and whether it was freshly created.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<(Self, ConfigSource)> {
        if tokio::fs::try_exists(path).await? {
            let content = tokio::fs::read_to_string(path).await?;
            match toml::from_str::<AppConfig>(&content) {
                Ok(config) => Ok((config, ConfigSource::Existing)),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    Err(e.into())
                }
            }
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            Ok((default_config, ConfigSource::CreatedDefault))
        }
    }

    /// Applies command-line overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(bind) = &args.bind {
            self.transfer.bind_address = bind.clone();
        }
        if let Some(root) = &args.root {
            self.transfer.root_directory = root.to_string_lossy().to_string();
        }
        if let Some(properties) = &args.properties {
            self.remote_console.properties_path = properties.to_string_lossy().to_string();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        let transfer = &self.transfer;
        if transfer.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", transfer.bind_address));
        }
        if transfer.root_directory.is_empty() {
            return Err("Root directory cannot be empty".to_string());
        }
        if transfer.username.is_empty() || transfer.password.is_empty() {
            return Err("Transfer username and password must both be set".to_string());
        }
        if let Some((low, high)) = transfer.passive_ports {
            if low == 0 || low > high {
                return Err(format!("Invalid passive port range: {low}-{high}"));
            }
        }
        if let Some(address) = &transfer.masquerade_address {
            if address.parse::<IpAddr>().is_err() {
                return Err(format!("Invalid masquerade address: {address}"));
            }
        }
        if transfer.max_connections == 0 {
            return Err("max_connections must be at least 1".to_string());
        }
        if transfer.idle_timeout_secs == 0 || transfer.data_timeout_secs == 0 {
            return Err("Timeouts must be at least one second".to_string());
        }
        if transfer.archive_extension.trim_start_matches('.').is_empty() {
            return Err("Archive extension cannot be empty".to_string());
        }

        let console = &self.remote_console;
        if console.properties_path.is_empty() {
            return Err("Properties path cannot be empty".to_string());
        }
        if console.password.is_empty() {
            return Err("Remote console password cannot be empty".to_string());
        }
        if console.port == 0 {
            return Err("Remote console port cannot be 0".to_string());
        }

        if self.reload.command.trim().is_empty() {
            return Err("Reload command cannot be empty".to_string());
        }
        if self.reload.strategy == StrategyName::ConsoleInjection && self.reload.session.is_empty() {
            return Err("Console injection needs a session name".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }

    /// Converts the transfer section into the server's runtime configuration.
    pub fn to_server_config(&self) -> anyhow::Result<ServerConfig> {
        let transfer = &self.transfer;
        let masquerade_address = match &transfer.masquerade_address {
            Some(address) => Some(address.parse()?),
            None => None,
        };

        Ok(ServerConfig {
            bind_address: transfer.bind_address.parse()?,
            root_directory: PathBuf::from(&transfer.root_directory),
            credentials: Credentials::new(&transfer.username, &transfer.password),
            passive_ports: transfer.passive_ports,
            masquerade_address,
            max_connections: transfer.max_connections,
            idle_timeout: Duration::from_secs(transfer.idle_timeout_secs),
            data_timeout: Duration::from_secs(transfer.data_timeout_secs),
            archive_extension: transfer.archive_extension.trim_start_matches('.').to_string(),
        })
    }

    pub fn to_console_settings(&self) -> RemoteConsoleSettings {
        let console = &self.remote_console;
        RemoteConsoleSettings {
            properties_path: PathBuf::from(&console.properties_path),
            endpoint: ConsoleEndpoint::new(&console.host, console.port, &console.password),
            timeout: Duration::from_secs(console.timeout_secs),
        }
    }

    pub fn to_reload_config(&self) -> ReloadConfig {
        let strategy = match self.reload.strategy {
            StrategyName::ConsoleInjection => ReloadStrategy::ConsoleInjection {
                multiplexer: match self.reload.multiplexer {
                    MultiplexerName::Screen => Multiplexer::Screen,
                    MultiplexerName::Tmux => Multiplexer::Tmux,
                },
                session: self.reload.session.clone(),
                window: self.reload.window.clone(),
            },
            StrategyName::RemoteConsole => ReloadStrategy::RemoteConsole,
        };

        ReloadConfig {
            strategy,
            command: self.reload.command.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transfer.bind_address, "0.0.0.0:2121");
        assert_eq!(config.transfer.passive_ports, Some((60000, 60100)));
        assert_eq!(config.remote_console.port, 25575);
        assert_eq!(config.reload.strategy, StrategyName::ConsoleInjection);
    }

    #[test]
    fn test_default_passwords_are_random() {
        let a = AppConfig::default();
        let b = AppConfig::default();

        assert_eq!(a.transfer.password.len(), 32);
        assert_ne!(a.transfer.password, b.transfer.password);
        assert_ne!(a.transfer.password, a.remote_console.password);
    }

    #[tokio::test]
    async fn test_missing_file_is_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("live_updater.toml");

        let (created, source) = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(source, ConfigSource::CreatedDefault);
        assert!(path.exists());

        let (reloaded, source) = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(source, ConfigSource::Existing);
        assert_eq!(reloaded.transfer.password, created.transfer.password);
        assert_eq!(reloaded.remote_console.password, created.remote_console.password);
        assert_eq!(reloaded.transfer.passive_ports, created.transfer.passive_ports);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[transfer]
bind_address = "127.0.0.1:2121"
root_directory = "/srv/mc/plugins"
username = "deploy"
password = "ftp-secret"
masquerade_address = "203.0.113.7"

[remote_console]
properties_path = "/srv/mc/server.properties"
password = "rcon-secret"

[reload]
strategy = "remote-console"
command = "plugman reload {plugin}"
multiplexer = "tmux"
session = "mc"
window = "1"

[logging]
level = "debug"
json_format = true
"#;
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), toml_content).await.unwrap();

        let (config, _) = AppConfig::load_from_file(temp_file.path()).await.unwrap();
        assert!(config.validate().is_ok());

        // Omitted fields fall back to defaults.
        assert_eq!(config.transfer.passive_ports, None);
        assert_eq!(config.transfer.max_connections, 32);
        assert_eq!(config.remote_console.port, 25575);
        assert_eq!(config.remote_console.host, "127.0.0.1");

        let server = config.to_server_config().unwrap();
        assert_eq!(server.root_directory, PathBuf::from("/srv/mc/plugins"));
        assert_eq!(server.masquerade_address, Some("203.0.113.7".parse().unwrap()));
        assert_eq!(server.credentials, Credentials::new("deploy", "ftp-secret"));

        let reload = config.to_reload_config();
        assert_eq!(reload.strategy, ReloadStrategy::RemoteConsole);
        assert_eq!(reload.command, "plugman reload {plugin}");

        let console = config.to_console_settings();
        assert_eq!(console.endpoint.address(), "127.0.0.1:25575");
        assert_eq!(console.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "[transfer\nbind_address = 1").await.unwrap();
        assert!(AppConfig::load_from_file(temp_file.path()).await.is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AppConfig::default();
        let args = Args {
            bind: Some("127.0.0.1:2222".to_string()),
            root: Some(PathBuf::from("/tmp/plugins")),
            properties: Some(PathBuf::from("/tmp/server.properties")),
            log_level: Some("trace".to_string()),
            json_logs: true,
            ..Args::default()
        };

        config.apply_args(&args);

        assert_eq!(config.transfer.bind_address, "127.0.0.1:2222");
        assert_eq!(config.transfer.root_directory, "/tmp/plugins");
        assert_eq!(config.remote_console.properties_path, "/tmp/server.properties");
        assert_eq!(config.logging.level, "trace");
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_validation_failures() {
        let cases: Vec<(&str, Box<dyn Fn(&mut AppConfig)>)> = vec![
            ("Invalid bind address", Box::new(|c: &mut AppConfig| c.transfer.bind_address = "nowhere".into())),
            ("password", Box::new(|c: &mut AppConfig| c.transfer.password.clear())),
            ("passive port range", Box::new(|c: &mut AppConfig| c.transfer.passive_ports = Some((61000, 60000)))),
            ("masquerade", Box::new(|c: &mut AppConfig| c.transfer.masquerade_address = Some("example".into()))),
            ("max_connections", Box::new(|c: &mut AppConfig| c.transfer.max_connections = 0)),
            ("Archive extension", Box::new(|c: &mut AppConfig| c.transfer.archive_extension = ".".into())),
            ("Remote console password", Box::new(|c: &mut AppConfig| c.remote_console.password.clear())),
            ("Reload command", Box::new(|c: &mut AppConfig| c.reload.command = "  ".into())),
            ("Invalid log level", Box::new(|c: &mut AppConfig| c.logging.level = "loud".into())),
        ];

        for (expected, mutate) in cases {
            let mut config = AppConfig::default();
            mutate(&mut config);
            let err = config.validate().expect_err(expected);
            assert!(err.contains(expected), "'{err}' should mention '{expected}'");
        }
    }

    #[test]
    fn test_archive_extension_dot_is_stripped() {
        let mut config = AppConfig::default();
        config.transfer.archive_extension = ".jar".to_string();
        assert_eq!(config.to_server_config().unwrap().archive_extension, "jar");
    }
}
