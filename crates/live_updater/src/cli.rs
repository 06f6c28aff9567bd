//! Command-line argument parsing.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the plugin deployment service.
///
/// Every option except `--config` overrides the matching setting from the
/// configuration file.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    ///
    /// If the file doesn't exist, a default configuration with freshly
    /// generated passwords is written there.
    #[arg(short, long, default_value = "live_updater.toml")]
    pub config: PathBuf,

    /// FTP listen address, e.g. "0.0.0.0:2121"
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Directory exposed to FTP clients (normally the server's plugins folder)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Path to the game server's server.properties
    #[arg(short, long)]
    pub properties: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("live_updater.toml"),
            bind: None,
            root: None,
            properties: None,
            log_level: None,
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["live_updater"]).unwrap();
        assert_eq!(args.config, PathBuf::from("live_updater.toml"));
        assert!(args.bind.is_none());
        assert!(!args.json_logs);
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "live_updater",
            "--config",
            "/etc/live_updater.toml",
            "--bind",
            "127.0.0.1:2121",
            "-r",
            "/srv/mc/plugins",
            "--properties",
            "/srv/mc/server.properties",
            "--log-level",
            "debug",
            "--json-logs",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("/etc/live_updater.toml"));
        assert_eq!(args.bind.as_deref(), Some("127.0.0.1:2121"));
        assert_eq!(args.root, Some(PathBuf::from("/srv/mc/plugins")));
        assert_eq!(args.properties, Some(PathBuf::from("/srv/mc/server.properties")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }
}
