//! Reload trigger dispatch.
//!
//! Once a plugin archive has been written, the running game server has to be
//! told to pick it up. [`ReloadDispatcher`] is that notification; which
//! transport carries it is a deployment decision:
//!
//! * [`ConsoleInjectionDispatcher`] types the command into the detached
//!   `screen`/`tmux` session the server console lives in
//! * [`RemoteConsoleDispatcher`] sends it over RCON
//!
//! Both are fire-and-forget. Success means the command was transmitted, not
//! that the server finished reloading. Triggers are never deduplicated.

mod command;
mod console;
mod remote;

pub use command::ReloadCommand;
pub use console::ConsoleInjectionDispatcher;
pub use remote::RemoteConsoleDispatcher;

use crate::config::{ReloadConfig, ReloadStrategy, RemoteConsoleSettings};
use crate::error::DispatchError;
use async_trait::async_trait;
use plugin_manifest::MetadataExtractor;
use rcon_client::RconClient;
use std::path::Path;
use std::sync::Arc;

/// Notifies the running server that new plugin code is present.
#[async_trait]
pub trait ReloadDispatcher: Send + Sync {
    /// Sends one reload trigger for the archive at `archive`.
    async fn trigger(&self, archive: &Path) -> Result<(), DispatchError>;

    /// Short name of the transport, for logs.
    fn strategy(&self) -> &'static str;
}

/// Builds the dispatcher selected by `config`.
pub fn dispatcher_from_config(
    config: &ReloadConfig,
    console: &RemoteConsoleSettings,
    extractor: Arc<dyn MetadataExtractor>,
) -> Arc<dyn ReloadDispatcher> {
    let command = ReloadCommand::new(config.command.clone(), extractor);

    match &config.strategy {
        ReloadStrategy::ConsoleInjection {
            multiplexer,
            session,
            window,
        } => Arc::new(ConsoleInjectionDispatcher::new(
            *multiplexer,
            session.clone(),
            window.clone(),
            command,
        )),
        ReloadStrategy::RemoteConsole => Arc::new(RemoteConsoleDispatcher::new(
            Arc::new(RconClient::new(console.timeout)),
            console.endpoint.clone(),
            command,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Multiplexer;
    use plugin_manifest::JarManifestReader;
    use rcon_client::ConsoleEndpoint;
    use std::path::PathBuf;
    use std::time::Duration;

    fn console_settings() -> RemoteConsoleSettings {
        RemoteConsoleSettings {
            properties_path: PathBuf::from("server.properties"),
            endpoint: ConsoleEndpoint::new("127.0.0.1", 25575, "pw"),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_builds_configured_strategy() {
        let extractor: Arc<dyn MetadataExtractor> = Arc::new(JarManifestReader::default());

        let injection = dispatcher_from_config(&ReloadConfig::default(), &console_settings(), extractor.clone());
        assert_eq!(injection.strategy(), "console-injection");

        let rcon = ReloadConfig {
            strategy: ReloadStrategy::RemoteConsole,
            command: "reload confirm".to_string(),
        };
        let remote = dispatcher_from_config(&rcon, &console_settings(), extractor.clone());
        assert_eq!(remote.strategy(), "remote-console");

        let tmux = ReloadConfig {
            strategy: ReloadStrategy::ConsoleInjection {
                multiplexer: Multiplexer::Tmux,
                session: "mc".to_string(),
                window: "1".to_string(),
            },
            command: "reload".to_string(),
        };
        assert_eq!(
            dispatcher_from_config(&tmux, &console_settings(), extractor).strategy(),
            "console-injection"
        );
    }
}
