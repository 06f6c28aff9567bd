use super::{ReloadCommand, ReloadDispatcher};
use crate::error::DispatchError;
use async_trait::async_trait;
use rcon_client::{ConsoleEndpoint, RemoteConsole};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Delivers the reload command over the game server's remote console.
#[derive(Clone)]
pub struct RemoteConsoleDispatcher {
    console: Arc<dyn RemoteConsole>,
    endpoint: ConsoleEndpoint,
    command: ReloadCommand,
}

impl RemoteConsoleDispatcher {
    pub fn new(console: Arc<dyn RemoteConsole>, endpoint: ConsoleEndpoint, command: ReloadCommand) -> Self {
        Self {
            console,
            endpoint,
            command,
        }
    }
}

#[async_trait]
impl ReloadDispatcher for RemoteConsoleDispatcher {
    async fn trigger(&self, archive: &Path) -> Result<(), DispatchError> {
        let line = self.command.render(archive).await?;
        let reply = self.console.execute(&self.endpoint, &line).await?;

        info!(
            "🔁 RCON {} accepted '{}' for {}: {}",
            self.endpoint.address(),
            line,
            archive.display(),
            reply.trim()
        );
        Ok(())
    }

    fn strategy(&self) -> &'static str {
        "remote-console"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_manifest::{JarManifestReader, ManifestError, MetadataExtractor};
    use rcon_client::RconError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingConsole {
        sent: Mutex<Vec<(String, String)>>,
        refuse: bool,
    }

    #[async_trait]
    impl RemoteConsole for RecordingConsole {
        async fn execute(&self, endpoint: &ConsoleEndpoint, command: &str) -> Result<String, RconError> {
            if self.refuse {
                return Err(RconError::AuthRejected(endpoint.address()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((endpoint.address(), command.to_string()));
            Ok("Reload complete.".to_string())
        }
    }

    struct Named;

    impl MetadataExtractor for Named {
        fn plugin_name(&self, _archive: &Path) -> Result<Option<String>, ManifestError> {
            Ok(Some("WorldEdit".to_string()))
        }
    }

    fn endpoint() -> ConsoleEndpoint {
        ConsoleEndpoint::new("127.0.0.1", 25575, "pw")
    }

    #[tokio::test]
    async fn test_sends_command_once() {
        let console = Arc::new(RecordingConsole::default());
        let dispatcher = RemoteConsoleDispatcher::new(
            console.clone(),
            endpoint(),
            ReloadCommand::new("reload confirm", Arc::new(JarManifestReader::default())),
        );

        dispatcher.trigger(Path::new("/plugins/a.jar")).await.expect("Trigger failed");

        let sent = console.sent.lock().unwrap();
        assert_eq!(*sent, vec![("127.0.0.1:25575".to_string(), "reload confirm".to_string())]);
    }

    #[tokio::test]
    async fn test_renders_plugin_template() {
        let console = Arc::new(RecordingConsole::default());
        let dispatcher = RemoteConsoleDispatcher::new(
            console.clone(),
            endpoint(),
            ReloadCommand::new("plugman reload {plugin}", Arc::new(Named)),
        );

        dispatcher.trigger(Path::new("/plugins/we.jar")).await.unwrap();
        assert_eq!(console.sent.lock().unwrap()[0].1, "plugman reload WorldEdit");
    }

    #[tokio::test]
    async fn test_console_failure_is_dispatch_error() {
        let console = Arc::new(RecordingConsole {
            refuse: true,
            ..Default::default()
        });
        let dispatcher = RemoteConsoleDispatcher::new(
            console,
            endpoint(),
            ReloadCommand::new("reload", Arc::new(JarManifestReader::default())),
        );

        let result = dispatcher.trigger(Path::new("/plugins/a.jar")).await;
        assert!(matches!(result, Err(DispatchError::Console(RconError::AuthRejected(_)))));
    }
}
