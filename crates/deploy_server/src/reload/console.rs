use super::{ReloadCommand, ReloadDispatcher};
use crate::config::Multiplexer;
use crate::error::DispatchError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

/// Delivers the reload command by typing it into a multiplexer session.
///
/// * screen: `screen -S <session> -p <window> -X stuff "<command>\n"`
/// * tmux: `tmux send-keys -t <session>:<window> "<command>" Enter`
///
/// A missing session shows up as a non-zero exit from the multiplexer.
#[derive(Debug, Clone)]
pub struct ConsoleInjectionDispatcher {
    multiplexer: Multiplexer,
    session: String,
    window: String,
    command: ReloadCommand,
    program: String,
}

impl ConsoleInjectionDispatcher {
    pub fn new(
        multiplexer: Multiplexer,
        session: impl Into<String>,
        window: impl Into<String>,
        command: ReloadCommand,
    ) -> Self {
        Self {
            multiplexer,
            session: session.into(),
            window: window.into(),
            command,
            program: multiplexer.program().to_string(),
        }
    }

    /// Runs `program` instead of the multiplexer's default binary name.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn arguments(&self, line: &str) -> Vec<String> {
        match self.multiplexer {
            Multiplexer::Screen => vec![
                "-S".to_string(),
                self.session.clone(),
                "-p".to_string(),
                self.window.clone(),
                "-X".to_string(),
                "stuff".to_string(),
                format!("{line}\n"),
            ],
            Multiplexer::Tmux => vec![
                "send-keys".to_string(),
                "-t".to_string(),
                format!("{}:{}", self.session, self.window),
                line.to_string(),
                "Enter".to_string(),
            ],
        }
    }
}

#[async_trait]
impl ReloadDispatcher for ConsoleInjectionDispatcher {
    async fn trigger(&self, archive: &Path) -> Result<(), DispatchError> {
        let line = self.command.render(archive).await?;

        let output = Command::new(&self.program)
            .args(self.arguments(&line))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| DispatchError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(DispatchError::CommandFailed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(
            "🔁 Sent '{}' to {} session '{}' for {}",
            line,
            self.multiplexer.program(),
            self.session,
            archive.display()
        );
        Ok(())
    }

    fn strategy(&self) -> &'static str {
        "console-injection"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_manifest::JarManifestReader;
    use std::sync::Arc;

    fn dispatcher(multiplexer: Multiplexer) -> ConsoleInjectionDispatcher {
        ConsoleInjectionDispatcher::new(
            multiplexer,
            "minecraft",
            "0",
            ReloadCommand::new("reload", Arc::new(JarManifestReader::default())),
        )
    }

    #[test]
    fn test_screen_arguments() {
        let args = dispatcher(Multiplexer::Screen).arguments("reload");
        assert_eq!(args, vec!["-S", "minecraft", "-p", "0", "-X", "stuff", "reload\n"]);
    }

    #[test]
    fn test_tmux_arguments() {
        let args = dispatcher(Multiplexer::Tmux).arguments("reload");
        assert_eq!(args, vec!["send-keys", "-t", "minecraft:0", "reload", "Enter"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_exit_is_ok() {
        let dispatcher = dispatcher(Multiplexer::Screen).with_program("true");
        dispatcher
            .trigger(Path::new("/plugins/demo.jar"))
            .await
            .expect("Trigger should succeed when the multiplexer exits 0");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_exit_is_reported() {
        let dispatcher = dispatcher(Multiplexer::Screen).with_program("false");
        let result = dispatcher.trigger(Path::new("/plugins/demo.jar")).await;
        assert!(matches!(result, Err(DispatchError::CommandFailed { .. })));
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let dispatcher = dispatcher(Multiplexer::Tmux).with_program("/nonexistent/multiplexer-binary");
        let result = dispatcher.trigger(Path::new("/plugins/demo.jar")).await;
        assert!(matches!(result, Err(DispatchError::Launch { .. })));
    }
}
