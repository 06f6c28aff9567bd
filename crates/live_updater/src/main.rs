//! Entry point for the plugin deployment service.
//!
//! Startup order matters:
//!
//! 1. Load (or create) the configuration file and apply CLI overrides
//! 2. Enable the game server's remote console in `server.properties`
//! 3. Bind the FTP endpoint and serve until SIGINT/SIGTERM
//!
//! If step 2 fails nothing is started and the process exits non-zero.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use deploy_server::bootstrap::ServerBootstrap;
use deploy_server::{create_server, TransferServer};
use server_properties::PropertiesFile;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cli::Args;
use crate::config::{AppConfig, ConfigSource};
use crate::logging::setup_logging;
use crate::signals::wait_for_shutdown_signal;

/// How long open sessions get to wind down after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

// ============================================================================
// Application
// ============================================================================

struct Application {
    config: AppConfig,
    server: Arc<TransferServer>,
}

impl Application {
    /// Loads configuration, sets up logging and prepares the game server.
    ///
    /// # Returns
    ///
    /// A ready-to-run application, or an error if configuration is invalid or
    /// the remote console could not be enabled.
    async fn new(args: Args) -> Result<Self> {
        let (mut config, source) = AppConfig::load_from_file(&args.config)
            .await
            .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

        config.apply_args(&args);
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

        setup_logging(&config.logging)?;

        if source == ConfigSource::CreatedDefault {
            warn!(
                "📝 Created default configuration file {} with generated passwords; review it before exposing the service",
                args.config.display()
            );
        }
        info!(
            "🚀 live_updater v{} using {}",
            env!("CARGO_PKG_VERSION"),
            args.config.display()
        );

        let console = config.to_console_settings();
        let bootstrap = ServerBootstrap::new(
            Arc::new(PropertiesFile::new(&console.properties_path)),
            console.endpoint.clone(),
        );
        bootstrap
            .run()
            .await
            .with_context(|| format!("Failed to prepare {}", console.properties_path.display()))?;

        let server_config = config.to_server_config()?;
        tokio::fs::create_dir_all(&server_config.root_directory)
            .await
            .with_context(|| format!("Failed to create {}", server_config.root_directory.display()))?;

        let server = create_server(server_config, &config.to_reload_config(), &console);
        Ok(Self {
            config,
            server: Arc::new(server),
        })
    }

    /// Serves until a shutdown signal arrives.
    async fn run(self) -> Result<()> {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.transfer.bind_address);
        info!("  📂 Root directory: {}", self.config.transfer.root_directory);
        info!("  🔌 Archive extension: .{}", self.server.config().archive_extension);
        info!(
            "  🔁 Reload: {:?} sending '{}'",
            self.config.reload.strategy, self.config.reload.command
        );
        info!("  👥 Max connections: {}", self.config.transfer.max_connections);

        let listener = self.server.bind()?;

        let mut server_handle = {
            let server = self.server.clone();
            tokio::spawn(async move { server.serve(listener).await })
        };

        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let signal = tokio::select! {
            signal = wait_for_shutdown_signal() => {
                signal.context("Failed to install signal handlers")?
            }
            finished = &mut server_handle => {
                finished.context("Server task panicked")??;
                warn!("Server stopped without a shutdown signal");
                return Ok(());
            }
        };

        info!("🛑 {} received, initiating graceful shutdown...", signal);
        self.server.shutdown();

        match tokio::time::timeout(SHUTDOWN_GRACE, server_handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!("❌ Server error during shutdown: {}", e),
            Ok(Err(e)) => error!("❌ Server task failed: {}", e),
            Err(_) => warn!("Server did not stop within {}s", SHUTDOWN_GRACE.as_secs()),
        }

        // Sessions close on their own once notified; give them a moment.
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while !self.server.registry().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        info!("✅ live_updater shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let app = match Application::new(args).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("❌ Failed to start: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("❌ Application error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
