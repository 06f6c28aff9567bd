//! Convenience constructors wiring the standard components together.

use crate::auth::FixedCredentialAuthenticator;
use crate::config::{ReloadConfig, RemoteConsoleSettings, ServerConfig};
use crate::reload::{dispatcher_from_config, ReloadDispatcher};
use crate::server::TransferServer;
use crate::session::SessionDriver;
use crate::upload::UploadPipeline;
use plugin_manifest::JarManifestReader;
use std::sync::Arc;

/// Builds a server with the configured reload strategy.
///
/// Uses the fixed-credential authenticator and reads plugin names from
/// `plugin.yml` when the reload command needs one.
pub fn create_server(
    config: ServerConfig,
    reload: &ReloadConfig,
    console: &RemoteConsoleSettings,
) -> TransferServer {
    let dispatcher = dispatcher_from_config(reload, console, Arc::new(JarManifestReader::default()));
    create_server_with_dispatcher(config, dispatcher)
}

/// Builds a server that reports archive uploads to `dispatcher`.
pub fn create_server_with_dispatcher(config: ServerConfig, dispatcher: Arc<dyn ReloadDispatcher>) -> TransferServer {
    let pipeline = Arc::new(UploadPipeline::new(dispatcher, &config.archive_extension));
    let authenticator = Arc::new(FixedCredentialAuthenticator::new(config.credentials.clone()));
    let driver = Arc::new(SessionDriver::new(authenticator, pipeline, config.root_directory.clone()));
    TransferServer::new(config, driver)
}
