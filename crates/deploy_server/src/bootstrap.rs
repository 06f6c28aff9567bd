//! Startup preparation of the game server's settings.
//!
//! Before the transfer endpoint accepts anyone, the remote console must be
//! enabled with the credential the reload strategy will use. The store is
//! read once, the three remote-console keys are overwritten, and the whole
//! mapping is written back. Running it twice yields the same file.

use crate::error::BootstrapError;
use rcon_client::ConsoleEndpoint;
use server_properties::{ConfigStore, Properties};
use std::sync::Arc;
use tracing::info;

pub const ENABLE_RCON_KEY: &str = "enable-rcon";
pub const RCON_PASSWORD_KEY: &str = "rcon.password";
pub const RCON_PORT_KEY: &str = "rcon.port";

pub struct ServerBootstrap {
    store: Arc<dyn ConfigStore>,
    endpoint: ConsoleEndpoint,
}

impl ServerBootstrap {
    pub fn new(store: Arc<dyn ConfigStore>, endpoint: ConsoleEndpoint) -> Self {
        Self { store, endpoint }
    }

    /// Upserts the remote-console settings and persists the store.
    ///
    /// # Returns
    ///
    /// The mapping as written, or a [`BootstrapError`] if the store could not
    /// be read or written. Either error is fatal for startup.
    pub async fn run(&self) -> Result<Properties, BootstrapError> {
        let mut properties = self.store.load().await.map_err(BootstrapError::Load)?;

        properties.set(ENABLE_RCON_KEY, "true");
        properties.set(RCON_PASSWORD_KEY, self.endpoint.password.as_str());
        properties.set(RCON_PORT_KEY, self.endpoint.port.to_string());

        self.store.store(&properties).await.map_err(BootstrapError::Store)?;

        info!(
            "⚙️  Remote console enabled on port {} ({} settings persisted)",
            self.endpoint.port,
            properties.len()
        );
        Ok(properties)
    }
}
