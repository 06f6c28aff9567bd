//! # Deploy Server - Upload-Triggered Plugin Deployment
//!
//! An FTP endpoint for a game server's plugin directory. Files uploaded
//! through it are written straight into place; when a finished upload is a
//! plugin archive (by default anything ending in `.jar`), the running game
//! server is told to reload so the new code takes effect without a restart.
//!
//! ## Pipeline
//!
//! 1. A client connects and logs in ([`auth`], [`session`])
//! 2. File operations are resolved inside the configured root ([`session::SessionDriver`])
//! 3. Uploads stream through the [`upload::UploadPipeline`]
//! 4. Completing an archive upload fires one [`reload::ReloadDispatcher`] trigger
//! 5. The trigger reaches the game server over RCON or via screen/tmux
//!
//! Before the endpoint starts, [`bootstrap::ServerBootstrap`] makes sure the
//! game server's remote console is enabled with the configured password.
//!
//! ## Guarantees
//!
//! * Exactly one trigger per completed archive upload; none for aborted or
//!   failed uploads and none for other files
//! * A failed trigger never fails the upload that caused it
//! * Nothing outside the root directory is reachable
//! * Sessions are independent; a failure in one never reaches another
//!
//! ## Error Handling
//!
//! See [`error`] for the taxonomy. Only [`BootstrapError`] is fatal.

pub use config::{Credentials, Multiplexer, ReloadConfig, ReloadStrategy, RemoteConsoleSettings, ServerConfig};
pub use error::{AuthError, BootstrapError, DispatchError, ServerError};
pub use server::TransferServer;
pub use utils::{create_server, create_server_with_dispatcher};

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod ftp;
pub mod reload;
pub mod server;
pub mod session;
pub mod upload;
pub mod utils;
