//! FTP front end.
//!
//! A deliberately small subset of RFC 959 plus the common extensions clients
//! rely on (`EPSV`, `SIZE`, `MFMT`, `SITE CHMOD`). Only passive data
//! connections are offered and only uploads are supported; there is no `RETR`.
//! Every file operation goes through the [`SessionDriver`], every upload
//! through its [`UploadPipeline`](crate::upload::UploadPipeline).

mod command;
mod handler;
mod listing;
mod passive;
mod reply;

pub use command::Command;
pub use handler::handle_connection;
pub use passive::PassivePorts;
pub use reply::Reply;

use crate::config::ServerConfig;
use crate::server::SessionRegistry;
use crate::session::SessionDriver;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Everything a control connection needs that outlives it.
pub struct FtpContext {
    pub driver: Arc<SessionDriver>,
    pub registry: SessionRegistry,
    pub passive: PassivePorts,
    pub masquerade_address: Option<IpAddr>,
    pub idle_timeout: Duration,
    pub data_timeout: Duration,
}

impl FtpContext {
    pub fn new(config: &ServerConfig, driver: Arc<SessionDriver>, registry: SessionRegistry) -> Self {
        Self {
            driver,
            registry,
            passive: PassivePorts::new(config.passive_ports),
            masquerade_address: config.masquerade_address,
            idle_timeout: config.idle_timeout,
            data_timeout: config.data_timeout,
        }
    }
}
