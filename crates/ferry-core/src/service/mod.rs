//! File services.
//!
//! [`FileService`] is the capability set every endpoint offers: upload,
//! download, list and delete. Three implementations cover the roles a node
//! can play:
//!
//! - [`LocalService`] serves a storage root on this machine
//! - [`RemoteService`] calls a Ferry server over the framed protocol
//! - [`RawPeerService`] pushes files to a peer over the raw form
//!
//! Anything that composes services (the server loop, the relay) works with
//! any of them.

mod local;
mod raw;
mod remote;

pub use local::LocalService;
pub use raw::RawPeerService;
pub use remote::{ConnectOptions, RemoteService};

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, Transport};
use crate::error::Result;
use crate::protocol::{FileListing, OperationResult, UploadResult};
use crate::report::SharedReporter;
use crate::transfer::{ChunkSink, ChunkSource, TransferSummary};

/// Operations every Ferry endpoint supports.
#[async_trait]
pub trait FileService: Send + Sync {
    /// Store the file produced by `source`.
    async fn upload(&self, source: &mut dyn ChunkSource) -> Result<UploadResult>;

    /// Stream the file named `filename` into `sink`.
    ///
    /// The sink is only opened once the file is known to exist.
    async fn download(&self, filename: &str, sink: &mut dyn ChunkSink) -> Result<TransferSummary>;

    /// List stored files.
    async fn list(&self) -> Result<FileListing>;

    /// Delete the file named `filename`.
    async fn delete(&self, filename: &str) -> Result<OperationResult>;

    /// Human-readable endpoint description for logs.
    fn endpoint(&self) -> String;
}

/// Build the service that reaches `addr` with the configured transport.
#[must_use]
pub fn remote_service(
    addr: impl Into<String>,
    config: &Config,
    reporter: SharedReporter,
) -> Arc<dyn FileService> {
    let options = ConnectOptions::from_config(config);
    match config.transfer.transport {
        Transport::Framed => {
            Arc::new(RemoteService::lazy(addr, options).with_reporter(reporter))
        }
        Transport::Raw => Arc::new(RawPeerService::new(addr, options).with_reporter(reporter)),
    }
}

/// Build the service that reaches the configured peer.
///
/// # Errors
///
/// Returns `InvalidConfig` if no peer address is configured.
pub fn peer_service(config: &Config, reporter: SharedReporter) -> Result<Arc<dyn FileService>> {
    Ok(remote_service(config.peer_endpoint()?, config, reporter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report;

    #[test]
    fn test_remote_service_follows_transport() {
        let mut config = Config::default();
        let framed = remote_service("127.0.0.1:9", &config, report::noop());
        assert_eq!(framed.endpoint(), "ferry://127.0.0.1:9");

        config.transfer.transport = Transport::Raw;
        let raw = remote_service("127.0.0.1:9", &config, report::noop());
        assert_eq!(raw.endpoint(), "raw://127.0.0.1:9");
    }

    #[test]
    fn test_peer_service_requires_peer() {
        let config = Config::default();
        assert!(peer_service(&config, report::noop()).is_err());
    }
}
