//! Peer mode.
//!
//! A peer listens and sends at the same time. What it listens with follows
//! `transfer.transport` (see [`listen`]):
//!
//! - raw: each incoming connection carries one file in the raw form (see
//!   [`crate::protocol::raw`]) and is handled by a [`PeerNode`]
//! - framed: a [`Server`] accepts uploads over the framed protocol
//!
//! Either way files are stored through a receiving [`FileService`], normally
//! a [`LocalService`](crate::service::LocalService) whose storage root
//! stores files as `received_<name>`. Outgoing files go through the service
//! [`remote_service`](crate::service::remote_service) picks for the same
//! transport, so two peers sharing a configuration understand each other.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::config::{Config, Transport};
use crate::error::{Error, Result};
use crate::file::FileSource;
use crate::protocol::UploadResult;
use crate::report::{self, SharedReporter};
use crate::server::{accept_loop, ListenerHandle, Server};
use crate::service::FileService;
use crate::transfer::RawSource;

/// Listens for raw pushes from peers.
pub struct PeerNode {
    listener: TcpListener,
    receiver: Arc<dyn FileService>,
    reporter: SharedReporter,
    chunk_size: usize,
}

impl PeerNode {
    /// Bind to `addr`, storing received files through `receiver`.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the address cannot be bound.
    pub async fn bind(addr: &str, receiver: Arc<dyn FileService>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(Error::transport)?;
        Ok(Self {
            listener,
            receiver,
            reporter: report::noop(),
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
        })
    }

    /// Report received files to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Cut incoming streams into `chunk_size` byte chunks.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, crate::MAX_CHUNK_SIZE);
        self
    }

    /// Address the peer listens on.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::transport)
    }

    /// Receive until the process exits.
    ///
    /// # Errors
    ///
    /// Never returns under normal operation.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Receive until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok` once `shutdown` fires.
    pub async fn run_until(self, shutdown: impl Future<Output = ()> + Send) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "peer listening");

        let receiver = self.receiver;
        let reporter = self.reporter;
        let chunk_size = self.chunk_size;
        accept_loop(self.listener, shutdown, move |stream, peer| {
            let receiver = Arc::clone(&receiver);
            let reporter = Arc::clone(&reporter);
            async move {
                match receive(stream, receiver.as_ref(), chunk_size).await {
                    Ok(result) => {
                        tracing::info!(%peer, path = %result.stored_path, "received from peer");
                        reporter.report_info(&format!(
                            "Received from {peer}: {}",
                            result.stored_path
                        ));
                    }
                    Err(e) => {
                        tracing::error!(%peer, "peer transfer failed: {e}");
                        reporter.report_error(&format!("Transfer from {peer} failed: {e}"));
                    }
                }
            }
        })
        .await
    }

    /// Run in a background task.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the bound address cannot be read.
    pub fn spawn(self) -> Result<ListenerHandle> {
        let addr = self.local_addr()?;
        Ok(ListenerHandle::spawn(addr, |stop| self.run_until(stop)))
    }
}

/// Store the single file carried by a raw connection.
async fn receive(
    mut stream: TcpStream,
    receiver: &dyn FileService,
    chunk_size: usize,
) -> Result<UploadResult> {
    let mut source = RawSource::new(&mut stream, chunk_size);
    receiver.upload(&mut source).await
}

/// Start receiving on `addr` with the configured transport.
///
/// # Errors
///
/// Returns `Transport` if the address cannot be bound.
pub async fn listen(
    addr: &str,
    receiver: Arc<dyn FileService>,
    config: &Config,
    reporter: SharedReporter,
) -> Result<ListenerHandle> {
    match config.transfer.transport {
        Transport::Raw => PeerNode::bind(addr, receiver)
            .await?
            .with_reporter(reporter)
            .with_chunk_size(config.transfer.chunk_size)
            .spawn(),
        Transport::Framed => Server::bind(addr, receiver)
            .await?
            .with_io_timeout(config.transfer.io_timeout)
            .spawn(),
    }
}

/// Push the file at `path` through `sender`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the transfer fails.
pub async fn send_file(
    sender: &dyn FileService,
    path: impl AsRef<Path>,
    chunk_size: usize,
) -> Result<UploadResult> {
    let mut source = FileSource::open(path).await?.with_chunk_size(chunk_size);
    sender.upload(&mut source).await
}
