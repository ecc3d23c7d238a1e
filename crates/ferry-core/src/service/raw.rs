//! Raw peer sender role.
//!
//! The raw form moves one file per connection and has no replies, so only
//! uploads are possible.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{ConnectOptions, FileService};
use crate::error::{Error, Result};
use crate::protocol::{FileListing, OperationResult, UploadResult};
use crate::report::{self, SharedReporter};
use crate::transfer::{self, ChunkSink, ChunkSource, RawSink, TransferSummary};

/// Pushes files to a peer listening for raw transfers.
pub struct RawPeerService {
    addr: String,
    options: ConnectOptions,
    reporter: SharedReporter,
}

impl RawPeerService {
    /// Push to the peer at `addr`.
    pub fn new(addr: impl Into<String>, options: ConnectOptions) -> Self {
        Self {
            addr: addr.into(),
            options,
            reporter: report::noop(),
        }
    }

    /// Report transfer progress to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    fn unsupported(&self, operation: &str) -> Error {
        Error::Unsupported(format!("{operation} over raw transport to {}", self.addr))
    }
}

#[async_trait]
impl FileService for RawPeerService {
    async fn upload(&self, source: &mut dyn ChunkSource) -> Result<UploadResult> {
        let manifest = source.open().await?;
        crate::storage::validate_filename(&manifest.filename)?;

        let mut stream = transfer::dial(&self.addr, self.options.connect_timeout).await?;

        let mut sink = RawSink::new(&mut stream);
        let summary = transfer::forward(manifest, source, &mut sink, &*self.reporter).await?;
        stream.shutdown().await.map_err(Error::transport)?;

        tracing::info!(
            addr = %self.addr,
            file = %summary.filename,
            bytes = summary.bytes,
            "sent to peer"
        );

        Ok(UploadResult {
            success: true,
            message: format!("sent {} to {}", summary.filename, self.addr),
            stored_path: summary.filename,
            bytes_received: summary.bytes,
        })
    }

    async fn download(&self, _filename: &str, _sink: &mut dyn ChunkSink) -> Result<TransferSummary> {
        Err(self.unsupported("download"))
    }

    async fn list(&self) -> Result<FileListing> {
        Err(self.unsupported("list"))
    }

    async fn delete(&self, _filename: &str) -> Result<OperationResult> {
        Err(self.unsupported("delete"))
    }

    fn endpoint(&self) -> String {
        format!("raw://{}", self.addr)
    }
}
