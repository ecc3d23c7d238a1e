//! Transfer engine for Ferry.
//!
//! A transfer joins a [`ChunkSource`] to a [`ChunkSink`]:
//!
//! - the source announces a [`TransferManifest`] and yields chunks in order
//! - a [`SessionTracker`] checks every chunk against the manifest
//! - the sink receives the manifest, each chunk, and a final close
//!
//! Files, framed connections and raw peer sockets all implement the two
//! traits, so upload, download, peer push and relay share [`pump`].
//!
//! ## Completion
//!
//! A transfer is complete when every announced chunk and byte has arrived.
//! A source that ends early (clean end marker or connection close) fails
//! with [`Error::TruncatedTransfer`] and the sink is never closed.

pub mod framed;
pub mod raw;

pub use framed::{Direction, FramedSink, FramedSource};
pub use raw::{RawSink, RawSource};

pub use crate::protocol::{Chunk, TransferManifest};

use std::time::Duration;

use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::report::Reporter;

/// Configure TCP keep-alive on a socket.
///
/// Probing starts after 10 seconds idle and repeats every 5 seconds, so a
/// peer that vanishes mid-transfer surfaces as a transport error.
///
/// # Errors
///
/// Returns `Transport` if the socket option cannot be set.
pub fn configure_tcp_keepalive(stream: &TcpStream) -> Result<()> {
    let socket_ref = SockRef::from(stream);

    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(10))
        .with_interval(Duration::from_secs(5));

    socket_ref
        .set_tcp_keepalive(&keepalive)
        .map_err(Error::transport)?;

    tracing::debug!("TCP keep-alive enabled on socket");
    Ok(())
}

/// Open a transfer connection to `addr`.
///
/// Keep-alive and `TCP_NODELAY` are set on the new socket.
///
/// # Errors
///
/// Returns `Timeout` if `connect_timeout` elapses first, or `Transport` if
/// the connection fails.
pub async fn dial(addr: &str, connect_timeout: Option<Duration>) -> Result<TcpStream> {
    let connect = TcpStream::connect(addr);
    let stream = match connect_timeout {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| Error::Timeout(limit.as_secs()))?,
        None => connect.await,
    }
    .map_err(Error::transport)?;

    if let Err(e) = configure_tcp_keepalive(&stream) {
        tracing::warn!("Failed to configure TCP keep-alive: {e}");
    }
    stream.set_nodelay(true).map_err(Error::transport)?;

    tracing::debug!(%addr, "connected");
    Ok(stream)
}

/// Produces the chunks of one file.
#[async_trait]
pub trait ChunkSource: Send {
    /// Announce the transfer. Called once, before [`Self::next_chunk`].
    async fn open(&mut self) -> Result<TransferManifest>;

    /// Next chunk, or `None` at end of input.
    async fn next_chunk(&mut self) -> Result<Option<Chunk>>;
}

/// Consumes the chunks of one file.
#[async_trait]
pub trait ChunkSink: Send {
    /// Start the transfer described by `manifest`.
    async fn open(&mut self, manifest: &TransferManifest) -> Result<()>;

    /// Accept the next chunk.
    async fn send_chunk(&mut self, chunk: Chunk) -> Result<()>;

    /// Finish a complete transfer.
    async fn close(&mut self) -> Result<()>;

    /// Give up on a transfer that failed after [`Self::open`].
    ///
    /// Sinks that stage data discard it here.
    async fn abort(&mut self) {}
}

/// Outcome of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    /// File name from the manifest
    pub filename: String,
    /// Payload bytes moved
    pub bytes: u64,
    /// Chunks moved
    pub chunks: u64,
}

/// Receiver-side state of one transfer.
///
/// Created from the manifest, advanced by each chunk, consumed by
/// [`SessionTracker::finish`].
#[derive(Debug)]
pub struct SessionTracker {
    manifest: TransferManifest,
    next_index: u64,
    bytes_received: u64,
}

impl SessionTracker {
    /// Start tracking the transfer described by `manifest`.
    #[must_use]
    pub fn new(manifest: TransferManifest) -> Self {
        Self {
            manifest,
            next_index: 0,
            bytes_received: 0,
        }
    }

    /// The manifest this session validates against.
    #[must_use]
    pub const fn manifest(&self) -> &TransferManifest {
        &self.manifest
    }

    /// Payload bytes accepted so far.
    #[must_use]
    pub const fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Chunks accepted so far.
    #[must_use]
    pub const fn chunks_received(&self) -> u64 {
        self.next_index
    }

    /// Validate `chunk` and advance the session.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the chunk belongs to another file, carries
    /// different totals, arrives out of order or has the wrong length.
    pub fn accept(&mut self, chunk: &Chunk) -> Result<()> {
        let manifest = &self.manifest;

        if chunk.filename != manifest.filename {
            return Err(Error::ProtocolError(format!(
                "chunk for '{}' in transfer of '{}'",
                chunk.filename, manifest.filename
            )));
        }

        if chunk.total_count != manifest.total_chunks || chunk.file_size != manifest.file_size {
            return Err(Error::ProtocolError(format!(
                "chunk {} announces {} chunks/{} bytes, manifest has {}/{}",
                chunk.index,
                chunk.total_count,
                chunk.file_size,
                manifest.total_chunks,
                manifest.file_size
            )));
        }

        if self.next_index >= manifest.total_chunks {
            return Err(Error::ProtocolError(format!(
                "chunk {} past the final chunk of '{}'",
                chunk.index, manifest.filename
            )));
        }

        if chunk.index != self.next_index {
            return Err(Error::ProtocolError(format!(
                "expected chunk {}, got {}",
                self.next_index, chunk.index
            )));
        }

        let expected_len = manifest.chunk_len(chunk.index);
        if chunk.payload.len() as u64 != expected_len {
            return Err(Error::ProtocolError(format!(
                "chunk {} has {} bytes, expected {}",
                chunk.index,
                chunk.payload.len(),
                expected_len
            )));
        }

        self.next_index += 1;
        self.bytes_received += expected_len;
        Ok(())
    }

    /// End the session.
    ///
    /// # Errors
    ///
    /// Returns `TruncatedTransfer` if fewer chunks or bytes arrived than the
    /// manifest announced.
    pub fn finish(self) -> Result<TransferSummary> {
        if self.next_index < self.manifest.total_chunks
            || self.bytes_received < self.manifest.file_size
        {
            return Err(Error::TruncatedTransfer {
                file: self.manifest.filename,
                expected_chunks: self.manifest.total_chunks,
                received_chunks: self.next_index,
                expected_bytes: self.manifest.file_size,
                received_bytes: self.bytes_received,
            });
        }

        Ok(TransferSummary {
            filename: self.manifest.filename,
            bytes: self.bytes_received,
            chunks: self.next_index,
        })
    }
}

/// Run one transfer from `source` to `sink`.
///
/// Opens the source first, so a source that fails to announce leaves the
/// sink untouched.
///
/// # Errors
///
/// Returns the first error raised by the source, the sink or the session
/// checks.
pub async fn pump(
    source: &mut dyn ChunkSource,
    sink: &mut dyn ChunkSink,
    reporter: &dyn Reporter,
) -> Result<TransferSummary> {
    let manifest = source.open().await?;
    forward(manifest, source, sink, reporter).await
}

/// Run one transfer whose manifest has already been read from `source`.
///
/// # Errors
///
/// Returns the first error raised by the source, the sink or the session
/// checks.
pub async fn forward(
    manifest: TransferManifest,
    source: &mut dyn ChunkSource,
    sink: &mut dyn ChunkSink,
    reporter: &dyn Reporter,
) -> Result<TransferSummary> {
    manifest.validate()?;

    tracing::debug!(
        file = %manifest.filename,
        size = manifest.file_size,
        chunks = manifest.total_chunks,
        "transfer started"
    );

    sink.open(&manifest).await?;

    let summary = match stream_chunks(manifest, source, sink, reporter).await {
        Ok(summary) => summary,
        Err(e) => {
            sink.abort().await;
            return Err(e);
        }
    };

    tracing::debug!(
        file = %summary.filename,
        bytes = summary.bytes,
        chunks = summary.chunks,
        "transfer complete"
    );

    Ok(summary)
}

async fn stream_chunks(
    manifest: TransferManifest,
    source: &mut dyn ChunkSource,
    sink: &mut dyn ChunkSink,
    reporter: &dyn Reporter,
) -> Result<TransferSummary> {
    let total = manifest.total_chunks;
    let mut tracker = SessionTracker::new(manifest);

    while let Some(chunk) = source.next_chunk().await? {
        tracker.accept(&chunk)?;
        let index = chunk.index;
        sink.send_chunk(chunk).await?;
        reporter.report_progress(index + 1, total);
    }

    let summary = tracker.finish()?;
    sink.close().await?;
    Ok(summary)
}
