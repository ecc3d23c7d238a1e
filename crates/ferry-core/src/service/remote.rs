//! Client role: a Ferry server reached over the framed protocol.
//!
//! One persistent connection carries calls sequentially. A call that fails
//! with the connection mid-transfer drops it, and the next call reconnects.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};

use super::FileService;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::{
    self, decode_payload, encode_payload, FileListing, FileRequest, MessageType, OperationResult,
    UploadResult,
};
use crate::report::{self, SharedReporter};
use crate::transfer::{self, ChunkSink, ChunkSource, Direction, FramedSink, FramedSource, TransferSummary};

/// Connection settings for outbound services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Limit on establishing the connection
    pub connect_timeout: Option<Duration>,
    /// Limit on each frame read or write
    pub io_timeout: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            io_timeout: None,
        }
    }
}

impl ConnectOptions {
    /// Take the timeouts from the transfer configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect_timeout: config.transfer.connect_timeout,
            io_timeout: config.transfer.io_timeout,
        }
    }
}

/// Calls a remote Ferry server.
pub struct RemoteService {
    addr: String,
    options: ConnectOptions,
    reporter: SharedReporter,
    connection: Mutex<Option<TcpStream>>,
}

impl RemoteService {
    /// Connect to the server at `addr`.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` or `Transport` if the connection cannot be made.
    pub async fn connect(addr: impl Into<String>, options: ConnectOptions) -> Result<Self> {
        let service = Self::lazy(addr, options);
        let stream = transfer::dial(&service.addr, options.connect_timeout).await?;
        *service.connection.lock().await = Some(stream);
        tracing::info!(addr = %service.addr, "connected to server");
        Ok(service)
    }

    /// Refer to the server at `addr`, connecting on first use.
    pub fn lazy(addr: impl Into<String>, options: ConnectOptions) -> Self {
        Self {
            addr: addr.into(),
            options,
            reporter: report::noop(),
            connection: Mutex::new(None),
        }
    }

    /// Report transfer progress to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Server address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connection(&self) -> Result<MutexGuard<'_, Option<TcpStream>>> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            let stream = transfer::dial(&self.addr, self.options.connect_timeout).await?;
            *guard = Some(stream);
        }
        Ok(guard)
    }

    /// Send one request frame and decode the single reply frame.
    async fn call<T: DeserializeOwned>(
        &self,
        request: MessageType,
        payload: &[u8],
        expected: MessageType,
    ) -> Result<T> {
        let deadline = self.options.io_timeout;
        let mut guard = self.connection().await?;
        let Some(stream) = guard.as_mut() else {
            return Err(Error::Internal("connection missing".to_string()));
        };

        let exchanged = async {
            protocol::write_frame_within(stream, request, payload, deadline).await?;
            protocol::read_frame_within(stream, deadline).await
        }
        .await;

        let (header, reply) = match exchanged {
            Ok(frame) => frame,
            Err(e) => {
                *guard = None;
                return Err(e);
            }
        };

        protocol::expect_message(&header, &reply, expected)?;
        decode_payload(&reply)
    }
}

#[async_trait]
impl FileService for RemoteService {
    async fn upload(&self, source: &mut dyn ChunkSource) -> Result<UploadResult> {
        let manifest = source.open().await?;
        crate::storage::validate_filename(&manifest.filename)?;

        let deadline = self.options.io_timeout;
        let mut guard = self.connection().await?;
        let Some(stream) = guard.as_mut() else {
            return Err(Error::Internal("connection missing".to_string()));
        };

        let mut sink = FramedSink::new(stream, Direction::Upload).with_deadline(deadline);
        let streamed = transfer::forward(manifest, source, &mut sink, &*self.reporter).await;
        let clean = sink.at_boundary();

        if let Err(e) = streamed {
            if !clean {
                *guard = None;
            }
            return Err(e);
        }

        let (header, reply) = match protocol::read_frame_within(stream, deadline).await {
            Ok(frame) => frame,
            Err(e) => {
                *guard = None;
                return Err(e);
            }
        };

        protocol::expect_message(&header, &reply, MessageType::UploadResult)?;
        let result: UploadResult = decode_payload(&reply)?;
        tracing::info!(
            addr = %self.addr,
            bytes = result.bytes_received,
            path = %result.stored_path,
            "upload acknowledged"
        );
        Ok(result)
    }

    async fn download(&self, filename: &str, sink: &mut dyn ChunkSink) -> Result<TransferSummary> {
        crate::storage::validate_filename(filename)?;

        let deadline = self.options.io_timeout;
        let mut guard = self.connection().await?;
        let Some(stream) = guard.as_mut() else {
            return Err(Error::Internal("connection missing".to_string()));
        };

        let request = encode_payload(&FileRequest::new(filename))?;
        if let Err(e) =
            protocol::write_frame_within(stream, MessageType::DownloadRequest, &request, deadline)
                .await
        {
            *guard = None;
            return Err(e);
        }

        let mut source = FramedSource::new(stream, Direction::Download).with_deadline(deadline);
        let result = transfer::pump(&mut source, sink, &*self.reporter).await;

        if !source.at_boundary() {
            *guard = None;
        }

        let summary = result?;
        tracing::info!(addr = %self.addr, file = %filename, bytes = summary.bytes, "download complete");
        Ok(summary)
    }

    async fn list(&self) -> Result<FileListing> {
        self.call(MessageType::ListRequest, &[], MessageType::FileListing)
            .await
    }

    async fn delete(&self, filename: &str) -> Result<OperationResult> {
        crate::storage::validate_filename(filename)?;
        let request = encode_payload(&FileRequest::new(filename))?;
        self.call(MessageType::DeleteRequest, &request, MessageType::OperationResult)
            .await
    }

    fn endpoint(&self) -> String {
        format!("ferry://{}", self.addr)
    }
}
