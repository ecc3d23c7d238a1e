//! Transfer adapters over the framed protocol.
//!
//! The same adapters serve both call directions:
//!
//! | Direction  | Open frame     | End frame     | Writer  |
//! |------------|----------------|---------------|---------|
//! | `Upload`   | `UploadOpen`   | `UploadClose` | client  |
//! | `Download` | `DownloadOpen` | `DownloadEnd` | server  |
//!
//! Both adapters track whether the connection sits at a call boundary, so
//! callers know if it can carry another call after a failure.

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::{Chunk, ChunkSink, ChunkSource, TransferManifest};
use crate::error::{Error, Result};
use crate::protocol::{
    self, decode_chunk, decode_payload, encode_chunk, encode_payload, ErrorPayload, MessageType,
};

/// Which call a framed transfer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to server
    Upload,
    /// Server to client
    Download,
}

impl Direction {
    /// Frame that carries the manifest.
    #[must_use]
    pub const fn open_type(self) -> MessageType {
        match self {
            Self::Upload => MessageType::UploadOpen,
            Self::Download => MessageType::DownloadOpen,
        }
    }

    /// Frame that marks the end of the chunk stream.
    #[must_use]
    pub const fn end_type(self) -> MessageType {
        match self {
            Self::Upload => MessageType::UploadClose,
            Self::Download => MessageType::DownloadEnd,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Idle,
    Streaming,
    Ended,
    Disconnected,
}

/// Reads one transfer from a framed connection.
pub struct FramedSource<'a, R> {
    reader: &'a mut R,
    direction: Direction,
    deadline: Option<Duration>,
    announced: Option<TransferManifest>,
    state: StreamState,
}

impl<'a, R> FramedSource<'a, R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Read a transfer in `direction` from `reader`.
    pub fn new(reader: &'a mut R, direction: Direction) -> Self {
        Self {
            reader,
            direction,
            deadline: None,
            announced: None,
            state: StreamState::Idle,
        }
    }

    /// Continue a transfer whose open frame the caller already consumed.
    #[must_use]
    pub fn announced(mut self, manifest: TransferManifest) -> Self {
        self.announced = Some(manifest);
        self.state = StreamState::Streaming;
        self
    }

    /// Apply a per-frame read deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Whether the connection is positioned between calls.
    #[must_use]
    pub fn at_boundary(&self) -> bool {
        matches!(self.state, StreamState::Idle | StreamState::Ended)
    }

    /// Whether the peer closed the connection mid-transfer.
    #[must_use]
    pub fn disconnected(&self) -> bool {
        self.state == StreamState::Disconnected
    }

    /// Discard the rest of an abandoned transfer up to its end frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream breaks or carries a frame that does not
    /// belong to this transfer.
    pub async fn drain(&mut self) -> Result<()> {
        let mut discarded = 0u64;
        while self.state == StreamState::Streaming {
            if self.next_frame_chunk().await?.is_some() {
                discarded += 1;
            }
        }
        tracing::debug!(discarded, "drained abandoned transfer");
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<(protocol::FrameHeader, Vec<u8>)>> {
        match protocol::read_frame_within(&mut *self.reader, self.deadline).await {
            Ok(frame) => Ok(Some(frame)),
            Err(Error::Transport(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                self.state = StreamState::Disconnected;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn next_frame_chunk(&mut self) -> Result<Option<Chunk>> {
        let Some((header, payload)) = self.read().await? else {
            return Ok(None);
        };

        match header.message_type {
            MessageType::Chunk => decode_chunk(&payload).map(Some),
            t if t == self.direction.end_type() => {
                self.state = StreamState::Ended;
                Ok(None)
            }
            MessageType::Error => {
                self.state = StreamState::Ended;
                let remote: ErrorPayload = decode_payload(&payload)?;
                Err(remote.into_error())
            }
            other => Err(Error::UnexpectedMessage {
                expected: format!("Chunk or {:?}", self.direction.end_type()),
                actual: format!("{other:?}"),
            }),
        }
    }
}

#[async_trait]
impl<R> ChunkSource for FramedSource<'_, R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn open(&mut self) -> Result<TransferManifest> {
        if let Some(manifest) = self.announced.take() {
            return Ok(manifest);
        }

        let Some((header, payload)) = self.read().await? else {
            return Err(Error::transport(ErrorKind::UnexpectedEof.into()));
        };

        if header.message_type == MessageType::Error {
            self.state = StreamState::Ended;
        }
        protocol::expect_message(&header, &payload, self.direction.open_type())?;

        self.state = StreamState::Streaming;
        decode_payload(&payload)
    }

    async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.state != StreamState::Streaming {
            return Ok(None);
        }
        self.next_frame_chunk().await
    }
}

/// Writes one transfer to a framed connection.
pub struct FramedSink<'a, W> {
    writer: &'a mut W,
    direction: Direction,
    deadline: Option<Duration>,
    state: StreamState,
}

impl<'a, W> FramedSink<'a, W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Write a transfer in `direction` to `writer`.
    pub fn new(writer: &'a mut W, direction: Direction) -> Self {
        Self {
            writer,
            direction,
            deadline: None,
            state: StreamState::Idle,
        }
    }

    /// Apply a per-frame write deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Whether the connection is positioned between calls.
    #[must_use]
    pub fn at_boundary(&self) -> bool {
        matches!(self.state, StreamState::Idle | StreamState::Ended)
    }

    /// Whether the open frame has been written.
    #[must_use]
    pub fn opened(&self) -> bool {
        self.state != StreamState::Idle
    }

    async fn write(&mut self, message_type: MessageType, payload: &[u8]) -> Result<()> {
        protocol::write_frame_within(&mut *self.writer, message_type, payload, self.deadline).await
    }
}

#[async_trait]
impl<W> ChunkSink for FramedSink<'_, W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn open(&mut self, manifest: &TransferManifest) -> Result<()> {
        let payload = encode_payload(manifest)?;
        self.state = StreamState::Streaming;
        self.write(self.direction.open_type(), &payload).await
    }

    async fn send_chunk(&mut self, chunk: Chunk) -> Result<()> {
        let payload = encode_chunk(&chunk);
        self.write(MessageType::Chunk, &payload).await
    }

    async fn close(&mut self) -> Result<()> {
        self.write(self.direction.end_type(), &[]).await?;
        self.state = StreamState::Ended;
        Ok(())
    }
}
