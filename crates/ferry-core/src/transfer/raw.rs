//! Transfer adapters over the raw length-prefixed form.
//!
//! The raw form carries no chunk boundaries. The source cuts the byte
//! stream into `chunk_size` pieces so receivers see the same chunk sequence
//! as in framed mode.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Chunk, ChunkSink, ChunkSource, TransferManifest};
use crate::error::{Error, Result};
use crate::protocol::raw::{read_raw_header, write_raw_header, RawHeader};

/// Reads one raw transfer.
pub struct RawSource<'a, R> {
    reader: &'a mut R,
    chunk_size: usize,
    manifest: Option<TransferManifest>,
    next_index: u64,
    bytes_read: u64,
}

impl<'a, R> RawSource<'a, R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Read a raw transfer from `reader`, cutting it into `chunk_size` chunks.
    pub fn new(reader: &'a mut R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.clamp(1, crate::MAX_CHUNK_SIZE),
            manifest: None,
            next_index: 0,
            bytes_read: 0,
        }
    }

    fn truncated(&self, manifest: &TransferManifest, partial: u64) -> Error {
        Error::TruncatedTransfer {
            file: manifest.filename.clone(),
            expected_chunks: manifest.total_chunks,
            received_chunks: self.next_index,
            expected_bytes: manifest.file_size,
            received_bytes: self.bytes_read + partial,
        }
    }
}

#[async_trait]
impl<R> ChunkSource for RawSource<'_, R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn open(&mut self) -> Result<TransferManifest> {
        let header = read_raw_header(&mut *self.reader).await?;
        let manifest = TransferManifest::new(header.filename, header.file_size, self.chunk_size);
        self.manifest = Some(manifest.clone());
        Ok(manifest)
    }

    async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        let Some(manifest) = self.manifest.as_ref() else {
            return Err(Error::Internal("raw source read before open".to_string()));
        };
        if self.next_index >= manifest.total_chunks {
            return Ok(None);
        }

        #[allow(clippy::cast_possible_truncation)]
        let len = manifest.chunk_len(self.next_index) as usize;
        let mut payload = vec![0u8; len];

        let mut filled = 0;
        while filled < len {
            let n = self
                .reader
                .read(&mut payload[filled..])
                .await
                .map_err(Error::transport)?;
            if n == 0 {
                return Err(self.truncated(manifest, filled as u64));
            }
            filled += n;
        }

        let chunk = Chunk {
            filename: manifest.filename.clone(),
            payload,
            index: self.next_index,
            total_count: manifest.total_chunks,
            file_size: manifest.file_size,
        };
        self.next_index += 1;
        self.bytes_read += len as u64;
        Ok(Some(chunk))
    }
}

/// Writes one raw transfer.
pub struct RawSink<'a, W> {
    writer: &'a mut W,
    bytes_written: u64,
}

impl<'a, W> RawSink<'a, W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Write a raw transfer to `writer`.
    pub fn new(writer: &'a mut W) -> Self {
        Self {
            writer,
            bytes_written: 0,
        }
    }

    /// Content bytes written so far.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[async_trait]
impl<W> ChunkSink for RawSink<'_, W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn open(&mut self, manifest: &TransferManifest) -> Result<()> {
        let header = RawHeader {
            filename: manifest.filename.clone(),
            file_size: manifest.file_size,
        };
        write_raw_header(&mut *self.writer, &header).await
    }

    async fn send_chunk(&mut self, chunk: Chunk) -> Result<()> {
        self.writer
            .write_all(&chunk.payload)
            .await
            .map_err(Error::transport)?;
        self.bytes_written += chunk.payload.len() as u64;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.flush().await.map_err(Error::transport)
    }
}
