//! File operations for Ferry.
//!
//! This module handles:
//! - Reading a local file as a chunk sequence ([`FileSource`])
//! - Writing a received file atomically ([`AtomicFileWriter`], [`FileSink`])
//! - Size formatting for display
//!
//! ## Atomic Writes
//!
//! Received content goes to a hidden partial file next to the destination.
//! Only a complete transfer renames it onto the destination, so a failed
//! upload never leaves a half-written file under the real name. Dropping an
//! uncommitted writer removes the partial file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::{PARTIAL_PREFIX, PARTIAL_SUFFIX};
use crate::transfer::{Chunk, ChunkSink, ChunkSource, TransferManifest};

/// Reads a local file as an ordered chunk sequence.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: File,
    manifest: TransferManifest,
    next_index: u64,
}

impl FileSource {
    /// Open `path`, announcing it under its own file name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilename` if the path has no UTF-8 file name,
    /// `NotFound` if it does not exist, or `Storage` if it cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidFilename(path.display().to_string()))?
            .to_string();
        Self::open_as(path, name).await
    }

    /// Open `path`, announcing it as `name`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist, or `Storage` if it
    /// cannot be opened or is not a regular file.
    pub async fn open_as(path: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(Error::storage(&path, e)),
        };

        let metadata = file
            .metadata()
            .await
            .map_err(|e| Error::storage(&path, e))?;
        if !metadata.is_file() {
            return Err(Error::storage(
                &path,
                std::io::Error::other("not a regular file"),
            ));
        }

        let manifest = TransferManifest::new(name, metadata.len(), crate::DEFAULT_CHUNK_SIZE);

        Ok(Self {
            path,
            file,
            manifest,
            next_index: 0,
        })
    }

    /// Use `chunk_size` byte chunks instead of the default.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.clamp(1, crate::MAX_CHUNK_SIZE);
        self.manifest = TransferManifest::new(
            std::mem::take(&mut self.manifest.filename),
            self.manifest.file_size,
            chunk_size,
        );
        self
    }

    /// Size of the file as announced.
    #[must_use]
    pub const fn file_size(&self) -> u64 {
        self.manifest.file_size
    }

    /// Path being read.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    async fn open(&mut self) -> Result<TransferManifest> {
        Ok(self.manifest.clone())
    }

    async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.next_index >= self.manifest.total_chunks {
            return Ok(None);
        }

        #[allow(clippy::cast_possible_truncation)]
        let len = self.manifest.chunk_len(self.next_index) as usize;
        let mut payload = vec![0u8; len];

        self.file
            .read_exact(&mut payload)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => Error::storage(
                    &self.path,
                    std::io::Error::new(
                        e.kind(),
                        format!(
                            "file shorter than its announced {} bytes",
                            self.manifest.file_size
                        ),
                    ),
                ),
                _ => Error::storage(&self.path, e),
            })?;

        let chunk = Chunk {
            filename: self.manifest.filename.clone(),
            payload,
            index: self.next_index,
            total_count: self.manifest.total_chunks,
            file_size: self.manifest.file_size,
        };
        self.next_index += 1;
        Ok(Some(chunk))
    }
}

/// Writes a file through a hidden partial file and an atomic rename.
#[derive(Debug)]
pub struct AtomicFileWriter {
    destination: PathBuf,
    partial: PathBuf,
    file: Option<File>,
    bytes_written: u64,
    committed: bool,
}

impl AtomicFileWriter {
    /// Start writing a file that will end up at `destination`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the partial file cannot be created.
    pub async fn create(destination: impl Into<PathBuf>) -> Result<Self> {
        let destination = destination.into();
        let dir = destination
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage(&dir, e))?;

        let partial = dir.join(format!(
            "{PARTIAL_PREFIX}{}{PARTIAL_SUFFIX}",
            Uuid::new_v4().simple()
        ));
        let file = File::create(&partial)
            .await
            .map_err(|e| Error::storage(&partial, e))?;

        tracing::debug!(partial = %partial.display(), "partial file created");

        Ok(Self {
            destination,
            partial,
            file: Some(file),
            bytes_written: 0,
            committed: false,
        })
    }

    /// Append `data`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the write fails.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(Error::Internal("write after commit".to_string()));
        };
        file.write_all(data)
            .await
            .map_err(|e| Error::storage(&self.partial, e))?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Flush, sync and rename the partial file onto the destination.
    ///
    /// Any previous file at the destination is replaced.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if syncing or renaming fails. The partial file is
    /// removed in that case.
    pub async fn commit(mut self) -> Result<PathBuf> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| Error::storage(&self.partial, e))?;
            file.sync_all()
                .await
                .map_err(|e| Error::storage(&self.partial, e))?;
        }

        tokio::fs::rename(&self.partial, &self.destination)
            .await
            .map_err(|e| Error::storage(&self.destination, e))?;
        self.committed = true;

        Ok(self.destination.clone())
    }

    /// Bytes written so far.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Final path of the file.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Path of the partial file.
    #[must_use]
    pub fn partial_path(&self) -> &Path {
        &self.partial
    }
}

impl Drop for AtomicFileWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.file = None;
        if let Err(e) = std::fs::remove_file(&self.partial) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    partial = %self.partial.display(),
                    "failed to remove partial file: {e}"
                );
            }
        }
    }
}

/// Receives a transfer into a local file.
///
/// Nothing touches the filesystem until the sink is opened, and the file
/// only appears under its final name once the transfer closes.
#[derive(Debug)]
pub struct FileSink {
    destination: PathBuf,
    writer: Option<AtomicFileWriter>,
    stored: Option<PathBuf>,
}

impl FileSink {
    /// Receive into `destination`.
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            writer: None,
            stored: None,
        }
    }

    /// Destination path.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Where the file was stored, once closed.
    #[must_use]
    pub fn stored_path(&self) -> Option<&Path> {
        self.stored.as_deref()
    }
}

#[async_trait]
impl ChunkSink for FileSink {
    async fn open(&mut self, _manifest: &TransferManifest) -> Result<()> {
        self.writer = Some(AtomicFileWriter::create(self.destination.clone()).await?);
        Ok(())
    }

    async fn send_chunk(&mut self, chunk: Chunk) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::Internal("file sink written before open".to_string()));
        };
        writer.write(&chunk.payload).await
    }

    async fn close(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Err(Error::Internal("file sink closed before open".to_string()));
        };
        self.stored = Some(writer.commit().await?);
        Ok(())
    }

    async fn abort(&mut self) {
        if let Some(writer) = self.writer.take() {
            tracing::debug!(partial = %writer.partial_path().display(), "discarding partial file");
        }
    }
}

/// Format a file size for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
