//! Serving role: a storage root on this machine.

use std::sync::Arc;

use async_trait::async_trait;

use super::FileService;
use crate::error::{Error, Result};
use crate::file::{format_size, FileSink, FileSource};
use crate::protocol::{FileListing, OperationResult, UploadResult};
use crate::report::{self, SharedReporter};
use crate::storage::StorageRoot;
use crate::transfer::{self, ChunkSink, ChunkSource, TransferSummary};

/// Serves files from a local [`StorageRoot`].
#[derive(Clone)]
pub struct LocalService {
    storage: StorageRoot,
    reporter: SharedReporter,
    chunk_size: usize,
}

impl LocalService {
    /// Serve `storage`, creating the root directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the root cannot be created.
    pub async fn open(storage: StorageRoot) -> Result<Self> {
        storage.ensure().await?;
        Ok(Self {
            storage,
            reporter: report::noop(),
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
        })
    }

    /// Report progress and messages to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Send downloads in `chunk_size` byte chunks.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, crate::MAX_CHUNK_SIZE);
        self
    }

    /// The storage root being served.
    #[must_use]
    pub const fn storage(&self) -> &StorageRoot {
        &self.storage
    }

    /// Wrap in an `Arc` for sharing between connections.
    #[must_use]
    pub fn shared(self) -> Arc<dyn FileService> {
        Arc::new(self)
    }
}

#[async_trait]
impl FileService for LocalService {
    async fn upload(&self, source: &mut dyn ChunkSource) -> Result<UploadResult> {
        let manifest = source.open().await?;
        let destination = self.storage.destination(&manifest.filename)?;
        let filename = manifest.filename.clone();

        let mut sink = FileSink::new(&destination);
        let summary = transfer::forward(manifest, source, &mut sink, &*self.reporter).await?;

        let stored_path = destination.display().to_string();
        tracing::info!(
            file = %filename,
            bytes = summary.bytes,
            path = %stored_path,
            "upload stored"
        );
        self.reporter.report_info(&format!(
            "Received {filename} ({})",
            format_size(summary.bytes)
        ));

        Ok(UploadResult {
            success: true,
            message: format!("stored {filename} ({} bytes)", summary.bytes),
            stored_path,
            bytes_received: summary.bytes,
        })
    }

    async fn download(&self, filename: &str, sink: &mut dyn ChunkSink) -> Result<TransferSummary> {
        let path = self.storage.resolve(filename)?;

        let source = match FileSource::open_as(&path, filename).await {
            Ok(source) => source,
            Err(Error::NotFound(_)) => return Err(Error::NotFound(filename.to_string())),
            Err(e) => return Err(e),
        };
        let mut source = source.with_chunk_size(self.chunk_size);

        let summary = transfer::pump(&mut source, sink, &*self.reporter).await?;
        tracing::info!(file = %filename, bytes = summary.bytes, "download served");
        Ok(summary)
    }

    async fn list(&self) -> Result<FileListing> {
        self.storage.list().await
    }

    async fn delete(&self, filename: &str) -> Result<OperationResult> {
        self.storage.delete(filename).await
    }

    fn endpoint(&self) -> String {
        format!("local:{}", self.storage.path().display())
    }
}
