//! Relay and sync between two endpoints.
//!
//! A relay downloads a file from one [`FileService`] into a private staging
//! directory and uploads it to another. The staging directory is a
//! [`tempfile::TempDir`], removed on every exit path.
//!
//! Because local and remote endpoints share the trait, the same relay does:
//!
//! | Source          | Destination     | Use                          |
//! |-----------------|-----------------|------------------------------|
//! | `RemoteService` | `RemoteService` | client moves a file A → B    |
//! | `LocalService`  | `RemoteService` | server pushes to its peer    |
//! | `RemoteService` | `LocalService`  | server pulls from its peer   |

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::file::{FileSink, FileSource};
use crate::protocol::UploadResult;
use crate::report::{self, SharedReporter};
use crate::service::FileService;
use crate::storage::validate_filename;

/// Name a pulled file is stored under: `from_<label>_<name>`.
#[must_use]
pub fn pulled_name(label: &str, name: &str) -> String {
    format!("from_{label}_{name}")
}

/// One entry that failed during [`Relay::sync_all`].
#[derive(Debug)]
pub struct SyncFailure {
    /// File name on the source
    pub filename: String,
    /// Why it failed
    pub error: Error,
}

/// Outcome of [`Relay::sync_all`].
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Files copied, with their upload acknowledgments
    pub synced: Vec<(String, UploadResult)>,
    /// Files that failed
    pub failed: Vec<SyncFailure>,
}

impl SyncReport {
    /// Whether every entry was copied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Payload bytes copied across all entries.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.synced.iter().map(|(_, r)| r.bytes_received).sum()
    }
}

/// Copies files between endpoints.
#[derive(Clone)]
pub struct Relay {
    reporter: SharedReporter,
    chunk_size: usize,
    staging_root: Option<PathBuf>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    /// Create a relay staging in the system temporary directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reporter: report::noop(),
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            staging_root: None,
        }
    }

    /// Report per-file outcomes to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Upload in `chunk_size` byte chunks.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, crate::MAX_CHUNK_SIZE);
        self
    }

    /// Create staging directories under `dir`.
    #[must_use]
    pub fn with_staging_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(dir.into());
        self
    }

    fn staging_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ferry-relay-");
        match &self.staging_root {
            Some(dir) => builder
                .tempdir_in(dir)
                .map_err(|e| Error::storage(dir, e)),
            None => builder
                .tempdir()
                .map_err(|e| Error::storage(std::env::temp_dir(), e)),
        }
    }

    /// Copy `name` from `source` to `destination`, stored there as
    /// `remote_name` when given.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilename` before any I/O if either name is unsafe,
    /// otherwise the first download or upload error.
    pub async fn sync_file(
        &self,
        source: &dyn FileService,
        destination: &dyn FileService,
        name: &str,
        remote_name: Option<&str>,
    ) -> Result<UploadResult> {
        validate_filename(name)?;
        let target = remote_name.unwrap_or(name);
        validate_filename(target)?;

        let staging = self.staging_dir()?;
        let staged = staging.path().join(name);

        let mut sink = FileSink::new(&staged);
        let downloaded = source.download(name, &mut sink).await?;
        tracing::debug!(
            file = %name,
            bytes = downloaded.bytes,
            from = %source.endpoint(),
            "staged for relay"
        );

        let mut upload = FileSource::open_as(&staged, target)
            .await?
            .with_chunk_size(self.chunk_size);
        let result = destination.upload(&mut upload).await?;
        drop(upload);

        staging
            .close()
            .map_err(|e| Error::storage(&staged, e))?;

        tracing::info!(
            file = %name,
            stored_as = %target,
            from = %source.endpoint(),
            to = %destination.endpoint(),
            bytes = result.bytes_received,
            "relayed"
        );
        Ok(result)
    }

    /// Copy every file listed by `source` to `destination`.
    ///
    /// Entries are independent: a failure is logged, recorded in the report
    /// and the next entry is attempted.
    ///
    /// # Errors
    ///
    /// Returns an error only if the source listing itself fails.
    pub async fn sync_all(
        &self,
        source: &dyn FileService,
        destination: &dyn FileService,
    ) -> Result<SyncReport> {
        let listing = source.list().await?;
        let mut report = SyncReport::default();

        for name in listing.files {
            match self.sync_file(source, destination, &name, None).await {
                Ok(result) => {
                    self.reporter.report_info(&format!("Synced {name}"));
                    report.synced.push((name, result));
                }
                Err(error) => {
                    tracing::warn!(file = %name, "sync failed: {error}");
                    self.reporter
                        .report_error(&format!("Failed to sync {name}: {error}"));
                    report.failed.push(SyncFailure {
                        filename: name,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            synced = report.synced.len(),
            failed = report.failed.len(),
            "sync finished"
        );
        Ok(report)
    }

    /// Pull `name` from `peer` into `local`, stored as `from_<label>_<name>`.
    ///
    /// # Errors
    ///
    /// Same as [`Relay::sync_file`].
    pub async fn pull(
        &self,
        peer: &dyn FileService,
        local: &dyn FileService,
        label: &str,
        name: &str,
    ) -> Result<UploadResult> {
        let stored = pulled_name(label, name);
        self.sync_file(peer, local, name, Some(&stored)).await
    }
}
