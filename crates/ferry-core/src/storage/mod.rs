//! Storage root management.
//!
//! Every endpoint owns one storage root directory. Files live directly in
//! it under their validated name, optionally with a fixed prefix (peer mode
//! stores receipts as `received_<name>`).
//!
//! ## Filename Safety
//!
//! Names arrive from the network, so they must not escape the root. A name
//! is rejected when it is empty, longer than [`crate::MAX_FILENAME_LEN`]
//! bytes, contains `..`, `/`, `\` or NUL, or uses the partial-file prefix.
//!
//! ## Coordination
//!
//! Listing and deletion are serialised by a [`RootLock`] handed in by the
//! caller, so every service sharing a root shares one lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::protocol::{FileListing, OperationResult};

/// Prefix of in-flight upload files.
pub const PARTIAL_PREFIX: &str = ".ferry-partial-";

/// Suffix of in-flight upload files.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Lock serialising list and delete on one storage root.
#[derive(Debug, Clone, Default)]
pub struct RootLock(Arc<Mutex<()>>);

impl RootLock {
    /// Create a new, unshared lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the root.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

/// Validate a filename received from a peer or the command line.
///
/// # Errors
///
/// Returns `InvalidFilename` describing the first rule the name breaks.
pub fn validate_filename(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.len() > crate::MAX_FILENAME_LEN {
        Some("name is too long")
    } else if name.contains("..") {
        Some("name contains '..'")
    } else if name.contains('/') || name.contains('\\') {
        Some("name contains a path separator")
    } else if name.contains('\0') {
        Some("name contains NUL")
    } else if is_partial_name(name) {
        Some("name uses a reserved prefix")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidFilename(format!("'{name}': {reason}"))),
        None => Ok(()),
    }
}

/// Whether `name` is an in-flight upload file.
#[must_use]
pub fn is_partial_name(name: &str) -> bool {
    name.starts_with(PARTIAL_PREFIX) && name.ends_with(PARTIAL_SUFFIX)
}

/// A storage root directory.
#[derive(Debug, Clone)]
pub struct StorageRoot {
    root: PathBuf,
    prefix: String,
    lock: RootLock,
}

impl StorageRoot {
    /// Use `root` as storage, coordinated through `lock`.
    pub fn new(root: impl Into<PathBuf>, lock: RootLock) -> Self {
        Self {
            root: root.into(),
            prefix: String::new(),
            lock,
        }
    }

    /// Store uploads as `<prefix><name>`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Root directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Prefix applied to stored uploads.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Create the root directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the directory cannot be created.
    pub async fn ensure(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::storage(&self.root, e))
    }

    /// Path of an existing file named `name`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilename` if the name is unsafe.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_filename(name)?;
        Ok(self.root.join(name))
    }

    /// Path an upload of `name` is stored at, prefix included.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilename` if the name is unsafe or the prefixed name
    /// is too long.
    pub fn destination(&self, name: &str) -> Result<PathBuf> {
        validate_filename(name)?;
        let stored = format!("{}{name}", self.prefix);
        validate_filename(&stored)?;
        Ok(self.root.join(stored))
    }

    /// List the non-directory entries of the root.
    ///
    /// Entries come back in directory-iteration order. Partial uploads are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the root cannot be read.
    pub async fn list(&self) -> Result<FileListing> {
        let _guard = self.lock.acquire().await;

        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::storage(&self.root, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage(&self.root, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::storage(entry.path(), e))?;
            if file_type.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if is_partial_name(&name) {
                continue;
            }
            files.push(name);
        }

        Ok(FileListing { files })
    }

    /// Delete the file named `name`.
    ///
    /// A missing file is reported as `success: false`, not as an error.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilename` if the name is unsafe, or `Storage` if the
    /// file exists but cannot be removed.
    pub async fn delete(&self, name: &str) -> Result<OperationResult> {
        let path = self.resolve(name)?;
        let _guard = self.lock.acquire().await;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(file = %name, "deleted");
                Ok(OperationResult {
                    success: true,
                    message: format!("deleted {name}"),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(OperationResult {
                success: false,
                message: format!("file not found: {name}"),
            }),
            Err(e) => Err(Error::storage(&path, e)),
        }
    }
}
