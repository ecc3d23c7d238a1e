//! Common test utilities for `Ferry` integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ferry_core::report::Reporter;
use ferry_core::server::{ListenerHandle, Server};
use ferry_core::service::{FileService, LocalService};
use ferry_core::storage::{RootLock, StorageRoot};

/// Create a temporary directory for test files.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::create_dir_all(dir).expect("Failed to create parent directories");
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Assert that two files have identical content.
pub fn assert_files_equal(path1: &Path, path2: &Path) {
    let content1 = std::fs::read(path1).expect("Failed to read first file");
    let content2 = std::fs::read(path2).expect("Failed to read second file");
    assert_eq!(content1, content2, "File contents differ");
}

/// Names of every entry in `dir`, sorted.
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to read directory")
        .map(|e| {
            e.expect("Failed to read entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Counts progress reports.
#[derive(Default)]
pub struct CountingReporter {
    progress: AtomicU64,
}

impl CountingReporter {
    /// Progress reports seen so far.
    pub fn progress_reports(&self) -> u64 {
        self.progress.load(Ordering::SeqCst)
    }
}

impl Reporter for CountingReporter {
    fn report_progress(&self, _current: u64, _total: u64) {
        self.progress.fetch_add(1, Ordering::SeqCst);
    }
}

/// A server on a loopback port serving a fresh storage root.
pub struct TestServer {
    pub handle: ListenerHandle,
    pub root: PathBuf,
}

impl TestServer {
    /// Start serving `root` with `chunk_size` byte download chunks.
    pub async fn start(root: PathBuf, chunk_size: usize) -> Self {
        let service = LocalService::open(StorageRoot::new(&root, RootLock::new()))
            .await
            .expect("Failed to open storage")
            .with_chunk_size(chunk_size);
        Self::serve(service.shared(), root).await
    }

    /// Start serving an arbitrary service; `root` is only recorded.
    pub async fn serve(service: Arc<dyn FileService>, root: PathBuf) -> Self {
        let server = Server::bind("127.0.0.1:0", service)
            .await
            .expect("Failed to bind server");
        let handle = server.spawn().expect("Failed to spawn server");
        Self { handle, root }
    }

    /// Address clients connect to.
    pub fn addr(&self) -> String {
        self.handle.local_addr().to_string()
    }

    /// Stop the listener.
    pub async fn stop(self) {
        self.handle.shutdown().await.expect("Failed to stop server");
    }
}
