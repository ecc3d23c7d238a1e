//! # Ferry Core Library
//!
//! `ferry-core` moves whole files between nodes over a persistent connection,
//! splitting each file into fixed-size chunks for streaming upload and
//! download.
//!
//! ## Topologies
//!
//! - **Client → server**: a [`service::RemoteService`] talks to a
//!   [`server::Server`] that hosts a [`service::LocalService`]
//! - **Peer → peer**: a [`peer::PeerNode`] listens for raw pushes while
//!   sending its own files to the configured peer
//! - **Server → server**: a [`relay::Relay`] chains a download from one
//!   endpoint into an upload to another
//!
//! All three reuse the same [`transfer`] machinery, so chunk framing,
//! ordering checks and completion detection are implemented once.
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`mod@file`] - Chunk reader and atomic file writer
//! - [`peer`] - Raw-socket peer mode
//! - [`protocol`] - Wire protocol (framed and raw forms)
//! - [`relay`] - Relay/sync orchestration between two endpoints
//! - [`report`] - Progress and message sinks
//! - [`server`] - Framed protocol listener
//! - [`service`] - The `FileService` capability set and its implementations
//! - [`storage`] - Storage root, filename safety, listing and deletion
//! - [`transfer`] - Chunk sources, sinks and the transfer pump
//!
//! ## Example
//!
//! ```rust,ignore
//! use ferry_core::service::{FileService, RemoteService, ConnectOptions};
//! use ferry_core::file::FileSource;
//!
//! let remote = RemoteService::connect("10.0.0.2:8000", ConnectOptions::default()).await?;
//! let mut source = FileSource::open("report.txt").await?;
//! let result = remote.upload(&mut source).await?;
//! println!("stored at {}", result.stored_path);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod error;
pub mod file;
pub mod peer;
pub mod protocol;
pub mod relay;
pub mod report;
pub mod server;
pub mod service;
pub mod storage;
pub mod transfer;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version for the framed transport
pub const PROTOCOL_VERSION: (u8, u8) = (1, 0);

/// Default listening port
pub const DEFAULT_PORT: u16 = 8000;

/// Default chunk size for file transfers (64 KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Largest chunk size a receiver will accept in a manifest (4 MB)
pub const MAX_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Longest filename accepted by the storage layer, in bytes
pub const MAX_FILENAME_LEN: usize = 255;

/// Calculate how many chunks a file of `file_size` bytes splits into.
///
/// An empty file has zero chunks.
#[must_use]
pub const fn chunk_count(file_size: u64, chunk_size: usize) -> u64 {
    let chunk_size = chunk_size as u64;
    file_size.div_ceil(chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0, 4), 0);
        assert_eq!(chunk_count(1, 4), 1);
        assert_eq!(chunk_count(8, 4), 2);
        assert_eq!(chunk_count(9, 4), 3);
        assert_eq!(chunk_count(65_536, DEFAULT_CHUNK_SIZE), 1);
        assert_eq!(chunk_count(65_537, DEFAULT_CHUNK_SIZE), 2);
    }
}
