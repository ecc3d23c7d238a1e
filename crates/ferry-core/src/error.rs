//! Error types for Ferry.
//!
//! This module provides a unified error type for all Ferry operations,
//! with specific error variants for different failure modes.
//!
//! Every variant carries a stable wire code (see [`Error::code`]) so that a
//! failure raised on a server arrives at the client as the same variant.

use std::io;
use std::path::Path;

use thiserror::Error;

/// A specialized `Result` type for Ferry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Ferry.
#[derive(Error, Debug)]
pub enum Error {
    /// Filename is empty, contains a traversal sequence or a path separator
    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    /// Requested file does not exist
    #[error("file not found: {0}")]
    NotFound(String),

    /// Local filesystem read, write or create failure
    #[error("storage error on '{path}': {source}")]
    Storage {
        /// Path being accessed
        path: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Connection-level read or write failure
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    /// Stream ended before every announced chunk arrived
    #[error(
        "truncated transfer of '{file}': received {received_chunks}/{expected_chunks} chunks, \
         {received_bytes}/{expected_bytes} bytes"
    )]
    TruncatedTransfer {
        /// File being transferred
        file: String,
        /// Chunks announced by the sender
        expected_chunks: u64,
        /// Chunks actually received
        received_chunks: u64,
        /// Bytes announced by the sender
        expected_bytes: u64,
        /// Bytes actually received
        received_bytes: u64,
    },

    /// Invalid protocol message
    #[error("invalid protocol message: {0}")]
    ProtocolError(String),

    /// Unsupported protocol version
    #[error("unsupported protocol version: {major}.{minor}")]
    UnsupportedVersion {
        /// Major version
        major: u8,
        /// Minor version
        minor: u8,
    },

    /// Unexpected message type
    #[error("unexpected message type: expected {expected}, got {actual}")]
    UnexpectedMessage {
        /// Expected message type
        expected: String,
        /// Actual message type received
        actual: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation timeout
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Operation not available on this endpoint
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Failure reported by a remote endpoint with an unrecognised code
    #[error("remote error [{code}]: {message}")]
    Remote {
        /// Wire code sent by the remote
        code: String,
        /// Remote message
        message: String,
    },

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a filesystem error with the path it concerns.
    pub fn storage(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Storage {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Wrap a connection-level I/O error.
    pub fn transport(source: io::Error) -> Self {
        Self::Transport(source)
    }

    /// Returns the stable wire code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidFilename(_) => "invalid_filename",
            Self::NotFound(_) => "not_found",
            Self::Storage { .. } => "storage",
            Self::Transport(_) => "transport",
            Self::TruncatedTransfer { .. } => "truncated",
            Self::ProtocolError(_)
            | Self::UnsupportedVersion { .. }
            | Self::UnexpectedMessage { .. } => "protocol",
            Self::Serialization(_) => "serialization",
            Self::Timeout(_) => "timeout",
            Self::ConfigError(_) | Self::InvalidConfig { .. } => "config",
            Self::Unsupported(_) => "unsupported",
            Self::Remote { .. } => "remote",
            Self::Internal(_) => "internal",
        }
    }

    /// The message without the variant's prefix.
    ///
    /// This is what an `Error` frame carries, so that [`Error::from_remote`]
    /// can rebuild the variant without repeating its prefix.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::InvalidFilename(message)
            | Self::NotFound(message)
            | Self::ProtocolError(message)
            | Self::Serialization(message)
            | Self::ConfigError(message)
            | Self::Unsupported(message)
            | Self::Internal(message)
            | Self::Remote { message, .. } => message.clone(),
            Self::Storage { path, source } => format!("{path}: {source}"),
            Self::Transport(source) => source.to_string(),
            Self::TruncatedTransfer { file, .. } => file.clone(),
            Self::Timeout(secs) => secs.to_string(),
            Self::UnsupportedVersion { .. }
            | Self::UnexpectedMessage { .. }
            | Self::InvalidConfig { .. } => self.to_string(),
        }
    }

    /// Rebuild an error from a code and detail received in an `Error` frame.
    ///
    /// Storage failures happened on the remote side, so their I/O detail
    /// only survives as text. Truncation counts travel separately, see
    /// [`ErrorPayload`](crate::protocol::ErrorPayload).
    #[must_use]
    pub fn from_remote(code: &str, message: String) -> Self {
        match code {
            "invalid_filename" => Self::InvalidFilename(message),
            "not_found" => Self::NotFound(message),
            "storage" => Self::Storage {
                path: "<remote>".to_string(),
                source: io::Error::other(message),
            },
            "protocol" => Self::ProtocolError(message),
            "unsupported" => Self::Unsupported(message),
            "timeout" => match message.parse() {
                Ok(secs) => Self::Timeout(secs),
                Err(_) => Self::Remote {
                    code: code.to_string(),
                    message,
                },
            },
            _ => Self::Remote {
                code: code.to_string(),
                message,
            },
        }
    }

    /// Returns whether the connection must be dropped after this error.
    ///
    /// Validation failures leave the stream in a known state; transport and
    /// framing failures do not.
    #[must_use]
    pub const fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::ProtocolError(_)
                | Self::UnsupportedVersion { .. }
                | Self::UnexpectedMessage { .. }
                | Self::Serialization(_)
                | Self::Timeout(_)
                | Self::TruncatedTransfer { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_round_trip_codes() {
        let cases = [
            Error::InvalidFilename("../x".to_string()),
            Error::NotFound("a.txt".to_string()),
            Error::ProtocolError("bad".to_string()),
            Error::Unsupported("list".to_string()),
        ];

        for original in cases {
            let rebuilt = Error::from_remote(original.code(), original.detail());
            assert_eq!(rebuilt.code(), original.code());
            assert_eq!(rebuilt.to_string(), original.to_string());
        }
    }

    #[test]
    fn test_remote_storage_states_prefix_once() {
        let original = Error::storage("/disk/f", io::Error::other("disk gone"));
        let rebuilt = Error::from_remote(original.code(), original.detail());

        assert_eq!(
            rebuilt.to_string(),
            "storage error on '<remote>': /disk/f: disk gone"
        );
        assert_eq!(rebuilt.to_string().matches("storage error").count(), 1);
    }

    #[test]
    fn test_remote_timeout_keeps_kind() {
        let rebuilt = Error::from_remote("timeout", Error::Timeout(30).detail());
        assert!(matches!(rebuilt, Error::Timeout(30)));

        let garbled = Error::from_remote("timeout", "soon".to_string());
        assert!(matches!(garbled, Error::Remote { .. }));
    }

    #[test]
    fn test_remote_storage_keeps_kind() {
        let err = Error::from_remote("storage", "disk full".to_string());
        assert!(matches!(err, Error::Storage { .. }));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_unknown_remote_code() {
        let err = Error::from_remote("weird", "huh".to_string());
        match err {
            Error::Remote { code, message } => {
                assert_eq!(code, "weird");
                assert_eq!(message, "huh");
            }
            e => panic!("Expected Remote error, got: {e:?}"),
        }
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!Error::InvalidFilename("a/b".to_string()).is_fatal_to_connection());
        assert!(!Error::NotFound("x".to_string()).is_fatal_to_connection());
        assert!(Error::transport(io::Error::other("reset")).is_fatal_to_connection());
        assert!(Error::TruncatedTransfer {
            file: "f".to_string(),
            expected_chunks: 2,
            received_chunks: 1,
            expected_bytes: 8,
            received_bytes: 4,
        }
        .is_fatal_to_connection());
    }

    #[test]
    fn test_truncated_message() {
        let err = Error::TruncatedTransfer {
            file: "report.txt".to_string(),
            expected_chunks: 3,
            received_chunks: 2,
            expected_bytes: 9,
            received_bytes: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("report.txt"));
        assert!(msg.contains("2/3 chunks"));
        assert!(msg.contains("8/9 bytes"));
    }
}
