//! Ferry wire protocol implementation.
//!
//! Ferry speaks two framings over TCP:
//!
//! - the **framed** form used by servers, clients and relays, where every
//!   chunk and control message is its own frame (this module)
//! - the **raw** form used by peer mode, a single length-prefixed blob per
//!   connection (see [`raw`])
//!
//! ## Frame Format
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      Ferry Frame                           │
//! ├────────────┬────────────┬────────────┬─────────────────────┤
//! │   Magic    │  Version   │    Type    │      Length         │
//! │  4 bytes   │  2 bytes   │   1 byte   │      4 bytes        │
//! ├────────────┴────────────┴────────────┴─────────────────────┤
//! │                        Payload                             │
//! │                    (variable length)                       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! - Magic: `0x46 0x52 0x52 0x59` ("FRRY")
//! - Version: `0x01 0x00` (1.0)
//! - Type: Message type byte
//! - Length: Payload length in bytes (big-endian)
//!
//! Control payloads are JSON. Chunk payloads are binary, see
//! [`encode_chunk`].
//!
//! ## Calls
//!
//! ```text
//! upload:   UploadOpen, Chunk*, UploadClose      -> UploadResult | Error
//! download: DownloadRequest -> DownloadOpen, Chunk*, DownloadEnd | Error
//! list:     ListRequest                          -> FileListing  | Error
//! delete:   DeleteRequest                        -> OperationResult | Error
//! ```

pub mod raw;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Protocol magic bytes: "FRRY"
pub const MAGIC: [u8; 4] = [0x46, 0x52, 0x52, 0x59];

/// Frame header size in bytes
pub const HEADER_SIZE: usize = 11;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Fixed part of a binary chunk payload: index, total, size, name length
pub const CHUNK_HEADER_SIZE: usize = 28;

/// Message types in the Ferry protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Start of an upload, carries the manifest
    UploadOpen = 0x01,
    /// One chunk of file content
    Chunk = 0x02,
    /// End of upload input
    UploadClose = 0x03,
    /// Upload completion acknowledgment
    UploadResult = 0x04,
    /// Request a file for download
    DownloadRequest = 0x10,
    /// Start of a download, carries the manifest
    DownloadOpen = 0x11,
    /// End of download stream
    DownloadEnd = 0x12,
    /// Request the storage root listing
    ListRequest = 0x20,
    /// Storage root listing
    FileListing = 0x21,
    /// Request deletion of a file
    DeleteRequest = 0x30,
    /// Generic success/failure acknowledgment
    OperationResult = 0x31,
    /// Error message
    Error = 0xFF,
}

impl MessageType {
    /// Parse a message type from a byte.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::UploadOpen),
            0x02 => Some(Self::Chunk),
            0x03 => Some(Self::UploadClose),
            0x04 => Some(Self::UploadResult),
            0x10 => Some(Self::DownloadRequest),
            0x11 => Some(Self::DownloadOpen),
            0x12 => Some(Self::DownloadEnd),
            0x20 => Some(Self::ListRequest),
            0x21 => Some(Self::FileListing),
            0x30 => Some(Self::DeleteRequest),
            0x31 => Some(Self::OperationResult),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }
}

/// A protocol frame header.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    /// Protocol version (major, minor)
    pub version: (u8, u8),
    /// Message type
    pub message_type: MessageType,
    /// Payload length
    pub payload_length: u32,
}

impl FrameHeader {
    /// Encode the header to bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4] = self.version.0;
        buf[5] = self.version.1;
        buf[6] = self.message_type as u8;
        buf[7..11].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode a header from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the magic, version, type or length is invalid.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if buf[0..4] != MAGIC {
            return Err(Error::ProtocolError("invalid magic bytes".to_string()));
        }

        let version = (buf[4], buf[5]);
        if version.0 != crate::PROTOCOL_VERSION.0 {
            return Err(Error::UnsupportedVersion {
                major: version.0,
                minor: version.1,
            });
        }

        let message_type = MessageType::from_byte(buf[6])
            .ok_or_else(|| Error::ProtocolError(format!("unknown message type: {:#x}", buf[6])))?;

        let payload_length = u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]);

        if payload_length as usize > MAX_PAYLOAD_SIZE {
            return Err(Error::ProtocolError(format!(
                "payload too large: {payload_length} bytes"
            )));
        }

        Ok(Self {
            version,
            message_type,
            payload_length,
        })
    }
}

/// Transfer manifest, announced before the first chunk of a transfer.
///
/// Lets the receiver validate every chunk and detect a stream that ends
/// early. An empty file has `total_chunks == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferManifest {
    /// File name (no path components)
    pub filename: String,
    /// Full file size in bytes
    pub file_size: u64,
    /// Number of chunks that will follow
    pub total_chunks: u64,
    /// Size of every chunk except possibly the last
    pub chunk_size: u32,
}

impl TransferManifest {
    /// Build a manifest for a file of `file_size` bytes.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(filename: impl Into<String>, file_size: u64, chunk_size: usize) -> Self {
        Self {
            filename: filename.into(),
            file_size,
            total_chunks: crate::chunk_count(file_size, chunk_size),
            chunk_size: chunk_size as u32,
        }
    }

    /// Check that the announced totals are self-consistent.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the chunk size is out of bounds or the
    /// chunk count does not match the file size.
    pub fn validate(&self) -> Result<()> {
        let chunk_size = self.chunk_size as usize;
        if chunk_size == 0 || chunk_size > crate::MAX_CHUNK_SIZE {
            return Err(Error::ProtocolError(format!(
                "chunk size {chunk_size} out of bounds (1..={})",
                crate::MAX_CHUNK_SIZE
            )));
        }

        let expected = crate::chunk_count(self.file_size, chunk_size);
        if self.total_chunks != expected {
            return Err(Error::ProtocolError(format!(
                "manifest for '{}' announces {} chunks, {} bytes needs {}",
                self.filename, self.total_chunks, self.file_size, expected
            )));
        }

        Ok(())
    }

    /// Expected payload length of chunk `index`.
    #[must_use]
    pub fn chunk_len(&self, index: u64) -> u64 {
        let offset = index * u64::from(self.chunk_size);
        self.file_size
            .saturating_sub(offset)
            .min(u64::from(self.chunk_size))
    }
}

/// One bounded-size fragment of a file, tagged with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// File name shared by every chunk of the transfer
    pub filename: String,
    /// Chunk content
    pub payload: Vec<u8>,
    /// Position in the sequence, starting at zero
    pub index: u64,
    /// Number of chunks in the transfer
    pub total_count: u64,
    /// Full file size in bytes
    pub file_size: u64,
}

/// File request payload (download and delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    /// Exact file name, no path components
    pub filename: String,
}

impl FileRequest {
    /// Create a request for `filename`.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }
}

/// Upload completion payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Whether the upload was stored
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
    /// Where the receiver stored the file
    pub stored_path: String,
    /// Payload bytes received
    pub bytes_received: u64,
}

/// Generic acknowledgment payload for non-streaming operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Whether the operation succeeded
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
}

/// Storage root listing payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    /// Non-directory entry names in directory-iteration order
    pub files: Vec<String>,
}

/// Error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable error code, see [`Error::code`]
    pub code: String,
    /// Error detail, without the variant's prefix
    pub message: String,
    /// Counts for a `truncated` error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<TransferCounts>,
}

/// Announced and received totals of a transfer that ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCounts {
    /// Chunks announced by the sender
    pub expected_chunks: u64,
    /// Chunks actually received
    pub received_chunks: u64,
    /// Bytes announced by the sender
    pub expected_bytes: u64,
    /// Bytes actually received
    pub received_bytes: u64,
}

impl From<&Error> for ErrorPayload {
    fn from(err: &Error) -> Self {
        let progress = match *err {
            Error::TruncatedTransfer {
                expected_chunks,
                received_chunks,
                expected_bytes,
                received_bytes,
                ..
            } => Some(TransferCounts {
                expected_chunks,
                received_chunks,
                expected_bytes,
                received_bytes,
            }),
            _ => None,
        };
        Self {
            code: err.code().to_string(),
            message: err.detail(),
            progress,
        }
    }
}

impl ErrorPayload {
    /// Turn the payload back into a local error.
    #[must_use]
    pub fn into_error(self) -> Error {
        match self.progress {
            Some(counts) if self.code == "truncated" => Error::TruncatedTransfer {
                file: self.message,
                expected_chunks: counts.expected_chunks,
                received_chunks: counts.received_chunks,
                expected_bytes: counts.expected_bytes,
                received_bytes: counts.received_bytes,
            },
            _ => Error::from_remote(&self.code, self.message),
        }
    }
}

/// Encode a message payload to JSON bytes.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a message payload from JSON bytes.
///
/// # Errors
///
/// Returns an error if deserialization fails.
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| Error::Serialization(e.to_string()))
}

/// Read a complete frame from a stream.
///
/// # Errors
///
/// Returns `Transport` if reading fails, or a protocol error if the frame
/// is invalid.
pub async fn read_frame<R>(reader: &mut R) -> Result<(FrameHeader, Vec<u8>)>
where
    R: AsyncReadExt + Unpin,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header_buf)
        .await
        .map_err(Error::transport)?;

    let header = FrameHeader::decode(&header_buf)?;

    let mut payload = vec![0u8; header.payload_length as usize];
    if header.payload_length > 0 {
        reader
            .read_exact(&mut payload)
            .await
            .map_err(Error::transport)?;
    }

    Ok((header, payload))
}

/// Write a complete frame to a stream.
///
/// # Errors
///
/// Returns `Transport` if writing fails.
pub async fn write_frame<W>(writer: &mut W, message_type: MessageType, payload: &[u8]) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::ProtocolError(format!(
            "payload too large: {} bytes",
            payload.len()
        )));
    }

    #[allow(clippy::cast_possible_truncation)]
    let header = FrameHeader {
        version: crate::PROTOCOL_VERSION,
        message_type,
        payload_length: payload.len() as u32,
    };

    writer
        .write_all(&header.encode())
        .await
        .map_err(Error::transport)?;
    if !payload.is_empty() {
        writer.write_all(payload).await.map_err(Error::transport)?;
    }
    writer.flush().await.map_err(Error::transport)?;

    Ok(())
}

/// Read a complete frame from a stream with a timeout.
///
/// # Errors
///
/// Returns `Error::Timeout` if the operation exceeds the specified duration.
/// Returns an error if reading fails or the frame is invalid.
pub async fn read_frame_with_timeout<R>(
    reader: &mut R,
    duration: Duration,
) -> Result<(FrameHeader, Vec<u8>)>
where
    R: AsyncReadExt + Unpin,
{
    timeout(duration, read_frame(reader))
        .await
        .map_err(|_| Error::Timeout(duration.as_secs()))?
}

/// Write a complete frame to a stream with a timeout.
///
/// # Errors
///
/// Returns `Error::Timeout` if the operation exceeds the specified duration.
/// Returns an error if writing fails.
pub async fn write_frame_with_timeout<W>(
    writer: &mut W,
    message_type: MessageType,
    payload: &[u8],
    duration: Duration,
) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    timeout(duration, write_frame(writer, message_type, payload))
        .await
        .map_err(|_| Error::Timeout(duration.as_secs()))?
}

/// Read a frame, applying `deadline` when one is set.
pub(crate) async fn read_frame_within<R>(
    reader: &mut R,
    deadline: Option<Duration>,
) -> Result<(FrameHeader, Vec<u8>)>
where
    R: AsyncReadExt + Unpin,
{
    match deadline {
        Some(duration) => read_frame_with_timeout(reader, duration).await,
        None => read_frame(reader).await,
    }
}

/// Write a frame, applying `deadline` when one is set.
pub(crate) async fn write_frame_within<W>(
    writer: &mut W,
    message_type: MessageType,
    payload: &[u8],
    deadline: Option<Duration>,
) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    match deadline {
        Some(duration) => write_frame_with_timeout(writer, message_type, payload, duration).await,
        None => write_frame(writer, message_type, payload).await,
    }
}

/// Write an `Error` frame describing `err`.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub async fn write_error<W>(writer: &mut W, err: &Error) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let payload = encode_payload(&ErrorPayload::from(err))?;
    write_frame(writer, MessageType::Error, &payload).await
}

/// Fail with the remote error if `header` is an `Error` frame, or with
/// `UnexpectedMessage` if it is not `expected`.
///
/// # Errors
///
/// Returns the decoded remote error or an `UnexpectedMessage` error.
pub fn expect_message(header: &FrameHeader, payload: &[u8], expected: MessageType) -> Result<()> {
    if header.message_type == expected {
        return Ok(());
    }

    if header.message_type == MessageType::Error {
        let remote: ErrorPayload = decode_payload(payload)?;
        return Err(remote.into_error());
    }

    Err(Error::UnexpectedMessage {
        expected: format!("{expected:?}"),
        actual: format!("{:?}", header.message_type),
    })
}

/// Encode a Chunk payload (binary format).
///
/// Format: index (8 bytes) | total_count (8 bytes) | file_size (8 bytes) |
/// name_len (4 bytes) | name | data
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_chunk(chunk: &Chunk) -> Vec<u8> {
    let name = chunk.filename.as_bytes();
    let mut buf = Vec::with_capacity(CHUNK_HEADER_SIZE + name.len() + chunk.payload.len());
    buf.extend_from_slice(&chunk.index.to_be_bytes());
    buf.extend_from_slice(&chunk.total_count.to_be_bytes());
    buf.extend_from_slice(&chunk.file_size.to_be_bytes());
    buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
    buf.extend_from_slice(name);
    buf.extend_from_slice(&chunk.payload);
    buf
}

/// Decode a Chunk payload (binary format).
///
/// # Errors
///
/// Returns an error if the payload is too short or the name is not UTF-8.
pub fn decode_chunk(data: &[u8]) -> Result<Chunk> {
    if data.len() < CHUNK_HEADER_SIZE {
        return Err(Error::ProtocolError("chunk payload too short".to_string()));
    }

    let index = read_u64(&data[0..8]);
    let total_count = read_u64(&data[8..16]);
    let file_size = read_u64(&data[16..24]);
    let name_len = u32::from_be_bytes([data[24], data[25], data[26], data[27]]) as usize;

    let name_end = CHUNK_HEADER_SIZE
        .checked_add(name_len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| Error::ProtocolError("chunk filename exceeds payload".to_string()))?;

    let filename = std::str::from_utf8(&data[CHUNK_HEADER_SIZE..name_end])
        .map_err(|_| Error::ProtocolError("chunk filename is not UTF-8".to_string()))?
        .to_string();

    Ok(Chunk {
        filename,
        payload: data[name_end..].to_vec(),
        index,
        total_count,
        file_size,
    })
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_header_encode_decode() {
        let header = FrameHeader {
            version: (1, 0),
            message_type: MessageType::UploadOpen,
            payload_length: 256,
        };

        let encoded = header.encode();
        let decoded = FrameHeader::decode(&encoded).expect("decode");

        assert_eq!(decoded.version, (1, 0));
        assert_eq!(decoded.message_type, MessageType::UploadOpen);
        assert_eq!(decoded.payload_length, 256);
    }

    #[test]
    fn test_frame_header_rejects_bad_magic() {
        let mut encoded = FrameHeader {
            version: (1, 0),
            message_type: MessageType::Chunk,
            payload_length: 0,
        }
        .encode();
        encoded[0..4].copy_from_slice(b"LDRP");

        assert!(matches!(
            FrameHeader::decode(&encoded),
            Err(Error::ProtocolError(_))
        ));
    }

    #[test]
    fn test_frame_header_rejects_major_version() {
        let encoded = FrameHeader {
            version: (9, 0),
            message_type: MessageType::Chunk,
            payload_length: 0,
        }
        .encode();

        assert!(matches!(
            FrameHeader::decode(&encoded),
            Err(Error::UnsupportedVersion { major: 9, minor: 0 })
        ));
    }

    #[test]
    fn test_frame_header_rejects_oversized_payload() {
        let mut encoded = FrameHeader {
            version: (1, 0),
            message_type: MessageType::Chunk,
            payload_length: 0,
        }
        .encode();
        #[allow(clippy::cast_possible_truncation)]
        encoded[7..11].copy_from_slice(&((MAX_PAYLOAD_SIZE + 1) as u32).to_be_bytes());

        assert!(FrameHeader::decode(&encoded).is_err());
    }

    #[test]
    fn test_unknown_message_type() {
        assert_eq!(MessageType::from_byte(0x42), None);
        assert_eq!(MessageType::from_byte(0x02), Some(MessageType::Chunk));
        assert_eq!(MessageType::from_byte(0xFF), Some(MessageType::Error));
    }

    #[test]
    fn test_chunk_encode_decode() {
        let chunk = Chunk {
            filename: "report.txt".to_string(),
            payload: b"EFGH".to_vec(),
            index: 1,
            total_count: 3,
            file_size: 9,
        };

        let encoded = encode_chunk(&chunk);
        assert_eq!(encoded.len(), CHUNK_HEADER_SIZE + 10 + 4);

        let decoded = decode_chunk(&encoded).expect("decode");
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn test_chunk_decode_too_short() {
        assert!(decode_chunk(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_chunk_decode_name_overflow() {
        let mut data = vec![0u8; CHUNK_HEADER_SIZE];
        data[24..28].copy_from_slice(&100u32.to_be_bytes());
        assert!(matches!(
            decode_chunk(&data),
            Err(Error::ProtocolError(_))
        ));
    }

    #[test]
    fn test_manifest_counts() {
        let manifest = TransferManifest::new("a.bin", 9, 4);
        assert_eq!(manifest.total_chunks, 3);
        assert_eq!(manifest.chunk_len(0), 4);
        assert_eq!(manifest.chunk_len(1), 4);
        assert_eq!(manifest.chunk_len(2), 1);
        manifest.validate().expect("valid");

        let exact = TransferManifest::new("b.bin", 8, 4);
        assert_eq!(exact.total_chunks, 2);
        assert_eq!(exact.chunk_len(1), 4);

        let empty = TransferManifest::new("c.bin", 0, 4);
        assert_eq!(empty.total_chunks, 0);
        empty.validate().expect("valid");
    }

    #[test]
    fn test_manifest_rejects_inconsistent_totals() {
        let mut manifest = TransferManifest::new("a.bin", 9, 4);
        manifest.total_chunks = 2;
        assert!(manifest.validate().is_err());

        let mut zero = TransferManifest::new("a.bin", 9, 4);
        zero.chunk_size = 0;
        assert!(zero.validate().is_err());
    }

    #[tokio::test]
    async fn test_read_write_frame() {
        let mut buffer = Vec::new();

        let request = FileRequest::new("notes.md");
        let payload = encode_payload(&request).expect("encode");
        write_frame(&mut buffer, MessageType::DownloadRequest, &payload)
            .await
            .expect("write frame");

        let mut cursor = std::io::Cursor::new(buffer);
        let (header, read_payload) = read_frame(&mut cursor).await.expect("read frame");

        assert_eq!(header.message_type, MessageType::DownloadRequest);
        let decoded: FileRequest = decode_payload(&read_payload).expect("decode");
        assert_eq!(decoded, request);
    }

    #[tokio::test]
    async fn test_read_frame_eof_is_transport_error() {
        let mut cursor = std::io::Cursor::new(vec![0x46, 0x52]);
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_read_frame_with_timeout_expires() {
        struct NeverReadyReader;

        impl tokio::io::AsyncRead for NeverReadyReader {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Pending
            }
        }

        let mut reader = NeverReadyReader;
        let result = read_frame_with_timeout(&mut reader, Duration::from_millis(50)).await;

        match result {
            Err(Error::Timeout(secs)) => assert_eq!(secs, 0),
            other => panic!("Expected Timeout error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_frame_round_trip() {
        let mut buffer = Vec::new();
        write_error(&mut buffer, &Error::NotFound("ghost.txt".to_string()))
            .await
            .expect("write error");

        let mut cursor = std::io::Cursor::new(buffer);
        let (header, payload) = read_frame(&mut cursor).await.expect("read frame");

        let err = expect_message(&header, &payload, MessageType::DownloadOpen)
            .expect_err("error frame");
        assert!(matches!(err, Error::NotFound(ref msg) if msg == "ghost.txt"));
        assert_eq!(err.to_string(), "file not found: ghost.txt");
    }

    #[test]
    fn test_error_payload_keeps_truncation_counts() {
        let original = Error::TruncatedTransfer {
            file: "report.txt".to_string(),
            expected_chunks: 3,
            received_chunks: 2,
            expected_bytes: 9,
            received_bytes: 8,
        };

        let body = encode_payload(&ErrorPayload::from(&original)).expect("encode");
        let payload: ErrorPayload = decode_payload(&body).expect("decode");
        let rebuilt = payload.into_error();

        assert!(matches!(
            rebuilt,
            Error::TruncatedTransfer {
                received_chunks: 2,
                received_bytes: 8,
                ..
            }
        ));
        assert_eq!(rebuilt.to_string(), original.to_string());
    }

    #[test]
    fn test_error_payload_without_counts() {
        let payload: ErrorPayload =
            serde_json::from_str(r#"{"code":"not_found","message":"a.txt"}"#).expect("decode");
        assert!(payload.progress.is_none());
        assert!(matches!(payload.into_error(), Error::NotFound(_)));
    }

    #[test]
    fn test_expect_message_unexpected() {
        let header = FrameHeader {
            version: (1, 0),
            message_type: MessageType::FileListing,
            payload_length: 0,
        };
        let err = expect_message(&header, &[], MessageType::OperationResult).expect_err("mismatch");
        assert!(matches!(err, Error::UnexpectedMessage { .. }));
    }
}
