//! Raw length-prefixed form used by peer mode.
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬───────────────────┐
//! │  name_len    │     name     │  file_size   │      content      │
//! │ u32 BE       │ name_len B   │ u64 BE       │  file_size bytes  │
//! └──────────────┴──────────────┴──────────────┴───────────────────┘
//! ```
//!
//! One file per connection. There is no per-chunk framing: the receiver
//! reads exactly `file_size` bytes after the header.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};

/// Raw transfer header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    /// File name as sent by the peer
    pub filename: String,
    /// Number of content bytes that follow
    pub file_size: u64,
}

/// Write a raw header.
///
/// # Errors
///
/// Returns `InvalidFilename` if the name is longer than
/// [`crate::MAX_FILENAME_LEN`], or `Transport` if writing fails.
pub async fn write_raw_header<W>(writer: &mut W, header: &RawHeader) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let name = header.filename.as_bytes();
    if name.len() > crate::MAX_FILENAME_LEN {
        return Err(Error::InvalidFilename(format!(
            "name is {} bytes, limit is {}",
            name.len(),
            crate::MAX_FILENAME_LEN
        )));
    }

    #[allow(clippy::cast_possible_truncation)]
    let name_len = name.len() as u32;

    let mut buf = Vec::with_capacity(4 + name.len() + 8);
    buf.extend_from_slice(&name_len.to_be_bytes());
    buf.extend_from_slice(name);
    buf.extend_from_slice(&header.file_size.to_be_bytes());

    writer.write_all(&buf).await.map_err(Error::transport)
}

/// Read a raw header.
///
/// The name length is bounded by [`crate::MAX_FILENAME_LEN`] before any
/// allocation.
///
/// # Errors
///
/// Returns `Transport` if reading fails, or `ProtocolError` if the name
/// length is out of bounds or the name is not UTF-8.
pub async fn read_raw_header<R>(reader: &mut R) -> Result<RawHeader>
where
    R: AsyncReadExt + Unpin,
{
    let name_len = reader.read_u32().await.map_err(Error::transport)? as usize;
    if name_len > crate::MAX_FILENAME_LEN {
        return Err(Error::ProtocolError(format!(
            "raw filename length {name_len} exceeds {}",
            crate::MAX_FILENAME_LEN
        )));
    }

    let mut name = vec![0u8; name_len];
    reader
        .read_exact(&mut name)
        .await
        .map_err(Error::transport)?;
    let filename = String::from_utf8(name)
        .map_err(|_| Error::ProtocolError("raw filename is not UTF-8".to_string()))?;

    let file_size = reader.read_u64().await.map_err(Error::transport)?;

    Ok(RawHeader {
        filename,
        file_size,
    })
}
