//! Snapshot envelope around a pickled instance
//!
//! All integers are little-endian. Layout:
//!
//! ```text
//! header (36 bytes)
//!   magic        u64   "SERPENT\0"
//!   version      u32
//!   flags        u32   reserved, always 0
//!   timestamp    u64   unix epoch millis
//!   metadata_len u32
//!   payload_len  u64
//! metadata       JSON, metadata_len bytes
//! payload        pickle bytes, payload_len bytes
//! checksum       SHA-256 over metadata and payload (32 bytes)
//! ```

use serde::{Deserialize, Serialize};
use serpent_engine::BridgeError;
use serpent_sdk::Map;
use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};
use thiserror::Error;

/// Magic number for snapshots: "SERPENT\0" (little-endian)
pub const SNAPSHOT_MAGIC: u64 = u64::from_le_bytes(*b"SERPENT\0");

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Snapshot error types
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Invalid magic number in snapshot header
    #[error("Invalid snapshot magic number")]
    InvalidMagic,

    /// Incompatible snapshot version
    #[error("Incompatible snapshot version: expected {expected}, got {actual}")]
    IncompatibleVersion {
        /// Expected version
        expected: u32,
        /// Actual version found
        actual: u32,
    },

    /// Checksum verification failed
    #[error("Snapshot checksum mismatch")]
    ChecksumMismatch,

    /// Stream ended before the declared section length
    #[error("Truncated snapshot: {0}")]
    Truncated(&'static str),

    /// Metadata section is not valid JSON for [`SnapshotMetadata`]
    #[error("Corrupted snapshot metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    /// I/O error during snapshot read/write
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<SnapshotError> for BridgeError {
    fn from(err: SnapshotError) -> Self {
        BridgeError::Deserialization(err.to_string())
    }
}

/// Snapshot header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Magic number (must be SNAPSHOT_MAGIC)
    pub magic: u64,
    /// Snapshot format version
    pub version: u32,
    /// Flags
    pub flags: u32,
    /// Creation time (unix epoch millis)
    pub timestamp: u64,
    /// Length of the metadata section
    pub metadata_len: u32,
    /// Length of the payload section
    pub payload_len: u64,
}

impl SnapshotHeader {
    /// Header for sections of the given lengths, stamped with the current time
    pub fn new(metadata_len: u32, payload_len: u64) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        Self {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            flags: 0,
            timestamp,
            metadata_len,
            payload_len,
        }
    }

    /// Validate magic and version
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::IncompatibleVersion {
                expected: SNAPSHOT_VERSION,
                actual: self.version,
            });
        }
        Ok(())
    }

    /// Encode header to writer
    pub fn encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.magic.to_le_bytes())?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.timestamp.to_le_bytes())?;
        writer.write_all(&self.metadata_len.to_le_bytes())?;
        writer.write_all(&self.payload_len.to_le_bytes())?;
        Ok(())
    }

    /// Decode header from reader
    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        let magic = u64::from_le_bytes(buf);

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        let version = u32::from_le_bytes(buf);

        reader.read_exact(&mut buf)?;
        let flags = u32::from_le_bytes(buf);

        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        let timestamp = u64::from_le_bytes(buf);

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        let metadata_len = u32::from_le_bytes(buf);

        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        let payload_len = u64::from_le_bytes(buf);

        Ok(Self {
            magic,
            version,
            flags,
            timestamp,
            metadata_len,
            payload_len,
        })
    }
}

/// What a snapshot was taken of
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Module of the pickled instance
    pub module_name: String,
    /// Class of the pickled instance
    pub class_name: String,
    /// Write method configured when the snapshot was taken
    #[serde(default)]
    pub write_method: Option<String>,
    /// Constructor arguments the instance was created with
    #[serde(default)]
    pub args: Map,
}

/// A decoded snapshot
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Header as read or written
    pub header: SnapshotHeader,
    /// Identity and constructor arguments
    pub metadata: SnapshotMetadata,
    /// Pickle bytes
    pub payload: Vec<u8>,
}

impl Snapshot {
    /// Write a snapshot of `payload` described by `metadata`
    pub fn write<W: Write + ?Sized>(
        writer: &mut W,
        metadata: &SnapshotMetadata,
        payload: &[u8],
    ) -> Result<SnapshotHeader, SnapshotError> {
        let metadata_bytes = serde_json::to_vec(metadata)?;
        let metadata_len = u32::try_from(metadata_bytes.len()).map_err(|_| {
            SnapshotError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "snapshot metadata exceeds 4 GiB",
            ))
        })?;
        let header = SnapshotHeader::new(metadata_len, payload.len() as u64);

        header.encode(writer)?;
        writer.write_all(&metadata_bytes)?;
        writer.write_all(payload)?;
        writer.write_all(&checksum(&metadata_bytes, payload))?;
        writer.flush()?;
        Ok(header)
    }

    /// Read and verify a snapshot
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self, SnapshotError> {
        let header = SnapshotHeader::decode(reader)?;
        header.validate()?;

        let metadata_bytes = read_section(reader, header.metadata_len as u64, "metadata")?;
        let payload = read_section(reader, header.payload_len, "payload")?;

        let mut stored = [0u8; 32];
        reader
            .read_exact(&mut stored)
            .map_err(|_| SnapshotError::Truncated("checksum"))?;
        if stored != checksum(&metadata_bytes, &payload) {
            return Err(SnapshotError::ChecksumMismatch);
        }

        let metadata = serde_json::from_slice(&metadata_bytes)?;
        Ok(Self {
            header,
            metadata,
            payload,
        })
    }
}

// Reads through `take` so a corrupt length cannot force a huge allocation.
fn read_section<R: Read + ?Sized>(
    reader: &mut R,
    len: u64,
    section: &'static str,
) -> Result<Vec<u8>, SnapshotError> {
    let mut buf = Vec::new();
    reader.take(len).read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        return Err(SnapshotError::Truncated(section));
    }
    Ok(buf)
}

fn checksum(metadata: &[u8], payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(metadata);
    hasher.update(payload);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serpent_sdk::Value;

    fn metadata() -> SnapshotMetadata {
        let mut args = Map::new();
        args.insert("a".to_string(), Value::Int(55));
        SnapshotMetadata {
            module_name: "_test_creator_module".to_string(),
            class_name: "TestClass4".to_string(),
            write_method: Some("write".to_string()),
            args,
        }
    }

    fn encoded(payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        Snapshot::write(&mut buf, &metadata(), payload).unwrap();
        buf
    }

    #[test]
    fn test_write_then_read() {
        let buf = encoded(b"\x80\x04payload");
        let snapshot = Snapshot::read(&mut buf.as_slice()).unwrap();

        assert_eq!(snapshot.header.magic, SNAPSHOT_MAGIC);
        assert_eq!(snapshot.header.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.header.payload_len, 10);
        assert_eq!(snapshot.metadata, metadata());
        assert_eq!(snapshot.payload, b"\x80\x04payload");
    }

    #[test]
    fn test_header_size() {
        let mut buf = Vec::new();
        SnapshotHeader::new(0, 0).encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 36);
    }

    #[test]
    fn test_invalid_magic() {
        let mut buf = encoded(b"x");
        buf[0] ^= 0xff;
        let err = Snapshot::read(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidMagic));
    }

    #[test]
    fn test_incompatible_version() {
        let mut buf = encoded(b"x");
        buf[8..12].copy_from_slice(&99u32.to_le_bytes());
        let err = Snapshot::read(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::IncompatibleVersion { expected: 1, actual: 99 }
        ));
    }

    #[test]
    fn test_flipped_payload_byte() {
        let mut buf = encoded(b"payload");
        let last_payload_byte = buf.len() - 33;
        buf[last_payload_byte] ^= 0x01;
        let err = Snapshot::read(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, SnapshotError::ChecksumMismatch));
    }

    #[test]
    fn test_truncated_stream() {
        let buf = encoded(b"payload");
        let err = Snapshot::read(&mut &buf[..buf.len() - 40]).unwrap_err();
        assert!(matches!(err, SnapshotError::Truncated(_)));

        let err = Snapshot::read(&mut &buf[..10]).unwrap_err();
        assert!(matches!(err, SnapshotError::Io(_)));
    }

    #[test]
    fn test_oversized_length_is_truncated_not_allocated() {
        let mut buf = encoded(b"payload");
        buf[28..36].copy_from_slice(&u64::MAX.to_le_bytes());
        let err = Snapshot::read(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, SnapshotError::Truncated("payload")));
    }

    #[test]
    fn test_errors_map_to_deserialization() {
        let err: BridgeError = SnapshotError::ChecksumMismatch.into();
        assert!(matches!(err, BridgeError::Deserialization(ref msg) if msg.contains("checksum")));
    }
}
