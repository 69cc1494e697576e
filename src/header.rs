//! Fixed-size container header
//!
//! All integers are little-endian. The layout is:
//! - signature: 4 bytes (`FENC`)
//! - version: 2 bytes
//! - hash algorithm id: 2 bytes
//! - digest slot: 64 bytes (digest left-aligned, remainder random)
//! - IV: 16 bytes
//! - reserved: 40 bytes (random)

use std::io::{self, Read, Seek, SeekFrom, Write};

use rand::RngCore;
use rand::rngs::OsRng;

use crate::cipher::BLOCK_SIZE;
use crate::error::{ErrorCategory, ErrorKind, FencError, Result};
use crate::hashes::{self, HashDescriptor};

/// Total size of a serialized header in bytes
pub const HEADER_SIZE: usize = 128;

/// Magic bytes at the start of every container
pub const SIGNATURE: [u8; 4] = *b"FENC";

/// Newest format version this build writes and reads
pub const VERSION: u16 = 1;

/// Room reserved for a digest; large enough for SHA-512
pub const DIGEST_SLOT_SIZE: usize = 64;

/// IV length, one AES block
pub const IV_SIZE: usize = BLOCK_SIZE;

const SIGNATURE_OFFSET: usize = 0;
const VERSION_OFFSET: usize = SIGNATURE_OFFSET + SIGNATURE.len();
const HASH_ID_OFFSET: usize = VERSION_OFFSET + 2;
const DIGEST_OFFSET: usize = HASH_ID_OFFSET + 2;
const IV_OFFSET: usize = DIGEST_OFFSET + DIGEST_SLOT_SIZE;
const RESERVED_OFFSET: usize = IV_OFFSET + IV_SIZE;
const RESERVED_SIZE: usize = HEADER_SIZE - RESERVED_OFFSET;

#[derive(Debug, Clone)]
pub struct ContainerHeader {
    version: u16,
    hash: &'static HashDescriptor,
    digest: Option<Vec<u8>>,
    iv: [u8; IV_SIZE],
    digest_slot: [u8; DIGEST_SLOT_SIZE],
    reserved: [u8; RESERVED_SIZE],
}

impl ContainerHeader {
    /// A fresh header for a new container.
    ///
    /// Draws a random IV when `iv` is `None`. The digest slot and reserved
    /// region are filled with random bytes so that the placeholder written
    /// before the digest is known carries no structural zeros.
    pub fn new(algorithm_id: u16, iv: Option<[u8; IV_SIZE]>) -> Result<Self> {
        let hash = hashes::by_id(algorithm_id)?;

        let iv = iv.unwrap_or_else(|| {
            let mut iv = [0u8; IV_SIZE];
            OsRng.fill_bytes(&mut iv);
            iv
        });

        let mut digest_slot = [0u8; DIGEST_SLOT_SIZE];
        OsRng.fill_bytes(&mut digest_slot);
        let mut reserved = [0u8; RESERVED_SIZE];
        OsRng.fill_bytes(&mut reserved);

        Ok(Self {
            version: VERSION,
            hash,
            digest: None,
            iv,
            digest_slot,
            reserved,
        })
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn hash(&self) -> &'static HashDescriptor {
        self.hash
    }

    /// The plaintext digest, sized exactly to the hash algorithm's output.
    /// `None` on a header that has not been finalized yet.
    pub fn digest(&self) -> Option<&[u8]> {
        self.digest.as_deref()
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    /// Record the finalized plaintext digest. May only be called once.
    pub fn set_digest(&mut self, digest: &[u8]) -> Result<()> {
        if self.digest.is_some() {
            return Err(FencError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "header digest already set",
            ));
        }
        if digest.len() != self.hash.output_size {
            return Err(FencError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                format!(
                    "digest is {} bytes, {} produces {}",
                    digest.len(),
                    self.hash.name,
                    self.hash.output_size
                ),
            ));
        }
        self.digest = Some(digest.to_vec());
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut raw = [0u8; HEADER_SIZE];
        raw[SIGNATURE_OFFSET..VERSION_OFFSET].copy_from_slice(&SIGNATURE);
        raw[VERSION_OFFSET..HASH_ID_OFFSET].copy_from_slice(&self.version.to_le_bytes());
        raw[HASH_ID_OFFSET..DIGEST_OFFSET].copy_from_slice(&self.hash.id.to_le_bytes());

        let mut slot = self.digest_slot;
        if let Some(digest) = &self.digest {
            slot[..digest.len()].copy_from_slice(digest);
        }
        raw[DIGEST_OFFSET..IV_OFFSET].copy_from_slice(&slot);

        raw[IV_OFFSET..RESERVED_OFFSET].copy_from_slice(&self.iv);
        raw[RESERVED_OFFSET..].copy_from_slice(&self.reserved);
        raw
    }

    /// Parse a serialized header. Checks run in layout order, so nothing
    /// after a bad signature or a future version is looked at.
    pub fn from_bytes(raw: &[u8; HEADER_SIZE]) -> Result<Self> {
        check_signature(&raw[SIGNATURE_OFFSET..VERSION_OFFSET])?;

        let version = u16::from_le_bytes([raw[VERSION_OFFSET], raw[VERSION_OFFSET + 1]]);
        if version > VERSION {
            return Err(FencError::with_kind(
                ErrorCategory::User,
                ErrorKind::UnsupportedVersion,
                format!(
                    "unsupported container version {} (newest supported is {})",
                    version, VERSION
                ),
            ));
        }

        let hash_id = u16::from_le_bytes([raw[HASH_ID_OFFSET], raw[HASH_ID_OFFSET + 1]]);
        let hash = hashes::by_id(hash_id)
            .map_err(|e| e.with_context("container header names an unknown hash algorithm"))?;

        let mut digest_slot = [0u8; DIGEST_SLOT_SIZE];
        digest_slot.copy_from_slice(&raw[DIGEST_OFFSET..IV_OFFSET]);
        let digest = digest_slot[..hash.output_size].to_vec();

        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&raw[IV_OFFSET..RESERVED_OFFSET]);

        let mut reserved = [0u8; RESERVED_SIZE];
        reserved.copy_from_slice(&raw[RESERVED_OFFSET..]);

        Ok(Self {
            version,
            hash,
            digest: Some(digest),
            iv,
            digest_slot,
            reserved,
        })
    }

    /// Serialize exactly [`HEADER_SIZE`] bytes at the sink's current position.
    pub fn write_to<W: Write + ?Sized>(&self, sink: &mut W) -> Result<()> {
        sink.write_all(&self.to_bytes()).map_err(|e| {
            FencError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to write container header",
                e,
            )
        })
    }

    /// Rewrite the whole header at offset 0, typically once the digest is set.
    pub fn update_digest<W: Write + Seek + ?Sized>(&self, sink: &mut W) -> Result<()> {
        sink.seek(SeekFrom::Start(0)).map_err(|e| {
            FencError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Seek,
                "failed to seek to start of output",
                e,
            )
        })?;
        self.write_to(sink)
    }

    /// Read and parse a header. A bad signature is reported after reading
    /// only the first four bytes.
    pub fn read_from<R: Read + ?Sized>(source: &mut R) -> Result<Self> {
        let mut raw = [0u8; HEADER_SIZE];

        read_header_bytes(source, &mut raw[..VERSION_OFFSET])?;
        check_signature(&raw[..VERSION_OFFSET])?;
        read_header_bytes(source, &mut raw[VERSION_OFFSET..])?;

        Self::from_bytes(&raw)
    }
}

fn check_signature(signature: &[u8]) -> Result<()> {
    if signature != SIGNATURE {
        return Err(FencError::with_kind(
            ErrorCategory::User,
            ErrorKind::HeaderFormat,
            "signature mismatch; input is not a fenc container",
        ));
    }
    Ok(())
}

fn read_header_bytes<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> Result<()> {
    source.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FencError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::HeaderFormat,
                "input likely truncated while reading container header",
                e,
            )
        } else {
            FencError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to read container header",
                e,
            )
        }
    })
}
