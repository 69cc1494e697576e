//! Plaintext to container
//!
//! The header goes out first as a placeholder, the body is streamed through
//! digest, gzip and AES-CBC, and the header is then rewritten in place with
//! the digest of the plaintext.

use std::io::{self, Read, Seek, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::debug;

use crate::cipher::{BlockCipher, CbcWriter};
use crate::error::{ErrorCategory, ErrorKind, FencError, Result};
use crate::hashes::DigestWriter;
use crate::header::{ContainerHeader, IV_SIZE};

/// Encrypt `source` into `sink` with a random IV.
///
/// `sink` must be positioned at offset 0 and be able to seek back there.
/// On error, whatever was already written to `sink` is garbage and is left
/// for the caller to discard.
pub fn encode<R, W>(
    algorithm_id: u16,
    cipher: &BlockCipher,
    source: &mut R,
    sink: &mut W,
) -> Result<ContainerHeader>
where
    R: Read + ?Sized,
    W: Write + Seek + ?Sized,
{
    encode_inner(algorithm_id, cipher, None, source, sink)
}

/// Encrypt with a caller-chosen IV.
///
/// Reusing an IV with the same key leaks whether two plaintexts share a
/// prefix. Meant for reproducible output in tests; use [`encode`] otherwise.
pub fn encode_with_iv<R, W>(
    algorithm_id: u16,
    cipher: &BlockCipher,
    iv: [u8; IV_SIZE],
    source: &mut R,
    sink: &mut W,
) -> Result<ContainerHeader>
where
    R: Read + ?Sized,
    W: Write + Seek + ?Sized,
{
    encode_inner(algorithm_id, cipher, Some(iv), source, sink)
}

fn encode_inner<R, W>(
    algorithm_id: u16,
    cipher: &BlockCipher,
    iv: Option<[u8; IV_SIZE]>,
    source: &mut R,
    sink: &mut W,
) -> Result<ContainerHeader>
where
    R: Read + ?Sized,
    W: Write + Seek + ?Sized,
{
    let position = sink.stream_position().map_err(|e| {
        FencError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Seek,
            "failed to query output position",
            e,
        )
    })?;
    if position != 0 {
        return Err(FencError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::Seek,
            format!("output must start at offset 0, found {}", position),
        ));
    }

    let mut header = ContainerHeader::new(algorithm_id, iv)?;
    header.write_to(sink)?;

    let mut hasher = header.hash().hasher();
    let encryptor = CbcWriter::new(cipher, header.iv(), &mut *sink)?;
    let mut compressor = GzEncoder::new(encryptor, Compression::default());

    let plaintext_len = io::copy(
        source,
        &mut DigestWriter::new(&mut compressor, hasher.as_mut()),
    )
    .map_err(|e| io_error("failed to encrypt input", e))?;

    let encryptor = compressor
        .finish()
        .map_err(|e| io_error("failed to finish compression", e))?;
    encryptor
        .finish()
        .map_err(|e| io_error("failed to write final cipher block", e))?;

    header.set_digest(&hasher.finalize())?;
    header.update_digest(sink)?;
    sink.flush()
        .map_err(|e| io_error("failed to flush output", e))?;

    debug!(
        hash = header.hash().name,
        key_bits = cipher.key_len() * 8,
        plaintext_len,
        "container encoded"
    );

    Ok(header)
}

fn io_error(msg: &'static str, err: io::Error) -> FencError {
    FencError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::Io, msg, err)
}
