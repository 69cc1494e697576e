//! Container to plaintext
//!
//! There is no authentication tag in the format. A wrong key is detected
//! because the decrypted body almost never parses as a gzip stream, and
//! when it does, the plaintext digest stored in the header will not match.
//! That digest is an integrity check only: anyone can recompute it for
//! content of their choosing.

use std::io::{self, BufReader, Read, Write};

use flate2::bufread::GzDecoder;
use tracing::debug;

use crate::cipher::{BlockCipher, CbcReader, take_source_error};
use crate::error::{ErrorCategory, ErrorKind, FencError, Result};
use crate::header::ContainerHeader;

const CHUNK_SIZE: usize = 32 * 1024;

/// Decrypt a container from `source` into `sink`.
///
/// Plaintext is streamed into `sink` before the digest can be checked, so
/// on error the caller must discard anything already written.
pub fn decode<R, W>(cipher: &BlockCipher, source: &mut R, sink: &mut W) -> Result<()>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let header = ContainerHeader::read_from(source)?;
    let expected = header.digest().ok_or_else(|| {
        FencError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "parsed header carries no digest",
        )
    })?;

    let mut hasher = header.hash().hasher();
    let decryptor = CbcReader::new(cipher, header.iv(), &mut *source)?;
    let mut decompressor = GzDecoder::new(BufReader::new(decryptor));

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut plaintext_len: u64 = 0;
    loop {
        let n = match decompressor.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(stream_error(e)),
        };
        hasher.update(&buf[..n]);
        sink.write_all(&buf[..n]).map_err(|e| {
            FencError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to write plaintext",
                e,
            )
        })?;
        plaintext_len += n as u64;
    }

    // Draining the rest also makes the cipher stream check its padding.
    let mut rest = decompressor.into_inner();
    let trailing = io::copy(&mut rest, &mut io::sink()).map_err(stream_error)?;
    if trailing > 0 {
        return Err(FencError::wrong_key_or_corrupt(
            "decrypt failed (wrong passphrase?): unexpected data after compressed stream",
        ));
    }

    sink.flush().map_err(|e| {
        FencError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to flush plaintext",
            e,
        )
    })?;

    let digest = hasher.finalize();
    if *digest != *expected {
        return Err(FencError::wrong_key_or_corrupt(
            "decrypt failed (wrong passphrase?): digest mismatch",
        ));
    }

    debug!(
        hash = header.hash().name,
        version = header.version(),
        plaintext_len,
        "container decoded"
    );

    Ok(())
}

/// Errors coming out of the decrypt/decompress chain. Failures of the
/// source reader are I/O errors whatever their kind; framing failures mean
/// the key was wrong or the data was damaged.
fn stream_error(err: io::Error) -> FencError {
    let err = match take_source_error(err) {
        Ok(source) => {
            return FencError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to read container body",
                source,
            );
        }
        Err(err) => err,
    };
    match err.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            FencError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::WrongKeyOrCorruptData,
                "decrypt failed (wrong passphrase?)",
                err,
            )
        }
        _ => FencError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to read container body",
            err,
        ),
    }
}
