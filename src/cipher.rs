//! AES in CBC mode as streaming `Read`/`Write` adapters
//!
//! [`CbcWriter`] encrypts everything written to it and applies PKCS#7
//! padding when finished. [`CbcReader`] decrypts a ciphertext stream and
//! strips the padding once the underlying reader is exhausted. Framing
//! problems (a body that is not a whole number of blocks, or bad padding)
//! surface as `io::ErrorKind::InvalidData`. Errors from the reader under a
//! [`CbcReader`] keep their kind but are tagged, see [`take_source_error`].

use std::error::Error as StdError;
use std::fmt;
use std::io::{self, Read, Write};

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::block_padding::{Padding, Pkcs7};
use cbc::cipher::consts::U16;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, FencError, Result};
use crate::keyderive::{self, AES128_KEY_LEN, AES192_KEY_LEN, AES256_KEY_LEN};

/// AES block size, and therefore the IV size.
pub const BLOCK_SIZE: usize = 16;

const READ_CHUNK: usize = 32 * 1024;

/// A validated AES key. Picks AES-128, -192 or -256 from the key length.
#[derive(Clone)]
pub struct BlockCipher {
    key: Zeroizing<Vec<u8>>,
}

impl BlockCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        match key.len() {
            AES128_KEY_LEN | AES192_KEY_LEN | AES256_KEY_LEN => Ok(Self {
                key: Zeroizing::new(key.to_vec()),
            }),
            n => Err(FencError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidKeyLength,
                format!("invalid AES key length {} (must be 16, 24 or 32)", n),
            )),
        }
    }

    /// Derive the key from a passphrase and build the cipher from it.
    pub fn from_passphrase(passphrase: &[u8]) -> Result<Self> {
        Self::new(&keyderive::derive_key(passphrase))
    }

    /// Key size in bytes.
    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    pub(crate) fn encryptor(&self, iv: &[u8; BLOCK_SIZE]) -> Result<CbcEncryptor> {
        let key = &self.key[..];
        let mode = match key.len() {
            AES128_KEY_LEN => {
                cbc::Encryptor::<Aes128>::new_from_slices(key, iv).map(CbcEncryptor::Aes128)
            }
            AES192_KEY_LEN => {
                cbc::Encryptor::<Aes192>::new_from_slices(key, iv).map(CbcEncryptor::Aes192)
            }
            _ => cbc::Encryptor::<Aes256>::new_from_slices(key, iv).map(CbcEncryptor::Aes256),
        };
        mode.map_err(|e| invalid_key(key.len(), e))
    }

    pub(crate) fn decryptor(&self, iv: &[u8; BLOCK_SIZE]) -> Result<CbcDecryptor> {
        let key = &self.key[..];
        let mode = match key.len() {
            AES128_KEY_LEN => {
                cbc::Decryptor::<Aes128>::new_from_slices(key, iv).map(CbcDecryptor::Aes128)
            }
            AES192_KEY_LEN => {
                cbc::Decryptor::<Aes192>::new_from_slices(key, iv).map(CbcDecryptor::Aes192)
            }
            _ => cbc::Decryptor::<Aes256>::new_from_slices(key, iv).map(CbcDecryptor::Aes256),
        };
        mode.map_err(|e| invalid_key(key.len(), e))
    }
}

impl fmt::Debug for BlockCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockCipher(AES-{})", self.key.len() * 8)
    }
}

fn invalid_key(len: usize, err: impl fmt::Display) -> FencError {
    FencError::with_kind(
        ErrorCategory::Internal,
        ErrorKind::InvalidKeyLength,
        format!("failed to initialize AES-{}: {}", len * 8, err),
    )
}

pub(crate) enum CbcEncryptor {
    Aes128(cbc::Encryptor<Aes128>),
    Aes192(cbc::Encryptor<Aes192>),
    Aes256(cbc::Encryptor<Aes256>),
}

impl CbcEncryptor {
    /// `buf.len()` must be a multiple of [`BLOCK_SIZE`].
    fn encrypt_blocks(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(chunk);
            match self {
                Self::Aes128(mode) => mode.encrypt_block_mut(block),
                Self::Aes192(mode) => mode.encrypt_block_mut(block),
                Self::Aes256(mode) => mode.encrypt_block_mut(block),
            }
        }
    }
}

pub(crate) enum CbcDecryptor {
    Aes128(cbc::Decryptor<Aes128>),
    Aes192(cbc::Decryptor<Aes192>),
    Aes256(cbc::Decryptor<Aes256>),
}

impl CbcDecryptor {
    /// `buf.len()` must be a multiple of [`BLOCK_SIZE`].
    fn decrypt_blocks(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(chunk);
            match self {
                Self::Aes128(mode) => mode.decrypt_block_mut(block),
                Self::Aes192(mode) => mode.decrypt_block_mut(block),
                Self::Aes256(mode) => mode.decrypt_block_mut(block),
            }
        }
    }
}

/// Encrypts into `inner`. Call [`CbcWriter::finish`] to write the padded
/// final block; dropping the writer without finishing loses the tail.
pub struct CbcWriter<W: Write> {
    inner: W,
    mode: CbcEncryptor,
    pending: Vec<u8>,
}

impl<W: Write> CbcWriter<W> {
    pub fn new(cipher: &BlockCipher, iv: &[u8; BLOCK_SIZE], inner: W) -> Result<Self> {
        Ok(Self {
            inner,
            mode: cipher.encryptor(iv)?,
            pending: Vec::with_capacity(BLOCK_SIZE),
        })
    }

    /// Pads and writes the final block, then returns the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        let mut block = GenericArray::<u8, U16>::default();
        let used = self.pending.len();
        block[..used].copy_from_slice(&self.pending);
        Pkcs7::pad(&mut block, used);
        self.mode.encrypt_blocks(&mut block);
        self.inner.write_all(&block)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for CbcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        let whole = self.pending.len() - self.pending.len() % BLOCK_SIZE;
        if whole > 0 {
            self.mode.encrypt_blocks(&mut self.pending[..whole]);
            self.inner.write_all(&self.pending[..whole])?;
            self.pending.drain(..whole);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // A partial block cannot be emitted before the stream ends.
        self.inner.flush()
    }
}

/// Decrypts from `inner`. The last block is withheld until `inner` reports
/// end of stream so the padding can be checked and removed.
pub struct CbcReader<R: Read> {
    inner: R,
    mode: CbcDecryptor,
    scratch: Vec<u8>,
    partial: Vec<u8>,
    out: Vec<u8>,
    out_pos: usize,
    last_block: Option<[u8; BLOCK_SIZE]>,
    finished: bool,
}

impl<R: Read> CbcReader<R> {
    pub fn new(cipher: &BlockCipher, iv: &[u8; BLOCK_SIZE], inner: R) -> Result<Self> {
        Ok(Self {
            inner,
            mode: cipher.decryptor(iv)?,
            scratch: vec![0u8; READ_CHUNK],
            partial: Vec::with_capacity(BLOCK_SIZE),
            out: Vec::new(),
            out_pos: 0,
            last_block: None,
            finished: false,
        })
    }

    fn fill(&mut self) -> io::Result<()> {
        let n = loop {
            match self.inner.read(&mut self.scratch) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(io::Error::new(e.kind(), SourceError(e))),
            }
        };

        self.out.clear();
        self.out_pos = 0;

        if n == 0 {
            self.finished = true;
            if !self.partial.is_empty() {
                return Err(invalid_data("ciphertext is not a whole number of blocks"));
            }
            let Some(block) = self.last_block.take() else {
                return Err(invalid_data("ciphertext is empty"));
            };
            let block = GenericArray::<u8, U16>::from(block);
            let data = Pkcs7::unpad(&block).map_err(|_| invalid_data("invalid padding"))?;
            self.out.extend_from_slice(data);
            return Ok(());
        }

        self.partial.extend_from_slice(&self.scratch[..n]);
        let whole = self.partial.len() - self.partial.len() % BLOCK_SIZE;
        if whole == 0 {
            return Ok(());
        }

        let mut blocks: Vec<u8> = self.partial.drain(..whole).collect();
        self.mode.decrypt_blocks(&mut blocks);

        if let Some(previous) = self.last_block.take() {
            self.out.extend_from_slice(&previous);
        }
        let (body, last) = blocks.split_at(whole - BLOCK_SIZE);
        self.out.extend_from_slice(body);
        let mut tail = [0u8; BLOCK_SIZE];
        tail.copy_from_slice(last);
        self.last_block = Some(tail);
        Ok(())
    }
}

impl<R: Read> Read for CbcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.out_pos < self.out.len() {
                let n = buf.len().min(self.out.len() - self.out_pos);
                buf[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
                self.out_pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            self.fill()?;
        }
    }
}

fn invalid_data(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// A failure of the reader under a [`CbcReader`], as opposed to a framing
/// problem found while decrypting.
#[derive(Debug)]
struct SourceError(io::Error);

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for SourceError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.0)
    }
}

/// Split errors that passed through a [`CbcReader`] (and any adapters
/// stacked on it) by origin: `Ok` carries the source reader's own error,
/// `Err` gives back anything raised while decrypting or above.
pub fn take_source_error(err: io::Error) -> std::result::Result<io::Error, io::Error> {
    if !err.get_ref().is_some_and(|inner| inner.is::<SourceError>()) {
        return Err(err);
    }
    let kind = err.kind();
    match err.into_inner().map(|inner| inner.downcast::<SourceError>()) {
        Some(Ok(source)) => Ok(source.0),
        Some(Err(other)) => Err(io::Error::new(kind, other)),
        None => Err(io::Error::from(kind)),
    }
}
