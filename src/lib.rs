//! fenc - passphrase-based file encryption
//!
//! Each file becomes a self-describing container: a 128-byte header
//! (signature, version, digest algorithm, plaintext digest, IV) followed by
//! the gzip-compressed plaintext encrypted with AES-CBC. See [`header`] for
//! the layout, [`encoder`] and [`decoder`] for the streaming pipelines.
//!
//! The plaintext digest lets decryption detect a wrong passphrase or
//! corrupted data. It is not a MAC and does not authenticate the container.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod file_ops;
pub mod hashes;
pub mod header;
pub mod keyderive;
pub mod passphrase;
pub mod progress;
pub mod task;

pub use cipher::BlockCipher;
pub use decoder::decode;
pub use encoder::{encode, encode_with_iv};
pub use error::{ErrorCategory, ErrorKind, FencError, Result};
pub use header::ContainerHeader;
