//! Registry of the digest algorithms a container may be stamped with
//!
//! Numeric ids follow Go's `crypto.Hash` numbering, which is what the
//! header's algorithm field has always carried.

use std::fmt;
use std::io::{self, Write};

use digest::DynDigest;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::error::{ErrorCategory, ErrorKind, FencError, Result};

/// Algorithm used when the caller does not pick one.
pub const DEFAULT_HASH: &str = "sha256";

/// An entry of the registry: how to identify an algorithm on disk and how
/// to start hashing with it.
pub struct HashDescriptor {
    pub id: u16,
    pub name: &'static str,
    pub output_size: usize,
    factory: fn() -> Box<dyn DynDigest>,
}

impl HashDescriptor {
    /// A fresh incremental accumulator for this algorithm.
    pub fn hasher(&self) -> Box<dyn DynDigest> {
        (self.factory)()
    }
}

impl fmt::Debug for HashDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("output_size", &self.output_size)
            .finish()
    }
}

impl PartialEq for HashDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for HashDescriptor {}

fn new_hasher<D: DynDigest + Default + 'static>() -> Box<dyn DynDigest> {
    Box::new(D::default())
}

static REGISTRY: [HashDescriptor; 4] = [
    HashDescriptor {
        id: 2,
        name: "md5",
        output_size: 16,
        factory: new_hasher::<Md5>,
    },
    HashDescriptor {
        id: 3,
        name: "sha1",
        output_size: 20,
        factory: new_hasher::<Sha1>,
    },
    HashDescriptor {
        id: 5,
        name: "sha256",
        output_size: 32,
        factory: new_hasher::<Sha256>,
    },
    HashDescriptor {
        id: 7,
        name: "sha512",
        output_size: 64,
        factory: new_hasher::<Sha512>,
    },
];

/// Every supported algorithm, in ascending id order.
pub fn all() -> &'static [HashDescriptor] {
    &REGISTRY
}

/// Look up an algorithm by its (lowercase) name.
pub fn by_name(name: &str) -> Result<&'static HashDescriptor> {
    REGISTRY.iter().find(|d| d.name == name).ok_or_else(|| {
        FencError::with_kind(
            ErrorCategory::User,
            ErrorKind::UnsupportedAlgorithm,
            format!("unsupported hash function {:?}", name),
        )
    })
}

/// Look up an algorithm by the id stored in container headers.
pub fn by_id(id: u16) -> Result<&'static HashDescriptor> {
    REGISTRY.iter().find(|d| d.id == id).ok_or_else(|| {
        FencError::with_kind(
            ErrorCategory::User,
            ErrorKind::UnsupportedAlgorithm,
            format!("unrecognized hash id {}", id),
        )
    })
}

/// Passes writes through to `inner` while feeding the same bytes to a digest.
pub(crate) struct DigestWriter<'a, W: Write> {
    inner: W,
    hasher: &'a mut dyn DynDigest,
}

impl<'a, W: Write> DigestWriter<'a, W> {
    pub(crate) fn new(inner: W, hasher: &'a mut dyn DynDigest) -> Self {
        Self { inner, hasher }
    }
}

impl<W: Write> Write for DigestWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
