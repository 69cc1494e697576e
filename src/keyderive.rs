//! Passphrase to AES key material
//!
//! The passphrase bytes are used directly when they already have an AES key
//! length. Longer passphrases are truncated to 32 bytes, shorter ones are
//! expanded up to the next key length by a [`KeyExpander`]. An empty
//! passphrase maps to an all-zero 16-byte key.
//!
//! This is not a password hash: there is no salt and no work factor.

use zeroize::Zeroizing;

pub const AES128_KEY_LEN: usize = 16;
pub const AES192_KEY_LEN: usize = 24;
pub const AES256_KEY_LEN: usize = 32;

/// Stretches a passphrase that is shorter than its target key length.
pub trait KeyExpander {
    /// `passphrase` is never empty and always shorter than `target_len`.
    /// The result must be exactly `target_len` bytes and must depend only on
    /// the inputs.
    fn expand(&self, passphrase: &[u8], target_len: usize) -> Zeroizing<Vec<u8>>;
}

/// Repeats the passphrase across the key, XORing each repetition after the
/// first with a multiple of `0x9E`:
///
/// `key[i] = p[i % len] ^ (0x9E * (i / len))` (mod 256)
///
/// The first `len` bytes of the key are the passphrase itself, so two
/// passphrases of equal length never share a key.
#[derive(Debug, Clone, Copy, Default)]
pub struct CyclicFold;

const FOLD_ROUND_CONSTANT: u8 = 0x9E;

impl KeyExpander for CyclicFold {
    fn expand(&self, passphrase: &[u8], target_len: usize) -> Zeroizing<Vec<u8>> {
        let len = passphrase.len();
        let mut key = Zeroizing::new(Vec::with_capacity(target_len));
        for i in 0..target_len {
            let round = (i / len) as u8;
            key.push(passphrase[i % len] ^ FOLD_ROUND_CONSTANT.wrapping_mul(round));
        }
        key
    }
}

/// The key length a passphrase of `passphrase_len` bytes maps to.
pub fn target_len(passphrase_len: usize) -> usize {
    match passphrase_len {
        0..=AES128_KEY_LEN => AES128_KEY_LEN,
        17..=AES192_KEY_LEN => AES192_KEY_LEN,
        _ => AES256_KEY_LEN,
    }
}

/// Derive key material using the default [`CyclicFold`] expansion.
pub fn derive_key(passphrase: &[u8]) -> Zeroizing<Vec<u8>> {
    derive_key_with(&CyclicFold, passphrase)
}

/// Derive key material, delegating short passphrases to `expander`.
pub fn derive_key_with(expander: &dyn KeyExpander, passphrase: &[u8]) -> Zeroizing<Vec<u8>> {
    let target = target_len(passphrase.len());
    match passphrase.len() {
        0 => Zeroizing::new(vec![0u8; target]),
        len if len >= target => Zeroizing::new(passphrase[..target].to_vec()),
        _ => {
            let key = expander.expand(passphrase, target);
            debug_assert_eq!(key.len(), target);
            key
        }
    }
}
