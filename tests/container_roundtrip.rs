//! Container round trips through the public API

use std::io::{Cursor, Write};

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use flate2::Compression;
use flate2::write::GzEncoder;
use proptest::prelude::*;

use fenc::cipher::{BLOCK_SIZE, BlockCipher};
use fenc::hashes;
use fenc::header::{HEADER_SIZE, IV_SIZE};
use fenc::{ErrorKind, decode, encode, encode_with_iv};

const KEY: &[u8] = b"16-byte-long-key";
const IV: [u8; IV_SIZE] = *b"not_so_random_iv";

const LOREM: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do \
    eiusmod tempor incididunt ut labore et dolore magna aliqua. Ut enim ad minim \
    veniam, quis nostrud exercitation ullamco laboris nisi ut aliquip ex ea commodo \
    consequat. Duis aute irure dolor in reprehenderit in voluptate velit esse cillum \
    dolore eu fugiat nulla pariatur. Excepteur sint occaecat cupidatat non proident, \
    sunt in culpa qui officia deserunt mollit anim id est laborum.";

fn seal(hash: &str, key: &[u8], data: &[u8]) -> Vec<u8> {
    let cipher = BlockCipher::new(key).unwrap();
    let id = hashes::by_name(hash).unwrap().id;
    let mut sink = Cursor::new(Vec::new());
    encode_with_iv(id, &cipher, IV, &mut &data[..], &mut sink).unwrap();
    sink.into_inner()
}

fn open(key: &[u8], container: &[u8]) -> fenc::Result<Vec<u8>> {
    let cipher = BlockCipher::new(key).unwrap();
    let mut out = Vec::new();
    decode(&cipher, &mut &container[..], &mut out)?;
    Ok(out)
}

/// Body produced by one-shot gzip and one-shot AES-128-CBC with PKCS#7,
/// without any of the crate's streaming code.
fn expected_body(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut compressor = GzEncoder::new(Vec::new(), Compression::default());
    compressor.write_all(data).unwrap();
    let compressed = compressor.finish().unwrap();
    cbc::Encryptor::<Aes128>::new_from_slices(key, &IV)
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(&compressed)
}

#[test]
fn test_empty_input() {
    let container = seal("sha256", KEY, b"");

    assert_eq!(&container[..4], b"FENC");
    assert_eq!(&container[4..6], &[1, 0]);
    assert_eq!(&container[6..8], &[5, 0]);
    assert_eq!(
        hex::encode(&container[8..40]),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(&container[72..88], &IV);
    assert_eq!(&container[HEADER_SIZE..], &expected_body(KEY, b"")[..]);

    assert_eq!(open(KEY, &container).unwrap(), b"");
}

#[test]
fn test_lorem_ipsum() {
    let container = seal("sha256", KEY, LOREM.as_bytes());
    let body = expected_body(KEY, LOREM.as_bytes());

    assert_eq!(container.len(), HEADER_SIZE + body.len());
    assert_eq!(&container[HEADER_SIZE..], &body[..]);
    assert_eq!(body.len() % BLOCK_SIZE, 0);
    assert!(body.len() < LOREM.len());

    assert_eq!(open(KEY, &container).unwrap(), LOREM.as_bytes());
}

#[test]
fn test_all_key_sizes() {
    let passphrases: [&[u8]; 5] = [
        b"",
        b"short",
        b"exactly-16-bytes",
        b"a 20 byte passphrase",
        b"this passphrase is long enough to be truncated",
    ];
    for passphrase in passphrases {
        let cipher = BlockCipher::from_passphrase(passphrase).unwrap();
        let mut sink = Cursor::new(Vec::new());
        encode(5, &cipher, &mut LOREM.as_bytes(), &mut sink).unwrap();

        let cipher = BlockCipher::from_passphrase(passphrase).unwrap();
        let mut out = Vec::new();
        decode(&cipher, &mut &sink.get_ref()[..], &mut out).unwrap();
        assert_eq!(out, LOREM.as_bytes());
    }
}

#[test]
fn test_random_iv_differs() {
    let cipher = BlockCipher::new(KEY).unwrap();
    let mut a = Cursor::new(Vec::new());
    let mut b = Cursor::new(Vec::new());
    encode(5, &cipher, &mut LOREM.as_bytes(), &mut a).unwrap();
    encode(5, &cipher, &mut LOREM.as_bytes(), &mut b).unwrap();
    assert_ne!(&a.get_ref()[72..88], &b.get_ref()[72..88]);
    assert_ne!(a.get_ref()[HEADER_SIZE..], b.get_ref()[HEADER_SIZE..]);
}

#[test]
fn test_wrong_key() {
    let container = seal("sha512", KEY, LOREM.as_bytes());
    let err = open(b"other-16-byte-ky", &container).unwrap_err();
    assert_eq!(err.kind, Some(ErrorKind::WrongKeyOrCorruptData));
}

#[test]
fn test_tampered_digest() {
    let container = seal("sha256", KEY, LOREM.as_bytes());
    for offset in 8..8 + 32 {
        let mut tampered = container.clone();
        tampered[offset] ^= 0x40;
        let err = open(KEY, &tampered).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::WrongKeyOrCorruptData), "offset {}", offset);
    }
}

#[test]
fn test_unused_digest_slot_is_ignored() {
    let mut container = seal("md5", KEY, LOREM.as_bytes());
    container[8 + 16] ^= 0xff;
    container[8 + 63] ^= 0xff;
    assert_eq!(open(KEY, &container).unwrap(), LOREM.as_bytes());
}

#[test]
fn test_tampered_body() {
    let container = seal("sha256", KEY, LOREM.as_bytes());
    for offset in HEADER_SIZE..container.len() {
        for flip in [0x01, 0x80] {
            let mut tampered = container.clone();
            tampered[offset] ^= flip;
            let err = open(KEY, &tampered).unwrap_err();
            assert_eq!(
                err.kind,
                Some(ErrorKind::WrongKeyOrCorruptData),
                "offset {} flip {:#x}",
                offset,
                flip
            );
        }
    }
}

#[test]
fn test_header_rejections() {
    let container = seal("sha1", KEY, b"abc");

    let mut bad = container.clone();
    bad[0] = b'X';
    assert_eq!(open(KEY, &bad).unwrap_err().kind, Some(ErrorKind::HeaderFormat));

    let mut bad = container.clone();
    bad[4] = 2;
    assert_eq!(open(KEY, &bad).unwrap_err().kind, Some(ErrorKind::UnsupportedVersion));

    let mut bad = container.clone();
    bad[6] = 99;
    assert_eq!(open(KEY, &bad).unwrap_err().kind, Some(ErrorKind::UnsupportedAlgorithm));

    assert_eq!(
        open(KEY, &container[..HEADER_SIZE - 1]).unwrap_err().kind,
        Some(ErrorKind::HeaderFormat)
    );
    assert_eq!(open(KEY, b"").unwrap_err().kind, Some(ErrorKind::HeaderFormat));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_roundtrip(
        data in proptest::collection::vec(any::<u8>(), 0..4096),
        passphrase in proptest::collection::vec(any::<u8>(), 0..40),
        hash in prop::sample::select(vec!["md5", "sha1", "sha256", "sha512"]),
    ) {
        let cipher = BlockCipher::from_passphrase(&passphrase).unwrap();
        let id = hashes::by_name(hash).unwrap().id;
        let mut sink = Cursor::new(Vec::new());
        encode(id, &cipher, &mut &data[..], &mut sink).unwrap();

        let container = sink.into_inner();
        prop_assert_eq!((container.len() - HEADER_SIZE) % BLOCK_SIZE, 0);

        let mut out = Vec::new();
        decode(&cipher, &mut &container[..], &mut out).unwrap();
        prop_assert_eq!(out, data);
    }
}
