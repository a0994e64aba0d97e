// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use sha1::{Digest, Sha1 as Sha1Hasher};
use sha2::Sha256 as Sha256Hasher;

/// Deterministic fixed-width digest over a byte sequence.
///
/// The id and digest width are written into the file header; a database
/// refuses to open a file whose digest width differs from its hasher's.
pub trait Hasher {
    /// Four ASCII bytes identifying the algorithm.
    const ID: [u8; 4];
    /// Digest width in bytes.
    const DIGEST_LENGTH: u16;

    fn digest(bytes: &[u8]) -> Vec<u8>;
}

/// SHA-1, the default hasher.
#[derive(Debug)]
pub enum Sha1 {}

impl Hasher for Sha1 {
    const ID: [u8; 4] = *b"sha1";
    const DIGEST_LENGTH: u16 = 20;

    fn digest(bytes: &[u8]) -> Vec<u8> {
        let mut hasher = Sha1Hasher::new();
        hasher.update(bytes);
        hasher.finalize().to_vec()
    }
}

#[derive(Debug)]
pub enum Sha256 {}

impl Hasher for Sha256 {
    const ID: [u8; 4] = *b"s256";
    const DIGEST_LENGTH: u16 = 32;

    fn digest(bytes: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256Hasher::new();
        hasher.update(bytes);
        hasher.finalize().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_known_digest() {
        assert_eq!(
            Sha1::digest(b"foo"),
            hex::decode("0beec7b5ea3f0fdbc95d0dd47f3c5bc275da8a33").unwrap()
        );
        assert_eq!(Sha1::digest(b"foo").len() as u16, Sha1::DIGEST_LENGTH);
    }

    #[test]
    fn sha256_known_digest() {
        assert_eq!(
            Sha256::digest(b"foo"),
            hex::decode("2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae")
                .unwrap()
        );
    }
}
