//! SHA-1 content hashing — the identity key for every stream in the store.
//!
//! The digest doubles as integrity check (spec.md §3, §8 invariant 2): once
//! an [`Lte`](crate::lookup_table::Lte) is hashed, streaming its bytes and
//! hashing again must reproduce the same value.

use std::fmt;

use sha1::{Digest, Sha1};

pub const DIGEST_LEN: usize = 20;

/// 20-byte SHA-1 digest, used both as a lookup-table key and a checksum.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha1Digest(pub [u8; DIGEST_LEN]);

impl Sha1Digest {
    pub const ZERO: Sha1Digest = Sha1Digest([0u8; DIGEST_LEN]);

    pub fn from_bytes(b: [u8; DIGEST_LEN]) -> Self {
        Sha1Digest(b)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }
}

impl fmt::Debug for Sha1Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for Sha1Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Hash a single buffer in one shot.
pub fn hash(data: &[u8]) -> Sha1Digest {
    let mut hasher = Sha1::new();
    hasher.update(data);
    Sha1Digest(hasher.finalize().into())
}

/// Streaming hasher for content fed in chunks (stream writes, resource
/// decode verification).
#[derive(Default)]
pub struct Sha1Hasher(Sha1);

impl Sha1Hasher {
    pub fn new() -> Self {
        Self(Sha1::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> Sha1Digest {
        Sha1Digest(self.0.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_digest_is_stable() {
        // SHA-1("") — well-known test vector.
        let d = hash(b"");
        assert_eq!(hex::encode(d.0), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut h = Sha1Hasher::new();
        h.update(b"hello, ");
        h.update(b"wim");
        assert_eq!(h.finalize(), hash(b"hello, wim"));
    }
}
