// Copyright 2023 The Scribe Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SHA-256 digests and the domain-separated hashes used by the Merkle tree.

use std::fmt;
use std::fmt::Debug;

use digest::Digest as _;
use sha2::Sha256;

use crate::hex_util;

/// Length of a [`Digest`] in bytes.
pub const DIGEST_LENGTH: usize = 32;

/// Domain-separation prefix for Merkle leaf hashes.
pub const LEAF_PREFIX: u8 = 0x00;

/// Domain-separation prefix for Merkle internal-node hashes.
pub const NODE_PREFIX: u8 = 0x01;

/// A SHA-256 digest. The all-zero value is reserved to mean "absent".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Digest {
    /// The zero digest, denoting an absent value.
    pub const ZERO: Self = Self([0; DIGEST_LENGTH]);

    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parses a fixed-width hex string. Anything that is not exactly
    /// 64 hex digits is rejected.
    pub fn try_from_hex(hex: impl AsRef<[u8]>) -> Option<Self> {
        let hex = hex.as_ref();
        if hex.len() != DIGEST_LENGTH * 2 {
            return None;
        }
        let decoded = hex_util::decode_hex(hex)?;
        Some(Self(decoded.try_into().unwrap()))
    }

    /// Parses the given hex string into a `Digest`.
    ///
    /// The given string must be valid. A static str is required to prevent
    /// API misuse.
    pub fn from_hex(hex: &'static str) -> Self {
        Self::try_from_hex(hex).unwrap()
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }

    /// Fixed-width lowercase hex, 64 characters.
    pub fn hex(&self) -> String {
        hex_util::encode_hex(&self.0)
    }

    /// True for the reserved "absent" value.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("Digest").field(&self.hex()).finish()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.pad(&self.hex())
    }
}

impl serde::Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> serde::Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        Self::try_from_hex(&hex)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid digest: {hex}")))
    }
}

/// SHA-256 of `data` with no prefix.
pub fn hash_bytes(data: &[u8]) -> Digest {
    Digest(Sha256::digest(data).into())
}

/// Leaf hash: `SHA256(0x00 ∥ data)`.
///
/// The prefix keeps leaf hashes and internal-node hashes in disjoint domains
/// so a subtree cannot be replayed as a leaf (RFC 6962 §2.1).
pub fn hash_leaf(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    Digest(hasher.finalize().into())
}

/// Internal-node hash: `SHA256(0x01 ∥ left ∥ right)`.
pub fn hash_internal(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Digest(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_digest() {
        assert!(Digest::ZERO.is_zero());
        assert!(!hash_bytes(b"").is_zero());
        assert_eq!(Digest::ZERO.hex(), "0".repeat(64));
    }

    #[test]
    fn test_hex_round_trip() {
        let digest = hash_bytes(b"scribe");
        assert_eq!(digest.hex().len(), 64);
        assert_eq!(Digest::try_from_hex(digest.hex()), Some(digest));
    }

    #[test]
    fn test_hex_rejects_wrong_width() {
        assert_eq!(Digest::try_from_hex(""), None);
        assert_eq!(Digest::try_from_hex("ab"), None);
        assert_eq!(Digest::try_from_hex("g".repeat(64)), None);
        assert_eq!(Digest::try_from_hex("a".repeat(63)), None);
        assert_eq!(Digest::try_from_hex("a".repeat(65)), None);
        assert!(Digest::try_from_hex("a".repeat(64)).is_some());
    }

    #[test]
    fn test_hashes_are_deterministic() {
        assert_eq!(hash_bytes(b"x"), hash_bytes(b"x"));
        assert_ne!(hash_bytes(b"x"), hash_bytes(b"y"));
        assert_eq!(hash_leaf(b"x"), hash_leaf(b"x"));
        let left = hash_bytes(b"l");
        let right = hash_bytes(b"r");
        assert_eq!(hash_internal(&left, &right), hash_internal(&left, &right));
        assert_ne!(hash_internal(&left, &right), hash_internal(&right, &left));
    }

    #[test]
    fn test_domain_separation() {
        // A leaf over 64 bytes must never collide with an internal node over
        // the same 64 bytes.
        let x = hash_bytes(b"x");
        let mut concatenated = Vec::new();
        concatenated.extend_from_slice(x.as_bytes());
        concatenated.extend_from_slice(x.as_bytes());
        assert_ne!(hash_leaf(&concatenated), hash_internal(&x, &x));
        assert_ne!(hash_bytes(b"x"), hash_leaf(b"x"));
    }
}
