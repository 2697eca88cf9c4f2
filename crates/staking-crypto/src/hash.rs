// staking-crypto/src/hash.rs

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Hash output size in bytes
pub const HASH_SIZE: usize = 32;

/// A 32-byte Keccak-256 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Create a new hash from bytes
    pub fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a hash from a slice (returns error if wrong length)
    pub fn from_slice(slice: &[u8]) -> crate::CryptoResult<Self> {
        if slice.len() != HASH_SIZE {
            return Err(crate::CryptoError::InvalidLength {
                kind: "hash",
                expected: HASH_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn zero() -> Self {
        Self([0u8; HASH_SIZE])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> crate::CryptoResult<Self> {
        let bytes = crate::decode_hex(s)?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}...{})",
               hex::encode(&self.0[..4]),
               hex::encode(&self.0[28..]))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

/// Trait for types that can be hashed
pub trait Hashable {
    fn keccak(&self) -> Hash;
}

impl Hashable for [u8] {
    fn keccak(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(self);
        Hash::new(hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty_input() {
        // Well-known Keccak-256 digest of the empty string
        let expected = "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470";
        assert_eq!(b"".as_slice().keccak().to_hex(), expected);
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = b"stake".as_slice().keccak();
        assert_eq!(Hash::from_hex(&hash.to_hex()).unwrap(), hash);
    }

    #[test]
    fn test_from_slice_wrong_length() {
        assert!(Hash::from_slice(&[0u8; 31]).is_err());
    }
}
