// staking-crypto/src/lib.rs

//! Byte-level identities used by the staking protocol
//!
//! This crate provides:
//! - Keccak-256 hashing
//! - Account addresses (20 bytes)
//! - Validator BLS public keys, deposit signatures and withdrawal credentials

pub mod hash;
pub mod keys;

pub use hash::{Hash, Hashable, HASH_SIZE};
pub use keys::{
    Address, BlsPublicKey, BlsSignature, WithdrawalCredentials, BLS_PUBKEY_SIZE,
    BLS_SIGNATURE_SIZE,
};

/// Result type for byte decoding operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while decoding keys and hashes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid length for {kind}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),
}

/// Decode a hex string with an optional `0x` prefix
pub(crate) fn decode_hex(s: &str) -> CryptoResult<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|e| CryptoError::InvalidHex(e.to_string()))
}
