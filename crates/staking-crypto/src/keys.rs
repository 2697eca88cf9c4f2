// staking-crypto/src/keys.rs

use crate::{hash::Hashable, CryptoError, CryptoResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of a compressed BLS12-381 public key
pub const BLS_PUBKEY_SIZE: usize = 48;

/// Size of a BLS12-381 deposit signature
pub const BLS_SIGNATURE_SIZE: usize = 96;

/// Account address (20 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    /// Create address from bytes
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn zero() -> Self {
        Self([0u8; 20])
    }

    /// Derive an address from arbitrary seed bytes (last 20 bytes of the Keccak digest)
    pub fn derive(seed: &[u8]) -> Self {
        let hash = seed.keccak();
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash.as_bytes()[12..32]);
        Self(address)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = crate::decode_hex(s)?;
        if bytes.len() != 20 {
            return Err(CryptoError::InvalidLength {
                kind: "address",
                expected: 20,
                actual: bytes.len(),
            });
        }
        let mut address = [0u8; 20];
        address.copy_from_slice(&bytes);
        Ok(Self(address))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Compressed BLS public key of a validator on the remote network
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct BlsPublicKey(Vec<u8>);

impl BlsPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != BLS_PUBKEY_SIZE {
            return Err(CryptoError::InvalidLength {
                kind: "BLS public key",
                expected: BLS_PUBKEY_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        Self::from_bytes(&crate::decode_hex(s)?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

impl TryFrom<Vec<u8>> for BlsPublicKey {
    type Error = CryptoError;

    fn try_from(bytes: Vec<u8>) -> CryptoResult<Self> {
        Self::from_bytes(&bytes)
    }
}

impl From<BlsPublicKey> for Vec<u8> {
    fn from(key: BlsPublicKey) -> Vec<u8> {
        key.0
    }
}

impl fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsPublicKey(0x{}...)", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Deposit-data signature produced by the validator key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct BlsSignature(Vec<u8>);

impl BlsSignature {
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != BLS_SIGNATURE_SIZE {
            return Err(CryptoError::InvalidLength {
                kind: "BLS signature",
                expected: BLS_SIGNATURE_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        Self::from_bytes(&crate::decode_hex(s)?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<Vec<u8>> for BlsSignature {
    type Error = CryptoError;

    fn try_from(bytes: Vec<u8>) -> CryptoResult<Self> {
        Self::from_bytes(&bytes)
    }
}

impl From<BlsSignature> for Vec<u8> {
    fn from(signature: BlsSignature) -> Vec<u8> {
        signature.0
    }
}

impl fmt::Debug for BlsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsSignature(0x{}...)", hex::encode(&self.0[..6]))
    }
}

/// 32-byte withdrawal credentials committed with every deposit
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WithdrawalCredentials([u8; 32]);

impl WithdrawalCredentials {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Type-0x01 credentials pointing at an execution-layer address
    pub fn for_address(address: &Address) -> Self {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x01;
        bytes[12..].copy_from_slice(address.as_bytes());
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let decoded = crate::decode_hex(s)?;
        if decoded.len() != 32 {
            return Err(CryptoError::InvalidLength {
                kind: "withdrawal credentials",
                expected: 32,
                actual: decoded.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for WithdrawalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WithdrawalCredentials({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let address = Address::derive(b"oracle-1");
        assert_eq!(Address::from_hex(&address.to_hex()).unwrap(), address);
        assert!(!address.is_zero());
    }

    #[test]
    fn test_address_invalid_length() {
        assert!(matches!(
            Address::from_hex("0x0102"),
            Err(CryptoError::InvalidLength { expected: 20, actual: 2, .. })
        ));
    }

    #[test]
    fn test_pubkey_length_enforced() {
        assert!(BlsPublicKey::from_bytes(&[7u8; BLS_PUBKEY_SIZE]).is_ok());
        assert!(BlsPublicKey::from_bytes(&[7u8; 32]).is_err());
    }

    #[test]
    fn test_mainnet_deposit_key_parses() {
        let key = BlsPublicKey::from_hex(
            "0xb56720cc59e4fa235e5569dbbf1b90a746d5da9809fae4a10e31724aeb1962d948ae95f5aead9dbb7aa2c94972e5ce34",
        )
        .unwrap();
        assert_eq!(key.as_bytes().len(), BLS_PUBKEY_SIZE);
    }

    #[test]
    fn test_withdrawal_credentials_for_address() {
        let address = Address::new([0xab; 20]);
        let creds = WithdrawalCredentials::for_address(&address);
        assert_eq!(creds.as_bytes()[0], 0x01);
        assert_eq!(&creds.as_bytes()[12..], address.as_bytes());
        assert_eq!(WithdrawalCredentials::from_hex(&creds.to_hex()).unwrap(), creds);
    }

    #[test]
    fn test_signature_rejects_short_input() {
        assert!(BlsSignature::from_bytes(&[1u8; BLS_SIGNATURE_SIZE]).is_ok());
        assert!(BlsSignature::from_bytes(&[1u8; 95]).is_err());
    }
}
