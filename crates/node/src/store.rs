// node/src/store.rs

use crate::runtime::{Protocol, ProtocolState};
use serde::{Deserialize, Serialize};
use staking_core::{MemoryLedger, RecordingDepositContract, RoleRegistry};
use staking_crypto::{Hash, Hashable, HASH_SIZE};
use std::path::{Path, PathBuf};

/// Result type for snapshot operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing snapshots
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Snapshot not found: {0}")]
    NotFound(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Everything a CLI-driven protocol needs between invocations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: ProtocolState,
    pub ledger: MemoryLedger,
    pub roles: RoleRegistry,
    pub deposits: RecordingDepositContract,
}

impl Snapshot {
    pub fn into_protocol(self) -> Protocol<MemoryLedger, RoleRegistry, RecordingDepositContract> {
        Protocol::new(self.state, self.ledger, self.roles, self.deposits)
    }

    pub fn from_protocol(protocol: Protocol<MemoryLedger, RoleRegistry, RecordingDepositContract>) -> Self {
        let (state, ledger, roles, deposits) = protocol.into_parts();
        Self { state, ledger, roles, deposits }
    }
}

/// Single-file snapshot: Keccak-256 checksum followed by the bincode payload
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let payload = bincode::serialize(snapshot)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        let checksum = payload.keccak();

        let mut bytes = Vec::with_capacity(HASH_SIZE + payload.len());
        bytes.extend_from_slice(checksum.as_bytes());
        bytes.extend_from_slice(&payload);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("tmp");
        std::fs::write(&staging, &bytes)?;
        std::fs::rename(&staging, &self.path)?;

        tracing::debug!("Snapshot saved to {} ({} bytes)", self.path.display(), bytes.len());
        Ok(())
    }

    pub fn load(&self) -> StoreResult<Snapshot> {
        if !self.exists() {
            return Err(StoreError::NotFound(self.path.display().to_string()));
        }
        let bytes = std::fs::read(&self.path)?;
        if bytes.len() < HASH_SIZE {
            return Err(StoreError::Corruption(format!(
                "{} is {} bytes, shorter than its checksum",
                self.path.display(),
                bytes.len()
            )));
        }

        let (checksum, payload) = bytes.split_at(HASH_SIZE);
        let expected = Hash::from_slice(checksum)
            .map_err(|e| StoreError::Corruption(e.to_string()))?;
        if payload.keccak() != expected {
            return Err(StoreError::Corruption(format!(
                "checksum mismatch in {}",
                self.path.display()
            )));
        }

        bincode::deserialize(payload).map_err(|e| StoreError::SerializationError(e.to_string()))
    }
}
