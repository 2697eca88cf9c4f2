// staking-core/src/access.rs

use serde::{Deserialize, Serialize};
use staking_crypto::Address;
use std::collections::{BTreeSet, HashMap};

/// Capabilities checked before a privileged call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Protocol configuration and oracle membership
    Governor,
    /// Submits reports and activation votes
    OracleMember,
    /// Registers validator keys
    NodeOperator,
    /// Manages the protocol withdrawal credentials
    KeyAdmin,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::Governor => "governor",
            Capability::OracleMember => "oracle-member",
            Capability::NodeOperator => "node-operator",
            Capability::KeyAdmin => "key-admin",
        };
        write!(f, "{}", name)
    }
}

/// Answers "does principal P hold capability C"
pub trait PermissionOracle {
    fn has_capability(&self, principal: &Address, capability: Capability) -> bool;
}

/// In-memory capability sets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleRegistry {
    roles: HashMap<Capability, BTreeSet<Address>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a single governor
    pub fn with_governor(governor: Address) -> Self {
        let mut registry = Self::new();
        registry.grant(governor, Capability::Governor);
        registry
    }

    /// Grant a capability; returns false if it was already held
    pub fn grant(&mut self, principal: Address, capability: Capability) -> bool {
        let granted = self.roles.entry(capability).or_default().insert(principal);
        if granted {
            tracing::debug!("Granted {} to {}", capability, principal);
        }
        granted
    }

    /// Revoke a capability; returns false if it was not held
    pub fn revoke(&mut self, principal: &Address, capability: Capability) -> bool {
        self.roles
            .get_mut(&capability)
            .map(|holders| holders.remove(principal))
            .unwrap_or(false)
    }

    pub fn holders(&self, capability: Capability) -> Vec<Address> {
        self.roles
            .get(&capability)
            .map(|holders| holders.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl PermissionOracle for RoleRegistry {
    fn has_capability(&self, principal: &Address, capability: Capability) -> bool {
        self.roles
            .get(&capability)
            .map(|holders| holders.contains(principal))
            .unwrap_or(false)
    }
}
