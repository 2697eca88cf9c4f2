// node/src/config.rs
use accounting::BootstrapState;
use consensus::{BeaconSchedule, DEFAULT_ACTIVATION_COOLDOWN_SECS};
use issuer::DEFAULT_MIN_ACTIVATING_DEPOSIT_TOKENS;
use serde::{Deserialize, Serialize};
use staking_core::{Amount, BasisPoints};
use staking_crypto::{Address, CryptoResult};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: String,
    pub protocol: ProtocolConfig,
    pub beacon: BeaconSchedule,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub report_quorum: u32,
    pub validator_quorum: u32,
    pub treasury_commission_bps: BasisPoints,
    pub operator_commission_bps: BasisPoints,
    pub pending_validators_limit_bps: BasisPoints,
    /// Stakes of at least this many whole tokens wait on the pending-validator limit
    pub min_activating_deposit_tokens: u64,
    pub activation_cooldown_secs: u64,
}

/// Accounting carried over from an earlier deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub beacon_value_gwei: u64,
    pub deposited_validators: u64,
    pub reported_validators: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report_epoch: Option<u64>,
}

/// Principals as `0x`-prefixed hex addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesConfig {
    pub governor: String,
    pub key_admin: String,
    pub node_operators: Vec<String>,
    pub oracle_members: Vec<String>,
    pub treasury: String,
    pub operator_pool: String,
    /// Address the protocol withdrawal credentials point at
    pub withdrawal_address: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let dev = |seed: &str| Address::derive(seed.as_bytes()).to_hex();
        Self {
            data_dir: "./data".into(),
            protocol: ProtocolConfig {
                report_quorum: 2,
                validator_quorum: 2,
                treasury_commission_bps: 200,
                operator_commission_bps: 300,
                pending_validators_limit_bps: 500,
                min_activating_deposit_tokens: DEFAULT_MIN_ACTIVATING_DEPOSIT_TOKENS,
                activation_cooldown_secs: DEFAULT_ACTIVATION_COOLDOWN_SECS,
            },
            beacon: BeaconSchedule::default(),
            bootstrap: BootstrapConfig::default(),
            roles: RolesConfig {
                governor: dev("governor"),
                key_admin: dev("key-admin"),
                node_operators: vec![dev("operator-1")],
                oracle_members: vec![dev("oracle-1"), dev("oracle-2"), dev("oracle-3")],
                treasury: dev("treasury"),
                operator_pool: dev("operator-pool"),
                withdrawal_address: dev("withdrawal-vault"),
            },
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("state.bin")
    }
}

impl ProtocolConfig {
    pub fn min_activating_deposit(&self) -> Amount {
        Amount::from_tokens(self.min_activating_deposit_tokens)
    }
}

impl BootstrapConfig {
    pub fn to_state(&self) -> BootstrapState {
        BootstrapState {
            beacon_value: Amount::from_gwei(self.beacon_value_gwei),
            deposited_validators: self.deposited_validators,
            reported_validators: self.reported_validators,
            last_report_epoch: self.last_report_epoch,
        }
    }
}

impl RolesConfig {
    pub fn governor(&self) -> CryptoResult<Address> {
        Address::from_hex(&self.governor)
    }

    pub fn key_admin(&self) -> CryptoResult<Address> {
        Address::from_hex(&self.key_admin)
    }

    pub fn node_operators(&self) -> CryptoResult<Vec<Address>> {
        self.node_operators.iter().map(|a| Address::from_hex(a)).collect()
    }

    pub fn oracle_members(&self) -> CryptoResult<Vec<Address>> {
        self.oracle_members.iter().map(|a| Address::from_hex(a)).collect()
    }

    pub fn treasury(&self) -> CryptoResult<Address> {
        Address::from_hex(&self.treasury)
    }

    pub fn operator_pool(&self) -> CryptoResult<Address> {
        Address::from_hex(&self.operator_pool)
    }

    pub fn withdrawal_address(&self) -> CryptoResult<Address> {
        Address::from_hex(&self.withdrawal_address)
    }
}
