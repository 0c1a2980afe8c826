//! Configuration: consensus network parameters and node-local settings.
//!
//! [`NetworkParams`] is fixed at genesis and identical on every node of a
//! chain; the genesis hash it produces is the network identifier.
//! [`NodeConfig`] is node-local policy (data directory, mempool caps,
//! mining, logging) and never affects consensus.

use serde::{Deserialize, Serialize};

use crate::consensus::constants::{
    INITIAL_SUBSIDY, MAX_BLOCK_SIZE, MAX_BLOCK_TXS, MEMPOOL_MAX_BYTES, MEMPOOL_MAX_TXS,
    MIN_RELAY_FEE, MIN_RELAY_FEE_RATE, RETARGET_INTERVAL, TARGET_BLOCK_TIME,
};
use crate::consensus::merkle::merkle_root;
use crate::consensus::types::{
    Block, BlockHeader, CoinbaseTag, OutPoint, Transaction, TxInput, TxKind, TxOutput,
};
use crate::crypto::{self, PowAlgorithm, ADDRESS_VERSION_MAINNET, ADDRESS_VERSION_TESTNET};

/// Network flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

/// Consensus parameters, immutable after genesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkParams {
    pub network: Network,
    pub address_version: u8,
    pub pow_algorithm: PowAlgorithm,
    /// Easiest permitted target, compact form.
    pub pow_limit_bits: u32,
    pub genesis_bits: u32,
    pub genesis_timestamp: u32,
    pub genesis_message: String,
    /// Beneficiary of the genesis subsidy; the burn address when unset.
    pub genesis_address: Option<String>,
    pub target_block_time: u64,
    pub retarget_interval: u32,
    pub max_block_bytes: usize,
    pub max_block_txs: usize,
    pub min_relay_fee: u64,
    pub min_relay_fee_rate: u64,
}

impl NetworkParams {
    pub fn mainnet() -> Self {
        NetworkParams {
            network: Network::Mainnet,
            address_version: ADDRESS_VERSION_MAINNET,
            pow_algorithm: PowAlgorithm::Scrypt,
            pow_limit_bits: 0x1e0fffff,
            genesis_bits: 0x1e0fffff,
            genesis_timestamp: 1_735_689_600, // 2025-01-01T00:00:00Z
            genesis_message: "1 coin = 1 kg CO2 - transparency for a sustainable future".into(),
            genesis_address: None,
            target_block_time: TARGET_BLOCK_TIME,
            retarget_interval: RETARGET_INTERVAL,
            max_block_bytes: MAX_BLOCK_SIZE,
            max_block_txs: MAX_BLOCK_TXS,
            min_relay_fee: MIN_RELAY_FEE,
            min_relay_fee_rate: MIN_RELAY_FEE_RATE,
        }
    }

    pub fn testnet() -> Self {
        NetworkParams {
            network: Network::Testnet,
            address_version: ADDRESS_VERSION_TESTNET,
            genesis_timestamp: 1_735_693_200,
            ..Self::mainnet()
        }
    }

    /// Local development chain: trivial difficulty so blocks mine in a few
    /// hash attempts.
    pub fn regtest() -> Self {
        NetworkParams {
            network: Network::Regtest,
            address_version: ADDRESS_VERSION_TESTNET,
            pow_limit_bits: 0x207fffff,
            genesis_bits: 0x207fffff,
            retarget_interval: 144,
            ..Self::mainnet()
        }
    }

    /// The canonical burn address for this network.
    pub fn burn_address(&self) -> String {
        crypto::burn_address(self.address_version)
    }

    /// Deterministically build the genesis block. Exempt from the PoW
    /// check; its hash is the network identifier.
    pub fn genesis_block(&self) -> Block {
        let beneficiary = self
            .genesis_address
            .clone()
            .unwrap_or_else(|| self.burn_address());
        let coinbase = Transaction {
            version: 1,
            kind: TxKind::Coinbase,
            inputs: vec![TxInput::unsigned(OutPoint::null())],
            outputs: vec![TxOutput::spendable(INITIAL_SUBSIDY, beneficiary)],
            timestamp: self.genesis_timestamp,
            metadata: serde_json::to_vec(&CoinbaseTag {
                height: 0,
                extra_nonce: None,
                message: Some(self.genesis_message.clone()),
            })
            .expect("genesis tag serializes"),
        };
        let txids = vec![coinbase.txid()];
        Block {
            header: BlockHeader {
                version: 1,
                prev_hash: [0u8; 32],
                merkle_root: merkle_root(&txids),
                timestamp: self.genesis_timestamp,
                bits: self.genesis_bits,
                nonce: 0,
            },
            transactions: vec![coinbase],
        }
    }
}

/// Node-local settings; defaults follow the network constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub logging: Option<LoggingConfig>,

    #[serde(default)]
    pub mempool: MempoolConfig,

    #[serde(default)]
    pub mining: MiningConfig,
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            data_dir: default_data_dir(),
            logging: None,
            mempool: MempoolConfig::default(),
            mining: MiningConfig::default(),
        }
    }
}

/// Logging configuration (RUST_LOG always takes precedence).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub filter: Option<String>,
}

/// Mempool policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolConfig {
    #[serde(default = "default_mempool_max_txs")]
    pub max_transactions: usize,

    #[serde(default = "default_mempool_max_bytes")]
    pub max_bytes: usize,

    /// Minimum absolute fee in satoshi.
    #[serde(default = "default_min_fee")]
    pub min_fee: u64,

    /// Minimum fee rate in satoshi per byte.
    #[serde(default = "default_min_fee_rate")]
    pub min_fee_rate: u64,
}

fn default_mempool_max_txs() -> usize {
    MEMPOOL_MAX_TXS
}

fn default_mempool_max_bytes() -> usize {
    MEMPOOL_MAX_BYTES
}

fn default_min_fee() -> u64 {
    MIN_RELAY_FEE
}

fn default_min_fee_rate() -> u64 {
    MIN_RELAY_FEE_RATE
}

impl Default for MempoolConfig {
    fn default() -> Self {
        MempoolConfig {
            max_transactions: default_mempool_max_txs(),
            max_bytes: default_mempool_max_bytes(),
            min_fee: default_min_fee(),
            min_fee_rate: default_min_fee_rate(),
        }
    }
}

/// Mining knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Nonces tried between cancellation checks.
    #[serde(default = "default_nonce_batch")]
    pub nonce_batch: u32,

    /// Mempool transactions considered per template.
    #[serde(default = "default_template_max_txs")]
    pub template_max_txs: usize,
}

fn default_nonce_batch() -> u32 {
    10_000
}

fn default_template_max_txs() -> usize {
    MAX_BLOCK_TXS
}

impl Default for MiningConfig {
    fn default() -> Self {
        MiningConfig {
            nonce_batch: default_nonce_batch(),
            template_max_txs: default_template_max_txs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_is_deterministic() {
        let params = NetworkParams::regtest();
        assert_eq!(params.genesis_block().hash(), params.genesis_block().hash());
        // Different networks identify themselves by different hashes
        assert_ne!(
            NetworkParams::mainnet().genesis_block().hash(),
            params.genesis_block().hash()
        );
    }

    #[test]
    fn test_genesis_structure() {
        let params = NetworkParams::regtest();
        let genesis = params.genesis_block();
        assert_eq!(genesis.transactions.len(), 1);
        let coinbase = genesis.coinbase().unwrap();
        assert_eq!(coinbase.coinbase_tag().unwrap().height, 0);
        assert_eq!(genesis.header.prev_hash, [0u8; 32]);
    }

    #[test]
    fn test_node_config_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.mempool.max_transactions, 10_000);
        assert_eq!(config.mempool.min_fee, 1000);
        assert_eq!(config.mining.nonce_batch, 10_000);
    }

    #[test]
    fn test_node_config_partial_json() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"data_dir": "/tmp/x", "mempool": {"min_fee": 500}}"#).unwrap();
        assert_eq!(config.data_dir, "/tmp/x");
        assert_eq!(config.mempool.min_fee, 500);
        assert_eq!(config.mempool.max_transactions, 10_000);
    }
}
