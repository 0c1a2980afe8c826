//! Node orchestration: the explicit value owning all chain state.
//!
//! [`Node`] owns the storage handle, the chain manager behind the writer
//! lock, the mempool behind its own mutex, and the event hub. Every
//! operation goes through it; there are no process singletons. Lock order
//! is always chain before mempool.

pub mod events;
pub mod mempool;
pub mod miner;

use std::sync::{Arc, Mutex, RwLock};

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::info;

use crate::chain::{AcceptOutcome, BlockStatus, ChainManager, ChainTip};
use crate::config::{NetworkParams, NodeConfig};
use crate::consensus::error::Rejection;
use crate::consensus::serialization::{deserialize_block, deserialize_tx};
use crate::consensus::types::{Block, Hash, OutPoint, Transaction};
use crate::ledger::{Certificate, Project};
use crate::storage::txindex::TxLocation;
use crate::storage::Storage;
use crate::utils::time::current_timestamp;
use crate::utxo::UtxoEntry;

use events::{EventHub, NodeEvent};
use mempool::{Mempool, MempoolInfo};
use miner::Miner;

/// A confirmed transaction with its location.
#[derive(Debug, Clone)]
pub struct ConfirmedTx {
    pub tx: Transaction,
    pub location: TxLocation,
}

/// The node core: chain, mempool, events, storage.
pub struct Node {
    config: NodeConfig,
    storage: Arc<Storage>,
    chain: RwLock<ChainManager>,
    mempool: Mutex<Mempool>,
    events: EventHub,
}

impl Node {
    /// Open a node over the configured data directory, creating the chain
    /// from genesis on first run.
    pub fn open(params: NetworkParams, config: NodeConfig) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config.data_dir)?);
        let chain = ChainManager::open(params, Arc::clone(&storage))
            .map_err(|e| anyhow::anyhow!("chain initialisation failed: {e}"))?;
        let mempool = Mempool::new(config.mempool.clone());
        info!(height = chain.tip().height, "node opened");
        Ok(Node {
            config,
            storage,
            chain: RwLock::new(chain),
            mempool: Mutex::new(mempool),
            events: EventHub::default(),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Subscribe to the fire-and-forget event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Query surface
    // ------------------------------------------------------------------

    pub fn tip(&self) -> ChainTip {
        self.chain.read().unwrap().tip()
    }

    pub fn get_block_by_height(&self, height: u32) -> Result<Option<Block>> {
        self.chain
            .read()
            .unwrap()
            .get_block_by_height(height)
            .map_err(|e| anyhow::anyhow!("{e}"))
    }

    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>> {
        self.chain
            .read()
            .unwrap()
            .get_block_by_hash(hash)
            .map_err(|e| anyhow::anyhow!("{e}"))
    }

    /// A confirmed transaction by id; the mempool is not consulted.
    pub fn get_transaction(&self, txid: &Hash) -> Result<Option<ConfirmedTx>> {
        let Some(location) = self.storage.transactions().get_location(txid)? else {
            return Ok(None);
        };
        let block = self
            .storage
            .blocks()
            .get_block(&location.block_hash)?
            .ok_or_else(|| anyhow::anyhow!("tx index points at a missing block"))?;
        let tx = block
            .transactions
            .get(location.index as usize)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("tx index points beyond block bounds"))?;
        Ok(Some(ConfirmedTx { tx, location }))
    }

    pub fn get_utxo(&self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        self.chain.read().unwrap().utxo().get(outpoint).cloned()
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.chain.read().unwrap().utxo().balance(address)
    }

    pub fn utxos(&self, address: &str) -> Vec<(OutPoint, UtxoEntry)> {
        self.chain.read().unwrap().utxo().utxos_of(address)
    }

    pub fn certificate(&self, id: &str) -> Option<Certificate> {
        self.chain.read().unwrap().ledger().certificate(id).cloned()
    }

    pub fn project(&self, id: &str) -> Option<Project> {
        self.chain.read().unwrap().ledger().project(id).cloned()
    }

    pub fn mempool_info(&self) -> MempoolInfo {
        self.mempool.lock().unwrap().info()
    }

    pub fn mempool_contains(&self, txid: &Hash) -> bool {
        self.mempool.lock().unwrap().contains(txid)
    }

    // ------------------------------------------------------------------
    // Submission surface
    // ------------------------------------------------------------------

    /// Parse and admit a serialized transaction.
    pub fn submit_tx(&self, bytes: &[u8]) -> std::result::Result<Hash, Rejection> {
        let tx = deserialize_tx(bytes).map_err(|e| Rejection::from(&e))?;
        self.submit_transaction(tx)
    }

    /// Admit a transaction object into the mempool.
    pub fn submit_transaction(&self, tx: Transaction) -> std::result::Result<Hash, Rejection> {
        let chain = self.chain.read().unwrap();
        let mut mempool = self.mempool.lock().unwrap();
        let outcome = mempool
            .insert(tx, &chain, current_timestamp())
            .map_err(|e| Rejection::from(&e))?;
        drop(mempool);
        drop(chain);

        for (txid, reason) in &outcome.evicted {
            self.events.publish(NodeEvent::TxEvicted {
                txid: *txid,
                reason: (*reason).to_string(),
            });
        }
        self.events
            .publish(NodeEvent::TxAdmitted { txid: outcome.txid });
        Ok(outcome.txid)
    }

    /// Parse and accept a serialized block.
    pub fn submit_block(&self, bytes: &[u8]) -> std::result::Result<BlockStatus, Rejection> {
        let block = deserialize_block(bytes).map_err(|e| Rejection::from(&e))?;
        self.submit_block_object(block)
    }

    /// Accept a block object: chain acceptance, then mempool maintenance
    /// and events for everything that changed.
    pub fn submit_block_object(&self, block: Block) -> std::result::Result<BlockStatus, Rejection> {
        let now = current_timestamp();
        let mut chain = self.chain.write().unwrap();
        let outcome = chain
            .accept_block(&block, now)
            .map_err(|e| Rejection::from(&e))?;

        // Mempool maintenance under both locks: disconnected transactions
        // re-enter first, then each connected block sweeps the pool.
        let mut mempool = self.mempool.lock().unwrap();
        let mut evicted = Vec::new();
        for (_, _, disconnected) in &outcome.disconnected {
            mempool.on_block_disconnected(disconnected, &chain, now);
        }
        for (_, _, connected) in &outcome.connected {
            evicted.extend(mempool.on_block_connected(connected, &chain));
        }
        drop(mempool);
        drop(chain);

        self.publish_outcome(&outcome, evicted);
        Ok(outcome.status)
    }

    fn publish_outcome(&self, outcome: &AcceptOutcome, evicted: Vec<(Hash, &'static str)>) {
        for (hash, height, _) in &outcome.disconnected {
            self.events.publish(NodeEvent::BlockDisconnected {
                hash: *hash,
                height: *height,
            });
        }
        for (hash, height, _) in &outcome.connected {
            self.events.publish(NodeEvent::BlockConnected {
                hash: *hash,
                height: *height,
            });
        }
        for (txid, reason) in evicted {
            self.events.publish(NodeEvent::TxEvicted {
                txid,
                reason: reason.to_string(),
            });
        }
    }

    // ------------------------------------------------------------------
    // Mining
    // ------------------------------------------------------------------

    /// Mine one block paying `miner_address` and submit it. Returns the
    /// block hash, or `None` if the miner was cancelled.
    pub fn mine_block(&self, miner_address: &str) -> Result<Option<Hash>> {
        let miner = Miner::new(self.config.mining.clone());
        self.mine_block_with(&miner, miner_address)
    }

    /// Mine with a caller-held [`Miner`], so the caller keeps the
    /// cancellation handle.
    pub fn mine_block_with(&self, miner: &Miner, miner_address: &str) -> Result<Option<Hash>> {
        let solved = miner
            .mine(&self.chain, &self.mempool, miner_address, current_timestamp())
            .map_err(|e| anyhow::anyhow!("mining failed: {e}"))?;
        let Some(block) = solved else {
            return Ok(None);
        };
        let hash = block.hash();
        self.submit_block_object(block)
            .map_err(|r| anyhow::anyhow!("solved block rejected: {} ({})", r.message, r.code))?;
        Ok(Some(hash))
    }
}
