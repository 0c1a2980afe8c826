//! Block template assembly and proof-of-work search.
//!
//! Templates drain the mempool in priority order (parents before children)
//! under the block limits, prepend a coinbase paying subsidy plus fees, and
//! search the nonce space. On nonce exhaustion the coinbase extra-nonce is
//! bumped and the merkle root rebuilt. The search observes a cancellation
//! flag between nonce batches and aborts when the chain tip moves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info};

use crate::chain::ChainManager;
use crate::config::{MiningConfig, NetworkParams};
use crate::consensus::constants::subsidy;
use crate::consensus::error::Result;
use crate::consensus::merkle::merkle_root;
use crate::consensus::pow::{check_proof_of_work, median_time_past};
use crate::consensus::types::{
    Block, BlockHeader, CoinbaseTag, Hash, OutPoint, Transaction, TxInput, TxKind, TxOutput,
};
use crate::node::mempool::Mempool;

/// A candidate block with its construction context.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub block: Block,
    pub height: u32,
    pub total_fees: u64,
}

/// Bytes reserved in the template for the header and coinbase.
const TEMPLATE_RESERVE_BYTES: usize = 2048;

fn build_coinbase(
    params: &NetworkParams,
    miner_address: &str,
    height: u32,
    total_fees: u64,
    timestamp: u32,
    extra_nonce: u64,
) -> Transaction {
    Transaction {
        version: 1,
        kind: TxKind::Coinbase,
        inputs: vec![TxInput::unsigned(OutPoint::null())],
        outputs: vec![TxOutput::spendable(
            subsidy(height) + total_fees,
            miner_address,
        )],
        timestamp,
        metadata: serde_json::to_vec(&CoinbaseTag {
            height,
            extra_nonce: Some(extra_nonce),
            message: None,
        })
        .expect("coinbase tag serializes"),
    }
}

/// Assemble a template on the current tip.
pub fn build_template(
    chain: &ChainManager,
    mempool: &Mempool,
    config: &MiningConfig,
    miner_address: &str,
    now: u64,
) -> Result<BlockTemplate> {
    let params = chain.params();
    let tip = chain.tip();
    let height = tip.height + 1;
    let bits = chain.next_bits()?;

    let mtp = median_time_past(&chain.tip_timestamps());
    let timestamp = (now as u32).max(mtp + 1);

    let max_txs = params.max_block_txs.min(config.template_max_txs).saturating_sub(1);
    let byte_budget = params.max_block_bytes.saturating_sub(TEMPLATE_RESERVE_BYTES);
    let selected = mempool.select_for_block(max_txs, byte_budget);
    let total_fees = mempool.fees_of(&selected);

    let coinbase = build_coinbase(params, miner_address, height, total_fees, timestamp, 0);
    let mut transactions = Vec::with_capacity(selected.len() + 1);
    transactions.push(coinbase);
    transactions.extend(selected);

    let txids: Vec<Hash> = transactions.iter().map(Transaction::txid).collect();
    let block = Block {
        header: BlockHeader {
            version: 1,
            prev_hash: tip.hash,
            merkle_root: merkle_root(&txids),
            timestamp,
            bits,
            nonce: 0,
        },
        transactions,
    };
    debug!(
        height,
        txs = block.transactions.len(),
        fees = total_fees,
        "block template assembled"
    );
    Ok(BlockTemplate {
        block,
        height,
        total_fees,
    })
}

/// The proof-of-work searcher. Cancellable between nonce batches; restarts
/// its template whenever the tip advances under it.
pub struct Miner {
    config: MiningConfig,
    cancel: Arc<AtomicBool>,
}

impl Miner {
    pub fn new(config: MiningConfig) -> Self {
        Miner {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag for cancelling from another thread.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Mine one block on the current tip. Returns `None` when cancelled.
    ///
    /// Locks are held only while building templates and sampling the tip;
    /// the hash search itself runs lock-free.
    pub fn mine(
        &self,
        chain: &RwLock<ChainManager>,
        mempool: &Mutex<Mempool>,
        miner_address: &str,
        now: u64,
    ) -> Result<Option<Block>> {
        'template: loop {
            if self.is_cancelled() {
                return Ok(None);
            }
            let (params, template) = {
                let chain = chain.read().unwrap();
                let mempool = mempool.lock().unwrap();
                let template =
                    build_template(&chain, &mempool, &self.config, miner_address, now)?;
                (chain.params().clone(), template)
            };
            let parent = template.block.header.prev_hash;
            let mut block = template.block;
            let mut extra_nonce: u64 = 0;

            loop {
                for _ in 0..self.config.nonce_batch {
                    if check_proof_of_work(&params, &block.header).is_ok() {
                        info!(
                            height = template.height,
                            nonce = block.header.nonce,
                            extra_nonce,
                            "block solved"
                        );
                        return Ok(Some(block));
                    }
                    match block.header.nonce.checked_add(1) {
                        Some(next) => block.header.nonce = next,
                        None => {
                            // Nonce space exhausted: roll the coinbase
                            // extra-nonce and rebuild the merkle root.
                            extra_nonce += 1;
                            block.transactions[0] = build_coinbase(
                                &params,
                                miner_address,
                                template.height,
                                template.total_fees,
                                block.transactions[0].timestamp,
                                extra_nonce,
                            );
                            let txids: Vec<Hash> =
                                block.transactions.iter().map(Transaction::txid).collect();
                            block.header.merkle_root = merkle_root(&txids);
                            block.header.nonce = 0;
                        }
                    }
                }
                if self.is_cancelled() {
                    return Ok(None);
                }
                if chain.read().unwrap().tip().hash != parent {
                    debug!("tip advanced during search, rebuilding template");
                    continue 'template;
                }
            }
        }
    }
}
