//! The chain manager: the single writer over `{tip, UTXO, ledger}`.
//!
//! Owns the header tree with cumulative work, the active chain, the orphan
//! pool, and the live UTXO/ledger views. Blocks enter through
//! [`ChainManager::accept_block`]; the manager connects them to the tip,
//! parks them on side branches, holds them as orphans, or reorganises to a
//! heavier branch. Every connect persists its undo data so disconnects are
//! exact inverses.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::NetworkParams;
use crate::consensus::block::{check_block, check_header, connect_block};
use crate::consensus::constants::{MEDIAN_TIME_SPAN, ORPHAN_MAX_AGE, ORPHAN_POOL_MAX};
use crate::consensus::error::{ConsensusError, Result};
use crate::consensus::pow::{block_work, next_work_required, U256};
use crate::consensus::types::{Block, BlockHeader, Hash};
use crate::ledger::CertificateLedger;
use crate::storage::chainstate::ChainInfo;
use crate::storage::undostore::UndoData;
use crate::storage::Storage;
use crate::utxo::UtxoIndex;

/// A known header with its position and accumulated branch work.
#[derive(Debug, Clone)]
struct HeaderEntry {
    header: BlockHeader,
    height: u32,
    /// Cumulative work from genesis along this branch.
    work: U256,
}

/// The active tip as seen by readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTip {
    pub height: u32,
    pub hash: Hash,
    pub work: U256,
}

/// What became of an accepted block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Extended the active chain.
    Connected,
    /// Valid but on a branch with less work than the active one.
    SideChain,
    /// Parent unknown; parked in the orphan pool.
    Orphaned,
    /// Triggered a reorganisation to a heavier branch.
    Reorganized,
}

/// Result of [`ChainManager::accept_block`], carrying the blocks the
/// caller must feed to the mempool and event listeners.
#[derive(Debug, Clone)]
pub struct AcceptOutcome {
    pub status: BlockStatus,
    /// Blocks now part of the active chain, lowest height first. Includes
    /// orphans that connected on the back of this block.
    pub connected: Vec<(Hash, u32, Block)>,
    /// Blocks removed from the active chain, old tip first.
    pub disconnected: Vec<(Hash, u32, Block)>,
}

impl AcceptOutcome {
    fn new(status: BlockStatus) -> Self {
        AcceptOutcome {
            status,
            connected: Vec::new(),
            disconnected: Vec::new(),
        }
    }
}

/// Bounded pool of blocks whose parent has not arrived yet.
struct OrphanPool {
    by_parent: HashMap<Hash, Vec<Block>>,
    arrivals: HashMap<Hash, u64>,
    count: usize,
}

impl OrphanPool {
    fn new() -> Self {
        OrphanPool {
            by_parent: HashMap::new(),
            arrivals: HashMap::new(),
            count: 0,
        }
    }

    fn insert(&mut self, block: Block, now: u64) {
        let hash = block.hash();
        if self.arrivals.contains_key(&hash) {
            return;
        }
        self.prune(now);
        if self.count >= ORPHAN_POOL_MAX {
            debug!("orphan pool full, dropping incoming orphan");
            return;
        }
        self.arrivals.insert(hash, now);
        self.by_parent
            .entry(block.header.prev_hash)
            .or_default()
            .push(block);
        self.count += 1;
    }

    fn take_children(&mut self, parent: &Hash) -> Vec<Block> {
        let children = self.by_parent.remove(parent).unwrap_or_default();
        for child in &children {
            self.arrivals.remove(&child.hash());
            self.count -= 1;
        }
        children
    }

    fn prune(&mut self, now: u64) {
        let expired: Vec<Hash> = self
            .arrivals
            .iter()
            .filter(|(_, &at)| now.saturating_sub(at) > ORPHAN_MAX_AGE)
            .map(|(h, _)| *h)
            .collect();
        if expired.is_empty() {
            return;
        }
        for parent_children in self.by_parent.values_mut() {
            parent_children.retain(|b| !expired.contains(&b.hash()));
        }
        self.by_parent.retain(|_, v| !v.is_empty());
        for hash in expired {
            self.arrivals.remove(&hash);
            self.count -= 1;
        }
    }

    fn len(&self) -> usize {
        self.count
    }
}

pub struct ChainManager {
    params: NetworkParams,
    storage: Arc<Storage>,
    headers: HashMap<Hash, HeaderEntry>,
    /// Active chain, index = height.
    active: Vec<Hash>,
    utxo: UtxoIndex,
    ledger: CertificateLedger,
    orphans: OrphanPool,
}

impl ChainManager {
    /// Open the chain over existing storage, creating and connecting the
    /// genesis block on first run.
    pub fn open(params: NetworkParams, storage: Arc<Storage>) -> Result<Self> {
        let mut chain = ChainManager {
            params,
            storage,
            headers: HashMap::new(),
            active: Vec::new(),
            utxo: UtxoIndex::new(),
            ledger: CertificateLedger::new(),
            orphans: OrphanPool::new(),
        };
        if chain
            .storage
            .chain()
            .is_initialized()
            .map_err(integrity)?
        {
            chain.load()?;
        } else {
            chain.initialize_genesis()?;
        }
        Ok(chain)
    }

    fn initialize_genesis(&mut self) -> Result<()> {
        let genesis = self.params.genesis_block();
        let hash = genesis.hash();
        check_block(&self.params, &genesis)?;
        self.headers.insert(
            hash,
            HeaderEntry {
                header: genesis.header.clone(),
                height: 0,
                work: block_work(genesis.header.bits)?,
            },
        );
        self.connect_tip(&genesis, 0)?;
        info!(hash = %hex::encode(hash), "genesis block connected");
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let info = self
            .storage
            .chain()
            .load()
            .map_err(integrity)?
            .ok_or_else(|| ConsensusError::IntegrityFault("chain info missing".into()))?;

        let mut work = U256::ZERO;
        for height in 0..=info.height {
            let hash = self
                .storage
                .blocks()
                .get_hash_by_height(height)
                .map_err(integrity)?
                .ok_or_else(|| {
                    ConsensusError::IntegrityFault(format!("height index missing {}", height))
                })?;
            let header = self
                .storage
                .blocks()
                .get_header(&hash)
                .map_err(integrity)?
                .ok_or_else(|| {
                    ConsensusError::IntegrityFault(format!("header missing for height {}", height))
                })?;
            let (next, _) = work.overflowing_add(&block_work(header.bits)?);
            work = next;
            self.headers.insert(
                hash,
                HeaderEntry {
                    header,
                    height,
                    work,
                },
            );
            self.active.push(hash);
        }
        if *self.active.last().expect("nonempty chain") != info.tip_hash {
            return Err(ConsensusError::IntegrityFault(
                "height index disagrees with stored tip".into(),
            ));
        }

        self.utxo = self.storage.utxos().load_index().map_err(integrity)?;
        self.ledger = self.storage.ledger().load_ledger().map_err(integrity)?;
        info!(
            height = info.height,
            utxos = self.utxo.len(),
            certificates = self.ledger.certificate_count(),
            "chain state loaded"
        );
        Ok(())
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn utxo(&self) -> &UtxoIndex {
        &self.utxo
    }

    pub fn ledger(&self) -> &CertificateLedger {
        &self.ledger
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn tip(&self) -> ChainTip {
        let hash = *self.active.last().expect("chain always has genesis");
        let entry = &self.headers[&hash];
        ChainTip {
            height: entry.height,
            hash,
            work: entry.work,
        }
    }

    pub fn height(&self) -> u32 {
        (self.active.len() - 1) as u32
    }

    pub fn block_hash_at(&self, height: u32) -> Option<Hash> {
        self.active.get(height as usize).copied()
    }

    fn is_active(&self, hash: &Hash) -> bool {
        self.headers
            .get(hash)
            .map(|e| self.active.get(e.height as usize) == Some(hash))
            .unwrap_or(false)
    }

    /// Phase-A accept of a bare header: link to its parent, validate, and
    /// record cumulative work. Returns the header hash.
    pub fn accept_header(&mut self, header: &BlockHeader, now: u64) -> Result<Hash> {
        let hash = header.hash();
        if self.headers.contains_key(&hash) {
            return Ok(hash);
        }
        let parent = self
            .headers
            .get(&header.prev_hash)
            .cloned()
            .ok_or_else(|| ConsensusError::UnknownParent(hex::encode(header.prev_hash)))?;

        let height = parent.height + 1;
        let expected_bits = self.expected_bits(&parent)?;
        let prev_timestamps = self.branch_timestamps(&header.prev_hash);
        check_header(&self.params, header, &prev_timestamps, expected_bits, now)?;

        let (work, _) = parent.work.overflowing_add(&block_work(header.bits)?);
        self.headers.insert(
            hash,
            HeaderEntry {
                header: header.clone(),
                height,
                work,
            },
        );
        Ok(hash)
    }

    /// Required difficulty for the child of `parent`.
    fn expected_bits(&self, parent: &HeaderEntry) -> Result<u32> {
        let height = parent.height + 1;
        if height % self.params.retarget_interval != 0 {
            return Ok(parent.header.bits);
        }
        let window_start_height = height - self.params.retarget_interval;
        let start = self.ancestor_header(parent, window_start_height)?;
        next_work_required(
            &self.params,
            height,
            parent.header.bits,
            parent.header.timestamp,
            start.timestamp,
        )
    }

    /// Walk a branch back to the header at `target_height`.
    fn ancestor_header(&self, from: &HeaderEntry, target_height: u32) -> Result<BlockHeader> {
        let mut cursor = from.clone();
        while cursor.height > target_height {
            cursor = self
                .headers
                .get(&cursor.header.prev_hash)
                .cloned()
                .ok_or_else(|| {
                    ConsensusError::IntegrityFault("header ancestry broken".into())
                })?;
        }
        Ok(cursor.header)
    }

    /// Timestamps of up to [`MEDIAN_TIME_SPAN`] ancestors ending at
    /// `branch_tip`, oldest first.
    fn branch_timestamps(&self, branch_tip: &Hash) -> Vec<u32> {
        let mut timestamps = Vec::with_capacity(MEDIAN_TIME_SPAN);
        let mut cursor = *branch_tip;
        for _ in 0..MEDIAN_TIME_SPAN {
            let Some(entry) = self.headers.get(&cursor) else {
                break;
            };
            timestamps.push(entry.header.timestamp);
            if entry.height == 0 {
                break;
            }
            cursor = entry.header.prev_hash;
        }
        timestamps.reverse();
        timestamps
    }

    /// Accept a full block: phase B, phase A on the header, then connect,
    /// park, or reorganise. Orphans of the newly extended tip are retried.
    pub fn accept_block(&mut self, block: &Block, now: u64) -> Result<AcceptOutcome> {
        let hash = block.hash();
        if self.storage.blocks().has_block(&hash).map_err(integrity)? {
            return Err(ConsensusError::AlreadyKnown);
        }

        if !self.headers.contains_key(&block.header.prev_hash) {
            debug!(hash = %hex::encode(hash), "parent unknown, holding as orphan");
            self.orphans.insert(block.clone(), now);
            return Ok(AcceptOutcome::new(BlockStatus::Orphaned));
        }

        check_block(&self.params, block)?;
        self.accept_header(&block.header, now)?;
        self.storage.blocks().store_block(block).map_err(integrity)?;

        let entry = self.headers[&hash].clone();
        let tip = self.tip();

        let mut outcome = if block.header.prev_hash == tip.hash {
            if let Err(e) = self.connect_tip(block, entry.height) {
                // An invalid block must not linger in the store or the
                // header tree.
                self.headers.remove(&hash);
                let _ = self.storage.blocks().remove_block(&hash);
                return Err(e);
            }
            let mut outcome = AcceptOutcome::new(BlockStatus::Connected);
            outcome.connected.push((hash, entry.height, block.clone()));
            outcome
        } else if entry.work > tip.work {
            let (disconnected, connected) = self.reorganize_to(&hash)?;
            let mut outcome = AcceptOutcome::new(BlockStatus::Reorganized);
            outcome.disconnected = disconnected;
            outcome.connected = connected;
            outcome
        } else {
            debug!(hash = %hex::encode(hash), "block parked on side branch");
            AcceptOutcome::new(BlockStatus::SideChain)
        };

        // A new tip may be the missing parent of parked orphans.
        self.retry_orphans(&mut outcome, now)?;
        Ok(outcome)
    }

    fn retry_orphans(&mut self, outcome: &mut AcceptOutcome, now: u64) -> Result<()> {
        let mut parents: Vec<Hash> = outcome
            .connected
            .iter()
            .map(|(hash, _, _)| *hash)
            .collect();
        while let Some(parent) = parents.pop() {
            for orphan in self.orphans.take_children(&parent) {
                match self.accept_block(&orphan, now) {
                    Ok(child_outcome) => {
                        parents.extend(child_outcome.connected.iter().map(|(h, _, _)| *h));
                        outcome.connected.extend(child_outcome.connected);
                        outcome.disconnected.extend(child_outcome.disconnected);
                    }
                    Err(e) => {
                        warn!(error = %e, "parked orphan failed validation, dropped");
                    }
                }
            }
        }
        Ok(())
    }

    /// Phase C plus atomic state application, persistence, and tip advance.
    fn connect_tip(&mut self, block: &Block, height: u32) -> Result<()> {
        let hash = block.hash();
        let outcome = connect_block(&self.params, block, height, &self.utxo, &self.ledger)?;

        self.utxo.apply(&outcome.diff)?;
        if let Err(e) = self.ledger.apply(&outcome.delta) {
            // Roll the UTXO half back so memory stays consistent before
            // surfacing the fault.
            let _ = self.utxo.undo(&outcome.diff);
            return Err(e);
        }

        let undo = UndoData {
            diff: outcome.diff,
            delta: outcome.delta,
            total_fees: outcome.total_fees,
        };
        self.persist_connect(block, &hash, height, &undo)?;
        self.active.push(hash);
        info!(
            height,
            hash = %hex::encode(hash),
            txs = block.transactions.len(),
            fees = undo.total_fees,
            "block connected"
        );
        Ok(())
    }

    fn persist_connect(
        &mut self,
        block: &Block,
        hash: &Hash,
        height: u32,
        undo: &UndoData,
    ) -> Result<()> {
        let storage = &self.storage;
        storage.blocks().store_block(block).map_err(integrity)?;
        storage.blocks().store_height(height, hash).map_err(integrity)?;
        for (index, tx) in block.transactions.iter().enumerate() {
            storage
                .transactions()
                .index_transaction(&tx.txid(), hash, height, index as u32)
                .map_err(integrity)?;
        }
        storage.utxos().apply(&undo.diff).map_err(integrity)?;
        storage
            .ledger()
            .write_touched(&self.ledger, &undo.delta)
            .map_err(integrity)?;
        storage.undo().put(hash, undo).map_err(integrity)?;

        let entry = &self.headers[hash];
        storage
            .chain()
            .store(&ChainInfo {
                tip_hash: *hash,
                height,
                total_work: entry.work.to_le_bytes(),
                genesis_hash: *self.active.first().unwrap_or(hash),
            })
            .map_err(integrity)?;
        storage.flush().map_err(integrity)?;
        Ok(())
    }

    /// Disconnect the active tip, restoring the previous UTXO and ledger
    /// state. Returns the disconnected block.
    pub fn disconnect_tip(&mut self) -> Result<Block> {
        if self.active.len() <= 1 {
            return Err(ConsensusError::IntegrityFault(
                "cannot disconnect genesis".into(),
            ));
        }
        let hash = *self.active.last().expect("nonempty");
        let height = (self.active.len() - 1) as u32;
        let block = self
            .storage
            .blocks()
            .get_block(&hash)
            .map_err(integrity)?
            .ok_or_else(|| ConsensusError::IntegrityFault("tip block body missing".into()))?;
        let undo = self
            .storage
            .undo()
            .get(&hash)
            .map_err(integrity)?
            .ok_or_else(|| ConsensusError::IntegrityFault("tip undo data missing".into()))?;

        // Ledger first, then UTXO: the reverse of connect order.
        self.ledger.undo(&undo.delta)?;
        self.utxo.undo(&undo.diff)?;

        let storage = &self.storage;
        storage.blocks().remove_height(height).map_err(integrity)?;
        for tx in &block.transactions {
            storage.transactions().remove(&tx.txid()).map_err(integrity)?;
        }
        storage.utxos().undo(&undo.diff).map_err(integrity)?;
        storage
            .ledger()
            .write_touched(&self.ledger, &undo.delta)
            .map_err(integrity)?;
        storage.undo().remove(&hash).map_err(integrity)?;

        self.active.pop();
        let new_tip = self.tip();
        storage
            .chain()
            .store(&ChainInfo {
                tip_hash: new_tip.hash,
                height: new_tip.height,
                total_work: new_tip.work.to_le_bytes(),
                genesis_hash: self.active[0],
            })
            .map_err(integrity)?;
        storage.flush().map_err(integrity)?;

        info!(height, hash = %hex::encode(hash), "block disconnected");
        Ok(block)
    }

    /// Switch the active chain to the branch ending at `target`.
    ///
    /// Transactional: if any connect along the new branch fails, the new
    /// blocks are disconnected, the old branch is reconnected, and the
    /// failing branch's headers are discarded.
    fn reorganize_to(
        &mut self,
        target: &Hash,
    ) -> Result<(Vec<(Hash, u32, Block)>, Vec<(Hash, u32, Block)>)> {
        // Collect the new branch back to the fork point.
        let mut branch: Vec<Hash> = Vec::new();
        let mut cursor = *target;
        while !self.is_active(&cursor) {
            let entry = self.headers.get(&cursor).ok_or_else(|| {
                ConsensusError::IntegrityFault("reorg target ancestry broken".into())
            })?;
            branch.push(cursor);
            cursor = entry.header.prev_hash;
        }
        branch.reverse();
        let fork = cursor;

        // Every branch block body must be on hand before touching state.
        let mut bodies = Vec::with_capacity(branch.len());
        for hash in &branch {
            let block = self
                .storage
                .blocks()
                .get_block(hash)
                .map_err(integrity)?
                .ok_or_else(|| {
                    ConsensusError::IntegrityFault("side branch block body missing".into())
                })?;
            bodies.push(block);
        }

        info!(
            depth = self.height() - self.headers[&fork].height,
            new_blocks = branch.len(),
            "reorganising to heavier branch"
        );

        // Disconnect down to the fork, old tip first.
        let mut disconnected = Vec::new();
        while *self.active.last().expect("nonempty") != fork {
            let height = (self.active.len() - 1) as u32;
            let block = self.disconnect_tip()?;
            disconnected.push((block.hash(), height, block));
        }

        // Connect the new branch.
        let mut connected = Vec::new();
        for (position, (hash, block)) in branch.iter().zip(bodies).enumerate() {
            let height = self.headers[hash].height;
            match self.connect_tip(&block, height) {
                Ok(()) => connected.push((*hash, height, block)),
                Err(e) => {
                    warn!(error = %e, "reorg connect failed, reverting");
                    self.revert_reorg(&fork, &disconnected)?;
                    // The failing block and everything past it are dead;
                    // the valid prefix stays known as a side branch.
                    self.discard_branch(&branch[position..]);
                    let _ = self.storage.blocks().remove_block(hash);
                    return Err(e);
                }
            }
        }
        Ok((disconnected, connected))
    }

    /// Undo a half-done reorg: strip the partially connected branch and
    /// reconnect the original blocks. The originals validated before, so a
    /// failure here is a genuine integrity fault.
    fn revert_reorg(&mut self, fork: &Hash, originals: &[(Hash, u32, Block)]) -> Result<()> {
        while *self.active.last().expect("nonempty") != *fork {
            self.disconnect_tip()?;
        }
        for (_, height, block) in originals.iter().rev() {
            self.connect_tip(block, *height)?;
        }
        Ok(())
    }

    fn discard_branch(&mut self, branch: &[Hash]) {
        for hash in branch {
            self.headers.remove(hash);
        }
    }

    /// Difficulty the next block on the active chain must carry.
    pub fn next_bits(&self) -> Result<u32> {
        let tip = self.tip();
        let entry = self.headers[&tip.hash].clone();
        self.expected_bits(&entry)
    }

    /// Timestamps of the most recent active headers, oldest first, for
    /// median-time-past calculations.
    pub fn tip_timestamps(&self) -> Vec<u32> {
        self.branch_timestamps(&self.tip().hash)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>> {
        self.storage.blocks().get_block(hash).map_err(integrity)
    }

    pub fn get_block_by_height(&self, height: u32) -> Result<Option<Block>> {
        match self.block_hash_at(height) {
            Some(hash) => self.get_block_by_hash(&hash),
            None => Ok(None),
        }
    }

    pub fn get_header(&self, hash: &Hash) -> Option<&BlockHeader> {
        self.headers.get(hash).map(|e| &e.header)
    }
}

fn integrity(err: anyhow::Error) -> ConsensusError {
    ConsensusError::IntegrityFault(err.to_string())
}
