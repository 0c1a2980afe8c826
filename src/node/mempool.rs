//! The mempool: admitted, unconfirmed transactions awaiting inclusion.
//!
//! A map from txid to entry plus a priority index ordered by ancestor fee
//! rate (descending). Admission runs phase B, resolves inputs against the
//! UTXO index and in-pool parents, verifies signatures, enforces relay fee
//! policy and certificate headroom, and applies replace-by-fee on
//! conflicts. Capacity pressure evicts the lowest-priority entries.
//!
//! Callers serialise access: the node holds the mempool mutex, and block
//! connect holds it across the whole re-validation pass.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::chain::ChainManager;
use crate::consensus::economic::fee_rate;
use crate::consensus::error::{ConsensusError, Result};
use crate::consensus::transaction::{check_transaction, verify_input_signatures};
use crate::consensus::types::{Block, CoinState, Hash, OutPoint, Transaction, TxKind};
use crate::config::MempoolConfig;
use crate::ledger::CertificateIssuance;

/// A pooled transaction with its fee accounting.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub txid: Hash,
    pub fee: u64,
    pub size: usize,
    pub fee_rate: u64,
    pub ancestor_fee_rate: u64,
    pub arrival: u64,
}

/// Why an entry left the pool, surfaced through `tx_evicted` events.
pub const EVICT_REPLACED: &str = "replaced";
pub const EVICT_CAPACITY: &str = "capacity";
pub const EVICT_BLOCK_CONFLICT: &str = "conflicts with connected block";
pub const EVICT_INVALIDATED: &str = "no longer valid against chain state";

/// Result of a successful admission.
#[derive(Debug, Clone, Default)]
pub struct AdmitOutcome {
    pub txid: Hash,
    /// Entries evicted to make way, with reasons.
    pub evicted: Vec<(Hash, &'static str)>,
}

/// Snapshot for the `mempool_info` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MempoolInfo {
    pub transaction_count: usize,
    pub total_bytes: usize,
    pub min_fee: u64,
    pub min_fee_rate: u64,
}

pub struct Mempool {
    config: MempoolConfig,
    entries: HashMap<Hash, MempoolEntry>,
    /// Outpoint -> txid of the pooled spender.
    spenders: HashMap<OutPoint, Hash>,
    /// Certificate ids claimed by pooled issuances.
    cert_claims: HashMap<String, Hash>,
    /// Pending compensation per certificate, to stop pool-level overbooking.
    pending_compensation: HashMap<String, u64>,
    /// Priority index: ancestor fee rate descending.
    by_priority: BTreeMap<Reverse<u64>, Vec<Hash>>,
    total_bytes: usize,
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Mempool {
            config,
            entries: HashMap::new(),
            spenders: HashMap::new(),
            cert_claims: HashMap::new(),
            pending_compensation: HashMap::new(),
            by_priority: BTreeMap::new(),
            total_bytes: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, txid: &Hash) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    pub fn info(&self) -> MempoolInfo {
        MempoolInfo {
            transaction_count: self.entries.len(),
            total_bytes: self.total_bytes,
            min_fee: self.config.min_fee,
            min_fee_rate: self.config.min_fee_rate,
        }
    }

    /// Admit a transaction. On success the outcome lists anything evicted
    /// to make way (RBF losers, capacity victims). On failure the pool is
    /// untouched.
    pub fn insert(
        &mut self,
        tx: Transaction,
        chain: &ChainManager,
        now: u64,
    ) -> Result<AdmitOutcome> {
        let txid = tx.txid();
        if self.entries.contains_key(&txid) {
            return Err(ConsensusError::AlreadyKnown);
        }
        if tx.is_coinbase() {
            return Err(ConsensusError::KindConstraint(
                "coinbase transactions are mined, not relayed".into(),
            ));
        }
        check_transaction(chain.params(), &tx)?;

        // Conflicts with pooled spenders of the same outpoints.
        let mut conflicts: HashSet<Hash> = HashSet::new();
        for input in &tx.inputs {
            if let Some(spender) = self.spenders.get(&input.prevout) {
                conflicts.insert(*spender);
            }
        }
        let replaced = self.collect_with_descendants(conflicts.iter().copied());

        let checked = self.validate_against_chain(&tx, chain, &replaced)?;

        // Replace-by-fee: strictly more fee than the whole replaced set,
        // plus the incremental relay cost of the new transaction.
        if !replaced.is_empty() {
            let replaced_fees: u64 = replaced
                .iter()
                .filter_map(|h| self.entries.get(h))
                .map(|e| e.fee)
                .sum();
            let required = replaced_fees
                .saturating_add(self.config.min_fee_rate * checked.size as u64);
            if checked.fee <= replaced_fees || checked.fee < required {
                return Err(ConsensusError::RbfUnderbid);
            }
        }

        // Capacity: pick victims from the bottom of the priority index
        // before mutating anything, so a full pool rejects atomically. The
        // incoming transaction competes on the same footing and may not
        // evict its own ancestors.
        let ancestor_fee_rate = self.ancestor_fee_rate(&tx, checked.fee, checked.size);
        let new_ancestors = self.pooled_ancestors(&tx);
        let victims = self.pick_capacity_victims(
            checked.size,
            ancestor_fee_rate,
            &replaced,
            &new_ancestors,
        )?;

        let mut outcome = AdmitOutcome {
            txid,
            evicted: Vec::new(),
        };
        for hash in &replaced {
            if self.remove_entry(hash).is_some() {
                outcome.evicted.push((*hash, EVICT_REPLACED));
            }
        }
        for hash in &victims {
            if self.remove_entry(hash).is_some() {
                outcome.evicted.push((*hash, EVICT_CAPACITY));
            }
        }

        let entry = MempoolEntry {
            txid,
            fee: checked.fee,
            size: checked.size,
            fee_rate: fee_rate(checked.fee, checked.size),
            ancestor_fee_rate,
            arrival: now,
            tx,
        };
        self.index_entry(entry);
        debug!(txid = %hex::encode(txid), "transaction admitted to mempool");
        Ok(outcome)
    }

    /// Stateful checks shared by admission and re-validation. `ignoring`
    /// names pooled transactions treated as absent (an RBF replacement
    /// cannot depend on what it evicts).
    fn validate_against_chain(
        &self,
        tx: &Transaction,
        chain: &ChainManager,
        ignoring: &HashSet<Hash>,
    ) -> Result<CheckedTx> {
        let mut input_total: u64 = 0;
        let mut addresses = Vec::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            let output = match chain.utxo().get(&input.prevout) {
                Some(entry) => entry.output.clone(),
                None => self
                    .pool_output(&input.prevout, ignoring)
                    .ok_or_else(|| ConsensusError::UnknownUtxo(input.prevout.to_string()))?,
            };
            let permitted = match output.coin_state {
                CoinState::Spendable => tx.kind != TxKind::AssignCompensation,
                CoinState::Certified => tx.kind == TxKind::AssignCompensation,
                CoinState::Compensated => false,
            };
            if !permitted {
                return Err(ConsensusError::CoinStateForbidden);
            }
            if tx.kind == TxKind::AssignCompensation {
                let target = tx.outputs[0].certificate_id.as_deref();
                if output.certificate_id.as_deref() != target {
                    return Err(ConsensusError::KindConstraint(
                        "compensation inputs must share the target certificate".into(),
                    ));
                }
            }
            input_total = input_total
                .checked_add(output.amount)
                .ok_or(ConsensusError::BadAmount)?;
            addresses.push(output.address);
        }

        verify_input_signatures(chain.params(), tx, &addresses)?;

        let output_total = tx.total_output();
        if input_total < output_total {
            return Err(ConsensusError::InsufficientInputs);
        }
        let fee = input_total - output_total;
        let size = tx.size();
        if fee < self.config.min_fee || fee_rate(fee, size) < self.config.min_fee_rate {
            return Err(ConsensusError::FeeTooLow);
        }

        self.check_certificate_rules(tx, chain, ignoring)?;
        Ok(CheckedTx { fee, size })
    }

    fn check_certificate_rules(
        &self,
        tx: &Transaction,
        chain: &ChainManager,
        ignoring: &HashSet<Hash>,
    ) -> Result<()> {
        match tx.kind {
            TxKind::AssignCert => {
                let issuance = CertificateIssuance::from_tx(tx)?;
                let id = issuance.certificate_id;
                if chain.ledger().contains_certificate(&id) {
                    return Err(ConsensusError::CertIdReused(id));
                }
                if let Some(claimant) = self.cert_claims.get(&id) {
                    if !ignoring.contains(claimant) {
                        return Err(ConsensusError::CertIdReused(id));
                    }
                }
                Ok(())
            }
            TxKind::AssignCompensation => {
                let id = tx.outputs[0]
                    .certificate_id
                    .as_deref()
                    .expect("compensation outputs carry an id");
                self.check_headroom(id, tx.total_output(), chain, ignoring)
            }
            TxKind::Burn => {
                for output in &tx.outputs {
                    if let Some(id) = &output.certificate_id {
                        self.check_headroom(id, output.amount, chain, ignoring)?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Committed headroom minus what the pool already promises to retire.
    fn check_headroom(
        &self,
        id: &str,
        amount: u64,
        chain: &ChainManager,
        ignoring: &HashSet<Hash>,
    ) -> Result<()> {
        let cert = chain
            .ledger()
            .certificate(id)
            .ok_or_else(|| ConsensusError::CertUnknown(id.to_string()))?;
        let mut pending = self.pending_compensation.get(id).copied().unwrap_or(0);
        for ignored in ignoring {
            if let Some(entry) = self.entries.get(ignored) {
                pending = pending.saturating_sub(compensation_amount(&entry.tx, id));
            }
        }
        if pending.saturating_add(amount) > cert.remaining() {
            return Err(ConsensusError::CertOvercompensated(id.to_string()));
        }
        Ok(())
    }

    /// Output of a pooled parent, unless that parent is being ignored.
    fn pool_output(&self, outpoint: &OutPoint, ignoring: &HashSet<Hash>) -> Option<crate::consensus::types::TxOutput> {
        if ignoring.contains(&outpoint.txid) {
            return None;
        }
        let parent = self.entries.get(&outpoint.txid)?;
        parent.tx.outputs.get(outpoint.index as usize).cloned()
    }

    /// A set of txids plus everything in the pool that descends from them.
    fn collect_with_descendants(&self, roots: impl IntoIterator<Item = Hash>) -> HashSet<Hash> {
        let mut result: HashSet<Hash> = HashSet::new();
        let mut queue: Vec<Hash> = roots.into_iter().collect();
        while let Some(hash) = queue.pop() {
            if !self.entries.contains_key(&hash) || !result.insert(hash) {
                continue;
            }
            let parent = &self.entries[&hash];
            for index in 0..parent.tx.outputs.len() {
                let outpoint = OutPoint {
                    txid: hash,
                    index: index as u32,
                };
                if let Some(child) = self.spenders.get(&outpoint) {
                    queue.push(*child);
                }
            }
        }
        result
    }

    /// Fee rate over the transaction and its pooled ancestors.
    fn ancestor_fee_rate(&self, tx: &Transaction, fee: u64, size: usize) -> u64 {
        let mut total_fee = fee;
        let mut total_size = size;
        let mut seen: HashSet<Hash> = HashSet::new();
        let mut queue: Vec<Hash> = tx.inputs.iter().map(|i| i.prevout.txid).collect();
        while let Some(hash) = queue.pop() {
            if !seen.insert(hash) {
                continue;
            }
            if let Some(parent) = self.entries.get(&hash) {
                total_fee = total_fee.saturating_add(parent.fee);
                total_size = total_size.saturating_add(parent.size);
                queue.extend(parent.tx.inputs.iter().map(|i| i.prevout.txid));
            }
        }
        fee_rate(total_fee, total_size)
    }

    /// Pooled ancestors of a transaction (txids only).
    fn pooled_ancestors(&self, tx: &Transaction) -> HashSet<Hash> {
        let mut ancestors = HashSet::new();
        let mut queue: Vec<Hash> = tx.inputs.iter().map(|i| i.prevout.txid).collect();
        while let Some(hash) = queue.pop() {
            if let Some(parent) = self.entries.get(&hash) {
                if ancestors.insert(hash) {
                    queue.extend(parent.tx.inputs.iter().map(|i| i.prevout.txid));
                }
            }
        }
        ancestors
    }

    /// Choose lowest-priority entries (with their descendants) to make room
    /// for an incoming transaction, without mutating the pool. Errors with
    /// `MempoolFull` when the incoming transaction would itself be the
    /// weakest, or when room could only come from its own ancestors.
    fn pick_capacity_victims(
        &self,
        incoming_size: usize,
        incoming_rate: u64,
        replaced: &HashSet<Hash>,
        protected: &HashSet<Hash>,
    ) -> Result<HashSet<Hash>> {
        let replaced_bytes: usize = replaced
            .iter()
            .filter_map(|h| self.entries.get(h))
            .map(|e| e.size)
            .sum();
        let mut projected_len = self.entries.len() - replaced.len() + 1;
        let mut projected_bytes = self.total_bytes - replaced_bytes + incoming_size;
        let mut victims: HashSet<Hash> = HashSet::new();

        let fits = |len: usize, bytes: usize| {
            len <= self.config.max_transactions && bytes <= self.config.max_bytes
        };
        if fits(projected_len, projected_bytes) {
            return Ok(victims);
        }

        // Reversed index order walks ancestor fee rates from the bottom.
        for (_, bucket) in self.by_priority.iter().rev() {
            for candidate in bucket {
                if victims.contains(candidate) || replaced.contains(candidate) {
                    continue;
                }
                let entry = &self.entries[candidate];
                if entry.ancestor_fee_rate >= incoming_rate {
                    return Err(ConsensusError::MempoolFull);
                }
                for victim in self.collect_with_descendants([*candidate]) {
                    if protected.contains(&victim) {
                        return Err(ConsensusError::MempoolFull);
                    }
                    if replaced.contains(&victim) || !victims.insert(victim) {
                        continue;
                    }
                    let size = self.entries[&victim].size;
                    projected_len -= 1;
                    projected_bytes -= size;
                }
                if fits(projected_len, projected_bytes) {
                    return Ok(victims);
                }
            }
        }
        Err(ConsensusError::MempoolFull)
    }

    fn index_entry(&mut self, entry: MempoolEntry) {
        for input in &entry.tx.inputs {
            self.spenders.insert(input.prevout.clone(), entry.txid);
        }
        if entry.tx.kind == TxKind::AssignCert {
            if let Ok(issuance) = CertificateIssuance::from_tx(&entry.tx) {
                self.cert_claims.insert(issuance.certificate_id, entry.txid);
            }
        }
        for (id, amount) in compensation_amounts(&entry.tx) {
            *self.pending_compensation.entry(id).or_insert(0) += amount;
        }
        self.total_bytes += entry.size;
        self.by_priority
            .entry(Reverse(entry.ancestor_fee_rate))
            .or_default()
            .push(entry.txid);
        self.entries.insert(entry.txid, entry);
    }

    /// Remove one entry and unwind its indices. Descendant handling is the
    /// caller's concern.
    pub fn remove_entry(&mut self, txid: &Hash) -> Option<MempoolEntry> {
        let entry = self.entries.remove(txid)?;
        for input in &entry.tx.inputs {
            if self.spenders.get(&input.prevout) == Some(txid) {
                self.spenders.remove(&input.prevout);
            }
        }
        if entry.tx.kind == TxKind::AssignCert {
            if let Ok(issuance) = CertificateIssuance::from_tx(&entry.tx) {
                if self.cert_claims.get(&issuance.certificate_id) == Some(txid) {
                    self.cert_claims.remove(&issuance.certificate_id);
                }
            }
        }
        for (id, amount) in compensation_amounts(&entry.tx) {
            if let Some(pending) = self.pending_compensation.get_mut(&id) {
                *pending = pending.saturating_sub(amount);
                if *pending == 0 {
                    self.pending_compensation.remove(&id);
                }
            }
        }
        self.total_bytes -= entry.size;
        if let Some(bucket) = self.by_priority.get_mut(&Reverse(entry.ancestor_fee_rate)) {
            bucket.retain(|h| h != txid);
            if bucket.is_empty() {
                self.by_priority.remove(&Reverse(entry.ancestor_fee_rate));
            }
        }
        Some(entry)
    }

    /// Block connected: drop included transactions, evict conflicts, and
    /// re-validate everything left against the new chain state.
    pub fn on_block_connected(
        &mut self,
        block: &Block,
        chain: &ChainManager,
    ) -> Vec<(Hash, &'static str)> {
        let mut evicted = Vec::new();

        for tx in &block.transactions {
            self.remove_entry(&tx.txid());
        }

        // Pooled spenders of outpoints the block consumed are now double
        // spends; they go, descendants included.
        let mut conflicts: HashSet<Hash> = HashSet::new();
        for tx in block.transactions.iter().skip(1) {
            for input in &tx.inputs {
                if let Some(spender) = self.spenders.get(&input.prevout) {
                    conflicts.insert(*spender);
                }
            }
        }
        for victim in self.collect_with_descendants(conflicts) {
            if self.remove_entry(&victim).is_some() {
                evicted.push((victim, EVICT_BLOCK_CONFLICT));
            }
        }

        self.revalidate(chain, &mut evicted);
        self.rebuild_priorities();
        evicted
    }

    /// Block disconnected: its transactions compete for readmission under
    /// the normal rules.
    pub fn on_block_disconnected(
        &mut self,
        block: &Block,
        chain: &ChainManager,
        now: u64,
    ) -> Vec<Hash> {
        let mut admitted = Vec::new();
        for tx in block.transactions.iter().skip(1) {
            match self.insert(tx.clone(), chain, now) {
                Ok(outcome) => admitted.push(outcome.txid),
                Err(e) => {
                    debug!(error = %e, "disconnected transaction not readmitted");
                }
            }
        }
        admitted
    }

    /// Drop entries that no longer validate against the current chain
    /// state; removing one can invalidate its descendants, so iterate to a
    /// fixed point.
    fn revalidate(&mut self, chain: &ChainManager, evicted: &mut Vec<(Hash, &'static str)>) {
        let ignoring = HashSet::new();
        loop {
            let mut dropped = Vec::new();
            for (txid, entry) in &self.entries {
                if self
                    .validate_against_chain(&entry.tx, chain, &ignoring)
                    .is_err()
                {
                    dropped.push(*txid);
                }
            }
            if dropped.is_empty() {
                return;
            }
            for victim in self.collect_with_descendants(dropped) {
                if self.remove_entry(&victim).is_some() {
                    evicted.push((victim, EVICT_INVALIDATED));
                }
            }
        }
    }

    fn rebuild_priorities(&mut self) {
        let rates: Vec<(Hash, u64)> = self
            .entries
            .values()
            .map(|e| (e.txid, self.ancestor_fee_rate(&e.tx, e.fee, e.size)))
            .collect();
        self.by_priority.clear();
        for (txid, rate) in rates {
            if let Some(entry) = self.entries.get_mut(&txid) {
                entry.ancestor_fee_rate = rate;
            }
            self.by_priority.entry(Reverse(rate)).or_default().push(txid);
        }
    }

    /// Select transactions for a block template: priority order, parents
    /// before children, within the byte budget.
    pub fn select_for_block(&self, max_txs: usize, max_bytes: usize) -> Vec<Transaction> {
        let mut selected: Vec<Transaction> = Vec::new();
        let mut included: HashSet<Hash> = HashSet::new();
        let mut used_bytes = 0usize;

        let ordered: Vec<Hash> = self
            .by_priority
            .values()
            .flatten()
            .copied()
            .collect();

        for txid in ordered {
            if included.contains(&txid) {
                continue;
            }
            // Pull the whole ancestor chain in dependency order.
            let mut lineage = Vec::new();
            if !self.collect_lineage(&txid, &included, &mut lineage) {
                continue;
            }
            let lineage_bytes: usize = lineage
                .iter()
                .filter_map(|h| self.entries.get(h))
                .map(|e| e.size)
                .sum();
            if selected.len() + lineage.len() > max_txs
                || used_bytes + lineage_bytes > max_bytes
            {
                continue;
            }
            for hash in lineage {
                let entry = &self.entries[&hash];
                included.insert(hash);
                used_bytes += entry.size;
                selected.push(entry.tx.clone());
            }
        }
        selected
    }

    /// Depth-first ancestor walk producing parents-first order. Returns
    /// false if the lineage leaves the pool inconsistently.
    fn collect_lineage(
        &self,
        txid: &Hash,
        included: &HashSet<Hash>,
        out: &mut Vec<Hash>,
    ) -> bool {
        if included.contains(txid) || out.contains(txid) {
            return true;
        }
        let Some(entry) = self.entries.get(txid) else {
            return false;
        };
        for input in &entry.tx.inputs {
            if self.entries.contains_key(&input.prevout.txid)
                && !self.collect_lineage(&input.prevout.txid, included, out)
            {
                return false;
            }
        }
        out.push(*txid);
        true
    }

    /// Total fees of a selected set, for coinbase construction.
    pub fn fees_of(&self, txs: &[Transaction]) -> u64 {
        txs.iter()
            .filter_map(|tx| self.entries.get(&tx.txid()))
            .map(|e| e.fee)
            .sum()
    }
}

struct CheckedTx {
    fee: u64,
    size: usize,
}

/// Compensation this transaction books against a certificate, if any.
fn compensation_amount(tx: &Transaction, id: &str) -> u64 {
    compensation_amounts(tx)
        .into_iter()
        .filter(|(cert, _)| cert == id)
        .map(|(_, amount)| amount)
        .sum()
}

fn compensation_amounts(tx: &Transaction) -> Vec<(String, u64)> {
    match tx.kind {
        TxKind::AssignCompensation => tx.outputs[0]
            .certificate_id
            .clone()
            .map(|id| vec![(id, tx.total_output())])
            .unwrap_or_default(),
        TxKind::Burn => {
            let mut amounts: HashMap<String, u64> = HashMap::new();
            for output in &tx.outputs {
                if let Some(id) = &output.certificate_id {
                    *amounts.entry(id.clone()).or_insert(0) += output.amount;
                }
            }
            amounts.into_iter().collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::types::{TxInput, TxOutput};

    fn pool() -> Mempool {
        Mempool::new(MempoolConfig::default())
    }

    /// Fabricate a pooled entry directly, bypassing signature checks; the
    /// full admission path is covered by the integration suites.
    fn seed(
        pool: &mut Mempool,
        spend: Vec<OutPoint>,
        outputs: usize,
        fee: u64,
        rate: u64,
    ) -> Hash {
        let tx = Transaction {
            version: 1,
            kind: TxKind::Transfer,
            inputs: spend
                .into_iter()
                .map(|prevout| TxInput {
                    prevout,
                    signature: vec![0xaa; 64],
                    pubkey: vec![0x02; 33],
                })
                .collect(),
            outputs: (0..outputs)
                .map(|i| TxOutput::spendable(100 + i as u64, "addr"))
                .collect(),
            timestamp: fee as u32,
            metadata: Vec::new(),
        };
        let txid = tx.txid();
        let size = tx.size();
        pool.index_entry(MempoolEntry {
            txid,
            fee,
            size,
            fee_rate: rate,
            ancestor_fee_rate: rate,
            arrival: 0,
            tx,
        });
        txid
    }

    fn op(txid: Hash, index: u32) -> OutPoint {
        OutPoint { txid, index }
    }

    #[test]
    fn test_select_orders_parents_before_children() {
        let mut pool = pool();
        let parent = seed(&mut pool, vec![op([1; 32], 0)], 2, 100, 1);
        let child = seed(&mut pool, vec![op(parent, 0)], 1, 5000, 50);

        let selected = pool.select_for_block(10, 1_000_000);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].txid(), parent);
        assert_eq!(selected[1].txid(), child);
    }

    #[test]
    fn test_select_respects_tx_limit() {
        let mut pool = pool();
        seed(&mut pool, vec![op([1; 32], 0)], 1, 100, 10);
        seed(&mut pool, vec![op([2; 32], 0)], 1, 100, 20);
        seed(&mut pool, vec![op([3; 32], 0)], 1, 100, 30);

        let selected = pool.select_for_block(2, 1_000_000);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_collect_with_descendants() {
        let mut pool = pool();
        let a = seed(&mut pool, vec![op([1; 32], 0)], 2, 100, 1);
        let b = seed(&mut pool, vec![op(a, 0)], 1, 100, 1);
        let c = seed(&mut pool, vec![op(b, 0)], 1, 100, 1);
        let unrelated = seed(&mut pool, vec![op([2; 32], 0)], 1, 100, 1);

        let family = pool.collect_with_descendants([a]);
        assert!(family.contains(&a) && family.contains(&b) && family.contains(&c));
        assert!(!family.contains(&unrelated));
    }

    #[test]
    fn test_remove_entry_unwinds_indices() {
        let mut pool = pool();
        let prev = op([1; 32], 0);
        let txid = seed(&mut pool, vec![prev.clone()], 1, 100, 1);
        assert_eq!(pool.len(), 1);
        assert!(pool.spenders.contains_key(&prev));

        pool.remove_entry(&txid).unwrap();
        assert!(pool.is_empty());
        assert!(pool.spenders.is_empty());
        assert_eq!(pool.total_bytes, 0);
        assert!(pool.by_priority.is_empty());
    }

    #[test]
    fn test_info_snapshot() {
        let mut pool = pool();
        seed(&mut pool, vec![op([1; 32], 0)], 1, 100, 1);
        let info = pool.info();
        assert_eq!(info.transaction_count, 1);
        assert!(info.total_bytes > 0);
        assert_eq!(info.min_fee, 1000);
    }
}
