//! Header and block validation.
//!
//! Split so that cheap checks reject before expensive ones: phase A
//! ([`check_header`]) is context-free header work, [`check_block`] covers
//! block structure plus phase B for every transaction, and
//! [`connect_block`] is the stateful phase C against the UTXO index and the
//! certificate ledger at the connection point. `connect_block` only reads
//! state; it returns the UTXO diff and ledger delta for the chain writer to
//! apply atomically.

use std::collections::{HashMap, HashSet};

use crate::config::NetworkParams;
use crate::consensus::economic::{max_coinbase_payout, transaction_fee};
use crate::consensus::error::{ConsensusError, Result};
use crate::consensus::merkle::merkle_root;
use crate::consensus::pow::{check_header_time, check_proof_of_work};
use crate::consensus::transaction::{check_transaction, verify_input_signatures};
use crate::consensus::types::{Block, BlockHeader, CoinState, Hash, OutPoint, Transaction, TxKind};
use crate::crypto;
use crate::ledger::{Certificate, CertificateIssuance, CertificateLedger, LedgerDelta, Project};
use crate::utxo::{UtxoDiff, UtxoEntry, UtxoIndex};

/// Phase A: context-free header validation against its branch context.
///
/// `prev_timestamps` are the timestamps of the header's ancestors (oldest
/// first), `expected_bits` the retarget-mandated difficulty for its height.
pub fn check_header(
    params: &NetworkParams,
    header: &BlockHeader,
    prev_timestamps: &[u32],
    expected_bits: u32,
    now: u64,
) -> Result<()> {
    if header.version != 1 {
        return Err(ConsensusError::BadVersion(header.version));
    }
    if header.bits != expected_bits {
        return Err(ConsensusError::UnexpectedBits);
    }
    check_header_time(header, prev_timestamps, now)?;
    check_proof_of_work(params, header)
}

/// Block structure plus phase B for every transaction.
pub fn check_block(params: &NetworkParams, block: &Block) -> Result<()> {
    let size = block.size();
    if size > params.max_block_bytes {
        return Err(ConsensusError::OversizeBlock(size));
    }
    if block.transactions.is_empty() {
        return Err(ConsensusError::NoCoinbase);
    }
    if block.transactions.len() > params.max_block_txs {
        return Err(ConsensusError::TooManyTxs(block.transactions.len()));
    }
    if !block.transactions[0].is_coinbase() {
        return Err(ConsensusError::NoCoinbase);
    }
    if block.transactions[1..].iter().any(Transaction::is_coinbase) {
        return Err(ConsensusError::DuplicateCoinbase);
    }

    let txids: Vec<Hash> = block.transactions.iter().map(Transaction::txid).collect();
    let mut seen = HashSet::with_capacity(txids.len());
    if !txids.iter().all(|id| seen.insert(*id)) {
        return Err(ConsensusError::DuplicateTxid);
    }
    if merkle_root(&txids) != block.header.merkle_root {
        return Err(ConsensusError::MerkleMismatch);
    }

    for tx in &block.transactions {
        check_transaction(params, tx)?;
    }
    Ok(())
}

/// Everything phase C produces: the state changes to apply and the fees the
/// coinbase was entitled to.
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub diff: UtxoDiff,
    pub delta: LedgerDelta,
    pub total_fees: u64,
}

/// Certificate accounting visible while walking a block: the committed
/// ledger overlaid with the block's own issuances and compensations.
struct CertOverlay<'a> {
    ledger: &'a CertificateLedger,
    /// id -> (total, assigned) for certificates issued in this block.
    issued: HashMap<String, (u64, u64)>,
    /// id -> compensation accumulated in this block.
    compensated: HashMap<String, u64>,
}

impl<'a> CertOverlay<'a> {
    fn new(ledger: &'a CertificateLedger) -> Self {
        CertOverlay {
            ledger,
            issued: HashMap::new(),
            compensated: HashMap::new(),
        }
    }

    fn exists(&self, id: &str) -> bool {
        self.issued.contains_key(id) || self.ledger.contains_certificate(id)
    }

    /// `(assigned, compensated)` as of this point in the block.
    fn accumulators(&self, id: &str) -> Option<(u64, u64)> {
        let extra = self.compensated.get(id).copied().unwrap_or(0);
        if let Some((_, assigned)) = self.issued.get(id) {
            return Some((*assigned, extra));
        }
        self.ledger
            .certificate(id)
            .map(|c| (c.assigned_amount, c.compensated_amount.saturating_add(extra)))
    }

    /// Record a compensation, enforcing `compensated <= assigned`.
    fn compensate(&mut self, id: &str, amount: u64) -> Result<()> {
        let (assigned, compensated) = self
            .accumulators(id)
            .ok_or_else(|| ConsensusError::CertUnknown(id.to_string()))?;
        if compensated.saturating_add(amount) > assigned {
            return Err(ConsensusError::CertOvercompensated(id.to_string()));
        }
        *self.compensated.entry(id.to_string()).or_insert(0) += amount;
        Ok(())
    }
}

/// Phase C: validate a block against the chain state at `height` and build
/// the state transition. Transactions see the outputs created earlier in
/// the same block.
pub fn connect_block(
    params: &NetworkParams,
    block: &Block,
    height: u32,
    utxo: &UtxoIndex,
    ledger: &CertificateLedger,
) -> Result<ConnectOutcome> {
    let coinbase = &block.transactions[0];
    let tag = coinbase
        .coinbase_tag()
        .ok_or_else(|| ConsensusError::KindConstraint("coinbase metadata missing height".into()))?;
    if tag.height != height {
        return Err(ConsensusError::CoinbaseHeightMismatch {
            got: tag.height,
            expected: height,
        });
    }

    let mut diff = UtxoDiff::default();
    let mut delta = LedgerDelta::default();
    let mut certs = CertOverlay::new(ledger);
    let mut created: HashMap<OutPoint, UtxoEntry> = HashMap::new();
    let mut spent: HashSet<OutPoint> = HashSet::new();
    let mut total_fees: u64 = 0;

    for (tx_index, tx) in block.transactions.iter().enumerate() {
        let txid = tx.txid();

        if tx_index > 0 {
            let resolved = resolve_inputs(tx, utxo, &created, &spent)?;
            let addresses: Vec<String> = resolved
                .iter()
                .map(|(_, e)| e.output.address.clone())
                .collect();
            verify_input_signatures(params, tx, &addresses)?;

            let input_total = resolved
                .iter()
                .try_fold(0u64, |acc, (_, e)| acc.checked_add(e.output.amount))
                .ok_or(ConsensusError::BadAmount)?;
            let fee = transaction_fee(tx, input_total)?;
            total_fees = total_fees
                .checked_add(fee)
                .ok_or(ConsensusError::BadAmount)?;

            apply_ledger_rules(params, tx, height, &resolved, &mut certs, &mut delta)?;

            for (outpoint, entry) in resolved {
                spent.insert(outpoint.clone());
                diff.removes.push((outpoint, entry));
            }
        }

        for (out_index, output) in tx.outputs.iter().enumerate() {
            let outpoint = OutPoint {
                txid,
                index: out_index as u32,
            };
            let entry = UtxoEntry {
                output: output.clone(),
                height,
                is_coinbase: tx_index == 0,
            };
            created.insert(outpoint.clone(), entry.clone());
            diff.inserts.push((outpoint, entry));
        }
    }

    let allowed = max_coinbase_payout(height, total_fees);
    let payout = coinbase.total_output();
    if payout > allowed {
        return Err(ConsensusError::CoinbaseOverpay {
            got: payout,
            allowed,
        });
    }

    // Outputs created and spent within this block never reach the UTXO
    // index; cancel the pairs so the diff applies cleanly in both
    // directions.
    let created_here: HashSet<OutPoint> = diff.inserts.iter().map(|(o, _)| o.clone()).collect();
    let ephemeral: HashSet<OutPoint> = diff
        .removes
        .iter()
        .map(|(o, _)| o.clone())
        .filter(|o| created_here.contains(o))
        .collect();
    if !ephemeral.is_empty() {
        diff.inserts.retain(|(o, _)| !ephemeral.contains(o));
        diff.removes.retain(|(o, _)| !ephemeral.contains(o));
    }

    Ok(ConnectOutcome {
        diff,
        delta,
        total_fees,
    })
}

/// Resolve a transaction's inputs against the index and the block overlay,
/// enforcing the coin-state spend matrix.
fn resolve_inputs(
    tx: &Transaction,
    utxo: &UtxoIndex,
    created: &HashMap<OutPoint, UtxoEntry>,
    spent: &HashSet<OutPoint>,
) -> Result<Vec<(OutPoint, UtxoEntry)>> {
    let mut resolved = Vec::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if spent.contains(&input.prevout) {
            return Err(ConsensusError::DoubleSpend(input.prevout.to_string()));
        }
        let entry = created
            .get(&input.prevout)
            .cloned()
            .or_else(|| utxo.get(&input.prevout).cloned())
            .ok_or_else(|| ConsensusError::UnknownUtxo(input.prevout.to_string()))?;

        // The only legal transitions: Spendable -> anything but
        // compensation; Certified -> compensation only; Compensated -> never.
        let permitted = match entry.output.coin_state {
            CoinState::Spendable => tx.kind != TxKind::AssignCompensation,
            CoinState::Certified => tx.kind == TxKind::AssignCompensation,
            CoinState::Compensated => false,
        };
        if !permitted {
            return Err(ConsensusError::CoinStateForbidden);
        }
        resolved.push((input.prevout.clone(), entry));
    }
    Ok(resolved)
}

/// Kind-specific certificate accounting, run after signatures and fees.
fn apply_ledger_rules(
    params: &NetworkParams,
    tx: &Transaction,
    height: u32,
    resolved: &[(OutPoint, UtxoEntry)],
    certs: &mut CertOverlay,
    delta: &mut LedgerDelta,
) -> Result<()> {
    match tx.kind {
        TxKind::Coinbase | TxKind::Transfer => Ok(()),
        TxKind::AssignCert => {
            let issuance = CertificateIssuance::from_tx(tx)?;
            let id = issuance.certificate_id.clone();
            if certs.exists(&id) {
                return Err(ConsensusError::CertIdReused(id));
            }
            let assigned: u64 = tx
                .outputs
                .iter()
                .filter(|o| o.coin_state == CoinState::Certified)
                .map(|o| o.amount)
                .sum();

            let issuer_address =
                crypto::address_from_pubkey(&tx.inputs[0].pubkey, params.address_version);

            certs.issued.insert(id.clone(), (issuance.total_amount, assigned));
            delta.new_certificates.push(Certificate {
                certificate_id: id.clone(),
                project_id: issuance.project_id.clone(),
                total_amount: issuance.total_amount,
                assigned_amount: 0,
                compensated_amount: 0,
                issuer_address,
                standard: issuance.standard.clone(),
                location: issuance.location.clone(),
                issue_date: issuance.issue_date.clone(),
                metadata: issuance.extra.clone(),
            });
            delta.assignments.push((id, assigned));

            let project_known = certs.ledger.project(&issuance.project_id).is_some()
                || delta
                    .new_projects
                    .iter()
                    .any(|p| p.project_id == issuance.project_id);
            if !project_known {
                delta.new_projects.push(Project {
                    project_id: issuance.project_id,
                    name: issuance.project_name,
                    project_type: issuance.project_type,
                    location: issuance.location,
                    created_height: height,
                });
            }
            Ok(())
        }
        TxKind::AssignCompensation => {
            // Phase B guarantees a single output certificate id.
            let id = tx.outputs[0]
                .certificate_id
                .clone()
                .expect("compensation outputs carry an id");
            for (_, entry) in resolved {
                if entry.output.certificate_id.as_deref() != Some(id.as_str()) {
                    return Err(ConsensusError::KindConstraint(
                        "compensation inputs must share the target certificate".into(),
                    ));
                }
            }
            let amount = tx.total_output();
            certs.compensate(&id, amount)?;
            delta.compensations.push((id, amount));
            Ok(())
        }
        TxKind::Burn => {
            // A certificate-tagged burn retires value against that
            // certificate; an untagged burn just destroys coins.
            for output in &tx.outputs {
                if let Some(id) = &output.certificate_id {
                    certs.compensate(id, output.amount)?;
                    delta.compensations.push((id.clone(), output.amount));
                }
            }
            Ok(())
        }
    }
}
