//! The UTXO index: the single source of truth for spendability.
//!
//! Maps outpoints to unspent outputs with creation metadata and keeps a
//! secondary index from address to owned outpoints. Mutation happens only
//! through block-sized [`UtxoDiff`]s, applied and undone atomically by the
//! chain writer.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::consensus::error::{ConsensusError, Result};
use crate::consensus::types::{CoinState, OutPoint, TxOutput};

/// An unspent output plus the context it was created in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub output: TxOutput,
    pub height: u32,
    pub is_coinbase: bool,
}

/// A block-sized batch of UTXO changes. Removes carry the full removed
/// entries so that [`UtxoIndex::undo`] can restore them bit-for-bit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoDiff {
    pub inserts: Vec<(OutPoint, UtxoEntry)>,
    pub removes: Vec<(OutPoint, UtxoEntry)>,
}

impl UtxoDiff {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.removes.is_empty()
    }
}

/// In-memory UTXO set with an address index.
#[derive(Debug, Default, Clone)]
pub struct UtxoIndex {
    utxos: HashMap<OutPoint, UtxoEntry>,
    by_address: HashMap<String, BTreeSet<OutPoint>>,
}

impl UtxoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.utxos.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.utxos.contains_key(outpoint)
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &UtxoEntry)> {
        self.utxos.iter()
    }

    /// Apply a diff atomically: preconditions are checked for the whole
    /// batch before any mutation, so a failed apply leaves the index
    /// untouched.
    pub fn apply(&mut self, diff: &UtxoDiff) -> Result<()> {
        for (outpoint, _) in &diff.removes {
            if !self.utxos.contains_key(outpoint) {
                return Err(ConsensusError::IntegrityFault(format!(
                    "apply would remove missing UTXO {}",
                    outpoint
                )));
            }
        }
        for (outpoint, _) in &diff.inserts {
            if self.utxos.contains_key(outpoint) {
                return Err(ConsensusError::IntegrityFault(format!(
                    "apply would duplicate UTXO {}",
                    outpoint
                )));
            }
        }
        for (outpoint, _) in &diff.removes {
            self.remove_entry(outpoint);
        }
        for (outpoint, entry) in &diff.inserts {
            self.insert_entry(outpoint.clone(), entry.clone());
        }
        Ok(())
    }

    /// Undo a previously applied diff, restoring the removed entries and
    /// deleting the inserted ones. Checked the same way as [`Self::apply`].
    pub fn undo(&mut self, diff: &UtxoDiff) -> Result<()> {
        for (outpoint, _) in &diff.inserts {
            if !self.utxos.contains_key(outpoint) {
                return Err(ConsensusError::IntegrityFault(format!(
                    "undo would remove missing UTXO {}",
                    outpoint
                )));
            }
        }
        for (outpoint, _) in &diff.removes {
            if self.utxos.contains_key(outpoint) {
                return Err(ConsensusError::IntegrityFault(format!(
                    "undo would duplicate UTXO {}",
                    outpoint
                )));
            }
        }
        for (outpoint, _) in &diff.inserts {
            self.remove_entry(outpoint);
        }
        for (outpoint, entry) in &diff.removes {
            self.insert_entry(outpoint.clone(), entry.clone());
        }
        Ok(())
    }

    fn insert_entry(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.by_address
            .entry(entry.output.address.clone())
            .or_default()
            .insert(outpoint.clone());
        self.utxos.insert(outpoint, entry);
    }

    fn remove_entry(&mut self, outpoint: &OutPoint) {
        if let Some(entry) = self.utxos.remove(outpoint) {
            if let Some(set) = self.by_address.get_mut(&entry.output.address) {
                set.remove(outpoint);
                if set.is_empty() {
                    self.by_address.remove(&entry.output.address);
                }
            }
        }
    }

    /// Spendable balance of an address (certified coins included,
    /// compensated excluded).
    pub fn balance(&self, address: &str) -> u64 {
        self.address_outpoints(address)
            .filter_map(|op| self.utxos.get(op))
            .filter(|e| e.output.is_spendable())
            .map(|e| e.output.amount)
            .sum()
    }

    /// All UTXOs owned by an address, compensated ones included.
    pub fn utxos_of(&self, address: &str) -> Vec<(OutPoint, UtxoEntry)> {
        self.address_outpoints(address)
            .filter_map(|op| self.utxos.get(op).map(|e| (op.clone(), e.clone())))
            .collect()
    }

    fn address_outpoints(&self, address: &str) -> impl Iterator<Item = &OutPoint> {
        self.by_address.get(address).into_iter().flatten()
    }

    /// Deterministic coin selection: freely spendable outputs, largest
    /// first, ties broken by outpoint order, until the target is covered.
    pub fn select(&self, address: &str, target: u64) -> Option<Vec<OutPoint>> {
        let mut candidates: Vec<(&OutPoint, &UtxoEntry)> = self
            .address_outpoints(address)
            .filter_map(|op| self.utxos.get(op).map(|e| (op, e)))
            .filter(|(_, e)| e.output.coin_state == CoinState::Spendable)
            .collect();
        candidates.sort_by(|(a_op, a), (b_op, b)| {
            b.output
                .amount
                .cmp(&a.output.amount)
                .then_with(|| a_op.cmp(b_op))
        });

        let mut selected = Vec::new();
        let mut covered = 0u64;
        for (outpoint, entry) in candidates {
            selected.push(outpoint.clone());
            covered = covered.saturating_add(entry.output.amount);
            if covered >= target {
                return Some(selected);
            }
        }
        None
    }

    /// Total value across all entries, compensated included. Used by the
    /// supply conservation invariant.
    pub fn total_value(&self) -> u64 {
        self.utxos
            .values()
            .fold(0u64, |acc, e| acc.saturating_add(e.output.amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(n: u8, index: u32) -> OutPoint {
        OutPoint {
            txid: [n; 32],
            index,
        }
    }

    fn entry(amount: u64, address: &str) -> UtxoEntry {
        UtxoEntry {
            output: TxOutput::spendable(amount, address),
            height: 1,
            is_coinbase: false,
        }
    }

    fn seeded() -> UtxoIndex {
        let mut index = UtxoIndex::new();
        let diff = UtxoDiff {
            inserts: vec![
                (op(1, 0), entry(500, "alice")),
                (op(2, 0), entry(300, "alice")),
                (op(3, 0), entry(1000, "bob")),
            ],
            removes: vec![],
        };
        index.apply(&diff).unwrap();
        index
    }

    #[test]
    fn test_apply_and_lookup() {
        let index = seeded();
        assert_eq!(index.len(), 3);
        assert_eq!(index.get(&op(1, 0)).unwrap().output.amount, 500);
        assert_eq!(index.balance("alice"), 800);
        assert_eq!(index.balance("bob"), 1000);
        assert_eq!(index.balance("carol"), 0);
    }

    #[test]
    fn test_undo_restores_exact_state() {
        let mut index = seeded();
        let spend = UtxoDiff {
            inserts: vec![(op(4, 0), entry(450, "carol"))],
            removes: vec![(op(1, 0), index.get(&op(1, 0)).unwrap().clone())],
        };
        index.apply(&spend).unwrap();
        assert_eq!(index.balance("alice"), 300);
        assert_eq!(index.balance("carol"), 450);

        index.undo(&spend).unwrap();
        assert_eq!(index.balance("alice"), 800);
        assert_eq!(index.balance("carol"), 0);
        assert!(!index.contains(&op(4, 0)));
    }

    #[test]
    fn test_apply_is_atomic_on_failure() {
        let mut index = seeded();
        let bad = UtxoDiff {
            inserts: vec![(op(5, 0), entry(1, "dave"))],
            removes: vec![(op(9, 9), entry(1, "ghost"))],
        };
        assert!(index.apply(&bad).is_err());
        // Nothing applied
        assert!(!index.contains(&op(5, 0)));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut index = seeded();
        let dup = UtxoDiff {
            inserts: vec![(op(1, 0), entry(1, "alice"))],
            removes: vec![],
        };
        assert!(matches!(
            index.apply(&dup),
            Err(ConsensusError::IntegrityFault(_))
        ));
    }

    #[test]
    fn test_select_largest_first() {
        let index = seeded();
        let picked = index.select("alice", 600).unwrap();
        assert_eq!(picked, vec![op(1, 0), op(2, 0)]);
        let single = index.select("alice", 400).unwrap();
        assert_eq!(single, vec![op(1, 0)]);
        assert!(index.select("alice", 900).is_none());
    }

    #[test]
    fn test_select_skips_certified_and_compensated() {
        let mut index = UtxoIndex::new();
        let diff = UtxoDiff {
            inserts: vec![
                (
                    op(1, 0),
                    UtxoEntry {
                        output: TxOutput::certified(1000, "alice", "CERT-2025-0001"),
                        height: 1,
                        is_coinbase: false,
                    },
                ),
                (
                    op(2, 0),
                    UtxoEntry {
                        output: TxOutput::compensated(1000, "alice", "CERT-2025-0001"),
                        height: 1,
                        is_coinbase: false,
                    },
                ),
                (op(3, 0), entry(100, "alice")),
            ],
            removes: vec![],
        };
        index.apply(&diff).unwrap();
        assert_eq!(index.select("alice", 100).unwrap(), vec![op(3, 0)]);
        assert!(index.select("alice", 200).is_none());
        // Certified still counts toward spendable balance, compensated not
        assert_eq!(index.balance("alice"), 1100);
    }

    #[test]
    fn test_total_value_includes_compensated() {
        let mut index = seeded();
        let diff = UtxoDiff {
            inserts: vec![(
                op(6, 0),
                UtxoEntry {
                    output: TxOutput::compensated(50, "x", "CERT-2025-0001"),
                    height: 2,
                    is_coinbase: false,
                },
            )],
            removes: vec![],
        };
        index.apply(&diff).unwrap();
        assert_eq!(index.total_value(), 1850);
    }
}
