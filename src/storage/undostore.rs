//! Per-block undo data.
//!
//! For every connected block the chain writer stores the UTXO diff and
//! ledger delta it applied, so a disconnect can restore the prior state
//! bit-for-bit without replaying history.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::consensus::types::Hash;
use crate::ledger::LedgerDelta;
use crate::storage::database::{Database, Tree};
use crate::utxo::UtxoDiff;

/// Everything needed to reverse one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoData {
    pub diff: UtxoDiff,
    pub delta: LedgerDelta,
    pub total_fees: u64,
}

pub struct UndoStore {
    undo: Box<dyn Tree>,
}

impl UndoStore {
    pub fn new(db: &Arc<dyn Database>) -> Result<Self> {
        Ok(Self {
            undo: db.open_tree("undo")?,
        })
    }

    pub fn put(&self, block_hash: &Hash, data: &UndoData) -> Result<()> {
        self.undo.insert(block_hash, &bincode::serialize(data)?)?;
        Ok(())
    }

    pub fn get(&self, block_hash: &Hash) -> Result<Option<UndoData>> {
        match self.undo.get(block_hash)? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn remove(&self, block_hash: &Hash) -> Result<()> {
        self.undo.remove(block_hash)?;
        Ok(())
    }
}
