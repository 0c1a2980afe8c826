//! Persistent UTXO set.
//!
//! Mirror of the in-memory [`crate::utxo::UtxoIndex`], written diff-by-diff
//! as the chain writer connects and disconnects blocks. Keys are the
//! outpoint's canonical bytes (txid then big-endian index) so iteration
//! groups outputs of a transaction together.

use std::sync::Arc;

use anyhow::Result;

use crate::consensus::types::OutPoint;
use crate::storage::database::{Database, Tree};
use crate::utxo::{UtxoDiff, UtxoEntry, UtxoIndex};

pub struct UtxoStore {
    utxos: Box<dyn Tree>,
}

impl UtxoStore {
    pub fn new(db: &Arc<dyn Database>) -> Result<Self> {
        Ok(Self {
            utxos: db.open_tree("utxos")?,
        })
    }

    fn key(outpoint: &OutPoint) -> Vec<u8> {
        let mut key = Vec::with_capacity(36);
        key.extend_from_slice(&outpoint.txid);
        key.extend_from_slice(&outpoint.index.to_be_bytes());
        key
    }

    fn outpoint_from_key(key: &[u8]) -> Result<OutPoint> {
        if key.len() != 36 {
            anyhow::bail!("invalid UTXO key length {}", key.len());
        }
        let txid = key[..32].try_into().expect("32 bytes");
        let index = u32::from_be_bytes(key[32..].try_into().expect("4 bytes"));
        Ok(OutPoint { txid, index })
    }

    pub fn get(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>> {
        match self.utxos.get(&Self::key(outpoint))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// Mirror an applied diff.
    pub fn apply(&self, diff: &UtxoDiff) -> Result<()> {
        for (outpoint, _) in &diff.removes {
            self.utxos.remove(&Self::key(outpoint))?;
        }
        for (outpoint, entry) in &diff.inserts {
            self.utxos
                .insert(&Self::key(outpoint), &bincode::serialize(entry)?)?;
        }
        Ok(())
    }

    /// Mirror an undone diff.
    pub fn undo(&self, diff: &UtxoDiff) -> Result<()> {
        for (outpoint, _) in &diff.inserts {
            self.utxos.remove(&Self::key(outpoint))?;
        }
        for (outpoint, entry) in &diff.removes {
            self.utxos
                .insert(&Self::key(outpoint), &bincode::serialize(entry)?)?;
        }
        Ok(())
    }

    /// Rebuild the full in-memory index on startup.
    pub fn load_index(&self) -> Result<UtxoIndex> {
        let mut index = UtxoIndex::new();
        let mut diff = UtxoDiff::default();
        for item in self.utxos.iter() {
            let (key, value) = item?;
            let outpoint = Self::outpoint_from_key(&key)?;
            let entry: UtxoEntry = bincode::deserialize(&value)?;
            diff.inserts.push((outpoint, entry));
        }
        index
            .apply(&diff)
            .map_err(|e| anyhow::anyhow!("persisted UTXO set is inconsistent: {e}"))?;
        Ok(index)
    }

    pub fn utxo_count(&self) -> Result<usize> {
        self.utxos.len()
    }
}
