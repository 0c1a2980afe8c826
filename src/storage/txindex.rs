//! Transaction index: txid to confirmed location.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::consensus::types::Hash;
use crate::storage::database::{Database, Tree};

/// Where a confirmed transaction lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLocation {
    pub block_hash: Hash,
    pub height: u32,
    pub index: u32,
}

pub struct TxIndex {
    locations: Box<dyn Tree>,
}

impl TxIndex {
    pub fn new(db: &Arc<dyn Database>) -> Result<Self> {
        Ok(Self {
            locations: db.open_tree("tx_locations")?,
        })
    }

    pub fn index_transaction(
        &self,
        txid: &Hash,
        block_hash: &Hash,
        height: u32,
        index: u32,
    ) -> Result<()> {
        let location = TxLocation {
            block_hash: *block_hash,
            height,
            index,
        };
        self.locations.insert(txid, &bincode::serialize(&location)?)?;
        Ok(())
    }

    pub fn get_location(&self, txid: &Hash) -> Result<Option<TxLocation>> {
        match self.locations.get(txid)? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// Drop an entry, as when its block is disconnected.
    pub fn remove(&self, txid: &Hash) -> Result<()> {
        self.locations.remove(txid)?;
        Ok(())
    }

    pub fn transaction_count(&self) -> Result<usize> {
        self.locations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::open_database;
    use tempfile::TempDir;

    #[test]
    fn test_index_round_trip() {
        let dir = TempDir::new().unwrap();
        let db: Arc<dyn Database> = Arc::from(open_database(dir.path()).unwrap());
        let index = TxIndex::new(&db).unwrap();

        let txid = [1u8; 32];
        index.index_transaction(&txid, &[2u8; 32], 7, 3).unwrap();
        let location = index.get_location(&txid).unwrap().unwrap();
        assert_eq!(location.height, 7);
        assert_eq!(location.index, 3);
        assert_eq!(index.transaction_count().unwrap(), 1);

        index.remove(&txid).unwrap();
        assert!(index.get_location(&txid).unwrap().is_none());
    }
}
