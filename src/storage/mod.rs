//! Persistent storage for blocks, chain state, the UTXO set, and the
//! certificate ledger.
//!
//! A coordinator over per-concern stores, all sharing one database handle
//! behind the [`database::Database`] abstraction.

pub mod blockstore;
pub mod chainstate;
pub mod database;
pub mod ledgerstore;
pub mod txindex;
pub mod undostore;
pub mod utxostore;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use database::{open_database, Database};

/// Storage manager that coordinates all storage operations.
pub struct Storage {
    db: Arc<dyn Database>,
    blockstore: blockstore::BlockStore,
    chainstate: chainstate::ChainState,
    txindex: txindex::TxIndex,
    utxostore: utxostore::UtxoStore,
    ledgerstore: ledgerstore::LedgerStore,
    undostore: undostore::UndoStore,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let db: Arc<dyn Database> = Arc::from(open_database(data_dir)?);
        Ok(Self {
            blockstore: blockstore::BlockStore::new(&db)?,
            chainstate: chainstate::ChainState::new(&db)?,
            txindex: txindex::TxIndex::new(&db)?,
            utxostore: utxostore::UtxoStore::new(&db)?,
            ledgerstore: ledgerstore::LedgerStore::new(&db)?,
            undostore: undostore::UndoStore::new(&db)?,
            db,
        })
    }

    pub fn blocks(&self) -> &blockstore::BlockStore {
        &self.blockstore
    }

    pub fn chain(&self) -> &chainstate::ChainState {
        &self.chainstate
    }

    pub fn transactions(&self) -> &txindex::TxIndex {
        &self.txindex
    }

    pub fn utxos(&self) -> &utxostore::UtxoStore {
        &self.utxostore
    }

    pub fn ledger(&self) -> &ledgerstore::LedgerStore {
        &self.ledgerstore
    }

    pub fn undo(&self) -> &undostore::UndoStore {
        &self.undostore
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_opens_all_stores() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        assert_eq!(storage.blocks().block_count().unwrap(), 0);
        assert!(!storage.chain().is_initialized().unwrap());
        assert_eq!(storage.transactions().transaction_count().unwrap(), 0);
        assert_eq!(storage.utxos().utxo_count().unwrap(), 0);
        storage.flush().unwrap();
    }
}
