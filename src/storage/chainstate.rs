//! Chain state storage: the persisted tip.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::consensus::types::Hash;
use crate::storage::database::{Database, Tree};

/// Persisted view of the active tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub tip_hash: Hash,
    pub height: u32,
    /// Cumulative work of the active chain, little-endian 256-bit.
    pub total_work: [u8; 32],
    pub genesis_hash: Hash,
}

pub struct ChainState {
    info: Box<dyn Tree>,
}

const CURRENT_KEY: &[u8] = b"current";

impl ChainState {
    pub fn new(db: &Arc<dyn Database>) -> Result<Self> {
        Ok(Self {
            info: db.open_tree("chain_info")?,
        })
    }

    pub fn store(&self, info: &ChainInfo) -> Result<()> {
        self.info.insert(CURRENT_KEY, &bincode::serialize(info)?)?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<ChainInfo>> {
        match self.info.get(CURRENT_KEY)? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn is_initialized(&self) -> Result<bool> {
        self.info.contains_key(CURRENT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::open_database;
    use tempfile::TempDir;

    #[test]
    fn test_tip_round_trip() {
        let dir = TempDir::new().unwrap();
        let db: Arc<dyn Database> = Arc::from(open_database(dir.path()).unwrap());
        let state = ChainState::new(&db).unwrap();

        assert!(!state.is_initialized().unwrap());
        assert!(state.load().unwrap().is_none());

        let info = ChainInfo {
            tip_hash: [3u8; 32],
            height: 12,
            total_work: [0u8; 32],
            genesis_hash: [9u8; 32],
        };
        state.store(&info).unwrap();
        assert!(state.is_initialized().unwrap());
        assert_eq!(state.load().unwrap().unwrap(), info);
    }
}
