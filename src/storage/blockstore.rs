//! Block and header storage.
//!
//! Blocks and headers are keyed by block hash; the height index maps active
//! chain heights to hashes. Side-branch blocks live here too; only the
//! height index distinguishes the active chain.

use std::sync::Arc;

use anyhow::Result;

use crate::consensus::types::{Block, BlockHeader, Hash};
use crate::storage::database::{Database, Tree};

pub struct BlockStore {
    blocks: Box<dyn Tree>,
    headers: Box<dyn Tree>,
    height_index: Box<dyn Tree>,
}

impl BlockStore {
    pub fn new(db: &Arc<dyn Database>) -> Result<Self> {
        Ok(Self {
            blocks: db.open_tree("blocks")?,
            headers: db.open_tree("headers")?,
            height_index: db.open_tree("height_index")?,
        })
    }

    /// Store a block and its header, keyed by hash.
    pub fn store_block(&self, block: &Block) -> Result<()> {
        let hash = block.hash();
        self.blocks.insert(&hash, &bincode::serialize(block)?)?;
        self.headers
            .insert(&hash, &bincode::serialize(&block.header)?)?;
        Ok(())
    }

    pub fn get_block(&self, hash: &Hash) -> Result<Option<Block>> {
        match self.blocks.get(hash)? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn get_header(&self, hash: &Hash) -> Result<Option<BlockHeader>> {
        match self.headers.get(hash)? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn has_block(&self, hash: &Hash) -> Result<bool> {
        self.blocks.contains_key(hash)
    }

    /// Drop a block and its header, as when a stored block turns out not to
    /// connect.
    pub fn remove_block(&self, hash: &Hash) -> Result<()> {
        self.blocks.remove(hash)?;
        self.headers.remove(hash)?;
        Ok(())
    }

    /// Point the active-chain height index at a hash.
    pub fn store_height(&self, height: u32, hash: &Hash) -> Result<()> {
        self.height_index.insert(&height.to_be_bytes(), hash)?;
        Ok(())
    }

    /// Drop the active-chain entry for a height (on disconnect).
    pub fn remove_height(&self, height: u32) -> Result<()> {
        self.height_index.remove(&height.to_be_bytes())?;
        Ok(())
    }

    pub fn get_hash_by_height(&self, height: u32) -> Result<Option<Hash>> {
        match self.height_index.get(&height.to_be_bytes())? {
            Some(data) => {
                let hash: Hash = data
                    .as_slice()
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("height index entry is not a 32-byte hash"))?;
                Ok(Some(hash))
            }
            None => Ok(None),
        }
    }

    pub fn block_count(&self) -> Result<usize> {
        self.blocks.len()
    }
}
