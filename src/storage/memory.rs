use std::cell::RefCell;

use anyhow::{anyhow, Result};

use crate::disk_format::block::{Block, EMPTY_BLOCK};
use crate::flatfs::BlockNumber;

use super::block_storage::BlockStorage;

/// A zero-initialised device held in memory.
pub struct MemoryStorage {
    blocks: RefCell<Vec<Block>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new(num_blocks: usize) -> Self {
        MemoryStorage {
            blocks: RefCell::new(vec![EMPTY_BLOCK; num_blocks]),
        }
    }

    /// A copy of every block on the device.
    pub fn snapshot(&self) -> Vec<Block> {
        self.blocks.borrow().clone()
    }
}

impl BlockStorage for MemoryStorage {
    fn num_blocks(&self) -> usize {
        self.blocks.borrow().len()
    }

    fn read_block(&self, block_number: BlockNumber) -> Result<Block> {
        self.blocks
            .borrow()
            .get(block_number)
            .copied()
            .ok_or(anyhow!("block number out of bounds: {block_number}"))
    }

    fn write_block(&self, block_number: BlockNumber, block: &Block) -> Result<()> {
        let mut blocks = self.blocks.borrow_mut();
        let target = blocks
            .get_mut(block_number)
            .ok_or(anyhow!("block number out of bounds: {block_number}"))?;

        *target = *block;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::disk_format::block::BLOCK_SIZE;

    use super::*;

    #[test]
    fn test_new_storage_is_zeroed() {
        let storage = MemoryStorage::new(3);

        assert_eq!(storage.num_blocks(), 3);
        assert_eq!(storage.read_block(2).unwrap(), EMPTY_BLOCK);
    }

    #[test]
    fn test_write_then_read() {
        let storage = MemoryStorage::new(3);
        storage.write_block(1, &[0x5a; BLOCK_SIZE]).unwrap();

        assert_eq!(storage.read_block(1).unwrap(), [0x5a; BLOCK_SIZE]);
        assert_eq!(storage.read_block(0).unwrap(), EMPTY_BLOCK);
        assert_eq!(storage.snapshot()[1], [0x5a; BLOCK_SIZE]);
    }

    #[test]
    fn test_out_of_bounds_block() {
        let storage = MemoryStorage::new(3);

        assert!(storage.read_block(3).is_err());
        assert!(storage.write_block(3, &EMPTY_BLOCK).is_err());
    }
}
