use anyhow::Result;

use crate::disk_format::block::Block;
use crate::flatfs::BlockNumber;

/// A device made of [`BLOCK_SIZE`](crate::disk_format::block::BLOCK_SIZE)-byte blocks, read and
/// written whole.
pub trait BlockStorage {
    /// The number of blocks on the device. Fixed for the lifetime of the storage.
    fn num_blocks(&self) -> usize;

    fn read_block(&self, block_number: BlockNumber) -> Result<Block>;

    /// Must not return before the block is durable.
    fn write_block(&self, block_number: BlockNumber, block: &Block) -> Result<()>;
}
