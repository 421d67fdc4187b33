use crate::flatfs::BlockNumber;

use super::block::BLOCK_SIZE;

/// The number of bytes occupied by a serialized allocation table entry.
pub const TABLE_ENTRY_SIZE: usize = 2;

/// The number of blocks holding the allocation table. They start at block zero.
pub const TABLE_BLOCKS: usize = 32;

const_assert!(BLOCK_SIZE % TABLE_ENTRY_SIZE == 0);
/// The number of allocation table entries that fit in a block.
pub const TABLE_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / TABLE_ENTRY_SIZE;

/// The largest device the allocation table can describe. Entries are 16-bit, so this is also
/// the largest addressable block count.
pub const MAX_BLOCKS: usize = TABLE_BLOCKS * TABLE_ENTRIES_PER_BLOCK;
const_assert!(MAX_BLOCKS - 1 <= u16::MAX as usize);

/// The block holding the directory table.
pub const DIRECTORY_BLOCK: BlockNumber = TABLE_BLOCKS;

/// The first block available for file data.
pub const FIRST_DATA_BLOCK: BlockNumber = DIRECTORY_BLOCK + 1;

/// The number of blocks that are never allocatable.
pub const RESERVED_BLOCKS: usize = FIRST_DATA_BLOCK;

/// The smallest usable device: the reserved region plus one data block.
pub const MIN_BLOCKS: usize = FIRST_DATA_BLOCK + 1;
