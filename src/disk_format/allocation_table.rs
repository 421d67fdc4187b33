use crate::{
    error::{FsError, Result},
    flatfs::BlockNumber,
};

use super::{
    block::{Block, EMPTY_BLOCK},
    layout::{
        DIRECTORY_BLOCK, FIRST_DATA_BLOCK, TABLE_BLOCKS, TABLE_ENTRIES_PER_BLOCK, TABLE_ENTRY_SIZE,
    },
};

const FREE: u16 = 1;
const END_OF_CHAIN: u16 = 2;
const RESERVED_TABLE: u16 = 3;
const RESERVED_DIRECTORY: u16 = 4;

/// The decoded meaning of an allocation table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableEntry {
    /// The block is not allocated.
    Free,
    /// The block is the last one of a file.
    EndOfChain,
    /// The block holds part of the allocation table.
    ReservedTable,
    /// The block holds the directory.
    ReservedDirectory,
    /// The file continues in the given block.
    Next(BlockNumber),
    /// A value no formatted volume contains.
    Invalid(u16),
}

impl From<u16> for TableEntry {
    fn from(value: u16) -> Self {
        match value {
            FREE => TableEntry::Free,
            END_OF_CHAIN => TableEntry::EndOfChain,
            RESERVED_TABLE => TableEntry::ReservedTable,
            RESERVED_DIRECTORY => TableEntry::ReservedDirectory,
            v if v as usize >= FIRST_DATA_BLOCK => TableEntry::Next(v as BlockNumber),
            v => TableEntry::Invalid(v),
        }
    }
}

impl From<TableEntry> for u16 {
    fn from(entry: TableEntry) -> Self {
        match entry {
            TableEntry::Free => FREE,
            TableEntry::EndOfChain => END_OF_CHAIN,
            TableEntry::ReservedTable => RESERVED_TABLE,
            TableEntry::ReservedDirectory => RESERVED_DIRECTORY,
            // block numbers are bounded by `MAX_BLOCKS` when the volume is mounted
            TableEntry::Next(block) => block as u16,
            TableEntry::Invalid(value) => value,
        }
    }
}

/// The in-memory allocation table. Holds one entry per block of the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationTable {
    entries: Vec<u16>,
}

impl AllocationTable {
    /// Builds the table of a freshly formatted volume with `num_blocks` blocks.
    pub fn formatted(num_blocks: usize) -> Self {
        let entries = (0..num_blocks)
            .map(|block| {
                let entry = match block {
                    b if b < TABLE_BLOCKS => TableEntry::ReservedTable,
                    DIRECTORY_BLOCK => TableEntry::ReservedDirectory,
                    _ => TableEntry::Free,
                };

                u16::from(entry)
            })
            .collect();

        Self { entries }
    }

    /// Decodes the table from the blocks of the reserved table region. Entries beyond
    /// `num_blocks` don't describe any block and are dropped.
    pub fn from_blocks(blocks: &[Block], num_blocks: usize) -> Self {
        let entries = blocks
            .iter()
            .flat_map(|block| block.chunks_exact(TABLE_ENTRY_SIZE))
            .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
            .take(num_blocks)
            .collect();

        Self { entries }
    }

    /// Encodes the table into exactly [`TABLE_BLOCKS`] blocks. Unused trailing entries are zero.
    pub fn to_blocks(&self) -> Vec<Block> {
        let mut blocks = vec![EMPTY_BLOCK; TABLE_BLOCKS];

        for (index, entry) in self.entries.iter().enumerate() {
            let block = &mut blocks[index / TABLE_ENTRIES_PER_BLOCK];
            let offset = (index % TABLE_ENTRIES_PER_BLOCK) * TABLE_ENTRY_SIZE;
            block[offset..offset + TABLE_ENTRY_SIZE].copy_from_slice(&entry.to_le_bytes());
        }

        blocks
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, block: BlockNumber) -> Option<TableEntry> {
        self.entries.get(block).map(|&value| TableEntry::from(value))
    }

    /// Panics if `block` is outside the device.
    pub fn set(&mut self, block: BlockNumber, entry: TableEntry) {
        self.entries[block] = entry.into();
    }

    /// Checks the format signature: the reserved table and directory entries.
    pub fn is_formatted(&self) -> bool {
        if self.entries.len() <= DIRECTORY_BLOCK {
            return false;
        }

        self.entries[..TABLE_BLOCKS]
            .iter()
            .all(|&value| value == RESERVED_TABLE)
            && self.entries[DIRECTORY_BLOCK] == RESERVED_DIRECTORY
    }

    /// Finds the lowest-numbered free data block. This is a linear scan on every call.
    pub fn next_free_block(&self) -> Option<BlockNumber> {
        self.entries
            .iter()
            .enumerate()
            .skip(FIRST_DATA_BLOCK)
            .find(|&(_, &value)| value == FREE)
            .map(|(block, _)| block)
    }

    pub fn num_free_blocks(&self) -> usize {
        self.entries.iter().filter(|&&value| value == FREE).count()
    }

    /// Follows the chain starting at `first` and returns every block on it, in order.
    ///
    /// The walk visits at most as many blocks as the device has. A chain that runs longer, or
    /// contains a link [`successor`](Self::successor) rejects, is reported as
    /// [`FsError::CorruptChain`].
    pub fn chain(&self, first: BlockNumber) -> Result<Vec<BlockNumber>> {
        if !self.is_chained(first) {
            return Err(FsError::CorruptChain { first, block: first });
        }

        let mut blocks = vec![first];
        let mut current = first;

        while let Some(next) = self.successor(first, current)? {
            if blocks.len() == self.entries.len() {
                return Err(FsError::CorruptChain { first, block: next });
            }

            blocks.push(next);
            current = next;
        }

        Ok(blocks)
    }

    /// The block after `block` on the chain starting at `first`, or `None` if `block` ends it.
    ///
    /// A link must lead to a data block that is itself a link or the end of a chain.
    pub fn successor(&self, first: BlockNumber, block: BlockNumber) -> Result<Option<BlockNumber>> {
        match self.get(block) {
            Some(TableEntry::EndOfChain) => Ok(None),
            Some(TableEntry::Next(next)) if self.is_chained(next) => Ok(Some(next)),
            Some(TableEntry::Next(next)) => Err(FsError::CorruptChain { first, block: next }),
            _ => Err(FsError::CorruptChain { first, block }),
        }
    }

    fn is_chained(&self, block: BlockNumber) -> bool {
        block >= FIRST_DATA_BLOCK
            && matches!(
                self.get(block),
                Some(TableEntry::Next(_) | TableEntry::EndOfChain)
            )
    }
}
