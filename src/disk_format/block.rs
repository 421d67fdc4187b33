use std::mem::size_of;

/// size of a block in bytes. the device and the filesystem share this unit.
pub const BLOCK_SIZE: usize = 4096;

pub type Block = [u8; BLOCK_SIZE];
const_assert!(size_of::<Block>() == BLOCK_SIZE);

/// An all-zero block.
pub const EMPTY_BLOCK: Block = [0; BLOCK_SIZE];
