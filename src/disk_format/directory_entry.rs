use std::{
    fmt::{self, Debug},
    mem::size_of,
};

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{
    error::{FsError, Result},
    flatfs::BlockNumber,
};

use super::block::{Block, BLOCK_SIZE};

/// The number of bytes occupied by a directory entry.
pub const DIRECTORY_ENTRY_SIZE: usize = 32;
const_assert!(size_of::<DirectoryEntry>() == DIRECTORY_ENTRY_SIZE);

const_assert!(BLOCK_SIZE % DIRECTORY_ENTRY_SIZE == 0);
/// The number of directory entries, and therefore files, on a volume. The whole directory fits
/// in one block.
pub const DIRECTORY_ENTRIES: usize = BLOCK_SIZE / DIRECTORY_ENTRY_SIZE;

/// The maximum supported size of a file name, excluding the nul-terminator.
pub const MAX_NAME_LEN: usize = 24;
const NAME_FIELD_LEN: usize = MAX_NAME_LEN + 1;
const_assert!(size_of::<DirectoryEntryName>() == NAME_FIELD_LEN);

/// An unused directory entry, as written by a format.
pub const FREE_DIRECTORY_ENTRY: DirectoryEntry = DirectoryEntry {
    state: EntryState::Unused,
    name: DirectoryEntryName([0; NAME_FIELD_LEN]),
    first_block: u16::MAX,
    size: 0,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum EntryState {
    /// The slot is available for a new file.
    Unused = 0,
    /// The slot describes a file.
    Used = 1,
}

/// A directory entry. `first_block` and `size` are meaningful only for used entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct DirectoryEntry {
    pub state: EntryState,
    /// The name of the file.
    pub name: DirectoryEntryName,
    /// The first block of the file's chain.
    pub first_block: u16,
    /// The number of bytes flushed to the file's chain.
    pub size: u32,
}

impl DirectoryEntry {
    /// Constructs a used, empty [`DirectoryEntry`] instance.
    pub fn new(name: DirectoryEntryName, first_block: BlockNumber) -> DirectoryEntry {
        DirectoryEntry {
            state: EntryState::Used,
            name,
            first_block: first_block as u16,
            size: 0,
        }
    }

    pub fn is_used(&self) -> bool {
        self.state == EntryState::Used
    }

    pub fn first_block(&self) -> BlockNumber {
        self.first_block as BlockNumber
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }
}

/// A name, as used in [`DirectoryEntry`].
///
/// Names are at most [`MAX_NAME_LEN`] bytes long and stored nul-padded.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(C)]
pub struct DirectoryEntryName([u8; NAME_FIELD_LEN]);

impl DirectoryEntryName {
    /// The name without its nul padding.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self
            .0
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(NAME_FIELD_LEN);

        &self.0[..len]
    }

    /// Exact, case-sensitive comparison.
    pub fn matches(&self, name: &str) -> bool {
        self.as_bytes() == name.as_bytes()
    }
}

impl Debug for DirectoryEntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DirectoryEntryName")
            .field(&String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

impl TryFrom<&str> for DirectoryEntryName {
    type Error = FsError;

    fn try_from(value: &str) -> Result<Self> {
        let bytes = value.as_bytes();

        if bytes.is_empty() || bytes.contains(&0) {
            return Err(FsError::InvalidName(value.to_owned()));
        }

        if bytes.len() > MAX_NAME_LEN {
            return Err(FsError::NameTooLong(value.to_owned()));
        }

        let mut converted = [0; NAME_FIELD_LEN];
        converted[0..bytes.len()].copy_from_slice(bytes);

        Ok(DirectoryEntryName(converted))
    }
}

impl fmt::Display for DirectoryEntryName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// Parses the directory block.
pub fn read_directory(block: &Block) -> Result<Vec<DirectoryEntry>> {
    block
        .chunks_exact(DIRECTORY_ENTRY_SIZE)
        .map(bincode::deserialize::<DirectoryEntry>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| err.into())
}

/// Serializes a full directory into its block.
pub fn write_directory(entries: &[DirectoryEntry]) -> Result<Block> {
    let mut block = [0; BLOCK_SIZE];

    for (entry, bytes) in entries
        .iter()
        .zip(block.chunks_exact_mut(DIRECTORY_ENTRY_SIZE))
    {
        bytes.copy_from_slice(&bincode::serialize(entry)?);
    }

    Ok(block)
}
