use std::collections::HashSet;

use anyhow::{bail, ensure, Context, Result};
use bitvec::prelude::*;
use log::{info, warn};

use crate::{
    disk_format::{allocation_table::TableEntry, block::BLOCK_SIZE, layout::RESERVED_BLOCKS},
    flatfs::FlatFs,
    storage::BlockStorage,
};

impl<S: BlockStorage> FlatFs<S> {
    /// Verifies the volume's metadata.
    ///
    /// Every used entry must have a unique name and a well-formed chain that no other file
    /// shares, long enough to hold the recorded size. Every data block outside the chains must
    /// be free.
    pub fn check(&self) -> Result<()> {
        ensure!(self.is_formatted(), "volume is not formatted");

        let num_blocks = self.table.len();

        let mut owned = bitvec![0; num_blocks];
        owned[..RESERVED_BLOCKS].fill(true);

        let mut names = HashSet::new();

        for (file, entry) in self.directory.iter().enumerate() {
            if !entry.is_used() {
                if !entry.name.as_bytes().is_empty() {
                    warn!("[entry #{file}] unused entry carries the name {}", entry.name);
                }

                continue;
            }

            ensure!(
                names.insert(entry.name.clone()),
                "[entry #{file}] duplicate name {}",
                entry.name
            );

            let chain = self
                .table
                .chain(entry.first_block())
                .with_context(|| format!("[entry #{file}] walking the chain of {}", entry.name))?;

            for &block in &chain {
                if owned[block] {
                    bail!(
                        "[entry #{file}] block {block} of {} is already in use",
                        entry.name
                    );
                }

                owned.set(block, true);
            }

            ensure!(
                entry.size() <= chain.len() * BLOCK_SIZE,
                "[entry #{file}] size {} of {} exceeds its {} blocks",
                entry.size(),
                entry.name,
                chain.len()
            );
        }

        for block in owned.iter_zeros() {
            match self.table.get(block) {
                Some(TableEntry::Free) => {}
                entry => bail!("block {block} is not on any chain but marked {entry:?}"),
            }
        }

        info!(
            "{} files, {} of {num_blocks} blocks in use",
            names.len(),
            owned.count_ones()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        disk_format::directory_entry::DirectoryEntryName, file_handle::OpenMode,
        storage::MemoryStorage,
    };

    use super::*;

    fn populated_fs() -> FlatFs<MemoryStorage> {
        let mut fs = FlatFs::mount(MemoryStorage::new(64)).unwrap();
        fs.format().unwrap();

        let file = fs.open("a", OpenMode::Write).unwrap();
        fs.write(file, &[1; 5000]).unwrap();
        fs.close(file).unwrap();
        fs.create("b").unwrap();

        fs
    }

    #[test]
    fn test_clean_volume() {
        let fs = populated_fs();

        fs.check().unwrap();
    }

    #[test]
    fn test_unformatted_volume() {
        let fs = FlatFs::mount(MemoryStorage::new(64)).unwrap();

        assert!(fs.check().is_err());
    }

    #[test]
    fn test_leaked_block() {
        let mut fs = populated_fs();
        fs.table.set(60, TableEntry::EndOfChain);

        let err = fs.check().unwrap_err();
        assert!(err.to_string().contains("block 60"));
    }

    #[test]
    fn test_shared_block() {
        let mut fs = populated_fs();
        // point b's single block into a's chain
        let a = fs.chain("a").unwrap();
        fs.directory[1].first_block = a[1] as u16;

        let err = fs.check().unwrap_err();
        assert!(err.to_string().contains("already in use"));
    }

    #[test]
    fn test_broken_chain() {
        let mut fs = populated_fs();
        fs.table.set(33, TableEntry::Free);

        assert!(fs.check().is_err());
    }

    #[test]
    fn test_oversized_entry() {
        let mut fs = populated_fs();
        fs.directory[1].size = BLOCK_SIZE as u32 + 1;

        let err = fs.check().unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_duplicate_name() {
        let mut fs = populated_fs();
        fs.directory[1].name = DirectoryEntryName::try_from("a").unwrap();

        let err = fs.check().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
