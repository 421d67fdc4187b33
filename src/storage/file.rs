use std::fs::File;
use std::os::unix::prelude::FileExt;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use log::info;

use crate::disk_format::block::{Block, BLOCK_SIZE};
use crate::flatfs::BlockNumber;

use super::block_storage::BlockStorage;

/// A disk image on the host file system.
pub struct FileBackedStorage {
    file: File,
    num_blocks: usize,
}

impl FileBackedStorage {
    /// Wraps an open image. The image's length determines the number of blocks; a trailing
    /// partial block is ignored.
    pub fn new(file: File) -> Result<Self> {
        let len = file.metadata().context("reading image metadata")?.len();

        Ok(FileBackedStorage {
            file,
            num_blocks: len as usize / BLOCK_SIZE,
        })
    }

    /// Opens the image at `path` for reading and writing. If there is no such image, a new one of
    /// `size_hint` blocks is created.
    pub fn open_or_create(path: &Path, size_hint: Option<usize>) -> Result<Self> {
        if path.exists() {
            ensure!(
                path.is_file(),
                "image is not a regular file: {}",
                path.display()
            );

            let file = File::options()
                .read(true)
                .write(true)
                .open(path)
                .context("opening existing image")?;

            return Self::new(file);
        }

        let num_blocks = size_hint.unwrap_or(0);
        ensure!(
            num_blocks > 0,
            "a new image can't have size zero: {}",
            path.display()
        );

        let file = File::options()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .context("creating new image")?;

        file.set_len((num_blocks * BLOCK_SIZE) as u64)
            .context("resizing new image")?;

        info!("created image {} with {num_blocks} blocks", path.display());

        Ok(FileBackedStorage { file, num_blocks })
    }

    fn position(&self, block_number: BlockNumber) -> Result<u64> {
        ensure!(
            block_number < self.num_blocks,
            "block number out of bounds: {block_number}"
        );

        Ok((block_number * BLOCK_SIZE) as u64)
    }
}

impl BlockStorage for FileBackedStorage {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_number: BlockNumber) -> Result<Block> {
        let mut buf = [0; BLOCK_SIZE];
        let position = self.position(block_number)?;

        self.file
            .read_exact_at(&mut buf, position)
            .with_context(|| format!("reading block {block_number}"))?;

        Ok(buf)
    }

    fn write_block(&self, block_number: BlockNumber, block: &Block) -> Result<()> {
        let position = self.position(block_number)?;

        self.file
            .write_all_at(block, position)
            .with_context(|| format!("writing block {block_number}"))?;
        self.file.sync_data().context("syncing image")?;

        Ok(())
    }
}
