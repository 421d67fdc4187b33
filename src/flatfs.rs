use log::{debug, info, warn};

use crate::{
    disk_format::{
        allocation_table::{AllocationTable, TableEntry},
        block::BLOCK_SIZE,
        directory_entry::{
            read_directory, write_directory, DirectoryEntry, DirectoryEntryName,
            DIRECTORY_ENTRIES, FREE_DIRECTORY_ENTRY,
        },
        layout::{DIRECTORY_BLOCK, MAX_BLOCKS, MIN_BLOCKS, TABLE_BLOCKS},
    },
    error::{FsError, Result},
    file_handle::{FileHandle, OpenMode},
    storage::BlockStorage,
};

// block numbers are 16-bit on the disk, but we use `usize`s to avoid littering the code with
// casts.
pub type BlockNumber = usize;

/// The index of a file's directory entry. While the file is open it also names its handle.
pub type FileId = usize;

/// A file, as reported by [`FlatFs::list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: usize,
}

/// A mounted volume.
///
/// The allocation table and the directory are loaded once by [`FlatFs::mount`]. Every
/// operation that changes them writes both back in full before it returns.
pub struct FlatFs<S: BlockStorage> {
    storage: S,
    num_blocks: usize,
    pub(crate) table: AllocationTable,
    pub(crate) directory: Vec<DirectoryEntry>,
    /// One slot per directory entry.
    handles: Vec<Option<FileHandle>>,
}

impl<S: BlockStorage> FlatFs<S> {
    pub fn mount(storage: S) -> Result<Self> {
        let num_blocks = storage.num_blocks();
        if !(MIN_BLOCKS..=MAX_BLOCKS).contains(&num_blocks) {
            return Err(FsError::InvalidGeometry(num_blocks));
        }

        info!("{num_blocks} total blocks");

        let table_blocks = (0..TABLE_BLOCKS)
            .map(|block_number| storage.read_block(block_number))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let table = AllocationTable::from_blocks(&table_blocks, num_blocks);

        // an unformatted directory block holds garbage, so we only parse it on formatted volumes
        let directory = if table.is_formatted() {
            read_directory(&storage.read_block(DIRECTORY_BLOCK)?)?
        } else {
            warn!("volume is not formatted");
            vec![FREE_DIRECTORY_ENTRY; DIRECTORY_ENTRIES]
        };

        info!("{} free blocks", table.num_free_blocks());

        Ok(FlatFs {
            storage,
            num_blocks,
            table,
            directory,
            handles: (0..DIRECTORY_ENTRIES).map(|_| None).collect(),
        })
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Unmounts the volume. Open handles are dropped without flushing.
    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn is_formatted(&self) -> bool {
        self.table.is_formatted()
    }

    /// Discards every file and open handle and writes an empty table and directory.
    pub fn format(&mut self) -> Result<()> {
        let num_blocks = self.num_blocks;

        self.commit(|table, directory| {
            *table = AllocationTable::formatted(num_blocks);
            directory.fill(FREE_DIRECTORY_ENTRY);

            Ok(())
        })?;

        self.handles.iter_mut().for_each(|handle| *handle = None);

        info!(
            "formatted volume with {} free blocks",
            self.table.num_free_blocks()
        );
        Ok(())
    }

    /// The number of bytes in free blocks.
    pub fn free_space(&self) -> Result<usize> {
        self.ensure_formatted()?;

        Ok(self.table.num_free_blocks() * BLOCK_SIZE)
    }

    /// Lists files in directory order.
    pub fn list(&self) -> Result<Vec<FileInfo>> {
        self.ensure_formatted()?;

        Ok(self
            .directory
            .iter()
            .filter(|entry| entry.is_used())
            .map(|entry| FileInfo {
                name: entry.name.to_string(),
                size: entry.size(),
            })
            .collect())
    }

    /// Creates an empty file holding a single block.
    pub fn create(&mut self, name: &str) -> Result<FileId> {
        self.ensure_formatted()?;

        let file = self.commit(|table, directory| create_entry(table, directory, name))?;

        info!("[file #{file}] created {name:?}");
        Ok(file)
    }

    /// Removes a file and frees its chain. An open handle on the file is dropped.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.ensure_formatted()?;

        let file = self.commit(|table, directory| remove_entry(table, directory, name))?;
        self.handles[file] = None;

        info!("[file #{file}] removed {name:?}");
        Ok(())
    }

    /// The blocks of a file's chain, in order.
    pub fn chain(&self, name: &str) -> Result<Vec<BlockNumber>> {
        self.ensure_formatted()?;

        let file = find_entry(&self.directory, name)
            .ok_or_else(|| FsError::NotFound(name.to_owned()))?;

        self.table.chain(self.directory[file].first_block())
    }

    /// Opens a file and returns its handle.
    ///
    /// Opening for [`OpenMode::Write`] replaces any existing file of that name with a new, empty
    /// one. A file being written can't be opened for reading until its handle is closed.
    pub fn open(&mut self, name: &str, mode: OpenMode) -> Result<FileId> {
        self.ensure_formatted()?;

        let file = match mode {
            OpenMode::Read => {
                let file = find_entry(&self.directory, name)
                    .ok_or_else(|| FsError::NotFound(name.to_owned()))?;

                if let Some(handle) = &self.handles[file] {
                    if handle.mode != mode {
                        return Err(FsError::AlreadyOpen {
                            handle: file,
                            mode: handle.mode,
                        });
                    }
                }

                file
            }
            OpenMode::Write => {
                let (removed, file) = self.commit(|table, directory| {
                    let removed = match remove_entry(table, directory, name) {
                        Ok(file) => Some(file),
                        Err(FsError::NotFound(_)) => None,
                        Err(err) => return Err(err),
                    };

                    let file = create_entry(table, directory, name)?;

                    Ok((removed, file))
                })?;

                if let Some(removed) = removed {
                    if let Some(handle) = self.handles[removed].take() {
                        if handle.mode == OpenMode::Write && handle.buffer_pointer != 0 {
                            warn!(
                                "[file #{removed}] truncated with {} unflushed bytes",
                                handle.buffer_pointer
                            );
                        }
                    }
                }

                file
            }
        };

        let first_block = self.directory[file].first_block();
        self.handles[file] = Some(FileHandle::new(mode, first_block));

        debug!("[file #{file}] opened {name:?} for {mode}");
        Ok(file)
    }

    /// Closes a handle. A write handle first flushes what it has buffered; if that fails the
    /// handle stays open, so the caller can retry or [`discard`](Self::discard) it.
    pub fn close(&mut self, file: FileId) -> Result<()> {
        self.ensure_formatted()?;

        let handle = self.handle(file)?;
        if handle.mode == OpenMode::Write && handle.buffer_pointer != 0 {
            self.flush(file)?;
        }

        self.handles[file] = None;

        debug!("[file #{file}] closed");
        Ok(())
    }

    /// Drops a handle without flushing it. Buffered bytes are lost.
    pub fn discard(&mut self, file: FileId) -> Result<()> {
        let handle = self.handle(file)?;
        if handle.mode == OpenMode::Write && handle.buffer_pointer != 0 {
            warn!(
                "[file #{file}] discarding {} unflushed bytes",
                handle.buffer_pointer
            );
        }

        self.handles[file] = None;

        Ok(())
    }

    /// Appends `data` to a file open for writing and returns the number of bytes accepted.
    pub fn write(&mut self, file: FileId, data: &[u8]) -> Result<usize> {
        self.ensure_formatted()?;

        let mut written = 0;
        loop {
            let handle = open_handle(&mut self.handles, file, OpenMode::Write)?;

            // a full buffer is flushed right away. it is still full here only if that failed
            if handle.is_buffer_full() {
                self.flush(file)?;
                continue;
            }

            if written == data.len() {
                break;
            }

            written += handle.fill(&data[written..]);
        }

        info!("[file #{file}] wrote {written} bytes");
        Ok(written)
    }

    /// Reads from a file open for reading into `out`. Returns the number of bytes read, which is
    /// zero once the end of the file is reached.
    pub fn read(&mut self, file: FileId, out: &mut [u8]) -> Result<usize> {
        self.ensure_formatted()?;

        let FlatFs {
            storage,
            table,
            directory,
            handles,
            ..
        } = self;

        let handle = open_handle(handles, file, OpenMode::Read)?;
        let end = directory[file].size();

        let mut read = 0;
        while read < out.len() && handle.global_index < end {
            if handle.is_buffer_full() {
                match table.successor(directory[file].first_block(), handle.block_pointer)? {
                    Some(next) => handle.advance_to(next),
                    None => {
                        warn!("[file #{file}] chain ends before the recorded size of {end} bytes");
                        break;
                    }
                }
            }

            if !handle.buffer_loaded {
                *handle.buffer = storage.read_block(handle.block_pointer)?;
                handle.buffer_loaded = true;
            }

            read += handle.drain(&mut out[read..], end);
        }

        debug!("[file #{file}] read {read} bytes");
        Ok(read)
    }

    /// Writes the buffer of a write handle to its block, then chains a fresh block after it and
    /// adds the flushed bytes to the file's size.
    fn flush(&mut self, file: FileId) -> Result<()> {
        let handle = open_handle(&mut self.handles, file, OpenMode::Write)?;
        let current = handle.block_pointer;
        let len = handle.buffer_pointer;

        self.storage.write_block(current, &handle.buffer)?;

        let next = self.commit(|table, directory| {
            let next = table.next_free_block().ok_or(FsError::DiskFull)?;

            table.set(current, TableEntry::Next(next));
            table.set(next, TableEntry::EndOfChain);
            directory[file].size += len as u32;

            Ok(next)
        })?;

        if let Some(handle) = self.handles[file].as_mut() {
            handle.advance_to(next);
        }

        debug!("[file #{file}] flushed {len} bytes from block {current}, continuing in {next}");
        Ok(())
    }

    /// Applies `update` to copies of the table and directory and writes the copies to disk. The
    /// copies replace the in-memory structures only once every write succeeded.
    fn commit<T, F>(&mut self, update: F) -> Result<T>
    where
        F: FnOnce(&mut AllocationTable, &mut [DirectoryEntry]) -> Result<T>,
    {
        let mut table = self.table.clone();
        let mut directory = self.directory.clone();

        let value = update(&mut table, directory.as_mut_slice())?;

        for (block_number, block) in table.to_blocks().iter().enumerate() {
            self.storage.write_block(block_number, block)?;
        }
        self.storage
            .write_block(DIRECTORY_BLOCK, &write_directory(&directory)?)?;

        self.table = table;
        self.directory = directory;

        Ok(value)
    }

    fn handle(&self, file: FileId) -> Result<&FileHandle> {
        self.handles
            .get(file)
            .and_then(Option::as_ref)
            .ok_or(FsError::NotOpen(file))
    }

    fn ensure_formatted(&self) -> Result<()> {
        if !self.is_formatted() {
            return Err(FsError::Unformatted);
        }

        Ok(())
    }
}

fn open_handle(
    handles: &mut [Option<FileHandle>],
    file: FileId,
    mode: OpenMode,
) -> Result<&mut FileHandle> {
    let handle = handles
        .get_mut(file)
        .and_then(Option::as_mut)
        .ok_or(FsError::NotOpen(file))?;

    if handle.mode != mode {
        return Err(FsError::WrongMode {
            handle: file,
            expected: mode,
        });
    }

    Ok(handle)
}

fn find_entry(directory: &[DirectoryEntry], name: &str) -> Option<FileId> {
    directory
        .iter()
        .position(|entry| entry.is_used() && entry.name.matches(name))
}

/// Claims the first unused directory entry for an empty file and gives it one block.
fn create_entry(
    table: &mut AllocationTable,
    directory: &mut [DirectoryEntry],
    name: &str,
) -> Result<FileId> {
    if find_entry(directory, name).is_some() {
        return Err(FsError::NameConflict(name.to_owned()));
    }

    let file = directory
        .iter()
        .position(|entry| !entry.is_used())
        .ok_or(FsError::NamespaceFull)?;

    let name = DirectoryEntryName::try_from(name)?;
    let first_block = table.next_free_block().ok_or(FsError::DiskFull)?;

    table.set(first_block, TableEntry::EndOfChain);
    directory[file] = DirectoryEntry::new(name, first_block);

    Ok(file)
}

/// Frees every block on a file's chain and clears its directory entry.
fn remove_entry(
    table: &mut AllocationTable,
    directory: &mut [DirectoryEntry],
    name: &str,
) -> Result<FileId> {
    let file = find_entry(directory, name).ok_or_else(|| FsError::NotFound(name.to_owned()))?;

    for block in table.chain(directory[file].first_block())? {
        table.set(block, TableEntry::Free);
    }

    directory[file] = FREE_DIRECTORY_ENTRY;

    Ok(file)
}
