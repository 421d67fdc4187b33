use std::fmt;

use crate::{
    disk_format::block::{Block, BLOCK_SIZE, EMPTY_BLOCK},
    flatfs::BlockNumber,
};

/// The direction a file is opened in. A handle never changes direction while open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Truncates the file on open.
    Write,
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::Read => write!(f, "reading"),
            OpenMode::Write => write!(f, "writing"),
        }
    }
}

/// The sequential cursor of an open file.
///
/// A write handle fills `buffer` and flushes it into `block_pointer` once full. A read handle
/// drains `buffer`, which mirrors `block_pointer` while `buffer_loaded` is set.
pub(crate) struct FileHandle {
    pub mode: OpenMode,
    /// The block being filled or drained.
    pub block_pointer: BlockNumber,
    pub buffer: Box<Block>,
    /// The cursor within `buffer`.
    pub buffer_pointer: usize,
    /// The number of bytes read since the file was opened.
    pub global_index: usize,
    pub buffer_loaded: bool,
}

impl FileHandle {
    pub fn new(mode: OpenMode, first_block: BlockNumber) -> Self {
        FileHandle {
            mode,
            block_pointer: first_block,
            buffer: Box::new(EMPTY_BLOCK),
            buffer_pointer: 0,
            global_index: 0,
            buffer_loaded: false,
        }
    }

    pub fn is_buffer_full(&self) -> bool {
        self.buffer_pointer == BLOCK_SIZE
    }

    pub fn buffer_space(&self) -> usize {
        BLOCK_SIZE - self.buffer_pointer
    }

    /// Appends as much of `data` as the buffer can hold and returns how much that was.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let len = self.buffer_space().min(data.len());
        let start = self.buffer_pointer;

        self.buffer[start..start + len].copy_from_slice(&data[..len]);
        self.buffer_pointer += len;

        len
    }

    /// Moves the cursor to the start of block `next`.
    pub fn advance_to(&mut self, next: BlockNumber) {
        self.block_pointer = next;
        self.buffer_pointer = 0;
        self.buffer.fill(0);
        self.buffer_loaded = false;
    }

    /// Copies buffered bytes into `out`, without crossing the block boundary or position `end`
    /// of the file. Returns how many bytes were copied.
    pub fn drain(&mut self, out: &mut [u8], end: usize) -> usize {
        let len = self
            .buffer_space()
            .min(out.len())
            .min(end.saturating_sub(self.global_index));
        let start = self.buffer_pointer;

        out[..len].copy_from_slice(&self.buffer[start..start + len]);
        self.buffer_pointer += len;
        self.global_index += len;

        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_stops_at_block_boundary() {
        let mut handle = FileHandle::new(OpenMode::Write, 40);

        assert_eq!(handle.fill(&[1; 100]), 100);
        assert_eq!(handle.buffer_pointer, 100);

        assert_eq!(handle.fill(&vec![2; BLOCK_SIZE]), BLOCK_SIZE - 100);
        assert!(handle.is_buffer_full());
        assert_eq!(handle.fill(&[3; 10]), 0);
        assert_eq!(handle.buffer[99], 1);
        assert_eq!(handle.buffer[100], 2);
    }

    #[test]
    fn test_advance_resets_buffer() {
        let mut handle = FileHandle::new(OpenMode::Write, 40);
        handle.fill(&[7; 10]);
        handle.advance_to(41);

        assert_eq!(handle.block_pointer, 41);
        assert_eq!(handle.buffer_pointer, 0);
        assert_eq!(*handle.buffer, EMPTY_BLOCK);
    }

    #[test]
    fn test_drain_respects_file_end() {
        let mut handle = FileHandle::new(OpenMode::Read, 40);
        handle.buffer[..6].copy_from_slice(b"abcdef");

        let mut out = [0; 4];
        assert_eq!(handle.drain(&mut out, 6), 4);
        assert_eq!(&out, b"abcd");

        assert_eq!(handle.drain(&mut out, 6), 2);
        assert_eq!(&out[..2], b"ef");
        assert_eq!(handle.global_index, 6);

        assert_eq!(handle.drain(&mut out, 6), 0);
    }
}
