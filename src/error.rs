use thiserror::Error;

use crate::{
    file_handle::OpenMode,
    flatfs::{BlockNumber, FileId},
};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FsError {
    #[error("file system is not formatted")]
    Unformatted,
    #[error("file already exists: {0}")]
    NameConflict(String),
    #[error("file name is too long: {0}")]
    NameTooLong(String),
    #[error("invalid file name: {0:?}")]
    InvalidName(String),
    #[error("no free directory entries left")]
    NamespaceFull,
    #[error("file does not exist: {0}")]
    NotFound(String),
    #[error("file handle {0} is not open")]
    NotOpen(FileId),
    #[error("file handle {handle} is already open for {mode}")]
    AlreadyOpen { handle: FileId, mode: OpenMode },
    #[error("file handle {handle} is not open for {expected}")]
    WrongMode { handle: FileId, expected: OpenMode },
    #[error("no free blocks left on the volume")]
    DiskFull,
    #[error("corrupted block chain starting at block {first}: bad link at block {block}")]
    CorruptChain {
        first: BlockNumber,
        block: BlockNumber,
    },
    #[error("unsupported device size of {0} blocks")]
    InvalidGeometry(usize),
    #[error("malformed on-disk metadata")]
    Metadata(#[from] bincode::Error),
    #[error("device I/O failure")]
    DeviceIo(#[from] anyhow::Error),
}

pub type Result<T, E = FsError> = std::result::Result<T, E>;
