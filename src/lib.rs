mod check;
pub mod disk_format;
pub mod error;
pub mod file_handle;
pub mod flatfs;
pub mod shell;
pub mod storage;

pub use disk_format::block::BLOCK_SIZE;
pub use error::{FsError, Result};
pub use file_handle::OpenMode;
pub use flatfs::{BlockNumber, FileId, FileInfo, FlatFs};
