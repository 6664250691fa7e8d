use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    /// Malformed or out-of-range id, double free, or a missing indirect block.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// No free block or inode is left, or a write exceeds the maximum file size.
    #[error("out of resource: {0}")]
    OutOfResource(String),
    #[error("found no entry with that name")]
    DoesNotExist,
    #[error("an entry with that name already exists")]
    AlreadyExists,
    #[error("directory is not empty")]
    NotEmpty,
    /// An on-disk structure failed validation when it was read back.
    #[error("corrupt file system: {0}")]
    Corrupt(String),
    #[error("block device error")]
    Device(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
