//! An inode based file system over fixed-size block storage.
//!
//! The pieces stack up as follows: a bitmap block allocator hands out blocks, an inode table
//! maps inode ids to the block holding each inode, files are addressed through direct and
//! single indirect block pointers, and directories are files whose content is a flat
//! `name:id/` list.
//!
//! ```
//! use blockfs::io::MemoryBlockDevice;
//! use blockfs::{FileSystem, FormatOptions};
//!
//! let dev = MemoryBlockDevice::new(4096, 256);
//! let mut fs = FileSystem::create(dev, FormatOptions::default()).unwrap();
//! let root = fs.root();
//! let id = fs.mkfile(root, "hello.txt").unwrap();
//! fs.write_file(id, b"hello").unwrap();
//! assert_eq!(fs.read_file(id).unwrap(), b"hello");
//! ```
pub mod alloc;
pub mod bitmap;
mod dir;
mod error;
mod fs;
pub mod io;
pub mod layout;
pub mod node;
mod sb;
pub mod table;

pub use crate::dir::{Directory, DirectoryEntry};
pub use crate::error::{FsError, Result};
pub use crate::fs::{FileSystem, FormatOptions, ROOT_INODE};
pub use crate::node::{FileAttr, InodeType, INVALID_BLOCK};
pub use crate::sb::SuperBlock;
pub use crate::table::InodeId;
