use crate::bitmap::BitmapRegion;
use crate::error::{FsError, Result};
use crate::io::BlockNumber;
use crate::node::{Inode, BLOCK_ID_SIZE};

/// Known locations.
pub const SUPERBLOCK_INDEX: BlockNumber = 0;
pub const INODE_TABLE_START: BlockNumber = 1;

/// Where every metadata region lives for a given geometry.
///
/// # Layout
/// ===============================================================================
/// | SuperBlock | Inode table | Bitmap (inodes) | Bitmap (all blocks) | Data ... |
/// ===============================================================================
///
/// The block bitmap covers the whole device, so its own blocks and everything in front
/// of it are reserved when it is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub block_size: usize,
    pub total_blocks: usize,
    pub max_inodes: usize,
    pub inode_table_blocks: usize,
    pub inode_bitmap: BitmapRegion,
    pub data_bitmap: BitmapRegion,
}

impl Layout {
    pub fn new(block_size: usize, total_blocks: usize, max_inodes: usize) -> Result<Self> {
        if block_size % BLOCK_ID_SIZE != 0 || block_size < Inode::min_block_size() {
            return Err(FsError::InvalidArgument(format!(
                "block size {} must be a multiple of {} and at least {}",
                block_size,
                BLOCK_ID_SIZE,
                Inode::min_block_size()
            )));
        }
        if max_inodes == 0 {
            return Err(FsError::InvalidArgument(
                "file system needs room for at least one inode".to_string(),
            ));
        }

        let entries_per_block = block_size / BLOCK_ID_SIZE;
        let inode_table_blocks = (max_inodes + entries_per_block - 1) / entries_per_block;
        let inode_bitmap = BitmapRegion::new(
            INODE_TABLE_START + inode_table_blocks,
            max_inodes,
            block_size,
        );
        let data_bitmap = BitmapRegion::new(
            inode_bitmap.start() + inode_bitmap.blocks(),
            total_blocks,
            block_size,
        );

        let layout = Self {
            block_size,
            total_blocks,
            max_inodes,
            inode_table_blocks,
            inode_bitmap,
            data_bitmap,
        };
        if layout.first_data_block() >= total_blocks {
            return Err(FsError::InvalidArgument(format!(
                "{} blocks cannot hold {} blocks of metadata and any data",
                total_blocks,
                layout.first_data_block()
            )));
        }
        Ok(layout)
    }

    /// Inode table entries stored per table block.
    pub fn table_entries_per_block(&self) -> usize {
        self.block_size / BLOCK_ID_SIZE
    }

    /// The first block the allocator may hand out on a freshly formatted device.
    pub fn first_data_block(&self) -> BlockNumber {
        self.data_bitmap.start() + self.data_bitmap.blocks()
    }
}
