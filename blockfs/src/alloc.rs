use log::debug;

use crate::bitmap::BitmapRegion;
use crate::error::{FsError, Result};
use crate::io::{BlockNumber, BlockStorage};

/// Blocks `[0, end)` that are marked used when a fresh allocator is created: everything
/// before the allocator's bitmap (superblock, inode metadata) plus the bitmap itself.
///
/// Reservation only happens once, while initializing. `allocate` has no notion of it; a
/// reserved block released through `deallocate` is handed out like any other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservedRange {
    pub end: BlockNumber,
}

/// First-fit block allocator over a bitmap covering every block of the device. Each call
/// rescans from the front, so a block freed anywhere is handed out again before any higher
/// one.
#[derive(Debug, Clone)]
pub struct BlockAllocator {
    bitmap: BitmapRegion,
    total_blocks: usize,
}

impl BlockAllocator {
    fn region_for<T: BlockStorage + ?Sized>(
        dev: &T,
        bitmap_start: BlockNumber,
    ) -> Result<BitmapRegion> {
        let total = dev.total_blocks();
        if total == 0 {
            return Err(FsError::InvalidArgument("device has no blocks".to_string()));
        }
        let region = BitmapRegion::new(bitmap_start, total, dev.block_size());
        if bitmap_start + region.blocks() > total {
            return Err(FsError::InvalidArgument(format!(
                "block bitmap at {} needs {} blocks but the device only has {}",
                bitmap_start,
                region.blocks(),
                total
            )));
        }
        Ok(region)
    }

    /// Creates an allocator whose bitmap starts at `bitmap_start` and initializes it: the
    /// bitmap blocks are zeroed and then every block below the end of the bitmap is reserved.
    pub fn format<T: BlockStorage + ?Sized>(
        dev: &mut T,
        bitmap_start: BlockNumber,
    ) -> Result<Self> {
        let bitmap = Self::region_for(&*dev, bitmap_start)?;
        let allocator = Self {
            bitmap,
            total_blocks: dev.total_blocks(),
        };
        bitmap.clear(dev)?;
        let reserved = allocator.reserved_range();
        bitmap.reserve(dev, 0..reserved.end)?;
        debug!(
            "block bitmap formatted at {} ({} blocks), reserved blocks [0, {})",
            bitmap_start,
            bitmap.blocks(),
            reserved.end
        );
        Ok(allocator)
    }

    /// Attaches to a bitmap that already exists on the device without modifying it.
    pub fn open<T: BlockStorage + ?Sized>(dev: &T, bitmap_start: BlockNumber) -> Result<Self> {
        Ok(Self {
            bitmap: Self::region_for(dev, bitmap_start)?,
            total_blocks: dev.total_blocks(),
        })
    }

    pub fn reserved_range(&self) -> ReservedRange {
        ReservedRange {
            end: self.bitmap.start() + self.bitmap.blocks(),
        }
    }

    pub fn bitmap_start(&self) -> BlockNumber {
        self.bitmap.start()
    }

    pub fn bitmap_blocks(&self) -> usize {
        self.bitmap.blocks()
    }

    /// Bits used in the final bitmap block.
    pub fn last_block_bits(&self) -> usize {
        self.bitmap.last_block_bits()
    }

    /// Claims the lowest free block.
    pub fn allocate<T: BlockStorage + ?Sized>(&self, dev: &mut T) -> Result<BlockNumber> {
        match self.bitmap.allocate(dev)? {
            Some(block) => {
                debug!("allocated block {}", block);
                Ok(block)
            }
            None => Err(FsError::OutOfResource("no free data block".to_string())),
        }
    }

    /// Returns `block` to the free pool. Releasing a block that is already free is an error.
    pub fn deallocate<T: BlockStorage + ?Sized>(
        &self,
        dev: &mut T,
        block: BlockNumber,
    ) -> Result<()> {
        if block >= self.total_blocks {
            return Err(FsError::InvalidArgument(format!("block {} out of range", block)));
        }
        if !self.bitmap.release(dev, block)? {
            return Err(FsError::InvalidArgument(format!("block {} is already free", block)));
        }
        debug!("released block {}", block);
        Ok(())
    }

    pub fn free_block_cnt<T: BlockStorage + ?Sized>(&self, dev: &mut T) -> Result<usize> {
        self.bitmap.count_free(dev)
    }
}
