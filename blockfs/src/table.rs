use log::debug;

use crate::bitmap::State;
use crate::error::{FsError, Result};
use crate::io::{BlockNumber, BlockStorage};
use crate::layout::{Layout, INODE_TABLE_START};
use crate::node::{read_block_id, FileAttr, Inode, InodeType, BLOCK_ID_SIZE, INVALID_BLOCK};

/// Logical inode number. Logical ids are raw table indices shifted by one, so 0 never
/// names an inode.
pub type InodeId = u64;

fn raw_to_logic(raw: usize) -> InodeId {
    raw as InodeId + 1
}

fn logic_to_raw(id: InodeId) -> usize {
    (id - 1) as usize
}

/// Maps inode ids to the block holding each inode record, and tracks which ids are live
/// with a bitmap of its own.
///
/// The table is an array of little endian block pointers indexed by raw id, spread over
/// consecutive blocks starting right after the superblock. The table never allocates data
/// blocks; callers reserve the block an inode lives in through the block allocator.
#[derive(Debug, Clone)]
pub struct InodeTable {
    layout: Layout,
}

impl InodeTable {
    /// Zeroes the table and the inode bitmap, leaving every inode free.
    pub fn format<T: BlockStorage + ?Sized>(dev: &mut T, layout: Layout) -> Result<Self> {
        for i in 0..layout.inode_table_blocks {
            dev.zero_block(INODE_TABLE_START + i)?;
        }
        layout.inode_bitmap.clear(dev)?;
        debug!(
            "inode table formatted: {} inodes, {} table blocks, {} bitmap blocks",
            layout.max_inodes,
            layout.inode_table_blocks,
            layout.inode_bitmap.blocks()
        );
        Ok(Self { layout })
    }

    /// Attaches to an inode table that already exists on the device.
    pub fn open(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn max_inodes(&self) -> usize {
        self.layout.max_inodes
    }

    fn check_id(&self, id: InodeId) -> Result<usize> {
        if id == 0 || id > self.layout.max_inodes as InodeId {
            return Err(FsError::InvalidArgument(format!("inode {} out of range", id)));
        }
        Ok(logic_to_raw(id))
    }

    fn table_slot(&self, raw: usize) -> (BlockNumber, usize) {
        let per_block = self.layout.table_entries_per_block();
        (
            INODE_TABLE_START + raw / per_block,
            (raw % per_block) * BLOCK_ID_SIZE,
        )
    }

    /// Claims the lowest free inode id, writes a fresh inode record of `kind` into `block`
    /// and binds the id to that block.
    pub fn allocate_inode<T: BlockStorage + ?Sized>(
        &self,
        dev: &mut T,
        kind: InodeType,
        block: BlockNumber,
    ) -> Result<InodeId> {
        if block == INVALID_BLOCK || block >= dev.total_blocks() {
            return Err(FsError::InvalidArgument(format!(
                "cannot place an inode in block {}",
                block
            )));
        }
        let raw = self
            .layout
            .inode_bitmap
            .allocate(dev)?
            .ok_or_else(|| FsError::OutOfResource("no free inode".to_string()))?;

        let block_size = dev.block_size();
        dev.write_block(block, &Inode::new(kind, block_size).serialize(block_size))?;
        self.set_table(dev, raw, block)?;

        let id = raw_to_logic(raw);
        debug!("allocated {:?} inode {} in block {}", kind, id, block);
        Ok(id)
    }

    /// Overwrites the table entry for raw id `raw` in place.
    pub fn set_table<T: BlockStorage + ?Sized>(
        &self,
        dev: &mut T,
        raw: usize,
        block: BlockNumber,
    ) -> Result<()> {
        let (table_block, offset) = self.table_slot(raw);
        dev.write_partial_block(table_block, &(block as u64).to_le_bytes(), offset)?;
        Ok(())
    }

    /// The block holding inode `id`, or `INVALID_BLOCK` if the id is not bound.
    pub fn get<T: BlockStorage + ?Sized>(&self, dev: &mut T, id: InodeId) -> Result<BlockNumber> {
        let raw = self.check_id(id)?;
        let (table_block, offset) = self.table_slot(raw);
        let mut buf = vec![0; dev.block_size()];
        dev.read_block(table_block, &mut buf)?;
        Ok(read_block_id(&buf[offset..]))
    }

    /// Reads the block holding inode `id` into `buf` and returns its block number.
    ///
    /// Fails when the table has no block for the id, even if the bitmap says the id is in
    /// use.
    pub fn read_inode<T: BlockStorage + ?Sized>(
        &self,
        dev: &mut T,
        id: InodeId,
        buf: &mut [u8],
    ) -> Result<BlockNumber> {
        let block = self.get(dev, id)?;
        if block == INVALID_BLOCK {
            return Err(FsError::InvalidArgument(format!(
                "inode {} is not bound to a block",
                id
            )));
        }
        dev.read_block(block, buf)?;
        Ok(block)
    }

    /// Reads and decodes inode `id`.
    pub fn load<T: BlockStorage + ?Sized>(
        &self,
        dev: &mut T,
        id: InodeId,
    ) -> Result<(BlockNumber, Inode)> {
        let mut buf = vec![0; dev.block_size()];
        let block = self.read_inode(dev, id, &mut buf)?;
        Ok((block, Inode::parse(&buf)?))
    }

    /// Releases inode `id` and clears its table entry. The inode's data blocks and the
    /// block holding the record itself are left alone.
    pub fn free_inode<T: BlockStorage + ?Sized>(&self, dev: &mut T, id: InodeId) -> Result<()> {
        let raw = self.check_id(id)?;
        if !self.layout.inode_bitmap.release(dev, raw)? {
            return Err(FsError::InvalidArgument(format!("inode {} is already free", id)));
        }
        self.set_table(dev, raw, INVALID_BLOCK)?;
        debug!("freed inode {}", id);
        Ok(())
    }

    pub fn is_allocated<T: BlockStorage + ?Sized>(&self, dev: &mut T, id: InodeId) -> Result<bool> {
        let raw = self.check_id(id)?;
        Ok(self.layout.inode_bitmap.state(dev, raw)? == State::Used)
    }

    pub fn get_attr<T: BlockStorage + ?Sized>(&self, dev: &mut T, id: InodeId) -> Result<FileAttr> {
        Ok(self.load(dev, id)?.1.attr)
    }

    pub fn get_type<T: BlockStorage + ?Sized>(
        &self,
        dev: &mut T,
        id: InodeId,
    ) -> Result<InodeType> {
        Ok(self.load(dev, id)?.1.kind())
    }

    pub fn get_type_attr<T: BlockStorage + ?Sized>(
        &self,
        dev: &mut T,
        id: InodeId,
    ) -> Result<(InodeType, FileAttr)> {
        let (_, node) = self.load(dev, id)?;
        Ok((node.kind(), node.attr))
    }

    /// Free inode ids, counted only over the `max_inodes` bits the bitmap tracks.
    pub fn free_inode_cnt<T: BlockStorage + ?Sized>(&self, dev: &mut T) -> Result<usize> {
        self.layout.inode_bitmap.count_free(dev)
    }
}
