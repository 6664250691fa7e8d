use log::{debug, info, trace, warn};

use crate::alloc::BlockAllocator;
use crate::error::{FsError, Result};
use crate::io::{BlockNumber, BlockStorage};
use crate::layout::{Layout, SUPERBLOCK_INDEX};
use crate::node::{now, FileAttr, IndirectBlock, Inode, InodeType, INVALID_BLOCK};
use crate::sb::SuperBlock;
use crate::table::{InodeId, InodeTable};

/// The root directory is the first inode created on a fresh file system.
pub const ROOT_INODE: InodeId = 1;

const MIN_INODES: usize = 16;

/// Settings applied when formatting a device. Block size and block count come from the
/// device itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    max_inodes: Option<usize>,
}

impl FormatOptions {
    /// Sets the maximum number of files and directories. Defaults to one inode per eight
    /// blocks, but never fewer than 16.
    pub fn with_max_inodes(mut self, max_inodes: usize) -> Self {
        self.max_inodes = Some(max_inodes);
        self
    }

    fn max_inodes(&self, total_blocks: usize) -> usize {
        self.max_inodes.unwrap_or_else(|| (total_blocks / 8).max(MIN_INODES))
    }
}

fn calculate_block_count(size: u64, block_size: usize) -> usize {
    ((size + block_size as u64 - 1) / block_size as u64) as usize
}

/// A file system living on block storage: a block allocator and an inode table over a
/// single device, plus byte-level file access and flat text directories on top of them.
///
/// No operation is atomic across blocks. An error part way through leaves behind whatever
/// was written before it; the cases that leak blocks or inodes are called out on each
/// operation.
pub struct FileSystem<T: BlockStorage> {
    pub(crate) dev: T,
    super_block: SuperBlock,
    layout: Layout,
    pub(crate) allocator: BlockAllocator,
    pub(crate) inodes: InodeTable,
}

impl<T: BlockStorage> FileSystem<T> {
    /// Formats `dev` and creates the root directory.
    pub fn create(mut dev: T, options: FormatOptions) -> Result<Self> {
        let block_size = dev.block_size();
        let total_blocks = dev.total_blocks();
        let layout = Layout::new(block_size, total_blocks, options.max_inodes(total_blocks))?;

        let super_block = SuperBlock::new(block_size, total_blocks, layout.max_inodes);
        dev.write_block(SUPERBLOCK_INDEX, &super_block.serialize(block_size))?;
        let inodes = InodeTable::format(&mut dev, layout)?;
        let allocator = BlockAllocator::format(&mut dev, layout.data_bitmap.start())?;

        let mut fs = FileSystem {
            dev,
            super_block,
            layout,
            allocator,
            inodes,
        };
        let root = fs.alloc_inode(InodeType::Directory)?;
        if root != ROOT_INODE {
            return Err(FsError::Corrupt(format!(
                "root directory was created as inode {}",
                root
            )));
        }
        fs.dev.sync_disk()?;
        info!(
            "formatted {} blocks of {} bytes with room for {} inodes",
            total_blocks, block_size, layout.max_inodes
        );
        Ok(fs)
    }

    /// Mounts a device that already holds a file system. Nothing on the device is modified.
    pub fn open(mut dev: T) -> Result<Self> {
        let block_size = dev.block_size();
        let mut block_buf = vec![0; block_size];
        dev.read_block(SUPERBLOCK_INDEX, &mut block_buf)?;
        let super_block = SuperBlock::parse(&block_buf)?;

        if super_block.block_size as usize != block_size
            || super_block.blocks_count as usize != dev.total_blocks()
        {
            return Err(FsError::Corrupt(format!(
                "superblock describes {} blocks of {} bytes, device has {} blocks of {} bytes",
                super_block.blocks_count,
                super_block.block_size,
                dev.total_blocks(),
                block_size
            )));
        }
        let layout = Layout::new(
            block_size,
            dev.total_blocks(),
            super_block.inodes_count as usize,
        )?;
        let allocator = BlockAllocator::open(&dev, layout.data_bitmap.start())?;
        let inodes = InodeTable::open(layout);
        if !inodes.is_allocated(&mut dev, ROOT_INODE)? {
            return Err(FsError::Corrupt("root directory inode is free".to_string()));
        }
        info!("mounted file system with {} blocks", layout.total_blocks);

        Ok(FileSystem {
            dev,
            super_block,
            layout,
            allocator,
            inodes,
        })
    }

    pub fn root(&self) -> InodeId {
        ROOT_INODE
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    pub fn device(&self) -> &T {
        &self.dev
    }

    /// Gives the block device back, e.g. to mount it again later.
    pub fn into_device(self) -> T {
        self.dev
    }

    pub fn sync(&mut self) -> Result<()> {
        self.dev.sync_disk()?;
        Ok(())
    }

    pub fn free_block_cnt(&mut self) -> Result<usize> {
        self.allocator.free_block_cnt(&mut self.dev)
    }

    pub fn free_inode_cnt(&mut self) -> Result<usize> {
        self.inodes.free_inode_cnt(&mut self.dev)
    }

    /// Reserves a block and creates an inode of `kind` in it.
    ///
    /// If no inode is free the reserved block is not given back: the free block count
    /// drops by one even though the call fails.
    pub fn alloc_inode(&mut self, kind: InodeType) -> Result<InodeId> {
        let block = self.allocator.allocate(&mut self.dev)?;
        match self.inodes.allocate_inode(&mut self.dev, kind, block) {
            Ok(id) => Ok(id),
            Err(err) => {
                warn!("inode allocation failed, block {} stays reserved: {}", block, err);
                Err(err)
            }
        }
    }

    pub fn getattr(&mut self, id: InodeId) -> Result<FileAttr> {
        self.inodes.get_attr(&mut self.dev, id)
    }

    pub fn gettype(&mut self, id: InodeId) -> Result<InodeType> {
        self.inodes.get_type(&mut self.dev, id)
    }

    pub fn get_type_attr(&mut self, id: InodeId) -> Result<(InodeType, FileAttr)> {
        self.inodes.get_type_attr(&mut self.dev, id)
    }

    /// Loads the indirect block of `node` into `cache` unless it is already there.
    fn cached_indirect<'a>(
        &mut self,
        node: &Inode,
        cache: &'a mut Option<IndirectBlock>,
    ) -> Result<&'a mut IndirectBlock> {
        let indirect = match cache.take() {
            Some(indirect) => indirect,
            None => {
                let block = node.indirect_block().ok_or_else(|| {
                    FsError::InvalidArgument("file has no indirect block".to_string())
                })?;
                let mut buf = vec![0; self.dev.block_size()];
                self.dev.read_block(block, &mut buf)?;
                IndirectBlock::parse(&buf)
            }
        };
        Ok(cache.insert(indirect))
    }

    /// Block number of file block `idx`.
    fn file_block(
        &mut self,
        node: &Inode,
        cache: &mut Option<IndirectBlock>,
        idx: usize,
    ) -> Result<BlockNumber> {
        if node.is_direct_block(idx) {
            return Ok(node.block(idx));
        }
        let direct = node.direct_block_count();
        Ok(self.cached_indirect(node, cache)?.get(idx - direct))
    }

    /// Returns the whole content of file `id`.
    pub fn read_file(&mut self, id: InodeId) -> Result<Vec<u8>> {
        let block_size = self.dev.block_size();
        let (_, node) = self.inodes.load(&mut self.dev, id)?;
        if node.attr.size > node.max_file_size(block_size) {
            return Err(FsError::Corrupt(format!(
                "inode {} records {} bytes, more than it can address",
                id, node.attr.size
            )));
        }
        let file_size = node.attr.size as usize;

        let mut content = Vec::with_capacity(file_size);
        let mut indirect = None;
        let mut buf = vec![0; block_size];
        let mut idx = 0;
        while content.len() < file_size {
            let block = self.file_block(&node, &mut indirect, idx)?;
            self.dev.read_block(block, &mut buf)?;
            let take = block_size.min(file_size - content.len());
            content.extend_from_slice(&buf[..take]);
            idx += 1;
        }
        trace!("read {} bytes from inode {}", file_size, id);
        Ok(content)
    }

    /// Adds blocks `old..new` to `node`, recording every block it claims in `claimed`.
    fn grow(
        &mut self,
        node: &mut Inode,
        indirect: &mut Option<IndirectBlock>,
        old: usize,
        new: usize,
        claimed: &mut Vec<BlockNumber>,
    ) -> Result<()> {
        let block_size = self.dev.block_size();
        let direct = node.direct_block_count();
        for idx in old..new {
            let block = self.allocator.allocate(&mut self.dev)?;
            claimed.push(block);
            if node.is_direct_block(idx) {
                node.set_block(idx, block);
                continue;
            }
            if node.indirect_block().is_none() {
                let indirect_block = self.allocator.allocate(&mut self.dev)?;
                claimed.push(indirect_block);
                node.set_indirect_block(indirect_block);
                *indirect = Some(IndirectBlock::parse(&vec![0; block_size]));
                debug!("added indirect block {}", indirect_block);
            }
            self.cached_indirect(node, indirect)?.set(idx - direct, block);
        }
        Ok(())
    }

    /// Releases blocks `new..old` of `node`, and the indirect block once nothing needs it.
    fn shrink(
        &mut self,
        node: &mut Inode,
        indirect: &mut Option<IndirectBlock>,
        old: usize,
        new: usize,
    ) -> Result<()> {
        let direct = node.direct_block_count();
        for idx in new..old {
            if node.is_direct_block(idx) {
                self.allocator.deallocate(&mut self.dev, node.block(idx))?;
                node.set_block(idx, INVALID_BLOCK);
            } else {
                let entries = self.cached_indirect(node, indirect)?;
                let block = entries.get(idx - direct);
                entries.set(idx - direct, INVALID_BLOCK);
                self.allocator.deallocate(&mut self.dev, block)?;
            }
        }

        if old > direct && new <= direct {
            let block = node.indirect_block().ok_or_else(|| {
                FsError::InvalidArgument("file has no indirect block".to_string())
            })?;
            self.allocator.deallocate(&mut self.dev, block)?;
            node.invalidate_indirect_block();
            *indirect = None;
            debug!("dropped indirect block {}", block);
        }
        Ok(())
    }

    /// Fails with `OutOfResource` if file `id` cannot hold `size` bytes.
    fn check_file_size(&mut self, id: InodeId, size: u64) -> Result<()> {
        let block_size = self.dev.block_size();
        let (_, node) = self.inodes.load(&mut self.dev, id)?;
        let max = node.max_file_size(block_size);
        if size > max {
            return Err(FsError::OutOfResource(format!(
                "{} bytes exceeds the maximum file size of {} bytes",
                size, max
            )));
        }
        Ok(())
    }

    /// Replaces the content of file `id` with `content`, growing or shrinking its block
    /// list to fit.
    ///
    /// Fails with `OutOfResource` before touching the disk if `content` is larger than an
    /// inode can address. If the device runs out of blocks while growing, the blocks taken
    /// by this call are released again and the file is unchanged. Blocks dropped while
    /// shrinking are released before the inode is rewritten, so a device error after that
    /// point leaves the inode naming free blocks.
    pub fn write_file(&mut self, id: InodeId, content: &[u8]) -> Result<()> {
        let block_size = self.dev.block_size();
        let (inode_block, mut node) = self.inodes.load(&mut self.dev, id)?;

        let max = node.max_file_size(block_size);
        if content.len() as u64 > max {
            return Err(FsError::OutOfResource(format!(
                "{} bytes exceeds the maximum file size of {} bytes",
                content.len(),
                max
            )));
        }

        let old_blocks = calculate_block_count(node.attr.size, block_size);
        let new_blocks = calculate_block_count(content.len() as u64, block_size);
        trace!("inode {}: {} -> {} blocks", id, old_blocks, new_blocks);

        let mut indirect = None;
        if new_blocks > old_blocks {
            let mut claimed = Vec::new();
            if let Err(err) =
                self.grow(&mut node, &mut indirect, old_blocks, new_blocks, &mut claimed)
            {
                for block in claimed {
                    if let Err(release) = self.allocator.deallocate(&mut self.dev, block) {
                        warn!("could not release block {}: {}", block, release);
                    }
                }
                return Err(err);
            }
        } else if new_blocks < old_blocks {
            self.shrink(&mut node, &mut indirect, old_blocks, new_blocks)?;
        }
        let indirect_dirty = indirect.is_some();

        for (idx, chunk) in content.chunks(block_size).enumerate() {
            let block = self.file_block(&node, &mut indirect, idx)?;
            if chunk.len() == block_size {
                self.dev.write_block(block, chunk)?;
            } else {
                self.dev.write_partial_block(block, chunk, 0)?;
            }
        }

        if indirect_dirty {
            if let (Some(entries), Some(block)) = (&indirect, node.indirect_block()) {
                self.dev.write_block(block, &entries.serialize(block_size))?;
            }
        }

        let time = now();
        node.attr.size = content.len() as u64;
        node.attr.modify_time = time;
        node.attr.access_time = time;
        self.dev.write_block(inode_block, &node.serialize(block_size))?;
        Ok(())
    }

    /// Writes `data` at `offset`, extending the file if needed. The whole file is read and
    /// written back. Returns the number of bytes written.
    ///
    /// Fails with `OutOfResource`, without reading the file, when the write would end past
    /// the maximum file size.
    pub fn write_file_w_off(&mut self, id: InodeId, data: &[u8], offset: u64) -> Result<usize> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| FsError::OutOfResource(format!("write at {} overflows", offset)))?;
        self.check_file_size(id, end)?;

        let mut content = self.read_file(id)?;
        let (offset, end) = (offset as usize, end as usize);
        if end > content.len() {
            content.resize(end, 0);
        }
        content[offset..end].copy_from_slice(data);
        self.write_file(id, &content)?;
        Ok(data.len())
    }

    /// Reads up to `size` bytes starting at `offset`. Bytes past the end of the file are
    /// not returned.
    pub fn read_file_w_off(&mut self, id: InodeId, size: u64, offset: u64) -> Result<Vec<u8>> {
        let content = self.read_file(id)?;
        let start = offset.min(content.len() as u64) as usize;
        let end = offset.saturating_add(size).min(content.len() as u64) as usize;
        Ok(content[start..end].to_vec())
    }

    /// Truncates or zero-extends file `id` to `size` bytes and returns its attributes.
    pub fn resize(&mut self, id: InodeId, size: u64) -> Result<FileAttr> {
        self.check_file_size(id, size)?;
        let mut content = self.read_file(id)?;
        if content.len() as u64 != size {
            content.resize(size as usize, 0);
            self.write_file(id, &content)?;
        }
        self.getattr(id)
    }

    /// Releases every block of file `id`, then the inode and the block holding it.
    pub fn remove_file(&mut self, id: InodeId) -> Result<()> {
        self.write_file(id, &[])?;
        let inode_block = self.inodes.get(&mut self.dev, id)?;
        self.inodes.free_inode(&mut self.dev, id)?;
        self.allocator.deallocate(&mut self.dev, inode_block)?;
        debug!("removed inode {}", id);
        Ok(())
    }
}
