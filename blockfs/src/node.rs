use std::time::{SystemTime, UNIX_EPOCH};

use zerocopy::little_endian::{U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::error::{FsError, Result};
use crate::io::BlockNumber;

/// Marks a pointer slot, table entry or indirect entry that refers to no block. Block 0
/// always holds the superblock, so it can never be a data block.
pub const INVALID_BLOCK: BlockNumber = 0;

/// Width of one on-disk block pointer.
pub const BLOCK_ID_SIZE: usize = 8;

const HEADER_SIZE: usize = std::mem::size_of::<InodeHeader>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    File,
    Directory,
}

impl InodeType {
    fn to_raw(self) -> u32 {
        match self {
            InodeType::File => 1,
            InodeType::Directory => 2,
        }
    }

    fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            1 => Ok(InodeType::File),
            2 => Ok(InodeType::Directory),
            other => Err(FsError::Corrupt(format!("unknown inode type {}", other))),
        }
    }
}

/// Attributes kept in every inode. Times are seconds since the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileAttr {
    /// The total size of the file in bytes.
    pub size: u64,
    pub create_time: u64,
    pub access_time: u64,
    pub modify_time: u64,
}

impl FileAttr {
    /// Stamps all three times with `time`.
    pub fn set_all_time(&mut self, time: u64) {
        self.create_time = time;
        self.access_time = time;
        self.modify_time = time;
    }
}

/// The fixed prefix of an inode block. The pointer slots follow directly after it and run
/// to the end of the block.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Unaligned, Clone, Copy)]
struct InodeHeader {
    kind: U32,
    /// Number of pointer slots that follow the header.
    nblocks: U32,
    size: U64,
    create_time: U64,
    access_time: U64,
    modify_time: U64,
}

/// An inode occupies exactly one block.
///
/// # Layout
/// ==========================================================================
/// | header (40 bytes) | direct slots (nblocks - 1) x u64 | indirect slot u64 |
/// ==========================================================================
///
/// File block `i` lives in direct slot `i` while `i < nblocks - 1`. Later blocks are
/// addressed through the indirect block named by the last slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Inode {
    kind: InodeType,
    pub attr: FileAttr,
    blocks: Vec<BlockNumber>,
}

impl Inode {
    /// Number of pointer slots an inode gets for a given block size.
    pub fn slot_count(block_size: usize) -> usize {
        block_size.saturating_sub(HEADER_SIZE) / BLOCK_ID_SIZE
    }

    /// The smallest block size that still leaves one direct slot and the indirect slot.
    pub fn min_block_size() -> usize {
        HEADER_SIZE + 2 * BLOCK_ID_SIZE
    }

    /// A fresh inode with every slot empty and all times set to now.
    pub fn new(kind: InodeType, block_size: usize) -> Self {
        let mut attr = FileAttr::default();
        attr.set_all_time(now());
        Self {
            kind,
            attr,
            blocks: vec![INVALID_BLOCK; Self::slot_count(block_size)],
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        let header = InodeHeader::read_from_prefix(buf)
            .ok_or_else(|| FsError::Corrupt("inode block too short".to_string()))?;
        let kind = InodeType::from_raw(header.kind.get())?;
        let nblocks = header.nblocks.get() as usize;
        if nblocks < 2 || HEADER_SIZE + nblocks * BLOCK_ID_SIZE > buf.len() {
            return Err(FsError::Corrupt(format!(
                "inode claims {} pointer slots",
                nblocks
            )));
        }
        let blocks = buf[HEADER_SIZE..HEADER_SIZE + nblocks * BLOCK_ID_SIZE]
            .chunks_exact(BLOCK_ID_SIZE)
            .map(read_block_id)
            .collect();
        Ok(Self {
            kind,
            attr: FileAttr {
                size: header.size.get(),
                create_time: header.create_time.get(),
                access_time: header.access_time.get(),
                modify_time: header.modify_time.get(),
            },
            blocks,
        })
    }

    /// Encodes the inode into a buffer of one block. Bytes past the last slot are zero.
    pub fn serialize(&self, block_size: usize) -> Vec<u8> {
        let mut buf = vec![0; block_size];
        let header = InodeHeader {
            kind: U32::new(self.kind.to_raw()),
            nblocks: U32::new(self.blocks.len() as u32),
            size: U64::new(self.attr.size),
            create_time: U64::new(self.attr.create_time),
            access_time: U64::new(self.attr.access_time),
            modify_time: U64::new(self.attr.modify_time),
        };
        buf[..HEADER_SIZE].copy_from_slice(header.as_bytes());
        for (slot, block) in buf[HEADER_SIZE..]
            .chunks_exact_mut(BLOCK_ID_SIZE)
            .zip(self.blocks.iter())
        {
            slot.copy_from_slice(&(*block as u64).to_le_bytes());
        }
        buf
    }

    pub fn kind(&self) -> InodeType {
        self.kind
    }

    /// Number of direct pointer slots (every slot but the last).
    pub fn direct_block_count(&self) -> usize {
        self.blocks.len() - 1
    }

    pub fn is_direct_block(&self, idx: usize) -> bool {
        idx < self.direct_block_count()
    }

    /// The block in direct slot `idx`.
    pub fn block(&self, idx: usize) -> BlockNumber {
        self.blocks[idx]
    }

    pub fn set_block(&mut self, idx: usize, block: BlockNumber) {
        debug_assert!(self.is_direct_block(idx));
        self.blocks[idx] = block;
    }

    pub fn indirect_block(&self) -> Option<BlockNumber> {
        match self.blocks[self.blocks.len() - 1] {
            INVALID_BLOCK => None,
            block => Some(block),
        }
    }

    pub fn set_indirect_block(&mut self, block: BlockNumber) {
        let last = self.blocks.len() - 1;
        self.blocks[last] = block;
    }

    pub fn invalidate_indirect_block(&mut self) {
        self.set_indirect_block(INVALID_BLOCK);
    }

    /// Largest file this inode can describe on a device with `block_size` byte blocks.
    pub fn max_file_size(&self, block_size: usize) -> u64 {
        ((self.direct_block_count() + IndirectBlock::capacity(block_size)) * block_size) as u64
    }
}

/// A data block reinterpreted as an array of block pointers, extending a file past its
/// direct slots.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectBlock {
    entries: Vec<BlockNumber>,
}

impl IndirectBlock {
    pub fn capacity(block_size: usize) -> usize {
        block_size / BLOCK_ID_SIZE
    }

    pub fn parse(buf: &[u8]) -> Self {
        Self {
            entries: buf.chunks_exact(BLOCK_ID_SIZE).map(read_block_id).collect(),
        }
    }

    pub fn serialize(&self, block_size: usize) -> Vec<u8> {
        let mut buf = vec![0; block_size];
        for (slot, block) in buf.chunks_exact_mut(BLOCK_ID_SIZE).zip(self.entries.iter()) {
            slot.copy_from_slice(&(*block as u64).to_le_bytes());
        }
        buf
    }

    pub fn get(&self, idx: usize) -> BlockNumber {
        self.entries[idx]
    }

    pub fn set(&mut self, idx: usize, block: BlockNumber) {
        self.entries[idx] = block;
    }
}

/// Decodes one little endian block pointer from the front of `bytes`.
pub(crate) fn read_block_id(bytes: &[u8]) -> BlockNumber {
    let mut le = [0; BLOCK_ID_SIZE];
    le.copy_from_slice(&bytes[..BLOCK_ID_SIZE]);
    u64::from_le_bytes(le) as BlockNumber
}

/// Seconds since the unix epoch, or 0 if the clock is set before it.
pub(crate) fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
