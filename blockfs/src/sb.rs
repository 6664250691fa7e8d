use crate::error::{FsError, Result};

pub const SB_MAGIC: u32 = 0x424B_4653; // BKFS

const ENCODED_LEN: usize = 24;

/// The first block of the file system storing information critical for mounting
/// the file system and verifying the underlying disk is formatted correctly.
///
/// Everything else about the layout (inode table, inode bitmap, block bitmap) is derived
/// from these three numbers, see [`Layout`](crate::layout::Layout).
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct SuperBlock {
    /// A 32-bit identifying string, in this case BKFS.
    pub sb_magic: u32,
    /// Bytes per block on the device the file system was formatted on.
    pub block_size: u32,
    /// Total blocks on the device, metadata included.
    pub blocks_count: u64,
    /// Upper bound on the number of files and directories.
    pub inodes_count: u64,
}

impl SuperBlock {
    pub fn new(block_size: usize, blocks_count: usize, inodes_count: usize) -> Self {
        Self {
            sb_magic: SB_MAGIC,
            block_size: block_size as u32,
            blocks_count: blocks_count as u64,
            inodes_count: inodes_count as u64,
        }
    }

    /// Reads the super block from the front of a block buffer.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < ENCODED_LEN {
            return Err(FsError::Corrupt("superblock buffer too short".to_string()));
        }
        let sb_magic = u32::from_le_bytes(le_bytes(&buf[0..4]));
        if sb_magic != SB_MAGIC {
            return Err(FsError::Corrupt(format!(
                "superblock magic {:#010x} is invalid",
                sb_magic
            )));
        }
        Ok(Self {
            sb_magic,
            block_size: u32::from_le_bytes(le_bytes(&buf[4..8])),
            blocks_count: u64::from_le_bytes(le_bytes(&buf[8..16])),
            inodes_count: u64::from_le_bytes(le_bytes(&buf[16..24])),
        })
    }

    /// Serializes the SuperBlock into a `block_size` buffer for writing to disk.
    /// The encoding is a series of struct fields in little endian, zero padded.
    pub fn serialize(&self, block_size: usize) -> Vec<u8> {
        let mut sb_encoded = Vec::with_capacity(block_size);
        sb_encoded.extend_from_slice(&self.sb_magic.to_le_bytes());
        sb_encoded.extend_from_slice(&self.block_size.to_le_bytes());
        sb_encoded.extend_from_slice(&self.blocks_count.to_le_bytes());
        sb_encoded.extend_from_slice(&self.inodes_count.to_le_bytes());
        sb_encoded.resize(block_size, 0);
        sb_encoded
    }
}

fn le_bytes<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_encode_and_decode_superblocks() {
        let sb = SuperBlock::new(4096, 64, 80);
        let encoded = sb.serialize(4096);
        assert_eq!(encoded.len(), 4096);

        let parsed = SuperBlock::parse(&encoded).unwrap();

        assert_eq!(parsed, sb);
    }

    #[test]
    fn parsing_buffer_with_invalid_magic_fails() {
        let zero_buffer_with_right_size = vec![0; 4096];
        match SuperBlock::parse(&zero_buffer_with_right_size) {
            Err(FsError::Corrupt(msg)) => assert!(msg.contains("magic")),
            other => panic!("expected corrupt superblock, got {:?}", other),
        }
    }

    #[test]
    fn parsing_short_buffer_fails() {
        assert!(SuperBlock::parse(&[0; 8]).is_err());
    }
}
