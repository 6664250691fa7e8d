use crate::io::block::{bad_length, out_of_range, BlockNumber, BlockStorage};

/// A block device based on RAM. Contents are lost when the device is dropped.
#[derive(Debug, Clone)]
pub struct MemoryBlockDevice {
    data: Vec<u8>,
    block_size: usize,
    block_count: usize,
}

impl MemoryBlockDevice {
    /// Constructs a zero-filled device of `block_count` blocks of `block_size` bytes.
    pub fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            data: vec![0; block_size * block_count],
            block_size,
            block_count,
        }
    }

    fn block_range(&self, blocknr: BlockNumber) -> std::io::Result<std::ops::Range<usize>> {
        if blocknr >= self.block_count {
            return Err(out_of_range(blocknr, self.block_count));
        }
        let start = blocknr * self.block_size;
        Ok(start..start + self.block_size)
    }
}

impl BlockStorage for MemoryBlockDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn total_blocks(&self) -> usize {
        self.block_count
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        let range = self.block_range(blocknr)?;
        if buf.len() < self.block_size {
            return Err(bad_length("read buffer", buf.len(), self.block_size));
        }
        buf[..self.block_size].copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        let range = self.block_range(blocknr)?;
        if buf.len() != self.block_size {
            return Err(bad_length("write", buf.len(), self.block_size));
        }
        self.data[range].copy_from_slice(buf);
        Ok(())
    }

    fn write_partial_block(
        &mut self,
        blocknr: BlockNumber,
        buf: &[u8],
        offset: usize,
    ) -> std::io::Result<()> {
        let range = self.block_range(blocknr)?;
        if offset + buf.len() > self.block_size {
            return Err(bad_length("partial write", offset + buf.len(), self.block_size));
        }
        let start = range.start + offset;
        self.data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_start_zeroed() {
        let mut dev = MemoryBlockDevice::new(32, 3);
        let mut buf = [0xFF; 32];
        dev.read_block(2, &mut buf).unwrap();
        assert_eq!(buf, [0; 32]);
    }

    #[test]
    fn writes_are_confined_to_their_block() {
        let mut dev = MemoryBlockDevice::new(16, 3);
        dev.write_block(1, &[7; 16]).unwrap();
        dev.write_partial_block(2, &[9, 9], 14).unwrap();

        let mut buf = [0; 16];
        dev.read_block(0, &mut buf).unwrap();
        assert_eq!(buf, [0; 16]);
        dev.read_block(1, &mut buf).unwrap();
        assert_eq!(buf, [7; 16]);
        dev.read_block(2, &mut buf).unwrap();
        assert_eq!(&buf[..14], &[0; 14]);
        assert_eq!(&buf[14..], &[9, 9]);
    }

    #[test]
    fn rejects_out_of_range_and_short_buffers() {
        let mut dev = MemoryBlockDevice::new(16, 2);
        assert!(dev.write_block(2, &[0; 16]).is_err());
        assert!(dev.write_block(0, &[0; 8]).is_err());
        assert!(dev.write_partial_block(0, &[0; 4], 13).is_err());
        let mut short = [0; 8];
        assert!(dev.read_block(0, &mut short).is_err());
    }
}
