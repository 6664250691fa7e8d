/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

/// A fixed-size, fixed-count array of blocks.
///
/// Every call addresses a whole block of `block_size()` bytes except
/// `write_partial_block`, which patches a byte range inside one block and leaves the rest of
/// that block untouched. Implementations do no caching the file system relies on; a write is
/// visible to the next read of the same block.
pub trait BlockStorage {
    /// The size of one block in bytes.
    fn block_size(&self) -> usize;

    /// The number of blocks on the device.
    fn total_blocks(&self) -> usize;

    /// Reads disk block number into provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range, or into a buffer shorter than one block, will
    /// return an error.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()>;

    /// Writes provided buffer into the specified block number.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range, or a buffer whose length is not exactly one
    /// block, will return an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;

    /// Writes `buf` into the block starting at byte `offset`.
    ///
    /// # Errors
    ///
    /// The write must fit inside the block.
    fn write_partial_block(
        &mut self,
        blocknr: BlockNumber,
        buf: &[u8],
        offset: usize,
    ) -> std::io::Result<()>;

    /// Fills the block with zero bytes.
    fn zero_block(&mut self, blocknr: BlockNumber) -> std::io::Result<()> {
        let zeroes = vec![0; self.block_size()];
        self.write_block(blocknr, &zeroes)
    }

    /// Flush any buffered disk IO from memory. This is useful if it must guaranteed
    /// the disk writes actually occurred, for instance, if being re-read from
    /// disk.
    fn sync_disk(&mut self) -> std::io::Result<()>;
}

pub(crate) fn out_of_range(blocknr: BlockNumber, total: usize) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("block {} out of range (device has {} blocks)", blocknr, total),
    )
}

pub(crate) fn bad_length(what: &str, len: usize, block_size: usize) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("{} of {} bytes does not fit a {} byte block", what, len, block_size),
    )
}
