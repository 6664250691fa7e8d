use std::ops::Range;

use crate::error::Result;
use crate::io::{BlockNumber, BlockStorage};

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// A view over one bitmap block. Bit `n` lives in byte `n / 8` at position `n % 8`
/// (least significant bit first). Only the leading `bits` bits are meaningful; the
/// remaining bits of the buffer are never scanned or counted.
pub struct Bitmap<'a> {
    map: &'a mut [u8],
    bits: usize,
}

impl<'a> Bitmap<'a> {
    pub fn new(map: &'a mut [u8], bits: usize) -> Self {
        debug_assert!(bits <= map.len() * 8);
        Self { map, bits }
    }

    pub fn get(&self, nr: usize) -> State {
        debug_assert!(nr < self.bits);
        match (self.map[nr / 8] >> (nr % 8)) & 0b1 {
            0 => State::Free,
            _ => State::Used,
        }
    }

    pub fn set_reserved(&mut self, nr: usize) {
        debug_assert!(nr < self.bits);
        self.map[nr / 8] |= 0b1 << (nr % 8);
    }

    pub fn set_free(&mut self, nr: usize) {
        debug_assert!(nr < self.bits);
        self.map[nr / 8] &= !(0b1 << (nr % 8));
    }

    /// Index of the lowest free bit.
    pub fn find_first_free(&self) -> Option<usize> {
        let used_bytes = (self.bits + 7) / 8;
        self.map[..used_bytes]
            .iter()
            .position(|byte| *byte != u8::MAX)
            .map(|idx| idx * 8 + self.map[idx].trailing_ones() as usize)
            .filter(|&nr| nr < self.bits)
    }

    pub fn count_free(&self) -> usize {
        let full = self.bits / 8;
        let mut free: usize = self.map[..full]
            .iter()
            .map(|byte| byte.count_zeros() as usize)
            .sum();
        let rem = self.bits % 8;
        if rem != 0 {
            let mask = (1u8 << rem) - 1;
            free += (!self.map[full] & mask).count_ones() as usize;
        }
        free
    }
}

/// A contiguous run of bitmap blocks tracking `bits` resources. The final block only
/// uses its leading `bits % bits_per_block` bits (or all of them when `bits` divides
/// evenly).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitmapRegion {
    start: BlockNumber,
    blocks: usize,
    bits: usize,
    bits_per_block: usize,
}

impl BitmapRegion {
    pub fn new(start: BlockNumber, bits: usize, block_size: usize) -> Self {
        let bits_per_block = block_size * 8;
        Self {
            start,
            blocks: (bits + bits_per_block - 1) / bits_per_block,
            bits,
            bits_per_block,
        }
    }

    /// First block of the region.
    pub fn start(&self) -> BlockNumber {
        self.start
    }

    /// Number of blocks the region occupies.
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Number of resources tracked.
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Meaningful bits in the last bitmap block.
    pub fn last_block_bits(&self) -> usize {
        match self.bits % self.bits_per_block {
            0 => self.bits_per_block,
            rem => rem,
        }
    }

    fn bits_in_block(&self, i: usize) -> usize {
        if i + 1 == self.blocks {
            self.last_block_bits()
        } else {
            self.bits_per_block
        }
    }

    fn locate(&self, nr: usize) -> (BlockNumber, usize) {
        (self.start + nr / self.bits_per_block, nr % self.bits_per_block)
    }

    /// Zeroes every block of the region.
    pub fn clear<T: BlockStorage + ?Sized>(&self, dev: &mut T) -> Result<()> {
        for i in 0..self.blocks {
            dev.zero_block(self.start + i)?;
        }
        Ok(())
    }

    /// Marks every index in `range` as used, writing each touched bitmap block once.
    pub fn reserve<T: BlockStorage + ?Sized>(
        &self,
        dev: &mut T,
        range: Range<usize>,
    ) -> Result<()> {
        let end = range.end.min(self.bits);
        if range.start >= end {
            return Ok(());
        }
        let mut buf = vec![0; dev.block_size()];
        let first = range.start / self.bits_per_block;
        let last = (end - 1) / self.bits_per_block;
        for i in first..=last {
            dev.read_block(self.start + i, &mut buf)?;
            let base = i * self.bits_per_block;
            let mut bitmap = Bitmap::new(&mut buf, self.bits_in_block(i));
            for nr in range.start.max(base)..end.min(base + self.bits_per_block) {
                bitmap.set_reserved(nr - base);
            }
            dev.write_block(self.start + i, &buf)?;
        }
        Ok(())
    }

    /// First-fit: claims the lowest free index, persists the single bitmap block that
    /// changed and returns the index. `None` when every tracked bit is used.
    pub fn allocate<T: BlockStorage + ?Sized>(&self, dev: &mut T) -> Result<Option<usize>> {
        let mut buf = vec![0; dev.block_size()];
        for i in 0..self.blocks {
            dev.read_block(self.start + i, &mut buf)?;
            let mut bitmap = Bitmap::new(&mut buf, self.bits_in_block(i));
            if let Some(free) = bitmap.find_first_free() {
                bitmap.set_reserved(free);
                dev.write_block(self.start + i, &buf)?;
                return Ok(Some(free + i * self.bits_per_block));
            }
        }
        Ok(None)
    }

    /// Releases `nr`. Returns `false` without writing anything when it was already free.
    pub fn release<T: BlockStorage + ?Sized>(&self, dev: &mut T, nr: usize) -> Result<bool> {
        let (block, bit) = self.locate(nr);
        let mut buf = vec![0; dev.block_size()];
        dev.read_block(block, &mut buf)?;
        let mut bitmap = Bitmap::new(&mut buf, self.bits_in_block(block - self.start));
        if bitmap.get(bit) == State::Free {
            return Ok(false);
        }
        bitmap.set_free(bit);
        dev.write_block(block, &buf)?;
        Ok(true)
    }

    pub fn state<T: BlockStorage + ?Sized>(&self, dev: &mut T, nr: usize) -> Result<State> {
        let (block, bit) = self.locate(nr);
        let mut buf = vec![0; dev.block_size()];
        dev.read_block(block, &mut buf)?;
        Ok(Bitmap::new(&mut buf, self.bits_in_block(block - self.start)).get(bit))
    }

    /// Free bits summed across the region, bounded to the tracked count.
    pub fn count_free<T: BlockStorage + ?Sized>(&self, dev: &mut T) -> Result<usize> {
        let mut buf = vec![0; dev.block_size()];
        let mut free = 0;
        for i in 0..self.blocks {
            dev.read_block(self.start + i, &mut buf)?;
            free += Bitmap::new(&mut buf, self.bits_in_block(i)).count_free();
        }
        Ok(free)
    }
}
