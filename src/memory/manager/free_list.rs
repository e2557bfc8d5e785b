/*!
 * Free List
 * Ordered free space of one memory type
 */

use crate::core::types::DeviceSize;
use crate::memory::block::{BlockKey, MemoryBlock};
use crate::memory::types::MemoryRequirements;
use std::collections::BTreeMap;

/// Free blocks of one memory type, ordered by (page, offset)
///
/// Blocks never overlap and never touch: adjacent free space is merged as
/// soon as it is released.
pub(crate) struct FreeList<M> {
    blocks: BTreeMap<BlockKey, MemoryBlock<M>>,
    free_bytes: DeviceSize,
}

impl<M> FreeList<M> {
    pub fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
            free_bytes: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn free_bytes(&self) -> DeviceSize {
        self.free_bytes
    }

    pub fn largest(&self) -> DeviceSize {
        self.blocks.values().map(MemoryBlock::size).max().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryBlock<M>> {
        self.blocks.values()
    }

    /// Remove and return the first block, in ascending order, that fits the request
    pub fn take_first_fit(&mut self, requirements: &MemoryRequirements) -> Option<MemoryBlock<M>> {
        let key = self
            .blocks
            .iter()
            .find(|(_, block)| block.fits(requirements))
            .map(|(key, _)| *key)?;
        let block = self.blocks.remove(&key)?;
        self.free_bytes -= block.size();
        Some(block)
    }

    /// Insert a split leftover
    ///
    /// Leftovers come from a block that was free as a whole, so they cannot
    /// touch any other free block.
    pub fn insert(&mut self, block: MemoryBlock<M>) {
        debug_assert!(block.size() > 0);
        self.free_bytes += block.size();
        self.blocks.insert(block.key(), block);
    }

    /// Return a block to the free list, merging it with adjacent free neighbors
    ///
    /// Returns the merged span as `(offset, size)`, or `None` without touching
    /// the list when the block overlaps free space already present.
    pub fn release(&mut self, block: MemoryBlock<M>) -> Option<(DeviceSize, DeviceSize)> {
        let key = block.key();

        let prev = self
            .blocks
            .range(..key)
            .next_back()
            .map(|(k, b)| (*k, b.overlaps(&block), b.touches(&block)));
        let next = self
            .blocks
            .range(key..)
            .next()
            .map(|(k, b)| (*k, b.overlaps(&block), block.touches(b)));

        let collides = |side: Option<(BlockKey, bool, bool)>| side.map_or(false, |(_, o, _)| o);
        if block.size() == 0 || collides(prev) || collides(next) {
            return None;
        }

        self.free_bytes += block.size();
        let mut merged = block;

        if let Some((prev_key, _, true)) = prev {
            if let Some(front) = self.blocks.remove(&prev_key) {
                merged = merged.absorb_front(front);
            }
        }
        if let Some((next_key, _, true)) = next {
            if let Some(back) = self.blocks.remove(&next_key) {
                merged = merged.absorb_back(back);
            }
        }

        let span = (merged.offset(), merged.size());
        self.blocks.insert(merged.key(), merged);
        Some(span)
    }
}
