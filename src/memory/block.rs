/*!
 * Memory Blocks
 *
 * Pages handed out by the device and the contiguous spans carved from them
 */

use super::types::MemoryRequirements;
use crate::core::types::{DeviceSize, TypeIndex};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Raw device memory obtained from a page source
pub struct Page<M> {
    memory: M,
    type_index: TypeIndex,
    size: DeviceSize,
}

impl<M> Page<M> {
    pub(crate) fn new(memory: M, type_index: TypeIndex, size: DeviceSize) -> Self {
        Self {
            memory,
            type_index,
            size,
        }
    }

    /// Device memory object backing this page
    #[inline]
    pub fn memory(&self) -> &M {
        &self.memory
    }

    #[inline]
    pub fn type_index(&self) -> TypeIndex {
        self.type_index
    }

    #[inline]
    pub fn size(&self) -> DeviceSize {
        self.size
    }
}

impl<M> fmt::Debug for Page<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("type_index", &self.type_index)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Page identity
///
/// The address of the shared page allocation. Stable for as long as any
/// handle to the page is alive, which the page registry guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(usize);

impl PageId {
    #[inline]
    pub fn of<M>(page: &Arc<Page<M>>) -> Self {
        Self(Arc::as_ptr(page) as *const () as usize)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Ordering key of a block: page identity, then offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct BlockKey {
    pub page: PageId,
    pub offset: DeviceSize,
}

/// Contiguous byte range within one page
///
/// `offset` and `size` are raw values; the aligned accessors give the usable
/// span for a given alignment.
pub struct MemoryBlock<M> {
    page: Arc<Page<M>>,
    offset: DeviceSize,
    size: DeviceSize,
}

/// Result of carving an allocation out of a free block
pub(crate) struct Extracted<M> {
    /// Alignment padding in front of the allocation
    pub padding: Option<MemoryBlock<M>>,
    pub allocated: MemoryBlock<M>,
    /// Unused tail after the allocation
    pub remainder: Option<MemoryBlock<M>>,
}

impl<M> MemoryBlock<M> {
    pub(crate) fn new(page: Arc<Page<M>>, offset: DeviceSize, size: DeviceSize) -> Self {
        Self { page, offset, size }
    }

    /// Block spanning a whole page
    pub(crate) fn whole(page: Arc<Page<M>>) -> Self {
        let size = page.size();
        Self::new(page, 0, size)
    }

    #[inline]
    pub fn page(&self) -> &Arc<Page<M>> {
        &self.page
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId::of(&self.page)
    }

    /// Device memory object the block lives in
    #[inline]
    pub fn memory(&self) -> &M {
        self.page.memory()
    }

    #[inline]
    pub fn type_index(&self) -> TypeIndex {
        self.page.type_index()
    }

    #[inline]
    pub fn offset(&self) -> DeviceSize {
        self.offset
    }

    #[inline]
    pub fn size(&self) -> DeviceSize {
        self.size
    }

    /// One past the last byte of the block
    #[inline]
    pub fn end(&self) -> DeviceSize {
        self.offset + self.size
    }

    /// Offset rounded up to a multiple of `alignment` (a power of two)
    #[inline]
    pub fn aligned_offset(&self, alignment: DeviceSize) -> DeviceSize {
        (self.offset + alignment - 1) & !(alignment - 1)
    }

    /// Bytes left once alignment padding is consumed, zero if the padding eats the block
    #[inline]
    pub fn aligned_size(&self, alignment: DeviceSize) -> DeviceSize {
        self.size
            .saturating_sub(self.aligned_offset(alignment) - self.offset)
    }

    /// Check whether a request fits in this block after alignment
    #[inline]
    pub fn fits(&self, requirements: &MemoryRequirements) -> bool {
        self.aligned_size(requirements.alignment) >= requirements.size
    }

    pub(crate) fn key(&self) -> BlockKey {
        BlockKey {
            page: self.page_id(),
            offset: self.offset,
        }
    }

    #[inline]
    pub(crate) fn same_page(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.page, &other.page)
    }

    /// `self` ends exactly where `other` starts, on the same page
    #[inline]
    pub(crate) fn touches(&self, other: &Self) -> bool {
        self.same_page(other) && self.end() == other.offset
    }

    /// Any shared byte between the two blocks
    #[inline]
    pub(crate) fn overlaps(&self, other: &Self) -> bool {
        self.same_page(other) && self.offset < other.end() && other.offset < self.end()
    }

    /// Grow leftwards over an adjacent predecessor
    pub(crate) fn absorb_front(self, front: Self) -> Self {
        debug_assert!(front.touches(&self));
        Self::new(self.page, front.offset, front.size + self.size)
    }

    /// Grow rightwards over an adjacent successor
    pub(crate) fn absorb_back(self, back: Self) -> Self {
        debug_assert!(self.touches(&back));
        Self::new(self.page, self.offset, self.size + back.size)
    }

    /// Split an allocation off the front of this block
    ///
    /// The caller checks [`fits`](Self::fits) first.
    pub(crate) fn extract(self, requirements: &MemoryRequirements) -> Extracted<M> {
        debug_assert!(self.fits(requirements));

        let start = self.aligned_offset(requirements.alignment);
        let end = start + requirements.size;
        let block_end = self.end();

        let padding = (start > self.offset)
            .then(|| Self::new(Arc::clone(&self.page), self.offset, start - self.offset));
        let remainder =
            (block_end > end).then(|| Self::new(Arc::clone(&self.page), end, block_end - end));

        Extracted {
            padding,
            allocated: Self::new(self.page, start, requirements.size),
            remainder,
        }
    }
}

impl<M> Clone for MemoryBlock<M> {
    fn clone(&self) -> Self {
        Self {
            page: Arc::clone(&self.page),
            offset: self.offset,
            size: self.size,
        }
    }
}

impl<M> fmt::Debug for MemoryBlock<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("page", &format_args!("{}", self.page_id()))
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish()
    }
}

impl<M> PartialEq for MemoryBlock<M> {
    fn eq(&self, other: &Self) -> bool {
        self.same_page(other) && self.offset == other.offset && self.size == other.size
    }
}

impl<M> Eq for MemoryBlock<M> {}

impl<M> PartialOrd for MemoryBlock<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for MemoryBlock<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key()
            .cmp(&other.key())
            .then(self.size.cmp(&other.size))
    }
}
