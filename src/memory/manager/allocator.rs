/*!
 * Sub-Allocator Implementation
 * Allocation and deallocation logic
 */

use super::{SubAllocator, TypeHeap};
use crate::core::types::{type_bit, DeviceSize, TypeIndex, TypeMask};
use crate::memory::block::{MemoryBlock, Page};
use crate::memory::traits::PageSource;
use crate::memory::types::{
    MemoryError, MemoryPropertyFlags, MemoryRequirements, MemoryResult, PageSourceError,
};
use log::{debug, error, info, warn};
use std::sync::Arc;

impl<S: PageSource> SubAllocator<S> {
    /// Allocate a block for a resource
    ///
    /// Picks the lowest memory type allowed by `requirements.type_mask` that has
    /// every flag in `flags`, then takes the first free block of that type that
    /// fits once aligned, requesting a new page when none does.
    pub fn allocate(
        &self,
        requirements: &MemoryRequirements,
        flags: MemoryPropertyFlags,
    ) -> MemoryResult<MemoryBlock<S::Memory>> {
        if let Err(e) = requirements.validate() {
            warn!("Rejected allocation request {:?}: {}", requirements, e);
            return Err(e);
        }

        let type_index = self.select_type(requirements.type_mask, flags)?;
        let Some(heap) = self.heap(type_index) else {
            return Err(MemoryError::NoSuitableMemoryType {
                type_mask: requirements.type_mask,
                flags,
            });
        };

        // Page creation stays under the type lock so racing requests share one page
        let mut heap = heap.lock();
        let candidate = heap.free.take_first_fit(requirements);
        let block = match candidate {
            Some(block) => block,
            None => self.extend(&mut heap, type_index, requirements.size)?,
        };

        let parts = block.extract(requirements);
        if let Some(padding) = parts.padding {
            heap.free.insert(padding);
        }
        if let Some(remainder) = parts.remainder {
            heap.free.insert(remainder);
        }
        heap.live_allocations += 1;
        heap.live_bytes += requirements.size;
        drop(heap);

        let block = parts.allocated;
        debug!(
            "Allocate memory[{}]={}: size={}, alignment={}, offset={}",
            type_index,
            block.page_id(),
            requirements.size,
            requirements.alignment,
            block.offset()
        );

        Ok(block)
    }

    /// Return a block to the free space of its memory type
    ///
    /// The block is merged with free neighbors on the same page. A block
    /// overlapping free space (released twice, or forged) is rejected and the
    /// free space is left untouched.
    pub fn deallocate(&self, block: &MemoryBlock<S::Memory>) -> MemoryResult<()> {
        let page = block.page_id();
        let Some((type_index, heap)) = self
            .pages
            .type_of(page)
            .and_then(|type_index| Some((type_index, self.heap(type_index)?)))
        else {
            error!(
                "Attempted to deallocate block from unknown page {}: size={}, offset={}",
                page,
                block.size(),
                block.offset()
            );
            return Err(MemoryError::UnknownPage { page });
        };

        let mut heap = heap.lock();
        let Some((offset, size)) = heap.free.release(block.clone()) else {
            drop(heap);
            error!(
                "Failed to deallocate memory[{}]={}: offset={}, size={} overlaps free space",
                type_index,
                page,
                block.offset(),
                block.size()
            );
            return Err(MemoryError::DoubleFreeDetected {
                page,
                offset: block.offset(),
                size: block.size(),
            });
        };
        heap.live_allocations = heap.live_allocations.saturating_sub(1);
        heap.live_bytes = heap.live_bytes.saturating_sub(block.size());
        drop(heap);

        debug!(
            "Deallocate memory[{}]={}: size={}, offset={} (free span now offset={}, size={})",
            type_index,
            page,
            block.size(),
            block.offset(),
            offset,
            size
        );

        Ok(())
    }

    /// Lowest memory type in `type_mask` whose properties contain `flags`
    pub fn select_type(
        &self,
        type_mask: TypeMask,
        flags: MemoryPropertyFlags,
    ) -> MemoryResult<TypeIndex> {
        self.memory_types
            .iter()
            .enumerate()
            .map(|(index, memory_type)| (index as TypeIndex, memory_type))
            .find(|(index, memory_type)| {
                type_mask & type_bit(*index) != 0 && memory_type.supports(flags)
            })
            .map(|(index, _)| index)
            .ok_or_else(|| {
                error!(
                    "Failed to find suitable memory: type_mask=0b{:b}, flags={:?}",
                    type_mask, flags
                );
                MemoryError::NoSuitableMemoryType { type_mask, flags }
            })
    }

    /// Obtain a new page for `type_index` and hand it back as one free block
    fn extend(
        &self,
        heap: &mut TypeHeap<S::Memory>,
        type_index: TypeIndex,
        required: DeviceSize,
    ) -> MemoryResult<MemoryBlock<S::Memory>> {
        let heap_size = self
            .memory_types
            .get(type_index as usize)
            .map_or(required, |memory_type| memory_type.heap_size);
        let size = self.config.page_size(heap_size, required);

        let (memory, size) = match self.source.allocate_page(type_index, size) {
            Ok(memory) => (memory, size),
            Err(e) if self.config.retry_exact_size && size > required => {
                warn!(
                    "Page of {} bytes for memory type {} failed ({}), retrying with exact size {}",
                    size, type_index, e, required
                );
                let memory = self
                    .source
                    .allocate_page(type_index, required)
                    .map_err(|source| Self::page_failure(type_index, required, source))?;
                (memory, required)
            }
            Err(source) => return Err(Self::page_failure(type_index, size, source)),
        };

        let page = Arc::new(Page::new(memory, type_index, size));
        let id = self.pages.register(Arc::clone(&page));
        heap.pages += 1;
        heap.page_bytes += size;

        info!(
            "New page {} for memory type {}: {} bytes ({} pages, {} bytes for this type)",
            id, type_index, size, heap.pages, heap.page_bytes
        );

        Ok(MemoryBlock::whole(page))
    }

    fn page_failure(
        type_index: TypeIndex,
        size: DeviceSize,
        source: PageSourceError,
    ) -> MemoryError {
        error!(
            "Page allocation of {} bytes for memory type {} failed: {}",
            size, type_index, source
        );
        MemoryError::PageAllocationFailed {
            type_index,
            size,
            source,
        }
    }
}
