/*!
 * Device Memory Sub-Allocation
 *
 * Carves resource allocations out of a few large device pages.
 *
 * ## Allocation
 *
 * - **Type selection**: lowest memory type allowed by the resource's type mask
 *   that has every requested property flag
 * - **First-fit**: the first free block, in (page, offset) order, that still
 *   fits once aligned
 * - **Front splitting**: the allocation takes the low end of the block; the
 *   alignment padding before it and the tail after it stay free
 * - **Page extension**: when nothing fits, a new page of
 *   `max(min(heap / 10, 256MB), size)` bytes is requested from the device
 *
 * ## Release
 *
 * - **Coalescing**: a released block absorbs free neighbors on the same page
 * - **Double-free detection**: a block overlapping free space is rejected
 *
 * ## Concurrency
 *
 * Each memory type has its own mutex around its free list, so allocations of
 * different types never contend. Pages are tracked in a sharded concurrent
 * map and are never given back to the device.
 */

mod allocator;
mod free_list;
mod guard_ext;
mod page_registry;
mod stats;

pub use guard_ext::{AllocationGuard, AllocationGuardExt};

use super::block::MemoryBlock;
use super::traits::{Allocator, MemoryInfo, PageSource};
use super::types::*;
use crate::core::config::AllocatorConfig;
use crate::core::limits::MAX_MEMORY_TYPES;
use crate::core::types::{DeviceSize, HeapIndex, TypeIndex};
use free_list::FreeList;
use log::{info, warn};
use page_registry::PageRegistry;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// State of one memory type, guarded by its own lock
pub(super) struct TypeHeap<M> {
    free: FreeList<M>,
    pages: usize,
    page_bytes: DeviceSize,
    live_allocations: usize,
    live_bytes: DeviceSize,
}

impl<M> TypeHeap<M> {
    fn new() -> Self {
        Self {
            free: FreeList::new(),
            pages: 0,
            page_bytes: 0,
            live_allocations: 0,
            live_bytes: 0,
        }
    }
}

/// Device memory sub-allocator
pub struct SubAllocator<S: PageSource> {
    source: S,
    config: AllocatorConfig,
    memory_types: Vec<MemoryType>,
    heaps: Vec<Mutex<TypeHeap<S::Memory>>>,
    pages: PageRegistry<S::Memory>,
}

impl<S: PageSource> SubAllocator<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, AllocatorConfig::default())
    }

    /// Create sub-allocator with custom page sizing
    pub fn with_config(source: S, config: AllocatorConfig) -> Self {
        let mut memory_types = source.memory_types();
        if memory_types.len() > MAX_MEMORY_TYPES {
            warn!(
                "Device reports {} memory types, only the first {} are addressable",
                memory_types.len(),
                MAX_MEMORY_TYPES
            );
            memory_types.truncate(MAX_MEMORY_TYPES);
        }

        let mut heap_sizes: BTreeMap<HeapIndex, DeviceSize> = BTreeMap::new();
        for (type_index, memory_type) in memory_types.iter().enumerate() {
            info!(
                "Memory[{}]: flags={:?}, heap={}",
                type_index, memory_type.property_flags, memory_type.heap_index
            );
            heap_sizes.insert(memory_type.heap_index, memory_type.heap_size);
        }
        for (heap_index, heap_size) in &heap_sizes {
            info!("Heap[{}]: size={}", heap_index, heap_size);
        }

        info!(
            "Sub-allocator initialized with {} memory types over {} heaps (max page {} bytes, heap divider {})",
            memory_types.len(),
            heap_sizes.len(),
            config.max_page_size,
            config.heap_size_divider
        );

        Self {
            heaps: memory_types.iter().map(|_| Mutex::new(TypeHeap::new())).collect(),
            memory_types,
            source,
            config,
            pages: PageRegistry::new(),
        }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Memory types known to this allocator, in index order
    pub fn memory_types(&self) -> &[MemoryType] {
        &self.memory_types
    }

    /// Number of pages obtained from the device for all memory types
    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    fn heap(&self, type_index: TypeIndex) -> Option<&Mutex<TypeHeap<S::Memory>>> {
        self.heaps.get(type_index as usize)
    }
}

// Implement trait interfaces
impl<S: PageSource> Allocator for SubAllocator<S> {
    type Memory = S::Memory;

    fn allocate(
        &self,
        requirements: &MemoryRequirements,
        flags: MemoryPropertyFlags,
    ) -> MemoryResult<MemoryBlock<S::Memory>> {
        SubAllocator::allocate(self, requirements, flags)
    }

    fn deallocate(&self, block: &MemoryBlock<S::Memory>) -> MemoryResult<()> {
        SubAllocator::deallocate(self, block)
    }
}

impl<S: PageSource> MemoryInfo for SubAllocator<S> {
    fn stats(&self) -> MemoryStats {
        SubAllocator::stats(self)
    }
}
