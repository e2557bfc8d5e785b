/*!
 * Sub-Allocator Statistics
 * Snapshots of page usage and free space
 */

use super::SubAllocator;
use crate::core::types::TypeIndex;
use crate::memory::block::MemoryBlock;
use crate::memory::traits::PageSource;
use crate::memory::types::{MemoryStats, TypeStats};

impl<S: PageSource> SubAllocator<S> {
    /// Snapshot of every memory type
    ///
    /// Types are locked one at a time, so the totals are only exact when no
    /// other thread is allocating.
    pub fn stats(&self) -> MemoryStats {
        let types: Vec<TypeStats> = self
            .memory_types
            .iter()
            .zip(&self.heaps)
            .enumerate()
            .map(|(index, (memory_type, heap))| {
                let heap = heap.lock();
                TypeStats {
                    type_index: index as TypeIndex,
                    heap_index: memory_type.heap_index,
                    property_flags: memory_type.property_flags.bits(),
                    pages: heap.pages,
                    page_bytes: heap.page_bytes,
                    free_bytes: heap.free.free_bytes(),
                    free_blocks: heap.free.len(),
                    largest_free_block: heap.free.largest(),
                    live_allocations: heap.live_allocations,
                    live_bytes: heap.live_bytes,
                }
            })
            .collect();

        let total_page_bytes = types.iter().map(|t| t.page_bytes).sum();
        let free_bytes = types.iter().map(|t| t.free_bytes).sum();
        let live_bytes = types.iter().map(|t| t.live_bytes).sum();
        let usage_percentage = if total_page_bytes == 0 {
            0.0
        } else {
            (live_bytes as f64 / total_page_bytes as f64) * 100.0
        };

        MemoryStats {
            total_page_bytes,
            free_bytes,
            live_bytes,
            usage_percentage,
            types,
        }
    }

    /// Free blocks of one memory type in (page, offset) order
    pub fn free_blocks(&self, type_index: TypeIndex) -> Vec<MemoryBlock<S::Memory>> {
        self.heap(type_index)
            .map(|heap| heap.lock().free.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of pages obtained for one memory type
    pub fn page_count(&self, type_index: TypeIndex) -> usize {
        self.heap(type_index).map_or(0, |heap| heap.lock().pages)
    }
}
