/*!
 * Memory Traits
 * Device memory abstractions
 */

use super::block::MemoryBlock;
use super::types::*;
use crate::core::types::{DeviceSize, TypeIndex};

/// Device that hands out raw memory pages
pub trait PageSource: Send + Sync {
    /// Device memory object backing a page
    type Memory: Send + Sync + 'static;

    /// Memory types of the device, in index order
    fn memory_types(&self) -> Vec<MemoryType>;

    /// Allocate a raw page of `size` bytes of memory type `type_index`
    fn allocate_page(
        &self,
        type_index: TypeIndex,
        size: DeviceSize,
    ) -> Result<Self::Memory, PageSourceError>;
}

/// Memory allocator interface for resource owners
pub trait Allocator: Send + Sync {
    /// Device memory object backing returned blocks
    type Memory;

    /// Allocate a block matching `requirements` in memory with every flag in `flags`
    fn allocate(
        &self,
        requirements: &MemoryRequirements,
        flags: MemoryPropertyFlags,
    ) -> MemoryResult<MemoryBlock<Self::Memory>>;

    /// Return a block obtained from `allocate`
    fn deallocate(&self, block: &MemoryBlock<Self::Memory>) -> MemoryResult<()>;
}

/// Memory statistics provider
pub trait MemoryInfo: Send + Sync {
    /// Get overall memory statistics
    fn stats(&self) -> MemoryStats;

    /// Get memory info as (total page bytes, live bytes, free bytes)
    fn info(&self) -> (DeviceSize, DeviceSize, DeviceSize) {
        let stats = self.stats();
        (stats.total_page_bytes, stats.live_bytes, stats.free_bytes)
    }
}
