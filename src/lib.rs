/*!
 * GPU Memory Sub-Allocator
 * Carves resource allocations out of large device memory pages
 */

pub mod core;
pub mod memory;
pub mod monitoring;

// Re-exports
pub use crate::core::{AllocatorConfig, DeviceSize, TypeIndex, TypeMask, ANY_MEMORY_TYPE};
pub use memory::{
    AllocationGuard, AllocationGuardExt, Allocator, MemoryBlock, MemoryError, MemoryInfo,
    MemoryPropertyFlags, MemoryRequirements, MemoryResult, MemoryStats, MemoryType, PageSource,
    PageSourceError, SimulatedDevice, SubAllocator,
};
pub use monitoring::init_tracing;
