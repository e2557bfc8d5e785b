/*!
 * Allocation Guard Extensions
 *
 * RAII guards that give a block back to its allocator on drop
 */

use crate::core::types::DeviceSize;
use crate::memory::block::MemoryBlock;
use crate::memory::traits::Allocator;
use crate::memory::types::{MemoryPropertyFlags, MemoryRequirements, MemoryResult};
use log::error;
use std::sync::Arc;

/// Scoped allocation with automatic deallocation
///
/// # Example
///
/// ```ignore
/// let guard = allocator.allocate_guard(&requirements, MemoryPropertyFlags::DEVICE_LOCAL)?;
/// bind_buffer(guard.memory(), guard.offset());
/// // Block returned to the allocator on drop
/// ```
pub struct AllocationGuard<A: Allocator> {
    allocator: Arc<A>,
    block: MemoryBlock<A::Memory>,
    active: bool,
}

impl<A: Allocator> AllocationGuard<A> {
    pub fn new(allocator: Arc<A>, block: MemoryBlock<A::Memory>) -> Self {
        Self {
            allocator,
            block,
            active: true,
        }
    }

    #[inline]
    pub fn block(&self) -> &MemoryBlock<A::Memory> {
        &self.block
    }

    #[inline]
    pub fn memory(&self) -> &A::Memory {
        self.block.memory()
    }

    #[inline]
    pub fn offset(&self) -> DeviceSize {
        self.block.offset()
    }

    #[inline]
    pub fn size(&self) -> DeviceSize {
        self.block.size()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Deallocate now and report the outcome instead of logging it on drop
    pub fn release(mut self) -> MemoryResult<()> {
        self.active = false;
        self.allocator.deallocate(&self.block)
    }

    /// Give up automatic deallocation and hand the block to the caller
    pub fn into_block(mut self) -> MemoryBlock<A::Memory> {
        self.active = false;
        self.block.clone()
    }
}

impl<A: Allocator> Drop for AllocationGuard<A> {
    fn drop(&mut self) {
        if self.active {
            self.active = false;
            if let Err(e) = self.allocator.deallocate(&self.block) {
                error!(
                    "Allocation guard drop failed for block at offset {} ({} bytes): {}",
                    self.block.offset(),
                    self.block.size(),
                    e
                );
            }
        }
    }
}

/// Extension trait for creating allocation guards
pub trait AllocationGuardExt: Allocator + Sized {
    /// Allocate a block wrapped in a guard that frees it on drop
    fn allocate_guard(
        self: &Arc<Self>,
        requirements: &MemoryRequirements,
        flags: MemoryPropertyFlags,
    ) -> MemoryResult<AllocationGuard<Self>>;
}

impl<A: Allocator> AllocationGuardExt for A {
    fn allocate_guard(
        self: &Arc<Self>,
        requirements: &MemoryRequirements,
        flags: MemoryPropertyFlags,
    ) -> MemoryResult<AllocationGuard<Self>> {
        let block = self.allocate(requirements, flags)?;
        Ok(AllocationGuard::new(Arc::clone(self), block))
    }
}
