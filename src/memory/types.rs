/*!
 * Memory Types
 * Common types for device memory sub-allocation
 */

use super::block::PageId;
use crate::core::types::{DeviceSize, HeapIndex, TypeIndex, TypeMask};
use bitflags::bitflags;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory errors
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum MemoryError {
    #[error("No suitable memory type: type_mask=0b{type_mask:b}, flags={flags:?}")]
    #[diagnostic(
        code(memory::no_suitable_type),
        help("No memory type matches both the resource's type mask and the requested property flags. Relax the flags.")
    )]
    NoSuitableMemoryType {
        type_mask: TypeMask,
        flags: MemoryPropertyFlags,
    },

    #[error("Page allocation failed: memory type {type_index}, {size} bytes")]
    #[diagnostic(
        code(memory::page_allocation_failed),
        help("The device could not provide a new page. Device memory may be exhausted.")
    )]
    PageAllocationFailed {
        type_index: TypeIndex,
        size: DeviceSize,
        #[source]
        source: PageSourceError,
    },

    #[error("Unknown page {page}")]
    #[diagnostic(
        code(memory::unknown_page),
        help("The block was not produced by this allocator.")
    )]
    UnknownPage { page: PageId },

    #[error("Double free detected: page {page}, offset {offset}, size {size}")]
    #[diagnostic(
        code(memory::double_free),
        help("The block overlaps free space. It was released twice or is corrupted.")
    )]
    DoubleFreeDetected {
        page: PageId,
        offset: DeviceSize,
        size: DeviceSize,
    },

    #[error("Invalid allocation request: {0}")]
    #[diagnostic(code(memory::invalid_request))]
    InvalidRequest(String),
}

/// Errors reported by a page source
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum PageSourceError {
    #[error("Out of device memory: heap {heap_index} requested {requested} bytes, {available} bytes available")]
    OutOfDeviceMemory {
        heap_index: HeapIndex,
        requested: DeviceSize,
        available: DeviceSize,
    },

    #[error("Invalid memory type index {0}")]
    InvalidMemoryType(TypeIndex),

    #[error("Device error: {0}")]
    Device(String),
}

bitflags! {
    /// Memory property flags of a memory type
    pub struct MemoryPropertyFlags: u32 {
        const DEVICE_LOCAL = 0x0000_0001;
        const HOST_VISIBLE = 0x0000_0002;
        const HOST_COHERENT = 0x0000_0004;
        const HOST_CACHED = 0x0000_0008;
        const LAZILY_ALLOCATED = 0x0000_0010;
        const PROTECTED = 0x0000_0020;
    }
}

/// Memory type as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    pub heap_index: HeapIndex,
    pub property_flags: MemoryPropertyFlags,
    /// Size of the parent heap in bytes
    pub heap_size: DeviceSize,
}

impl MemoryType {
    pub fn new(heap_index: HeapIndex, property_flags: MemoryPropertyFlags, heap_size: DeviceSize) -> Self {
        Self {
            heap_index,
            property_flags,
            heap_size,
        }
    }

    /// Check whether this type has every flag in `flags`
    #[inline]
    pub fn supports(&self, flags: MemoryPropertyFlags) -> bool {
        self.property_flags.contains(flags)
    }
}

/// Memory requirements of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRequirements {
    pub size: DeviceSize,
    /// Required alignment, always a power of two
    pub alignment: DeviceSize,
    /// Memory types the resource can live in
    pub type_mask: TypeMask,
}

impl MemoryRequirements {
    pub fn new(size: DeviceSize, alignment: DeviceSize, type_mask: TypeMask) -> Self {
        Self {
            size,
            alignment,
            type_mask,
        }
    }

    pub fn validate(&self) -> MemoryResult<()> {
        if self.size == 0 {
            return Err(MemoryError::InvalidRequest(
                "size must be greater than zero".to_string(),
            ));
        }
        if !self.alignment.is_power_of_two() {
            return Err(MemoryError::InvalidRequest(format!(
                "alignment {} is not a power of two",
                self.alignment
            )));
        }
        if self.type_mask == 0 {
            return Err(MemoryError::InvalidRequest(
                "type mask selects no memory type".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per memory type statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStats {
    pub type_index: TypeIndex,
    pub heap_index: HeapIndex,
    pub property_flags: u32,
    pub pages: usize,
    pub page_bytes: DeviceSize,
    pub free_bytes: DeviceSize,
    pub free_blocks: usize,
    pub largest_free_block: DeviceSize,
    pub live_allocations: usize,
    pub live_bytes: DeviceSize,
}

/// Memory statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_page_bytes: DeviceSize,
    pub free_bytes: DeviceSize,
    pub live_bytes: DeviceSize,
    pub usage_percentage: f64,
    pub types: Vec<TypeStats>,
}

impl TypeStats {
    /// Share of this type's free space not usable by a single request (0.0 - 1.0)
    pub fn fragmentation(&self) -> f64 {
        if self.free_bytes == 0 {
            return 0.0;
        }
        1.0 - self.largest_free_block as f64 / self.free_bytes as f64
    }
}

impl MemoryStats {
    /// Worst fragmentation over all memory types (0.0 - 1.0)
    ///
    /// Free space of different types never serves the same request, so types
    /// are measured separately.
    pub fn fragmentation(&self) -> f64 {
        self.types
            .iter()
            .map(TypeStats::fragmentation)
            .fold(0.0, f64::max)
    }
}
