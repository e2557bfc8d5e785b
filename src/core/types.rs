/*!
 * Core Types
 * Common types used across the allocator
 */

/// Byte size or offset inside device memory
pub type DeviceSize = u64;

/// Index of a memory type as reported by the device
pub type TypeIndex = u32;

/// Index of a memory heap as reported by the device
pub type HeapIndex = u32;

/// Bitset over memory type indices (bit `i` selects type `i`)
pub type TypeMask = u32;

/// Mask accepting every memory type
pub const ANY_MEMORY_TYPE: TypeMask = u32::MAX;

/// Single-bit mask selecting exactly one memory type
#[inline]
pub const fn type_bit(index: TypeIndex) -> TypeMask {
    1 << index
}
