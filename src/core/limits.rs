/*!
 * Allocator Limits and Constants
 *
 * Centralized location for the sizing heuristics and hard limits of the
 * sub-allocator.
 */

use super::types::DeviceSize;

// =============================================================================
// PAGE SIZING
// =============================================================================

/// Upper bound for a heuristically sized page (256MB)
/// Requests larger than this still get a page of exactly their size
pub const DEFAULT_MAX_PAGE_SIZE: DeviceSize = 256 * 1024 * 1024;

/// A new page takes this fraction (1/N) of its parent heap
pub const DEFAULT_HEAP_SIZE_DIVIDER: DeviceSize = 10;

// =============================================================================
// DEVICE LIMITS
// =============================================================================

/// Maximum number of memory types addressable by a type mask
pub const MAX_MEMORY_TYPES: usize = 32;
