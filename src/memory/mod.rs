/*!
 * Memory Module
 * Device memory sub-allocation
 */

pub mod block;
pub mod manager;
pub mod simulated;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use block::{MemoryBlock, Page, PageId};
pub use manager::{AllocationGuard, AllocationGuardExt, SubAllocator};
pub use simulated::{SimulatedDevice, SimulatedMemory};
pub use traits::*;
pub use types::*;
