/*!
 * Simulated Device
 *
 * Bookkeeping-only page source with typical GPU memory layouts and per-heap
 * budgets. Used by the demo binary, tests and benchmarks.
 */

use super::traits::PageSource;
use super::types::{MemoryPropertyFlags, MemoryType, PageSourceError};
use crate::core::types::{DeviceSize, HeapIndex, TypeIndex};
use ahash::HashMap;
use log::debug;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

const GIB: DeviceSize = 1024 * 1024 * 1024;
const MIB: DeviceSize = 1024 * 1024;

/// Page handed out by [`SimulatedDevice`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedMemory {
    pub id: u64,
    pub type_index: TypeIndex,
    pub size: DeviceSize,
}

#[derive(Debug, Default, Clone, Copy)]
struct HeapUsage {
    budget: DeviceSize,
    used: DeviceSize,
}

/// Simulated device memory
pub struct SimulatedDevice {
    memory_types: Vec<MemoryType>,
    heaps: Mutex<HashMap<HeapIndex, HeapUsage>>,
    next_id: AtomicU64,
}

impl SimulatedDevice {
    /// Device with the given memory types; each heap's budget is its reported size
    pub fn new(memory_types: Vec<MemoryType>) -> Self {
        let mut heaps = HashMap::default();
        for memory_type in &memory_types {
            heaps.entry(memory_type.heap_index).or_insert(HeapUsage {
                budget: memory_type.heap_size,
                used: 0,
            });
        }

        Self {
            memory_types,
            heaps: Mutex::new(heaps),
            next_id: AtomicU64::new(1),
        }
    }

    /// One host-visible, device-local memory type on a single heap
    pub fn single_heap(heap_size: DeviceSize) -> Self {
        Self::new(vec![MemoryType::new(
            0,
            MemoryPropertyFlags::DEVICE_LOCAL
                | MemoryPropertyFlags::HOST_VISIBLE
                | MemoryPropertyFlags::HOST_COHERENT,
            heap_size,
        )])
    }

    /// Discrete GPU: VRAM, system RAM, and a small host-visible VRAM window
    pub fn discrete_gpu() -> Self {
        let host = MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT;
        Self::new(vec![
            MemoryType::new(0, MemoryPropertyFlags::DEVICE_LOCAL, 8 * GIB),
            MemoryType::new(1, host, 16 * GIB),
            MemoryType::new(1, host | MemoryPropertyFlags::HOST_CACHED, 16 * GIB),
            MemoryType::new(2, MemoryPropertyFlags::DEVICE_LOCAL | host, 256 * MIB),
        ])
    }

    /// Integrated GPU: one shared heap, with and without host caching
    pub fn integrated_gpu() -> Self {
        let shared = MemoryPropertyFlags::DEVICE_LOCAL
            | MemoryPropertyFlags::HOST_VISIBLE
            | MemoryPropertyFlags::HOST_COHERENT;
        Self::new(vec![
            MemoryType::new(0, shared, 4 * GIB),
            MemoryType::new(0, shared | MemoryPropertyFlags::HOST_CACHED, 4 * GIB),
        ])
    }

    /// Cap the bytes a heap can hand out, independent of its reported size
    pub fn with_heap_budget(self, heap_index: HeapIndex, budget: DeviceSize) -> Self {
        self.heaps
            .lock()
            .entry(heap_index)
            .or_default()
            .budget = budget;
        self
    }

    /// Number of pages handed out so far
    pub fn pages_allocated(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst) - 1
    }

    /// Bytes handed out from one heap
    pub fn heap_used(&self, heap_index: HeapIndex) -> DeviceSize {
        self.heaps
            .lock()
            .get(&heap_index)
            .map_or(0, |usage| usage.used)
    }
}

impl PageSource for SimulatedDevice {
    type Memory = SimulatedMemory;

    fn memory_types(&self) -> Vec<MemoryType> {
        self.memory_types.clone()
    }

    fn allocate_page(
        &self,
        type_index: TypeIndex,
        size: DeviceSize,
    ) -> Result<SimulatedMemory, PageSourceError> {
        let memory_type = self
            .memory_types
            .get(type_index as usize)
            .ok_or(PageSourceError::InvalidMemoryType(type_index))?;

        let mut heaps = self.heaps.lock();
        let usage = heaps.entry(memory_type.heap_index).or_default();
        let available = usage.budget.saturating_sub(usage.used);
        if size > available {
            return Err(PageSourceError::OutOfDeviceMemory {
                heap_index: memory_type.heap_index,
                requested: size,
                available,
            });
        }
        usage.used += size;
        drop(heaps);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Simulated page #{}: memory type {}, heap {}, {} bytes",
            id, type_index, memory_type.heap_index, size
        );

        Ok(SimulatedMemory {
            id,
            type_index,
            size,
        })
    }
}
