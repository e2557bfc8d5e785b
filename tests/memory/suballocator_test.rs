/*!
 * Sub-Allocator Tests
 * Type selection, page extension, splitting and failure handling
 */

use super::common::{assert_invariants, fixed_pages, free_spans};
use gpu_suballoc::core::limits::MAX_MEMORY_TYPES;
use gpu_suballoc::core::types::type_bit;
use gpu_suballoc::{
    AllocatorConfig, DeviceSize, MemoryError, MemoryInfo, MemoryPropertyFlags,
    MemoryRequirements, MemoryType, PageSourceError, SimulatedDevice, SubAllocator,
    ANY_MEMORY_TYPE,
};
use pretty_assertions::assert_eq;

const MIB: DeviceSize = 1024 * 1024;
const GIB: DeviceSize = 1024 * MIB;

fn req(size: DeviceSize, alignment: DeviceSize) -> MemoryRequirements {
    MemoryRequirements::new(size, alignment, ANY_MEMORY_TYPE)
}

#[test]
fn test_first_allocation_creates_heuristic_page() {
    let allocator = SubAllocator::new(SimulatedDevice::discrete_gpu());

    let block = allocator
        .allocate(&req(4096, 256), MemoryPropertyFlags::DEVICE_LOCAL)
        .unwrap();

    assert_eq!(block.type_index(), 0);
    assert_eq!(block.offset(), 0);
    assert_eq!(block.size(), 4096);
    // 8GB heap: a tenth exceeds the 256MB cap
    assert_eq!(block.page().size(), 256 * MIB);
    assert_eq!(free_spans(&allocator, 0), vec![(4096, 256 * MIB - 4096)]);
    assert_invariants(&allocator, 0, &[block]);
}

#[test]
fn test_page_is_tenth_of_small_heap() {
    let allocator = SubAllocator::new(SimulatedDevice::single_heap(GIB));

    let block = allocator
        .allocate(&req(1024, 1), MemoryPropertyFlags::empty())
        .unwrap();

    assert_eq!(block.page().size(), GIB / 10);
}

#[test]
fn test_oversized_request_gets_exact_page() {
    let allocator = SubAllocator::new(SimulatedDevice::discrete_gpu());

    let block = allocator
        .allocate(&req(300 * MIB, 65536), MemoryPropertyFlags::DEVICE_LOCAL)
        .unwrap();

    assert_eq!(block.page().size(), 300 * MIB);
    assert!(allocator.free_blocks(0).is_empty());
    assert_invariants(&allocator, 0, &[block]);
}

#[test]
fn test_consecutive_allocations_share_page() {
    let allocator = fixed_pages(1000);

    let a = allocator.allocate(&req(100, 1), MemoryPropertyFlags::empty()).unwrap();
    let b = allocator.allocate(&req(200, 1), MemoryPropertyFlags::empty()).unwrap();
    let c = allocator.allocate(&req(300, 1), MemoryPropertyFlags::empty()).unwrap();

    assert_eq!(a.page_id(), b.page_id());
    assert_eq!(b.page_id(), c.page_id());
    assert_eq!((a.offset(), b.offset(), c.offset()), (0, 100, 300));
    assert_eq!(allocator.page_count(0), 1);
    assert_eq!(free_spans(&allocator, 0), vec![(600, 400)]);
    assert_invariants(&allocator, 0, &[a, b, c]);
}

#[test]
fn test_selects_lowest_matching_type() {
    let allocator = SubAllocator::new(SimulatedDevice::discrete_gpu());
    let host = MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT;

    assert_eq!(allocator.select_type(ANY_MEMORY_TYPE, MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 0);
    assert_eq!(allocator.select_type(ANY_MEMORY_TYPE, host).unwrap(), 1);
    assert_eq!(
        allocator
            .select_type(ANY_MEMORY_TYPE, host | MemoryPropertyFlags::HOST_CACHED)
            .unwrap(),
        2
    );
    assert_eq!(
        allocator
            .select_type(ANY_MEMORY_TYPE, host | MemoryPropertyFlags::DEVICE_LOCAL)
            .unwrap(),
        3
    );
    assert_eq!(allocator.select_type(type_bit(2), host).unwrap(), 2);
    assert_eq!(
        allocator
            .select_type(ANY_MEMORY_TYPE, MemoryPropertyFlags::empty())
            .unwrap(),
        0
    );
}

#[test]
fn test_type_isolation() {
    let allocator = SubAllocator::new(SimulatedDevice::discrete_gpu());

    // Plenty of free device-local space in type 0
    let warm = allocator
        .allocate(&req(1024, 1), MemoryPropertyFlags::DEVICE_LOCAL)
        .unwrap();
    assert_eq!(warm.type_index(), 0);

    let mask = ANY_MEMORY_TYPE & !type_bit(0);
    for _ in 0..16 {
        let block = allocator
            .allocate(
                &MemoryRequirements::new(1024, 1, mask),
                MemoryPropertyFlags::DEVICE_LOCAL,
            )
            .unwrap();
        assert_eq!(block.type_index(), 3);
        assert_eq!(block.page().type_index(), 3);
        assert_ne!(block.page_id(), warm.page_id());
    }
    assert_eq!(allocator.page_count(0), 1);
}

#[test]
fn test_no_suitable_memory_type() {
    let allocator = SubAllocator::new(SimulatedDevice::discrete_gpu());

    let result = allocator.allocate(
        &MemoryRequirements::new(1024, 1, type_bit(0)),
        MemoryPropertyFlags::HOST_VISIBLE,
    );
    match result {
        Err(MemoryError::NoSuitableMemoryType { type_mask, flags }) => {
            assert_eq!(type_mask, type_bit(0));
            assert_eq!(flags, MemoryPropertyFlags::HOST_VISIBLE);
        }
        other => panic!("Expected NoSuitableMemoryType, got {:?}", other),
    }

    // Mask only selects types the device does not have
    assert!(matches!(
        allocator.allocate(
            &MemoryRequirements::new(1024, 1, type_bit(10)),
            MemoryPropertyFlags::empty()
        ),
        Err(MemoryError::NoSuitableMemoryType { .. })
    ));

    // Nothing was touched
    assert_eq!(allocator.total_pages(), 0);
}

#[test]
fn test_invalid_requests_rejected() {
    let allocator = fixed_pages(1000);

    for bad in [req(0, 1), req(10, 3), req(10, 0), MemoryRequirements::new(10, 1, 0)] {
        assert!(matches!(
            allocator.allocate(&bad, MemoryPropertyFlags::empty()),
            Err(MemoryError::InvalidRequest(_))
        ));
    }
    assert_eq!(allocator.total_pages(), 0);
}

#[test]
fn test_page_allocation_failure() {
    let allocator = SubAllocator::with_config(
        SimulatedDevice::single_heap(1000).with_heap_budget(0, 100),
        AllocatorConfig::new().with_heap_size_divider(1),
    );

    match allocator.allocate(&req(50, 1), MemoryPropertyFlags::empty()) {
        Err(MemoryError::PageAllocationFailed {
            type_index,
            size,
            source,
        }) => {
            assert_eq!(type_index, 0);
            assert_eq!(size, 1000);
            assert_eq!(
                source,
                PageSourceError::OutOfDeviceMemory {
                    heap_index: 0,
                    requested: 1000,
                    available: 100,
                }
            );
        }
        other => panic!("Expected PageAllocationFailed, got {:?}", other),
    }
    assert_eq!(allocator.total_pages(), 0);
    assert_eq!(allocator.stats().total_page_bytes, 0);
}

#[test]
fn test_retry_with_exact_size() {
    let allocator = SubAllocator::with_config(
        SimulatedDevice::single_heap(1000).with_heap_budget(0, 100),
        AllocatorConfig::new()
            .with_heap_size_divider(1)
            .with_retry_exact_size(true),
    );

    let block = allocator
        .allocate(&req(50, 1), MemoryPropertyFlags::empty())
        .unwrap();
    assert_eq!(block.page().size(), 50);
    assert!(allocator.free_blocks(0).is_empty());

    // Exact retry also fails once the budget is gone
    assert!(matches!(
        allocator.allocate(&req(60, 1), MemoryPropertyFlags::empty()),
        Err(MemoryError::PageAllocationFailed { size: 60, .. })
    ));
    assert_invariants(&allocator, 0, &[block]);
}

#[test]
fn test_alignment_of_returned_block() {
    let allocator = fixed_pages(4096);

    let small = allocator.allocate(&req(10, 1), MemoryPropertyFlags::empty()).unwrap();
    let aligned = allocator
        .allocate(&req(100, 256), MemoryPropertyFlags::empty())
        .unwrap();

    assert_eq!(aligned.offset(), 256);
    assert_eq!(aligned.aligned_offset(256), aligned.offset());
    assert_eq!(aligned.aligned_size(256), 100);
    // Padding and tail stay free
    assert_eq!(free_spans(&allocator, 0), vec![(10, 246), (356, 4096 - 356)]);
    assert_invariants(&allocator, 0, &[small.clone(), aligned.clone()]);

    // Releasing the aligned block folds padding and tail back together
    allocator.deallocate(&aligned).unwrap();
    assert_eq!(free_spans(&allocator, 0), vec![(10, 4086)]);
    assert_invariants(&allocator, 0, &[small]);
}

#[test]
fn test_first_fit_not_best_fit() {
    let allocator = fixed_pages(1000);
    let flags = MemoryPropertyFlags::empty();

    let a = allocator.allocate(&req(100, 1), flags).unwrap();
    let b = allocator.allocate(&req(10, 1), flags).unwrap();
    let c = allocator.allocate(&req(50, 1), flags).unwrap();
    let d = allocator.allocate(&req(10, 1), flags).unwrap();

    allocator.deallocate(&a).unwrap();
    allocator.deallocate(&c).unwrap();
    assert_eq!(free_spans(&allocator, 0), vec![(0, 100), (110, 50), (170, 830)]);

    // The 50-byte hole would be the best fit; the first hole wins
    let e = allocator.allocate(&req(40, 1), flags).unwrap();
    assert_eq!(e.offset(), 0);
    assert_invariants(&allocator, 0, &[b, d, e]);
}

#[test]
fn test_first_fit_skips_blocks_too_small_after_alignment() {
    let allocator = fixed_pages(1000);
    let flags = MemoryPropertyFlags::empty();

    let a = allocator.allocate(&req(8, 1), flags).unwrap();
    let b = allocator.allocate(&req(40, 1), flags).unwrap();
    let c = allocator.allocate(&req(10, 1), flags).unwrap();
    allocator.deallocate(&b).unwrap();

    // Hole [8, 48): 40 raw bytes but only 16 once aligned to 32
    let d = allocator.allocate(&req(24, 32), flags).unwrap();
    assert_eq!(d.offset(), 64);
    assert_invariants(&allocator, 0, &[a, c, d]);
}

#[test]
fn test_fragmentation_boundary_triggers_new_page() {
    let allocator = fixed_pages(300);
    let flags = MemoryPropertyFlags::empty();

    let a = allocator.allocate(&req(100, 1), flags).unwrap();
    let b = allocator.allocate(&req(100, 1), flags).unwrap();
    let c = allocator.allocate(&req(100, 1), flags).unwrap();
    allocator.deallocate(&a).unwrap();
    allocator.deallocate(&c).unwrap();

    // 200 bytes free in total, but in two disjoint 100-byte holes
    assert_eq!(free_spans(&allocator, 0), vec![(0, 100), (200, 100)]);
    assert_eq!(allocator.page_count(0), 1);

    let big = allocator.allocate(&req(150, 1), flags).unwrap();
    assert_eq!(allocator.page_count(0), 2);
    assert_ne!(big.page_id(), b.page_id());
    assert_eq!(big.offset(), 0);
    assert_invariants(&allocator, 0, &[b, big]);
}

#[test]
fn test_round_trip_restores_free_space() {
    let allocator = fixed_pages(4096);
    let flags = MemoryPropertyFlags::empty();

    let keep = allocator.allocate(&req(100, 1), flags).unwrap();
    let before = free_spans(&allocator, 0);

    for (size, alignment) in [(1, 1), (17, 16), (500, 512), (3996, 1)] {
        let block = allocator.allocate(&req(size, alignment), flags).unwrap();
        allocator.deallocate(&block).unwrap();
        assert_eq!(free_spans(&allocator, 0), before);
    }
    assert_invariants(&allocator, 0, &[keep]);
}

#[test]
fn test_double_free_detected() {
    let allocator = fixed_pages(1000);
    let flags = MemoryPropertyFlags::empty();

    let a = allocator.allocate(&req(10, 1), flags).unwrap();
    allocator.deallocate(&a).unwrap();

    match allocator.deallocate(&a) {
        Err(MemoryError::DoubleFreeDetected { page, offset, size }) => {
            assert_eq!(page, a.page_id());
            assert_eq!(offset, 0);
            assert_eq!(size, 10);
        }
        other => panic!("Expected DoubleFreeDetected, got {:?}", other),
    }

    // Registry untouched by the rejected release
    assert_eq!(free_spans(&allocator, 0), vec![(0, 1000)]);
}

#[test]
fn test_double_free_between_live_neighbors() {
    let allocator = fixed_pages(1000);
    let flags = MemoryPropertyFlags::empty();

    let a = allocator.allocate(&req(10, 1), flags).unwrap();
    let b = allocator.allocate(&req(20, 1), flags).unwrap();
    let c = allocator.allocate(&req(30, 1), flags).unwrap();

    allocator.deallocate(&b).unwrap();
    assert!(matches!(
        allocator.deallocate(&b),
        Err(MemoryError::DoubleFreeDetected { .. })
    ));
    assert_invariants(&allocator, 0, &[a, c]);
}

#[test]
fn test_unknown_page() {
    let allocator = fixed_pages(1000);
    let other = fixed_pages(1000);

    let foreign = other
        .allocate(&req(10, 1), MemoryPropertyFlags::empty())
        .unwrap();

    match allocator.deallocate(&foreign) {
        Err(MemoryError::UnknownPage { page }) => assert_eq!(page, foreign.page_id()),
        other => panic!("Expected UnknownPage, got {:?}", other),
    }
}

#[test]
fn test_pages_are_never_returned() {
    let allocator = fixed_pages(100);
    let flags = MemoryPropertyFlags::empty();

    let blocks: Vec<_> = (0..3)
        .map(|_| allocator.allocate(&req(100, 1), flags).unwrap())
        .collect();
    assert_eq!(allocator.page_count(0), 3);

    for block in &blocks {
        allocator.deallocate(block).unwrap();
    }

    assert_eq!(allocator.page_count(0), 3);
    assert_eq!(allocator.source().pages_allocated(), 3);
    assert_eq!(free_spans(&allocator, 0), vec![(0, 100); 3]);

    // Free pages are reused before asking the device again
    let again = allocator.allocate(&req(100, 1), flags).unwrap();
    assert_eq!(allocator.source().pages_allocated(), 3);
    assert_invariants(&allocator, 0, &[again]);
}

#[test]
fn test_stats_and_info() {
    let allocator = fixed_pages(1000);
    let flags = MemoryPropertyFlags::empty();

    let a = allocator.allocate(&req(100, 1), flags).unwrap();
    let _b = allocator.allocate(&req(300, 1), flags).unwrap();
    allocator.deallocate(&a).unwrap();

    let stats = allocator.stats();
    let type_stats = &stats.types[0];
    assert_eq!(type_stats.pages, 1);
    assert_eq!(type_stats.page_bytes, 1000);
    assert_eq!(type_stats.free_bytes, 700);
    assert_eq!(type_stats.free_blocks, 2);
    assert_eq!(type_stats.largest_free_block, 600);
    assert_eq!(type_stats.live_allocations, 1);
    assert_eq!(type_stats.live_bytes, 300);
    assert!((stats.usage_percentage - 30.0).abs() < 1e-9);

    assert_eq!(allocator.info(), (1000, 300, 700));
}

#[test]
fn test_memory_types_beyond_mask_width_ignored() {
    let host = MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT;
    let mut types = vec![MemoryType::new(0, host, GIB); MAX_MEMORY_TYPES];
    // Only the 33rd type is device-local
    types.push(MemoryType::new(0, MemoryPropertyFlags::DEVICE_LOCAL, GIB));

    let allocator = SubAllocator::new(SimulatedDevice::new(types));

    assert_eq!(allocator.memory_types().len(), MAX_MEMORY_TYPES);
    assert_eq!(allocator.stats().types.len(), MAX_MEMORY_TYPES);

    match allocator.allocate(&req(1024, 1), MemoryPropertyFlags::DEVICE_LOCAL) {
        Err(MemoryError::NoSuitableMemoryType { type_mask, flags }) => {
            assert_eq!(type_mask, ANY_MEMORY_TYPE);
            assert_eq!(flags, MemoryPropertyFlags::DEVICE_LOCAL);
        }
        other => panic!("Expected NoSuitableMemoryType, got {:?}", other),
    }

    // The last addressable type still works
    let block = allocator
        .allocate(&MemoryRequirements::new(1024, 1, type_bit(31)), host)
        .unwrap();
    assert_eq!(block.type_index(), 31);
    assert_eq!(allocator.total_pages(), 1);
}
