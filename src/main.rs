/*!
 * Sub-Allocator Demo - Main Entry Point
 *
 * Runs a buffer/image-like workload against a simulated discrete GPU and
 * reports the resulting memory statistics.
 */

use gpu_suballoc::memory::MemoryInfo;
use gpu_suballoc::monitoring::WorkloadSpan;
use gpu_suballoc::{
    init_tracing, AllocationGuardExt, AllocatorConfig, MemoryPropertyFlags, MemoryRequirements,
    SimulatedDevice, SubAllocator, ANY_MEMORY_TYPE,
};
use std::error::Error;
use std::sync::Arc;
use tracing::{error, info};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize structured tracing
    init_tracing();

    let config = AllocatorConfig::from_env();
    info!(?config, "Sub-allocator demo starting...");

    let allocator = Arc::new(SubAllocator::with_config(
        SimulatedDevice::discrete_gpu(),
        config,
    ));

    let device_local = MemoryPropertyFlags::DEVICE_LOCAL;
    let staging = MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT;

    // (size, alignment, flags)
    let workload = [
        (64 * KIB, 256, device_local),       // vertex buffer
        (16 * KIB, 256, device_local),       // index buffer
        (4 * MIB, 64 * KIB, device_local),   // texture
        (8 * MIB, 64 * KIB, device_local),   // depth attachment
        (4 * MIB, 4, staging),               // staging buffer
        (256, 256, staging),                 // uniform buffer
        (300 * MIB, 64 * KIB, device_local), // oversized render target
    ];

    let span = WorkloadSpan::new("resource_upload");
    let mut blocks = Vec::new();
    let mut failures = 0;
    let entered = span.enter();
    for (size, alignment, flags) in workload {
        let requirements = MemoryRequirements::new(size, alignment, ANY_MEMORY_TYPE);
        match allocator.allocate(&requirements, flags) {
            Ok(block) => {
                info!(
                    memory_type = block.type_index(),
                    page = %block.page_id(),
                    offset = block.offset(),
                    size = block.size(),
                    "Resource bound"
                );
                blocks.push(block);
            }
            Err(e) => {
                error!(error = %e, size, alignment, "Allocation failed");
                failures += 1;
            }
        }
    }
    drop(entered);
    span.record_allocations(blocks.len());
    span.record_failures(failures);
    drop(span);

    // Staging memory is short-lived: scoped guards give it back automatically
    {
        let _upload = allocator.allocate_guard(
            &MemoryRequirements::new(2 * MIB, 4, ANY_MEMORY_TYPE),
            staging,
        )?;
        info!(
            live_bytes = allocator.stats().live_bytes,
            "Temporary staging buffer in use"
        );
    }

    // Release every other resource to exercise coalescing
    for block in blocks.iter().step_by(2) {
        allocator.deallocate(block)?;
    }

    let stats = allocator.stats();
    info!(
        total = stats.total_page_bytes,
        live = stats.live_bytes,
        free = stats.free_bytes,
        usage_pct = stats.usage_percentage,
        fragmentation = stats.fragmentation(),
        pages = allocator.total_pages(),
        "Workload complete"
    );
    info!("Memory statistics: {}", serde_json::to_string_pretty(&stats)?);

    for block in blocks.iter().skip(1).step_by(2) {
        allocator.deallocate(block)?;
    }
    let (total, used, free) = allocator.info();
    info!(total, used, free, "All resources released");

    Ok(())
}
