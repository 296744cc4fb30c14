//! Tensor shape, layout and memory-requirements planning.
//!
//! Re-exports `strideplan_core` and adds the glue a host application calls
//! once at startup plus a plan-and-place helper for whole tensor lists.

use std::path::Path;

use tracing::{debug, info};

pub use strideplan_core::*;

/// Installs logging and, when `config_path` is given, loads the planner
/// configuration from that TOML file.
pub fn init(level: LogLevel, config_path: Option<&Path>) -> Result<()> {
    init_logger(level);
    if let Some(path) = config_path {
        init_config_with_file(path)?;
        info!("loaded planner config from {}", path.display());
    }
    Ok(())
}

/// Plans every tensor, places all of them with one `allocator` call and
/// returns device views in input order.
///
/// Each tensor gets its own block, so the views never overlap. Nothing is
/// placed if any tensor fails to plan or the allocator runs out of memory.
pub fn plan_and_place<A: Allocator>(
    allocator: &mut A,
    tensors: &[(TensorShape, DataType)],
    alignment: usize,
) -> Result<Vec<TensorData>> {
    let planned = tensors
        .iter()
        .map(|(shape, dtype)| calc_requirements(shape, *dtype, alignment))
        .collect::<Result<Vec<_>>>()?;

    let mut total = Requirements::default();
    for reqs in &planned {
        total.checked_add_assign(reqs.mem())?;
    }
    let allocation = allocator.allocate(&total)?;

    // hand out blocks by size class, consuming each block once
    let mut free: Vec<_> = allocation.blocks().to_vec();
    planned
        .iter()
        .map(|reqs| {
            let (log2, _) = reqs
                .mem()
                .device
                .iter_nonzero()
                .next()
                .ok_or_else(|| Error::internal("Planned tensor has no device block"))?;
            let pos = free
                .iter()
                .position(|b| b.space == MemorySpace::Device && b.log2_size == log2)
                .ok_or_else(|| {
                    Error::internal(format!(
                        "Allocator returned no free block of size class {log2}"
                    ))
                })?;
            let block = free.swap_remove(pos);
            debug!(addr = block.addr, log2, layout = %reqs.layout(), "tensor placed");
            TensorData::from_requirements(reqs, block.addr as usize as *mut u8)
        })
        .collect()
}
