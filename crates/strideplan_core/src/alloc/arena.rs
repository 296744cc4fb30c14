use tracing::{debug, warn};

use super::{align_up, Allocation, Allocator, Block, MemorySpace, Requirements};
use crate::{
    config::{ArenaWindow, PlannerConfig},
    error::{Error, Result},
};

/// Bump pointer over one address window.
#[derive(Debug, Clone, Copy)]
struct Arena {
    base_addr: u64,
    top_addr: u64,
    buf_limit: u64,
}

impl Arena {
    fn new(window: &ArenaWindow) -> Self {
        Arena {
            base_addr: window.base_addr,
            top_addr: window.base_addr,
            buf_limit: window.base_addr.saturating_add(window.size),
        }
    }

    /// Where `count` consecutive blocks of `log2_size` would start, and the
    /// top after them. `None` when they do not fit.
    fn place(&self, top_addr: u64, log2_size: usize, count: u64) -> Option<(u64, u64)> {
        let size = 1u64 << log2_size;
        let addr = align_up(top_addr, size)?;
        let end = count.checked_mul(size).and_then(|len| addr.checked_add(len))?;
        (end <= self.buf_limit).then_some((addr, end))
    }
}

/// Reference allocator: one bump arena per memory space.
///
/// Blocks are placed largest first, each at the next address aligned to its
/// own size. Addresses are planning addresses; nothing is mapped.
#[derive(Debug, Clone)]
pub struct ArenaAllocator {
    device: Arena,
    host: Arena,
    host_pinned: Arena,
}

impl ArenaAllocator {
    pub fn new(device: ArenaWindow, host: ArenaWindow, host_pinned: ArenaWindow) -> Self {
        ArenaAllocator {
            device: Arena::new(&device),
            host: Arena::new(&host),
            host_pinned: Arena::new(&host_pinned),
        }
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        Self::new(config.arena.device, config.arena.host, config.arena.host_pinned)
    }

    fn arena(&self, space: MemorySpace) -> &Arena {
        match space {
            MemorySpace::Device => &self.device,
            MemorySpace::Host => &self.host,
            MemorySpace::HostPinned => &self.host_pinned,
        }
    }

    fn arena_mut(&mut self, space: MemorySpace) -> &mut Arena {
        match space {
            MemorySpace::Device => &mut self.device,
            MemorySpace::Host => &mut self.host,
            MemorySpace::HostPinned => &mut self.host_pinned,
        }
    }

    /// Next free address in `space`.
    pub fn top_addr(&self, space: MemorySpace) -> u64 {
        self.arena(space).top_addr
    }

    /// Releases everything at once.
    pub fn reset(&mut self) {
        for space in MemorySpace::ALL {
            let arena = self.arena_mut(space);
            arena.top_addr = arena.base_addr;
        }
    }
}

impl Allocator for ArenaAllocator {
    fn allocate(&mut self, reqs: &Requirements) -> Result<Allocation> {
        let mut allocation = Allocation::default();
        let mut tops = [0u64; 3];

        // plan every space before touching any arena
        for (slot, space) in tops.iter_mut().zip(MemorySpace::ALL) {
            let arena = self.arena(space);
            let mut top = arena.top_addr;
            let mut classes: Vec<_> = reqs.space(space).iter_nonzero().collect();
            classes.reverse();
            for (log2_size, count) in classes {
                let Some((addr, end)) = arena.place(top, log2_size, count) else {
                    let available = arena.buf_limit.saturating_sub(top);
                    warn!(%space, log2_size, count, available, "arena exhausted");
                    return Err(Error::out_of_memory(format!(
                        "Cannot place {count} blocks of {} bytes in {space} memory: \
                         {available} bytes left of {}",
                        1u64 << log2_size,
                        arena.buf_limit - arena.base_addr
                    )));
                };
                let size = 1u64 << log2_size;
                for i in 0..count {
                    allocation.push(Block {
                        space,
                        log2_size,
                        addr: addr + i * size,
                    });
                }
                top = end;
            }
            *slot = top;
        }

        for (top, space) in tops.into_iter().zip(MemorySpace::ALL) {
            self.arena_mut(space).top_addr = top;
        }
        debug!(blocks = allocation.blocks().len(), "allocation placed");
        Ok(allocation)
    }

    fn allocated_bytes(&self) -> u64 {
        MemorySpace::ALL
            .iter()
            .map(|&s| self.arena(s).top_addr - self.arena(s).base_addr)
            .sum()
    }
}
