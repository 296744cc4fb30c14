//! The allocation seam: requirements in, placed blocks out.

use smallvec::SmallVec;

use crate::error::Result;

pub mod arena;
pub mod requirements;

pub use arena::ArenaAllocator;
pub use requirements::{
    MemorySpace, Requirements, SizeClassRequirements, MAX_BLOCK_SIZE, MAX_LOG2_BLOCK_SIZE,
    NUM_SIZE_CLASSES,
};

/// Turns [`Requirements`] into placed blocks.
///
/// Implementations satisfy all buckets of one call or none of them.
pub trait Allocator {
    fn allocate(&mut self, reqs: &Requirements) -> Result<Allocation>;

    /// Bytes handed out so far, placement padding included.
    fn allocated_bytes(&self) -> u64 {
        0
    }
}

/// One placed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub space: MemorySpace,
    pub log2_size: usize,
    pub addr: u64,
}

impl Block {
    pub fn size(&self) -> u64 {
        1 << self.log2_size
    }
}

/// Every block produced by one [`Allocator::allocate`] call, in placement order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    blocks: SmallVec<[Block; 4]>,
}

impl Allocation {
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn first_block(&self, space: MemorySpace) -> Option<&Block> {
        self.blocks.iter().find(|b| b.space == space)
    }

    pub(crate) fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }
}

/// Rounds `addr` up to the next multiple of `align`, a power of two.
pub fn align_up(addr: u64, align: u64) -> Option<u64> {
    debug_assert!(align.is_power_of_two());
    addr.checked_add(align - 1).map(|a| a & !(align - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), Some(0));
        assert_eq!(align_up(1, 256), Some(256));
        assert_eq!(align_up(896, 256), Some(1024));
        assert_eq!(align_up(1024, 256), Some(1024));
        assert_eq!(align_up(u64::MAX, 2), None);
    }

    #[test]
    fn test_first_block() {
        let mut allocation = Allocation::default();
        allocation.push(Block {
            space: MemorySpace::Host,
            log2_size: 4,
            addr: 0x100,
        });
        allocation.push(Block {
            space: MemorySpace::Device,
            log2_size: 12,
            addr: 0x1000,
        });
        assert_eq!(allocation.first_block(MemorySpace::Device).unwrap().size(), 4096);
        assert!(allocation.first_block(MemorySpace::HostPinned).is_none());
    }
}
