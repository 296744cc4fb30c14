//! Memory requirements bucketed by power-of-two block size.

use std::{collections::BTreeMap, fmt, ops::AddAssign};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};

/// log2 of the largest block size that can be requested.
pub const MAX_LOG2_BLOCK_SIZE: usize = 32;
/// Largest block size that can be requested, in bytes.
pub const MAX_BLOCK_SIZE: u64 = 1 << MAX_LOG2_BLOCK_SIZE;
/// Number of size classes, `2^0` through `2^32` bytes.
pub const NUM_SIZE_CLASSES: usize = MAX_LOG2_BLOCK_SIZE + 1;

/// Where a block of memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySpace {
    Device,
    Host,
    HostPinned,
}

impl MemorySpace {
    pub const ALL: [MemorySpace; 3] = [
        MemorySpace::Device,
        MemorySpace::Host,
        MemorySpace::HostPinned,
    ];
}

impl fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemorySpace::Device => "device",
            MemorySpace::Host => "host",
            MemorySpace::HostPinned => "host-pinned",
        })
    }
}

/// Block counts for one memory space, indexed by `log2(block size)`.
///
/// Every block of size class `k` is `2^k` bytes and aligned to `2^k`.
/// Serialized as a map from size class to count, listing non-zero classes only.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<usize, u64>", into = "BTreeMap<usize, u64>")]
pub struct SizeClassRequirements {
    num_blocks: [u64; NUM_SIZE_CLASSES],
}

impl SizeClassRequirements {
    pub const fn new() -> Self {
        Self {
            num_blocks: [0; NUM_SIZE_CLASSES],
        }
    }

    /// Smallest size class `k` with `2^k >= nbytes`.
    pub fn classify(nbytes: u64) -> Result<usize> {
        if nbytes > MAX_BLOCK_SIZE {
            return Err(Error::overflow(format!(
                "Requested size {nbytes} bytes exceeds \
                 the largest block size {MAX_BLOCK_SIZE} bytes"
            )));
        }
        Ok(nbytes.next_power_of_two().trailing_zeros() as usize)
    }

    /// Records one block big enough for `nbytes`, returning its size class.
    pub fn add_bytes(&mut self, nbytes: u64) -> Result<usize> {
        let log2 = Self::classify(nbytes)?;
        self.num_blocks[log2] += 1;
        trace!(nbytes, log2, "classified buffer");
        Ok(log2)
    }

    /// Records `count` blocks of size class `log2`.
    pub fn add_blocks(&mut self, log2: usize, count: u64) -> Result<()> {
        let slot = self.num_blocks.get_mut(log2).ok_or_else(|| {
            Error::overflow(format!(
                "Size class {log2} exceeds the largest size class {MAX_LOG2_BLOCK_SIZE}"
            ))
        })?;
        *slot = slot
            .checked_add(count)
            .ok_or_else(|| Error::overflow(format!("Block count of size class {log2} overflows")))?;
        Ok(())
    }

    /// Adds every count of `rhs`. On `Overflow` nothing is changed.
    pub fn checked_add_assign(&mut self, rhs: &SizeClassRequirements) -> Result<()> {
        let mut sum = *self;
        for (log2, count) in rhs.iter_nonzero() {
            sum.add_blocks(log2, count)?;
        }
        *self = sum;
        Ok(())
    }

    /// Number of blocks needed in size class `log2`; zero past the last class.
    pub fn blocks(&self, log2: usize) -> u64 {
        self.num_blocks.get(log2).copied().unwrap_or(0)
    }

    pub fn as_array(&self) -> &[u64; NUM_SIZE_CLASSES] {
        &self.num_blocks
    }

    pub fn is_empty(&self) -> bool {
        self.num_blocks.iter().all(|&n| n == 0)
    }

    /// `(size class, count)` for every class with a non-zero count, smallest first.
    pub fn iter_nonzero(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.num_blocks
            .iter()
            .enumerate()
            .filter(|(_, &n)| n != 0)
            .map(|(log2, &n)| (log2, n))
    }

    /// Bytes needed to satisfy every block, before any placement padding.
    pub fn total_bytes(&self) -> u128 {
        self.iter_nonzero()
            .map(|(log2, n)| (n as u128) << log2)
            .sum()
    }
}

impl Default for SizeClassRequirements {
    fn default() -> Self {
        Self::new()
    }
}

/// Saturates each count at `u64::MAX`. Use
/// [`SizeClassRequirements::checked_add_assign`] to get `Overflow` instead.
impl AddAssign<&SizeClassRequirements> for SizeClassRequirements {
    fn add_assign(&mut self, rhs: &SizeClassRequirements) {
        for (lhs, rhs) in self.num_blocks.iter_mut().zip(rhs.num_blocks) {
            *lhs = lhs.saturating_add(rhs);
        }
    }
}

impl fmt::Debug for SizeClassRequirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter_nonzero().map(|(log2, n)| (1u64 << log2, n)))
            .finish()
    }
}

impl TryFrom<BTreeMap<usize, u64>> for SizeClassRequirements {
    type Error = Error;

    fn try_from(map: BTreeMap<usize, u64>) -> Result<Self> {
        let mut reqs = Self::new();
        for (log2, count) in map {
            reqs.add_blocks(log2, count)?;
        }
        Ok(reqs)
    }
}

impl From<SizeClassRequirements> for BTreeMap<usize, u64> {
    fn from(reqs: SizeClassRequirements) -> Self {
        reqs.iter_nonzero().collect()
    }
}

/// Requirements of every memory space, for one tensor or a batch of them.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    pub device: SizeClassRequirements,
    pub host: SizeClassRequirements,
    pub host_pinned: SizeClassRequirements,
}

impl Requirements {
    pub fn space(&self, space: MemorySpace) -> &SizeClassRequirements {
        match space {
            MemorySpace::Device => &self.device,
            MemorySpace::Host => &self.host,
            MemorySpace::HostPinned => &self.host_pinned,
        }
    }

    pub fn space_mut(&mut self, space: MemorySpace) -> &mut SizeClassRequirements {
        match space {
            MemorySpace::Device => &mut self.device,
            MemorySpace::Host => &mut self.host,
            MemorySpace::HostPinned => &mut self.host_pinned,
        }
    }

    pub fn is_empty(&self) -> bool {
        MemorySpace::ALL.iter().all(|&s| self.space(s).is_empty())
    }

    pub fn total_bytes(&self) -> u128 {
        MemorySpace::ALL.iter().map(|&s| self.space(s).total_bytes()).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::internal(format!("Failed to serialize requirements: {e}")))
    }

    /// Adds `rhs` space by space. On `Overflow` nothing is changed.
    pub fn checked_add_assign(&mut self, rhs: &Requirements) -> Result<()> {
        let mut sum = *self;
        for space in MemorySpace::ALL {
            sum.space_mut(space).checked_add_assign(rhs.space(space))?;
        }
        *self = sum;
        Ok(())
    }
}

/// Saturating, like the per-space `+=`.
impl AddAssign<&Requirements> for Requirements {
    fn add_assign(&mut self, rhs: &Requirements) {
        for space in MemorySpace::ALL {
            *self.space_mut(space) += rhs.space(space);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(SizeClassRequirements::classify(0).unwrap(), 0);
        assert_eq!(SizeClassRequirements::classify(1).unwrap(), 0);
        assert_eq!(SizeClassRequirements::classify(2).unwrap(), 1);
        assert_eq!(SizeClassRequirements::classify(3).unwrap(), 2);
        assert_eq!(SizeClassRequirements::classify(4096).unwrap(), 12);
        assert_eq!(SizeClassRequirements::classify(4097).unwrap(), 13);
        assert_eq!(SizeClassRequirements::classify(MAX_BLOCK_SIZE).unwrap(), 32);
    }

    #[test]
    fn test_classify_overflow() {
        let err = SizeClassRequirements::classify(MAX_BLOCK_SIZE + 1).unwrap_err();
        assert_eq!(err.status(), Status::Overflow);
        assert!(err.message().contains("4294967297"));
    }

    #[test]
    fn test_counts_accumulate_per_request() {
        let mut reqs = SizeClassRequirements::new();
        reqs.add_bytes(3000).unwrap();
        reqs.add_bytes(4096).unwrap();
        reqs.add_bytes(10).unwrap();
        assert_eq!(reqs.blocks(12), 2);
        assert_eq!(reqs.blocks(4), 1);
        assert_eq!(reqs.total_bytes(), 2 * 4096 + 16);
        assert_eq!(reqs.iter_nonzero().collect::<Vec<_>>(), vec![(4, 1), (12, 2)]);
    }

    #[test]
    fn test_add_blocks_rejects_unknown_class() {
        let mut reqs = SizeClassRequirements::new();
        reqs.add_blocks(32, 3).unwrap();
        assert_eq!(reqs.blocks(32), 3);
        assert_eq!(reqs.add_blocks(33, 1).unwrap_err().status(), Status::Overflow);
        assert_eq!(reqs.blocks(33), 0);
    }

    #[test]
    fn test_requirements_add_assign() {
        let mut a = Requirements::default();
        a.device.add_bytes(256).unwrap();
        let mut b = Requirements::default();
        b.device.add_bytes(200).unwrap();
        b.host_pinned.add_bytes(1).unwrap();
        a += &b;
        assert_eq!(a.device.blocks(8), 2);
        assert_eq!(a.space(MemorySpace::HostPinned).blocks(0), 1);
        assert!(a.host.is_empty());
        assert!(!a.is_empty());
        assert_eq!(a.total_bytes(), 513);
    }

    #[test]
    fn test_checked_add_assign_reports_overflow() {
        let mut a = Requirements::default();
        a.device.add_blocks(4, u64::MAX).unwrap();
        a.host.add_bytes(64).unwrap();
        let mut b = Requirements::default();
        b.host.add_bytes(64).unwrap();
        b.device.add_bytes(16).unwrap();

        let before = a;
        let err = a.checked_add_assign(&b).unwrap_err();
        assert_eq!(err.status(), Status::Overflow);
        assert_eq!(a, before);

        let mut saturated = a;
        saturated += &b;
        assert_eq!(saturated.device.blocks(4), u64::MAX);

        b.device = SizeClassRequirements::default();
        a.checked_add_assign(&b).unwrap();
        assert_eq!(a.host.blocks(6), 2);
    }

    #[test]
    fn test_json_lists_nonzero_classes() {
        let mut reqs = Requirements::default();
        reqs.device.add_bytes(1 << 20).unwrap();
        let value: serde_json::Value = serde_json::from_str(&reqs.to_json().unwrap()).unwrap();
        assert_eq!(value["device"]["20"], 1);
        assert_eq!(value["host"], serde_json::json!({}));
        let back: Requirements = serde_json::from_value(value).unwrap();
        assert_eq!(back, reqs);
    }
}
