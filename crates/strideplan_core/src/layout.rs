//! Tensor layouts: one single-character label per dimension, such as `NCHW` or `NHWC`.
//!
//! A [`Layout`] holds at most [`MAX_RANK`] labels inline. Range operations
//! (`first`, `last`, `sub_range`) clamp instead of failing; only construction
//! validates its input.
//!
//! Duplicate labels are accepted. Lookups resolve them with a first-match
//! policy: [`Layout::find`] returns the lowest index at or after `start`.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    error::{Error, Result},
    MAX_RANK,
};

/// Well-known dimension labels.
pub mod label {
    /// batch size `N`
    pub const BATCH: u8 = b'N';
    /// channel `C`
    pub const CHANNEL: u8 = b'C';
    /// frame `F`
    pub const FRAME: u8 = b'F';
    /// depth `D`
    pub const DEPTH: u8 = b'D';
    /// height `H`
    pub const HEIGHT: u8 = b'H';
    /// width `W`
    pub const WIDTH: u8 = b'W';
}

/// Assigns a label to each dimension of a tensor.
///
/// Equality, ordering and hashing only look at the first `rank` labels.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Layout {
    labels: [u8; MAX_RANK + 1],
    rank: i32,
}

/// Layouts implied by a rank when none is given, indexed by rank.
const IMPLICIT: [Layout; 7] = [
    Layout::from_static(b""),
    Layout::from_static(b"W"),
    Layout::from_static(b"HW"),
    Layout::from_static(b"NHW"),
    Layout::from_static(b"NCHW"),
    Layout::from_static(b"NCDHW"),
    Layout::from_static(b"NCFDHW"),
];

/// The layout implicitly used for a tensor of `rank` dimensions, if there is one.
pub fn implicit_layout(rank: usize) -> Option<Layout> {
    IMPLICIT.get(rank).copied()
}

impl Layout {
    /// The empty layout, used when a tensor has no layout.
    pub const NONE: Layout = Layout {
        labels: [0; MAX_RANK + 1],
        rank: 0,
    };

    const fn from_static(descr: &[u8]) -> Layout {
        let mut labels = [0u8; MAX_RANK + 1];
        let mut i = 0;
        while i < descr.len() {
            labels[i] = descr[i];
            i += 1;
        }
        Layout {
            labels,
            rank: descr.len() as i32,
        }
    }

    /// Builds a layout from a label string such as `"NCHW"`.
    pub fn new(descr: &str) -> Result<Self> {
        if descr.len() > MAX_RANK {
            let shown: String = descr.chars().take(31).collect();
            let ellipsis = if descr.chars().count() > 31 { "..." } else { "" };
            return Err(Error::invalid_argument(format!(
                "Tensor layout description is too big, \
                 must have at most {MAX_RANK} labels: {shown}{ellipsis}"
            )));
        }
        Self::from_labels(descr.as_bytes())
    }

    /// Builds a layout from an explicit range of labels.
    pub fn from_labels(labels: &[u8]) -> Result<Self> {
        if labels.len() > MAX_RANK {
            return Err(Error::invalid_argument(format!(
                "Range length {} too large, must be <= {MAX_RANK}",
                labels.len()
            )));
        }
        if let Some(pos) = labels.iter().position(|&l| l == 0 || !l.is_ascii()) {
            return Err(Error::invalid_argument(format!(
                "Layout label at position {pos} must be a non-NUL ASCII character, got {:#04x}",
                labels[pos]
            )));
        }
        Ok(Self::copy_of(labels))
    }

    /// Copies already validated labels.
    fn copy_of(labels: &[u8]) -> Self {
        let mut out = Layout::NONE;
        out.labels[..labels.len()].copy_from_slice(labels);
        out.rank = labels.len() as i32;
        out
    }

    /// Number of labels.
    pub fn rank(&self) -> usize {
        self.rank.clamp(0, MAX_RANK as i32) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.rank() == 0
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels[..self.rank()]
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.labels()).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.labels().iter().copied()
    }

    /// Label at `idx`; negative indices count from the end.
    pub fn get(&self, idx: isize) -> Option<u8> {
        let rank = self.rank() as isize;
        let idx = if idx < 0 { rank + idx } else { idx };
        (0..rank).contains(&idx).then(|| self.labels[idx as usize])
    }

    /// The first `min(n, rank)` labels. A negative `n` yields `last(-n)`.
    pub fn first(&self, n: isize) -> Layout {
        let count = n.unsigned_abs().min(self.rank());
        if n >= 0 {
            Self::copy_of(&self.labels()[..count])
        } else {
            Self::copy_of(&self.labels()[self.rank() - count..])
        }
    }

    /// The last `min(n, rank)` labels. A negative `n` yields `first(-n)`.
    pub fn last(&self, n: isize) -> Layout {
        let count = n.unsigned_abs().min(self.rank());
        if n >= 0 {
            Self::copy_of(&self.labels()[self.rank() - count..])
        } else {
            Self::copy_of(&self.labels()[..count])
        }
    }

    /// Labels in `[begin, end)`. Negative bounds count from the end, then both
    /// are clamped into `[0, rank]`; an empty or inverted range gives [`Layout::NONE`].
    pub fn sub_range(&self, begin: isize, end: isize) -> Layout {
        let rank = self.rank() as isize;
        let clamp = |idx: isize| {
            if idx < 0 {
                (rank + idx).max(0)
            } else {
                idx.min(rank)
            }
        };
        let (begin, end) = (clamp(begin), clamp(end));
        if end > begin {
            Self::copy_of(&self.labels()[begin as usize..end as usize])
        } else {
            Layout::NONE
        }
    }

    /// Index of the first `label` at or after `start`; a negative `start` counts from the end.
    pub fn find(&self, label: u8, start: isize) -> Option<usize> {
        let rank = self.rank() as isize;
        let start = if start < 0 { (rank + start).max(0) } else { start };
        if start >= rank {
            return None;
        }
        let start = start as usize;
        self.labels()[start..]
            .iter()
            .position(|&l| l == label)
            .map(|pos| pos + start)
    }

    /// An empty `test` always matches.
    pub fn starts_with(&self, test: &Layout) -> bool {
        self.labels().starts_with(test.labels())
    }

    /// An empty `test` always matches.
    pub fn ends_with(&self, test: &Layout) -> bool {
        self.labels().ends_with(test.labels())
    }

    /// Three-way comparison. Layouts of different rank compare by rank
    /// difference; equal ranks compare label bytes.
    pub fn compare(&self, other: &Layout) -> i32 {
        if self.rank() != other.rank() {
            return self.rank() as i32 - other.rank() as i32;
        }
        self.labels()
            .iter()
            .zip(other.labels())
            .find(|(a, b)| a != b)
            .map_or(0, |(&a, &b)| a as i32 - b as i32)
    }

    /// True when the layout is empty or its last label is `C`.
    pub fn is_channel_last(&self) -> bool {
        self.labels()
            .last()
            .map_or(true, |&l| l == label::CHANNEL)
    }

    pub fn has_duplicate_labels(&self) -> bool {
        let labels = self.labels();
        labels
            .iter()
            .enumerate()
            .any(|(i, l)| labels[i + 1..].contains(l))
    }
}

impl Default for Layout {
    fn default() -> Self {
        Layout::NONE
    }
}

impl PartialEq for Layout {
    fn eq(&self, other: &Self) -> bool {
        self.labels() == other.labels()
    }
}

impl Eq for Layout {}

impl Hash for Layout {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.labels().hash(state);
    }
}

impl std::ops::Index<usize> for Layout {
    type Output = u8;

    fn index(&self, idx: usize) -> &u8 {
        &self.labels()[idx]
    }
}

impl Ord for Layout {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other).cmp(&0)
    }
}

impl PartialOrd for Layout {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Layout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Layout::new(s)
    }
}

impl TryFrom<&str> for Layout {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Layout::new(s)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Layout({:?})", self.as_str())
    }
}

impl Serialize for Layout {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Layout {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let descr = String::deserialize(deserializer)?;
        Layout::new(&descr).map_err(serde::de::Error::custom)
    }
}
