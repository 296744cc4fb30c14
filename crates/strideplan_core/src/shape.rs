//! Fixed-capacity shape storage.

use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::{Deref, DerefMut},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    error::{Error, Result},
    MAX_RANK,
};

/// Dimension sizes stored inline, up to `N` of them.
///
/// Dereferences to a slice of the first `rank` entries, so indexing and
/// iteration are bounded by the rank, not the capacity.
#[derive(Clone, Copy)]
pub struct FixedShape<T, const N: usize = MAX_RANK> {
    data: [T; N],
    rank: usize,
}

impl<T: Copy + Default, const N: usize> FixedShape<T, N> {
    pub const MAX_RANK: usize = N;

    /// An empty shape.
    pub fn new() -> Self {
        Self {
            data: [T::default(); N],
            rank: 0,
        }
    }

    /// A shape of `rank` default (zero) entries.
    pub fn zeroed(rank: usize) -> Result<Self> {
        if rank > N {
            return Err(Error::invalid_argument(format!(
                "Shape rank {rank} is too big, must be <= {N}"
            )));
        }
        Ok(Self {
            data: [T::default(); N],
            rank,
        })
    }

    pub fn from_slice(dims: &[T]) -> Result<Self> {
        let mut shape = Self::zeroed(dims.len())?;
        shape.copy_from_slice(dims);
        Ok(shape)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Appends a dimension, failing once the capacity is reached.
    pub fn try_push(&mut self, dim: T) -> Result<()> {
        if self.rank == N {
            return Err(Error::invalid_argument(format!(
                "Shape is full, cannot exceed rank {N}"
            )));
        }
        self.data[self.rank] = dim;
        self.rank += 1;
        Ok(())
    }
}

impl<T: Copy + Default, const N: usize> Default for FixedShape<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Deref for FixedShape<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data[..self.rank]
    }
}

impl<T, const N: usize> DerefMut for FixedShape<T, N> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data[..self.rank]
    }
}

impl<T: Copy + Default, const N: usize> TryFrom<&[T]> for FixedShape<T, N> {
    type Error = Error;

    fn try_from(dims: &[T]) -> Result<Self> {
        Self::from_slice(dims)
    }
}

impl<T: Copy + Default, const N: usize, const K: usize> TryFrom<[T; K]> for FixedShape<T, N> {
    type Error = Error;

    fn try_from(dims: [T; K]) -> Result<Self> {
        Self::from_slice(&dims)
    }
}

impl<T: PartialEq, const N: usize> PartialEq for FixedShape<T, N> {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl<T: Eq, const N: usize> Eq for FixedShape<T, N> {}

impl<T: Hash, const N: usize> Hash for FixedShape<T, N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (**self).hash(state);
    }
}

impl<T: PartialOrd, const N: usize> PartialOrd for FixedShape<T, N> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        (**self).partial_cmp(&**other)
    }
}

impl<T: Ord, const N: usize> Ord for FixedShape<T, N> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (**self).cmp(&**other)
    }
}

/// Formats as `2x3x4`, or `(empty)` for rank 0.
impl<T: fmt::Display, const N: usize> fmt::Display for FixedShape<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((head, tail)) = self.split_first() else {
            return f.write_str("(empty)");
        };
        write!(f, "{head}")?;
        for dim in tail {
            write!(f, "x{dim}")?;
        }
        Ok(())
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for FixedShape<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Serialize, const N: usize> Serialize for FixedShape<T, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de, T, const N: usize> Deserialize<'de> for FixedShape<T, N>
where
    T: Deserialize<'de> + Copy + Default,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let dims = Vec::<T>::deserialize(deserializer)?;
        Self::from_slice(&dims).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Shape = FixedShape<i64>;

    #[test]
    fn test_constructors() {
        let empty = Shape::new();
        assert_eq!(empty.rank(), 0);
        assert!(empty.is_empty());

        let zeroed = Shape::zeroed(3).unwrap();
        assert_eq!(&*zeroed, &[0, 0, 0]);

        let shape = Shape::try_from([2, 3, 4]).unwrap();
        assert_eq!(shape.rank(), 3);
        assert_eq!(shape[1], 3);
        assert_eq!(shape.get(3), None);
        assert_eq!(Shape::MAX_RANK, MAX_RANK);
    }

    #[test]
    fn test_rank_limit() {
        assert!(Shape::zeroed(MAX_RANK).is_ok());
        assert!(Shape::zeroed(MAX_RANK + 1).is_err());
        assert!(Shape::from_slice(&[1; 16]).is_err());

        let mut shape = FixedShape::<i64, 2>::new();
        shape.try_push(1).unwrap();
        shape.try_push(2).unwrap();
        assert!(shape.try_push(3).is_err());
    }

    #[test]
    #[should_panic]
    fn test_index_bounded_by_rank() {
        let shape = Shape::try_from([2, 3]).unwrap();
        let _ = shape[2];
    }

    #[test]
    fn test_index_mut() {
        let mut shape = Shape::try_from([2, 3]).unwrap();
        shape[0] = 7;
        assert_eq!(&*shape, &[7, 3]);
    }

    #[test]
    fn test_equality_ignores_capacity_tail() {
        let mut a = Shape::try_from([1, 2, 3]).unwrap();
        a.try_push(9).unwrap();
        let b = Shape::try_from([1, 2, 3, 9]).unwrap();
        assert_eq!(a, b);
        assert_ne!(Shape::try_from([1, 2]).unwrap(), Shape::try_from([1, 2, 0]).unwrap());
    }

    #[test]
    fn test_lexicographic_order() {
        let a = Shape::try_from([1, 2]).unwrap();
        let b = Shape::try_from([1, 2, 0]).unwrap();
        let c = Shape::try_from([2]).unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::new().to_string(), "(empty)");
        assert_eq!(Shape::try_from([1, 3, 224, 224]).unwrap().to_string(), "1x3x224x224");
    }

    #[test]
    fn test_serde_as_sequence() {
        let shape = Shape::try_from([2, 3]).unwrap();
        let json = serde_json::to_string(&shape).unwrap();
        assert_eq!(json, "[2,3]");
        assert_eq!(serde_json::from_str::<Shape>(&json).unwrap(), shape);
        assert!(serde_json::from_str::<FixedShape<i64, 1>>("[1,2]").is_err());
    }
}
