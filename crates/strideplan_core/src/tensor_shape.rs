//! A tensor's logical shape: dimension sizes paired with their layout labels.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    layout::Layout,
    shape::FixedShape,
};

pub type DimType = i64;
pub type ShapeType = FixedShape<DimType>;

/// Sizes plus layout. When the layout is not empty its rank equals the shape's.
///
/// Ordered lexicographically by sizes, then layout, so it can key a map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawTensorShape", into = "RawTensorShape")]
pub struct TensorShape {
    shape: ShapeType,
    layout: Layout,
}

#[derive(Serialize, Deserialize)]
struct RawTensorShape {
    shape: ShapeType,
    layout: Layout,
}

impl TryFrom<RawTensorShape> for TensorShape {
    type Error = Error;

    fn try_from(raw: RawTensorShape) -> Result<Self> {
        TensorShape::new(raw.shape, raw.layout)
    }
}

impl From<TensorShape> for RawTensorShape {
    fn from(shape: TensorShape) -> Self {
        RawTensorShape {
            shape: shape.shape,
            layout: shape.layout,
        }
    }
}

impl TensorShape {
    pub fn new(shape: ShapeType, layout: Layout) -> Result<Self> {
        if !layout.is_empty() && shape.rank() != layout.rank() {
            return Err(Error::invalid_argument(format!(
                "Layout dimensions must match shape dimensions: \
                 layout {layout} has rank {}, shape {shape} has rank {}",
                layout.rank(),
                shape.rank()
            )));
        }
        Ok(Self { shape, layout })
    }

    /// Shape from dimension sizes and a label string, e.g. `(&[1, 3, 224, 224], "NCHW")`.
    pub fn from_dims(dims: &[DimType], layout: &str) -> Result<Self> {
        Self::new(ShapeType::from_slice(dims)?, Layout::new(layout)?)
    }

    /// Zero-filled shape with one dimension per label of `layout`.
    pub fn from_layout(layout: Layout) -> Self {
        Self {
            shape: FixedShape::zeroed(layout.rank()).unwrap_or_default(),
            layout,
        }
    }

    pub fn shape(&self) -> &ShapeType {
        &self.shape
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }

    pub fn dims(&self) -> &[DimType] {
        &self.shape
    }

    /// Size of the dimension labelled `label`, first match.
    pub fn dim_of(&self, label: u8) -> Option<DimType> {
        self.layout.find(label, 0).map(|idx| self.shape[idx])
    }

    /// Re-labels this shape into `dst_layout`. See [`permute_dims`].
    pub fn permute(&self, dst_layout: Layout) -> Result<TensorShape> {
        let mut dst = ShapeType::zeroed(dst_layout.rank())?;
        permute_dims(&self.layout, &self.shape, &dst_layout, &mut dst)?;
        TensorShape::new(dst, dst_layout)
    }
}

impl std::ops::Index<usize> for TensorShape {
    type Output = DimType;

    fn index(&self, idx: usize) -> &DimType {
        &self.shape[idx]
    }
}

/// Formats as `NCHW{1x3x224x224}`, or just the sizes when there is no layout.
impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.layout.is_empty() {
            write!(f, "{}", self.shape)
        } else {
            write!(f, "{}{{{}}}", self.layout, self.shape)
        }
    }
}

/// Maps sizes labelled by `src_layout` onto the slots of `dst_layout`.
///
/// Every destination slot starts at 1. Each source label found in
/// `dst_layout` copies its size into the first matching slot; source labels
/// absent from the destination are dropped. When the source repeats a label,
/// the later occurrence wins. No memory is reordered.
pub fn permute_dims(
    src_layout: &Layout,
    src_shape: &[DimType],
    dst_layout: &Layout,
    dst_shape: &mut [DimType],
) -> Result<()> {
    if src_shape.len() != src_layout.rank() {
        return Err(Error::invalid_argument(format!(
            "Source shape has {} dimensions but source layout {src_layout} has {}",
            src_shape.len(),
            src_layout.rank()
        )));
    }
    if dst_shape.len() != dst_layout.rank() {
        return Err(Error::invalid_argument(format!(
            "Destination shape has {} dimensions but destination layout {dst_layout} has {}",
            dst_shape.len(),
            dst_layout.rank()
        )));
    }

    dst_shape.fill(1);
    for (label, &size) in src_layout.iter().zip(src_shape) {
        if let Some(dst_idx) = dst_layout.find(label, 0) {
            dst_shape[dst_idx] = size;
        }
    }
    Ok(())
}
