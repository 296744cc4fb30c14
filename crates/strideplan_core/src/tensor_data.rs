//! Tensor data views: the raw record describing a realized tensor, and
//! capability-layered accessors over it.
//!
//! ```text
//! TensorData            rank, shape, layout, dtype
//!   StridedView         + base address, per-dimension byte strides
//!     StridedDeviceView + base address is in device memory
//! ```
//!
//! Capabilities are tag tests on [`TensorBuffer`], not type casts. The element
//! at index vector `idx` lives at `base + Σ idx[d] * stride(d)`.

use std::{cell::OnceCell, ops::Deref};

use tracing::trace;

use crate::{
    data_type::DataType,
    error::{Error, Result},
    layout::Layout,
    shape::FixedShape,
    tensor_requirements::TensorRequirements,
    tensor_shape::{DimType, TensorShape},
    MAX_RANK,
};

/// Elements reachable through a base pointer plus byte strides.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StridedBuffer {
    pub strides: [i64; MAX_RANK],
    pub base: *mut u8,
}

impl Default for StridedBuffer {
    fn default() -> Self {
        StridedBuffer {
            strides: [0; MAX_RANK],
            base: std::ptr::null_mut(),
        }
    }
}

/// How the tensor's elements can be reached.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TensorBuffer {
    #[default]
    None,
    /// Strided buffer in device memory.
    StridedDevice(StridedBuffer),
}

/// Raw description of a realized tensor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TensorDataRecord {
    pub dtype: DataType,
    pub layout: Layout,
    pub rank: i32,
    pub shape: [i64; MAX_RANK],
    pub buffer: TensorBuffer,
}

impl TensorDataRecord {
    fn validate(&self) -> Result<()> {
        if !(0..=MAX_RANK as i32).contains(&self.rank) {
            return Err(Error::invalid_argument(format!(
                "Tensor rank {} is out of bounds [0;{MAX_RANK}]",
                self.rank
            )));
        }
        if !self.layout.is_empty() && self.layout.rank() != self.rank as usize {
            return Err(Error::invalid_argument(format!(
                "Layout {} has rank {} but tensor rank is {}",
                self.layout,
                self.layout.rank(),
                self.rank
            )));
        }
        Ok(())
    }
}

/// A realized tensor's data record with a lazily built [`TensorShape`] view.
///
/// The cached shape belongs to this object; sharing one `TensorData` between
/// threads needs external locking, and the cell makes it `!Sync`.
#[derive(Debug, Clone)]
pub struct TensorData {
    record: TensorDataRecord,
    shape_cache: OnceCell<TensorShape>,
}

impl TensorData {
    pub fn from_record(record: TensorDataRecord) -> Result<Self> {
        record.validate()?;
        Ok(TensorData {
            record,
            shape_cache: OnceCell::new(),
        })
    }

    pub fn new_strided_device(shape: &TensorShape, dtype: DataType, buffer: StridedBuffer) -> Self {
        let mut dims = [0i64; MAX_RANK];
        dims[..shape.rank()].copy_from_slice(shape.dims());
        TensorData {
            record: TensorDataRecord {
                dtype,
                layout: *shape.layout(),
                rank: shape.rank() as i32,
                shape: dims,
                buffer: TensorBuffer::StridedDevice(buffer),
            },
            shape_cache: OnceCell::new(),
        }
    }

    /// Strided device tensor laid out as planned by `reqs`, starting at `base`.
    pub fn from_requirements(reqs: &TensorRequirements, base: *mut u8) -> Result<Self> {
        let mut strides = [0i64; MAX_RANK];
        strides[..reqs.rank()].copy_from_slice(reqs.strides());
        Ok(Self::new_strided_device(
            &reqs.tensor_shape()?,
            reqs.dtype(),
            StridedBuffer { strides, base },
        ))
    }

    pub fn rank(&self) -> usize {
        self.record.rank as usize
    }

    /// The shape view, rebuilt from the record after every mutation.
    pub fn shape(&self) -> &TensorShape {
        self.shape_cache.get_or_init(|| {
            trace!("rebuilding cached tensor shape");
            let dims =
                FixedShape::from_slice(&self.record.shape[..self.rank()]).unwrap_or_default();
            TensorShape::new(dims, self.record.layout).unwrap_or_default()
        })
    }

    /// Size of dimension `d`.
    pub fn dim(&self, d: usize) -> Result<DimType> {
        self.record.shape[..self.rank()]
            .get(d)
            .copied()
            .ok_or_else(|| Error::index_out_of_bounds("shape dimension", d, self.rank()))
    }

    pub fn layout(&self) -> &Layout {
        self.shape().layout()
    }

    pub fn dtype(&self) -> DataType {
        self.record.dtype
    }

    pub fn record(&self) -> &TensorDataRecord {
        &self.record
    }

    /// The only way to mutate the record. Drops the cached shape first, and
    /// restores the previous record if the edited one is invalid.
    pub fn modify<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut TensorDataRecord),
    {
        self.shape_cache.take();
        let previous = self.record;
        f(&mut self.record);
        if let Err(err) = self.record.validate() {
            self.record = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn is_strided(&self) -> bool {
        matches!(self.record.buffer, TensorBuffer::StridedDevice(_))
    }

    pub fn is_device(&self) -> bool {
        matches!(self.record.buffer, TensorBuffer::StridedDevice(_))
    }

    pub fn as_strided(&self) -> Result<StridedView<'_>> {
        match &self.record.buffer {
            TensorBuffer::StridedDevice(buffer) => Ok(StridedView { data: self, buffer }),
            TensorBuffer::None => Err(Error::not_compatible("Tensor data has no strided buffer")),
        }
    }

    pub fn as_strided_device(&self) -> Result<StridedDeviceView<'_>> {
        if !self.is_device() {
            return Err(Error::not_compatible("Tensor data is not a strided device buffer"));
        }
        self.as_strided().map(StridedDeviceView)
    }
}

/// Strided access to a [`TensorData`].
#[derive(Debug, Clone, Copy)]
pub struct StridedView<'a> {
    data: &'a TensorData,
    buffer: &'a StridedBuffer,
}

impl<'a> Deref for StridedView<'a> {
    type Target = TensorData;

    fn deref(&self) -> &TensorData {
        self.data
    }
}

impl<'a> StridedView<'a> {
    pub fn base(&self) -> *mut u8 {
        self.buffer.base
    }

    /// Byte stride of dimension `d`.
    pub fn stride(&self, d: usize) -> Result<i64> {
        self.strides()
            .get(d)
            .copied()
            .ok_or_else(|| Error::index_out_of_bounds("stride", d, self.data.rank()))
    }

    pub fn strides(&self) -> &'a [i64] {
        &self.buffer.strides[..self.data.rank()]
    }

    /// Byte offset of the element at `idx` from [`Self::base`].
    pub fn byte_offset(&self, idx: &[i64]) -> Result<i64> {
        let rank = self.data.rank();
        if idx.len() != rank {
            return Err(Error::invalid_argument(format!(
                "Element index has {} coordinates but tensor rank is {rank}",
                idx.len()
            )));
        }
        let dims = &self.data.record.shape[..rank];
        let mut offset = 0i64;
        for (d, ((&i, &size), &stride)) in idx.iter().zip(dims).zip(self.strides()).enumerate() {
            if !(0..size).contains(&i) {
                return Err(Error::invalid_argument(format!(
                    "Index {i} of dimension {d} is out of bounds [0;{}]",
                    size - 1
                )));
            }
            offset = i
                .checked_mul(stride)
                .and_then(|o| offset.checked_add(o))
                .ok_or_else(|| {
                    Error::overflow(format!("Byte offset of element {idx:?} overflows"))
                })?;
        }
        Ok(offset)
    }

    /// Address of the element at `idx`. The address is computed, never read.
    pub fn element_ptr(&self, idx: &[i64]) -> Result<*mut u8> {
        let offset = self.byte_offset(idx)?;
        Ok(self.base().wrapping_offset(offset as isize))
    }
}

/// Strided access whose base address is in device memory.
#[derive(Debug, Clone, Copy, derive_more::Deref)]
pub struct StridedDeviceView<'a>(StridedView<'a>);
