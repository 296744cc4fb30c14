//! Planning: how a tensor is laid out in memory and what memory it needs.

use serde::Serialize;
use tracing::debug;

use crate::{
    alloc::{align_up, Requirements},
    config::get_config,
    data_type::DataType,
    error::{Error, Result},
    layout::Layout,
    tensor_shape::{DimType, ShapeType, TensorShape},
    MAX_RANK,
};

/// Everything an allocator needs to realize one tensor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TensorRequirements {
    dtype: DataType,
    layout: Layout,
    rank: i32,
    shape: [i64; MAX_RANK],
    /// Distance in bytes between consecutive elements of each dimension.
    strides: [i64; MAX_RANK],
    align_bytes: i32,
    mem: Requirements,
}

impl TensorRequirements {
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn rank(&self) -> usize {
        self.rank.clamp(0, MAX_RANK as i32) as usize
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape[..self.rank()]
    }

    pub fn strides(&self) -> &[i64] {
        &self.strides[..self.rank()]
    }

    pub fn align_bytes(&self) -> usize {
        self.align_bytes as usize
    }

    pub fn mem(&self) -> &Requirements {
        &self.mem
    }

    pub fn tensor_shape(&self) -> Result<TensorShape> {
        TensorShape::new(ShapeType::from_slice(self.shape())?, self.layout)
    }

    /// Bytes spanned by the tensor: outermost size times outermost stride.
    pub fn total_bytes(&self) -> i64 {
        self.shape[0] * self.strides[0]
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::internal(format!("Failed to serialize tensor requirements: {e}")))
    }
}

fn overflow(shape: &TensorShape) -> Error {
    Error::overflow(format!("Byte size of tensor {shape} overflows"))
}

/// Plans a device tensor of `shape` and `dtype`.
///
/// Rows are packed with the innermost dimension contiguous; each row (the
/// stride of the second-innermost dimension) is padded to `alignment`, and
/// outer dimensions are packed on top of the padded rows.
pub fn calc_requirements(
    shape: &TensorShape,
    dtype: DataType,
    alignment: usize,
) -> Result<TensorRequirements> {
    if !alignment.is_power_of_two() || alignment > i32::MAX as usize {
        return Err(Error::invalid_argument(format!(
            "Alignment must be a power of two, got {alignment}"
        )));
    }
    let rank = shape.rank();
    if rank == 0 {
        return Err(Error::invalid_argument(format!(
            "Tensor shape {shape} must have at least one dimension"
        )));
    }
    if let Some((d, &size)) = shape.dims().iter().enumerate().find(|(_, &size)| size <= 0) {
        return Err(Error::invalid_argument(format!(
            "Dimension {d} of tensor shape {shape} must be positive, got {size}"
        )));
    }

    let dims = shape.dims();
    let elem_size = dtype.size_bytes()? as DimType;
    let mut strides = [0i64; MAX_RANK];
    strides[rank - 1] = elem_size;
    if rank >= 2 {
        let row_bytes = dims[rank - 1]
            .checked_mul(elem_size)
            .ok_or_else(|| overflow(shape))?;
        let row_pitch = align_up(row_bytes as u64, alignment as u64)
            .and_then(|p| i64::try_from(p).ok())
            .ok_or_else(|| overflow(shape))?;
        strides[rank - 2] = row_pitch;
        for d in (0..rank - 2).rev() {
            strides[d] = strides[d + 1]
                .checked_mul(dims[d + 1])
                .ok_or_else(|| overflow(shape))?;
        }
    }
    let total_bytes = dims[0].checked_mul(strides[0]).ok_or_else(|| overflow(shape))?;

    let mut mem = Requirements::default();
    let log2 = mem.device.add_bytes(total_bytes as u64)?;
    debug!(
        %shape,
        %dtype,
        alignment,
        strides = ?&strides[..rank],
        total_bytes,
        log2,
        "calculated tensor requirements"
    );

    let mut shape_arr = [0i64; MAX_RANK];
    shape_arr[..rank].copy_from_slice(dims);
    Ok(TensorRequirements {
        dtype,
        layout: *shape.layout(),
        rank: rank as i32,
        shape: shape_arr,
        strides,
        align_bytes: alignment as i32,
        mem,
    })
}

/// [`calc_requirements`] with the configured default alignment.
pub fn calc_requirements_default(
    shape: &TensorShape,
    dtype: DataType,
) -> Result<TensorRequirements> {
    calc_requirements(shape, dtype, get_config().default_alignment)
}

/// Combined requirements of several tensors, each planned separately.
pub fn calc_batch_requirements(
    tensors: &[(TensorShape, DataType)],
    alignment: usize,
) -> Result<Requirements> {
    let mut total = Requirements::default();
    for (shape, dtype) in tensors {
        total.checked_add_assign(calc_requirements(shape, *dtype, alignment)?.mem())?;
    }
    debug!(
        tensors = tensors.len(),
        total_bytes = %total.total_bytes(),
        "calculated batch requirements"
    );
    Ok(total)
}
