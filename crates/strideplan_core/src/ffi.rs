//! C entry points.
//!
//! Every fallible function returns a [`Status`]. On failure the message is
//! kept per thread and can be read with [`strideplan_last_error_message`]
//! until the next failing call on the same thread.

use std::{
    cell::RefCell,
    ffi::{c_char, CStr, CString},
};

use tracing::debug;

use crate::{
    alloc::SizeClassRequirements,
    data_type::DataType,
    error::{Error, Result, Status},
    layout::Layout,
    shape::FixedShape,
    tensor_requirements::{calc_requirements, TensorRequirements},
    tensor_shape::{permute_dims, TensorShape},
};

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

fn report(result: Result<()>) -> Status {
    match result {
        Ok(()) => Status::Success,
        Err(err) => {
            debug!(status = %err.status(), "{}", err.message());
            let message = CString::new(err.message().replace('\0', " ")).unwrap_or_default();
            LAST_ERROR.with(|last| *last.borrow_mut() = message);
            err.status()
        }
    }
}

fn null_argument(name: &str) -> Error {
    Error::invalid_argument(format!("{name} must not be null"))
}

unsafe fn layout_ref<'a>(layout: *const Layout, name: &str) -> Result<&'a Layout> {
    unsafe { layout.as_ref() }.ok_or_else(|| null_argument(name))
}

/// Writes without reading or dropping the old value, so `out` may be uninitialized.
unsafe fn write_out<T>(out: *mut T, value: T) -> Result<()> {
    if out.is_null() {
        return Err(null_argument("out"));
    }
    unsafe { out.write(value) };
    Ok(())
}

/// Name of `status`, e.g. `STRIDEPLAN_ERROR_OVERFLOW`. The string is static.
#[no_mangle]
pub extern "C" fn strideplan_status_name(status: Status) -> *const c_char {
    status.c_name().as_ptr().cast()
}

/// Message of the last failure on this thread, or an empty string.
///
/// The pointer stays valid until the next failing call on this thread.
#[no_mangle]
pub extern "C" fn strideplan_last_error_message() -> *const c_char {
    LAST_ERROR.with(|last| last.borrow().as_ptr())
}

/// # Safety
///
/// `descr` must be null or a NUL-terminated string, and `out` must be null or
/// point to writable memory for one [`Layout`].
#[no_mangle]
pub unsafe extern "C" fn strideplan_layout_make(descr: *const c_char, out: *mut Layout) -> Status {
    report((|| -> Result<()> {
        if descr.is_null() {
            return Err(null_argument("descr"));
        }
        let labels = unsafe { CStr::from_ptr(descr) }.to_bytes();
        unsafe { write_out(out, Layout::from_labels(labels)?) }
    })())
}

/// Builds a layout from the labels in `[begin, end)`.
///
/// # Safety
///
/// `begin` and `end` must be null or bound one readable range, and `out` must
/// be null or point to writable memory for one [`Layout`].
#[no_mangle]
pub unsafe extern "C" fn strideplan_layout_make_range(
    begin: *const c_char,
    end: *const c_char,
    out: *mut Layout,
) -> Status {
    report((|| -> Result<()> {
        if begin.is_null() || end.is_null() {
            return Err(null_argument("Layout range"));
        }
        let len = (end as isize).wrapping_sub(begin as isize);
        if len < 0 {
            return Err(Error::invalid_argument(format!("Range length {len} is negative")));
        }
        let labels = unsafe { std::slice::from_raw_parts(begin.cast::<u8>(), len as usize) };
        unsafe { write_out(out, Layout::from_labels(labels)?) }
    })())
}

/// # Safety
///
/// `layout` and `out` must be null or valid pointers to a [`Layout`].
#[no_mangle]
pub unsafe extern "C" fn strideplan_layout_first(
    layout: *const Layout,
    n: i32,
    out: *mut Layout,
) -> Status {
    report((|| -> Result<()> {
        let layout = unsafe { layout_ref(layout, "layout") }?;
        unsafe { write_out(out, layout.first(n as isize)) }
    })())
}

/// # Safety
///
/// `layout` and `out` must be null or valid pointers to a [`Layout`].
#[no_mangle]
pub unsafe extern "C" fn strideplan_layout_last(
    layout: *const Layout,
    n: i32,
    out: *mut Layout,
) -> Status {
    report((|| -> Result<()> {
        let layout = unsafe { layout_ref(layout, "layout") }?;
        unsafe { write_out(out, layout.last(n as isize)) }
    })())
}

/// # Safety
///
/// `layout` and `out` must be null or valid pointers to a [`Layout`].
#[no_mangle]
pub unsafe extern "C" fn strideplan_layout_sub_range(
    layout: *const Layout,
    begin: i32,
    end: i32,
    out: *mut Layout,
) -> Status {
    report((|| -> Result<()> {
        let layout = unsafe { layout_ref(layout, "layout") }?;
        unsafe { write_out(out, layout.sub_range(begin as isize, end as isize)) }
    })())
}

/// Index of `label` at or after `start`, or -1. A null layout has no labels.
///
/// # Safety
///
/// `layout` must be null or point to a valid [`Layout`].
#[no_mangle]
pub unsafe extern "C" fn strideplan_layout_find(
    layout: *const Layout,
    label: c_char,
    start: i32,
) -> i32 {
    unsafe { layout.as_ref() }
        .and_then(|layout| layout.find(label as u8, start as isize))
        .map_or(-1, |idx| idx as i32)
}

/// # Safety
///
/// `a` and `b` must be null or point to valid layouts. Null compares as empty.
#[no_mangle]
pub unsafe extern "C" fn strideplan_layout_compare(a: *const Layout, b: *const Layout) -> i32 {
    let a = unsafe { a.as_ref() }.copied().unwrap_or_default();
    let b = unsafe { b.as_ref() }.copied().unwrap_or_default();
    a.compare(&b)
}

/// # Safety
///
/// `layout` and `test` must be null or point to valid layouts. Null is empty.
#[no_mangle]
pub unsafe extern "C" fn strideplan_layout_starts_with(
    layout: *const Layout,
    test: *const Layout,
) -> bool {
    let layout = unsafe { layout.as_ref() }.copied().unwrap_or_default();
    let test = unsafe { test.as_ref() }.copied().unwrap_or_default();
    layout.starts_with(&test)
}

/// # Safety
///
/// `layout` and `test` must be null or point to valid layouts. Null is empty.
#[no_mangle]
pub unsafe extern "C" fn strideplan_layout_ends_with(
    layout: *const Layout,
    test: *const Layout,
) -> bool {
    let layout = unsafe { layout.as_ref() }.copied().unwrap_or_default();
    let test = unsafe { test.as_ref() }.copied().unwrap_or_default();
    layout.ends_with(&test)
}

/// # Safety
///
/// `layout` must be null or point to a valid [`Layout`]. Null is empty.
#[no_mangle]
pub unsafe extern "C" fn strideplan_layout_is_channel_last(layout: *const Layout) -> bool {
    unsafe { layout.as_ref() }.map_or(true, Layout::is_channel_last)
}

/// Writes `dst_layout.rank()` sizes to `dst_shape`.
///
/// # Safety
///
/// `src_shape` must hold `src_layout.rank()` readable values and `dst_shape`
/// room for `dst_layout.rank()` values. Layout pointers must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn strideplan_shape_permute(
    src_layout: *const Layout,
    src_shape: *const i64,
    dst_layout: *const Layout,
    dst_shape: *mut i64,
) -> Status {
    report((|| -> Result<()> {
        let src_layout = unsafe { layout_ref(src_layout, "src_layout") }?;
        let dst_layout = unsafe { layout_ref(dst_layout, "dst_layout") }?;
        if src_shape.is_null() && src_layout.rank() > 0 {
            return Err(null_argument("src_shape"));
        }
        if dst_shape.is_null() && dst_layout.rank() > 0 {
            return Err(null_argument("dst_shape"));
        }
        let src: &[i64] = if src_layout.is_empty() {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(src_shape, src_layout.rank()) }
        };
        let dst: &mut [i64] = if dst_layout.is_empty() {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(dst_shape, dst_layout.rank()) }
        };
        permute_dims(src_layout, src, dst_layout, dst)
    })())
}

/// Stores the size class of `nbytes` in `out_log2`.
///
/// # Safety
///
/// `out_log2` must be null or point to a writable `i32`.
#[no_mangle]
pub unsafe extern "C" fn strideplan_size_class_classify(nbytes: u64, out_log2: *mut i32) -> Status {
    report((|| -> Result<()> {
        let log2 = SizeClassRequirements::classify(nbytes)?;
        unsafe { write_out(out_log2, log2 as i32) }
    })())
}

/// Plans a device tensor; see [`calc_requirements`].
///
/// # Safety
///
/// `shape` must hold `rank` readable values, `layout` must be null (no
/// layout) or valid, and `out` must be null or point to writable memory for
/// one [`TensorRequirements`].
#[no_mangle]
pub unsafe extern "C" fn strideplan_calc_tensor_requirements(
    dtype: u64,
    layout: *const Layout,
    rank: i32,
    shape: *const i64,
    alignment: i32,
    out: *mut TensorRequirements,
) -> Status {
    report((|| -> Result<()> {
        if shape.is_null() {
            return Err(null_argument("shape"));
        }
        if rank < 0 || alignment < 0 {
            return Err(Error::invalid_argument(format!(
                "Rank {rank} and alignment {alignment} must not be negative"
            )));
        }
        let dims = unsafe { std::slice::from_raw_parts(shape, rank as usize) };
        let layout = unsafe { layout.as_ref() }.copied().unwrap_or_default();
        let shape = TensorShape::new(FixedShape::from_slice(dims)?, layout)?;
        let reqs = calc_requirements(&shape, DataType::from_raw(dtype), alignment as usize)?;
        unsafe { write_out(out, reqs) }
    })())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_error() -> String {
        unsafe { CStr::from_ptr(strideplan_last_error_message()) }
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn test_layout_make_and_find() {
        let mut layout = Layout::NONE;
        let status = unsafe { strideplan_layout_make(b"NCHW\0".as_ptr().cast(), &mut layout) };
        assert_eq!(status, Status::Success);
        assert_eq!(layout.as_str(), "NCHW");
        assert_eq!(unsafe { strideplan_layout_find(&layout, b'H' as c_char, 0) }, 2);
        assert_eq!(unsafe { strideplan_layout_find(&layout, b'D' as c_char, 0) }, -1);
        assert_eq!(unsafe { strideplan_layout_find(&layout, b'N' as c_char, -2) }, -1);
        assert!(!unsafe { strideplan_layout_is_channel_last(&layout) });
    }

    #[test]
    fn test_null_arguments_fail() {
        let mut layout = Layout::NONE;
        let status = unsafe { strideplan_layout_make(std::ptr::null(), &mut layout) };
        assert_eq!(status, Status::InvalidArgument);
        assert_eq!(last_error(), "descr must not be null");

        let status =
            unsafe { strideplan_layout_make(b"HW\0".as_ptr().cast(), std::ptr::null_mut()) };
        assert_eq!(status, Status::InvalidArgument);

        let status = unsafe {
            strideplan_layout_make_range(std::ptr::null(), std::ptr::null(), &mut layout)
        };
        assert_eq!(status, Status::InvalidArgument);
    }

    #[test]
    fn test_make_range() {
        let labels = b"NHWC";
        let mut layout = Layout::NONE;
        let begin = labels.as_ptr().cast::<c_char>();
        let end = unsafe { begin.add(3) };
        assert_eq!(
            unsafe { strideplan_layout_make_range(begin, end, &mut layout) },
            Status::Success
        );
        assert_eq!(layout.as_str(), "NHW");
        assert_eq!(
            unsafe { strideplan_layout_make_range(end, begin, &mut layout) },
            Status::InvalidArgument
        );
    }

    #[test]
    fn test_too_long_layout() {
        let mut layout = Layout::NONE;
        let descr = b"NCHWNCHWNCHWNCHW\0";
        let status = unsafe { strideplan_layout_make(descr.as_ptr().cast(), &mut layout) };
        assert_eq!(status, Status::InvalidArgument);
        assert!(!last_error().is_empty());
    }

    #[test]
    fn test_slicing_and_predicates() {
        let layout = Layout::new("NCHW").unwrap();
        let mut out = Layout::NONE;
        unsafe { strideplan_layout_first(&layout, 2, &mut out) };
        assert_eq!(out.as_str(), "NC");
        unsafe { strideplan_layout_last(&layout, -1, &mut out) };
        assert_eq!(out.as_str(), "N");
        unsafe { strideplan_layout_sub_range(&layout, 1, -1, &mut out) };
        assert_eq!(out.as_str(), "CH");
        let hw = Layout::new("HW").unwrap();
        assert!(unsafe { strideplan_layout_ends_with(&layout, &hw) });
        assert!(!unsafe { strideplan_layout_starts_with(&layout, &hw) });
        assert!(unsafe { strideplan_layout_starts_with(&layout, std::ptr::null()) });
        assert_eq!(unsafe { strideplan_layout_compare(&layout, &hw) }, 2);
    }

    #[test]
    fn test_shape_permute() {
        let src_layout = Layout::new("HW").unwrap();
        let dst_layout = Layout::new("NCHW").unwrap();
        let src = [4i64, 5];
        let mut dst = [0i64; 4];
        let status = unsafe {
            strideplan_shape_permute(&src_layout, src.as_ptr(), &dst_layout, dst.as_mut_ptr())
        };
        assert_eq!(status, Status::Success);
        assert_eq!(dst, [1, 1, 4, 5]);
    }

    #[test]
    fn test_classify() {
        let mut log2 = -1;
        assert_eq!(unsafe { strideplan_size_class_classify(4096, &mut log2) }, Status::Success);
        assert_eq!(log2, 12);
        assert_eq!(
            unsafe { strideplan_size_class_classify((1 << 32) + 1, &mut log2) },
            Status::Overflow
        );
        assert_eq!(log2, 12);
    }

    #[test]
    fn test_calc_tensor_requirements() {
        let layout = Layout::new("NCHW").unwrap();
        let shape = [1i64, 3, 224, 224];
        let mut reqs = std::mem::MaybeUninit::<TensorRequirements>::uninit();
        let status = unsafe {
            strideplan_calc_tensor_requirements(
                DataType::F32.raw(),
                &layout,
                4,
                shape.as_ptr(),
                256,
                reqs.as_mut_ptr(),
            )
        };
        assert_eq!(status, Status::Success);
        let reqs = unsafe { reqs.assume_init() };
        assert_eq!(reqs.strides(), &[688128, 229376, 1024, 4]);

        let mut out = reqs;
        let status = unsafe {
            strideplan_calc_tensor_requirements(
                DataType::F32.raw(),
                &layout,
                3,
                shape.as_ptr(),
                256,
                &mut out,
            )
        };
        assert_eq!(status, Status::InvalidArgument);
        assert_eq!(out, reqs);
    }

    #[test]
    fn test_status_name() {
        let name = unsafe { CStr::from_ptr(strideplan_status_name(Status::OutOfMemory)) };
        assert_eq!(name.to_str().unwrap(), "STRIDEPLAN_ERROR_OUT_OF_MEMORY");
    }
}
