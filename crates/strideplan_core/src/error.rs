//! Status codes and the error type shared by every fallible operation.

use derive_more::Display;
use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Status codes, C-compatible so they can cross the FFI boundary unchanged.
#[repr(C)]
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Status {
    #[display("STRIDEPLAN_SUCCESS")]
    Success = 0,
    #[display("STRIDEPLAN_ERROR_NOT_IMPLEMENTED")]
    NotImplemented,
    #[display("STRIDEPLAN_ERROR_INVALID_ARGUMENT")]
    InvalidArgument,
    #[display("STRIDEPLAN_ERROR_INVALID_IMAGE_FORMAT")]
    InvalidImageFormat,
    #[display("STRIDEPLAN_ERROR_INVALID_OPERATION")]
    InvalidOperation,
    #[display("STRIDEPLAN_ERROR_DEVICE")]
    Device,
    #[display("STRIDEPLAN_ERROR_NOT_READY")]
    NotReady,
    #[display("STRIDEPLAN_ERROR_OUT_OF_MEMORY")]
    OutOfMemory,
    #[display("STRIDEPLAN_ERROR_INTERNAL")]
    Internal,
    #[display("STRIDEPLAN_ERROR_NOT_COMPATIBLE")]
    NotCompatible,
    #[display("STRIDEPLAN_ERROR_OVERFLOW")]
    Overflow,
    #[display("STRIDEPLAN_ERROR_UNDERFLOW")]
    Underflow,
    #[display("STRIDEPLAN_ERROR_ASSERT_FAILED")]
    AssertionFailed,
}

impl Status {
    /// One-line description of the status.
    pub fn description(self) -> &'static str {
        match self {
            Status::Success => "operation succeeded",
            Status::NotImplemented => "operation is not implemented",
            Status::InvalidArgument => "invalid argument, out of range or unacceptable value",
            Status::InvalidImageFormat => "image format is not accepted",
            Status::InvalidOperation => "operation is not valid in the current state",
            Status::Device => "device backend error",
            Status::NotReady => "operation has not completed yet, try again later",
            Status::OutOfMemory => "not enough free memory to satisfy the request",
            Status::Internal => "internal error, bad state",
            Status::NotCompatible => "incompatible object or version",
            Status::Overflow => "result is larger than the maximum accepted value",
            Status::Underflow => "result is smaller than the minimum accepted value",
            Status::AssertionFailed => "assertion failed",
        }
    }

    /// The status name with a trailing NUL, for C callers.
    pub(crate) fn c_name(self) -> &'static str {
        match self {
            Status::Success => "STRIDEPLAN_SUCCESS\0",
            Status::NotImplemented => "STRIDEPLAN_ERROR_NOT_IMPLEMENTED\0",
            Status::InvalidArgument => "STRIDEPLAN_ERROR_INVALID_ARGUMENT\0",
            Status::InvalidImageFormat => "STRIDEPLAN_ERROR_INVALID_IMAGE_FORMAT\0",
            Status::InvalidOperation => "STRIDEPLAN_ERROR_INVALID_OPERATION\0",
            Status::Device => "STRIDEPLAN_ERROR_DEVICE\0",
            Status::NotReady => "STRIDEPLAN_ERROR_NOT_READY\0",
            Status::OutOfMemory => "STRIDEPLAN_ERROR_OUT_OF_MEMORY\0",
            Status::Internal => "STRIDEPLAN_ERROR_INTERNAL\0",
            Status::NotCompatible => "STRIDEPLAN_ERROR_NOT_COMPATIBLE\0",
            Status::Overflow => "STRIDEPLAN_ERROR_OVERFLOW\0",
            Status::Underflow => "STRIDEPLAN_ERROR_UNDERFLOW\0",
            Status::AssertionFailed => "STRIDEPLAN_ERROR_ASSERT_FAILED\0",
        }
    }
}

/// An error raised by this crate: a status plus a message with the offending values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct Error {
    status: Status,
    message: String,
}

impl Error {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Status::InvalidArgument, message)
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(Status::InvalidOperation, message)
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Self::new(Status::Overflow, message)
    }

    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::new(Status::OutOfMemory, message)
    }

    pub fn not_compatible(message: impl Into<String>) -> Self {
        Self::new(Status::NotCompatible, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Status::Internal, message)
    }

    /// Index `idx` outside `[0; rank-1]` for the accessor named by `what`.
    pub(crate) fn index_out_of_bounds(
        what: &str,
        idx: impl std::fmt::Display,
        rank: usize,
    ) -> Self {
        Self::invalid_argument(format!(
            "Index of {what} {idx} is out of bounds [0;{}]",
            rank as i64 - 1
        ))
    }
}
