//! Layout-aware tensor shape and memory-requirements planning.
//!
//! A [`TensorShape`] pairs dimension sizes with a [`Layout`] label string.
//! [`calc_requirements`] turns a shape and a [`DataType`] into byte strides
//! and power-of-two block counts per memory space, which an
//! [`alloc::Allocator`] places and [`TensorData`] then addresses.
//!
//! The `ffi` module exports the same operations over a C ABI; `build.rs`
//! writes the matching header with cbindgen.

use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

pub mod alloc;
pub mod config;
pub mod data_type;
pub mod error;
pub mod ffi;
pub mod layout;
pub mod shape;
pub mod tensor_data;
pub mod tensor_requirements;
pub mod tensor_shape;

/// Largest rank a layout, shape or tensor can have.
pub const MAX_RANK: usize = 15;

pub use alloc::{
    Allocation, Allocator, ArenaAllocator, MemorySpace, Requirements, SizeClassRequirements,
};
pub use config::{
    get_config, init_config_from_str, init_config_with_file, set_config, PlannerConfig,
};
pub use data_type::{DataKind, DataType};
pub use error::{Error, Result, Status};
pub use layout::{implicit_layout, label, Layout};
pub use shape::FixedShape;
pub use tensor_data::{
    StridedBuffer, StridedDeviceView, StridedView, TensorBuffer, TensorData, TensorDataRecord,
};
pub use tensor_requirements::{
    calc_batch_requirements, calc_requirements, calc_requirements_default, TensorRequirements,
};
pub use tensor_shape::{permute_dims, DimType, ShapeType, TensorShape};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Installs the global `tracing` subscriber.
///
/// `level` is the default; `RUST_LOG` overrides it. Calling this twice keeps
/// the first subscriber and prints a warning to stderr.
#[no_mangle]
pub extern "C" fn init_logger(level: LogLevel) {
    let level = LevelFilter::from(level);

    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .try_init()
        .unwrap_or_else(|err| {
            eprintln!("Failed to init logger: {}", err);
        });
    info!("Logger initialized");
}
