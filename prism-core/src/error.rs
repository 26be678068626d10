//! Error types shared by every stage of the pipeline.

use thiserror::Error;

use crate::catalog::FilterId;
use crate::format::{FormatContext, PixelLayout};

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Debug, Error)]
pub enum FilterError {
    /// Every buffer under the pool's allocation threshold is in flight.
    #[error("Buffer pool exhausted ({threshold} buffers in flight)")]
    PoolExhausted { threshold: usize },
    #[error("Filter not registered: {0}")]
    UnknownFilter(FilterId),
    #[error("Input frames differ in geometry: expected {expected}, found {found}")]
    HeterogeneousInputs {
        expected: FormatContext,
        found: FormatContext,
    },
    #[error("Filter {0} was run before initialize")]
    NotInitialized(FilterId),
    #[error("GPU error: {0}")]
    Device(#[from] GpuError),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Allocation of {0} bytes failed")]
    AllocationFailed(usize),
    #[error("{filter} cannot process {layout} frames")]
    UnsupportedLayout { filter: FilterId, layout: PixelLayout },
    #[error("No input frames supplied")]
    NoInputFrames,
    #[error("Filter {0} registered twice")]
    DuplicateFilter(FilterId),
    #[error("Settings error: {0}")]
    Settings(String),
}

impl FilterError {
    /// Errors a caller can recover from by retrying on a later frame.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::PoolExhausted { .. } | Self::HeterogeneousInputs { .. } => true,
            Self::Device(err) => !err.is_device_lost(),
            _ => false,
        }
    }
}

/// Failures reported by the compute device.
#[derive(Debug, Clone, Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter")]
    NoAdapter,
    #[error("Device request failed: {0}")]
    RequestDevice(String),
    #[error("No compute device was supplied to this pipeline")]
    Unavailable,
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Out of GPU memory")]
    OutOfMemory,
    #[error("Readback failed: {0}")]
    Readback(String),
    #[error("Workgroup of {requested} invocations exceeds device limit {limit}")]
    WorkgroupTooLarge { requested: u32, limit: u32 },
    #[error("GPU device lost")]
    Lost,
}

impl GpuError {
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::Lost)
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(err: wgpu::RequestDeviceError) -> Self {
        GpuError::RequestDevice(err.to_string())
    }
}

impl From<wgpu::Error> for GpuError {
    fn from(err: wgpu::Error) -> Self {
        match err {
            wgpu::Error::OutOfMemory { .. } => GpuError::OutOfMemory,
            other => GpuError::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_is_transient() {
        assert!(FilterError::PoolExhausted { threshold: 3 }.is_transient());
        assert!(FilterError::Device(GpuError::OutOfMemory).is_transient());
        assert!(!FilterError::Device(GpuError::Lost).is_transient());
        assert!(!FilterError::NotInitialized(FilterId::Invert).is_transient());
    }

    #[test]
    fn messages_name_the_filter() {
        let err = FilterError::UnknownFilter(FilterId::GaussianBlur);
        assert_eq!(err.to_string(), "Filter not registered: Gaussian Blur");
    }
}
