//! Micro-benchmarks for disk, memory and compute throughput.
//!
//! Every measurement has a fallible `try_*` core that returns a
//! [`BenchError`]. The stand-alone entry points also come as soft wrappers
//! that log the failure and report zero. A failed benchmark never affects the
//! others.

pub mod disk;
pub mod flops;
pub mod measure;
pub mod memory;
pub mod quant;

use std::collections::TryReserveError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

pub use disk::disk_read_bandwidth;
pub use flops::{FlopsShape, cpu_flops};
pub use measure::{MeasureConfig, Sample};
pub use memory::memory_bandwidth;

/// Total bytes moved by the disk benchmarks
pub const DISK_TEST_TOTAL_BYTES: usize = 500 * 1024 * 1024;
/// Block size of sequential disk operations
pub const DISK_TEST_SEQ_BLOCK: usize = 100 * 1024 * 1024;
/// Block size of random disk operations
pub const DISK_TEST_RND_BLOCK: usize = 4096;
/// Stride of the memory read pass
pub const CACHE_LINE: usize = 64;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Why a single measurement produced no number
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("unable to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("failed to allocate {bytes} bytes: {source}")]
    Alloc {
        bytes: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("invalid buffer size: {0}")]
    InvalidSize(String),

    #[error("invalid matrix shape: {0}")]
    InvalidShape(String),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("{0} is not supported on this host")]
    Unsupported(String),

    #[error("timer reported a zero-length interval")]
    Clock,
}

/// Convert a size in megabytes to bytes, rejecting zero and overflow
pub(crate) fn mb_to_bytes(mb: usize) -> Result<usize, BenchError> {
    match mb.checked_mul(BYTES_PER_MB) {
        Some(0) => Err(BenchError::InvalidSize("buffer size must be non-zero".into())),
        Some(bytes) => Ok(bytes),
        None => Err(BenchError::InvalidSize(format!("{mb} MB overflows usize"))),
    }
}

/// Empty vector with room for exactly `len` elements, or `BenchError::Alloc`
pub(crate) fn try_with_capacity<T>(len: usize) -> Result<Vec<T>, BenchError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|source| BenchError::Alloc {
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
            source,
        })?;
    Ok(buffer)
}

/// Allocate a buffer filled with `fill`, surfacing allocation failure as an error
pub(crate) fn alloc_buffer(bytes: usize, fill: u8) -> Result<Vec<u8>, BenchError> {
    let mut buffer = try_with_capacity(bytes)?;
    buffer.resize(bytes, fill);
    Ok(buffer)
}

/// Throughput in GB/s (10^9 bytes per second)
pub(crate) fn gb_per_sec(bytes: usize, elapsed: Duration) -> Result<f32, BenchError> {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return Err(BenchError::Clock);
    }
    Ok((bytes as f64 / secs / 1e9) as f32)
}

/// Unwrap a measurement, logging and zeroing failures
pub(crate) fn soft(benchmark: &str, result: Result<f32, BenchError>) -> f32 {
    match result {
        Ok(value) => value,
        Err(e) => {
            error!(benchmark, error = %e, "measurement failed");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mb_conversion_rejects_zero_and_overflow() {
        assert_eq!(mb_to_bytes(2).unwrap(), 2 * 1024 * 1024);
        assert!(matches!(mb_to_bytes(0), Err(BenchError::InvalidSize(_))));
        assert!(matches!(
            mb_to_bytes(usize::MAX),
            Err(BenchError::InvalidSize(_))
        ));
    }

    #[test]
    fn zero_interval_is_an_error() {
        assert!(matches!(
            gb_per_sec(10, Duration::ZERO),
            Err(BenchError::Clock)
        ));
        let bw = gb_per_sec(2_000_000_000, Duration::from_secs(2)).unwrap();
        assert!((bw - 1.0).abs() < 1e-6);
    }

    #[test]
    fn oversized_allocation_fails_cleanly() {
        let result = alloc_buffer(isize::MAX as usize + 1, 0);
        assert!(matches!(result, Err(BenchError::Alloc { .. })));
    }

    #[test]
    fn element_capacity_past_isize_is_an_alloc_error() {
        let result = try_with_capacity::<f32>(usize::MAX / 2);
        match result {
            Err(BenchError::Alloc { bytes, .. }) => assert_eq!(bytes, usize::MAX),
            other => panic!("expected Alloc, got {other:?}"),
        }
    }

    #[test]
    fn soft_zeroes_errors() {
        assert_eq!(soft("test", Err(BenchError::Clock)), 0.0);
        assert_eq!(soft("test", Ok(3.5)), 3.5);
    }
}
