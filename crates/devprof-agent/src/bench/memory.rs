//! CPU-side RAM bandwidth.

use std::hint::black_box;
use std::time::Instant;
use tracing::debug;

use super::{BenchError, CACHE_LINE, gb_per_sec, mb_to_bytes, soft};

const FILL_PATTERN: u8 = 0xab;

/// Mean of write and strided-read bandwidth over a `buffer_size_mb` buffer, in GB/s.
///
/// Returns 0 and logs an error when the buffer cannot be allocated.
pub fn memory_bandwidth(buffer_size_mb: usize) -> f32 {
    soft(
        "memory",
        mb_to_bytes(buffer_size_mb).and_then(try_memory_bandwidth),
    )
}

/// Time a full-buffer fill and a cache-line-strided read of `bytes` bytes.
///
/// The read pass touches one byte per cache line, so every line is pulled
/// from memory once and the prefetcher gets no help from reuse.
pub fn try_memory_bandwidth(bytes: usize) -> Result<f32, BenchError> {
    if bytes == 0 {
        return Err(BenchError::InvalidSize("buffer size must be non-zero".into()));
    }
    let mut buffer: Vec<u8> = Vec::new();
    buffer
        .try_reserve_exact(bytes)
        .map_err(|source| BenchError::Alloc { bytes, source })?;

    let start = Instant::now();
    buffer.resize(bytes, FILL_PATTERN);
    black_box(&mut buffer);
    let write = gb_per_sec(bytes, start.elapsed())?;

    let start = Instant::now();
    let checksum = buffer
        .iter()
        .step_by(CACHE_LINE)
        .fold(0u64, |acc, &b| acc.wrapping_add(b as u64));
    black_box(checksum);
    let read = gb_per_sec(bytes, start.elapsed())?;

    debug!(bytes, write_gbps = write, read_gbps = read, "memory bandwidth");
    Ok((write + read) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_run_is_positive() {
        assert!(memory_bandwidth(4) > 0.0);
    }

    #[test]
    fn allocation_failure_reports_exactly_zero() {
        let result = try_memory_bandwidth(isize::MAX as usize + 1);
        assert!(matches!(result, Err(BenchError::Alloc { .. })));
        assert_eq!(soft("memory", result), 0.0);
    }

    #[test]
    fn overflowing_size_reports_exactly_zero() {
        assert_eq!(memory_bandwidth(usize::MAX), 0.0);
    }

    #[test]
    fn zero_size_reports_exactly_zero() {
        assert_eq!(memory_bandwidth(0), 0.0);
    }

    #[test]
    fn unaligned_buffer_still_measures() {
        let bw = try_memory_bandwidth(CACHE_LINE * 1024 + 1).unwrap();
        assert!(bw > 0.0);
    }
}
