//! Disk bandwidth.
//!
//! Read tests open the caller's file read-only and never touch data this
//! process wrote, which would be served from the page cache. Write tests go
//! to a private scratch file that is removed when the measurement is done.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::debug;

use super::{BenchError, alloc_buffer, gb_per_sec, mb_to_bytes, soft};

const WRITE_PATTERN: u8 = 0x5a;
const WRITE_SEED: u64 = 0x6465_7670_726f_66;
const READ_SEED: u64 = 0x7265_6164_6f66_6673;

/// Read `buffer_size_mb` megabytes from `path` in one call and report GB/s.
///
/// Returns 0 and logs an error if the file cannot be opened or holds fewer
/// bytes than requested.
pub fn disk_read_bandwidth(path: &Path, buffer_size_mb: usize) -> f32 {
    soft("disk_read", try_disk_read_bandwidth(path, buffer_size_mb))
}

pub fn try_disk_read_bandwidth(path: &Path, buffer_size_mb: usize) -> Result<f32, BenchError> {
    let bytes = mb_to_bytes(buffer_size_mb)?;
    let file = open(path)?;
    try_read_bandwidth(file, bytes)
}

/// Time a single fill of a `bytes`-sized buffer from `reader`.
pub fn try_read_bandwidth<R: Read>(mut reader: R, bytes: usize) -> Result<f32, BenchError> {
    if bytes == 0 {
        return Err(BenchError::InvalidSize("buffer size must be non-zero".into()));
    }
    let mut buffer = alloc_buffer(bytes, 0)?;

    let start = Instant::now();
    read_fully(&mut reader, &mut buffer)?;
    let elapsed = start.elapsed();

    debug!(bytes, elapsed_us = elapsed.as_micros() as u64, "disk read");
    gb_per_sec(bytes, elapsed)
}

/// Sequential write bandwidth: `total` bytes in `block`-sized writes to a
/// scratch file in `scratch_dir`, synced before the clock stops.
pub fn try_disk_seq_write(
    scratch_dir: &Path,
    total: usize,
    block: usize,
) -> Result<f32, BenchError> {
    check_sizes(total, block)?;
    let buffer = alloc_buffer(block, WRITE_PATTERN)?;
    let mut scratch = scratch_file(scratch_dir)?;

    let start = Instant::now();
    let mut written = 0;
    while written < total {
        let n = block.min(total - written);
        scratch.as_file_mut().write_all(&buffer[..n])?;
        written += n;
    }
    scratch.as_file().sync_all()?;
    let elapsed = start.elapsed();

    debug!(total, block, elapsed_us = elapsed.as_micros() as u64, "disk seq write");
    gb_per_sec(total, elapsed)
}

/// Random write bandwidth: `total / block` writes of `block` bytes at
/// block-aligned offsets of a `total`-byte scratch file.
pub fn try_disk_rnd_write(
    scratch_dir: &Path,
    total: usize,
    block: usize,
) -> Result<f32, BenchError> {
    check_sizes(total, block)?;
    let buffer = alloc_buffer(block, WRITE_PATTERN)?;
    let mut scratch = scratch_file(scratch_dir)?;
    scratch.as_file().set_len(total as u64)?;

    let ops = total / block;
    let offsets = random_offsets(WRITE_SEED, ops as u64, ops);

    let file = scratch.as_file_mut();
    let start = Instant::now();
    for offset in offsets {
        file.seek(SeekFrom::Start(offset * block as u64))?;
        file.write_all(&buffer)?;
    }
    file.sync_all()?;
    let elapsed = start.elapsed();

    debug!(ops, block, elapsed_us = elapsed.as_micros() as u64, "disk rnd write");
    gb_per_sec(ops * block, elapsed)
}

/// Random read bandwidth: `total / block` reads of `block` bytes at
/// block-aligned offsets anywhere in `path`.
pub fn try_disk_rnd_read(path: &Path, total: usize, block: usize) -> Result<f32, BenchError> {
    check_sizes(total, block)?;
    let mut file = open(path)?;
    let file_len = file.metadata()?.len();
    let blocks_in_file = file_len / block as u64;
    if blocks_in_file == 0 {
        return Err(BenchError::ShortRead {
            expected: block,
            actual: file_len as usize,
        });
    }

    let ops = total / block;
    let offsets = random_offsets(READ_SEED, blocks_in_file, ops);
    let mut buffer = alloc_buffer(block, 0)?;

    let start = Instant::now();
    for offset in offsets {
        file.seek(SeekFrom::Start(offset * block as u64))?;
        read_fully(&mut file, &mut buffer)?;
    }
    let elapsed = start.elapsed();

    debug!(ops, block, elapsed_us = elapsed.as_micros() as u64, "disk rnd read");
    gb_per_sec(ops * block, elapsed)
}

fn random_offsets(seed: u64, blocks_in_file: u64, ops: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..ops).map(|_| rng.gen_range(0..blocks_in_file)).collect()
}

fn check_sizes(total: usize, block: usize) -> Result<(), BenchError> {
    if total == 0 || block == 0 {
        return Err(BenchError::InvalidSize("disk sizes must be non-zero".into()));
    }
    if block > total {
        return Err(BenchError::InvalidSize(format!(
            "block of {block} bytes exceeds total of {total}"
        )));
    }
    Ok(())
}

fn open(path: &Path) -> Result<File, BenchError> {
    File::open(path).map_err(|source| BenchError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn scratch_file(dir: &Path) -> Result<NamedTempFile, BenchError> {
    NamedTempFile::new_in(dir).map_err(|source| BenchError::Open {
        path: dir.to_path_buf(),
        source,
    })
}

/// Fill `buffer` completely, failing with `ShortRead` on early EOF
fn read_fully<R: Read>(reader: &mut R, buffer: &mut [u8]) -> Result<(), BenchError> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if filled < buffer.len() {
        return Err(BenchError::ShortRead {
            expected: buffer.len(),
            actual: filled,
        });
    }
    Ok(())
}
