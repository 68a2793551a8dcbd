//! CPU floating-point throughput per weight format.
//!
//! The kernel is a batched matrix-vector product: `batch` activation rows
//! (always F32) against a `rows x cols` weight matrix stored in the format
//! under test. Rows are split across a rayon pool of the requested size.

use devprof_common::types::NumericFormat;
use half::f16;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Deserialize;
use std::hint::black_box;
use tracing::debug;

use super::measure::{MeasureConfig, measure};
use super::quant::{BlockQ4K, BlockQ6K, BlockQ8_0, QK_K, dot_blocks};
use super::{BenchError, soft, try_with_capacity};

const WEIGHT_SEED: u64 = 0x0f10_9500;

/// Dimensions of the throughput kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FlopsShape {
    /// Output features (weight rows)
    pub rows: usize,
    /// Input features; must be a multiple of 256 for K-quant formats
    pub cols: usize,
    /// Activation vectors per iteration
    pub batch: usize,
}

impl Default for FlopsShape {
    fn default() -> Self {
        Self {
            rows: 512,
            cols: 4096,
            batch: 8,
        }
    }
}

impl FlopsShape {
    /// Floating-point operations per kernel invocation (multiply + add)
    pub fn flops(&self) -> u64 {
        2u64.saturating_mul(self.rows as u64)
            .saturating_mul(self.cols as u64)
            .saturating_mul(self.batch as u64)
    }

    fn validate(&self, format: NumericFormat) -> Result<(), BenchError> {
        if self.rows == 0 || self.cols == 0 || self.batch == 0 {
            return Err(BenchError::InvalidShape(format!(
                "{}x{}x{} has a zero dimension",
                self.rows, self.cols, self.batch
            )));
        }
        let products = [
            ("weight", self.rows, self.cols),
            ("activation", self.batch, self.cols),
            ("output", self.rows, self.batch),
        ];
        for (buffer, a, b) in products {
            if a.checked_mul(b).is_none() {
                return Err(BenchError::InvalidShape(format!(
                    "{}x{}x{} {buffer} element count overflows usize",
                    self.rows, self.cols, self.batch
                )));
            }
        }
        if self.cols % format.block_size() != 0 {
            return Err(BenchError::InvalidShape(format!(
                "cols {} is not a multiple of the {format} block size {}",
                self.cols,
                format.block_size()
            )));
        }
        Ok(())
    }
}

/// A row-major weight matrix in one of the benchmarked formats
pub enum Weights {
    F32(Vec<f32>),
    F16(Vec<f16>),
    Q4K(Vec<BlockQ4K>),
    Q6K(Vec<BlockQ6K>),
    Q80(Vec<BlockQ8_0>),
}

impl Weights {
    /// Random matrix; `cols` must be a multiple of the format's block size
    ///
    /// Fails with `InvalidShape` when `rows * cols` overflows and with `Alloc`
    /// when the matrix does not fit in memory.
    pub fn random<R: Rng>(
        format: NumericFormat,
        rows: usize,
        cols: usize,
        rng: &mut R,
    ) -> Result<Self, BenchError> {
        let elements = rows.checked_mul(cols).ok_or_else(|| {
            BenchError::InvalidShape(format!("{rows}x{cols} weight matrix overflows usize"))
        })?;
        let blocks = elements / format.block_size();
        Ok(match format {
            NumericFormat::F32 => Weights::F32(filled(elements, || rng.gen_range(-1.0..1.0))?),
            NumericFormat::F16 => Weights::F16(filled(elements, || {
                f16::from_f32(rng.gen_range(-1.0..1.0))
            })?),
            NumericFormat::Q4K => Weights::Q4K(filled(blocks, || BlockQ4K::random(rng))?),
            NumericFormat::Q6K => Weights::Q6K(filled(blocks, || BlockQ6K::random(rng))?),
            NumericFormat::Q80 => Weights::Q80(filled(blocks, || BlockQ8_0::random(rng))?),
        })
    }

    pub fn format(&self) -> NumericFormat {
        match self {
            Weights::F32(_) => NumericFormat::F32,
            Weights::F16(_) => NumericFormat::F16,
            Weights::Q4K(_) => NumericFormat::Q4K,
            Weights::Q6K(_) => NumericFormat::Q6K,
            Weights::Q80(_) => NumericFormat::Q80,
        }
    }

    /// Dot product of weight row `row` with `x`
    ///
    /// `scratch` must hold at least one block (256 elements).
    pub fn row_dot(&self, row: usize, cols: usize, x: &[f32], scratch: &mut [f32]) -> f32 {
        let bs = self.format().block_size();
        let per_row = cols / bs;
        let range = row * per_row..(row + 1) * per_row;
        match self {
            Weights::F32(w) => w[range].iter().zip(x).map(|(a, b)| a * b).sum(),
            Weights::F16(w) => w[range]
                .iter()
                .zip(x)
                .map(|(a, b)| a.to_f32() * b)
                .sum(),
            Weights::Q4K(w) => dot_blocks(&w[range], bs, x, scratch, BlockQ4K::dequantize),
            Weights::Q6K(w) => dot_blocks(&w[range], bs, x, scratch, BlockQ6K::dequantize),
            Weights::Q80(w) => dot_blocks(&w[range], bs, x, scratch, BlockQ8_0::dequantize),
        }
    }

    /// Expand weight row `row` to F32 into `out[..cols]`
    pub fn dequantize_row(&self, row: usize, cols: usize, out: &mut [f32]) {
        let bs = self.format().block_size();
        let per_row = cols / bs;
        let range = row * per_row..(row + 1) * per_row;
        let out = &mut out[..cols];
        match self {
            Weights::F32(w) => out.copy_from_slice(&w[range]),
            Weights::F16(w) => {
                for (o, v) in out.iter_mut().zip(&w[range]) {
                    *o = v.to_f32();
                }
            }
            Weights::Q4K(w) => {
                for (block, o) in w[range].iter().zip(out.chunks_exact_mut(bs)) {
                    block.dequantize(o);
                }
            }
            Weights::Q6K(w) => {
                for (block, o) in w[range].iter().zip(out.chunks_exact_mut(bs)) {
                    block.dequantize(o);
                }
            }
            Weights::Q80(w) => {
                for (block, o) in w[range].iter().zip(out.chunks_exact_mut(bs)) {
                    block.dequantize(o);
                }
            }
        }
    }
}

/// `len` values from `next`, allocated up front without aborting on failure
fn filled<T>(len: usize, mut next: impl FnMut() -> T) -> Result<Vec<T>, BenchError> {
    let mut values = try_with_capacity(len)?;
    values.extend((0..len).map(|_| next()));
    Ok(values)
}

fn thread_pool(n_threads: usize) -> Result<rayon::ThreadPool, BenchError> {
    if n_threads == 0 {
        return Err(BenchError::InvalidShape("thread count must be non-zero".into()));
    }
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build()?)
}

/// Throughput of `format x f32` on `n_threads` CPU threads, in GFLOPS.
///
/// Returns 0 and logs an error when the shape or thread count is unusable.
pub fn cpu_flops(
    format: NumericFormat,
    n_threads: usize,
    shape: &FlopsShape,
    config: &MeasureConfig,
) -> f32 {
    soft(
        &format!("cpu_flops_{format}"),
        try_cpu_flops(format, n_threads, shape, config),
    )
}

pub fn try_cpu_flops(
    format: NumericFormat,
    n_threads: usize,
    shape: &FlopsShape,
    config: &MeasureConfig,
) -> Result<f32, BenchError> {
    shape.validate(format)?;
    let pool = thread_pool(n_threads)?;

    let FlopsShape { rows, cols, batch } = *shape;
    let mut rng = StdRng::seed_from_u64(WEIGHT_SEED);
    let weights = Weights::random(format, rows, cols, &mut rng)?;
    let activations = filled(batch * cols, || rng.gen_range(-1.0f32..1.0))?;
    let mut output = filled(rows * batch, || 0.0f32)?;

    let sample = pool.install(|| {
        measure(config, |_| {
            output
                .par_chunks_mut(batch)
                .enumerate()
                .for_each_init(
                    || vec![0.0f32; QK_K],
                    |scratch, (row, out)| {
                        for (b, o) in out.iter_mut().enumerate() {
                            let x = &activations[b * cols..(b + 1) * cols];
                            *o = weights.row_dot(row, cols, x, scratch);
                        }
                    },
                );
            black_box(&output);
        })
    });

    if sample.median_ns <= 0.0 {
        return Err(BenchError::Clock);
    }
    let gflops = (shape.flops() as f64 / sample.median_ns) as f32;
    debug!(
        %format,
        n_threads,
        median_us = sample.median_ns / 1000.0,
        samples = sample.samples,
        gflops,
        "cpu throughput"
    );
    Ok(gflops)
}

/// Embedding table used by [`try_embedding_delay`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingShape {
    pub format: NumericFormat,
    pub vocab: usize,
    pub n_embd: usize,
}

/// Milliseconds to gather and expand `n_tokens` rows of an embedding table.
pub fn try_embedding_delay(
    shape: &EmbeddingShape,
    n_tokens: usize,
    n_threads: usize,
    config: &MeasureConfig,
) -> Result<f32, BenchError> {
    let EmbeddingShape {
        format,
        vocab,
        n_embd,
    } = *shape;
    FlopsShape {
        rows: vocab,
        cols: n_embd,
        batch: n_tokens,
    }
    .validate(format)?;
    let pool = thread_pool(n_threads)?;

    let mut rng = StdRng::seed_from_u64(WEIGHT_SEED);
    let table = Weights::random(format, vocab, n_embd, &mut rng)?;
    let tokens = filled(n_tokens, || rng.gen_range(0..vocab))?;
    let mut output = filled(n_tokens * n_embd, || 0.0f32)?;

    let sample = pool.install(|| {
        measure(config, |_| {
            output
                .par_chunks_mut(n_embd)
                .zip(&tokens)
                .for_each(|(out, &token)| table.dequantize_row(token, n_embd, out));
            black_box(&output);
        })
    });

    Ok((sample.median_ns / 1e6) as f32)
}
