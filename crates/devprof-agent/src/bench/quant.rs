//! Block-quantized weight layouts used by the throughput benchmark.
//!
//! The layouts follow the GGML K-quant and Q8_0 formats so the kernels do
//! the same amount of unpacking per element that a real inference runtime
//! would.

use half::f16;
use rand::Rng;

/// Elements per Q8_0 block
pub const QK8_0: usize = 32;
/// Elements per K-quant super-block
pub const QK_K: usize = 256;
pub const K_SCALE_SIZE: usize = 12;

/// Q8_0: 8-bit quantization, 32 elements per block, 34 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BlockQ8_0 {
    pub d: f16,
    pub qs: [i8; QK8_0],
}

/// Q4_K: 256 packed 4-bit values in 8 sub-blocks with 6-bit scales and mins.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BlockQ4K {
    pub d: f16,
    pub dmin: f16,
    pub scales: [u8; K_SCALE_SIZE],
    pub qs: [u8; QK_K / 2],
}

/// Q6_K: 256 6-bit values split into low nibbles and high 2-bit pairs.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BlockQ6K {
    pub ql: [u8; QK_K / 2],
    pub qh: [u8; QK_K / 4],
    pub scales: [i8; QK_K / 16],
    pub d: f16,
}

impl BlockQ8_0 {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut qs = [0i8; QK8_0];
        rng.fill(&mut qs[..]);
        Self {
            d: f16::from_f32(rng.gen_range(0.001..0.01)),
            qs,
        }
    }

    pub fn dequantize(&self, out: &mut [f32]) {
        let d = self.d.to_f32();
        for (o, &q) in out[..QK8_0].iter_mut().zip(&self.qs) {
            *o = q as f32 * d;
        }
    }
}

impl BlockQ4K {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut scales = [0u8; K_SCALE_SIZE];
        let mut qs = [0u8; QK_K / 2];
        rng.fill(&mut scales[..]);
        rng.fill(&mut qs[..]);
        Self {
            d: f16::from_f32(rng.gen_range(0.001..0.01)),
            dmin: f16::from_f32(rng.gen_range(0.0..0.01)),
            scales,
            qs,
        }
    }

    pub fn dequantize(&self, out: &mut [f32]) {
        let d = self.d.to_f32();
        let dmin = self.dmin.to_f32();
        for chunk in 0..QK_K / 64 {
            let (sc1, m1) = scale_min_k4(2 * chunk, &self.scales);
            let (sc2, m2) = scale_min_k4(2 * chunk + 1, &self.scales);
            let (d1, m1) = (d * sc1 as f32, dmin * m1 as f32);
            let (d2, m2) = (d * sc2 as f32, dmin * m2 as f32);
            let q = &self.qs[32 * chunk..32 * chunk + 32];
            let y = &mut out[64 * chunk..64 * chunk + 64];
            for l in 0..32 {
                y[l] = d1 * (q[l] & 0x0f) as f32 - m1;
                y[l + 32] = d2 * (q[l] >> 4) as f32 - m2;
            }
        }
    }
}

/// Unpack the 6-bit scale and min of sub-block `j`
fn scale_min_k4(j: usize, q: &[u8; K_SCALE_SIZE]) -> (u8, u8) {
    if j < 4 {
        (q[j] & 63, q[j + 4] & 63)
    } else {
        (
            (q[j + 4] & 0x0f) | ((q[j - 4] >> 6) << 4),
            (q[j + 4] >> 4) | ((q[j] >> 6) << 4),
        )
    }
}

impl BlockQ6K {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut ql = [0u8; QK_K / 2];
        let mut qh = [0u8; QK_K / 4];
        let mut scales = [0i8; QK_K / 16];
        rng.fill(&mut ql[..]);
        rng.fill(&mut qh[..]);
        rng.fill(&mut scales[..]);
        Self {
            ql,
            qh,
            scales,
            d: f16::from_f32(rng.gen_range(0.0001..0.001)),
        }
    }

    pub fn dequantize(&self, out: &mut [f32]) {
        let d = self.d.to_f32();
        for half_block in 0..2 {
            let ql = &self.ql[64 * half_block..];
            let qh = &self.qh[32 * half_block..];
            let sc = &self.scales[8 * half_block..];
            let y = &mut out[128 * half_block..128 * half_block + 128];
            for l in 0..32 {
                let is = l / 16;
                let q1 = ((ql[l] & 0x0f) | ((qh[l] & 3) << 4)) as i8 - 32;
                let q2 = ((ql[l + 32] & 0x0f) | (((qh[l] >> 2) & 3) << 4)) as i8 - 32;
                let q3 = ((ql[l] >> 4) | (((qh[l] >> 4) & 3) << 4)) as i8 - 32;
                let q4 = ((ql[l + 32] >> 4) | (((qh[l] >> 6) & 3) << 4)) as i8 - 32;
                y[l] = d * sc[is] as f32 * q1 as f32;
                y[l + 32] = d * sc[is + 2] as f32 * q2 as f32;
                y[l + 64] = d * sc[is + 4] as f32 * q3 as f32;
                y[l + 96] = d * sc[is + 6] as f32 * q4 as f32;
            }
        }
    }
}

/// Quantize `x` (a multiple of 32 long) to Q8_0 with per-block absmax scaling
pub fn quantize_q8_0(x: &[f32]) -> Vec<BlockQ8_0> {
    x.chunks_exact(QK8_0)
        .map(|chunk| {
            let amax = chunk.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            let d = amax / 127.0;
            let id = if d > 0.0 { 1.0 / d } else { 0.0 };
            let mut qs = [0i8; QK8_0];
            for (q, v) in qs.iter_mut().zip(chunk) {
                *q = (v * id).round() as i8;
            }
            BlockQ8_0 {
                d: f16::from_f32(d),
                qs,
            }
        })
        .collect()
}

/// Dot product of one row of blocks with `x`, dequantizing through `scratch`
pub fn dot_blocks<B>(
    blocks: &[B],
    block_size: usize,
    x: &[f32],
    scratch: &mut [f32],
    dequantize: impl Fn(&B, &mut [f32]),
) -> f32 {
    let mut sum = 0.0f32;
    for (block, xs) in blocks.iter().zip(x.chunks_exact(block_size)) {
        dequantize(block, &mut scratch[..block_size]);
        sum += scratch[..block_size]
            .iter()
            .zip(xs)
            .map(|(w, v)| w * v)
            .sum::<f32>();
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn dot_all<B>(blocks: &[B], block_size: usize, x: &[f32], f: impl Fn(&B, &mut [f32])) -> f32 {
        let mut scratch = vec![0.0; QK_K];
        dot_blocks(blocks, block_size, x, &mut scratch, f)
    }

    #[test]
    fn q8_0_tracks_f32_dot() {
        let mut rng = StdRng::seed_from_u64(1);
        let w: Vec<f32> = (0..256).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let x: Vec<f32> = (0..256).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let exact: f32 = w.iter().zip(&x).map(|(a, b)| a * b).sum();

        let blocks = quantize_q8_0(&w);
        assert_eq!(blocks.len(), 8);
        let approx = dot_all(&blocks, QK8_0, &x, BlockQ8_0::dequantize);
        assert!((approx - exact).abs() < 0.05 * exact.abs().max(1.0));
    }

    #[test]
    fn q8_0_zero_block_has_zero_scale() {
        let blocks = quantize_q8_0(&[0.0; 32]);
        assert_eq!(blocks[0].d.to_f32(), 0.0);
        assert!(blocks[0].qs.iter().all(|&q| q == 0));
    }

    #[test]
    fn q4k_unpacks_nibbles_with_unit_scales() {
        let block = BlockQ4K {
            d: f16::from_f32(1.0),
            dmin: f16::from_f32(0.0),
            scales: [1, 1, 1, 1, 0, 0, 0, 0, 1, 1, 1, 1],
            qs: [0x21; QK_K / 2],
        };
        let mut out = [0.0f32; QK_K];
        block.dequantize(&mut out);
        for chunk in out.chunks(64) {
            assert!(chunk[..32].iter().all(|&v| v == 1.0));
            assert!(chunk[32..].iter().all(|&v| v == 2.0));
        }
        let ones = [1.0f32; QK_K];
        assert_eq!(dot_all(&[block], QK_K, &ones, BlockQ4K::dequantize), 384.0);
    }

    #[test]
    fn q4k_high_scale_bits_come_from_low_bytes() {
        let mut scales = [0u8; K_SCALE_SIZE];
        scales[0] = 0b0100_0000; // high bits of sub-block 4 scale
        scales[8] = 0x03;
        assert_eq!(scale_min_k4(4, &scales), (0x13, 0));
        assert_eq!(scale_min_k4(0, &scales), (0, 0));
    }

    #[test]
    fn q6k_offsets_by_32() {
        let mut block = BlockQ6K {
            ql: [0; QK_K / 2],
            qh: [0; QK_K / 4],
            scales: [1; QK_K / 16],
            d: f16::from_f32(1.0),
        };
        let ones = [1.0f32; QK_K];
        assert_eq!(
            dot_all(&[block], QK_K, &ones, BlockQ6K::dequantize),
            -32.0 * 256.0
        );

        block.ql = [0x11; QK_K / 2];
        block.qh = [0b0101_0101; QK_K / 4];
        let mut out = [0.0f32; QK_K];
        block.dequantize(&mut out);
        assert!(out.iter().all(|&v| v == -15.0));
    }

    #[test]
    fn random_blocks_dequantize_to_finite_values() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut out = [0.0f32; QK_K];
        BlockQ4K::random(&mut rng).dequantize(&mut out);
        assert!(out.iter().all(|v| v.is_finite()));
        BlockQ6K::random(&mut rng).dequantize(&mut out);
        assert!(out.iter().all(|v| v.is_finite()));
    }
}
