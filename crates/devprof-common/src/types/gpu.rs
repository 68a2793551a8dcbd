use serde::{Deserialize, Serialize};

use super::PerFormat;

/// Acceleration backends the inference runtime was built with
///
/// The flags are independent; any subset may be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GpuSupport {
    pub metal: bool,
    pub cuda: bool,
    pub vulkan: bool,
    pub kompute: bool,
    pub gpublas: bool,
    pub blas: bool,
    pub sycl: bool,
}

impl GpuSupport {
    /// Number of capability flags
    pub const COUNT: usize = 7;

    /// Flags in wire order
    pub fn to_array(self) -> [bool; Self::COUNT] {
        [
            self.metal,
            self.cuda,
            self.vulkan,
            self.kompute,
            self.gpublas,
            self.blas,
            self.sycl,
        ]
    }

    pub fn from_array(flags: [bool; Self::COUNT]) -> Self {
        let [metal, cuda, vulkan, kompute, gpublas, blas, sycl] = flags;
        Self {
            metal,
            cuda,
            vulkan,
            kompute,
            gpublas,
            blas,
            sycl,
        }
    }

    /// Field names in wire order
    pub const NAMES: [&'static str; Self::COUNT] =
        ["metal", "cuda", "vulkan", "kompute", "gpublas", "blas", "sycl"];
}

/// Measured performance of one GPU backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendPerf {
    /// VRAM read bandwidth in GB/s
    pub read_vram_bw: f32,
    /// Throughput per weight format in GFLOPS
    pub flops: PerFormat<f32>,
}

/// GPU description plus per-backend measurements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuProps {
    pub name: String,
    pub description: String,
    /// Free VRAM in GiB
    pub memory_free: f32,
    /// Total VRAM in GiB
    pub memory_total: f32,
    pub metal: BackendPerf,
    pub cuda: BackendPerf,
}
