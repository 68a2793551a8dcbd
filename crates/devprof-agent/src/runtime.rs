//! Compute backend capabilities and device properties.
//!
//! The profiler talks to the inference runtime only through
//! [`ComputeRuntime`]. [`HostRuntime`] is the stand-alone implementation:
//! CPU kernels from [`crate::bench`], NVIDIA devices from nvidia-smi, and an
//! analytic model cost.

use devprof_common::types::{GpuSupport, ModelFlops, ModelParams, NumericFormat, PerFormat};
use serde::Deserialize;
use std::fmt;
use tracing::debug;

use crate::bench::flops::{EmbeddingShape, try_cpu_flops, try_embedding_delay};
use crate::bench::{BenchError, FlopsShape, MeasureConfig};
use crate::config::Config;
use crate::gpu::{self, GpuDevice};

/// Tokens looked up by the embedding delay benchmark
const EMBEDDING_TOKENS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Cpu,
    Metal,
    Cuda,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Cpu => "cpu",
            Backend::Metal => "metal",
            Backend::Cuda => "cuda",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu(usize),
}

/// Name and memory of one compute device, memory in GiB
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendProps {
    pub name: String,
    pub description: String,
    pub memory_free: f32,
    pub memory_total: f32,
}

/// Capability provider of an inference runtime
pub trait ComputeRuntime {
    /// Backends compiled into the runtime
    fn support(&self) -> GpuSupport;

    /// Properties of `device`, `None` if it does not exist
    fn device_props(&self, device: Device) -> Option<BackendProps>;

    /// Throughput of `format x f32` on `backend`, in GFLOPS
    fn flops(
        &self,
        backend: Backend,
        format: NumericFormat,
        n_threads: usize,
    ) -> Result<f32, BenchError>;

    /// Device memory read bandwidth of `backend`, in GB/s
    fn read_vram_bw(&self, backend: Backend) -> Result<f32, BenchError>;

    /// Time to look up the input embeddings of the configured model, in ms
    fn embedding_delay_ms(&self, n_threads: usize) -> Result<f32, BenchError>;

    /// FLOP and parameter counts of the configured model
    fn model_cost(&self) -> Option<(ModelFlops, ModelParams)>;
}

/// Dimensions of a decoder-only transformer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ModelShape {
    pub n_layer: u32,
    pub n_embd: u32,
    /// Width of the K and V projections; equals `n_embd` without grouped-query attention
    #[serde(default)]
    pub n_embd_kv: Option<u32>,
    pub n_ff: u32,
    pub n_vocab: u32,
    /// Storage format of the matrix weights
    #[serde(default = "default_weight_format")]
    pub weight_format: NumericFormat,
}

fn default_weight_format() -> NumericFormat {
    NumericFormat::Q4K
}

impl ModelShape {
    /// Per-token FLOPs and parameter counts, split by the format each tensor is stored in.
    ///
    /// Matrix weights use `weight_format`; norms and element-wise work are F32.
    pub fn cost(&self) -> (ModelFlops, ModelParams) {
        let embd = self.n_embd as i64;
        let embd_kv = self.n_embd_kv.unwrap_or(self.n_embd) as i64;
        let ff = self.n_ff as i64;
        let vocab = self.n_vocab as i64;
        let wf = self.weight_format;

        // q, k, v, o projections and the gated feed-forward
        let layer_matrix = 2 * embd * embd + 2 * embd * embd_kv + 3 * embd * ff;
        let layer_norms = 2 * embd;
        // two rms norms, swiglu, two residual adds
        let layer_elementwise = 2 * 4 * embd + 3 * ff + 2 * embd;
        let output_matrix = embd * vocab;

        let mut params = ModelParams::default();
        params.input.set(wf, vocab * embd);
        params.layer.set(wf, layer_matrix);
        params.layer.set(NumericFormat::F32, params.layer.get(NumericFormat::F32) + layer_norms);
        params.output.set(wf, output_matrix);
        params.output.set(NumericFormat::F32, params.output.get(NumericFormat::F32) + embd);

        let mut flops = ModelFlops::default();
        flops.layer.set(wf, 2 * layer_matrix);
        flops.layer.set(
            NumericFormat::F32,
            flops.layer.get(NumericFormat::F32) + layer_elementwise,
        );
        flops.output.set(wf, 2 * output_matrix);
        flops.output.set(NumericFormat::F32, flops.output.get(NumericFormat::F32) + 4 * embd);

        (flops, params)
    }

    /// Parameters of the whole model: embeddings, `n_layer` layers and the output head
    pub fn total_params(&self) -> i64 {
        let (_, params) = self.cost();
        total(&params.input) + self.n_layer as i64 * total(&params.layer) + total(&params.output)
    }
}

/// The runtime backed by this process's own kernels
#[derive(Debug, Clone)]
pub struct HostRuntime {
    shape: FlopsShape,
    measure: MeasureConfig,
    model: Option<ModelShape>,
    cpu: BackendProps,
    gpus: Vec<GpuDevice>,
    cuda_version: Option<String>,
}

impl HostRuntime {
    /// Probe the host for CPU and GPU devices
    pub fn detect(config: &Config) -> Self {
        let gpus = gpu::detect_gpus();
        let cuda_version = if gpus.is_empty() {
            None
        } else {
            gpu::cuda_version()
        };
        Self::new(config, detect_cpu(), gpus, cuda_version)
    }

    pub fn new(
        config: &Config,
        cpu: BackendProps,
        gpus: Vec<GpuDevice>,
        cuda_version: Option<String>,
    ) -> Self {
        Self {
            shape: config.flops,
            measure: config.measure_config(),
            model: config.model,
            cpu,
            gpus,
            cuda_version,
        }
    }
}

fn detect_cpu() -> BackendProps {
    let mut system = sysinfo::System::new();
    system.refresh_cpu_all();
    system.refresh_memory();
    let (name, vendor) = system
        .cpus()
        .first()
        .map(|cpu| (cpu.brand().trim().to_string(), cpu.vendor_id().to_string()))
        .unwrap_or_default();
    let description = if vendor.is_empty() {
        std::env::consts::ARCH.to_string()
    } else {
        format!("{vendor} {}", std::env::consts::ARCH)
    };
    BackendProps {
        name,
        description,
        memory_free: bytes_to_gib(system.available_memory()),
        memory_total: bytes_to_gib(system.total_memory()),
    }
}

fn bytes_to_gib(bytes: u64) -> f32 {
    (bytes as f64 / (1u64 << 30) as f64) as f32
}

impl ComputeRuntime for HostRuntime {
    /// Only CPU kernels run in this process, so no GPU backend flag is set.
    /// Detected NVIDIA devices still show up through [`Self::device_props`].
    fn support(&self) -> GpuSupport {
        GpuSupport {
            blas: cfg!(feature = "blas"),
            ..GpuSupport::default()
        }
    }

    fn device_props(&self, device: Device) -> Option<BackendProps> {
        match device {
            Device::Cpu => Some(self.cpu.clone()),
            Device::Gpu(index) => {
                let gpu = self.gpus.get(index)?;
                let description = match &self.cuda_version {
                    Some(cuda) => format!("driver {}, CUDA {cuda}", gpu.driver_version),
                    None => format!("driver {}", gpu.driver_version),
                };
                Some(BackendProps {
                    name: gpu.name.clone(),
                    description,
                    memory_free: gpu.memory_free_mib / 1024.0,
                    memory_total: gpu.memory_total_mib / 1024.0,
                })
            }
        }
    }

    fn flops(
        &self,
        backend: Backend,
        format: NumericFormat,
        n_threads: usize,
    ) -> Result<f32, BenchError> {
        match backend {
            Backend::Cpu => try_cpu_flops(format, n_threads, &self.shape, &self.measure),
            _ => Err(BenchError::Unsupported(format!("{backend} kernels"))),
        }
    }

    fn read_vram_bw(&self, backend: Backend) -> Result<f32, BenchError> {
        Err(BenchError::Unsupported(format!("{backend} VRAM bandwidth")))
    }

    fn embedding_delay_ms(&self, n_threads: usize) -> Result<f32, BenchError> {
        let model = self
            .model
            .ok_or_else(|| BenchError::Unsupported("embedding delay without a model".into()))?;
        let shape = EmbeddingShape {
            format: model.weight_format,
            vocab: model.n_vocab as usize,
            n_embd: model.n_embd as usize,
        };
        let ms = try_embedding_delay(&shape, EMBEDDING_TOKENS, n_threads, &self.measure)?;
        debug!(ms, "input embedding delay");
        Ok(ms)
    }

    fn model_cost(&self) -> Option<(ModelFlops, ModelParams)> {
        let model = self.model?;
        debug!(
            n_layer = model.n_layer,
            total_params = model.total_params(),
            "model cost"
        );
        Some(model.cost())
    }
}

/// Sum of the per-format values
pub fn total<T: Copy + std::iter::Sum<T>>(values: &PerFormat<T>) -> T {
    values.iter().map(|(_, v)| v).sum()
}
