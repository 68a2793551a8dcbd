//! Device record assembly.
//!
//! Every step is independent: a failed or skipped measurement leaves its
//! field at zero and is listed in the [`ProfileReport`], so a zero on the
//! wire can be told apart from a measured zero on the producing host.

use devprof_common::types::{BackendPerf, DeviceRecord, GpuSupport, NumericFormat};
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::bench::disk::{
    try_disk_read_bandwidth, try_disk_rnd_read, try_disk_rnd_write, try_disk_seq_write,
};
use crate::bench::memory::try_memory_bandwidth;
use crate::bench::{BenchError, mb_to_bytes};
use crate::config::Config;
use crate::runtime::{Backend, ComputeRuntime, Device};
use crate::sys::{SystemProbe, to_gib};

const DISK_MEASUREMENTS: [&str; 4] = [
    "disk_read_seq",
    "disk_write_seq",
    "disk_read_rnd",
    "disk_write_rnd",
];

/// What happened to one measurement
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Measured(f32),
    Failed(String),
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Measured(value) => write!(f, "{value:.3}"),
            Outcome::Failed(reason) => write!(f, "failed: {reason}"),
            Outcome::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub name: String,
    pub outcome: Outcome,
}

/// Outcome of every measurement in the order they ran
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileReport {
    pub measurements: Vec<Measurement>,
}

impl ProfileReport {
    pub fn get(&self, name: &str) -> Option<&Outcome> {
        self.measurements
            .iter()
            .find(|m| m.name == name)
            .map(|m| &m.outcome)
    }

    pub fn failed(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements
            .iter()
            .filter(|m| matches!(m.outcome, Outcome::Failed(_)))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements
            .iter()
            .filter(|m| m.outcome == Outcome::Skipped)
    }

    /// Record `result` under `name`, returning the value to store (0 on failure)
    fn take(&mut self, name: impl Into<String>, result: Result<f32, BenchError>) -> f32 {
        let name = name.into();
        let (value, outcome) = match result {
            Ok(value) => {
                debug!(measurement = %name, value, "measured");
                (value, Outcome::Measured(value))
            }
            Err(e) => {
                error!(measurement = %name, error = %e, "measurement failed");
                (0.0, Outcome::Failed(e.to_string()))
            }
        };
        self.measurements.push(Measurement { name, outcome });
        value
    }

    fn fail(&mut self, name: impl Into<String>, reason: String) {
        self.measurements.push(Measurement {
            name: name.into(),
            outcome: Outcome::Failed(reason),
        });
    }

    fn skip(&mut self, name: impl Into<String>) -> f32 {
        self.measurements.push(Measurement {
            name: name.into(),
            outcome: Outcome::Skipped,
        });
        0.0
    }
}

/// Builds one [`DeviceRecord`] from OS queries, benchmarks and the compute runtime
pub struct Profiler<S, R> {
    config: Config,
    system: S,
    runtime: R,
}

impl<S: SystemProbe, R: ComputeRuntime> Profiler<S, R> {
    pub fn new(config: Config, system: S, runtime: R) -> Self {
        Self {
            config,
            system,
            runtime,
        }
    }

    pub fn run(&self) -> (DeviceRecord, ProfileReport) {
        let mut record = DeviceRecord::new(self.config.rank);
        let mut report = ProfileReport::default();

        self.host(&mut record);
        self.memory(&mut record, &mut report);
        self.disk(&mut record, &mut report);
        self.cpu_flops(&mut record, &mut report);
        self.gpu(&mut record, &mut report);
        self.model(&mut record, &mut report);

        info!(
            rank = record.rank,
            device = %record.device_name,
            measurements = report.measurements.len(),
            failed = report.failed().count(),
            skipped = report.skipped().count(),
            "profile complete"
        );
        (record, report)
    }

    fn host(&self, record: &mut DeviceRecord) {
        record.device_name = self
            .config
            .device_name
            .clone()
            .unwrap_or_else(|| self.system.device_name());
        record.cpu_props.cores = self.system.cpu_cores();
        if let Some(cpu) = self.runtime.device_props(Device::Cpu) {
            record.cpu_props.name = cpu.name;
            record.cpu_props.description = cpu.description;
        }
        info!(
            device = %record.device_name,
            cpu = %record.cpu_props.name,
            cores = record.cpu_props.cores,
            "host detected"
        );
    }

    fn memory(&self, record: &mut DeviceRecord, report: &mut ProfileReport) {
        let memory = &mut record.memory;
        memory.total_physical = to_gib(self.system.physical_memory(false));
        memory.available_physical = to_gib(self.system.physical_memory(true));
        memory.total_swap = to_gib(self.system.swap_memory(false));
        memory.available_swap = to_gib(self.system.swap_memory(true));

        memory.cpu_read_ram_bw = if self.config.skip_memory {
            report.skip("memory_read_bw")
        } else {
            let result =
                mb_to_bytes(self.config.memory_buffer_mb).and_then(try_memory_bandwidth);
            report.take("memory_read_bw", result)
        };
        info!(
            total_gib = memory.total_physical,
            available_gib = memory.available_physical,
            bandwidth = memory.cpu_read_ram_bw,
            "memory profiled"
        );
    }

    fn disk(&self, record: &mut DeviceRecord, report: &mut ProfileReport) {
        if self.config.skip_disk {
            for name in DISK_MEASUREMENTS {
                report.skip(name);
            }
            return;
        }

        let config = &self.config;
        let sizes = mb_to_bytes(config.disk_total_mb).and_then(|total| {
            mb_to_bytes(config.disk_seq_block_mb).map(|block| (total, block))
        });
        let (total, seq_block) = match sizes {
            Ok(sizes) => sizes,
            Err(e) => {
                let reason = e.to_string();
                error!(error = %reason, "invalid disk test sizes");
                for name in DISK_MEASUREMENTS {
                    report.fail(name, reason.clone());
                }
                return;
            }
        };

        let scratch = config.scratch_dir();
        let rnd_block = config.disk_rnd_block;
        let disk = &mut record.disk;
        match config.disk_test_file.as_deref() {
            Some(path) => {
                let seq = try_disk_read_bandwidth(path, config.disk_buffer_mb);
                disk.read_seq_bw = report.take("disk_read_seq", seq);
                let rnd = try_disk_rnd_read(path, total, rnd_block);
                disk.read_rnd_bw = report.take("disk_read_rnd", rnd);
            }
            None => {
                warn!("no disk_test_file configured, skipping disk read tests");
                disk.read_seq_bw = report.skip("disk_read_seq");
                disk.read_rnd_bw = report.skip("disk_read_rnd");
            }
        }
        let seq = try_disk_seq_write(&scratch, total, seq_block);
        disk.write_seq_bw = report.take("disk_write_seq", seq);
        let rnd = try_disk_rnd_write(&scratch, total, rnd_block);
        disk.write_rnd_bw = report.take("disk_write_rnd", rnd);
        info!(
            read_seq = disk.read_seq_bw,
            write_seq = disk.write_seq_bw,
            read_rnd = disk.read_rnd_bw,
            write_rnd = disk.write_rnd_bw,
            "disk profiled"
        );
    }

    fn n_threads(&self, record: &DeviceRecord) -> usize {
        self.config.threads(record.cpu_props.cores)
    }

    fn cpu_flops(&self, record: &mut DeviceRecord, report: &mut ProfileReport) {
        let n_threads = self.n_threads(record);
        for format in NumericFormat::ALL {
            let name = format!("cpu_flops_{format}");
            let value = if self.config.skip_flops {
                report.skip(name)
            } else {
                report.take(name, self.runtime.flops(Backend::Cpu, format, n_threads))
            };
            record.cpu_props.flops.set(format, value);
        }
        info!(
            n_threads,
            gflops_f32 = record.cpu_props.flops.f32,
            gflops_q4k = record.cpu_props.flops.q4k,
            "cpu profiled"
        );
    }

    fn gpu(&self, record: &mut DeviceRecord, report: &mut ProfileReport) {
        let support = self.runtime.support();
        record.gpu_support = support;
        log_support(support);

        if let Some(gpu) = self.runtime.device_props(Device::Gpu(0)) {
            let props = &mut record.gpu_props;
            props.name = gpu.name;
            props.description = gpu.description;
            props.memory_free = gpu.memory_free;
            props.memory_total = gpu.memory_total;
            info!(
                gpu = %props.name,
                memory_total_gib = props.memory_total,
                "gpu detected"
            );
        }

        let n_threads = self.n_threads(record);
        record.gpu_props.metal =
            self.backend_perf(Backend::Metal, support.metal, n_threads, report);
        record.gpu_props.cuda = self.backend_perf(Backend::Cuda, support.cuda, n_threads, report);
    }

    fn backend_perf(
        &self,
        backend: Backend,
        supported: bool,
        n_threads: usize,
        report: &mut ProfileReport,
    ) -> BackendPerf {
        let mut perf = BackendPerf::default();
        let run = supported && !self.config.skip_flops;

        let name = format!("{backend}_vram_bw");
        perf.read_vram_bw = if run {
            report.take(name, self.runtime.read_vram_bw(backend))
        } else {
            report.skip(name)
        };
        for format in NumericFormat::ALL {
            let name = format!("{backend}_flops_{format}");
            let value = if run {
                report.take(name, self.runtime.flops(backend, format, n_threads))
            } else {
                report.skip(name)
            };
            perf.flops.set(format, value);
        }
        perf
    }

    fn model(&self, record: &mut DeviceRecord, report: &mut ProfileReport) {
        let Some((flops, params)) = self.runtime.model_cost() else {
            report.skip("inp_embd_ms");
            return;
        };
        record.model_flops = flops;
        record.model_params = params;

        record.model_flops.inp_embd_ms = if self.config.skip_flops {
            report.skip("inp_embd_ms")
        } else {
            let n_threads = self.n_threads(record);
            report.take("inp_embd_ms", self.runtime.embedding_delay_ms(n_threads))
        };
        info!(inp_embd_ms = record.model_flops.inp_embd_ms, "model cost computed");
    }
}

fn log_support(support: GpuSupport) {
    let enabled: Vec<&str> = GpuSupport::NAMES
        .into_iter()
        .zip(support.to_array())
        .filter_map(|(name, on)| on.then_some(name))
        .collect();
    info!(backends = ?enabled, "backend support");
}
