use devprof_common::config::{default_log_level, deserialize_duration};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bench::{DISK_TEST_RND_BLOCK, FlopsShape, MeasureConfig};
use crate::runtime::ModelShape;

/// Agent configuration loaded from an optional TOML file and `DEVPROF_*` environment variables
///
/// Nested keys use a double underscore in the environment, e.g. `DEVPROF_FLOPS__ROWS`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Rank of this participant
    /// Default: 0
    #[serde(default)]
    pub rank: u32,

    /// Device name override (hostname if not provided)
    #[serde(default)]
    pub device_name: Option<String>,

    /// Threads for the compute benchmarks (logical core count if not provided)
    #[serde(default)]
    pub n_threads: Option<usize>,

    /// Bytes moved by each disk test, in MiB
    /// Default: 500
    #[serde(default = "default_disk_total_mb")]
    pub disk_total_mb: usize,

    /// Block size of the sequential disk test, in MiB
    /// Default: 100
    #[serde(default = "default_disk_seq_block_mb")]
    pub disk_seq_block_mb: usize,

    /// Block size of the random disk test, in bytes
    /// Default: 4096
    #[serde(default = "default_disk_rnd_block")]
    pub disk_rnd_block: usize,

    /// Existing file read by the disk read tests (reads are skipped if not provided)
    ///
    /// Use a file that was not written recently, so its pages are not cached.
    #[serde(default)]
    pub disk_test_file: Option<PathBuf>,

    /// Buffer filled by the sequential disk read, in MiB
    /// Default: 100
    #[serde(default = "default_disk_buffer_mb")]
    pub disk_buffer_mb: usize,

    /// Directory for the disk write scratch files (system temp dir if not provided)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Buffer for the memory bandwidth test, in MiB
    /// Default: 512
    #[serde(default = "default_memory_buffer_mb")]
    pub memory_buffer_mb: usize,

    /// Matrix shape of the compute throughput kernel
    #[serde(default)]
    pub flops: FlopsShape,

    /// Untimed kernel runs before measuring
    /// Default: 2
    #[serde(default = "default_warmup_iters")]
    pub warmup_iters: usize,

    /// Default: 5
    #[serde(default = "default_min_iters")]
    pub min_iters: usize,

    /// Default: 100
    #[serde(default = "default_max_iters")]
    pub max_iters: usize,

    /// Minimum measurement time per kernel
    /// Default: 50ms
    #[serde(
        default = "default_min_window",
        deserialize_with = "deserialize_duration"
    )]
    pub min_window: Duration,

    /// Maximum measurement time per kernel
    /// Default: 2s
    #[serde(
        default = "default_max_window",
        deserialize_with = "deserialize_duration"
    )]
    pub max_window: Duration,

    /// Model to compute layer costs for
    #[serde(default)]
    pub model: Option<ModelShape>,

    #[serde(default)]
    pub skip_disk: bool,

    #[serde(default)]
    pub skip_memory: bool,

    #[serde(default)]
    pub skip_flops: bool,

    /// Log level
    /// Default: info
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_disk_total_mb() -> usize {
    500
}

fn default_disk_seq_block_mb() -> usize {
    100
}

fn default_disk_buffer_mb() -> usize {
    100
}

fn default_disk_rnd_block() -> usize {
    DISK_TEST_RND_BLOCK
}

fn default_memory_buffer_mb() -> usize {
    512
}

fn default_warmup_iters() -> usize {
    2
}

fn default_min_iters() -> usize {
    5
}

fn default_max_iters() -> usize {
    100
}

fn default_min_window() -> Duration {
    Duration::from_millis(50)
}

fn default_max_window() -> Duration {
    Duration::from_secs(2)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rank: 0,
            device_name: None,
            n_threads: None,
            disk_total_mb: default_disk_total_mb(),
            disk_seq_block_mb: default_disk_seq_block_mb(),
            disk_rnd_block: default_disk_rnd_block(),
            disk_test_file: None,
            disk_buffer_mb: default_disk_buffer_mb(),
            scratch_dir: None,
            memory_buffer_mb: default_memory_buffer_mb(),
            flops: FlopsShape::default(),
            warmup_iters: default_warmup_iters(),
            min_iters: default_min_iters(),
            max_iters: default_max_iters(),
            min_window: default_min_window(),
            max_window: default_max_window(),
            model: None,
            skip_disk: false,
            skip_memory: false,
            skip_flops: false,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (if given), then environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            if !path.is_file() {
                return Err(format!("config file {} does not exist", path.display()).into());
            }
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("DEVPROF_").split("__"))
            .extract()
    }

    pub fn measure_config(&self) -> MeasureConfig {
        MeasureConfig {
            warmup_iters: self.warmup_iters,
            min_iters: self.min_iters,
            max_iters: self.max_iters,
            min_time: self.min_window,
            max_time: self.max_window,
        }
    }

    /// Compute threads, falling back to the detected core count
    pub fn threads(&self, cores: u32) -> usize {
        self.n_threads.unwrap_or(cores as usize)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
