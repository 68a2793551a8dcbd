use clap::Parser;
use devprof_common::logging::{TracingFormat, default_tracing_format};
use std::path::PathBuf;

/// Measure this host and emit its encoded device record
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Rank of this participant, overriding the configuration
    #[arg(long)]
    pub rank: Option<u32>,

    /// Where to write the encoded record, `-` for stdout
    #[arg(long, short, default_value = "-")]
    pub output: PathBuf,

    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    /// Skip the disk bandwidth tests
    #[arg(long)]
    pub skip_disk: bool,

    /// Skip the compute throughput tests
    #[arg(long)]
    pub skip_flops: bool,
}

impl Args {
    /// Whether the record goes to stdout
    pub fn to_stdout(&self) -> bool {
        self.output.as_os_str() == "-"
    }
}
