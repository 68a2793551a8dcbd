use clap::{Parser, ValueEnum};
use devprof_common::logging::{TracingFormat, default_tracing_format};
use std::path::PathBuf;

/// Decode device records from many hosts and show them side by side
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Encoded record files, one per host
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Print the records as JSON on stdout instead of logging the table
    #[arg(long)]
    pub json: bool,

    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Bold the table labels
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorChoice {
    /// Only when logging pretty output to a terminal
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    pub fn enabled(self, format: TracingFormat, terminal: bool) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => terminal && format == TracingFormat::Pretty,
        }
    }
}
