use anyhow::Context;
use clap::Parser;
use devprof_agent::cli::Args;
use devprof_agent::config::Config;
use devprof_agent::profiler::Profiler;
use devprof_agent::runtime::HostRuntime;
use devprof_agent::sys::HostSystem;
use devprof_common::{encode, logging, table};
use std::io::Write;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(rank) = args.rank {
        config.rank = rank;
    }
    config.skip_disk |= args.skip_disk;
    config.skip_flops |= args.skip_flops;

    logging::setup_logging(&config.log_level, args.tracing);

    match run(&args, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "profiling failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, config: Config) -> anyhow::Result<()> {
    let start = Instant::now();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        rank = config.rank,
        "starting devprof-agent"
    );

    let runtime = HostRuntime::detect(&config);
    let (record, report) = Profiler::new(config, HostSystem, runtime).run();
    for failed in report.failed() {
        warn!(
            measurement = %failed.name,
            outcome = %failed.outcome,
            "measurement recorded as zero"
        );
    }
    table::log_table(std::slice::from_ref(&record), false);

    let bytes = encode(&record);
    if args.to_stdout() {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&bytes).context("writing record to stdout")?;
        stdout.flush().context("flushing stdout")?;
    } else {
        std::fs::write(&args.output, &bytes)
            .with_context(|| format!("writing record to {}", args.output.display()))?;
    }

    info!(
        bytes = bytes.len(),
        output = %args.output.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "record written"
    );
    Ok(())
}
