use anyhow::Context;
use clap::Parser;
use devprof_collector::cli::Args;
use devprof_collector::collect::load_records;
use devprof_common::{logging, table};
use std::io::{IsTerminal, Write};
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    let args = Args::parse();
    logging::setup_logging(&args.log_level, args.tracing);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "collection failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let records = load_records(&args.files)?;
    info!(records = records.len(), "records loaded");

    if args.json {
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &records).context("serializing records")?;
        writeln!(stdout).context("writing to stdout")?;
    } else {
        let color = args.color.enabled(args.tracing, std::io::stderr().is_terminal());
        table::log_table(&records, color);
    }
    Ok(())
}
