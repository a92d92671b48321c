use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use dqmwatch::{run_campaign, summary, write_reports, Campaign, ExitPolicy};
use dqmwatch_core::Verdict;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dqm-qtests")]
#[command(about = "Run data quality tests on monitor elements and summarize the reports")]
struct Args {
    /// Campaign file (TOML, JSON or YAML)
    #[arg(short, long)]
    input: PathBuf,

    /// Write the quality reports to this JSON file
    #[arg(short, long)]
    qreport: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(short, long, default_value = "warn")]
    verbosity: String,

    /// Which reports make the run fail
    #[arg(long, value_enum, default_value_t = ExitPolicy::Failure)]
    exit_on: ExitPolicy,

    /// Only print reports with this verdict (success, error, invalid)
    #[arg(long)]
    print_only: Option<Verdict>,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.verbosity));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let campaign = Campaign::load(&args.input)?;
    let reports = run_campaign(&campaign)?;

    print!("{}", summary::render(&reports, args.print_only));

    if let Some(path) = &args.qreport {
        write_reports(path, &reports)?;
        tracing::info!("Wrote {} report(s) to {}", reports.len(), path.display());
    }

    if args.exit_on.fails(&reports) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
