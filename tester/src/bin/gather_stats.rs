use clap::Parser;
use mapping_tester::{
    config::GatherConfig,
    gather::{write_stats, GatherError, Gatherer},
    logging,
};
use std::{path::PathBuf, process::ExitCode};

#[derive(Parser, Debug)]
#[command(name = "gather-stats")]
#[command(about = "Gathers stats after a run")]
struct Args {
    /// Directory the test suite was generated and run in.
    #[arg(short, long, default_value = "cases")]
    outdir: PathBuf,

    /// The resulting CSV file containing all stats.
    #[arg(short, long, default_value = "stats.csv")]
    file: PathBuf,

    /// YAML file overriding the profiling tool, events and memory logs.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Do not invoke the profiling tool, only gather memory statistics.
    #[arg(long, default_value_t = false)]
    skip_timings: bool,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn run(args: &Args) -> Result<(), GatherError> {
    let config = GatherConfig::load(args.config.as_deref())?;
    let gatherer = Gatherer::load(&args.outdir, &config, !args.skip_timings)?;
    let records = gatherer.gather()?;

    write_stats(&records, &args.file)
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            logging::report(&error);
            ExitCode::FAILURE
        }
    }
}
