use clap::Parser;
use mapping_tester::logging;
use mapping_tester_analysis::{
    plot::{render_all, PlotError},
    stats::Stats,
};
use std::{path::PathBuf, process::ExitCode};

#[derive(Parser, Debug)]
#[command(name = "plot-convergence")]
#[command(about = "Plots the gathered stats of a run")]
struct Args {
    /// The CSV file containing all stats.
    #[arg(short, long, default_value = "stats.csv")]
    file: PathBuf,

    /// Prefix of the written charts, <prefix>-<chart>.svg
    #[arg(short, long, default_value = "result")]
    prefix: String,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn run(args: &Args) -> Result<(), PlotError> {
    let stats = Stats::load(&args.file)?;
    render_all(&stats, &args.prefix)?;

    Ok(())
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
