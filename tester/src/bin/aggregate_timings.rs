use clap::Parser;
use mapping_tester::{
    aggregate::{aggregate_times, Method},
    logging,
};
use std::{path::PathBuf, process::ExitCode};

#[derive(Parser, Debug)]
#[command(name = "aggregate-timings")]
#[command(about = "Aggregate time measurements from CSV files and compute an aggregated result file")]
struct Args {
    /// Directory containing the CSV files.
    data_folder: PathBuf,

    /// Base name of the CSV files to aggregate (<base>-<N>-statistics.csv).
    csv_file_base_name: String,

    /// Name of the generated CSV file.
    output_file: PathBuf,

    /// How the timings of the runs are combined.
    #[arg(long, value_enum, default_value_t = Method::Min)]
    method: Method,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    match aggregate_times(
        &args.data_folder,
        &args.csv_file_base_name,
        &args.output_file,
        args.method,
    ) {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            logging::report(&error);
            ExitCode::FAILURE
        }
    }
}
