use clap::Parser;
use mapping_tester::{
    cases::{BasisFunction, CaseError, CaseMatrix, Polynomial},
    logging,
};
use std::{
    fs::File,
    io::{self, BufWriter},
    path::PathBuf,
    process::ExitCode,
};

#[derive(Parser, Debug)]
#[command(name = "generate-cases")]
#[command(about = "Generates the test matrix of RBF mappings as JSON")]
struct Args {
    /// Comma separated list of input mesh edge lengths.
    #[arg(short = 'A', long = "a-meshes", required = true, value_delimiter = ',')]
    a_meshes: Vec<f64>,

    /// Comma separated list of output mesh edge lengths.
    #[arg(short = 'B', long = "b-meshes", required = true, value_delimiter = ',')]
    b_meshes: Vec<f64>,

    /// Comma separated list of polynomial configurations (on/separate/off).
    #[arg(short, long, value_delimiter = ',', default_value = "on,separate")]
    polynomials: Vec<Polynomial>,

    /// Kind of the kernel method, e.g., rbf-global-iterative.
    #[arg(short, long, default_value = "rbf-global-iterative")]
    kind: String,

    /// Comma separated list of (local) basis functions.
    #[arg(short = 'f', long, value_delimiter = ',', default_value = "gaussian")]
    rbf: Vec<BasisFunction>,

    /// Comma separated list of number of vertices to cover in radial direction.
    #[arg(short = 'n', long, value_delimiter = ',', default_value = "3,5,10,15")]
    coverage: Vec<u32>,

    /// The resulting JSON configuration file, stdout if omitted.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// rtol of the iterative solver.
    #[arg(short = 'r', long, default_value_t = 1e-9)]
    solver_rtol: f64,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn run(args: Args) -> Result<(), CaseError> {
    let output = args.output.clone();
    let matrix = CaseMatrix {
        a_meshes: args.a_meshes,
        b_meshes: args.b_meshes,
        polynomials: args.polynomials,
        kind: args.kind,
        basis_functions: args.rbf,
        coverage: args.coverage,
        solver_rtol: args.solver_rtol,
    };

    match output {
        Some(path) => matrix.write_json(BufWriter::new(File::create(path)?)),
        None => matrix.write_json(io::stdout().lock()),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            logging::report(&error);
            ExitCode::FAILURE
        }
    }
}
