use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint};
use dipoa_core::ProblemFamily;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "dipoa",
    author,
    version,
    about = "Distributed primal outer approximation for sparse mixed-integer programs",
    long_about = None
)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    /// TOML file with [dipoa], [rhadmm] and [master] settings
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Distributed sparse logistic regression
    Dslr {
        /// SAMPLES VARS NONZEROS (default scenario: 1000 10 2)
        #[arg(value_name = "DATA")]
        data: Vec<usize>,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Distributed sparse QCQP with one global quadratic constraint
    Dsqcqp {
        /// VARS NONZEROS (default scenario: 10 2)
        #[arg(value_name = "DATA")]
        data: Vec<usize>,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Write a benchmark scenario's synthetic data as CSV
    Generate(GenerateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Problem family: dslr or dsqcqp
    #[arg(value_name = "FAMILY")]
    pub family: ProblemFamily,

    /// Scenario name (sc-1, sc-2, ...); lists the scenarios when omitted
    #[arg(long)]
    pub scenario: Option<String>,

    /// Root directory; files land in <DIR>/<FAMILY>/<SCENARIO>/
    #[arg(long, default_value = "data", value_hint = ValueHint::DirPath)]
    pub out_dir: PathBuf,

    /// Number of workers the data is split over
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: u64,

    /// Seed of the synthetic data
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Start from the warm-start support instead of all zeros
    #[arg(long)]
    pub sfp: bool,

    /// Add curvature (second-order cone) terms to the cuts
    #[arg(long)]
    pub soc: bool,

    /// Number of in-process workers
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: u64,

    /// Seed of the synthetic instance
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Box bound M on every coordinate
    #[arg(long, default_value_t = 0.16)]
    pub bound: f64,

    /// Outer iteration cap (at most 200)
    #[arg(long)]
    pub max_iter: Option<usize>,

    /// Where the root writes the run record
    #[arg(long, default_value = "solution.json", value_hint = ValueHint::FilePath)]
    pub out: PathBuf,

    /// Also print the run record to stdout as JSON
    #[arg(long)]
    pub json: bool,

    /// Use the MPI world communicator (one worker per process)
    #[cfg(feature = "mpi")]
    #[arg(long)]
    pub mpi: bool,
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
