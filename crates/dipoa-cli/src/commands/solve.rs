use std::path::Path;

use anyhow::{bail, Context, Result};
use dipoa_algo::{DipoaSolution, DipoaSolver, SolverSettings};
use dipoa_cli::{Commands, RunArgs};
use dipoa_core::{ProblemFamily, ProblemOptions, SyntheticSpec};
use tracing::{info, warn};

/// Build the synthetic instance, run DiPOA and write the run record.
pub fn handle(command: &Commands, config: Option<&Path>) -> Result<()> {
    let (mut spec, run) = scenario(command)?;
    let settings = load_settings(config, &run)?;

    #[cfg(feature = "mpi")]
    if run.mpi {
        return run_mpi(spec, settings, &run);
    }

    spec.workers = usize::try_from(run.workers).context("worker count does not fit in usize")?;
    let instance = spec
        .build()
        .with_context(|| format!("building {} instance", spec.family))?;
    let solver = DipoaSolver::new(&instance, settings).context("configuring solver")?;
    let solution = solver.solve_in_process().context("running DiPOA")?;
    report(&solution, &run)
}

/// Map the positional DATA of a subcommand onto a [`SyntheticSpec`].
fn scenario(command: &Commands) -> Result<(SyntheticSpec, RunArgs)> {
    let (family, data, run) = match command {
        Commands::Dslr { data, run } => (ProblemFamily::SparseLogisticRegression, data, run),
        Commands::Dsqcqp { data, run } => (ProblemFamily::SparseQcqp, data, run),
        Commands::Generate(_) => bail!("generate does not run the solver"),
    };
    let mut spec = SyntheticSpec::for_family(family);

    match family {
        ProblemFamily::SparseLogisticRegression => {
            if let [samples, vars, nonzeros, ..] = data[..] {
                spec.samples = samples;
                spec.dimension = vars;
                spec.sparsity = nonzeros;
            } else {
                warn!(
                    "dslr expects SAMPLES VARS NONZEROS, got {} values; running the default scenario",
                    data.len()
                );
            }
        }
        ProblemFamily::SparseQcqp => {
            if let [vars, nonzeros, ..] = data[..] {
                spec.dimension = vars;
                spec.sparsity = nonzeros;
            } else {
                warn!(
                    "dsqcqp expects VARS NONZEROS, got {} values; running the default scenario",
                    data.len()
                );
            }
        }
    }

    if !(run.bound.is_finite() && run.bound > 0.0) {
        bail!("--bound must be positive, got {}", run.bound);
    }
    spec.bound = run.bound;
    spec.seed = run.seed;
    spec.options = ProblemOptions {
        warm_start: run.sfp,
        curvature_cuts: run.soc,
    };
    Ok((spec, run.clone()))
}

fn load_settings(config: Option<&Path>, run: &RunArgs) -> Result<SolverSettings> {
    let mut settings = match config {
        Some(path) => SolverSettings::from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => SolverSettings::default(),
    };
    if let Some(max_iter) = run.max_iter {
        settings.dipoa.max_iter = max_iter;
    }
    settings.validate().context("invalid solver settings")?;
    Ok(settings)
}

fn report(solution: &DipoaSolution, run: &RunArgs) -> Result<()> {
    solution
        .write_json(&run.out)
        .with_context(|| format!("writing {}", run.out.display()))?;
    info!(
        "objective {:.6}, gap {:.4e}, {} iterations, {:.2}s -> {}",
        solution.obj,
        solution.gap,
        solution.iterations,
        solution.elapsed_time,
        run.out.display()
    );
    if run.json {
        println!("{}", serde_json::to_string_pretty(solution)?);
    } else {
        println!(
            "{} after {} iterations: obj = {:.6}, gap = {:.4e}",
            if solution.converged { "converged" } else { "stopped" },
            solution.iterations,
            solution.obj,
            solution.gap
        );
    }
    Ok(())
}

#[cfg(feature = "mpi")]
fn run_mpi(mut spec: SyntheticSpec, settings: SolverSettings, run: &RunArgs) -> Result<()> {
    use dipoa_core::{Communicator, MpiCommunicator};

    let universe = mpi::initialize().context("MPI was already initialised")?;
    let comm = MpiCommunicator::new(universe.world());
    spec.workers = comm.size();

    let instance = spec
        .build()
        .with_context(|| format!("building {} instance", spec.family))?;
    let solver = DipoaSolver::new(&instance, settings).context("configuring solver")?;
    let worker = solver
        .run(&comm)
        .with_context(|| format!("running DiPOA on rank {}", comm.rank()))?;

    match worker.solution {
        Some(solution) => report(&solution, run),
        None => Ok(()),
    }
}
