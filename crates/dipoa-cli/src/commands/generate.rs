use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;
use dipoa_cli::GenerateArgs;
use dipoa_core::problem::{scenario, scenarios};
use dipoa_core::{DenseMatrix, LocalObjective, ProblemInstance};
use tracing::info;

/// Write every instance of a benchmark scenario as CSV, or list the
/// scenarios when none is named.
pub fn handle(args: &GenerateArgs) -> Result<()> {
    let workers = usize::try_from(args.workers).context("worker count does not fit in usize")?;

    let Some(name) = args.scenario.as_deref() else {
        for sc in scenarios(args.family, workers, args.seed) {
            let sizes: Vec<String> = sc
                .instances
                .iter()
                .map(|spec| format!("{}x{}", spec.samples * spec.workers, spec.dimension))
                .collect();
            println!("{} {}: {}", args.family, sc.name, sizes.join(", "));
        }
        return Ok(());
    };

    let sc = scenario(args.family, name, workers, args.seed)?;
    let dir = args.out_dir.join(args.family.to_string()).join(sc.name);
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    for spec in &sc.instances {
        info!(
            scenario = sc.name,
            n = spec.dimension,
            samples = spec.samples,
            workers = spec.workers,
            "generating"
        );
        let instance = spec
            .build()
            .with_context(|| format!("building {} {} instance", args.family, sc.name))?;
        write_instance(&instance, &dir)?;
    }
    println!("wrote {} instance(s) to {}", sc.instances.len(), dir.display());
    Ok(())
}

fn write_instance(instance: &ProblemInstance, dir: &Path) -> Result<()> {
    let n = instance.dimension();
    for worker in 0..instance.workers() {
        match instance.objective(worker) {
            Some(LocalObjective::Logistic(loss)) => {
                // one row per sample: features then label
                let total = loss.samples() * instance.workers();
                let path = dir.join(format!("data_{total}_{n}_w{worker}.csv"));
                let rows = (0..loss.samples()).map(|r| {
                    let mut row = loss.features().row(r).to_vec();
                    row.push(loss.labels()[r]);
                    row
                });
                write_rows(&path, rows)?;
            }
            Some(LocalObjective::Quadratic(obj)) => {
                write_matrix(&dir.join(format!("Q_w{worker}.csv")), obj.quadratic_term())?;
                write_column(&dir.join(format!("q_w{worker}.csv")), obj.linear_term())?;
            }
            None => {}
        }
    }
    if let Some(g) = instance.constraint() {
        write_matrix(&dir.join("Ph.csv"), g.quadratic_term())?;
        write_column(&dir.join("ch.csv"), g.linear_term())?;
    }
    Ok(())
}

fn write_matrix(path: &Path, matrix: &DenseMatrix) -> Result<()> {
    write_rows(path, (0..matrix.rows()).map(|r| matrix.row(r).to_vec()))
}

fn write_column(path: &Path, values: &[f64]) -> Result<()> {
    write_rows(path, values.iter().map(|v| vec![*v]))
}

fn write_rows(path: &Path, rows: impl Iterator<Item = Vec<f64>>) -> Result<()> {
    let mut writer =
        Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}
