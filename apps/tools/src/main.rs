use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use controller::{resolve_pair, AnalysisResults, PointStore};
use storage::Storage;

#[derive(Parser, Debug)]
#[command(name = "gcp-tools", about = "Offline helpers for annotation projects")]
struct Cli {
    #[arg(long, default_value = ".")]
    project_path: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists the reconstructions an analysis can be run against.
    Reconstructions,
    /// Prints per-point reprojection errors of a finished analysis.
    Summary {
        #[arg(long, default_value_t = 0)]
        rec_a: usize,
        #[arg(long)]
        rec_b: Option<usize>,
    },
    /// Validates a points file and optionally rewrites it with its mirror copy.
    CheckPoints {
        path: Option<PathBuf>,
        #[arg(long)]
        mirror: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.project_path);

    match cli.command {
        Command::Reconstructions => {
            for (index, option) in storage.load_reconstruction_options()?.iter().enumerate() {
                println!("{index}: {}", option.label());
            }
        }
        Command::Summary { rec_a, rec_b } => {
            let options = storage.load_reconstruction_options()?;
            let pair = resolve_pair(rec_a, rec_b, options.len());
            let results = AnalysisResults::from(storage.load_analysis_output(pair)?);
            if !results.has_reprojections() {
                println!("no reprojection data for {pair}");
                return Ok(());
            }

            let mut errors: Vec<_> = results.point_errors().into_iter().collect();
            errors.sort_by(|(_, a), (_, b)| b.total_cmp(a));
            for (point_id, error) in &errors {
                println!("{point_id}\t{error:.3}");
            }

            let mut store = PointStore::new();
            let points_path = storage.points_path();
            if points_path.exists() {
                store.replace_all(storage::load_points(&points_path)?);
                match results.worst_point(&store) {
                    Some(worst) => println!("worst annotated point: {worst}"),
                    None => println!("no annotated point has reprojection data"),
                }
            }
            println!("shots with std: {}", results.shot_std.len());
        }
        Command::CheckPoints { path, mirror } => {
            let path = path.unwrap_or_else(|| storage.points_path());
            let points = storage::load_points(&path)
                .with_context(|| format!("checking '{}'", path.display()))?;
            let loaded = points.len();

            let mut store = PointStore::new();
            store.replace_all(points);
            let observations: usize = store.to_vec().iter().map(|p| p.observations.len()).sum();
            println!(
                "{} points ({} in file), {observations} observations",
                store.len(),
                loaded
            );

            if mirror {
                for written in storage::save_points_with_mirror(&path, &store.to_vec())? {
                    println!("wrote {}", written.display());
                }
            }
        }
    }

    Ok(())
}
