// src/main.rs

#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::Parser;
use riskfold::config::AnalysisConfig;
use riskfold::data::load_survey;
use riskfold::pipeline;
use riskfold::report;
use std::error::Error;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(
    name = "riskfold",
    version,
    about = "Survey risk analytics: supervised model comparison and respondent segmentation."
)]
struct Args {
    /// Survey table with one row per respondent (CSV, or TSV by extension).
    table: PathBuf,

    /// TOML configuration file overriding the built-in study defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory receiving the report tables.
    #[arg(long, default_value = "results")]
    out_dir: PathBuf,

    /// Override the split and model seed from the configuration.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the final cluster count from the configuration.
    #[arg(long)]
    clusters: Option<usize>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    // --- Phase 1: Configuration ---
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(&path.to_string_lossy())?,
        None => AnalysisConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.split_seed = seed;
        config.cluster_seed = seed;
    }
    if let Some(clusters) = args.clusters {
        config.chosen_clusters = clusters;
    }
    config.validate()?;

    // --- Phase 2: Ingestion ---
    let frame = load_survey(
        &args.table.to_string_lossy(),
        &config.outcome_column,
        config.id_column.as_deref(),
    )?;
    println!(
        "> Loaded {} respondents across {} columns.",
        frame.n_rows(),
        frame.column_names().len()
    );

    // --- Phase 3: Analysis ---
    let analysis = pipeline::run(&frame, &config)?;
    println!(
        "> Outcome thresholds: high risk >= {:.2}, low risk <= {:.2}.",
        analysis.labels.high_threshold, analysis.labels.low_threshold
    );
    let noted: Vec<_> = analysis.diagnostics().collect();
    if !noted.is_empty() {
        println!("> {} condition(s) noted during the run:", noted.len());
        for diagnostic in &noted {
            println!("    [{}] {diagnostic}", diagnostic.kind());
        }
    }

    // --- Phase 4: Reporting ---
    let tables = report::tables(&analysis)?;
    println!("\nClassification comparison:\n{}", tables.classification);
    println!("Regression comparison:\n{}", tables.regression);
    if let Some(best) = analysis.clusters.selection.best_k {
        println!(
            "> Silhouette favors k = {best}; reporting the configured k = {}.",
            analysis.clusters.selection.chosen_k
        );
    }
    let written = report::write_tables(tables, &args.out_dir)?;
    println!(
        "> Wrote {} table(s) under '{}'.",
        written.len(),
        args.out_dir.display()
    );
    Ok(())
}
