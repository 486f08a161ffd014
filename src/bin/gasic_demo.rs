use anyhow::{Context, Result};
use clap::Parser;
use gasic::correction::SimilarityCorrector;
use gasic::simulation::SyntheticCommunity;
use gasic::utils::configuration::ConfigurationManager;
use gasic::utils::format_writers::{
    render_statistics_table, write_report_json, write_statistics_tsv_file,
};
use std::io;
use std::path::PathBuf;
use tracing::info;

/// Simulate a metagenomic sample with cross-mapping genomes and correct it
#[derive(Parser, Debug)]
#[command(name = "gasic-demo", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker threads for the multi-start optimizer
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Bootstrap iterations
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Seed for simulation and resampling
    #[arg(short, long)]
    seed: Option<u64>,

    /// True abundances of the simulated genomes
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_values_t = vec![0.45, 0.3, 0.15, 0.0]
    )]
    abundances: Vec<f64>,

    /// Cross-mapping rate between neighbouring genomes
    #[arg(long, default_value_t = 0.2)]
    cross_rate: f64,

    /// Simulated sample reads (also used per genome for calibration)
    #[arg(short, long, default_value_t = 5_000)]
    reads: usize,

    /// Print the full report as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Also write per-genome statistics as TSV
    #[arg(long)]
    tsv: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut manager = match &cli.config {
        Some(path) => ConfigurationManager::from_file(path)?,
        None => ConfigurationManager::new()?,
    };

    // CLI overrides
    {
        let config = manager.config_mut();
        if let Some(threads) = cli.threads {
            config.execution.num_threads = threads;
        }
        if let Some(iterations) = cli.iterations {
            config.bootstrap.iterations = iterations;
        }
        if cli.seed.is_some() {
            config.bootstrap.seed = cli.seed;
        }
        if cli.verbose {
            config.logging.level = "debug".to_string();
        }
    }
    manager.validate_configuration()?;
    manager.setup_logging()?;

    let config = manager.config();
    let community = SyntheticCommunity::chain(cli.abundances.clone(), cli.cross_rate, cli.reads);
    let simulation_seed = config.bootstrap.seed.unwrap_or_else(rand::random);

    info!(
        "🧬 Simulating {} genomes with {} reads (seed {})",
        community.num_genomes(),
        cli.reads,
        simulation_seed
    );
    let observations = community
        .generate(simulation_seed)
        .context("Failed to simulate community")?;

    let corrector = SimilarityCorrector::from_config(config)?;
    let report = corrector.bootstrap(&observations)?;

    if cli.json {
        write_report_json(&report, io::stdout().lock())?;
    } else {
        println!("{}", render_statistics_table(&report.statistics));
        println!("📊 True abundances: {:?}", community.abundances);
        println!(
            "🎲 Seed {} | {} iterations | {} without convergence",
            report.seed,
            report.replicates.len(),
            report.non_converged_iterations
        );
    }

    if let Some(path) = &cli.tsv {
        write_statistics_tsv_file(&report.statistics, path)?;
    }

    Ok(())
}
