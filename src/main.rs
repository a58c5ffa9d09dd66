#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::uninlined_format_args)]

use clap::{Parser, Subcommand, ValueEnum};
use conscluster::ml::linkage::Linkage;
use conscluster::ml::runners::{AgglomerativeRunner, KMeansRunner, Standardized};
use conscluster::ml::{driver, output};
use conscluster::structs::{CsvData, FeatureMatrix};
use conscluster::{
    CancelFlag, ClusterRunner, ConsensusConfig, ConsensusError, ConsensusReport, Result,
};
use ndarray::ArrayView2;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

/// conscluster - consensus clustering and cluster-count selection
#[derive(Parser, Debug)]
#[command(name = "conscluster")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run consensus clustering on a CSV and score each candidate k
    Analyze {
        /// Input CSV/TSV file to analyze
        #[arg(short, long)]
        csv: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "./consensus_output")]
        output_dir: PathBuf,

        /// Treat input as TSV instead of CSV
        #[arg(long)]
        tsv: bool,

        /// Smallest candidate cluster count
        #[arg(long, default_value = "2")]
        k_min: usize,

        /// Largest candidate cluster count
        #[arg(long, default_value = "6")]
        k_max: usize,

        /// Resampling rounds per candidate
        #[arg(short = 'n', long, default_value = "100")]
        iterations: usize,

        /// Fraction of rows drawn per round
        #[arg(short, long, default_value = "0.8")]
        fraction: f64,

        /// Draw rows with replacement
        #[arg(long)]
        with_replacement: bool,

        /// Random seed for resampling
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Clustering algorithm run on every resample
        #[arg(short, long, value_enum, default_value = "kmeans")]
        algorithm: Algorithm,

        /// Skip per-resample z-score standardization
        #[arg(long)]
        no_normalize: bool,

        /// Allow k to reach the resample size
        #[arg(long)]
        relaxed: bool,

        /// Worker threads (0 = one per core)
        #[arg(long, default_value = "0")]
        threads: usize,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Algorithm {
    Kmeans,
    Single,
    Complete,
    Average,
    Ward,
}

fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Commands::Analyze {
            csv,
            output_dir,
            tsv,
            k_min,
            k_max,
            iterations,
            fraction,
            with_replacement,
            seed,
            algorithm,
            no_normalize,
            relaxed,
            threads,
        }) => {
            if threads > 0 {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build_global()
                    .map_err(|e| ConsensusError::Config(format!("Failed to size thread pool: {e}")))?;
            }

            let config = ConsensusConfig {
                k_min,
                k_max,
                iterations,
                fraction,
                with_replacement,
                seed,
                relaxed_validation: relaxed,
            };
            run_analyze(&csv, &output_dir, tsv, &config, algorithm, !no_normalize)
        }

        None => {
            eprintln!("No subcommand provided. Use 'conscluster analyze'.");
            eprintln!("Run 'conscluster --help' for usage information.");
            std::process::exit(1);
        }
    }
}

/// Run the consensus analysis and write all output files
fn run_analyze(
    csv_path: &Path,
    output_dir: &Path,
    tsv: bool,
    config: &ConsensusConfig,
    algorithm: Algorithm,
    normalize: bool,
) -> Result<()> {
    if !csv_path.exists() {
        return Err(ConsensusError::Config(format!(
            "CSV file not found: {}",
            csv_path.display()
        )));
    }
    config.validate()?;

    std::fs::create_dir_all(output_dir)?;

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived Ctrl+C, cancelling...");
        handler_flag.cancel();
    })
    .map_err(|e| ConsensusError::Config(format!("Failed to set Ctrl+C handler: {e}")))?;

    eprintln!("Analyzing: {}", csv_path.display());

    let csv_data = CsvData::from_file(csv_path, tsv)?;
    eprintln!(
        "Loaded {} rows x {} columns",
        csv_data.row_count(),
        csv_data.col_count()
    );

    let features = FeatureMatrix::from_csv(&csv_data)?;
    let array = features.to_array()?;
    eprintln!(
        "Clustering {} rows on features: {}",
        features.n_samples(),
        features.names.join(", ")
    );

    let report = match algorithm {
        Algorithm::Kmeans => {
            let runner = KMeansRunner {
                seed: config.seed,
                ..KMeansRunner::default()
            };
            analyze_with(array.view(), runner, normalize, config, &cancel)?
        }
        Algorithm::Single => analyze_with(
            array.view(),
            AgglomerativeRunner::new(Linkage::Single),
            normalize,
            config,
            &cancel,
        )?,
        Algorithm::Complete => analyze_with(
            array.view(),
            AgglomerativeRunner::new(Linkage::Complete),
            normalize,
            config,
            &cancel,
        )?,
        Algorithm::Average => analyze_with(
            array.view(),
            AgglomerativeRunner::new(Linkage::Average),
            normalize,
            config,
            &cancel,
        )?,
        Algorithm::Ward => analyze_with(
            array.view(),
            AgglomerativeRunner::new(Linkage::Ward),
            normalize,
            config,
            &cancel,
        )?,
    };

    eprintln!("Writing output files...");

    let summary = output::build_summary(
        csv_path,
        features.n_samples(),
        features.n_features(),
        config,
        &report,
    );
    output::write_summary(output_dir, &summary)?;
    output::write_stability_json(output_dir, config, &report)?;
    output::write_cdf_csv(output_dir, &report.curves)?;
    output::write_density_csv(output_dir, &report)?;
    let matrices = output::write_consensus_matrices(output_dir, &report, &features.row_indices)?;

    eprint!("{summary}");
    eprintln!("Output written to {}", output_dir.display());
    eprintln!("  - summary.txt");
    eprintln!("  - stability.json");
    eprintln!("  - cdf.csv");
    eprintln!("  - density.csv");
    for path in matrices {
        if let Some(name) = path.file_name() {
            eprintln!("  - {}", name.to_string_lossy());
        }
    }

    Ok(())
}

fn analyze_with<R: ClusterRunner>(
    data: ArrayView2<'_, f64>,
    runner: R,
    normalize: bool,
    config: &ConsensusConfig,
    cancel: &CancelFlag,
) -> Result<ConsensusReport> {
    if normalize {
        driver::analyze(data, &Standardized::new(runner), config, cancel)
    } else {
        driver::analyze(data, &runner, config, cancel)
    }
}
