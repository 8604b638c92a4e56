// main.rs

// --- External Crate Imports ---
use anyhow::{Context, Error, Result};
use clap::Parser;
use log::info;
use std::time::Instant;

mod evaluate;
mod matrix;
mod predictor;
mod report;
mod scoring;

use predictor::ArtifactStore;

/// Exit status for an unusable test directory.
const EXIT_INVALID_TEST_DIR: i32 = -1;

// --- Main Function ---
fn main() -> Result<(), Error> {
    let total_time_start = Instant::now();
    let cli_args = cli::CliArgs::parse();

    // Initialize logger
    let log_level = cli_args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: Invalid log level '{}' provided. Defaulting to Info.",
                cli_args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_micros()
        .target(env_logger::Target::Stderr)
        .init();

    info!("Using predictors from {}.", cli_args.train_dir.display());
    info!("Output will be in {}.", cli_args.out_dir.display());

    if !cli_args.test_dir.is_dir() {
        eprintln!("not a valid testDir: {}", cli_args.test_dir.display());
        std::process::exit(EXIT_INVALID_TEST_DIR);
    }

    // Configure Rayon thread pool
    info!("Using {} workers for role predictions.", cli_args.jobs);
    rayon::ThreadPoolBuilder::new()
        .num_threads(cli_args.jobs)
        .build_global()?;

    // --- 1. Load matrix and labels ---
    let role_matrix = matrix::load_role_matrix(&cli_args.test_dir)
        .with_context(|| format!("Failed to load matrix from {}", cli_args.test_dir.display()))?;
    info!(
        "Loaded {} genomes x {} roles.",
        role_matrix.num_genomes(),
        role_matrix.num_roles()
    );

    // --- 2. Predict every role from the others ---
    let store = ArtifactStore {
        train_dir: cli_args.train_dir.clone(),
        classifier: cli_args.classifier.clone(),
        use_lda: cli_args.lda,
    };
    info!(
        "Predicting {} roles with {} classifiers{}...",
        role_matrix.num_roles(),
        store.classifier,
        if store.use_lda { " on LDA variable subsets" } else { "" }
    );
    let tagged = evaluate::predict_all_roles(&role_matrix, &store)?;
    let predictions = evaluate::assemble_predictions(
        tagged,
        role_matrix.num_genomes(),
        role_matrix.num_roles(),
    )?;

    // --- 3. Score ---
    let scores = scoring::consistency(role_matrix.x.view(), predictions.view());
    report::log_score_table(&role_matrix, &scores);

    // --- 4. Write Outputs ---
    report::write_genome_reports(&cli_args.out_dir, &role_matrix, predictions.view(), &scores)?;
    report::write_summary(&cli_args.test_dir, &role_matrix, &scores)?;

    info!(
        "Finished {} evaluations with {} roles in {:.2} seconds.",
        predictions.nrows(),
        predictions.ncols(),
        total_time_start.elapsed().as_secs_f64()
    );
    Ok(())
}

// --- Module Implementations ---

mod cli {
    use crate::evaluate::DEFAULT_WORKERS;
    use crate::predictor::DEFAULT_CLASSIFIER;
    use clap::Parser;
    use std::path::PathBuf;

    #[derive(Parser, Debug)]
    #[command(author, version, about = "Evaluate a matrix of roles for consistency.", long_about = None)]
    pub(crate) struct CliArgs {
        /// Directory which contains built predictors
        pub(crate) train_dir: PathBuf,

        /// Directory containing the built matrix of roles (X, col.h, row.h)
        pub(crate) test_dir: PathBuf,

        /// Output directory; <genome>.out files are appended
        pub(crate) out_dir: PathBuf,

        /// Classifier type, used as the artifact directory and file name
        #[arg(short = 'c', long = "classifier", default_value = DEFAULT_CLASSIFIER)]
        pub(crate) classifier: String,

        /// Restrict each predictor's input to its LDA variable subset
        #[arg(long = "LDA")]
        pub(crate) lda: bool,

        #[arg(short = 'j', long, default_value_t = DEFAULT_WORKERS)]
        pub(crate) jobs: usize,

        #[arg(long, default_value = "Info")]
        pub(crate) log_level: String,
    }
}
