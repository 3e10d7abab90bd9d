//! Localization Experiment Tool
//!
//! Configuration-driven entry point that runs the full hybrid-retrieval
//! pipeline on a pre-cleaned feature table and writes the evaluation report.
//!
//! # Input
//!
//! - **Features**: `features.npy` - `f64` array `[rows, n_features]`, time-ordered
//! - **Labels**: `labels.npy` - `i64` array `[rows]`
//! - **Class names** (optional): JSON array, one name per distinct label
//!
//! # Usage
//!
//! ```bash
//! # Run from TOML config
//! cargo run --release --bin localize -- --config configs/hybrid.toml
//!
//! # Generate sample config
//! cargo run --release --bin localize -- --generate-config hybrid.toml
//! ```
//!
//! Set `RUST_LOG=debug` for per-batch detail.

use context_localizer::classifier;
use context_localizer::config::{DataConfig, ExperimentMetadata, PipelineConfig};
use context_localizer::{FeatureTable, LogProgress, Pipeline, PipelineBuilder};
use std::path::PathBuf;

/// Main entry point for the localization tool
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    match args[1].as_str() {
        "--config" => {
            if args.len() < 3 {
                eprintln!("Error: --config requires a path argument");
                std::process::exit(1);
            }
            run_from_config(&args[2]);
        }
        "--generate-config" => {
            if args.len() < 3 {
                eprintln!("Error: --generate-config requires a path argument");
                std::process::exit(1);
            }
            generate_sample_config(&args[2]);
        }
        "--help" | "-h" => {
            print_usage(&args[0]);
        }
        _ => {
            eprintln!("Unknown argument: {}", args[1]);
            print_usage(&args[0]);
            std::process::exit(1);
        }
    }
}

fn print_usage(program: &str) {
    eprintln!(
        r#"
Hybrid Temporal + Metric Retrieval Localization

Usage:
    {program} --config <path.toml>       Run the pipeline from a config file
    {program} --generate-config <path>   Generate sample config file
    {program} --help                     Show this help

Examples:
    # Half anchor, half NCA retrieval with the built-in classifier
    {program} --config configs/hybrid.toml

    # Generate sample config
    {program} --generate-config configs/my_run.toml

For configuration options, see the generated sample config.
"#
    );
}

/// Generate a sample configuration file
fn generate_sample_config(path: &str) {
    let config = PipelineBuilder::new()
        .experiment("hybrid_k2048", "Half temporal anchor, half NCA retrieval")
        .json_report("results.json")
        .build_config()
        .map(|config| {
            config.with_data(DataConfig {
                features_path: PathBuf::from("/path/to/features.npy"),
                labels_path: PathBuf::from("/path/to/labels.npy"),
                class_names_path: None,
            })
        });

    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error building sample config: {}", e);
            std::process::exit(1);
        }
    };

    match config.save_toml(path) {
        Ok(()) => {
            println!("✅ Generated sample config: {}", path);
            println!("\nEdit the following fields before running:");
            println!("  - data.features_path / data.labels_path: input table");
            println!("  - retrieval.retrieval_k / retrieval.temporal_ratio: context budget");
            println!("  - classifier: `knn_vote` or `process` with a service command");
        }
        Err(e) => {
            eprintln!("Error generating config: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run the pipeline from a configuration file
fn run_from_config(config_path: &str) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║          Hybrid Temporal + Metric Retrieval Localizer        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let config = match PipelineConfig::load_toml(config_path) {
        Ok(c) => {
            println!("✅ Loaded configuration: {}", config_path);
            c
        }
        Err(e) => {
            eprintln!("❌ Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    print_config_summary(&config);

    if let Err(e) = run(config) {
        eprintln!("❌ Run failed during {}: {}", e.stage(), e);
        std::process::exit(1);
    }
}

fn print_config_summary(config: &PipelineConfig) {
    let name = config
        .metadata
        .as_ref()
        .map(|m: &ExperimentMetadata| m.name.as_str())
        .unwrap_or("(unnamed)");
    println!("┌─ Configuration Summary ───────────────────────────────────────┐");
    println!("│ Experiment:     {}", name);
    println!("│ Window size:    {}", config.window.window_size);
    println!("│ Train fraction: {}", config.window.train_fraction);
    println!(
        "│ Budget:         {} ({} anchor + {} semantic)",
        config.retrieval.retrieval_k,
        config.retrieval.n_temporal(),
        config.retrieval.k_semantic()
    );
    println!("│ Granularity:    {:?}", config.retrieval.granularity);
    println!("│ NCA components: {}", config.metric.nca_components);
    println!("│ Batch size:     {}", config.inference.batch_size);
    println!("│ Seed:           {}", config.metric.random_seed);
    println!("│ Report:         {}", config.report.output_path.display());
    println!("└────────────────────────────────────────────────────────────────┘");
    println!();
}

fn run(config: PipelineConfig) -> context_localizer::Result<()> {
    let data = config.data.clone().ok_or_else(|| {
        context_localizer::LocalizerError::config("config has no [data] section with table paths")
    })?;
    let table = FeatureTable::load_npy(
        &data.features_path,
        &data.labels_path,
        data.class_names_path.as_ref(),
    )?;
    println!(
        "📁 Loaded {} rows x {} features, {} classes",
        table.len(),
        table.n_features(),
        table.n_classes()
    );

    let mut classifier = classifier::from_config(&config.classifier)?;
    let release_every = config.inference.release_every;
    let pipeline = Pipeline::from_config(config)?.with_progress(Box::new(LogProgress::new(release_every)));

    let output = pipeline.run(&table, classifier.as_mut())?;
    let report = pipeline.write_report(&output)?;

    println!();
    print!("{}", report.render());
    Ok(())
}
