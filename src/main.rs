//! SecureBank fraud pipeline - command line driver
//!
//! Trains models on versioned datasets, scores transactions and audits the
//! selected model. Every command prints its result as JSON on stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use securebank_fraud::{config::LoggingConfig, AppConfig, DatasetLifecycle, FraudService};
use serde::Serialize;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "securebank", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model on a dataset version
    Train {
        /// logistic_regression, random_forest or svm
        #[arg(short, long)]
        model: String,
        /// Dataset version (configured default when omitted)
        #[arg(short, long)]
        dataset: Option<String>,
    },
    /// Score transactions given as JSON lines
    Predict {
        /// Model name, `kind` or `kind@version`
        #[arg(short, long)]
        model: String,
        /// JSON-lines file of transactions (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Error rates of a model over every row of a dataset version
    Audit {
        #[arg(short, long)]
        model: String,
        #[arg(short, long)]
        dataset: String,
    },
    /// Shape, null counts and fraud ratio of a dataset version's features
    Describe {
        #[arg(short, long)]
        dataset: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from_path(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    init_logging(&config.logging)?;
    info!(config = %cli.config.display(), "Configuration loaded");

    match cli.command {
        Command::Train { model, dataset } => {
            let service = FraudService::new(&config);
            let report = service
                .train_model(&model, dataset.as_deref())
                .with_context(|| format!("Training {} failed", model))?;
            print_json(&report)
        }
        Command::Predict { model, input } => predict(&config, &model, input),
        Command::Audit { model, dataset } => {
            let mut service = FraudService::new(&config);
            service.select_model(&model).context("Model selection failed")?;
            let report = service
                .audit_performance(&dataset)
                .with_context(|| format!("Audit on {} failed", dataset))?;
            print_json(&report)
        }
        Command::Describe { dataset } => {
            let lifecycle = DatasetLifecycle::from_config(&config);
            let version = lifecycle.resolve_version(dataset.as_deref());
            let features = lifecycle
                .feature_set(&version)
                .with_context(|| format!("Dataset {} unavailable", version))?;
            print_json(&features.describe())
        }
    }
}

#[derive(Serialize)]
struct ScoredLine {
    line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    fraud: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn predict(config: &AppConfig, model: &str, input: Option<PathBuf>) -> Result<()> {
    let mut service = FraudService::new(config);
    service.select_model(model).context("Model selection failed")?;

    let reader: Box<dyn BufRead> = match &input {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }

        let scored = match service.predict_json(&line) {
            Ok(response) => ScoredLine {
                line: index + 1,
                fraud: Some(response.fraud),
                error: None,
            },
            Err(e) => {
                warn!(line = index + 1, error = %e, "Transaction rejected");
                ScoredLine {
                    line: index + 1,
                    fraud: None,
                    error: Some(e.to_string()),
                }
            }
        };
        println!("{}", serde_json::to_string(&scored)?);
    }

    service.pipeline().stats().log_summary();
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("securebank_fraud={0},securebank={0}", logging.level)))
        .context("Invalid log level")?;

    // Logs go to stderr so stdout stays machine readable.
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.pretty().init(),
    }
    Ok(())
}
