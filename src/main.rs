use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nodewatch::baseline::BaselineTracker;
use nodewatch::collector::Driver;
use nodewatch::config::Config;
use nodewatch::detection::AnomalyClassifier;

#[derive(Parser)]
#[command(
    name = "nodewatch",
    version,
    about = "Node metric and error log anomaly detector with deduplicated notifications",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll Prometheus and Loki and forward anomalies until interrupted
    Run,

    /// Classify a series of values offline and print each verdict
    Classify {
        /// Node the values belong to
        #[arg(short, long, default_value = "local")]
        node: String,

        /// Metric name (e.g. disk_write_bytes)
        #[arg(short, long)]
        metric: String,

        /// Values in observation order
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<f64>,
    },

    /// Validate the configuration and print it as TOML
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());

    // Initialize tracing/logging
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Run => {
            tracing::info!("nodewatch starting");
            run(config).await?;
        }

        Commands::Classify {
            node,
            metric,
            values,
        } => {
            tracing::debug!(node = %node, metric = %metric, count = values.len(), "Starting classify command");
            classify(&config, &node, &metric, &values);
        }

        Commands::CheckConfig => {
            config.validate().context("Configuration is invalid")?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env();
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("nodewatch=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("nodewatch={level},warn"))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn run(config: Config) -> Result<()> {
    if let Err(e) = nodewatch::metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {e}");
    }

    let driver = Driver::from_config(&config).context("Failed to start collectors")?;
    let handle = driver.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutdown requested");
    handle.shutdown().await;

    match nodewatch::metrics::metrics_snapshot() {
        Ok(snapshot) if !snapshot.is_empty() => tracing::info!(snapshot = %snapshot, "Final metrics"),
        Ok(_) => {}
        Err(e) => tracing::warn!("Failed to gather metrics: {e}"),
    }

    tracing::info!("nodewatch stopped");
    Ok(())
}

fn classify(config: &Config, node: &str, metric: &str, values: &[f64]) {
    let tracker = Arc::new(BaselineTracker::with_config(config.detection.baseline()));
    let classifier = AnomalyClassifier::new(Arc::clone(&tracker));

    for (index, &value) in values.iter().enumerate() {
        let verdict = classifier.classify(node, metric, value);
        let reading = tracker.get(node, metric);
        let baseline = reading
            .available()
            .map(|b| format!("{b:.2}"))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:>3}  {:>14.2}  baseline={:<14}  {:<8}  {}",
            index + 1,
            value,
            baseline,
            verdict.severity,
            verdict.message_text()
        );
    }
}
