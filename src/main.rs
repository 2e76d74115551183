//! Indigo Prometheus Exporter
//!
//! Serves the state of an Indigo controller on a Prometheus scrape
//! endpoint.

use clap::Parser;
use indigo_exporter::{
    collector_from_config,
    metrics::{shutdown_signal, ExporterMetrics, MetricsServer, MetricsServerConfig, MetricsState},
    FileConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Prometheus metrics exporter for Indigo.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "indigo_exporter.toml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_exists = cli.config.exists();
    let config = if config_exists {
        match FileConfig::from_file(&cli.config) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", cli.config.display(), e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        FileConfig::default()
    };

    // Initialize logging; RUST_LOG overrides the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("Indigo exporter v{}", indigo_exporter::VERSION);
    if config_exists {
        info!(path = %cli.config.display(), "Config file loaded");
    } else {
        warn!(path = %cli.config.display(), "Config file does not exist, using defaults");
    }

    // Blocking HTTP clients must be built outside the async runtime
    let collector = match collector_from_config(&config) {
        Ok(collector) => collector,
        Err(e) => {
            error!(error = %e, "Failed to initialize entity source");
            return ExitCode::FAILURE;
        }
    };
    let exporter = match ExporterMetrics::new() {
        Ok(exporter) => exporter,
        Err(e) => {
            error!(error = %e, "Failed to create exporter metrics");
            return ExitCode::FAILURE;
        }
    };

    let port = config.endpoint_port();
    info!(port, source = ?config.source.kind, "Starting metrics endpoint");
    let server = MetricsServer::new(
        MetricsServerConfig::with_port(port),
        MetricsState::new(collector, exporter),
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(server.run(shutdown_signal())) {
        Ok(()) => {
            info!("Done.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Metrics server failed");
            ExitCode::FAILURE
        }
    }
}
