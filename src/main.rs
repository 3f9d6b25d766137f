use anyhow::Result;
use clap::Parser;
use kube::Client;
use tracing::{error, info};

use cron_trigger_controller::config::ControllerConfig;
use cron_trigger_controller::controller;
use cron_trigger_controller::observability::metrics;
use cron_trigger_controller::server::{start_server, ServerState};

/// CLI overrides; anything not given here falls back to environment
/// variables and then to built-in defaults.
#[derive(Parser, Debug)]
#[command(
    name = "cron-trigger-controller",
    version,
    about = "Kubernetes controller that reconciles CronTrigger resources into scheduled CronJobs"
)]
struct Args {
    /// HTTP port for metrics and probes
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Number of worker loops draining the work queue
    #[arg(long)]
    workers: Option<usize>,

    /// Maximum reconciliation attempts per key before giving up
    #[arg(long)]
    max_retries: Option<u32>,

    /// Container image derived CronJobs run to invoke a function
    #[arg(long)]
    trigger_image: Option<String>,

    /// Log format: text or json
    #[arg(long)]
    log_format: Option<String>,
}

impl Args {
    fn apply(self, config: &mut ControllerConfig) {
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(image) = self.trigger_image {
            config.trigger_image = image;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

fn init_tracing(log_format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cron_trigger_controller=info".into());
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = ControllerConfig::from_env();
    Args::parse().apply(&mut config);

    init_tracing(&config.log_format);

    info!("Starting Cron Trigger Controller");

    // Initialize metrics
    metrics::register_metrics()?;

    // Start HTTP server for metrics and probes
    let server_state = ServerState::new();
    let server_state_clone = server_state.clone();
    let server_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Create Kubernetes client
    let client = Client::try_default().await?;

    controller::run(client, config, server_state).await?;

    info!("Controller stopped");

    Ok(())
}
