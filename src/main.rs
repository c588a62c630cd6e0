use chrono::Utc;
use clap::Parser;
use fundwatch::app::App;
use fundwatch::cli::Cli;
use fundwatch::config::AppConfig;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // .env is optional; real environment variables win
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fundwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenv {
        if !e.not_found() {
            warn!("Failed to read .env: {}", e);
        }
    }

    let config = match AppConfig::from_env(cli.run_options()) {
        Ok(config) => config,
        Err(e) => {
            error!("✗ {}", e);
            return ExitCode::FAILURE;
        }
    };
    config.log_summary();

    let app = match App::build(&config).await {
        Ok(app) => app,
        Err(e) => {
            error!("✗ Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let now_ms = Utc::now().timestamp_millis();
    let report = app.run(now_ms).await;
    app.shutdown().await;

    for flow in &report.flows {
        info!("{}", flow);
    }

    if report.is_success() {
        info!("✓ Reconciliation complete");
        ExitCode::SUCCESS
    } else {
        for (flow, reason) in &report.failures {
            error!("✗ {} flow failed: {}", flow, reason);
        }
        ExitCode::FAILURE
    }
}
