use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bitbucket_pr_builder::config::AppConfig;
use bitbucket_pr_builder::server::{AppState, build_router};
use bitbucket_pr_builder::webhooks::WebhookSecret;

#[derive(Parser)]
#[command(name = "bbprb")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Builds Bitbucket pull requests and reports their status", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "BBPRB_CONFIG", default_value = "bbprb.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bitbucket_pr_builder=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let jobs = config.build_jobs().context("setting up jobs")?;

    for job in &jobs {
        tracing::info!(
            job = %job.config().job,
            destination = %job.config().destination_repository,
            cancel_outdated_jobs = job.config().cancel_outdated_jobs,
            "Monitoring job"
        );
    }

    let secret = config.webhook_secret.as_deref().map(WebhookSecret::new);
    if secret.is_none() {
        tracing::warn!("No webhook secret configured; deliveries are not authenticated");
    }

    let app = build_router(AppState::new(jobs, secret));

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    tracing::info!("listening on {}", config.listen);

    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}
