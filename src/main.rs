use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::info;

use dinewatch::config;
use dinewatch::db;
use dinewatch::dispatch::Dispatcher;
use dinewatch::lifecycle::Controller;
use dinewatch::notify::TelegramNotifier;
use dinewatch::poller::{Poller, PollerSettings};
use dinewatch::source::HttpAvailabilitySource;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/dinewatch.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let source = Arc::new(HttpAvailabilitySource::from_config(&cfg.source)?);

    let bot = Bot::new(cfg.telegram.bot_token.clone());
    // Readiness probe: no poll cycle may start against a half-initialized
    // notifier.
    let me = bot.get_me().await.context("telegram readiness probe failed")?;
    info!(bot = %me.username(), "notifier ready");

    let notifier = Arc::new(TelegramNotifier::new(bot));
    let dispatcher = Dispatcher::new(pool.clone(), notifier, cfg.watcher.max_slots_shown);
    let poller = Poller::new(
        pool.clone(),
        source,
        dispatcher,
        PollerSettings {
            interval: cfg.watcher.poll_interval(),
            max_concurrent_checks: cfg.watcher.max_concurrent_checks,
            check_timeout: cfg.watcher.check_timeout(),
            cycle_deadline: cfg.watcher.cycle_deadline(),
        },
    );

    let controller = Controller::start(poller, cfg.watcher.shutdown_grace());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    controller.shutdown().await;

    Ok(())
}
