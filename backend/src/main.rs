use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use optwatch::{
    cli::{self, Cli, Command},
    config::AppConfig,
    db::Db,
    market::{ChainFetcher, YahooClient},
    metrics::Counters,
    notify::{AlertDispatcher, TelegramChannel},
    scheduler::Scheduler,
    store::{SqlxRepository, Stores},
};
use tokio_util::sync::CancellationToken;

/// Connects the database and makes sure every table exists.
async fn init_store(database_url: &str) -> anyhow::Result<Arc<SqlxRepository>> {
    let db = Db::connect(database_url)
        .await
        .with_context(|| format!("cannot open database {database_url}"))?;
    db.migrate().await?;

    Ok(Arc::new(SqlxRepository::new(db.pool.clone())))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    match Cli::parse().into_command() {
        Command::Run => serve().await,
        Command::Admin(command) => {
            let repo = init_store(&AppConfig::database_url_from_env()).await?;
            println!("{}", cli::execute(command, &repo).await?);
            Ok(())
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env()?;
    common::init_logger("optwatch", cfg.json_logs);

    tracing::info!("Starting optwatch...");

    let repo = init_store(&cfg.database_url).await?;
    let counters = Counters::default();

    let channel =
        TelegramChannel::new(&cfg.telegram_api_url, &cfg.telegram_bot_token, cfg.http_timeout)?;
    let dispatcher = Arc::new(AlertDispatcher::new(channel, repo.clone(), counters.clone()));

    let provider = YahooClient::new(cfg.yahoo_api_url.clone(), cfg.http_timeout)?;
    let scheduler = Arc::new(
        Scheduler::new(
            ChainFetcher::new(provider),
            Stores::shared(repo),
            dispatcher,
            cfg.signal_source.clone(),
            counters,
        )
        .with_fetch_concurrency(cfg.fetch_concurrency),
    );

    let cancel = CancellationToken::new();
    let loop_handle = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    cancel.cancel();

    loop_handle.await.context("scheduler task failed")?;
    Ok(())
}
