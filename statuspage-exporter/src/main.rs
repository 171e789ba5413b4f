//! Statuspage exporter entry point

use anyhow::Result;
use clap::Parser;
use statuspage_exporter::cache::{CacheStore, FileCacheStore, MemoryCacheStore};
use statuspage_exporter::cli::once::OnceArgs;
use statuspage_exporter::cli::{Cli, Commands};
use statuspage_exporter::config::ExporterConfig;
use statuspage_exporter::shutdown::ShutdownController;
use statuspage_exporter::source::SourceRouter;
use statuspage_exporter::{bootstrap, logging, server};
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve(args)) => run_serve(ExporterConfig::from_args(&args)).await,
        Some(Commands::Once(args)) => run_once(&args).await,
        None => run_serve(ExporterConfig::from_env()).await,
    }
}

async fn run_serve(config: ExporterConfig) -> Result<()> {
    let _log_guard = logging::init(config.debug, config.log_dir.as_deref())?;

    let ctx = bootstrap::initialize(config).await?;
    let bind_addr = ctx.config.bind_addr();

    let shutdown = ShutdownController::default();
    let poller = ctx.poller.start(shutdown.clone());

    let result = server::run(ctx.publisher, &bind_addr, shutdown.clone()).await;

    // バインド失敗時もポーラーを止める
    shutdown.request_shutdown();
    if let Err(e) = poller.await {
        error!("Poller task failed: {}", e);
    }

    info!("Statuspage exporter stopped");
    result
}

async fn run_once(args: &OnceArgs) -> Result<()> {
    let config = ExporterConfig::from_args(&args.common);
    let _log_guard = logging::init(config.debug, config.log_dir.as_deref())?;

    let cache: Arc<dyn CacheStore> = if args.use_cache {
        Arc::new(FileCacheStore::new(&config.cache_dir))
    } else {
        Arc::new(MemoryCacheStore::new())
    };
    let ctx = bootstrap::initialize_with(config, Arc::new(SourceRouter::http()), cache).await?;

    let report = ctx.poller.run_round().await;
    if report.failed_count() > 0 {
        warn!(
            failed = report.failed_count(),
            total = report.states.len(),
            "Some services could not be fetched"
        );
    }

    let text = ctx.publisher.render()?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
