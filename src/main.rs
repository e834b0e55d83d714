mod cli;

use clap::Parser;
use cli::Cli;
use std::sync::Arc;
use stockpile::{
    Dispatcher, EntitySource, FileCache, Orchestrator, ProviderKey, RateLimiter, Scheduler,
    Shutdown, StockpileConfig, StockpileError, Universe, WorkerPool,
};
use tracing::{Level, debug, error, info, subscriber};
use tracing_subscriber::FmtSubscriber;

fn init_tracing(debug: bool) -> anyhow::Result<()> {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let my_subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    subscriber::set_global_default(my_subscriber)?;
    Ok(())
}

/// Builds the dispatcher for the requested providers, one orchestrator and cache
/// namespace each, sharing a single rate limiter.
async fn dispatcher(
    config: &StockpileConfig,
    keys: &[ProviderKey],
    force: bool,
) -> stockpile::Result<Dispatcher> {
    config.require(keys)?;

    let limiter = Arc::new(RateLimiter::new(&config.min_intervals));
    let mut dispatcher = Dispatcher::new().with_force(force);
    for key in keys {
        let provider = stockpile::providers::build(*key, config)?;
        let cache = FileCache::new(config.cache_root(*key));
        cache.ensure_writable().await?;
        debug!("{} caching to {}", provider.name(), cache.root().display());

        dispatcher = dispatcher.with_orchestrator(Orchestrator::new(
            provider,
            cache,
            limiter.clone(),
        ));
    }
    Ok(dispatcher)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug)?;
    debug!("command line input recorded: {cli:?}");

    let keys = cli.provider_keys();
    let setup = async {
        let config = StockpileConfig::from_env()?;
        let dispatcher = dispatcher(&config, &keys, cli.force).await?;
        Ok::<_, StockpileError>((config, dispatcher))
    };
    let (config, dispatcher) = match setup.await {
        Ok(setup) => setup,
        Err(err) => {
            error!("invalid configuration: {err}");
            eprintln!("stockpile: {err}");
            std::process::exit(1);
        }
    };

    let universe = Universe::new(config.tickers.clone(), config.tickers_file.clone());
    let entities: EntitySource = Arc::new(move || universe.load());
    let pool = WorkerPool::new(Arc::new(dispatcher), config.workers);
    let scheduler =
        Scheduler::new(pool, entities, keys, config.poll_interval).with_shuffle(cli.shuffle);
    info!(
        "starting with {} workers, data in {}",
        config.workers,
        config.data_dir.display()
    );

    if cli.once {
        let summary = scheduler.run_once().await?;
        info!("single pass finished: {summary:?}");
        return Ok(());
    }

    let shutdown = Shutdown::new();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, finishing the current batch ...");
                interrupt.trigger();
            }
            Err(err) => error!("cannot listen for ctrl-c: {err}"),
        }
    });

    scheduler.run(&shutdown).await;
    Ok(())
}
