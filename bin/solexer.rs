use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use solexer::{
    ClickhouseClient, Indexer, PortalClient, Settings, Sink, SolanaRpcClient, WhitelistFilter,
};

#[tokio::main()]
async fn main() {
    if let Err(e) = SimpleLogger::new().with_level(LevelFilter::Info).init() {
        eprintln!("Failed to initialize logger: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run().await {
        error!("Indexer failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // Load configuration
    let settings =
        Settings::new().context("Failed to load configuration from config.yaml and environment")?;
    settings.validate().context("Invalid configuration")?;
    settings.log_summary();

    let clickhouse = ClickhouseClient::new(&settings.clickhouse)
        .await
        .context("Failed to initialize database connection")?;
    let sink = Arc::new(Sink::new(clickhouse, settings.retry.clone()));

    let whitelist = Arc::new(WhitelistFilter::new(
        settings.indexer.whitelist_path.as_ref().map(PathBuf::from),
        [
            settings.indexer.native_token_address.clone(),
            settings.indexer.stable_token_address.clone(),
        ],
    ));

    let source = PortalClient::new(&settings.gateway, settings.retry.clone())
        .context("Failed to create gateway client")?;

    let mut indexer: Indexer<_, _> = Indexer::new(source, sink, &settings, whitelist);
    if let Some(rpc_url) = &settings.gateway.rpc_url {
        let rpc = SolanaRpcClient::new(
            rpc_url,
            Duration::from_millis(settings.gateway.request_timeout_ms),
            settings.retry.clone(),
        )?;
        indexer = indexer.with_rpc(rpc);
    }

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Indexer running. Press Ctrl+C to stop.");

    // Shutdown drops the in-flight batch, the checkpoint makes it replay on restart
    #[cfg(unix)]
    {
        tokio::select! {
            res = indexer.run() => {
                res?;
                info!("Block stream exhausted, exiting");
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            res = indexer.run() => {
                res?;
                info!("Block stream exhausted, exiting");
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting...");
            },
        };
    }

    Ok(())
}
