use {
    adtrack_common::config::ValidatorConfig,
    adtrack_store::Stores,
    adtrack_validator::{HttpFeedClient, HttpPeerClient, LocalChain, Validator, ValidatorContext},
    anyhow::{Context, Result},
    clap::Parser,
    std::{path::PathBuf, sync::Arc},
    tracing::{error, info},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ValidatorConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ValidatorConfig::default(),
    };
    adtrack_validator::init_logging(args.log_level.as_deref().unwrap_or(&config.log_level));

    info!("Starting adtrack validator {}", config.hotkey);

    let stores = Stores::from_config(&config.stores)
        .await
        .context("Failed to open stores")?;
    let timeout = config.scheduler.peer_timeout();
    let peers = HttpPeerClient::new(config.peers.clone(), timeout).context("Failed to build peer client")?;
    let feed_url = config.feed_url.clone().context("feed_url is required")?;
    let feed = HttpFeedClient::new(feed_url, timeout).context("Failed to build feed client")?;

    let ctx = ValidatorContext::new(
        config,
        stores,
        Arc::new(peers),
        Arc::new(feed),
        Arc::new(LocalChain::new()),
    );
    let (mut validator, shutdown_tx) = Validator::new(ctx);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        let _ = shutdown_tx.send(()).await;
    });

    validator.run().await?;
    Ok(())
}
