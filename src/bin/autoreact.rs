use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use mijndak_autoreact::auth::{PortalLogin, SessionSource};
use mijndak_autoreact::browser::Browser;
use mijndak_autoreact::config::{AppConfig, CONFIG_PATH};
use mijndak_autoreact::feed::FeedClient;
use mijndak_autoreact::notifier;
use mijndak_autoreact::reactor::Reactor;
use mijndak_autoreact::runner::Runner;
use mijndak_autoreact::store::IdStore;
use mijndak_autoreact::webdriver::{BOT_ARGS, WebDriver};

#[derive(Parser)]
#[command(
    name = "autoreact",
    about = "Watch MijnDAK listings, notify and respond automatically"
)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)?;
    config.apply_env();
    config.validate().context("invalid configuration")?;
    info!("Loaded config from {}", args.config.display());

    let c = &config.criteria;
    info!(
        "Starting autoreact: rent {}-{}, area >= {}m², rooms {}-{}, poll={}s",
        c.min_rent,
        c.max_rent,
        c.min_area,
        c.min_rooms,
        c.max_rooms,
        config.settings.poll_interval_secs,
    );
    if !config.telegram.as_ref().is_some_and(|t| t.is_configured()) {
        warn!("Telegram is not configured; notifications go to the log only");
    }

    let session: Arc<dyn SessionSource> = Arc::new(PortalLogin::new(
        config.browser.clone(),
        config.account.clone(),
        &config.portal.login_url,
    ));
    let feed = FeedClient::new(&config.portal, session.clone())?;
    let store = IdStore::from_config(&config.storage);

    info!("Starting browser via {}", config.browser.webdriver_url);
    let driver = WebDriver::connect(&config.browser, BOT_ARGS)
        .await
        .context("failed to start browser session")?;
    let reactor = Reactor::new(
        driver,
        &config.portal.base_url,
        config.browser.screenshot_dir.clone(),
    )?;

    let mut runner = Runner::new(
        reactor,
        Box::new(feed),
        session,
        notifier::from_config(config.telegram.as_ref()),
        store,
        config.criteria,
        config.settings.poll_interval(),
    );

    let result = drive(&mut runner, args.once).await;
    runner.close().await;
    result
}

/// Log in, then run one cycle or poll until Ctrl+C.
async fn drive<B: Browser>(runner: &mut Runner<B>, once: bool) -> Result<()> {
    runner.start().await?;
    if once {
        runner.run_once().await?;
    } else {
        runner.run(shutdown_signal()).await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}
