//! setup-account: first-time setup for the MijnDAK autoreact bot.
//!
//! Expects `config.toml` to already exist (copied from `config.toml.template`).
//! Reads the portal password (hidden input), verifies the login and the
//! anti-forgery token, optionally sends a Telegram test message, and saves
//! the credentials into the existing config file.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use mijndak_autoreact::TELEGRAM_API_BASE;
use mijndak_autoreact::auth::{PortalLogin, SessionSource};
use mijndak_autoreact::config::{AppConfig, CONFIG_PATH, TelegramConfig};
use mijndak_autoreact::feed::csrf_token;
use mijndak_autoreact::notifier::{Notifier, TelegramNotifier};

#[derive(Parser)]
#[command(
    name = "setup-account",
    about = "Verify the portal login and save credentials to config.toml"
)]
struct Cli {
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Portal username (defaults to the one in the config file)
    #[arg(long)]
    username: Option<String>,

    /// Telegram bot token; requires --telegram-chat-id
    #[arg(long, requires = "telegram_chat_id")]
    telegram_token: Option<String>,

    /// Telegram chat id; requires --telegram-token
    #[arg(long, requires = "telegram_token")]
    telegram_chat_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_path();

    let mut app_config = AppConfig::load(config_path).with_context(|| {
        format!(
            "{} not found, copy config.toml.template to config.toml first",
            config_path.display()
        )
    })?;

    println!("=== MijnDAK Autoreact: Account Setup ===\n");

    // ── Step 1: Credentials ────────────────────────────────────────
    if let Some(username) = cli.username {
        app_config.account.username = username;
    }
    if app_config.account.username.trim().is_empty() {
        bail!("no username: pass --username or set account.username");
    }
    println!("Username: {}", app_config.account.username);
    let password = rpassword::prompt_password("Enter portal password: ")
        .context("failed to read password")?;
    if password.trim().is_empty() {
        bail!("password cannot be empty");
    }
    app_config.account.password = password.trim().to_string();

    if let (Some(bot_token), Some(chat_id)) = (cli.telegram_token, cli.telegram_chat_id) {
        let api_base = app_config
            .telegram
            .as_ref()
            .map(|t| t.api_base.clone())
            .unwrap_or_else(|| TELEGRAM_API_BASE.to_string());
        app_config.telegram = Some(TelegramConfig {
            bot_token,
            chat_id,
            api_base,
        });
    }
    println!();

    // ── Step 2: Verify login ───────────────────────────────────────
    println!("Logging in via {}...", app_config.browser.webdriver_url);
    let login = PortalLogin::new(
        app_config.browser.clone(),
        app_config.account.clone(),
        &app_config.portal.login_url,
    );
    let cookies = login
        .acquire()
        .await
        .context("login failed, check username, password and that chromedriver is running")?;
    println!("  Login successful ({} cookies)", cookies.len());
    match csrf_token(&cookies) {
        Some(_) => println!("  Anti-forgery token found"),
        None => println!("  WARNING: no anti-forgery token in the session; feed requests may be rejected"),
    }
    println!();

    // ── Step 3: Telegram test message ──────────────────────────────
    if let Some(telegram) = app_config.telegram.as_ref().filter(|t| t.is_configured()) {
        println!("Sending Telegram test message...");
        TelegramNotifier::new(telegram)
            .send("MijnDAK autoreact is set up.")
            .await
            .context("Telegram test message failed, check bot token and chat id")?;
        println!("  Message delivered");
        println!();
    }

    // ── Step 4: Save config ────────────────────────────────────────
    println!("Updating credentials in {}...", config_path.display());
    app_config.save(config_path)?;
    println!("  Config updated successfully");
    println!();

    println!("=== Setup Complete ===");
    println!();
    println!("Next steps:");
    println!("  cargo run --bin autoreact -- --once");

    Ok(())
}
