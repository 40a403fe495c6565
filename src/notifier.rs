use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};

use crate::config::TelegramConfig;
use crate::types::Listing;

/// Outbound operator messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Send a message, logging delivery failures instead of returning them.
pub async fn notify<N: Notifier + ?Sized>(notifier: &N, text: &str) {
    if let Err(e) = notifier.send(text).await {
        error!("Notification failed: {e:#}");
    }
}

/// Markdown announcement for a newly seen listing.
pub fn listing_message(listing: &Listing) -> String {
    let address = if listing.address.is_empty() {
        "Unknown address"
    } else {
        listing.address.as_str()
    };
    format!(
        "🏠 *New listing:* {address}\nRent €{}, {}m², {} rooms\n[Details]({})",
        listing.price, listing.area, listing.rooms, listing.detail_url
    )
}

/// Confirmation after a successful application.
pub fn applied_message(id: &str) -> String {
    format!("✅ Applied to {id}")
}

/// Delivers messages through the Telegram Bot API `sendMessage` method.
pub struct TelegramNotifier {
    http: reqwest::Client,
    url: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
        };
        let response = self.http.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Telegram API error: {status} {body}");
        }
        Ok(())
    }
}

/// Writes messages to the log; used when no Telegram destination is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        info!("Notification: {text}");
        Ok(())
    }
}

/// Pick the notifier for the given (optional) Telegram config.
///
/// A section with an empty token or chat id counts as absent.
pub fn from_config(telegram: Option<&TelegramConfig>) -> Box<dyn Notifier> {
    match telegram.filter(|t| t.is_configured()) {
        Some(config) => Box::new(TelegramNotifier::new(config)),
        None => Box::new(LogNotifier),
    }
}
