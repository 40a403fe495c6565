//! Probe: portal landing page and listing feed
//!
//! Fetches the public landing page, logs in with the configured account,
//! performs one feed request and documents:
//! - Response shape and top-level fields
//! - A sample raw record
//! - Every normalized listing and whether it passes the configured criteria

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use serde_json::Value;

use mijndak_autoreact::auth::PortalLogin;
use mijndak_autoreact::config::{AppConfig, CONFIG_PATH};
use mijndak_autoreact::feed::{FeedClient, LISTINGS_POINTER, extract_listings};
use mijndak_autoreact::filter::is_eligible;

#[derive(Parser)]
#[command(name = "probe_feed", about = "Inspect the portal page and listing feed")]
struct Args {
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,
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

    println!("=== Probe: MijnDAK feed ===");
    println!("Portal: {}", config.portal.base_url);
    println!();

    // 1. Landing page
    println!("--- 1. Landing page ---");
    let start = Instant::now();
    let resp = reqwest::get(&config.portal.page_url).await?;
    let latency = start.elapsed();
    println!("Status: {}", resp.status());
    println!("Latency: {:?}", latency);
    let html = resp.text().await?;
    println!("Title: {}", page_title(&html).unwrap_or("<none>"));
    let snippet: String = html.chars().take(300).collect();
    println!("Snippet: {}", snippet.replace('\n', " "));
    println!();

    // 2. Login + feed
    println!("--- 2. Feed request ---");
    let session = Arc::new(PortalLogin::new(
        config.browser.clone(),
        config.account.clone(),
        &config.portal.login_url,
    ));
    let client = FeedClient::new(&config.portal, session)?;
    let start = Instant::now();
    let body = client.fetch_raw().await?;
    println!("Latency (incl. login): {:?}", start.elapsed());

    match body.as_object() {
        Some(obj) => {
            println!("Top-level fields:");
            for key in obj.keys() {
                println!("  - {}", key);
            }
        }
        None => println!("Response is not an object"),
    }

    let records = body.pointer(LISTINGS_POINTER).and_then(Value::as_array);
    match records {
        Some(arr) => {
            println!("Record count: {}", arr.len());
            if let Some(first) = arr.first() {
                println!("\nSample record (first):");
                println!("{}", serde_json::to_string_pretty(first)?);
            }
        }
        None => {
            println!("No listing array at {LISTINGS_POINTER}:");
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    println!();

    // 3. Normalized listings
    println!("--- 3. Normalized listings ---");
    let listings = extract_listings(&body, client.links());
    for listing in &listings {
        let verdict = if is_eligible(listing, &config.criteria) {
            "eligible"
        } else {
            "skip"
        };
        println!(
            "  [{verdict}] {} {:?} {} | €{} | {}m² | {} rooms | {}",
            listing.id,
            listing.kind,
            listing.address,
            listing.price,
            listing.area,
            listing.rooms,
            listing.detail_url
        );
    }
    println!("Total: {}", listings.len());

    Ok(())
}

fn page_title(html: &str) -> Option<&str> {
    let start = html.find("<title>")? + "<title>".len();
    let end = html[start..].find("</title>")? + start;
    Some(html[start..end].trim())
}
