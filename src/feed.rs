use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, ORIGIN, REFERER};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};
use url::Url;

use crate::auth::SessionSource;
use crate::config::PortalConfig;
use crate::normalize::{DetailLinks, normalize};
use crate::types::{Listing, SessionCookies};

/// Cookie whose URL-encoded value carries the anti-forgery token.
pub const CSRF_COOKIE: &str = "nr2Users";

/// Request header the portal expects the token in.
pub const CSRF_HEADER: &str = "x-csrftoken";

/// Timeout for one feed request.
const FEED_TIMEOUT: Duration = Duration::from_secs(15);

/// JSON pointer to the listing array in a feed response.
pub const LISTINGS_POINTER: &str = "/data/PublicatieLijst/List";

/// Anything that can produce the current set of listings.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Listing>>;
}

/// Read the feed request body; missing or malformed files yield `{}`.
///
/// A template saved as a JSON string holding JSON is decoded twice.
pub fn load_payload(path: &Path) -> Value {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!("Payload template {} not readable: {e}", path.display());
            return Value::Object(Map::new());
        }
    };
    let parsed = serde_json::from_str::<Value>(&contents).and_then(|value| match value {
        Value::String(inner) => serde_json::from_str(&inner),
        other => Ok(other),
    });
    match parsed {
        Ok(payload) => payload,
        Err(e) => {
            error!("Payload template {} is not valid JSON: {e}", path.display());
            Value::Object(Map::new())
        }
    }
}

/// Anti-forgery token: the text after `crf=` in the URL-decoded token cookie.
pub fn csrf_token(cookies: &SessionCookies) -> Option<String> {
    let raw = cookies.get(CSRF_COOKIE)?;
    let decoded = urlencoding::decode(raw)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| raw.clone());
    decoded
        .split(';')
        .find(|part| part.trim_start().starts_with("crf="))
        .and_then(|part| part.rsplit("crf=").next())
        .map(str::to_string)
}

/// `Cookie` header value for a cookie set.
fn cookie_header(cookies: &SessionCookies) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Normalize every object in the response's listing array; other entries are skipped.
pub fn extract_listings(body: &Value, links: &DetailLinks) -> Vec<Listing> {
    let Some(items) = body.pointer(LISTINGS_POINTER).and_then(Value::as_array) else {
        warn!("Feed response has no listing array at {LISTINGS_POINTER}");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|record| {
            let listing = normalize(record, links);
            if listing.is_none() {
                debug!("Dropping feed record without an id");
            }
            listing
        })
        .collect()
}

/// Authenticated client for the portal's listing feed.
pub struct FeedClient {
    http: reqwest::Client,
    feed_url: String,
    page_url: String,
    origin: String,
    payload_path: PathBuf,
    links: DetailLinks,
    session: Arc<dyn SessionSource>,
}

impl FeedClient {
    pub fn new(portal: &PortalConfig, session: Arc<dyn SessionSource>) -> Result<Self> {
        let base = Url::parse(&portal.base_url)
            .with_context(|| format!("invalid portal base url `{}`", portal.base_url))?;
        Ok(Self {
            http: reqwest::Client::new(),
            feed_url: portal.feed_url.clone(),
            page_url: portal.page_url.clone(),
            origin: base.origin().ascii_serialization(),
            payload_path: portal.payload_path.clone(),
            links: DetailLinks::new(&portal.detail_url, &portal.detail_param)?,
            session,
        })
    }

    pub fn links(&self) -> &DetailLinks {
        &self.links
    }

    /// Perform one feed request with the given session cookies.
    ///
    /// Non-success statuses are returned as errors.
    pub async fn request(&self, cookies: &SessionCookies) -> reqwest::Result<reqwest::Response> {
        let payload = load_payload(&self.payload_path);

        let mut request = self
            .http
            .post(&self.feed_url)
            .timeout(FEED_TIMEOUT)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .header(REFERER, &self.page_url)
            .header(ORIGIN, &self.origin)
            .header(COOKIE, cookie_header(cookies));
        match csrf_token(cookies) {
            Some(token) => request = request.header(CSRF_HEADER, token),
            None => warn!("No anti-forgery token in cookie {CSRF_COOKIE}; sending feed request without it"),
        }

        request.json(&payload).send().await?.error_for_status()
    }

    /// Raw JSON feed response, logging in first.
    pub async fn fetch_raw(&self) -> Result<Value> {
        let cookies = self.session.acquire().await?;
        let response = self.request(&cookies).await?;
        response.json().await.context("feed response is not valid JSON")
    }
}

#[async_trait]
impl ListingSource for FeedClient {
    /// Fetch and normalize the current listings.
    ///
    /// A failed request is logged and yields no listings; login failures and
    /// undecodable bodies are returned as errors.
    async fn fetch(&self) -> Result<Vec<Listing>> {
        let cookies = self.session.acquire().await?;
        let response = match self.request(&cookies).await {
            Ok(response) => response,
            Err(e) => {
                error!("Feed request failed: {e}");
                return Ok(Vec::new());
            }
        };
        let body: Value = response
            .json()
            .await
            .context("feed response is not valid JSON")?;
        let listings = extract_listings(&body, &self.links);
        debug!("Fetched {} listings", listings.len());
        Ok(listings)
    }
}
