pub mod auth;
pub mod browser;
pub mod config;
pub mod feed;
pub mod filter;
pub mod normalize;
pub mod notifier;
pub mod reactor;
pub mod reporter;
pub mod retry;
pub mod runner;
pub mod state;
pub mod store;
pub mod types;
pub mod webdriver;

#[cfg(test)]
pub(crate) mod testkit;

/// MijnDAK Amsterdam portal root.
pub const PORTAL_BASE_URL: &str = "https://amsterdam.mijndak.nl";

/// Page the feed request claims to originate from (sent as `referer`).
pub const PORTAL_PAGE_URL: &str = "https://amsterdam.mijndak.nl/";

/// Screen-service action returning the listings that match the tenant profile.
pub const FEED_URL: &str = "https://amsterdam.mijndak.nl/screenservices/DAKWP/Overzicht/WoningOverzicht/DataActionHaalPassendAanbod";

/// Login form.
pub const LOGIN_URL: &str = "https://amsterdam.mijndak.nl/Inloggen";

/// Listing detail page; the listing id is passed as [`DETAIL_PARAM`].
pub const DETAIL_PAGE_URL: &str = "https://amsterdam.mijndak.nl/HuisDetails";
pub const DETAIL_PARAM: &str = "PublicatieId";

/// Telegram Bot API base URL.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Default chromedriver endpoint.
pub const WEBDRIVER_URL: &str = "http://localhost:9515";
