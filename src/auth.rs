use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::browser::{Browser, Condition, Locator};
use crate::config::{AccountConfig, BrowserConfig};
use crate::types::SessionCookies;
use crate::webdriver::{LOGIN_ARGS, WebDriver};

/// Maximum login attempts per acquisition.
const MAX_RETRIES: u32 = 3;

/// Base backoff delay between login attempts (doubles each attempt).
const BASE_BACKOFF: Duration = Duration::from_secs(2);

/// Upper bound for each wait during the login flow.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(20);

const COOKIE_ACCEPT: Locator = Locator::Css("#cookiescript_accept");
const USERNAME_INPUT: Locator = Locator::Css("#Input_UsernameVal");
const PASSWORD_INPUT: Locator = Locator::Css("#Input_PasswordVal");
const LOGIN_BUTTON: Locator = Locator::XPath("//button[contains(., 'Log in')]");
const LOGOUT_LINK: Locator = Locator::XPath("//a[contains(., 'Uitloggen')]");

/// Produces a fresh authenticated cookie set for the portal.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn acquire(&self) -> Result<SessionCookies>;
}

/// Logs into the portal with a throwaway browser and harvests its cookies.
pub struct PortalLogin {
    browser: BrowserConfig,
    account: AccountConfig,
    login_url: String,
}

impl PortalLogin {
    pub fn new(browser: BrowserConfig, account: AccountConfig, login_url: &str) -> Self {
        Self {
            browser,
            account,
            login_url: login_url.to_string(),
        }
    }

    async fn login_once(&self) -> Result<SessionCookies> {
        let mut driver = WebDriver::connect(&self.browser, LOGIN_ARGS)
            .await
            .context("failed to start login browser")?;
        let result = self.sign_in(&mut driver).await;
        if let Err(e) = driver.quit().await {
            warn!("Failed to close login browser: {e}");
        }
        result
    }

    async fn sign_in<B: Browser>(&self, browser: &mut B) -> Result<SessionCookies> {
        browser.goto(&self.login_url).await?;

        // The cookie banner only shows on a first visit.
        if let Ok(accept) = browser
            .wait_for(&COOKIE_ACCEPT, Condition::Clickable, LOGIN_TIMEOUT)
            .await
        {
            let _ = browser.click(&accept).await;
        }

        let username = browser
            .wait_for(&USERNAME_INPUT, Condition::Present, LOGIN_TIMEOUT)
            .await
            .context("login form did not load")?;
        browser.send_keys(&username, &self.account.username).await?;
        let password = browser.find(&PASSWORD_INPUT).await?;
        browser.send_keys(&password, &self.account.password).await?;

        let submit = browser.find(&LOGIN_BUTTON).await?;
        browser.execute("arguments[0].click();", &[&submit]).await?;

        browser
            .wait_for(&LOGOUT_LINK, Condition::Present, LOGIN_TIMEOUT)
            .await
            .context("login was not accepted")?;
        Ok(browser.cookies().await?)
    }
}

#[async_trait]
impl SessionSource for PortalLogin {
    async fn acquire(&self) -> Result<SessionCookies> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.login_once().await {
                Ok(cookies) => {
                    info!("Logged in ({} cookies)", cookies.len());
                    return Ok(cookies);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                    warn!("Login attempt {attempt}/{MAX_RETRIES} failed: {e:#}, retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e.context(format!("login failed after {MAX_RETRIES} attempts"))),
            }
        }
    }
}
