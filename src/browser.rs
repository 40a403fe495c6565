use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use crate::types::SessionCookies;

/// Interval between polls while waiting on page state.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How to find elements on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(&'static str),
    XPath(&'static str),
}

impl Locator {
    /// WebDriver location strategy name.
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::Css(_) => "css selector",
            Locator::XPath(_) => "xpath",
        }
    }

    pub fn query(&self) -> &'static str {
        match self {
            Locator::Css(q) | Locator::XPath(q) => q,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.strategy(), self.query())
    }
}

/// Opaque handle to an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Element(pub String);

/// What [`Browser::wait_for`] waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Present,
    Visible,
    /// Visible and enabled.
    Clickable,
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("no such element: {0}")]
    NoSuchElement(String),
    #[error("element click intercepted: {0}")]
    ClickIntercepted(String),
    #[error("stale element reference")]
    StaleElement,
    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),
    #[error("webdriver error `{code}`: {message}")]
    Protocol { code: String, message: String },
    #[error("webdriver transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// A single browser tab driven by the bot.
#[async_trait]
pub trait Browser: Send {
    async fn goto(&mut self, url: &str) -> BrowserResult<()>;
    async fn refresh(&mut self) -> BrowserResult<()>;
    async fn add_cookie(&mut self, name: &str, value: &str, domain: &str) -> BrowserResult<()>;
    async fn cookies(&mut self) -> BrowserResult<SessionCookies>;

    /// First element matching `locator`, or [`BrowserError::NoSuchElement`].
    async fn find(&mut self, locator: &Locator) -> BrowserResult<Element>;
    async fn find_all(&mut self, locator: &Locator) -> BrowserResult<Vec<Element>>;
    async fn find_in(&mut self, parent: &Element, locator: &Locator) -> BrowserResult<Element>;

    async fn is_displayed(&mut self, element: &Element) -> BrowserResult<bool>;
    async fn is_enabled(&mut self, element: &Element) -> BrowserResult<bool>;
    async fn click(&mut self, element: &Element) -> BrowserResult<()>;
    async fn send_keys(&mut self, element: &Element, text: &str) -> BrowserResult<()>;

    /// Run a script; elements in `args` are exposed as `arguments[i]`.
    async fn execute(&mut self, script: &str, args: &[&Element]) -> BrowserResult<Value>;

    /// PNG screenshot of the viewport.
    async fn screenshot(&mut self) -> BrowserResult<Vec<u8>>;
    async fn quit(&mut self) -> BrowserResult<()>;

    /// Poll until an element matching `locator` satisfies `condition`.
    async fn wait_for(
        &mut self,
        locator: &Locator,
        condition: Condition,
        timeout: Duration,
    ) -> BrowserResult<Element> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.find(locator).await {
                Ok(element) => {
                    let ready = match condition {
                        Condition::Present => Ok(true),
                        Condition::Visible => self.is_displayed(&element).await,
                        Condition::Clickable => match self.is_displayed(&element).await {
                            Ok(true) => self.is_enabled(&element).await,
                            other => other,
                        },
                    };
                    match ready {
                        Ok(true) => return Ok(element),
                        Ok(false) | Err(BrowserError::StaleElement) => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(BrowserError::NoSuchElement(_)) | Err(BrowserError::StaleElement) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(timeout, locator.to_string()));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Poll until no displayed element matches `locator`.
    async fn wait_hidden(&mut self, locator: &Locator, timeout: Duration) -> BrowserResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let hidden = match self.find(locator).await {
                Ok(element) => match self.is_displayed(&element).await {
                    Ok(displayed) => !displayed,
                    Err(BrowserError::StaleElement) => true,
                    Err(e) => return Err(e),
                },
                Err(BrowserError::NoSuchElement(_)) => true,
                Err(e) => return Err(e),
            };
            if hidden {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(timeout, format!("{locator} to hide")));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Poll until `element` is no longer displayed or has left the page.
    async fn wait_gone(&mut self, element: &Element, timeout: Duration) -> BrowserResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.is_displayed(element).await {
                Ok(false) | Err(BrowserError::StaleElement) => return Ok(()),
                Ok(true) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(timeout, "element to disappear".into()));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}
