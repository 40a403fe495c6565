use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{Browser, BrowserError, Condition, Element, Locator};
use crate::notifier::{self, Notifier};
use crate::retry::{ClickAttempt, ClickRecovery, ClickStep, ScrollSearch, Step};
use crate::state::DedupState;
use crate::types::{Listing, SessionCookies};

/// Scroll steps before falling back to a final wait for the apply button.
const SCROLL_ATTEMPTS: u32 = 12;

/// Pause after each viewport scroll.
const SCROLL_PAUSE: Duration = Duration::from_millis(400);

/// Wait for the apply button to become clickable once it is visible.
const CLICKABLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Last wait for the apply button after scrolling gave up.
const FINAL_WAIT: Duration = Duration::from_secs(7);

/// Probe for an existing response on the detail page.
const WITHDRAW_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Wait for a known overlay to hide after its close link is clicked.
const OVERLAY_HIDE_TIMEOUT: Duration = Duration::from_secs(2);

/// Wait for a blocking dialog to go away after its button is clicked.
const DIALOG_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Settle time after loading a fresh session into the browser.
const SESSION_SETTLE: Duration = Duration::from_secs(2);

/// Overlay recoveries allowed after an intercepted click.
const MAX_CLICK_RECOVERIES: u32 = 1;

const WITHDRAW_BUTTON: Locator = Locator::XPath("//button[contains(., 'Reactie intrekken')]");
const APPLY_BUTTON: Locator = Locator::XPath(
    "//button[contains(@class, 'btn-primary') and contains(., 'Reageren op deze Woning')]",
);
const POPUP_DIALOG: Locator = Locator::Css("div.popup-dialog");
const DIALOG_BUTTON: Locator = Locator::Css("button");

const SCROLL_VIEWPORT: &str = "window.scrollBy(0, window.innerHeight);";
const SCROLL_INTO_VIEW: &str = "arguments[0].scrollIntoView({block: 'center'});";
const HIDE_ELEMENT: &str = "arguments[0].style.display='none';";

/// Overlay the portal shows on page load that can cover page controls.
struct Overlay {
    name: &'static str,
    close: Locator,
    container: Locator,
}

const KNOWN_OVERLAYS: &[Overlay] = &[
    Overlay {
        name: "notification popup",
        close: Locator::Css("#b2-scrollcontainer a"),
        container: Locator::Css("#b2-scrollcontainer"),
    },
    Overlay {
        name: "site notice",
        close: Locator::Css("#b43-b2-sitemelding a"),
        container: Locator::Css("#b43-b2-sitemelding"),
    },
];

/// How processing one listing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Already notified in an earlier cycle.
    Skipped,
    /// The portal already has a response for this listing.
    AlreadyResponded,
    /// Notified, but a response was recorded earlier so no attempt was made.
    Notified,
    Responded,
    /// Notified, but applying failed; a later cycle may retry.
    Failed,
}

/// Drives the portal's detail pages through a single browser session.
pub struct Reactor<B> {
    browser: B,
    base_url: String,
    cookie_domain: String,
    screenshot_dir: PathBuf,
}

impl<B: Browser> Reactor<B> {
    pub fn new(browser: B, base_url: &str, screenshot_dir: PathBuf) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .with_context(|| format!("invalid portal base url `{base_url}`"))?;
        let cookie_domain = parsed
            .host_str()
            .with_context(|| format!("portal base url `{base_url}` has no host"))?
            .to_string();
        Ok(Self {
            browser,
            base_url: base_url.to_string(),
            cookie_domain,
            screenshot_dir,
        })
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    /// Replace the browser's cookies with a freshly acquired session.
    pub async fn apply_session(&mut self, cookies: &SessionCookies) -> Result<()> {
        self.browser.goto(&self.base_url).await?;
        for (name, value) in cookies {
            self.browser
                .add_cookie(name, value, &self.cookie_domain)
                .await
                .with_context(|| format!("failed to set cookie {name}"))?;
        }
        self.browser.refresh().await?;
        tokio::time::sleep(SESSION_SETTLE).await;
        debug!("Applied {} session cookies", cookies.len());
        Ok(())
    }

    /// Run one listing through notify-and-apply.
    ///
    /// Anticipated UI failures are absorbed into [`Outcome::Failed`]; errors
    /// are returned only when the page itself cannot be driven.
    pub async fn process<N: Notifier + ?Sized>(
        &mut self,
        listing: &Listing,
        state: &mut DedupState,
        notifier: &N,
    ) -> Result<Outcome> {
        let id = listing.id.as_str();
        if state.is_notified(id) {
            return Ok(Outcome::Skipped);
        }

        self.browser
            .goto(&listing.detail_url)
            .await
            .with_context(|| format!("failed to open listing {id}"))?;
        self.dismiss_overlays().await;

        match self
            .browser
            .wait_for(&WITHDRAW_BUTTON, Condition::Present, WITHDRAW_PROBE_TIMEOUT)
            .await
        {
            Ok(_) => {
                info!("Skipping {id}: already responded");
                state.mark_already_responded(id);
                return Ok(Outcome::AlreadyResponded);
            }
            Err(BrowserError::Timeout(..)) => {}
            Err(e) => return Err(e).with_context(|| format!("failed to inspect listing {id}")),
        }

        notifier::notify(notifier, &notifier::listing_message(listing)).await;
        info!("Sent notification for {id}");
        state.mark_notified(id);

        if state.is_responded(id) {
            return Ok(Outcome::Notified);
        }

        if self.apply().await {
            info!("Responded to {id}");
            state.mark_responded(id);
            notifier::notify(notifier, &notifier::applied_message(id)).await;
            Ok(Outcome::Responded)
        } else {
            let path = self.capture_screenshot(id).await;
            warn!("Could not respond to {id}, see screenshot: {path}");
            Ok(Outcome::Failed)
        }
    }

    /// Close the portal's known overlays. Each is optional and best-effort.
    async fn dismiss_overlays(&mut self) {
        for overlay in KNOWN_OVERLAYS {
            let close = match self.browser.find(&overlay.close).await {
                Ok(close) => close,
                Err(BrowserError::NoSuchElement(_)) => continue,
                Err(e) => {
                    warn!("Could not close {}: {e}", overlay.name);
                    continue;
                }
            };
            let closed = match self.browser.click(&close).await {
                Ok(()) => {
                    self.browser
                        .wait_hidden(&overlay.container, OVERLAY_HIDE_TIMEOUT)
                        .await
                }
                Err(e) => Err(e),
            };
            match closed {
                Ok(()) => info!("Closed {}", overlay.name),
                Err(e) => warn!("Could not close {}: {e}", overlay.name),
            }
        }
    }

    /// Locate and click the apply button, clearing blocking dialogs once if needed.
    async fn apply(&mut self) -> bool {
        let Some(button) = self.locate_apply_button().await else {
            warn!("Apply button not found after scrolling");
            return false;
        };

        let mut recovery = ClickRecovery::new(MAX_CLICK_RECOVERIES);
        loop {
            let attempt = match self.browser.click(&button).await {
                Ok(()) => ClickAttempt::Clicked,
                Err(BrowserError::ClickIntercepted(_)) => ClickAttempt::Intercepted,
                Err(e) => {
                    warn!("Could not click the apply button: {e}");
                    ClickAttempt::Failed
                }
            };
            match recovery.next(attempt) {
                ClickStep::Done => return true,
                ClickStep::RecoverAndRetry => {
                    info!("A dialog blocks the apply button, closing dialogs and retrying");
                    self.close_blocking_dialogs().await;
                    let _ = self.browser.execute(SCROLL_INTO_VIEW, &[&button]).await;
                }
                ClickStep::GiveUp => {
                    if attempt == ClickAttempt::Intercepted {
                        warn!("Apply button still blocked after closing dialogs");
                    }
                    return false;
                }
            }
        }
    }

    /// Scroll one viewport at a time until the apply button is visible and clickable.
    async fn locate_apply_button(&mut self) -> Option<Element> {
        let mut search = ScrollSearch::new(SCROLL_ATTEMPTS);
        loop {
            let found = self.visible_apply_button().await;
            match search.record(found.is_some()) {
                Step::Done => return found,
                Step::Retry => {
                    let _ = self.browser.execute(SCROLL_VIEWPORT, &[]).await;
                    tokio::time::sleep(SCROLL_PAUSE).await;
                }
                Step::GiveUp => break,
            }
        }
        debug!("Apply button not visible after {} scrolls", search.attempts());
        self.browser
            .wait_for(&APPLY_BUTTON, Condition::Clickable, FINAL_WAIT)
            .await
            .ok()
    }

    async fn visible_apply_button(&mut self) -> Option<Element> {
        let button = self.browser.find(&APPLY_BUTTON).await.ok()?;
        if !self.browser.is_displayed(&button).await.unwrap_or(false) {
            return None;
        }
        let _ = self.browser.execute(SCROLL_INTO_VIEW, &[&button]).await;
        self.browser
            .wait_for(&APPLY_BUTTON, Condition::Clickable, CLICKABLE_TIMEOUT)
            .await
            .ok()
    }

    /// Close every visible dialog via its own button, hiding it when that fails.
    async fn close_blocking_dialogs(&mut self) {
        let dialogs = self.browser.find_all(&POPUP_DIALOG).await.unwrap_or_default();
        for dialog in dialogs {
            if !self.browser.is_displayed(&dialog).await.unwrap_or(false) {
                continue;
            }
            if let Err(e) = self.close_dialog(&dialog).await {
                debug!("Dialog close button did not work ({e}), hiding it");
                if let Err(e) = self.browser.execute(HIDE_ELEMENT, &[&dialog]).await {
                    warn!("Could not hide dialog: {e}");
                }
            }
        }
    }

    async fn close_dialog(&mut self, dialog: &Element) -> Result<(), BrowserError> {
        let button = self.browser.find_in(dialog, &DIALOG_BUTTON).await?;
        self.browser.click(&button).await?;
        self.browser.wait_gone(dialog, DIALOG_CLOSE_TIMEOUT).await
    }

    /// Save a screenshot for a failed listing; returns its path for the log.
    async fn capture_screenshot(&mut self, id: &str) -> String {
        let path = self.screenshot_dir.join(format!("debug_{id}.png"));
        let result = async {
            let png = self.browser.screenshot().await?;
            tokio::fs::create_dir_all(&self.screenshot_dir).await?;
            tokio::fs::write(&path, png).await?;
            anyhow::Ok(())
        }
        .await;
        if let Err(e) = result {
            warn!("Could not save screenshot {}: {e:#}", path.display());
        }
        path.display().to_string()
    }

    /// End the browser session.
    pub async fn quit(&mut self) {
        if let Err(e) = self.browser.quit().await {
            warn!("Failed to close browser: {e}");
        }
    }
}
