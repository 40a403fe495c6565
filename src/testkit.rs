//! In-memory fakes shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::auth::SessionSource;
use crate::browser::{Browser, BrowserError, BrowserResult, Element, Locator};
use crate::feed::ListingSource;
use crate::notifier::Notifier;
use crate::types::{Listing, ListingKind, SessionCookies, Span};

const DIALOG_SELECTOR: &str = "div.popup-dialog";
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

// ── listings ───────────────────────────────────────────────────────

pub fn unit_listing(id: &str, rent: f64, area: f64, rooms: u32) -> Listing {
    Listing {
        id: id.to_string(),
        kind: ListingKind::Unit,
        address: format!("Keizersgracht {id}"),
        photo: None,
        price: Span::Exact(rent),
        area: Span::Exact(area),
        rooms: Span::Exact(rooms),
        detail_url: format!("https://portal.example/HuisDetails?PublicatieId={id}"),
        raw: json!({ "Eenheid": { "EntiteitId": id } }),
    }
}

pub fn cluster_listing(id: &str, (min, max): (f64, f64)) -> Listing {
    Listing {
        id: id.to_string(),
        kind: ListingKind::Cluster,
        address: format!("Complex {id}"),
        photo: None,
        price: Span::between(min, max),
        area: Span::between(40.0, 60.0),
        rooms: Span::between(1, 3),
        detail_url: format!("https://portal.example/HuisDetails?PublicatieId={id}"),
        raw: json!({ "Cluster": { "PublicatieId": id } }),
    }
}

// ── browser ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct FakeElement {
    displayed: bool,
    enabled: bool,
}

impl Default for FakeElement {
    fn default() -> Self {
        Self {
            displayed: true,
            enabled: true,
        }
    }
}

/// Scriptable page where an element's id is the query that locates it.
///
/// Children found with [`Browser::find_in`] are keyed `"{parent}>{query}"`.
#[derive(Debug, Default)]
pub struct FakeBrowser {
    elements: HashMap<String, FakeElement>,
    /// Elements that appear once this many viewport scrolls have run.
    below_fold: HashMap<String, usize>,
    /// Per-element click results; `false` means intercepted.
    click_results: HashMap<String, VecDeque<bool>>,
    /// Clicking the key hides the value.
    hides_on_click: HashMap<String, String>,
    dialogs: Vec<String>,
    cookies: SessionCookies,
    scrolls: usize,

    pub fail_navigation: bool,
    pub visited: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub clicks: Vec<String>,
    pub scripts: Vec<String>,
    pub cookie_domains: HashMap<String, String>,
    pub refreshes: usize,
    pub screenshots: usize,
    pub quit: bool,
}

impl FakeBrowser {
    pub fn add_element(&mut self, query: &str) {
        self.elements.insert(query.to_string(), FakeElement::default());
    }

    pub fn add_element_after_scrolls(&mut self, query: &str, scrolls: usize) {
        self.below_fold.insert(query.to_string(), scrolls);
    }

    pub fn remove_element(&mut self, query: &str) {
        self.elements.remove(query);
    }

    pub fn set_displayed(&mut self, query: &str, displayed: bool) {
        self.elements.entry(query.to_string()).or_default().displayed = displayed;
    }

    pub fn set_enabled(&mut self, query: &str, enabled: bool) {
        self.elements.entry(query.to_string()).or_default().enabled = enabled;
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.elements.get(id).is_some_and(|e| e.displayed)
    }

    pub fn insert_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    /// Queue click outcomes for an element; `false` is an intercepted click.
    pub fn script_clicks(&mut self, query: &str, results: &[bool]) {
        self.click_results
            .insert(query.to_string(), results.iter().copied().collect());
    }

    pub fn hide_on_click(&mut self, clicked: &str, hidden: &str) {
        self.hides_on_click
            .insert(clicked.to_string(), hidden.to_string());
    }

    /// A visible popup dialog, optionally with a button that closes it.
    pub fn add_dialog(&mut self, id: &str, with_button: bool) {
        self.add_element(id);
        self.dialogs.push(id.to_string());
        if with_button {
            let button = format!("{id}>button");
            self.add_element(&button);
            self.hide_on_click(&button, id);
        }
    }

    pub fn scrolls(&self) -> usize {
        self.scrolls
    }

    fn element(&self, id: &str) -> BrowserResult<FakeElement> {
        self.elements
            .get(id)
            .copied()
            .ok_or(BrowserError::StaleElement)
    }

    fn scroll(&mut self) {
        self.scrolls += 1;
        let revealed: Vec<String> = self
            .below_fold
            .iter()
            .filter(|(_, after)| **after <= self.scrolls)
            .map(|(query, _)| query.clone())
            .collect();
        for query in revealed {
            self.below_fold.remove(&query);
            self.add_element(&query);
        }
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn goto(&mut self, url: &str) -> BrowserResult<()> {
        if self.fail_navigation {
            return Err(BrowserError::Protocol {
                code: "unknown error".into(),
                message: "net::ERR_NAME_NOT_RESOLVED".into(),
            });
        }
        self.visited.push(url.to_string());
        Ok(())
    }

    async fn refresh(&mut self) -> BrowserResult<()> {
        self.refreshes += 1;
        Ok(())
    }

    async fn add_cookie(&mut self, name: &str, value: &str, domain: &str) -> BrowserResult<()> {
        self.insert_cookie(name, value);
        self.cookie_domains
            .insert(name.to_string(), domain.to_string());
        Ok(())
    }

    async fn cookies(&mut self) -> BrowserResult<SessionCookies> {
        Ok(self.cookies.clone())
    }

    async fn find(&mut self, locator: &Locator) -> BrowserResult<Element> {
        let query = locator.query();
        if self.elements.contains_key(query) {
            Ok(Element(query.to_string()))
        } else {
            Err(BrowserError::NoSuchElement(locator.to_string()))
        }
    }

    async fn find_all(&mut self, locator: &Locator) -> BrowserResult<Vec<Element>> {
        if locator.query() == DIALOG_SELECTOR {
            return Ok(self.dialogs.iter().cloned().map(Element).collect());
        }
        Ok(self.find(locator).await.into_iter().collect())
    }

    async fn find_in(&mut self, parent: &Element, locator: &Locator) -> BrowserResult<Element> {
        let key = format!("{}>{}", parent.0, locator.query());
        if self.elements.contains_key(&key) {
            Ok(Element(key))
        } else {
            Err(BrowserError::NoSuchElement(locator.to_string()))
        }
    }

    async fn is_displayed(&mut self, element: &Element) -> BrowserResult<bool> {
        Ok(self.element(&element.0)?.displayed)
    }

    async fn is_enabled(&mut self, element: &Element) -> BrowserResult<bool> {
        Ok(self.element(&element.0)?.enabled)
    }

    async fn click(&mut self, element: &Element) -> BrowserResult<()> {
        self.element(&element.0)?;
        self.clicks.push(element.0.clone());
        let clicked = self
            .click_results
            .get_mut(&element.0)
            .and_then(VecDeque::pop_front)
            .unwrap_or(true);
        if !clicked {
            return Err(BrowserError::ClickIntercepted(format!(
                "{} is covered by another element",
                element.0
            )));
        }
        if let Some(hidden) = self.hides_on_click.get(&element.0).cloned() {
            self.set_displayed(&hidden, false);
        }
        Ok(())
    }

    async fn send_keys(&mut self, element: &Element, text: &str) -> BrowserResult<()> {
        self.element(&element.0)?;
        self.typed.push((element.0.clone(), text.to_string()));
        Ok(())
    }

    async fn execute(&mut self, script: &str, args: &[&Element]) -> BrowserResult<Value> {
        self.scripts.push(script.to_string());
        if script.contains("scrollBy") {
            self.scroll();
        }
        if script.contains("display='none'") {
            if let Some(target) = args.first() {
                self.set_displayed(&target.0, false);
            }
        }
        Ok(Value::Null)
    }

    async fn screenshot(&mut self) -> BrowserResult<Vec<u8>> {
        self.screenshots += 1;
        Ok(PNG_MAGIC.to_vec())
    }

    async fn quit(&mut self) -> BrowserResult<()> {
        self.quit = true;
        Ok(())
    }
}

// ── collaborators ──────────────────────────────────────────────────

/// Records every message; optionally reports each delivery as failed.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        if self.fail {
            bail!("chat unreachable");
        }
        Ok(())
    }
}

/// Session source that counts acquisitions.
pub struct CountingSession {
    cookies: Option<SessionCookies>,
    calls: AtomicUsize,
}

impl CountingSession {
    pub fn with_cookies(cookies: SessionCookies) -> Self {
        Self {
            cookies: Some(cookies),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            cookies: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionSource for CountingSession {
    async fn acquire(&self) -> Result<SessionCookies> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cookies
            .clone()
            .ok_or_else(|| anyhow!("login rejected"))
    }
}

/// Listing source replaying queued fetch results, then returning nothing.
#[derive(Default)]
pub struct QueuedFeed {
    results: Mutex<VecDeque<Result<Vec<Listing>>>>,
    calls: AtomicUsize,
}

impl QueuedFeed {
    pub fn push(&self, result: Result<Vec<Listing>>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingSource for QueuedFeed {
    async fn fetch(&self) -> Result<Vec<Listing>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[async_trait]
impl<T: ListingSource + ?Sized> ListingSource for std::sync::Arc<T> {
    async fn fetch(&self) -> Result<Vec<Listing>> {
        (**self).fetch().await
    }
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    async fn send(&self, text: &str) -> Result<()> {
        (**self).send(text).await
    }
}
