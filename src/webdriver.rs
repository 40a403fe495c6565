//! Minimal W3C WebDriver client (chromedriver) implementing [`Browser`].

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::debug;

use crate::browser::{Browser, BrowserError, BrowserResult, Element, Locator};
use crate::config::BrowserConfig;
use crate::types::SessionCookies;

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Chrome flags for the bot's long-lived browser.
pub const BOT_ARGS: &[&str] = &["--ignore-certificate-errors", "--window-size=1280,1024"];

/// Chrome flags for short-lived login browsers.
pub const LOGIN_ARGS: &[&str] = &[
    "--disable-gpu",
    "--no-sandbox",
    "--blink-settings=imagesEnabled=false",
];

/// One WebDriver session.
pub struct WebDriver {
    http: reqwest::Client,
    session_url: String,
}

impl WebDriver {
    /// Start a new Chrome session on the configured WebDriver server.
    pub async fn connect(config: &BrowserConfig, extra_args: &[&str]) -> BrowserResult<Self> {
        let mut args: Vec<&str> = extra_args.to_vec();
        if config.headless {
            args.push("--headless=new");
        }
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "acceptInsecureCerts": true,
                    "goog:chromeOptions": { "args": args }
                }
            }
        });

        let http = reqwest::Client::new();
        let server = config.webdriver_url.trim_end_matches('/');
        let response = http
            .post(format!("{server}/session"))
            .json(&capabilities)
            .send()
            .await?;
        let value = unwrap_value(response).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol {
                code: "invalid session".into(),
                message: format!("no sessionId in {value}"),
            })?;
        debug!("WebDriver session {session_id} started");

        Ok(Self {
            session_url: format!("{server}/session/{session_id}"),
            http,
        })
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> BrowserResult<Value> {
        let mut request = self
            .http
            .request(method.clone(), format!("{}{path}", self.session_url));
        // POST commands require a JSON body even when they take no parameters.
        if method == Method::POST {
            request = request.json(&body.unwrap_or_else(|| json!({})));
        }
        unwrap_value(request.send().await?).await
    }

    async fn locate(&self, path: &str, locator: &Locator) -> BrowserResult<Value> {
        let body = json!({ "using": locator.strategy(), "value": locator.query() });
        match self.command(Method::POST, path, Some(body)).await {
            Err(BrowserError::NoSuchElement(_)) => {
                Err(BrowserError::NoSuchElement(locator.to_string()))
            }
            other => other,
        }
    }
}

/// Extract `value` from a WebDriver response, mapping error payloads.
async fn unwrap_value(response: reqwest::Response) -> BrowserResult<Value> {
    let status = response.status();
    let body: Value = response.json().await?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }

    let code = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(match code.as_str() {
        "no such element" => BrowserError::NoSuchElement(message),
        "element click intercepted" => BrowserError::ClickIntercepted(message),
        "stale element reference" => BrowserError::StaleElement,
        _ => BrowserError::Protocol { code, message },
    })
}

fn element_from(value: &Value) -> BrowserResult<Element> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| Element(id.to_string()))
        .ok_or_else(|| BrowserError::Protocol {
            code: "invalid element".into(),
            message: format!("not an element reference: {value}"),
        })
}

fn element_ref(element: &Element) -> Value {
    json!({ ELEMENT_KEY: element.0 })
}

#[async_trait]
impl Browser for WebDriver {
    async fn goto(&mut self, url: &str) -> BrowserResult<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(drop)
    }

    async fn refresh(&mut self) -> BrowserResult<()> {
        self.command(Method::POST, "/refresh", None).await.map(drop)
    }

    async fn add_cookie(&mut self, name: &str, value: &str, domain: &str) -> BrowserResult<()> {
        let cookie = json!({
            "cookie": { "name": name, "value": value, "domain": domain, "path": "/" }
        });
        self.command(Method::POST, "/cookie", Some(cookie)).await.map(drop)
    }

    async fn cookies(&mut self) -> BrowserResult<SessionCookies> {
        let value = self.command(Method::GET, "/cookie", None).await?;
        Ok(value
            .as_array()
            .map(|cookies| {
                cookies
                    .iter()
                    .filter_map(|c| {
                        let name = c.get("name")?.as_str()?;
                        let value = c.get("value")?.as_str()?;
                        Some((name.to_string(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find(&mut self, locator: &Locator) -> BrowserResult<Element> {
        let value = self.locate("/element", locator).await?;
        element_from(&value)
    }

    async fn find_all(&mut self, locator: &Locator) -> BrowserResult<Vec<Element>> {
        let value = self.locate("/elements", locator).await?;
        value
            .as_array()
            .map(|items| items.iter().map(element_from).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn find_in(&mut self, parent: &Element, locator: &Locator) -> BrowserResult<Element> {
        let path = format!("/element/{}/element", parent.0);
        let value = self.locate(&path, locator).await?;
        element_from(&value)
    }

    async fn is_displayed(&mut self, element: &Element) -> BrowserResult<bool> {
        let path = format!("/element/{}/displayed", element.0);
        let value = self.command(Method::GET, &path, None).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&mut self, element: &Element) -> BrowserResult<bool> {
        let path = format!("/element/{}/enabled", element.0);
        let value = self.command(Method::GET, &path, None).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn click(&mut self, element: &Element) -> BrowserResult<()> {
        let path = format!("/element/{}/click", element.0);
        self.command(Method::POST, &path, None).await.map(drop)
    }

    async fn send_keys(&mut self, element: &Element, text: &str) -> BrowserResult<()> {
        let path = format!("/element/{}/value", element.0);
        self.command(Method::POST, &path, Some(json!({ "text": text })))
            .await
            .map(drop)
    }

    async fn execute(&mut self, script: &str, args: &[&Element]) -> BrowserResult<Value> {
        let args: Vec<Value> = args.iter().map(|e| element_ref(e)).collect();
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn screenshot(&mut self) -> BrowserResult<Vec<u8>> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value.as_str().unwrap_or_default();
        STANDARD.decode(encoded).map_err(|e| BrowserError::Protocol {
            code: "invalid screenshot".into(),
            message: e.to_string(),
        })
    }

    async fn quit(&mut self) -> BrowserResult<()> {
        self.command(Method::DELETE, "", None).await.map(drop)
    }
}
