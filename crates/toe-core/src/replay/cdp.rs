//! Chrome DevTools Protocol client.
//!
//! Attaches to a browser the user started with `--remote-debugging-port`.
//! Discovery goes over the HTTP endpoint (`/json/version`, `/json/list`),
//! then everything else is JSON-RPC over the page target's websocket.
//! Page interaction is done with small `Runtime.evaluate` snippets; keyboard
//! input goes through `Input.dispatchKeyEvent` so focus handling stays native.

use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::browser::{Attach, BrowserSession};
use crate::error::{BrowserError, ReplayError};

/// Ports tried when the configured endpoint does not answer.
pub const SCAN_PORTS: std::ops::RangeInclusive<u16> = 9222..=9225;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(20);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Modifier bit for Shift in `Input.dispatchKeyEvent`.
const SHIFT: u8 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// `http://host:port`, discovered through `/json/list`.
    Http(Url),
    /// A page's debugger URL, used as is.
    WebSocket(String),
}

/// Where to find the DevTools endpoint.
#[derive(Debug, Clone)]
pub struct CdpEndpoint {
    target: Target,
    scan_ports: bool,
    call_timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Deserialize)]
struct BrowserVersion {
    #[serde(rename = "Browser", default)]
    browser: String,
    #[serde(rename = "Protocol-Version", default)]
    protocol_version: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TargetInfo {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    url: String,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    web_socket_debugger_url: Option<String>,
}

impl CdpEndpoint {
    /// Accepts `http://host:port`, `host:port` or a `ws://` debugger URL.
    pub fn parse(addr: &str, scan_ports: bool) -> Result<Self, ReplayError> {
        let addr = addr.trim();
        let invalid = |e: String| ReplayError::Connectivity(format!("invalid endpoint '{addr}': {e}"));

        let target = if addr.starts_with("ws://") || addr.starts_with("wss://") {
            Url::parse(addr).map_err(|e| invalid(e.to_string()))?;
            Target::WebSocket(addr.to_string())
        } else {
            let with_scheme = if addr.starts_with("http://") || addr.starts_with("https://") {
                addr.to_string()
            } else {
                format!("http://{addr}")
            };
            let url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
            if url.host_str().is_none() {
                return Err(invalid("missing host".into()));
            }
            Target::Http(url)
        };

        let client = reqwest::Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .build()
            .map_err(|e| ReplayError::Connectivity(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            target,
            scan_ports,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            client,
        })
    }

    /// How long any single DevTools command may go unanswered.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Base URLs to try, the configured one first.
    fn candidates(&self) -> Vec<Url> {
        let Target::Http(base) = &self.target else {
            return Vec::new();
        };
        let mut out = vec![base.clone()];
        if self.scan_ports {
            for port in SCAN_PORTS {
                if base.port_or_known_default() == Some(port) {
                    continue;
                }
                let mut url = base.clone();
                if url.set_port(Some(port)).is_ok() {
                    out.push(url);
                }
            }
        }
        out
    }

    async fn fetch_version(&self, base: &Url) -> Result<BrowserVersion, String> {
        let url = base.join("json/version").map_err(|e| e.to_string())?;
        let resp = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        resp.json().await.map_err(|e| e.to_string())
    }

    /// Websocket URL of a page target, opening a blank tab if there is none.
    async fn page_socket(&self, base: &Url) -> Result<String, String> {
        let list = base.join("json/list").map_err(|e| e.to_string())?;
        let resp = self.client.get(list).send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let targets: Vec<TargetInfo> = resp.json().await.map_err(|e| e.to_string())?;

        if let Some(page) = targets
            .iter()
            .find(|t| t.kind == "page" && t.web_socket_debugger_url.is_some())
        {
            tracing::debug!(url = %page.url, "Using existing page target");
            return page
                .web_socket_debugger_url
                .clone()
                .ok_or_else(|| "page without debugger url".to_string());
        }

        let mut new_tab = base.join("json/new").map_err(|e| e.to_string())?;
        new_tab.set_query(Some("about:blank"));
        let resp = self.client.put(new_tab).send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("no page target and /json/new failed: HTTP {}", resp.status()));
        }
        let created: TargetInfo = resp.json().await.map_err(|e| e.to_string())?;
        tracing::info!("No page target found, opened a blank tab");
        created
            .web_socket_debugger_url
            .ok_or_else(|| "new tab has no debugger url".to_string())
    }

    /// Resolve the websocket URL of a page target, plus the HTTP endpoint
    /// that answered (none for a direct `ws://` target).
    pub async fn resolve(&self) -> Result<(Option<Url>, String), ReplayError> {
        if let Target::WebSocket(ws) = &self.target {
            return Ok((None, ws.clone()));
        }
        let mut tried = Vec::new();
        for base in self.candidates() {
            match self.page_socket(&base).await {
                Ok(ws) => {
                    tracing::info!(endpoint = %base, "Found DevTools endpoint");
                    return Ok((Some(base), ws));
                }
                Err(e) => {
                    tracing::debug!(endpoint = %base, error = %e, "DevTools endpoint did not answer");
                    tried.push(format!("{base} ({e})"));
                }
            }
        }
        Err(unreachable(&tried))
    }
}

fn unreachable(tried: &[String]) -> ReplayError {
    ReplayError::Connectivity(format!(
        "no DevTools endpoint answered; start the browser with --remote-debugging-port. Tried: {}",
        tried.join(", ")
    ))
}

impl Attach for CdpEndpoint {
    type Session = CdpSession;

    async fn attach(&self) -> Result<CdpSession, ReplayError> {
        let (base, ws_url) = self.resolve().await?;
        if let Some(base) = base {
            match self.fetch_version(&base).await {
                Ok(version) => tracing::info!(
                    browser = %version.browser,
                    protocol = %version.protocol_version,
                    "Attached to browser"
                ),
                Err(e) => tracing::debug!(error = %e, "Browser version unavailable"),
            }
        }
        CdpSession::connect(&ws_url, self.call_timeout).await
    }
}

/// One page target's websocket. [`BrowserSession::release`] closes the
/// socket; the browser and its tabs are left alone.
pub struct CdpSession {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
    call_timeout: Duration,
}

impl CdpSession {
    pub async fn connect(ws_url: &str, call_timeout: Duration) -> Result<Self, ReplayError> {
        let (ws, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| ReplayError::Connectivity(format!("{ws_url}: {e}")))?;
        Ok(Self {
            ws,
            next_id: 0,
            call_timeout,
        })
    }

    /// Send one command and wait for its reply, skipping events.
    ///
    /// A browser that stays silent past the call timeout fails with
    /// [`BrowserError::Unresponsive`].
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, BrowserError> {
        let timeout = self.call_timeout;
        match tokio::time::timeout(timeout, self.exchange(method, params)).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Unresponsive {
                method: method.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn exchange(&mut self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.next_id += 1;
        let id = self.next_id;
        let request = json!({ "id": id, "method": method, "params": params });
        self.ws
            .send(Message::Text(request.to_string()))
            .await
            .map_err(|e| BrowserError::Disconnected(e.to_string()))?;

        while let Some(frame) = self.ws.next().await {
            let text = match frame.map_err(|e| BrowserError::Disconnected(e.to_string()))? {
                Message::Text(text) => text,
                Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Message::Close(_) => break,
                _ => continue,
            };
            let Ok(reply) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            if reply.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(error) = reply.get("error") {
                return Err(BrowserError::Protocol {
                    method: method.to_string(),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                });
            }
            return Ok(reply.get("result").cloned().unwrap_or(Value::Null));
        }
        Err(BrowserError::Disconnected("websocket closed".into()))
    }

    /// Evaluate `expression` in the page and return its JSON value.
    pub async fn evaluate(&mut self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("uncaught exception");
            return Err(BrowserError::Script(message.to_string()));
        }
        Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    /// Run `body` with `el` bound to the first match of `selector`.
    async fn on_element(&mut self, selector: &str, body: &str) -> Result<(), BrowserError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; {body} return true; }})()",
            js_str(selector)
        );
        match self.evaluate(&expression).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(BrowserError::ElementNotFound(selector.to_string())),
        }
    }

    async fn wait_ready(&mut self, what: &str, timeout_ms: u64) -> Result<(), BrowserError> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            // The context is torn down mid-navigation; treat that as not ready yet.
            if let Ok(Value::String(state)) = self.evaluate("document.readyState").await {
                if state == "complete" {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: format!("page load of {what}"),
                    timeout_ms,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn dispatch_key(&mut self, key: &str, modifiers: u8) -> Result<(), BrowserError> {
        let def = KeyDefinition::of(key);
        let mut down = json!({
            "type": if def.text.is_some() { "keyDown" } else { "rawKeyDown" },
            "key": def.key,
            "code": def.code,
            "windowsVirtualKeyCode": def.key_code,
            "nativeVirtualKeyCode": def.key_code,
            "modifiers": modifiers,
        });
        if let Some(text) = &def.text {
            down["text"] = Value::String(text.clone());
        }
        self.call("Input.dispatchKeyEvent", down).await?;
        self.call(
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyUp",
                "key": def.key,
                "code": def.code,
                "windowsVirtualKeyCode": def.key_code,
                "nativeVirtualKeyCode": def.key_code,
                "modifiers": modifiers,
            }),
        )
        .await?;
        Ok(())
    }
}

/// JSON string literal, which is also a valid JS string literal.
fn js_str(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyDefinition {
    key: String,
    code: String,
    key_code: u32,
    text: Option<String>,
}

impl KeyDefinition {
    fn named(key: &str, key_code: u32, text: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            code: key.to_string(),
            key_code,
            text: text.map(str::to_string),
        }
    }

    fn of(key: &str) -> Self {
        match key {
            "Enter" => Self::named("Enter", 13, Some("\r")),
            "Tab" => Self::named("Tab", 9, None),
            "Escape" => Self::named("Escape", 27, None),
            "Backspace" => Self::named("Backspace", 8, None),
            "ArrowUp" => Self::named("ArrowUp", 38, None),
            "ArrowDown" => Self::named("ArrowDown", 40, None),
            " " | "Space" => Self {
                key: " ".into(),
                code: "Space".into(),
                key_code: 32,
                text: Some(" ".into()),
            },
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphanumeric() => {
                        let upper = c.to_ascii_uppercase();
                        let code = if c.is_ascii_digit() {
                            format!("Digit{c}")
                        } else {
                            format!("Key{upper}")
                        };
                        Self {
                            key: c.to_string(),
                            code,
                            key_code: upper as u32,
                            text: Some(c.to_string()),
                        }
                    }
                    _ => Self::named(other, 0, None),
                }
            }
        }
    }
}

impl BrowserSession for CdpSession {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<(), BrowserError> {
        let result = self.call("Page.navigate", json!({ "url": url })).await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            if !error.is_empty() {
                return Err(BrowserError::Protocol {
                    method: "Page.navigate".into(),
                    message: format!("{url}: {error}"),
                });
            }
        }
        self.wait_ready(url, timeout_ms).await
    }

    async fn wait_visible(&mut self, selector: &str, timeout_ms: u64) -> Result<(), BrowserError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; \
             const r = el.getBoundingClientRect(); const st = getComputedStyle(el); \
             return r.width > 0 && r.height > 0 && st.visibility !== 'hidden' && st.display !== 'none'; }})()",
            js_str(selector)
        );
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.evaluate(&expression).await? == Value::Bool(true) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: selector.to_string(),
                    timeout_ms,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        self.on_element(selector, "el.scrollIntoView({block: 'center'}); el.click();")
            .await
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let body = format!(
            "el.focus(); const v = {}; \
             if (el.isContentEditable) {{ el.textContent = v; }} else {{ \
               const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype; \
               Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, v); }} \
             el.dispatchEvent(new Event('input', {{bubbles: true}})); \
             el.dispatchEvent(new Event('change', {{bubbles: true}}));",
            js_str(value)
        );
        self.on_element(selector, &body).await
    }

    async fn select(&mut self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let body = format!(
            "const v = {}; \
             const opt = Array.from(el.options || []).find(o => o.value === v || o.text.trim() === v); \
             if (!opt) throw new Error('no option ' + v); \
             el.value = opt.value; \
             el.dispatchEvent(new Event('change', {{bubbles: true}}));",
            js_str(value)
        );
        self.on_element(selector, &body).await
    }

    async fn press(&mut self, selector: &str, key: &str) -> Result<(), BrowserError> {
        self.on_element(selector, "el.focus();").await?;
        self.dispatch_key(key, 0).await
    }

    async fn tab(&mut self, count: u32, shift: bool) -> Result<(), BrowserError> {
        let modifiers = if shift { SHIFT } else { 0 };
        for _ in 0..count {
            self.dispatch_key("Tab", modifiers).await?;
        }
        Ok(())
    }

    async fn submit(&mut self, selector: &str, timeout_ms: u64) -> Result<(), BrowserError> {
        let expression = format!(
            "(() => {{ const f = document.querySelector({}) || document.forms[0]; if (!f) return false; \
             const form = f.tagName === 'FORM' ? f : (f.form || f.closest('form')); if (!form) return false; \
             if (form.requestSubmit) {{ form.requestSubmit(); }} else {{ form.submit(); }} return true; }})()",
            js_str(selector)
        );
        if self.evaluate(&expression).await? != Value::Bool(true) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
        self.wait_ready("form submission", timeout_ms).await
    }

    async fn has_selector(&mut self, selector: &str) -> Result<bool, BrowserError> {
        let expression = format!(
            "(() => {{ try {{ document.querySelector({}); return true; }} catch (e) {{ return false; }} }})()",
            js_str(selector)
        );
        Ok(self.evaluate(&expression).await? == Value::Bool(true))
    }

    async fn text_content(&mut self, selector: &str) -> Result<Option<String>, BrowserError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); return el ? (el.innerText ?? el.textContent) : null; }})()",
            js_str(selector)
        );
        Ok(match self.evaluate(&expression).await? {
            Value::String(text) => Some(text),
            _ => None,
        })
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        match self.evaluate("window.location.href").await? {
            Value::String(url) => Ok(url),
            other => Err(BrowserError::Script(format!("unexpected location value: {other}"))),
        }
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        let result = self
            .call("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let data = result.get("data").and_then(Value::as_str).unwrap_or_default();
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| BrowserError::Protocol {
                method: "Page.captureScreenshot".into(),
                message: e.to_string(),
            })
    }

    async fn release(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!(error = %e, "DevTools socket did not close cleanly");
        }
    }
}
