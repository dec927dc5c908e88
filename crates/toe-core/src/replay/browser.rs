//! The browser seam the engine drives.
//!
//! A session is borrowed exclusively for a whole job. Implementations talk to
//! a browser the user already has open; none of them launch or close one.

use crate::error::{BrowserError, ReplayError};

#[allow(async_fn_in_trait)]
pub trait BrowserSession {
    /// Load `url` and wait for the document to finish loading.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<(), BrowserError>;

    async fn wait_visible(&mut self, selector: &str, timeout_ms: u64) -> Result<(), BrowserError>;

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError>;

    /// Replace the value of an input, textarea or contenteditable element.
    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), BrowserError>;

    /// Pick the `<option>` whose value is `value`.
    async fn select(&mut self, selector: &str, value: &str) -> Result<(), BrowserError>;

    /// Focus `selector` and press `key`.
    async fn press(&mut self, selector: &str, key: &str) -> Result<(), BrowserError>;

    /// Press Tab (or Shift+Tab) `count` times on whatever has focus.
    async fn tab(&mut self, count: u32, shift: bool) -> Result<(), BrowserError>;

    /// Submit the form matched by `selector`, falling back to the first form.
    async fn submit(&mut self, selector: &str, timeout_ms: u64) -> Result<(), BrowserError>;

    /// Whether `selector` is syntactically valid in the live page. Never
    /// touches page state.
    async fn has_selector(&mut self, selector: &str) -> Result<bool, BrowserError>;

    /// Visible text of the first match, `None` if nothing matches.
    async fn text_content(&mut self, selector: &str) -> Result<Option<String>, BrowserError>;

    async fn current_url(&mut self) -> Result<String, BrowserError>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError>;

    /// Hand the session back. The browser and its tabs stay open.
    async fn release(&mut self) {}
}

/// Something that can hand out a session on an already running browser.
#[allow(async_fn_in_trait)]
pub trait Attach {
    type Session: BrowserSession;

    /// Fails with [`ReplayError::Connectivity`] when nothing answers.
    async fn attach(&self) -> Result<Self::Session, ReplayError>;
}
