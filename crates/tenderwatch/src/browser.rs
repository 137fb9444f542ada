use std::ffi::OsStr;
use std::thread;
use std::time::{Duration, Instant};

use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::Value;

/// How often bounded waits re-query the page.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Pause after scroll/click before re-querying the DOM.
pub(crate) const SETTLE_SHORT: Duration = Duration::from_millis(500);
/// Pause after the page reports itself loaded; the app keeps rendering.
pub(crate) const SETTLE_RENDER: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),
    #[error("browser error: {0}")]
    Browser(anyhow::Error),
}

impl From<anyhow::Error> for LookupError {
    fn from(e: anyhow::Error) -> Self {
        LookupError::Browser(e)
    }
}

/// Launches Chrome tuned for unattended scraping.
pub fn launch(headless: bool) -> anyhow::Result<Browser> {
    Browser::new(LaunchOptions {
        headless,
        sandbox: false,
        window_size: Some((1920, 1080)),
        args: vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-extensions"),
            OsStr::new(
                "--user-agent=Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            ),
        ],
        ..LaunchOptions::default()
    })
}

pub fn settle(duration: Duration) {
    thread::sleep(duration);
}

/// Blocks until the document reports `readyState == "complete"`.
pub fn wait_until_loaded(tab: &Tab, timeout: Duration) -> Result<(), LookupError> {
    let deadline = Instant::now() + timeout;
    loop {
        let state = tab
            .evaluate("document.readyState", false)
            .ok()
            .and_then(|obj| obj.value);
        if matches!(state, Some(Value::String(ref s)) if s == "complete") {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(LookupError::Timeout(
                timeout,
                "document.readyState == \"complete\"".to_string(),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// A display:none / zero-sized element counts as absent for every lookup.
pub fn is_displayed(element: &Element<'_>) -> bool {
    const JS: &str = "function() { \
        const rect = this.getBoundingClientRect(); \
        const style = window.getComputedStyle(this); \
        return rect.width > 0 && rect.height > 0 \
            && style.display !== 'none' && style.visibility !== 'hidden'; \
    }";
    matches!(
        element.call_js_fn(JS, Vec::new(), false).map(|obj| obj.value),
        Ok(Some(Value::Bool(true)))
    )
}

pub fn outer_html(element: &Element<'_>) -> Result<String, LookupError> {
    let ret = element.call_js_fn("function() { return this.outerHTML; }", Vec::new(), false)?;
    match ret.value {
        Some(Value::String(html)) => Ok(html),
        other => Err(LookupError::Browser(anyhow::anyhow!(
            "outerHTML evaluated to {other:?}"
        ))),
    }
}

/// First visible element matching any of the XPath queries, in query order.
pub fn find_first_visible_xpath<'t>(tab: &'t Tab, queries: &[String]) -> Option<Element<'t>> {
    for query in queries {
        for element in tab.find_elements_by_xpath(query).unwrap_or_default() {
            if is_displayed(&element) {
                log::debug!("matched {query}");
                return Some(element);
            }
        }
    }
    None
}

/// First visible element matching any of the CSS selectors, in list order.
pub fn find_first_visible_css<'t>(tab: &'t Tab, selectors: &[&str]) -> Option<Element<'t>> {
    for selector in selectors {
        for element in tab.find_elements(selector).unwrap_or_default() {
            if is_displayed(&element) {
                log::debug!("matched {selector}");
                return Some(element);
            }
        }
    }
    None
}

/// Polls all XPath queries round-robin until one yields a visible element
/// or the deadline passes.
pub fn wait_for_any_xpath<'t>(
    tab: &'t Tab,
    queries: &[String],
    timeout: Duration,
) -> Result<Element<'t>, LookupError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(element) = find_first_visible_xpath(tab, queries) {
            return Ok(element);
        }
        if Instant::now() >= deadline {
            return Err(LookupError::Timeout(timeout, queries.join(" | ")));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// CSS flavor of [`wait_for_any_xpath`].
pub fn wait_for_any_css<'t>(
    tab: &'t Tab,
    selectors: &[&str],
    timeout: Duration,
) -> Result<Element<'t>, LookupError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(element) = find_first_visible_css(tab, selectors) {
            return Ok(element);
        }
        if Instant::now() >= deadline {
            return Err(LookupError::Timeout(timeout, selectors.join(" | ")));
        }
        thread::sleep(POLL_INTERVAL);
    }
}
