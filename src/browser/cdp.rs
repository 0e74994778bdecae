use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, InsertTextParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures_util::StreamExt;
use rand::Rng;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::instrument;

use crate::browser::driver::PageDriver;
use crate::config::{Env, SessionConfig};

const VIEWPORT_WIDTH: u32 = 1280;
const VIEWPORT_HEIGHT: u32 = 720;
const PAGE_POLL_MS: u64 = 100;
const NETWORK_QUIET_WINDOW_MS: u64 = 500;
const LAUNCH_DEADLINE: Duration = Duration::from_secs(30);

/// Chrome switches for driven sessions: nothing that announces automation,
/// no first-run chrome, and none of the background throttling that keeps a
/// driven page from settling.
const STEALTH_ARGS: &[&str] = &[
    // surfaces that give the session away or interrupt it
    "--disable-infobars",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-default-apps",
    "--disable-extensions",
    "--disable-component-extensions-with-background-pages",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-hang-monitor",
    "--disable-client-side-phishing-detection",
    // keep background work from starving the page under inspection
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-ipc-flooding-protection",
    // deterministic rendering and locale
    "--enable-features=NetworkService,NetworkServiceInProcess",
    "--disable-features=TranslateUI",
    "--force-color-profile=srgb",
    "--lang=en_US",
    // no metrics, crash reporting, sync or keychain prompts
    "--metrics-recording-only",
    "--disable-breakpad",
    "--disable-sync",
    "--disable-dev-shm-usage",
    "--password-store=basic",
    "--use-mock-keychain",
];

/// Chromiumoxide-backed driver for the active tab.
///
/// Owns the browser and exactly one page; when the act loop adopts a new
/// tab's URL the page handle stays the same and only navigates.
pub struct CdpDriver {
    browser: Mutex<Option<Browser>>,
    page: Mutex<Option<Page>>,
}

impl CdpDriver {
    /// Provision a browser according to `config.env` and open one page.
    pub async fn create(config: &SessionConfig) -> Result<Self> {
        match config.env {
            Env::Local => Self::launch(config.headless).await,
            Env::Remote => {
                let ws_url = std::env::var("PAGEPILOT_WS_URL")
                    .context("PAGEPILOT_WS_URL is required for remote sessions")?;
                Self::connect(&ws_url).await
            }
        }
    }

    /// Launch a local Chrome instance.
    #[instrument(skip_all, fields(headless = headless))]
    pub async fn launch(headless: bool) -> Result<Self> {
        // Assemble the switch list ourselves: chromiumoxide's defaults carry
        // --enable-automation, which pages can sniff.
        let mut builder = BrowserConfig::builder()
            .disable_default_args()
            .args(STEALTH_ARGS.iter().copied());

        if headless {
            builder = builder.window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT);
        } else {
            builder = builder.with_head();
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!("Invalid browser configuration: {}", e))?;

        // Bound the launch: a missing or wedged Chrome binary otherwise
        // stalls the whole session setup.
        let (browser, handler) = timeout(LAUNCH_DEADLINE, Browser::launch(config))
            .await
            .map_err(|_| anyhow!("Chrome did not come up within {:?}", LAUNCH_DEADLINE))?
            .map_err(|e| anyhow!("Chrome launch failed: {}", e))?;

        Self::drive_cdp_events(handler);
        let page = Self::startup_page(&browser).await?;

        if headless {
            let emulation = SetDeviceMetricsOverrideParams::builder()
                .width(VIEWPORT_WIDTH as i64)
                .height(VIEWPORT_HEIGHT as i64)
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(|e| anyhow!("Viewport override rejected: {}", e))?;
            page.execute(emulation)
                .await
                .map_err(|e| anyhow!("Could not size the viewport: {}", e))?;
        }

        tracing::info!(headless, "Browser launched");
        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page: Mutex::new(Some(page)),
        })
    }

    /// Attach to a remote browser over its devtools websocket.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (browser, handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| anyhow!("Websocket connection to {} failed: {}", ws_url, e))?;

        Self::drive_cdp_events(handler);
        let page = Self::startup_page(&browser).await?;

        tracing::info!(ws_url, "Attached to remote browser");
        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page: Mutex::new(Some(page)),
        })
    }

    /// The CDP connection only makes progress while its event stream is
    /// polled; park that work on its own task.
    fn drive_cdp_events(mut handler: chromiumoxide::Handler) {
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                tracing::trace!("Browser event: {:?}", event);
            }
        });
    }

    /// Adopt the tab the browser opened on startup, or open a blank one if
    /// none survived.
    async fn startup_page(browser: &Browser) -> Result<Page> {
        if let Ok(pages) = browser.pages().await {
            if let Some(page) = pages.into_iter().next() {
                return Ok(page);
            }
        }
        browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Could not open a starting page: {}", e))
    }

    async fn active_page(&self) -> Result<Page> {
        self.page
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow!("No active page"))
    }
}

/// Strip the `xpath=` prefix the loops attach to every selector.
fn xpath_of(selector: &str) -> &str {
    selector.strip_prefix("xpath=").unwrap_or(selector)
}

/// JS expression resolving the first element matching `xpath` into `node`,
/// then running `body`.
fn on_xpath(xpath: &str, body: &str) -> String {
    let literal = serde_json::to_string(xpath).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(() => {{
    const xpath = {literal};
    const node = document.evaluate(xpath, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
    if (!node) {{ throw new Error('No element matches xpath: ' + xpath); }}
    {body}
}})()"#
    )
}

const CLICK_BODY: &str = r#"
    node.scrollIntoView({ behavior: 'instant', block: 'center' });
    const rect = node.getBoundingClientRect();
    const x = rect.left + rect.width / 2;
    const y = rect.top + rect.height / 2;
    for (const type of ['mousedown', 'mouseup', 'click']) {
        node.dispatchEvent(new MouseEvent(type, {
            bubbles: true, cancelable: true, view: window,
            clientX: x, clientY: y, button: 0
        }));
    }
    return true;
"#;

const HOVER_BODY: &str = r#"
    node.scrollIntoView({ block: 'center' });
    node.dispatchEvent(new MouseEvent('mouseenter', { bubbles: true }));
    node.dispatchEvent(new MouseEvent('mouseover', { bubbles: true }));
    return true;
"#;

const CLEAR_BODY: &str = r#"
    node.focus();
    if ('value' in node) {
        node.value = '';
        node.dispatchEvent(new Event('input', { bubbles: true, cancelable: true }));
    } else if (node.isContentEditable) {
        node.textContent = '';
    }
    return true;
"#;

#[async_trait]
impl PageDriver for CdpDriver {
    #[instrument(skip(self), fields(url = %url))]
    async fn goto(&self, url: &str) -> Result<()> {
        let page = self.active_page().await?;
        page.goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let page = self.active_page().await?;
        page.url()
            .await
            .map_err(|e| anyhow!("Failed to get URL: {}", e))?
            .ok_or_else(|| anyhow!("URL is None"))
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let page = self.active_page().await?;
        // await_promise so the injected async page functions resolve fully
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| anyhow!("Failed to build evaluate params: {}", e))?;
        let result = page
            .evaluate(params)
            .await
            .map_err(|e| anyhow!("Failed to evaluate script: {}", e))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.evaluate(&on_xpath(xpath_of(selector), CLICK_BODY))
            .await
            .map_err(|e| anyhow!("Failed to click '{}': {}", selector, e))?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        self.evaluate(&on_xpath(xpath_of(selector), CLEAR_BODY))
            .await
            .map_err(|e| anyhow!("Failed to clear '{}': {}", selector, e))?;
        self.click(selector).await?;

        let page = self.active_page().await?;
        for ch in text.chars() {
            page.execute(InsertTextParams {
                text: ch.to_string(),
            })
            .await
            .map_err(|e| anyhow!("Failed to type into '{}': {}", selector, e))?;
            // Human-like cadence; also sidesteps naive anti-automation checks.
            let delay = rand::thread_rng().gen_range(25..=75);
            sleep(Duration::from_millis(delay)).await;
        }
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<()> {
        let page = self.active_page().await?;

        let (key_code, code, text, key_name) = key_event_parts(key)?;

        let mut down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key_name.clone())
            .code(code.clone())
            .windows_virtual_key_code(key_code)
            .native_virtual_key_code(key_code);
        if !text.is_empty() {
            down = down.text(text);
        }
        let down = down
            .build()
            .map_err(|e| anyhow!("Failed to build key down params: {}", e))?;
        page.execute(down)
            .await
            .map_err(|e| anyhow!("Failed to dispatch key down: {}", e))?;

        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key_name)
            .code(code)
            .windows_virtual_key_code(key_code)
            .native_virtual_key_code(key_code)
            .build()
            .map_err(|e| anyhow!("Failed to build key up params: {}", e))?;
        page.execute(up)
            .await
            .map_err(|e| anyhow!("Failed to dispatch key up: {}", e))?;

        Ok(())
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<()> {
        self.evaluate(&on_xpath(
            xpath_of(selector),
            "node.scrollIntoView({ behavior: 'smooth', block: 'center' }); return true;",
        ))
        .await
        .map_err(|e| anyhow!("Failed to scroll '{}' into view: {}", selector, e))?;
        Ok(())
    }

    async fn hover(&self, selector: &str) -> Result<()> {
        self.evaluate(&on_xpath(xpath_of(selector), HOVER_BODY))
            .await
            .map_err(|e| anyhow!("Failed to hover '{}': {}", selector, e))?;
        Ok(())
    }

    async fn check(&self, selector: &str) -> Result<()> {
        self.evaluate(&on_xpath(
            xpath_of(selector),
            "if (!node.checked) { node.click(); } return true;",
        ))
        .await
        .map_err(|e| anyhow!("Failed to check '{}': {}", selector, e))?;
        Ok(())
    }

    async fn uncheck(&self, selector: &str) -> Result<()> {
        self.evaluate(&on_xpath(
            xpath_of(selector),
            "if (node.checked) { node.click(); } return true;",
        ))
        .await
        .map_err(|e| anyhow!("Failed to uncheck '{}': {}", selector, e))?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let literal = serde_json::to_string(value)?;
        let body = format!(
            r#"
    const wanted = {literal};
    if (node.tagName !== 'SELECT') {{ throw new Error('Element is not a SELECT'); }}
    for (const opt of node.options) {{
        if (opt.value === wanted || opt.text === wanted) {{
            node.value = opt.value;
            node.dispatchEvent(new Event('input', {{ bubbles: true }}));
            node.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
        }}
    }}
    throw new Error('Option not found: ' + wanted);
"#
        );
        self.evaluate(&on_xpath(xpath_of(selector), &body))
            .await
            .map_err(|e| anyhow!("Failed to select '{}' in '{}': {}", value, selector, e))?;
        Ok(())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let page = self.active_page().await?;
        let bytes = page
            .screenshot(
                chromiumoxide::page::ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(full_page)
                    .build(),
            )
            .await
            .map_err(|e| anyhow!("Failed to take screenshot: {}", e))?;
        Ok(bytes)
    }

    async fn wait_for_dom_content_loaded(&self) -> Result<()> {
        let page = self.active_page().await?;
        // Bounded poll (10s); a stuck page is the settle layer's problem.
        for _ in 0..100 {
            let state: String = page
                .evaluate("document.readyState")
                .await
                .map(|v| v.into_value().unwrap_or_default())
                .unwrap_or_default();
            if state == "interactive" || state == "complete" {
                return Ok(());
            }
            sleep(Duration::from_millis(PAGE_POLL_MS)).await;
        }
        Ok(())
    }

    async fn wait_for_network_idle(&self, deadline: Duration) -> Result<()> {
        let page = self.active_page().await?;
        let idle = async {
            let mut last_count = -1i64;
            let mut quiet_since = tokio::time::Instant::now();
            loop {
                let count: i64 = page
                    .evaluate("performance.getEntriesByType('resource').length")
                    .await
                    .ok()
                    .and_then(|v| v.into_value().ok())
                    .unwrap_or(0);
                if count == last_count {
                    if quiet_since.elapsed() >= Duration::from_millis(NETWORK_QUIET_WINDOW_MS) {
                        return;
                    }
                } else {
                    last_count = count;
                    quiet_since = tokio::time::Instant::now();
                }
                sleep(Duration::from_millis(PAGE_POLL_MS)).await;
            }
        };
        timeout(deadline, idle)
            .await
            .map_err(|_| anyhow!("Network idle timeout after {:?}", deadline))
    }

    async fn wait_for_new_page(&self, deadline: Duration) -> Result<Option<String>> {
        let main_target = {
            let page = self.active_page().await?;
            page.target_id().clone()
        };

        let race = async {
            loop {
                let pages = {
                    let guard = self.browser.lock().await;
                    match guard.as_ref() {
                        Some(browser) => browser.pages().await.unwrap_or_default(),
                        None => Vec::new(),
                    }
                };
                for page in pages {
                    if *page.target_id() != main_target {
                        let url = page.url().await.ok().flatten().unwrap_or_default();
                        let _ = page.close().await;
                        tracing::info!(url = %url, "Closed newly opened tab");
                        return Some(url);
                    }
                }
                sleep(Duration::from_millis(PAGE_POLL_MS)).await;
            }
        };

        Ok(timeout(deadline, race).await.unwrap_or(None))
    }

    async fn close(&self) -> Result<()> {
        if let Some(page) = self.page.lock().await.take() {
            let _ = page.close().await;
        }
        if let Some(mut browser) = self.browser.lock().await.take() {
            let _ = browser.close().await;
        }
        tracing::info!("Browser closed");
        Ok(())
    }
}

/// Map a key name to CDP key event parts: (virtual key code, code, text, key).
fn key_event_parts(key: &str) -> Result<(i64, String, String, String)> {
    let parts = match key.to_lowercase().as_str() {
        "enter" | "return" => (13, "Enter", "\r", "Enter"),
        "tab" => (9, "Tab", "", "Tab"),
        "escape" | "esc" => (27, "Escape", "", "Escape"),
        "backspace" => (8, "Backspace", "", "Backspace"),
        "delete" => (46, "Delete", "", "Delete"),
        "arrowup" | "up" => (38, "ArrowUp", "", "ArrowUp"),
        "arrowdown" | "down" => (40, "ArrowDown", "", "ArrowDown"),
        "arrowleft" | "left" => (37, "ArrowLeft", "", "ArrowLeft"),
        "arrowright" | "right" => (39, "ArrowRight", "", "ArrowRight"),
        "space" => (32, "Space", " ", " "),
        "home" => (36, "Home", "", "Home"),
        "end" => (35, "End", "", "End"),
        "pageup" => (33, "PageUp", "", "PageUp"),
        "pagedown" => (34, "PageDown", "", "PageDown"),
        _ => {
            if key.chars().count() == 1 {
                let c = key.chars().next().unwrap();
                let code = format!("Key{}", c.to_uppercase());
                return Ok((c as i64, code, key.to_string(), key.to_string()));
            }
            return Err(anyhow!("Unknown key: {}", key));
        }
    };
    Ok((
        parts.0,
        parts.1.to_string(),
        parts.2.to_string(),
        parts.3.to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xpath_prefix_is_stripped() {
        assert_eq!(xpath_of("xpath=/a[1]"), "/a[1]");
        assert_eq!(xpath_of("/a[1]"), "/a[1]");
    }

    #[test]
    fn single_character_keys_map_to_char_codes() {
        let (code, key_code, text, name) = key_event_parts("a").unwrap();
        assert_eq!(code, 'a' as i64);
        assert_eq!(key_code, "KeyA");
        assert_eq!(text, "a");
        assert_eq!(name, "a");
    }

    #[test]
    fn unknown_multi_character_key_is_rejected() {
        assert!(key_event_parts("SuperKey").is_err());
    }
}
