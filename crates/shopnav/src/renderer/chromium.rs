//! Chromium-based renderer using chromiumoxide.
//!
//! DOM access goes through page JavaScript: every element handed out is
//! stamped with a `data-shopnav-id` attribute, and later calls address it by
//! that id. Hovering uses real CDP mouse events so CSS `:hover` menus open.

use super::{
    BoundingBox, ElementHandle, NavigationResult, RenderContext, RenderError, Renderer,
    RendererFactory, Viewport, WaitUntil,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Attribute used to address elements across calls.
const HANDLE_ATTR: &str = "data-shopnav-id";

/// Installs `__stamp(el)`, which assigns (once) and returns an element's id.
const STAMP_JS: &str = r#"const __stamp = (el) => {
    if (!el.hasAttribute('data-shopnav-id')) {
        window.__shopnavNext = (window.__shopnavNext || 0) + 1;
        el.setAttribute('data-shopnav-id', String(window.__shopnavNext));
    }
    return Number(el.getAttribute('data-shopnav-id'));
};"#;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. SHOPNAV_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("SHOPNAV_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.shopnav/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".shopnav/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".shopnav/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".shopnav/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".shopnav/chromium/chrome-linux64/chrome"),
                home.join(".shopnav/chromium/chrome"),
            ]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: tokio::sync::Mutex<Browser>,
    handler: Mutex<Option<JoinHandle<()>>>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Create a new ChromiumRenderer, launching a headless Chromium instance.
    pub async fn new() -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Set SHOPNAV_CHROMIUM_PATH or install Chrome.")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("chromium handler event error: {e}");
                }
            }
        });

        Ok(Self {
            browser: tokio::sync::Mutex::new(browser),
            handler: Mutex::new(Some(handler_task)),
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self, viewport: Viewport) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        ))
        .await
        .context("failed to set viewport")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close Chromium")?;
        let _ = browser.wait().await;

        let handler = self.handler.lock().ok().and_then(|mut h| h.take());
        if let Some(task) = handler {
            task.abort();
        }
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// Launches one headless Chromium per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumLauncher;

#[async_trait]
impl RendererFactory for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        Ok(Arc::new(ChromiumRenderer::new().await?))
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

#[derive(Deserialize)]
struct AttributeReply {
    value: Option<String>,
}

#[derive(Deserialize)]
struct RectReply {
    rect: Option<BoundingBox>,
}

#[derive(Deserialize)]
struct ParentReply {
    parent: Option<u64>,
}

impl ChromiumContext {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    /// Evaluate `body` with `el` bound to the element behind `handle`.
    /// `body` must evaluate to `null` only when the element is gone.
    async fn eval_on<T: DeserializeOwned>(&self, handle: ElementHandle, body: &str) -> Result<T> {
        let script = format!(
            "(() => {{ {STAMP_JS} const el = {lookup}; if (!el) return null; return {body}; }})()",
            lookup = element_lookup(handle),
        );
        let reply: Option<T> = self.eval(script).await?;
        reply.ok_or_else(|| RenderError::UnknownElement(handle).into())
    }

    /// Wait for network activity to quieten down within `budget`.
    ///
    /// Returns `false` when the page never went idle in time. A script
    /// that cannot be evaluated counts as idle.
    async fn wait_for_network_idle(&self, budget: Duration) -> bool {
        let timeout_ms = budget.as_millis().min(u128::from(u64::MAX)) as u64;
        let script = format!(
            r#"(async () => {{
                const timeoutMs = {timeout_ms};
                const idleMs = 500;
                const interval = 100;
                const start = Date.now();
                let last = performance.getEntriesByType('resource').length;
                let stable = 0;
                while (Date.now() - start < timeoutMs) {{
                    await new Promise(r => setTimeout(r, interval));
                    const cur = performance.getEntriesByType('resource').length;
                    if (document.readyState === 'complete' && cur === last) {{
                        stable += interval;
                        if (stable >= idleMs) return true;
                    }} else {{
                        stable = 0;
                    }}
                    last = cur;
                }}
                return false;
            }})()"#
        );
        let outcome = tokio::time::timeout(budget, self.eval::<bool>(script))
            .await
            .ok();
        network_idle_reached(outcome)
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitUntil,
        timeout_ms: u64,
    ) -> Result<NavigationResult> {
        let start = Instant::now();
        let budget = Duration::from_millis(timeout_ms);

        match tokio::time::timeout(budget, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(RenderError::Navigation(e.to_string()).into()),
            Err(_) => return Err(RenderError::Timeout(timeout_ms).into()),
        }

        if wait == WaitUntil::NetworkIdle {
            let remaining = budget.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(RenderError::Timeout(timeout_ms).into());
            }
            if !self.wait_for_network_idle(remaining).await {
                return Err(RenderError::Timeout(timeout_ms).into());
            }
        }

        let final_url = self
            .page
            .url()
            .await
            .unwrap_or_default()
            .unwrap_or_else(|| url.to_string());

        Ok(NavigationResult {
            final_url,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn query_all(
        &self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        let root = match scope {
            Some(handle) => element_lookup(handle),
            None => "document".to_string(),
        };
        let script = format!(
            "(() => {{ {STAMP_JS} const root = {root}; if (!root) return null; \
             return Array.from(root.querySelectorAll({sel})).map(__stamp); }})()",
            sel = js_string(selector),
        );
        let ids: Option<Vec<u64>> = self.eval(script).await?;
        match (ids, scope) {
            (Some(ids), _) => Ok(ids.into_iter().map(ElementHandle).collect()),
            (None, Some(handle)) => Err(RenderError::UnknownElement(handle).into()),
            (None, None) => Ok(Vec::new()),
        }
    }

    async fn inner_text(&self, element: ElementHandle) -> Result<String> {
        // Unrendered elements have no visible text.
        self.eval_on(
            element,
            "(el.getClientRects().length === 0 ? '' : (el.innerText || el.textContent || ''))",
        )
        .await
    }

    async fn attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>> {
        let body = format!("({{ value: el.getAttribute({}) }})", js_string(name));
        let reply: AttributeReply = self.eval_on(element, &body).await?;
        Ok(reply.value)
    }

    async fn bounding_box(&self, element: ElementHandle) -> Result<Option<BoundingBox>> {
        let reply: RectReply = self
            .eval_on(
                element,
                "(el.getClientRects().length === 0 ? { rect: null } : (() => { \
                 const r = el.getBoundingClientRect(); \
                 return { rect: { x: r.x, y: r.y, width: r.width, height: r.height } }; })())",
            )
            .await?;
        Ok(reply.rect)
    }

    async fn parent(&self, element: ElementHandle) -> Result<Option<ElementHandle>> {
        let reply: ParentReply = self
            .eval_on(
                element,
                "({ parent: el.parentElement ? __stamp(el.parentElement) : null })",
            )
            .await?;
        Ok(reply.parent.map(ElementHandle))
    }

    async fn hover(&self, element: ElementHandle) -> Result<()> {
        let found = self
            .page
            .find_element(format!("[{HANDLE_ATTR}=\"{}\"]", element.0))
            .await
            .map_err(|_| RenderError::UnknownElement(element))?;
        found.hover().await.context("hover failed")?;
        Ok(())
    }

    async fn count_visible(&self, selector: &str) -> Result<usize> {
        let script = format!(
            "Array.from(document.querySelectorAll({})).filter(el => el.getClientRects().length > 0).length",
            js_string(selector)
        );
        self.eval(script).await
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .unwrap_or_default();
        Ok(url)
    }

    async fn get_html(&self) -> Result<String> {
        self.eval("document.documentElement.outerHTML".to_string())
            .await
            .context("failed to get HTML")
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.page.close().await.context("failed to close page")?;
        Ok(())
    }
}

fn element_lookup(handle: ElementHandle) -> String {
    format!("document.querySelector('[{HANDLE_ATTR}=\"{}\"]')", handle.0)
}

/// Verdict on a network-idle probe; `None` means the probe itself ran out
/// of budget.
fn network_idle_reached(outcome: Option<Result<bool>>) -> bool {
    match outcome {
        Some(Ok(idle)) => idle,
        Some(Err(e)) => {
            warn!("network-idle heuristic failed: {e:#}");
            true
        }
        None => false,
    }
}

/// Encode `s` as a JavaScript string literal.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string(r#"a[href*="?"]"#), r#""a[href*=\"?\"]""#);
    }

    #[test]
    fn test_element_lookup_uses_handle_attribute() {
        assert_eq!(
            element_lookup(ElementHandle(7)),
            "document.querySelector('[data-shopnav-id=\"7\"]')"
        );
    }

    #[test]
    fn test_network_idle_budget_miss_is_not_idle() {
        assert!(network_idle_reached(Some(Ok(true))));
        assert!(!network_idle_reached(Some(Ok(false))));
        assert!(!network_idle_reached(None));
        assert!(network_idle_reached(Some(Err(anyhow::anyhow!("no JS context")))));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_budget_below_idle_window_times_out() {
        let renderer = ChromiumRenderer::new()
            .await
            .expect("failed to create renderer");
        let mut ctx = renderer
            .new_context(Viewport::new(1280, 800))
            .await
            .expect("failed to create context");

        // Idle needs 500ms of quiet, more than the whole budget.
        let err = ctx
            .navigate("data:text/html,<p>quiet</p>", WaitUntil::NetworkIdle, 300)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::Timeout(300))
        ));

        ctx.close().await.expect("close failed");
        renderer.shutdown().await.expect("shutdown failed");
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_query_and_hover() {
        let renderer = ChromiumRenderer::new()
            .await
            .expect("failed to create renderer");
        let mut ctx = renderer
            .new_context(Viewport::new(1280, 800))
            .await
            .expect("failed to create context");

        ctx.navigate(
            "data:text/html,<nav><a href='/a'>Alpha</a><a href='/b'>Beta</a></nav>",
            WaitUntil::DomContentLoaded,
            10_000,
        )
        .await
        .expect("navigation failed");

        let nav = ctx
            .query_one(None, "nav")
            .await
            .unwrap()
            .expect("nav present");
        let links = ctx.query_all(Some(nav), "a").await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(ctx.inner_text(links[0]).await.unwrap(), "Alpha");
        assert_eq!(
            ctx.attribute(links[1], "href").await.unwrap().as_deref(),
            Some("/b")
        );
        assert_eq!(ctx.parent(links[0]).await.unwrap(), Some(nav));
        ctx.hover(links[0]).await.expect("hover failed");

        ctx.close().await.expect("close failed");
        assert_eq!(renderer.active_contexts(), 0);
        renderer.shutdown().await.expect("shutdown failed");
    }
}
