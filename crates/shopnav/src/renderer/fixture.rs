//! Static-HTML renderer backed by `scraper`.
//!
//! Serves saved page snapshots with deterministic behaviour, for tests and
//! for offline replay of pages captured with `shopnav snapshot`. A few
//! attributes stand in for what a real browser would compute:
//!
//! - `data-reveal-on="<id>"` — the subtree is only attached to the DOM
//!   while the element with that id (or one of its descendants) is hovered,
//!   like a client-rendered submenu. Hover state chains: hovering an element
//!   inside a revealed subtree keeps that subtree's trigger active.
//! - `data-show-on="<id>"` — the subtree stays attached (queries find it)
//!   but is only rendered while that trigger is hovered, like a CSS
//!   `:hover` dropdown. Chains the same way as `data-reveal-on`.
//! - `data-height` / `data-width` — rendered size in px (defaults 24 × 100).
//! - `hidden` — the element is attached but not rendered.
//! - `data-hover="fail"` — hovering the element fails.

use super::{
    BoundingBox, ElementHandle, NavigationResult, RenderContext, RenderError, Renderer,
    RendererFactory, Viewport, WaitUntil,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use scraper::node::Element;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

const DEFAULT_HEIGHT: f64 = 24.0;
const DEFAULT_WIDTH: f64 = 100.0;

/// Tags whose text runs into the surrounding text without a break.
const INLINE_TAGS: &[&str] = &["a", "span", "b", "strong", "em", "i", "small", "label"];

#[derive(Debug, Clone)]
enum FixturePage {
    Html(Arc<str>),
    Timeout,
}

#[derive(Debug, Default, Clone)]
struct FixturePages {
    by_url: HashMap<String, FixturePage>,
    fallback: Option<Arc<str>>,
}

impl FixturePages {
    fn lookup(&self, url: &str) -> Option<FixturePage> {
        self.by_url
            .get(&normalize(url))
            .cloned()
            .or_else(|| self.fallback.clone().map(FixturePage::Html))
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

/// Renderer serving static HTML pages keyed by URL.
#[derive(Debug, Default)]
pub struct FixtureRenderer {
    pages: Arc<FixturePages>,
    active_count: Arc<AtomicUsize>,
    shutdowns: AtomicUsize,
}

impl FixtureRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` when `url` is navigated to.
    pub fn with_page(mut self, url: &str, html: impl Into<String>) -> Self {
        let html: String = html.into();
        self.pages_mut()
            .by_url
            .insert(normalize(url), FixturePage::Html(Arc::from(html)));
        self
    }

    /// Make navigation to `url` time out.
    pub fn with_timeout(mut self, url: &str) -> Self {
        self.pages_mut()
            .by_url
            .insert(normalize(url), FixturePage::Timeout);
        self
    }

    /// Serve `html` for every URL without a dedicated page.
    pub fn with_fallback(mut self, html: impl Into<String>) -> Self {
        let html: String = html.into();
        self.pages_mut().fallback = Some(Arc::from(html));
        self
    }

    /// Number of times `shutdown` was called.
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::Relaxed)
    }

    fn pages_mut(&mut self) -> &mut FixturePages {
        Arc::make_mut(&mut self.pages)
    }
}

#[async_trait]
impl Renderer for FixtureRenderer {
    async fn new_context(&self, viewport: Viewport) -> Result<Box<dyn RenderContext>> {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(FixtureContext {
            pages: Arc::clone(&self.pages),
            active_count: Arc::clone(&self.active_count),
            viewport,
            loaded: None,
            hovered: Mutex::new(None),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// Hands out the same [`FixtureRenderer`] on every launch, counting launches.
#[derive(Debug, Clone)]
pub struct FixtureLauncher {
    renderer: Arc<FixtureRenderer>,
    launches: Arc<AtomicUsize>,
}

impl FixtureLauncher {
    pub fn new(renderer: FixtureRenderer) -> Self {
        Self {
            renderer: Arc::new(renderer),
            launches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn renderer(&self) -> &FixtureRenderer {
        &self.renderer
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RendererFactory for FixtureLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        self.launches.fetch_add(1, Ordering::Relaxed);
        Ok(self.renderer.clone())
    }
}

#[derive(Debug, Clone)]
struct Loaded {
    url: String,
    html: Arc<str>,
}

/// One page over a static snapshot.
pub struct FixtureContext {
    pages: Arc<FixturePages>,
    active_count: Arc<AtomicUsize>,
    viewport: Viewport,
    loaded: Option<Loaded>,
    hovered: Mutex<Option<usize>>,
}

/// A parsed view of the current page.
///
/// Re-parsed per call: `Html` is not `Send`, so it never lives across an
/// await point. Handles are document-order positions, which stay stable
/// across parses of the same snapshot.
struct Dom {
    html: Html,
    /// Document-order position of each element, keyed by node address.
    index: HashMap<*const Element, usize>,
    active: HashSet<String>,
}

impl Dom {
    fn parse(html: &str, hovered: Option<usize>) -> Self {
        let html = Html::parse_document(html);
        let mut dom = Self {
            html,
            index: HashMap::new(),
            active: HashSet::new(),
        };
        dom.index = dom
            .elements()
            .enumerate()
            .map(|(i, el)| (address(el), i))
            .collect();
        dom.active = dom.active_triggers(hovered);
        dom
    }

    fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
    }

    fn element(&self, handle: ElementHandle) -> Option<ElementRef<'_>> {
        self.elements().nth(usize::try_from(handle.0).ok()?)
    }

    fn handle(&self, el: ElementRef<'_>) -> Option<ElementHandle> {
        self.index.get(&address(el)).map(|i| ElementHandle(*i as u64))
    }

    fn attached_element(&self, handle: ElementHandle) -> Result<ElementRef<'_>> {
        self.element(handle)
            .filter(|el| self.is_attached(*el))
            .ok_or_else(|| RenderError::UnknownElement(handle).into())
    }

    /// Ids whose reveal regions are open while `hovered` is under the pointer.
    fn active_triggers(&self, hovered: Option<usize>) -> HashSet<String> {
        let mut active = HashSet::new();
        let mut visited = HashSet::new();
        let mut current = hovered.and_then(|i| self.element(ElementHandle(i as u64)));

        while let Some(el) = current {
            if !visited.insert(address(el)) {
                break;
            }
            for node in self_and_ancestors(el) {
                if let Some(id) = node.value().id() {
                    active.insert(id.to_string());
                }
            }
            current = self_and_ancestors(el)
                .find_map(trigger_of)
                .and_then(|trigger| self.by_id(trigger));
        }
        active
    }

    fn by_id(&self, id: &str) -> Option<ElementRef<'_>> {
        self.elements().find(|el| el.value().id() == Some(id))
    }

    fn region_open(&self, el: ElementRef<'_>) -> bool {
        el.value()
            .attr("data-reveal-on")
            .map_or(true, |trigger| self.active.contains(trigger))
    }

    fn is_attached(&self, el: ElementRef<'_>) -> bool {
        self_and_ancestors(el).all(|node| self.region_open(node))
    }

    fn shown(&self, el: ElementRef<'_>) -> bool {
        el.value().attr("hidden").is_none()
            && el
                .value()
                .attr("data-show-on")
                .map_or(true, |trigger| self.active.contains(trigger))
    }

    fn is_rendered(&self, el: ElementRef<'_>) -> bool {
        self.is_attached(el) && self_and_ancestors(el).all(|node| self.shown(node))
    }

    fn select(&self, scope: Option<ElementHandle>, selector: &str) -> Result<Vec<ElementHandle>> {
        let selector = parse_selector(selector)?;
        let matches: Vec<ElementRef<'_>> = match scope {
            Some(handle) => {
                let root = self.attached_element(handle)?;
                root.select(&selector).filter(|el| *el != root).collect()
            }
            None => self.html.select(&selector).collect(),
        };
        Ok(matches
            .into_iter()
            .filter(|el| self.is_attached(*el))
            .filter_map(|el| self.handle(el))
            .collect())
    }

    fn text(&self, el: ElementRef<'_>) -> String {
        let mut raw = String::new();
        self.collect_text(el, &mut raw);
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text(&self, el: ElementRef<'_>, out: &mut String) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => out.push_str(text),
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if !self.region_open(child_el) || !self.shown(child_el) {
                        continue;
                    }
                    let inline = INLINE_TAGS.contains(&child_el.value().name());
                    if !inline {
                        out.push(' ');
                    }
                    self.collect_text(child_el, out);
                    if !inline {
                        out.push(' ');
                    }
                }
                _ => {}
            }
        }
    }
}

/// The trigger id a hover region waits on, if `el` is one.
fn trigger_of<'a>(el: ElementRef<'a>) -> Option<&'a str> {
    let value = el.value();
    value
        .attr("data-reveal-on")
        .or_else(|| value.attr("data-show-on"))
}

fn address(el: ElementRef<'_>) -> *const Element {
    el.value()
}

fn self_and_ancestors(el: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    std::iter::once(el).chain(el.ancestors().filter_map(ElementRef::wrap))
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector {selector:?}: {e:?}"))
}

fn dimension(el: ElementRef<'_>, attr: &str, default: f64) -> f64 {
    el.value()
        .attr(attr)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl FixtureContext {
    fn dom(&self) -> Result<Dom> {
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| anyhow!("no page loaded"))?;
        let hovered = self.hovered.lock().ok().and_then(|h| *h);
        Ok(Dom::parse(&loaded.html, hovered))
    }

    fn load(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let page = self
            .pages
            .lookup(url)
            .ok_or_else(|| RenderError::Navigation(format!("no fixture page for {url}")))?;
        let html = match page {
            FixturePage::Html(html) => html,
            FixturePage::Timeout => return Err(RenderError::Timeout(timeout_ms).into()),
        };
        if let Ok(mut hovered) = self.hovered.lock() {
            *hovered = None;
        }
        let final_url = normalize(url);
        self.loaded = Some(Loaded {
            url: final_url.clone(),
            html,
        });
        Ok(NavigationResult {
            final_url,
            load_time_ms: 0,
        })
    }

    fn query_sync(&self, scope: Option<ElementHandle>, selector: &str) -> Result<Vec<ElementHandle>> {
        self.dom()?.select(scope, selector)
    }

    fn text_sync(&self, element: ElementHandle) -> Result<String> {
        let dom = self.dom()?;
        let el = dom.attached_element(element)?;
        Ok(if dom.is_rendered(el) {
            dom.text(el)
        } else {
            String::new()
        })
    }

    fn attribute_sync(&self, element: ElementHandle, name: &str) -> Result<Option<String>> {
        let dom = self.dom()?;
        let el = dom.attached_element(element)?;
        Ok(el.value().attr(name).map(str::to_string))
    }

    fn box_sync(&self, element: ElementHandle) -> Result<Option<BoundingBox>> {
        let dom = self.dom()?;
        let el = dom.attached_element(element)?;
        if !dom.is_rendered(el) {
            return Ok(None);
        }
        Ok(Some(BoundingBox {
            x: 0.0,
            y: element.0 as f64,
            width: dimension(el, "data-width", DEFAULT_WIDTH).min(f64::from(self.viewport.width)),
            height: dimension(el, "data-height", DEFAULT_HEIGHT),
        }))
    }

    fn parent_sync(&self, element: ElementHandle) -> Result<Option<ElementHandle>> {
        let dom = self.dom()?;
        let el = dom.attached_element(element)?;
        Ok(el
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|p| dom.handle(p)))
    }

    fn hover_sync(&self, element: ElementHandle) -> Result<()> {
        let dom = self.dom()?;
        let el = dom.attached_element(element)?;
        if el.value().attr("data-hover") == Some("fail") || !dom.is_rendered(el) {
            return Err(anyhow!("element {element:?} is not interactable"));
        }
        drop(dom);
        let mut hovered = self
            .hovered
            .lock()
            .map_err(|_| anyhow!("hover state poisoned"))?;
        *hovered = usize::try_from(element.0).ok();
        Ok(())
    }

    fn count_sync(&self, selector: &str) -> Result<usize> {
        let dom = self.dom()?;
        let handles = dom.select(None, selector)?;
        Ok(handles
            .into_iter()
            .filter_map(|h| dom.element(h))
            .filter(|el| dom.is_rendered(*el))
            .count())
    }
}

#[async_trait]
impl RenderContext for FixtureContext {
    async fn navigate(
        &mut self,
        url: &str,
        _wait: WaitUntil,
        timeout_ms: u64,
    ) -> Result<NavigationResult> {
        self.load(url, timeout_ms)
    }

    async fn query_all(
        &self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        self.query_sync(scope, selector)
    }

    async fn inner_text(&self, element: ElementHandle) -> Result<String> {
        self.text_sync(element)
    }

    async fn attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>> {
        self.attribute_sync(element, name)
    }

    async fn bounding_box(&self, element: ElementHandle) -> Result<Option<BoundingBox>> {
        self.box_sync(element)
    }

    async fn parent(&self, element: ElementHandle) -> Result<Option<ElementHandle>> {
        self.parent_sync(element)
    }

    async fn hover(&self, element: ElementHandle) -> Result<()> {
        self.hover_sync(element)
    }

    async fn count_visible(&self, selector: &str) -> Result<usize> {
        self.count_sync(selector)
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self
            .loaded
            .as_ref()
            .map(|l| l.url.clone())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn get_html(&self) -> Result<String> {
        self.loaded
            .as_ref()
            .map(|l| l.html.to_string())
            .ok_or_else(|| anyhow!("no page loaded"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MENU: &str = r#"<html><body>
        <nav id="main">
          <ul>
            <li id="men-item"><a id="men" href="/men">Men</a>
              <ul data-reveal-on="men-item">
                <li><a id="shirts" href="/men/shirts">Shirts</a>
                  <ul data-reveal-on="shirts"><li><a href="/men/shirts/linen">Linen</a></li></ul>
                </li>
              </ul>
            </li>
            <li><a id="women" href="/women">Women</a></li>
            <li><a href="/sale" hidden>Sale</a></li>
            <li><a id="stuck" href="/stuck" data-hover="fail">Stuck</a></li>
          </ul>
        </nav>
    </body></html>"#;

    async fn open(html: &str) -> Box<dyn RenderContext> {
        let renderer = FixtureRenderer::new().with_page("https://x.com/", html);
        let mut ctx = renderer.new_context(Viewport::new(1280, 800)).await.unwrap();
        ctx.navigate("https://x.com", WaitUntil::DomContentLoaded, 1000)
            .await
            .unwrap();
        ctx
    }

    async fn texts(ctx: &dyn RenderContext, handles: &[ElementHandle]) -> Vec<String> {
        let mut out = Vec::new();
        for h in handles {
            out.push(ctx.inner_text(*h).await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_reveal_regions_attach_on_hover() {
        let ctx = open(MENU).await;
        let links = ctx.query_all(None, "a").await.unwrap();
        assert_eq!(texts(ctx.as_ref(), &links).await, vec!["Men", "Women", "", "Stuck"]);

        let men = ctx.query_one(None, "#men").await.unwrap().unwrap();
        ctx.hover(men).await.unwrap();
        let links = ctx.query_all(None, "a").await.unwrap();
        assert_eq!(
            texts(ctx.as_ref(), &links).await,
            vec!["Men", "Shirts", "Women", "", "Stuck"]
        );
    }

    #[tokio::test]
    async fn test_hover_chain_keeps_parent_menu_open() {
        let ctx = open(MENU).await;
        let men = ctx.query_one(None, "#men").await.unwrap().unwrap();
        ctx.hover(men).await.unwrap();
        let shirts = ctx.query_one(None, "#shirts").await.unwrap().unwrap();
        ctx.hover(shirts).await.unwrap();
        assert_eq!(ctx.count_visible("a").await.unwrap(), 5);

        let women = ctx.query_one(None, "#women").await.unwrap().unwrap();
        ctx.hover(women).await.unwrap();
        assert_eq!(ctx.count_visible("a").await.unwrap(), 3);
        assert!(ctx.inner_text(shirts).await.is_err());
    }

    #[tokio::test]
    async fn test_show_regions_stay_attached_until_hovered() {
        let ctx = open(
            r#"<nav><ul>
              <li id="men-item"><a id="men" href="/men">Men</a>
                <ul data-show-on="men-item"><li><a id="shirts" href="/men/shirts">Shirts</a></li></ul>
              </li>
              <li><a id="women" href="/women">Women</a></li>
            </ul></nav>"#,
        )
        .await;
        let links = ctx.query_all(None, "a").await.unwrap();
        assert_eq!(texts(ctx.as_ref(), &links).await, vec!["Men", "", "Women"]);
        assert_eq!(ctx.count_visible("a").await.unwrap(), 2);

        let shirts = ctx.query_one(None, "#shirts").await.unwrap().unwrap();
        assert_eq!(ctx.bounding_box(shirts).await.unwrap(), None);
        assert!(ctx.hover(shirts).await.is_err());

        let men = ctx.query_one(None, "#men").await.unwrap().unwrap();
        ctx.hover(men).await.unwrap();
        assert_eq!(ctx.inner_text(shirts).await.unwrap(), "Shirts");
        assert_eq!(ctx.count_visible("a").await.unwrap(), 3);

        ctx.hover(shirts).await.unwrap();
        assert_eq!(ctx.count_visible("a").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_scope_excludes_root_and_parent_is_stable() {
        let ctx = open(MENU).await;
        let nav = ctx.query_one(None, "nav").await.unwrap().unwrap();
        assert!(ctx.query_all(Some(nav), "nav").await.unwrap().is_empty());

        let men = ctx.query_one(None, "#men").await.unwrap().unwrap();
        let item = ctx.parent(men).await.unwrap().unwrap();
        assert_eq!(ctx.query_one(None, "#men-item").await.unwrap(), Some(item));
        assert_eq!(ctx.attribute(item, "id").await.unwrap().as_deref(), Some("men-item"));
        assert_eq!(ctx.attribute(item, "class").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_geometry_and_hidden_elements() {
        let ctx = open(r#"<div id="strip" data-height="12">x</div><div id="bar">y</div><p hidden id="gone">z</p>"#).await;
        let strip = ctx.query_one(None, "#strip").await.unwrap().unwrap();
        let bar = ctx.query_one(None, "#bar").await.unwrap().unwrap();
        let gone = ctx.query_one(None, "#gone").await.unwrap().unwrap();
        assert_eq!(ctx.bounding_box(strip).await.unwrap().unwrap().height, 12.0);
        assert_eq!(ctx.bounding_box(bar).await.unwrap().unwrap().height, DEFAULT_HEIGHT);
        assert_eq!(ctx.bounding_box(gone).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hover_failures_are_reported() {
        let ctx = open(MENU).await;
        let stuck = ctx.query_one(None, "#stuck").await.unwrap().unwrap();
        assert!(ctx.hover(stuck).await.is_err());
    }

    #[tokio::test]
    async fn test_navigation_outcomes() {
        let renderer = FixtureRenderer::new()
            .with_page("https://x.com/", "<p>home</p>")
            .with_timeout("https://slow.com/");
        let mut ctx = renderer.new_context(Viewport::new(1280, 800)).await.unwrap();
        assert_eq!(renderer.active_contexts(), 1);

        let nav = ctx
            .navigate("https://x.com", WaitUntil::NetworkIdle, 500)
            .await
            .unwrap();
        assert_eq!(nav.final_url, "https://x.com/");
        assert_eq!(ctx.get_url().await.unwrap(), "https://x.com/");
        assert!(ctx.get_html().await.unwrap().contains("home"));

        let err = ctx
            .navigate("https://slow.com/", WaitUntil::NetworkIdle, 500)
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<RenderError>(), Some(RenderError::Timeout(500))));

        assert!(ctx
            .navigate("https://nowhere.com/", WaitUntil::NetworkIdle, 500)
            .await
            .is_err());

        ctx.close().await.unwrap();
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_fallback_page_serves_any_url() {
        let renderer = FixtureRenderer::new().with_fallback("<nav>snapshot</nav>");
        let mut ctx = renderer.new_context(Viewport::new(1280, 800)).await.unwrap();
        ctx.navigate("https://anything.test/path", WaitUntil::DomContentLoaded, 500)
            .await
            .unwrap();
        let nav = ctx.query_one(None, "nav").await.unwrap().unwrap();
        assert_eq!(ctx.inner_text(nav).await.unwrap(), "snapshot");
    }
}
