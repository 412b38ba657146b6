//! Renderer abstraction for browser-based page inspection.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over the
//! browser engine. Inference code only ever talks to these traits, so the
//! same heuristics run against live Chromium (`chromium`) and against
//! static HTML snapshots (`fixture`).

pub mod chromium;
pub mod fixture;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to reach the requested load state in milliseconds.
    pub load_time_ms: u64,
}

/// Load state a navigation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitUntil {
    /// The DOM has been parsed.
    DomContentLoaded,
    /// The DOM is ready and network activity has quietened down.
    NetworkIdle,
}

/// Page viewport in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Rendered geometry of an element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Whether the element occupies any space on screen.
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Opaque reference to a DOM element inside one [`RenderContext`].
///
/// Handles are stable for the lifetime of the context: querying the same
/// element twice yields equal handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementHandle(pub u64);

/// Renderer-level failures that callers need to tell apart.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("navigation timed out after {0}ms")]
    Timeout(u64),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("element {0:?} is no longer attached")]
    UnknownElement(ElementHandle),
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new isolated page with the given viewport.
    async fn new_context(&self, viewport: Viewport) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open contexts.
    fn active_contexts(&self) -> usize;
}

/// A single page for rendering and inspecting a site.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL and wait for the given load state.
    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitUntil,
        timeout_ms: u64,
    ) -> Result<NavigationResult>;

    /// All elements matching `selector` in document order, restricted to
    /// descendants of `scope` when given.
    async fn query_all(
        &self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>>;

    /// First element matching `selector`.
    async fn query_one(
        &self,
        scope: Option<ElementHandle>,
        selector: &str,
    ) -> Result<Option<ElementHandle>> {
        Ok(self.query_all(scope, selector).await?.into_iter().next())
    }

    /// Rendered text of an element.
    async fn inner_text(&self, element: ElementHandle) -> Result<String>;

    /// Value of an attribute, `None` when absent.
    async fn attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>>;

    /// Geometry of an element, `None` when it is not rendered.
    async fn bounding_box(&self, element: ElementHandle) -> Result<Option<BoundingBox>>;

    /// Parent element, `None` for the document root.
    async fn parent(&self, element: ElementHandle) -> Result<Option<ElementHandle>>;

    /// Move the pointer over an element.
    async fn hover(&self, element: ElementHandle) -> Result<()>;

    /// Number of rendered elements matching `selector` page-wide.
    async fn count_visible(&self, selector: &str) -> Result<usize>;

    /// Unconditional timed wait.
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;

    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;

    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Launches fresh browser instances.
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Renderer>>;
}
