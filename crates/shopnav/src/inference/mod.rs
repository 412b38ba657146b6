//! Structural inference over a rendered page.
//!
//! - [`locator`] picks the primary navigation among candidate elements.
//! - [`hierarchy`] walks it into a depth-bounded category tree.
//! - [`facets`] parses filter widgets on a listing page.
//!
//! All three talk to the page only through [`crate::renderer::RenderContext`]
//! and take their selectors and thresholds from [`crate::rules::RuleSet`].

pub mod facets;
pub mod hierarchy;
pub mod links;
pub mod locator;
pub mod settle;

pub use facets::FacetExtractor;
pub use hierarchy::HierarchyBuilder;
pub use locator::{locate_navigation, NavCandidate};

use crate::renderer::{ElementHandle, RenderContext};
use tracing::debug;

/// Trimmed rendered text of an element; `None` if it cannot be read.
pub(crate) async fn read_text(ctx: &dyn RenderContext, element: ElementHandle) -> Option<String> {
    match ctx.inner_text(element).await {
        Ok(text) => Some(text.trim().to_string()),
        Err(e) => {
            debug!("skipping unreadable element {element:?}: {e:#}");
            None
        }
    }
}

/// Attribute value of an element; read failures count as absent.
pub(crate) async fn read_attr(
    ctx: &dyn RenderContext,
    element: ElementHandle,
    name: &str,
) -> Option<String> {
    match ctx.attribute(element, name).await {
        Ok(value) => value,
        Err(e) => {
            debug!("cannot read {name} of {element:?}: {e:#}");
            None
        }
    }
}
