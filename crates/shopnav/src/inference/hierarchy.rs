//! Hierarchy builder: walk the located navigation into a category tree.
//!
//! Each top-level link is hovered so client-rendered submenus appear. If an
//! overlay "mega menu" panel shows up, all of its links become the second
//! level (flattened, de-duplicated by label). Otherwise links nested under
//! the hovered link's item are used, and each of those is hovered in turn
//! to recover one more level. Sibling links are never walked in parallel:
//! hover state is shared by the whole page.
//!
//! A link's *item* is its parent element, and its *submenu* is every link
//! inside a container (`ul`, `ol`, `div` by default) below that item. A
//! level keeps only its outermost links: a link that sits in the submenu of
//! another link at the same level belongs one level down. Submenus already
//! present in the DOM but not rendered until hover are therefore not
//! mistaken for top-level links.

use super::links::{resolve_nested, resolve_top_level};
use super::settle::hover_and_settle;
use super::{read_attr, read_text};
use crate::config::{SettleTiming, MAX_TREE_DEPTH};
use crate::error::ScrapeError;
use crate::renderer::{ElementHandle, RenderContext};
use crate::rules::RuleSet;
use crate::types::CategoryNode;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Builds a depth-bounded category tree from a navigation element.
pub struct HierarchyBuilder<'a> {
    ctx: &'a dyn RenderContext,
    rules: &'a RuleSet,
    home: &'a Url,
    settle: SettleTiming,
    max_depth: usize,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(ctx: &'a dyn RenderContext, rules: &'a RuleSet, home: &'a Url) -> Self {
        Self {
            ctx,
            rules,
            home,
            settle: SettleTiming::default(),
            max_depth: MAX_TREE_DEPTH,
        }
    }

    pub fn with_settle(mut self, settle: SettleTiming) -> Self {
        self.settle = settle;
        self
    }

    /// Deepest level to build; the top level is depth 1. Clamped to
    /// `1..=MAX_TREE_DEPTH`.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.clamp(1, MAX_TREE_DEPTH);
        self
    }

    /// Walk every top-level link under `nav`.
    pub async fn build(&self, nav: ElementHandle) -> Result<Vec<CategoryNode>, ScrapeError> {
        let links = self.ctx.query_all(Some(nav), &self.rules.menu_links).await?;
        let links = self.outermost(links).await;

        let mut tree = Vec::new();
        for link in links {
            let Some(label) = read_text(self.ctx, link).await else {
                continue;
            };
            if !self.rules.top_label.accepts(&label) {
                debug!("skipping top-level link {label:?}: length out of bounds");
                continue;
            }
            let href = read_attr(self.ctx, link, "href").await;
            let url = resolve_top_level(self.home, href.as_deref());

            let children = if self.max_depth > 1 {
                self.hover(link, self.settle.top_level).await;
                match self.revealed_mega_panel(link).await {
                    Some(panel) => self.harvest_mega(panel, &url).await,
                    None => self.harvest_nested(link, &url, 2).await,
                }
            } else {
                Vec::new()
            };

            debug!("{label:?} -> {} children", children.len());
            tree.push(CategoryNode::new(label, url, children));
        }

        info!(
            "built category tree: {} top-level nodes, {} total",
            tree.len(),
            tree.iter().map(count_nodes).sum::<usize>()
        );
        Ok(tree)
    }

    async fn hover(&self, link: ElementHandle, budget: Duration) {
        let outcome = hover_and_settle(
            self.ctx,
            link,
            &self.rules.reveal_probe,
            budget,
            self.settle.poll_interval,
        )
        .await;
        debug!("hover {link:?}: {outcome:?}");
    }

    /// The first rendered overlay panel that is not the menu itself.
    async fn revealed_mega_panel(&self, link: ElementHandle) -> Option<ElementHandle> {
        let panels = self.ctx.query_all(None, &self.rules.mega_panels).await.ok()?;
        for panel in panels {
            let rendered = matches!(
                self.ctx.bounding_box(panel).await,
                Ok(Some(rect)) if rect.is_visible()
            );
            if !rendered {
                continue;
            }
            // A "mega" container holding the hovered link is the menu bar.
            let contains_link = self
                .ctx
                .query_all(Some(panel), &self.rules.mega_links)
                .await
                .map(|inner| inner.contains(&link))
                .unwrap_or(true);
            if !contains_link {
                return Some(panel);
            }
        }
        None
    }

    /// Every link in a mega panel, flattened and de-duplicated by label.
    async fn harvest_mega(&self, panel: ElementHandle, parent_url: &str) -> Vec<CategoryNode> {
        let links = match self.ctx.query_all(Some(panel), &self.rules.mega_links).await {
            Ok(links) => links,
            Err(e) => {
                debug!("cannot list mega panel links: {e:#}");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for link in links {
            let Some(label) = read_text(self.ctx, link).await else {
                continue;
            };
            if !self.rules.nested_label.accepts(&label) || !seen.insert(label.clone()) {
                continue;
            }
            let href = read_attr(self.ctx, link, "href").await;
            let url = resolve_nested(self.home, href.as_deref(), parent_url);
            nodes.push(CategoryNode::leaf(label, url));
        }
        nodes
    }

    /// Links one level below `link`, each walked one level further while
    /// `depth` allows.
    fn harvest_nested<'b>(
        &'b self,
        link: ElementHandle,
        parent_url: &'b str,
        depth: usize,
    ) -> BoxFuture<'b, Vec<CategoryNode>> {
        async move {
            if depth > self.max_depth {
                return Vec::new();
            }
            let Some(submenu) = self.submenu(link).await else {
                return Vec::new();
            };
            let candidates = self.outermost(submenu).await;

            let mut nodes = Vec::new();
            for sub in candidates {
                let Some(label) = read_text(self.ctx, sub).await else {
                    continue;
                };
                if !self.rules.nested_label.accepts(&label) {
                    debug!("skipping level-{depth} link {label:?}: length out of bounds");
                    continue;
                }
                let href = read_attr(self.ctx, sub, "href").await;
                let url = resolve_nested(self.home, href.as_deref(), parent_url);

                let children = if depth < self.max_depth {
                    self.hover(sub, self.settle.nested).await;
                    self.harvest_nested(sub, &url, depth + 1).await
                } else {
                    Vec::new()
                };
                nodes.push(CategoryNode::new(label, url, children));
            }
            nodes
        }
        .boxed()
    }

    /// Links inside the containers below `link`'s item, in document order.
    ///
    /// `None` when the item also holds a link outside those containers:
    /// then the item is the menu list itself, not a submenu.
    async fn submenu(&self, link: ElementHandle) -> Option<Vec<ElementHandle>> {
        let item = match self.ctx.parent(link).await {
            Ok(Some(item)) => item,
            Ok(None) => return None,
            Err(e) => {
                debug!("cannot read parent of {link:?}: {e:#}");
                return None;
            }
        };
        let containers = self
            .ctx
            .query_all(Some(item), &self.rules.submenu_containers)
            .await
            .ok()?;

        let mut seen = HashSet::new();
        let mut nested = Vec::new();
        for container in containers {
            let inner = self
                .ctx
                .query_all(Some(container), &self.rules.menu_links)
                .await
                .ok()?;
            for a in inner {
                if a != link && seen.insert(a) {
                    nested.push(a);
                }
            }
        }

        let all = self.ctx.query_all(Some(item), &self.rules.menu_links).await.ok()?;
        if all.iter().any(|a| *a != link && !seen.contains(a)) {
            return None;
        }
        Some(nested)
    }

    /// Drop links that sit in the submenu of another link in `links`.
    async fn outermost(&self, links: Vec<ElementHandle>) -> Vec<ElementHandle> {
        let mut deeper = HashSet::new();
        for link in &links {
            if let Some(submenu) = self.submenu(*link).await {
                deeper.extend(submenu);
            }
        }
        links.into_iter().filter(|l| !deeper.contains(l)).collect()
    }
}

fn count_nodes(node: &CategoryNode) -> usize {
    1 + node.children().iter().map(count_nodes).sum::<usize>()
}
