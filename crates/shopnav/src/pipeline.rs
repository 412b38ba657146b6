// Copyright 2026 Shopnav Contributors
// SPDX-License-Identifier: Apache-2.0

//! The two request pipelines.
//!
//! Categories run on a dedicated browser launched for the request and shut
//! down when it ends, whatever the outcome. Facets run on a page of the
//! shared browser held by [`BrowserPool`].

use crate::config::ScrapeConfig;
use crate::error::ScrapeError;
use crate::inference::links::parse_page_url;
use crate::inference::{locate_navigation, FacetExtractor, HierarchyBuilder};
use crate::pool::BrowserPool;
use crate::renderer::chromium::ChromiumLauncher;
use crate::renderer::{RenderContext, Renderer, RendererFactory, WaitUntil};
use crate::types::{CategoryNode, FacetGroup};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Entry point for category and facet requests.
pub struct Scraper {
    factory: Arc<dyn RendererFactory>,
    pool: BrowserPool,
    config: Arc<ScrapeConfig>,
}

impl Scraper {
    pub fn new(factory: Arc<dyn RendererFactory>, config: ScrapeConfig) -> Self {
        Self {
            pool: BrowserPool::new(Arc::clone(&factory)),
            factory,
            config: Arc::new(config),
        }
    }

    /// A scraper driving headless Chromium.
    pub fn chromium(config: ScrapeConfig) -> Self {
        Self::new(Arc::new(ChromiumLauncher), config)
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// The shared browser used by facet requests.
    pub fn pool(&self) -> &BrowserPool {
        &self.pool
    }

    /// Infer the category tree of the site at `home_url`.
    pub async fn categories(&self, home_url: &str) -> Result<Vec<CategoryNode>, ScrapeError> {
        let home = parse_page_url(home_url)?;
        info!("category request for {home}");

        let renderer = self.factory.launch().await?;
        let result = self.categories_on(renderer.as_ref(), &home).await;
        if let Err(e) = renderer.shutdown().await {
            warn!("browser shutdown failed: {e:#}");
        }
        result
    }

    async fn categories_on(
        &self,
        renderer: &dyn Renderer,
        home: &Url,
    ) -> Result<Vec<CategoryNode>, ScrapeError> {
        let mut ctx = renderer.new_context(self.config.category_viewport).await?;
        let result = self.walk_categories(ctx.as_mut(), home).await;
        close(ctx).await;
        result
    }

    async fn walk_categories(
        &self,
        ctx: &mut dyn RenderContext,
        home: &Url,
    ) -> Result<Vec<CategoryNode>, ScrapeError> {
        let page_url = self.load(ctx, home, WaitUntil::DomContentLoaded).await?;

        let mut hosts: Vec<String> = Vec::new();
        for url in [home, &page_url] {
            if let Some(host) = url.host_str() {
                if !hosts.iter().any(|h| h.eq_ignore_ascii_case(host)) {
                    hosts.push(host.to_ascii_lowercase());
                }
            }
        }

        let rules = &self.config.rules;
        let nav = locate_navigation(ctx, rules, &page_url, &hosts).await?;
        HierarchyBuilder::new(ctx, rules, home)
            .with_settle(self.config.settle)
            .with_max_depth(self.config.max_depth)
            .build(nav.element)
            .await
    }

    /// Extract the filter facets of the listing page at `listing_url`.
    pub async fn facets(&self, listing_url: &str) -> Result<Vec<FacetGroup>, ScrapeError> {
        let listing = parse_page_url(listing_url)?;
        info!("facet request for {listing}");

        let renderer = self.pool.acquire().await?;
        let mut ctx = renderer.new_context(self.config.facet_viewport).await?;
        let result = match self.load(ctx.as_mut(), &listing, WaitUntil::NetworkIdle).await {
            Ok(_) => {
                FacetExtractor::new(ctx.as_ref(), &self.config.rules)
                    .extract()
                    .await
            }
            Err(e) => Err(e),
        };
        close(ctx).await;
        result
    }

    /// Load `url` on a dedicated browser and return the rendered HTML, for
    /// replay through the fixture renderer.
    pub async fn capture_html(&self, url: &str, wait: WaitUntil) -> Result<String, ScrapeError> {
        let page = parse_page_url(url)?;
        let renderer = self.factory.launch().await?;
        let result = self.capture_on(renderer.as_ref(), &page, wait).await;
        if let Err(e) = renderer.shutdown().await {
            warn!("browser shutdown failed: {e:#}");
        }
        result
    }

    async fn capture_on(
        &self,
        renderer: &dyn Renderer,
        page: &Url,
        wait: WaitUntil,
    ) -> Result<String, ScrapeError> {
        let mut ctx = renderer.new_context(self.config.category_viewport).await?;
        let result = match self.load(ctx.as_mut(), page, wait).await {
            Ok(_) => ctx.get_html().await.map_err(ScrapeError::from),
            Err(e) => Err(e),
        };
        close(ctx).await;
        result
    }

    /// Shut down the shared facet browser.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    /// Navigate and return the final URL.
    async fn load(
        &self,
        ctx: &mut dyn RenderContext,
        url: &Url,
        wait: WaitUntil,
    ) -> Result<Url, ScrapeError> {
        let nav = ctx
            .navigate(url.as_str(), wait, self.config.navigation_timeout_ms())
            .await
            .map_err(ScrapeError::from_navigation)?;
        info!("loaded {} in {}ms", nav.final_url, nav.load_time_ms);
        Ok(Url::parse(&nav.final_url).unwrap_or_else(|_| url.clone()))
    }
}

async fn close(ctx: Box<dyn RenderContext>) {
    if let Err(e) = ctx.close().await {
        debug!("page close failed: {e:#}");
    }
}
