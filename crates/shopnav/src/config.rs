// Copyright 2026 Shopnav Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration for the scraping pipelines.

use crate::renderer::Viewport;
use crate::rules::RuleSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Category trees are never deeper than this.
pub const MAX_TREE_DEPTH: usize = 3;

/// Budgets for waiting on hover-revealed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleTiming {
    /// Budget after hovering a top-level link.
    pub top_level: Duration,
    /// Budget after hovering a second-level link.
    pub nested: Duration,
    /// Interval between reveal probes.
    pub poll_interval: Duration,
}

impl Default for SettleTiming {
    fn default() -> Self {
        Self {
            top_level: Duration::from_millis(400),
            nested: Duration::from_millis(200),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Everything the pipelines need besides the browser itself.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Budget for a page to reach its load state.
    pub navigation_timeout: Duration,
    pub category_viewport: Viewport,
    pub facet_viewport: Viewport,
    pub settle: SettleTiming,
    /// Deepest tree level built (the top level is depth 1), at most
    /// [`MAX_TREE_DEPTH`].
    pub max_depth: usize,
    pub rules: RuleSet,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(45),
            category_viewport: Viewport::new(1280, 800),
            facet_viewport: Viewport::new(1280, 900),
            settle: SettleTiming::default(),
            max_depth: MAX_TREE_DEPTH,
            rules: RuleSet::default(),
        }
    }
}

impl ScrapeConfig {
    /// Defaults overridden by `SHOPNAV_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning, and so is a rule-set
    /// file that cannot be loaded.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_parse::<u64>("SHOPNAV_NAV_TIMEOUT_MS") {
            config.navigation_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("SHOPNAV_SETTLE_MS") {
            config.settle.top_level = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("SHOPNAV_NESTED_SETTLE_MS") {
            config.settle.nested = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("SHOPNAV_POLL_MS") {
            config.settle.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(depth) = env_parse::<usize>("SHOPNAV_MAX_DEPTH") {
            config.max_depth = depth.clamp(1, MAX_TREE_DEPTH);
        }
        if let Ok(path) = std::env::var("SHOPNAV_RULES") {
            let path = PathBuf::from(path);
            match RuleSet::load(&path) {
                Ok(rules) => config.rules = rules,
                Err(e) => warn!("ignoring SHOPNAV_RULES: {e:#}"),
            }
        }

        config
    }

    /// Replace the rule set.
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Navigation timeout in milliseconds, as the renderer expects it.
    pub fn navigation_timeout_ms(&self) -> u64 {
        self.navigation_timeout.as_millis().min(u128::from(u64::MAX)) as u64
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {key}={raw:?}: not a valid number");
            None
        }
    }
}
