// Copyright 2026 Shopnav Contributors
// SPDX-License-Identifier: Apache-2.0

//! The tunable heuristic rule set.
//!
//! Every selector and threshold the inference components use lives here so
//! that sites with unusual markup can be handled by editing a JSON file
//! instead of the traversal code. Any subset of fields may be given; the
//! rest keep their defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Inclusive bounds on a label's length in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelBounds {
    pub min: usize,
    pub max: usize,
}

impl LabelBounds {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// Whether `label` (already trimmed) fits the bounds.
    pub fn accepts(&self, label: &str) -> bool {
        let len = label.chars().count();
        len >= self.min && len <= self.max
    }
}

/// Structural predicates and thresholds for navigation and facet inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    // ── Navigation locator ──
    /// Elements considered as primary-navigation candidates.
    pub nav_candidates: String,
    /// Links counted when scoring a candidate.
    pub nav_scoring_links: String,
    /// Candidates shorter than this (px) are brand strips, not menus.
    pub min_nav_height: f64,
    /// Minimum same-host links for a candidate to be accepted.
    pub min_same_host_links: usize,

    // ── Hierarchy builder ──
    /// Top-level links inside the located navigation.
    pub menu_links: String,
    /// Overlay panels revealed on hover.
    pub mega_panels: String,
    /// Links harvested from a mega panel.
    pub mega_links: String,
    /// Containers below a link's item that hold its submenu. Matched
    /// within a scope, so keep these free of descendant combinators.
    pub submenu_containers: String,
    /// Elements whose visible count is polled to detect a hover reveal.
    pub reveal_probe: String,
    pub top_label: LabelBounds,
    pub nested_label: LabelBounds,

    // ── Facet extractor ──
    pub facet_containers: String,
    pub facet_headings: String,
    pub facet_inputs: String,
    pub facet_links: String,
    /// Attribute on an input holding the href its option applies.
    pub facet_href_attribute: String,
    pub max_facet_name: usize,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            nav_candidates: [
                "nav",
                "[role=\"navigation\"]",
                "header ul",
                "header [class*=\"Header\"]",
            ]
            .join(", "),
            nav_scoring_links: "a[href]".into(),
            min_nav_height: 20.0,
            min_same_host_links: 3,

            menu_links: "a".into(),
            mega_panels: [
                "[class*=\"mega\"]",
                "[class*=\"Mega\"]",
                "[id*=\"mega\"]",
                "[id*=\"Mega\"]",
                "[data-testid*=\"mega\"]",
            ]
            .join(", "),
            mega_links: "a".into(),
            submenu_containers: "ul, ol, div".into(),
            reveal_probe: "a".into(),
            top_label: LabelBounds::new(2, 40),
            nested_label: LabelBounds::new(2, 60),

            facet_containers: "[data-testid*=\"filter\"], [class*=\"filter\"], aside".into(),
            facet_headings: "h2, h3, span[class*=\"title\"], p[class*=\"title\"]".into(),
            facet_inputs: "input[type=\"checkbox\"], input[type=\"radio\"]".into(),
            facet_links: "a[href*=\"?\"]".into(),
            facet_href_attribute: "data-href".into(),
            max_facet_name: 40,
        }
    }
}

impl RuleSet {
    /// Load a rule set from a JSON file, filling missing fields with defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rule set {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid rule set {}", path.display()))
    }

    /// Parse a rule set from JSON text.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
