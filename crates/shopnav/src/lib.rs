// Copyright 2026 Shopnav Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shopnav — structural inference for e-commerce sites.
//!
//! Given a rendered page and nothing else, shopnav finds the primary
//! navigation bar, walks it into a category tree (following hover-revealed
//! submenus), and parses the filter widgets of a listing page into facets.
//!
//! The browser is abstracted behind [`renderer::Renderer`] and
//! [`renderer::RenderContext`]; [`pipeline::Scraper`] wires the inference
//! components to a browser with the resource policy each pipeline needs.

pub mod config;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod pool;
pub mod renderer;
pub mod rules;
pub mod types;

pub use config::{ScrapeConfig, SettleTiming, MAX_TREE_DEPTH};
pub use error::ScrapeError;
pub use pipeline::Scraper;
pub use rules::{LabelBounds, RuleSet};
pub use types::{compose_destination, CategoryNode, FacetGroup, FacetValue};
