// Copyright 2026 Shopnav Contributors
// SPDX-License-Identifier: Apache-2.0

//! Output model: the category tree and the facet groups of a listing page.

use crate::error::ScrapeError;
use serde::{Deserialize, Serialize};
use url::Url;

/// One entry in the inferred category tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    /// Display text of the link.
    pub label: String,
    /// Absolute URL of the category page.
    pub url: String,
    /// Sub-categories. `None` whenever nothing was recovered; never an
    /// empty vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<CategoryNode>>,
}

impl CategoryNode {
    /// Create a node, folding an empty child list into `None`.
    pub fn new(label: impl Into<String>, url: impl Into<String>, children: Vec<CategoryNode>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            children: if children.is_empty() {
                None
            } else {
                Some(children)
            },
        }
    }

    /// Create a node without children.
    pub fn leaf(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(label, url, Vec::new())
    }

    /// Children as a slice (empty for leaves).
    pub fn children(&self) -> &[CategoryNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Depth of the subtree rooted here (a leaf has depth 1).
    pub fn depth(&self) -> usize {
        1 + self.children().iter().map(Self::depth).max().unwrap_or(0)
    }
}

/// One filter dimension on a listing page, e.g. "Size".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetGroup {
    /// Group heading text.
    pub name: String,
    /// `true` for checkbox semantics, `false` for radio or link semantics.
    pub multi: bool,
    /// Selectable options. Never empty.
    pub values: Vec<FacetValue>,
}

/// One selectable option within a [`FacetGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FacetValue {
    /// Visible option text.
    pub label: String,
    /// Query-string fragment applying this option, e.g. `size=L`.
    pub qs: String,
}

impl FacetValue {
    /// Build a value, rejecting empty labels or fragments.
    pub fn new(label: &str, qs: &str) -> Option<Self> {
        let label = label.trim();
        let qs = qs.trim();
        if label.is_empty() || qs.is_empty() {
            return None;
        }
        Some(Self {
            label: label.to_string(),
            qs: qs.to_string(),
        })
    }
}

/// Compose the URL a shopper lands on after picking a leaf category and a
/// set of facet values.
///
/// Every `key=value` pair of each selected fragment is appended to the
/// leaf URL's query string; existing parameters are kept.
pub fn compose_destination<'a, I>(leaf_url: &str, selections: I) -> Result<Url, ScrapeError>
where
    I: IntoIterator<Item = &'a FacetValue>,
{
    let mut url = Url::parse(leaf_url).map_err(|e| ScrapeError::InvalidUrl {
        url: leaf_url.to_string(),
        reason: e.to_string(),
    })?;

    let pairs: Vec<(String, String)> = selections
        .into_iter()
        .flat_map(|v| {
            url::form_urlencoded::parse(v.qs.trim_start_matches('?').as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect::<Vec<_>>()
        })
        .collect();

    if !pairs.is_empty() {
        let mut query = url.query_pairs_mut();
        for (key, value) in &pairs {
            query.append_pair(key, value);
        }
    }

    Ok(url)
}
