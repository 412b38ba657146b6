// Copyright 2026 Shopnav Contributors
// SPDX-License-Identifier: Apache-2.0

//! Request-level errors for the category and facet pipelines.
//!
//! Only conditions that abort a whole request live here. Per-element
//! anomalies (a link that cannot be hovered, a facet container without a
//! heading) are absorbed by the inference code and never surface.

use crate::renderer::RenderError;

/// Errors that abort a category or facet request.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    /// No navigation candidate reached the same-host link threshold.
    #[error("Navigation element not found")]
    NavigationNotFound,

    /// The page did not reach its load state within the timeout budget.
    /// Carries the browser's own message.
    #[error("{0}")]
    NavigationTimeout(String),

    /// Navigation failed for a reason other than a timeout.
    #[error("page load failed: {0}")]
    PageLoad(String),

    /// The requested URL is not an absolute http(s) URL.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The browser substrate failed (launch, page creation, DOM access).
    #[error(transparent)]
    Browser(#[from] anyhow::Error),
}

impl ScrapeError {
    /// Whether the error was caused by the caller's input rather than the
    /// site or the browser.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidUrl { .. })
    }

    /// Classify an error returned by `RenderContext::navigate`.
    pub(crate) fn from_navigation(err: anyhow::Error) -> Self {
        match err.downcast_ref::<RenderError>() {
            Some(RenderError::Timeout(_)) => Self::NavigationTimeout(err.to_string()),
            Some(_) => Self::PageLoad(err.to_string()),
            None => Self::PageLoad(format!("{err:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_not_found_message_is_verbatim() {
        assert_eq!(
            ScrapeError::NavigationNotFound.to_string(),
            "Navigation element not found"
        );
    }

    #[test]
    fn test_timeout_keeps_renderer_message() {
        let err = ScrapeError::from_navigation(RenderError::Timeout(45_000).into());
        assert!(matches!(err, ScrapeError::NavigationTimeout(_)));
        assert_eq!(err.to_string(), "navigation timed out after 45000ms");
    }

    #[test]
    fn test_other_navigation_failures_are_page_load() {
        let err = ScrapeError::from_navigation(anyhow::anyhow!("net::ERR_NAME_NOT_RESOLVED"));
        assert!(matches!(err, ScrapeError::PageLoad(_)));
        assert!(!err.is_client_error());
    }
}
