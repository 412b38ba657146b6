//! Navigation locator: find the real primary menu among nav-like decoys.
//!
//! Tag matching alone over-selects (brand strips, footer lists, utility
//! bars). Candidates are filtered by rendered height and then scored by how
//! many of their links stay on the site's own host.

use super::links::is_same_host;
use super::read_attr;
use crate::error::ScrapeError;
use crate::renderer::{ElementHandle, RenderContext};
use crate::rules::RuleSet;
use tracing::{debug, info};
use url::Url;

/// A navigation candidate that passed the geometry filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavCandidate {
    pub element: ElementHandle,
    /// Number of same-host links inside the candidate.
    pub score: usize,
}

/// The highest-scoring candidate; ties keep the first seen.
pub fn best_candidate(candidates: &[NavCandidate]) -> Option<NavCandidate> {
    candidates.iter().fold(None, |best: Option<NavCandidate>, c| match best {
        Some(b) if b.score >= c.score => Some(b),
        _ => Some(*c),
    })
}

/// Locate the primary navigation element on the current page.
///
/// `hosts` are the hosts a link may point at to count as same-site, and
/// `page_url` is the base for resolving relative links.
pub async fn locate_navigation(
    ctx: &dyn RenderContext,
    rules: &RuleSet,
    page_url: &Url,
    hosts: &[String],
) -> Result<NavCandidate, ScrapeError> {
    let elements = ctx.query_all(None, &rules.nav_candidates).await?;
    debug!("{} navigation candidates", elements.len());

    let mut scored = Vec::with_capacity(elements.len());
    for element in elements {
        let height = match ctx.bounding_box(element).await {
            Ok(Some(rect)) => rect.height,
            Ok(None) => 0.0,
            Err(e) => {
                debug!("dropping candidate {element:?}: {e:#}");
                continue;
            }
        };
        if height < rules.min_nav_height {
            debug!("dropping candidate {element:?}: {height}px tall");
            continue;
        }

        let score = score_candidate(ctx, rules, element, page_url, hosts).await;
        debug!("candidate {element:?} scored {score}");
        scored.push(NavCandidate { element, score });
    }

    match best_candidate(&scored) {
        Some(best) if best.score >= rules.min_same_host_links => {
            info!(
                "navigation located with {} same-host links ({} candidates)",
                best.score,
                scored.len()
            );
            Ok(best)
        }
        _ => Err(ScrapeError::NavigationNotFound),
    }
}

async fn score_candidate(
    ctx: &dyn RenderContext,
    rules: &RuleSet,
    element: ElementHandle,
    page_url: &Url,
    hosts: &[String],
) -> usize {
    let links = match ctx.query_all(Some(element), &rules.nav_scoring_links).await {
        Ok(links) => links,
        Err(e) => {
            debug!("cannot list links of {element:?}: {e:#}");
            return 0;
        }
    };

    let mut score = 0;
    for link in links {
        let href = read_attr(ctx, link, "href").await;
        if is_same_host(page_url, href.as_deref(), hosts) {
            score += 1;
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::fixture::FixtureRenderer;
    use crate::renderer::{Renderer, Viewport, WaitUntil};

    async fn locate(html: &str) -> Result<NavCandidate, ScrapeError> {
        let renderer = FixtureRenderer::new().with_page("https://x.com/", html);
        let mut ctx = renderer.new_context(Viewport::new(1280, 800)).await.unwrap();
        ctx.navigate("https://x.com/", WaitUntil::DomContentLoaded, 1000)
            .await
            .unwrap();
        let home = Url::parse("https://x.com/").unwrap();
        locate_navigation(ctx.as_ref(), &RuleSet::default(), &home, &["x.com".to_string()]).await
    }

    fn links(n: usize) -> String {
        (0..n)
            .map(|i| format!(r#"<a href="/c{i}">Category {i}</a>"#))
            .collect()
    }

    #[tokio::test]
    async fn test_two_links_is_not_enough() {
        let err = locate(&format!("<nav>{}</nav>", links(2))).await.unwrap_err();
        assert!(matches!(err, ScrapeError::NavigationNotFound));
    }

    #[tokio::test]
    async fn test_three_links_succeed() {
        let found = locate(&format!("<nav>{}</nav>", links(3))).await.unwrap();
        assert_eq!(found.score, 3);
    }

    #[tokio::test]
    async fn test_no_candidates_fails() {
        let err = locate("<div><a href='/a'>A</a></div>").await.unwrap_err();
        assert!(matches!(err, ScrapeError::NavigationNotFound));
    }

    #[tokio::test]
    async fn test_thin_strip_is_ignored() {
        let html = format!(
            r#"<nav id="brand" data-height="12">{}</nav><nav id="menu">{}</nav>"#,
            links(9),
            links(4)
        );
        let found = locate(&html).await.unwrap();
        assert_eq!(found.score, 4);
    }

    #[tokio::test]
    async fn test_off_host_and_malformed_links_do_not_count() {
        let html = r#"<nav>
            <a href="/a">A</a><a href="https://x.com/b">B</a>
            <a href="https://partner.com/c">C</a><a href="http://[bad">D</a><a>E</a>
        </nav>"#;
        let err = locate(html).await.unwrap_err();
        assert!(matches!(err, ScrapeError::NavigationNotFound));
    }

    #[tokio::test]
    async fn test_header_list_beats_sparse_nav() {
        let html = format!(
            r#"<nav id="utility">{}</nav><header><ul id="menu">{}</ul></header>"#,
            links(3),
            links(6)
        );
        let found = locate(&html).await.unwrap();
        assert_eq!(found.score, 6);
    }

    #[test]
    fn test_ties_keep_first_seen() {
        let candidates = [
            NavCandidate { element: ElementHandle(1), score: 2 },
            NavCandidate { element: ElementHandle(2), score: 5 },
            NavCandidate { element: ElementHandle(3), score: 5 },
        ];
        assert_eq!(best_candidate(&candidates).unwrap().element, ElementHandle(2));
        assert_eq!(best_candidate(&[]), None);
    }

    #[tokio::test]
    async fn test_more_same_host_links_never_score_lower() {
        for extra in 0..4 {
            let html = format!(
                r#"<nav id="a">{}</nav><div role="navigation" id="b">{}</div>"#,
                links(3),
                links(3 + extra)
            );
            let found = locate(&html).await.unwrap();
            assert_eq!(found.score, 3 + extra);
        }
    }

    #[tokio::test]
    async fn test_selection_is_deterministic() {
        let html = format!("<nav>{}</nav><nav>{}</nav>", links(4), links(4));
        let first = locate(&html).await.unwrap();
        for _ in 0..3 {
            assert_eq!(locate(&html).await.unwrap(), first);
        }
    }
}
