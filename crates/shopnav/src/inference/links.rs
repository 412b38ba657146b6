//! Href resolution and host matching.

use crate::error::ScrapeError;
use url::Url;

/// Parse the URL a request was made for. Only absolute http(s) URLs are
/// accepted.
pub fn parse_page_url(raw: &str) -> Result<Url, ScrapeError> {
    let invalid = |reason: String| ScrapeError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(invalid("missing host".into())),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

/// Resolve `href` against `base`. Empty, missing, or unresolvable hrefs
/// yield `None`.
pub fn resolve(base: &Url, href: Option<&str>) -> Option<Url> {
    let href = href.map(str::trim).filter(|h| !h.is_empty())?;
    base.join(href).ok()
}

/// Resolve a top-level href, falling back to the site root.
pub fn resolve_top_level(home: &Url, href: Option<&str>) -> String {
    resolve(home, href)
        .or_else(|| home.join("/").ok())
        .map(String::from)
        .unwrap_or_else(|| home.to_string())
}

/// Resolve a nested href, falling back to the parent's resolved URL.
pub fn resolve_nested(home: &Url, href: Option<&str>, parent_url: &str) -> String {
    resolve(home, href)
        .map(String::from)
        .unwrap_or_else(|| parent_url.to_string())
}

/// Whether `href`, resolved against `base`, points at one of `hosts`.
/// Malformed hrefs never match.
pub fn is_same_host(base: &Url, href: Option<&str>, hosts: &[String]) -> bool {
    resolve(base, href)
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| hosts.iter().any(|h| h.eq_ignore_ascii_case(&host)))
}

/// The query portion of an href: everything after the first `?`, without
/// any fragment. Empty when there is no query.
pub fn query_fragment(href: &str) -> &str {
    let Some((_, rest)) = href.split_once('?') else {
        return "";
    };
    let rest = rest.split('#').next().unwrap_or("");
    rest.split('?').next().unwrap_or("")
}
