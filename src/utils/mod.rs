//! Utility functions and helpers.

pub mod http;
pub mod retry;

use url::Url;

use crate::error::Result;

/// Build the URL of a numbered catalog page.
///
/// The page number replaces any existing value of `param` and other query
/// pairs are kept.
pub fn page_url(base: &Url, param: &str, page: u32) -> String {
    let mut url = base.clone();
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| k != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(param, &page.to_string());
    }
    url.to_string()
}

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Parse a base URL, rejecting ones that cannot carry a query.
pub fn parse_base(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)?;
    if parsed.cannot_be_a_base() {
        return Err(crate::error::AppError::config(format!(
            "{url} cannot be used as a catalog URL"
        )));
    }
    Ok(parsed)
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
