//! URL canonicalization and validation
//!
//! The normalized form produced here is the identity for every page-keyed
//! record: the frontier, the page store, and the index all key on it.
//! Canonicalization: resolve against the base, accept only http/https,
//! lowercase host, strip the fragment, sort query parameters by key, and
//! strip a single trailing slash unless the path is `/`.

use url::Url;

/// Canonicalize a URL, optionally resolving it against a base
///
/// Returns `None` on parse failure, non-web schemes, or a missing host.
/// Idempotent: `normalize(normalize(u)) == normalize(u)`.
pub fn normalize(raw: &str, base: Option<&Url>) -> Option<String> {
    let mut url = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }

    // The url crate lowercases registered domain names on parse; reject
    // anything without a host outright.
    url.host_str()?;

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        // Stable sort keeps values of repeated keys in document order
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        url.query_pairs_mut()
            .clear()
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    let path = url.path();
    if path != "/" && path.ends_with('/') {
        let trimmed = path[..path.len() - 1].to_string();
        url.set_path(&trimmed);
    }

    Some(url.to_string())
}

/// Extract the lowercased host from a URL string
pub fn extract_host(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|h| h.to_ascii_lowercase())
}

/// Check a URL's host against a domain allowlist
///
/// An empty allowlist permits everything. A host matches an entry when it
/// equals the entry or is a subdomain of it (`blog.example.com` matches
/// `example.com`; `notexample.com` does not).
pub fn should_crawl_domain(url: &str, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }

    let host = match extract_host(url) {
        Some(h) => h,
        None => return false,
    };

    allowlist.iter().any(|entry| {
        let entry = entry.to_ascii_lowercase();
        host == entry || host.ends_with(&format!(".{entry}"))
    })
}
