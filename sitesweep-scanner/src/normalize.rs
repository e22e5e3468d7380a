//! Canonical string forms for URL equality.
//!
//! Two URLs name the same page iff their [`normalize`]d forms are equal. The
//! normalizer never fails: a string that does not parse as a URL is reduced
//! with the same rules applied textually, so one bad input cannot abort a
//! batch of validations.

use url::Url;

/// Normalize a URL for equality and dedup.
///
/// Lower-cases the host, strips trailing slashes from any non-root path,
/// keeps the query string and drops the fragment. The scheme is left alone,
/// so `http://` and `https://` forms of a page stay distinct.
pub fn normalize(url: &str) -> String {
    let trimmed = url.trim();
    match Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            let path = parsed.path().to_string();
            if path.len() > 1 && path.ends_with('/') {
                let stripped = path.trim_end_matches('/');
                parsed.set_path(if stripped.is_empty() { "/" } else { stripped });
            }
            parsed.to_string()
        }
        Err(_) => fallback_normalize(trimmed),
    }
}

fn fallback_normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let without_fragment = lowered.split('#').next().unwrap_or_default();
    let stripped = without_fragment.trim_end_matches('/');
    if stripped.is_empty() {
        without_fragment.to_string()
    } else {
        stripped.to_string()
    }
}

/// True when both URLs normalize to the same form.
pub fn same_page(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Resolve an anchor `href` against the page it was found on.
///
/// Returns `None` for hrefs that are not links for crawling purposes
/// (fragment-only, `mailto:`, `tel:`, `javascript:`) and for hrefs that
/// cannot be made absolute. The fragment of the resolved URL is removed.
pub fn resolve_href(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    let lowered = href.to_ascii_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("javascript:")
    {
        return None;
    }

    let base_url = Url::parse(base).ok()?;
    let mut resolved = base_url.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    resolved.set_fragment(None);

    Some(resolved.to_string())
}

/// Resolve a `Location` header value relative to the URL that produced it.
pub fn resolve_location(current: &str, location: &str) -> Option<String> {
    let base_url = Url::parse(current).ok()?;
    base_url.join(location.trim()).ok().map(|u| u.to_string())
}

/// Serialize a URL the way [`Url`] does, or return it unchanged when it
/// does not parse. Used to compare raw forms without tripping over an
/// implicit root slash.
pub fn serialize(url: &str) -> String {
    Url::parse(url.trim())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.trim().to_string())
}

/// A link is internal when its normalized form starts with the normalized
/// site base URL.
pub fn is_internal(url: &str, base_url: &str) -> bool {
    normalize(url).starts_with(&normalize(base_url))
}

/// Scheme of a URL, lower-cased, if it parses.
pub fn scheme_of(url: &str) -> Option<String> {
    Url::parse(url.trim()).ok().map(|u| u.scheme().to_string())
}
