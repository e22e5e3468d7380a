//! SEO-relevant extraction from HTML documents.

use crate::normalize::resolve_href;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector"));
static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("link[rel][href]").expect("static selector"));
static META_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[content]").expect("static selector"));

/// An anchor whose `href` resolved to an absolute http(s) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HreflangLink {
    pub hreflang: String,
    pub url: String,
}

/// Everything the validators read from one page, parsed once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    /// Raw `href` of the first `<link rel="canonical">`.
    pub canonical: Option<String>,
    pub og_url: Option<String>,
    pub meta_noindex: bool,
    pub hreflangs: Vec<HreflangLink>,
}

fn has_rel(element: &ElementRef<'_>, wanted: &str) -> bool {
    element
        .value()
        .attr("rel")
        .map(|rel| {
            rel.split_ascii_whitespace()
                .any(|token| token.eq_ignore_ascii_case(wanted))
        })
        .unwrap_or(false)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract every followable anchor, resolved against `page_url`.
/// Anchors whose href cannot be resolved are skipped.
pub fn extract_anchors(html: &str, page_url: &str) -> Vec<Anchor> {
    let document = Html::parse_document(html);

    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|element| {
            let href = element.value().attr("href")?;
            let url = resolve_href(page_url, href)?;
            let text = collapse_whitespace(&element.text().collect::<String>());
            Some(Anchor { url, text })
        })
        .collect()
}

/// Parse canonical, `og:url`, robots meta and hreflang alternates.
pub fn extract_page_meta(html: &str, page_url: &str) -> PageMeta {
    let document = Html::parse_document(html);
    let mut meta = PageMeta::default();

    for element in document.select(&LINK_SELECTOR) {
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };

        if meta.canonical.is_none() && has_rel(&element, "canonical") && !href.is_empty() {
            meta.canonical = Some(href.to_string());
        }

        if has_rel(&element, "alternate")
            && let Some(hreflang) = element.value().attr("hreflang")
            && let Some(url) = resolve_href(page_url, href)
        {
            meta.hreflangs.push(HreflangLink {
                hreflang: hreflang.trim().to_string(),
                url,
            });
        }
    }

    for element in document.select(&META_SELECTOR) {
        let value = element.value();
        let content = value.attr("content").unwrap_or_default();

        if let Some(name) = value.attr("name") {
            let name = name.trim().to_ascii_lowercase();
            if (name == "robots" || name == "googlebot") && is_noindex_directive(content) {
                meta.meta_noindex = true;
            }
        }

        if meta.og_url.is_none()
            && value
                .attr("property")
                .map(|p| p.trim().eq_ignore_ascii_case("og:url"))
                .unwrap_or(false)
            && !content.trim().is_empty()
        {
            meta.og_url = Some(content.trim().to_string());
        }
    }

    meta
}

/// True when a robots directive list (meta content or `X-Robots-Tag`)
/// contains `noindex` or `none`.
pub fn is_noindex_directive(directives: &str) -> bool {
    directives
        .split([',', ' '])
        .map(|d| d.trim())
        .filter(|d| !d.is_empty())
        .any(|d| {
            // X-Robots-Tag may prefix a user agent: "googlebot: noindex"
            let d = d.rsplit(':').next().unwrap_or(d).trim();
            d.eq_ignore_ascii_case("noindex") || d.eq_ignore_ascii_case("none")
        })
}
