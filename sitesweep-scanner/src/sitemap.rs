//! Sitemap protocol documents: parsing, rendering, splitting and
//! flattening of sitemap indexes.

use crate::error::{Result, ScanError};
use crate::normalize::normalize;
use crate::probe::Prober;
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

pub const SITEMAP_NAMESPACE: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Protocol ceiling on entries per document.
pub const DEFAULT_MAX_ENTRIES: usize = 50_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<urlset>`: page entries.
    UrlSet(Vec<SitemapEntry>),
    /// `<sitemapindex>`: locations of further sitemap documents.
    Index(Vec<String>),
}

impl SitemapDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        parse_sitemap(xml)
    }

    pub fn len(&self) -> usize {
        match self {
            SitemapDocument::UrlSet(entries) => entries.len(),
            SitemapDocument::Index(locs) => locs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Root {
    UrlSet,
    Index,
}

/// A `<loc>` names an entry only as a direct child of `<url>` or
/// `<sitemap>`; extension elements such as `<image:loc>` sit deeper.
fn is_entry_loc(open: &[Vec<u8>]) -> bool {
    open.len() == 2 && matches!(open[1].as_slice(), b"url" | b"sitemap")
}

/// Parse a `<urlset>` or `<sitemapindex>` document, collecting entry
/// `<loc>` values in document order.
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root: Option<Root> = None;
    // local names of the currently open elements
    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut in_loc = false;
    let mut current = String::new();
    let mut locs = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name().as_ref().to_vec();
                if open.is_empty() {
                    match name.as_slice() {
                        b"urlset" => root = Some(Root::UrlSet),
                        b"sitemapindex" => root = Some(Root::Index),
                        _ => {}
                    }
                } else if name.as_slice() == b"loc" && is_entry_loc(&open) {
                    in_loc = true;
                    current.clear();
                }
                open.push(name);
            }
            Ok(Event::Text(ref e)) if in_loc => {
                let text = e
                    .unescape()
                    .map_err(|err| ScanError::ParseError(format!("Bad <loc> text: {}", err)))?;
                current.push_str(&text);
            }
            Ok(Event::CData(e)) if in_loc => {
                current.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"loc" && in_loc {
                    let loc = current.trim();
                    if !loc.is_empty() {
                        locs.push(loc.to_string());
                    }
                    in_loc = false;
                }
                open.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ScanError::ParseError(format!(
                    "Malformed sitemap at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    match root {
        Some(Root::UrlSet) => Ok(SitemapDocument::UrlSet(
            locs.into_iter().map(|url| SitemapEntry { url }).collect(),
        )),
        Some(Root::Index) => Ok(SitemapDocument::Index(locs)),
        None => Err(ScanError::ParseError(
            "Document has no <urlset> or <sitemapindex> root".to_string(),
        )),
    }
}

/// Render a `<urlset>` document listing `urls` in the given order.
pub fn render_urlset<S: AsRef<str>>(urls: &[S]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<urlset xmlns=\"{}\">\n", SITEMAP_NAMESPACE));
    for url in urls {
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape(url.as_ref())));
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

/// Render a `<sitemapindex>` document pointing at `locations`.
pub fn render_index<S: AsRef<str>>(locations: &[S]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<sitemapindex xmlns=\"{}\">\n", SITEMAP_NAMESPACE));
    for loc in locations {
        xml.push_str("  <sitemap>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape(loc.as_ref())));
        xml.push_str("  </sitemap>\n");
    }
    xml.push_str("</sitemapindex>\n");
    xml
}

/// One output file of a (possibly split) sitemap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapFile {
    pub file_name: String,
    pub document: String,
    pub entries: Vec<String>,
}

/// The documents that replace one sitemap. Either a single `urlset`
/// (`index` is `None`) or `ceil(N / max_entries)` chunks plus an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapSplit {
    pub chunks: Vec<SitemapFile>,
    pub index: Option<SitemapFile>,
}

impl SitemapSplit {
    pub fn is_split(&self) -> bool {
        self.index.is_some()
    }

    /// Every file to write, index last.
    pub fn files(&self) -> impl Iterator<Item = &SitemapFile> {
        self.chunks.iter().chain(self.index.iter())
    }
}

/// Partition `urls` into documents of at most `max_entries` entries.
///
/// `stem` names the files (`stem.xml`, or `stem-0.xml`.. plus the index at
/// `stem.xml`), `public_base` is the URL prefix chunk locations are
/// published under. A `max_entries` of zero is treated as one.
pub fn split_sitemap(
    urls: &[String],
    max_entries: usize,
    public_base: &str,
    stem: &str,
) -> SitemapSplit {
    let max_entries = max_entries.max(1);

    if urls.len() <= max_entries {
        return SitemapSplit {
            chunks: vec![SitemapFile {
                file_name: format!("{}.xml", stem),
                document: render_urlset(urls),
                entries: urls.to_vec(),
            }],
            index: None,
        };
    }

    let base = public_base.trim_end_matches('/');
    let chunks: Vec<SitemapFile> = urls
        .chunks(max_entries)
        .enumerate()
        .map(|(i, chunk)| SitemapFile {
            file_name: format!("{}-{}.xml", stem, i),
            document: render_urlset(chunk),
            entries: chunk.to_vec(),
        })
        .collect();

    let locations: Vec<String> = chunks
        .iter()
        .map(|c| format!("{}/{}", base, c.file_name))
        .collect();

    debug!(
        "Split {} sitemap entries into {} documents",
        urls.len(),
        chunks.len()
    );

    SitemapSplit {
        index: Some(SitemapFile {
            file_name: format!("{}.xml", stem),
            document: render_index(&locations),
            entries: locations,
        }),
        chunks,
    }
}

/// Default sitemap location for a site.
pub fn default_sitemap_url(site_url: &str) -> String {
    format!("{}/sitemap.xml", site_url.trim_end_matches('/'))
}

/// Flatten a parsed document into page URLs, fetching nested sitemaps of
/// an index with an explicit worklist. Nested documents that cannot be
/// fetched or parsed are skipped.
pub async fn flatten_document(
    prober: &Prober,
    document: SitemapDocument,
    origin: Option<&str>,
) -> Vec<String> {
    let mut seen_documents: HashSet<String> = origin.map(normalize).into_iter().collect();
    let mut pending: VecDeque<String> = VecDeque::new();
    let mut pages = Vec::new();

    let mut absorb = |doc: SitemapDocument, pending: &mut VecDeque<String>| match doc {
        SitemapDocument::UrlSet(entries) => pages.extend(entries.into_iter().map(|e| e.url)),
        SitemapDocument::Index(locs) => {
            for loc in locs {
                if seen_documents.insert(normalize(&loc)) {
                    pending.push_back(loc);
                }
            }
        }
    };

    absorb(document, &mut pending);

    while let Some(location) = pending.pop_front() {
        let Some(xml) = prober.fetch_text(&location).await else {
            warn!("Skipping unreachable nested sitemap {}", location);
            continue;
        };
        match parse_sitemap(&xml) {
            Ok(doc) => absorb(doc, &mut pending),
            Err(e) => warn!("Skipping nested sitemap {}: {}", location, e),
        }
    }

    dedupe_urls(pages)
}

/// Fetch a sitemap (or sitemap index) and return its page URLs.
/// Unreachable or malformed top-level documents yield an empty list.
pub async fn collect_sitemap_urls(prober: &Prober, sitemap_url: &str) -> Vec<String> {
    let Some(xml) = prober.fetch_text(sitemap_url).await else {
        warn!("Sitemap {} could not be fetched", sitemap_url);
        return Vec::new();
    };

    match parse_sitemap(&xml) {
        Ok(document) => flatten_document(prober, document, Some(sitemap_url)).await,
        Err(e) => {
            warn!("Sitemap {} is not a sitemap document: {}", sitemap_url, e);
            Vec::new()
        }
    }
}

/// Drop later duplicates by normalized form, keeping first appearance.
pub fn dedupe_urls<I: IntoIterator<Item = String>>(urls: I) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(normalize(url)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[test]
    fn test_parse_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://example.com/</loc><priority>1.0</priority></url>
              <url><loc> https://example.com/a?x=1&amp;y=2 </loc></url>
            </urlset>"#;

        let doc = parse_sitemap(xml).unwrap();
        assert_eq!(
            doc,
            SitemapDocument::UrlSet(vec![
                SitemapEntry {
                    url: "https://example.com/".to_string()
                },
                SitemapEntry {
                    url: "https://example.com/a?x=1&y=2".to_string()
                },
            ])
        );
    }

    #[test]
    fn test_parse_index() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <sitemap><loc>https://example.com/sitemap-0.xml</loc></sitemap>
              <sitemap><loc><![CDATA[https://example.com/sitemap-1.xml]]></loc></sitemap>
            </sitemapindex>"#;

        let doc = parse_sitemap(xml).unwrap();
        assert_eq!(
            doc,
            SitemapDocument::Index(vec![
                "https://example.com/sitemap-0.xml".to_string(),
                "https://example.com/sitemap-1.xml".to_string(),
            ])
        );
    }

    #[test]
    fn test_parse_skips_image_and_video_extension_locs() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
                xmlns:image="http://www.google.com/schemas/sitemap-image/1.1"
                xmlns:video="http://www.google.com/schemas/sitemap-video/1.1">
              <url>
                <loc>https://example.com/p</loc>
                <image:image><image:loc>https://example.com/img.jpg</image:loc></image:image>
                <video:video><video:content_loc>https://example.com/v.mp4</video:content_loc></video:video>
              </url>
            </urlset>"#;

        let doc = parse_sitemap(xml).unwrap();
        assert_eq!(
            doc,
            SitemapDocument::UrlSet(vec![SitemapEntry {
                url: "https://example.com/p".to_string()
            }])
        );
    }

    #[test]
    fn test_parse_rejects_non_sitemap() {
        assert!(parse_sitemap("<html><body>nope</body></html>").is_err());
        assert!(parse_sitemap("<urlset><url><loc>x</url></urlset>").is_err());
    }

    #[test]
    fn test_render_escapes_and_parses_back() {
        let urls = vec!["https://example.com/a?x=1&y=2".to_string()];
        let xml = render_urlset(&urls);
        assert!(xml.contains("&amp;"));
        assert!(xml.contains(SITEMAP_NAMESPACE));

        match parse_sitemap(&xml).unwrap() {
            SitemapDocument::UrlSet(entries) => assert_eq!(entries[0].url, urls[0]),
            other => panic!("unexpected document {:?}", other),
        }
    }

    #[test]
    fn test_split_under_ceiling_is_single_document() {
        let urls: Vec<String> = (0..3).map(|i| format!("https://example.com/{i}")).collect();
        let split = split_sitemap(&urls, 3, "https://example.com", "sitemap");

        assert!(!split.is_split());
        assert_eq!(split.chunks.len(), 1);
        assert_eq!(split.chunks[0].file_name, "sitemap.xml");
        assert_eq!(split.chunks[0].entries, urls);
    }

    #[test]
    fn test_split_over_ceiling() {
        let urls: Vec<String> = (0..7).map(|i| format!("https://example.com/{i}")).collect();
        let split = split_sitemap(&urls, 3, "https://example.com/", "sitemap");

        // ceil(7 / 3) chunks plus exactly one index
        assert_eq!(split.chunks.len(), 3);
        let index = split.index.as_ref().unwrap();
        assert_eq!(index.file_name, "sitemap.xml");
        assert_eq!(
            index.entries,
            vec![
                "https://example.com/sitemap-0.xml",
                "https://example.com/sitemap-1.xml",
                "https://example.com/sitemap-2.xml",
            ]
        );

        let union: Vec<String> = split
            .chunks
            .iter()
            .flat_map(|c| c.entries.iter().cloned())
            .collect();
        assert_eq!(union, urls);
        assert!(split.chunks.iter().all(|c| c.entries.len() <= 3));

        match parse_sitemap(&index.document).unwrap() {
            SitemapDocument::Index(locs) => assert_eq!(locs.len(), 3),
            other => panic!("unexpected document {:?}", other),
        }
        assert_eq!(split.files().count(), 4);
    }

    #[test]
    fn test_dedupe_urls_by_normalized_form() {
        let urls = vec![
            "https://example.com/a".to_string(),
            "https://EXAMPLE.com/a/".to_string(),
            "https://example.com/b".to_string(),
        ];
        assert_eq!(
            dedupe_urls(urls),
            vec!["https://example.com/a", "https://example.com/b"]
        );
    }

    #[tokio::test]
    async fn test_collect_flattens_index() {
        let mock_server = MockServer::start().await;
        let base = mock_server.uri();

        let index = render_index(&[
            format!("{base}/sitemap-0.xml"),
            format!("{base}/sitemap-1.xml"),
            format!("{base}/missing.xml"),
            format!("{base}/sitemap.xml"),
        ]);
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(index, "application/xml"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap-0.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                render_urlset(&[format!("{base}/a"), format!("{base}/b")]),
                "application/xml",
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap-1.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                render_urlset(&[format!("{base}/b/"), format!("{base}/c")]),
                "application/xml",
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let prober = Prober::with_timeout(Duration::from_secs(5)).unwrap();
        let urls = collect_sitemap_urls(&prober, &default_sitemap_url(&base)).await;

        assert_eq!(
            urls,
            vec![
                format!("{base}/a"),
                format!("{base}/b"),
                format!("{base}/c"),
            ]
        );
    }

    #[tokio::test]
    async fn test_collect_unreachable_sitemap_is_empty() {
        let prober = Prober::with_timeout(Duration::from_secs(2)).unwrap();
        let urls = collect_sitemap_urls(&prober, "http://127.0.0.1:1/sitemap.xml").await;
        assert!(urls.is_empty());
    }
}
