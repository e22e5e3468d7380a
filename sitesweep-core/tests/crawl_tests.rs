// Tests for crawl orchestration and the full audit pipeline

use sitesweep_core::audit::{AuditOptions, execute_audit};
use sitesweep_core::crawl::{
    CrawlOptions, CrawlSeed, broken_link_issue, execute_crawl, generate_crawl_report,
    parse_site_url,
};
use sitesweep_core::issue::IssueKind;
use sitesweep_core::{AuditConfig, AuditError, ValidationIssue};
use sitesweep_scanner::{DiscoveredLink, LinkClass, LinkSource, LinkStatus, ProbeResult};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn test_config() -> AuditConfig {
    AuditConfig::default()
        .with_timeout(Duration::from_secs(5))
        .with_workers(4)
}

fn html(head: &str, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head>{head}</head><body>{body}</body></html>"),
        "text/html",
    )
}

async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

/// `/` links to `/about`, `/missing` and a mailto; `/old` redirects to
/// `/about`; the sitemap lists `/`, `/about`, `/old` and `/gone`.
async fn mount_site(server: &MockServer) {
    let base = server.uri();

    mount(
        server,
        "/",
        html(
            &format!(r#"<link rel="canonical" href="{base}/">"#),
            r#"<a href="/about">About</a>
               <a href="/missing">Docs</a>
               <a href="mailto:team@example.com">Mail</a>"#,
        ),
    )
    .await;
    mount(
        server,
        "/about",
        html(
            &format!(r#"<link rel="canonical" href="{base}/about">"#),
            r#"<a href="/">Home</a>"#,
        ),
    )
    .await;
    mount(
        server,
        "/old",
        ResponseTemplate::new(301).insert_header("location", "/about"),
    )
    .await;
    mount(server, "/missing", ResponseTemplate::new(404)).await;
    mount(server, "/gone", ResponseTemplate::new(404)).await;

    let sitemap = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{base}/</loc></url>
  <url><loc>{base}/about</loc></url>
  <url><loc>{base}/old</loc></url>
  <url><loc>{base}/gone</loc></url>
</urlset>"#
    );
    mount(
        server,
        "/sitemap.xml",
        ResponseTemplate::new(200).set_body_raw(sitemap, "application/xml"),
    )
    .await;
}

// ============================================================================
// Site URL Tests
// ============================================================================

#[test]
fn test_parse_site_url_accepts_http_and_https() {
    assert!(parse_site_url("http://example.com").is_ok());
    assert!(parse_site_url("https://example.com/blog/").is_ok());
}

#[test]
fn test_parse_site_url_rejects_other_schemes() {
    assert!(matches!(
        parse_site_url("ftp://example.com"),
        Err(AuditError::InvalidUrl(_))
    ));
    assert!(matches!(
        parse_site_url("not a url"),
        Err(AuditError::InvalidUrl(_))
    ));
}

// ============================================================================
// Broken Link Tests
// ============================================================================

fn link_status(status_code: u16) -> LinkStatus {
    let mut link = DiscoveredLink::new(
        "https://example.com/target".to_string(),
        LinkClass::External,
    );
    link.add_source(LinkSource {
        page_url: "https://example.com/first".to_string(),
        anchor_text: "first".to_string(),
    });
    link.add_source(LinkSource {
        page_url: "https://example.com/second".to_string(),
        anchor_text: "second".to_string(),
    });
    LinkStatus {
        link,
        probe: ProbeResult::new("https://example.com/target".to_string(), status_code),
    }
}

#[test]
fn test_broken_link_issue_uses_first_source() {
    let issue = broken_link_issue(&link_status(404)).unwrap();
    assert_eq!(
        issue,
        ValidationIssue::BrokenLink {
            target_url: "https://example.com/target".to_string(),
            status_code: 404,
            source_page: "https://example.com/first".to_string(),
            anchor_text: "first".to_string(),
            class: LinkClass::External,
        }
    );
}

#[test]
fn test_broken_link_issue_ignores_healthy_and_redirecting_links() {
    assert!(broken_link_issue(&link_status(200)).is_none());
    assert!(broken_link_issue(&link_status(301)).is_none());
    assert!(broken_link_issue(&link_status(0)).is_some());
    assert!(broken_link_issue(&link_status(503)).is_some());
}

#[test]
fn test_issue_kind_names_on_the_wire() {
    let issue = ValidationIssue::SitemapNotFound {
        url: "https://example.com/gone".to_string(),
        status_code: 404,
    };
    let value = serde_json::to_value(&issue).unwrap();
    assert_eq!(value["kind"], "sitemap-404");
    assert_eq!(IssueKind::from_str("sitemap-404"), Some(issue.kind()));

    let issue = ValidationIssue::SitemapServerError {
        url: "https://example.com/flaky".to_string(),
        status_code: 502,
    };
    assert_eq!(serde_json::to_value(&issue).unwrap()["kind"], "sitemap-5xx");

    for kind in [
        IssueKind::CanonicalSelfReferenceMismatch,
        IssueKind::HreflangPointsToRedirect,
        IssueKind::SitemapNonCanonical,
    ] {
        assert_eq!(IssueKind::from_str(kind.as_str()), Some(kind));
    }
}

// ============================================================================
// Crawl Tests
// ============================================================================

#[tokio::test]
async fn test_execute_crawl_discovers_and_checks_links() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let outcome = execute_crawl(
        &test_config(),
        CrawlOptions {
            site_url: base.clone(),
            seed: CrawlSeed::Discover,
        },
        None,
    )
    .await
    .unwrap();

    assert_eq!(outcome.seed_urls, vec![base.clone()]);
    assert_eq!(outcome.graph.visited.len(), 3);
    assert_eq!(outcome.total_links(), 3);
    assert_eq!(outcome.broken_count(), 1);
    assert_eq!(outcome.valid_links(), 2);

    let issues = outcome.broken_link_issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].primary_url(), format!("{base}/missing"));

    let report = generate_crawl_report(&outcome);
    assert!(report.contains("Pages crawled: 3"));
    assert!(report.contains("Broken links: 1"));
    assert!(report.contains(&format!("{base}/missing")));
}

#[tokio::test]
async fn test_execute_crawl_seeded_from_sitemap() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();

    let outcome = execute_crawl(
        &test_config(),
        CrawlOptions {
            site_url: base.clone(),
            seed: CrawlSeed::Sitemap(format!("{base}/sitemap.xml")),
        },
        Some(Arc::new(move |msg: String| {
            sink.lock().unwrap().push(msg);
        })),
    )
    .await
    .unwrap();

    assert_eq!(outcome.seed_urls.len(), 4);
    assert!(
        outcome
            .graph
            .pages
            .iter()
            .any(|page| page.ends_with("/gone"))
    );

    let messages = messages.lock().unwrap();
    assert!(messages.iter().any(|m| m.starts_with("Reading sitemap")));
    assert!(messages.iter().any(|m| m.starts_with("Checking")));
}

#[tokio::test]
async fn test_execute_crawl_falls_back_to_root_without_sitemap() {
    let server = MockServer::start().await;
    mount(&server, "/", html("", "no links")).await;
    let base = server.uri();

    let outcome = execute_crawl(
        &test_config(),
        CrawlOptions {
            site_url: base.clone(),
            seed: CrawlSeed::Sitemap(format!("{base}/sitemap.xml")),
        },
        None,
    )
    .await
    .unwrap();

    assert_eq!(outcome.seed_urls, vec![base]);
    assert_eq!(outcome.graph.visited.len(), 1);
    assert_eq!(outcome.total_links(), 0);
}

#[tokio::test]
async fn test_execute_crawl_rejects_bad_configuration() {
    let result = execute_crawl(
        &test_config().with_workers(0),
        CrawlOptions {
            site_url: "https://example.com".to_string(),
            seed: CrawlSeed::Discover,
        },
        None,
    )
    .await;

    assert!(matches!(result, Err(AuditError::InvalidOption(_))));
}

// ============================================================================
// Audit Tests
// ============================================================================

#[tokio::test]
async fn test_execute_audit_end_to_end() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let report = execute_audit(&test_config(), AuditOptions::new(base.clone()), None)
        .await
        .unwrap();

    assert_eq!(report.site_url, base);
    assert!(report.finished_at >= report.started_at);

    assert_eq!(report.broken_links.len(), 1);
    assert!(report.canonical_issues.is_empty());
    assert!(report.hreflang_issues.is_empty());

    assert_eq!(report.redirect_chains.len(), 1);
    assert_eq!(report.redirect_chains[0].start_url, format!("{base}/old"));
    assert_eq!(report.redirect_chains[0].final_url, format!("{base}/about"));

    assert_eq!(
        report.sitemap_issues,
        vec![
            ValidationIssue::SitemapIsRedirect {
                url: format!("{base}/old"),
                status_code: 301,
                destination: Some(format!("{base}/about")),
            },
            ValidationIssue::SitemapNotFound {
                url: format!("{base}/gone"),
                status_code: 404,
            },
        ]
    );

    assert_eq!(report.summary.sitemap_entries, 4);
    assert_eq!(report.summary.broken_links, 1);
    assert_eq!(report.summary.health_score, 67);
    assert!(report.has_blocking_issues());
}

#[tokio::test]
async fn test_execute_audit_without_sitemap_uses_walked_pages() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(
        &server,
        "/",
        html("", r#"<a href="/page">Page</a>"#),
    )
    .await;
    mount(&server, "/page", html("", "")).await;

    let report = execute_audit(
        &test_config().with_check_hreflang(false),
        AuditOptions::new(base.clone()),
        None,
    )
    .await
    .unwrap();

    assert_eq!(report.summary.sitemap_entries, 0);
    assert!(report.sitemap_issues.is_empty());

    let missing: Vec<&str> = report
        .canonical_issues
        .iter()
        .filter(|i| i.kind() == IssueKind::MissingCanonical)
        .map(|i| i.primary_url())
        .collect();
    assert_eq!(missing.len(), 2);
    assert!(!report.has_blocking_issues());
}

#[tokio::test]
async fn test_execute_audit_rejects_invalid_site() {
    let result = execute_audit(&test_config(), AuditOptions::new("mailto:me@example.com"), None).await;
    assert!(matches!(result, Err(AuditError::InvalidUrl(_))));
}
