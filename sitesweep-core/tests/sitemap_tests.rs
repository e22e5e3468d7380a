// Tests for sitemap reconciliation, cleaning and splitting

use sitesweep_core::issue::{IssueKind, NoindexSource};
use sitesweep_core::sitemap::{SitemapReconciler, apply_actions, write_sitemap_files};
use sitesweep_core::{Severity, SitemapAction, ValidationIssue};
use sitesweep_scanner::Prober;
use sitesweep_scanner::sitemap::{SitemapDocument, parse_sitemap, render_urlset};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn reconciler() -> SitemapReconciler {
    SitemapReconciler::new(Prober::with_timeout(Duration::from_secs(5)).unwrap())
}

fn html(head: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head>{head}</head><body></body></html>"),
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

fn urls(base: &str, paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| format!("{base}{p}")).collect()
}

// ============================================================================
// Entry Validation
// ============================================================================

#[tokio::test]
async fn test_redirecting_entry_is_replaced_by_destination() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(
        &server,
        "/old",
        ResponseTemplate::new(301).insert_header("location", "/new"),
    )
    .await;
    mount(&server, "/new", html("")).await;

    let issue = reconciler().check_entry(&format!("{base}/old")).await;

    assert_eq!(
        issue,
        Some(ValidationIssue::SitemapIsRedirect {
            url: format!("{base}/old"),
            status_code: 301,
            destination: Some(format!("{base}/new")),
        })
    );
    let issue = issue.unwrap();
    assert_eq!(
        issue.sitemap_action(),
        Some(SitemapAction::Replace(format!("{base}/new")))
    );
    assert_eq!(issue.severity(), Severity::Warning);
}

#[tokio::test]
async fn test_looping_entry_is_removed() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(
        &server,
        "/a",
        ResponseTemplate::new(302).insert_header("location", "/b"),
    )
    .await;
    mount(
        &server,
        "/b",
        ResponseTemplate::new(302).insert_header("location", "/a"),
    )
    .await;

    let issue = reconciler().check_entry(&format!("{base}/a")).await.unwrap();

    assert_eq!(issue.kind(), IssueKind::SitemapIsRedirect);
    assert_eq!(issue.sitemap_action(), Some(SitemapAction::Remove));
    assert_eq!(issue.severity(), Severity::Error);
}

#[tokio::test]
async fn test_redirect_without_location_is_removed() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(&server, "/odd", ResponseTemplate::new(302)).await;
    mount(&server, "/ok", html("")).await;

    let issue = reconciler().check_entry(&format!("{base}/odd")).await;
    assert_eq!(
        issue,
        Some(ValidationIssue::SitemapIsRedirect {
            url: format!("{base}/odd"),
            status_code: 302,
            destination: None,
        })
    );

    let cleaned = reconciler().clean_urls(&urls(&base, &["/odd", "/ok"])).await;
    assert_eq!(cleaned.valid_urls, urls(&base, &["/ok"]));
}

#[tokio::test]
async fn test_missing_and_failing_entries() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(&server, "/gone", ResponseTemplate::new(404)).await;
    mount(&server, "/forbidden", ResponseTemplate::new(403)).await;
    mount(&server, "/broken", ResponseTemplate::new(500)).await;

    let issues = reconciler()
        .validate_entries(&urls(&base, &["/gone", "/forbidden", "/broken"]))
        .await;

    let kinds: Vec<IssueKind> = issues.iter().map(|i| i.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            IssueKind::SitemapNotFound,
            IssueKind::SitemapNotFound,
            IssueKind::SitemapServerError
        ]
    );
    assert_eq!(issues[2].sitemap_action(), Some(SitemapAction::Investigate));
}

#[tokio::test]
async fn test_unreachable_entry_is_a_server_error() {
    let issue = reconciler()
        .check_entry("http://127.0.0.1:1/page")
        .await
        .unwrap();

    assert_eq!(
        issue,
        ValidationIssue::SitemapServerError {
            url: "http://127.0.0.1:1/page".to_string(),
            status_code: 0,
        }
    );
    assert!(issue.suggestion().contains("unreachable"));
}

#[tokio::test]
async fn test_noindex_entries() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(
        &server,
        "/header",
        html("").insert_header("x-robots-tag", "noindex, nofollow"),
    )
    .await;
    mount(
        &server,
        "/meta",
        html(r#"<meta name="robots" content="NOINDEX">"#),
    )
    .await;

    let issues = reconciler()
        .validate_entries(&urls(&base, &["/header", "/meta"]))
        .await;

    assert_eq!(
        issues,
        vec![
            ValidationIssue::SitemapNoindex {
                url: format!("{base}/header"),
                source: NoindexSource::XRobotsTag,
            },
            ValidationIssue::SitemapNoindex {
                url: format!("{base}/meta"),
                source: NoindexSource::MetaRobots,
            },
        ]
    );
}

#[tokio::test]
async fn test_non_canonical_entry() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(
        &server,
        "/print",
        html(r#"<link rel="canonical" href="/article">"#),
    )
    .await;
    mount(
        &server,
        "/article",
        html(r#"<link rel="canonical" href="/article/">"#),
    )
    .await;

    let issues = reconciler()
        .validate_entries(&urls(&base, &["/print", "/article"]))
        .await;

    // a trailing-slash difference is still self-canonical
    assert_eq!(
        issues,
        vec![ValidationIssue::SitemapNonCanonical {
            url: format!("{base}/print"),
            canonical_url: format!("{base}/article"),
        }]
    );
}

#[tokio::test]
async fn test_healthy_entries_produce_no_issues() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(&server, "/one", html("")).await;
    mount(
        &server,
        "/feed.json",
        ResponseTemplate::new(200).set_body_raw("{}", "application/json"),
    )
    .await;

    let issues = reconciler()
        .validate_entries(&urls(&base, &["/one", "/feed.json"]))
        .await;

    assert!(issues.is_empty());
}

// ============================================================================
// Cleaning
// ============================================================================

#[tokio::test]
async fn test_clean_sitemap_replaces_removes_and_dedupes() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount(
        &server,
        "/old",
        ResponseTemplate::new(301).insert_header("location", "/new"),
    )
    .await;
    mount(&server, "/new", html("")).await;
    mount(&server, "/ok", html("")).await;
    mount(&server, "/gone", ResponseTemplate::new(404)).await;

    let document = render_urlset(&urls(&base, &["/old", "/ok", "/gone", "/new", "/ok"]));
    let cleaned = reconciler().clean_sitemap(&document).await.unwrap();

    assert_eq!(cleaned.valid_urls, urls(&base, &["/new", "/ok"]));
    assert_eq!(cleaned.issues.len(), 2);

    let reparsed = parse_sitemap(&cleaned.to_document()).unwrap();
    assert_eq!(reparsed.len(), 2);
}

#[tokio::test]
async fn test_clean_valid_sitemap_is_unchanged() {
    let server = MockServer::start().await;
    let base = server.uri();
    for route in ["/a", "/b", "/c"] {
        mount(&server, route, html("")).await;
    }

    let entries = urls(&base, &["/a", "/b", "/c"]);
    let cleaned = reconciler().clean_urls(&entries).await;

    assert!(cleaned.issues.is_empty());
    assert_eq!(cleaned.valid_urls, entries);
}

#[tokio::test]
async fn test_clean_sitemap_rejects_malformed_document() {
    let result = reconciler().clean_sitemap("<html>not a sitemap</html>").await;
    assert!(result.is_err());
}

#[test]
fn test_apply_actions() {
    let entries = vec![
        "https://example.com/keep".to_string(),
        "https://example.com/moved".to_string(),
        "https://example.com/dead".to_string(),
        "https://example.com/flaky".to_string(),
        "https://example.com/target".to_string(),
    ];
    let issues = vec![
        ValidationIssue::SitemapIsRedirect {
            url: "https://example.com/moved".to_string(),
            status_code: 301,
            destination: Some("https://example.com/target".to_string()),
        },
        ValidationIssue::SitemapNotFound {
            url: "https://example.com/dead".to_string(),
            status_code: 410,
        },
        ValidationIssue::SitemapServerError {
            url: "https://example.com/flaky".to_string(),
            status_code: 503,
        },
    ];

    assert_eq!(
        apply_actions(&entries, &issues),
        vec![
            "https://example.com/keep".to_string(),
            "https://example.com/target".to_string(),
        ]
    );
}

// ============================================================================
// Splitting
// ============================================================================

#[test]
fn test_split_and_write_files() {
    let temp_dir = TempDir::new().unwrap();
    let out_dir = temp_dir.path().join("out");

    let cleaned = sitesweep_core::sitemap::CleanedSitemap {
        valid_urls: (0..5)
            .map(|i| format!("https://example.com/page-{i}"))
            .collect(),
        issues: Vec::new(),
    };

    let split = cleaned.split(2, "https://example.com/", "sitemap");
    assert!(split.is_split());
    assert_eq!(split.chunks.len(), 3);

    let written = write_sitemap_files(&split, &out_dir).unwrap();
    let names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec!["sitemap-0.xml", "sitemap-1.xml", "sitemap-2.xml", "sitemap.xml"]
    );

    let index = std::fs::read_to_string(out_dir.join("sitemap.xml")).unwrap();
    match parse_sitemap(&index).unwrap() {
        SitemapDocument::Index(locations) => {
            assert_eq!(locations.len(), 3);
            assert_eq!(locations[0], "https://example.com/sitemap-0.xml");
        }
        other => panic!("expected an index, got {:?}", other),
    }

    let last = std::fs::read_to_string(out_dir.join("sitemap-2.xml")).unwrap();
    assert_eq!(parse_sitemap(&last).unwrap().len(), 1);
}

#[test]
fn test_small_sitemap_is_not_split() {
    let temp_dir = TempDir::new().unwrap();
    let cleaned = sitesweep_core::sitemap::CleanedSitemap {
        valid_urls: vec!["https://example.com/".to_string()],
        issues: Vec::new(),
    };

    let split = cleaned.split(reconciler().max_entries(), "https://example.com", "sitemap");
    assert!(!split.is_split());

    let written = write_sitemap_files(&split, temp_dir.path()).unwrap();
    assert_eq!(written.len(), 1);
    assert!(temp_dir.path().join("sitemap.xml").exists());
}
