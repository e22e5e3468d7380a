use crate::canonical::CanonicalValidator;
use crate::config::AuditConfig;
use crate::crawl::{
    CrawlOptions, CrawlProgressCallback, CrawlSeed, execute_crawl, new_spinner, parse_site_url,
};
use crate::error::Result;
use crate::hreflang::HreflangValidator;
use crate::redirect::RedirectResolver;
use crate::report::AuditReport;
use crate::sitemap::SitemapReconciler;
use chrono::Utc;
use sitesweep_scanner::sitemap::{collect_sitemap_urls, default_sitemap_url};
use tracing::info;

pub struct AuditOptions {
    pub site_url: String,
    /// Defaults to `<site>/sitemap.xml`.
    pub sitemap_url: Option<String>,
    /// Seed the walker from the sitemap instead of discovering from the root.
    pub seed_from_sitemap: bool,
}

impl AuditOptions {
    pub fn new(site_url: impl Into<String>) -> Self {
        Self {
            site_url: site_url.into(),
            sitemap_url: None,
            seed_from_sitemap: false,
        }
    }

    pub fn with_sitemap(mut self, sitemap_url: impl Into<String>) -> Self {
        self.sitemap_url = Some(sitemap_url.into());
        self
    }

    pub fn seeded_from_sitemap(mut self, seed: bool) -> Self {
        self.seed_from_sitemap = seed;
        self
    }

    pub fn resolved_sitemap_url(&self) -> String {
        self.sitemap_url
            .clone()
            .unwrap_or_else(|| default_sitemap_url(&self.site_url))
    }
}

/// Run every validator against one site.
///
/// Order: walk and broken-link probe, canonicals, hreflang, redirect chains,
/// sitemap entries. Page-level validators run over the sitemap's pages, or
/// over the walked internal pages when the sitemap lists none.
pub async fn execute_audit(
    config: &AuditConfig,
    options: AuditOptions,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<AuditReport> {
    parse_site_url(&options.site_url)?;
    let prober = config.build_prober()?;
    let started_at = Utc::now().timestamp();

    let sitemap_url = options.resolved_sitemap_url();
    let sitemap_urls = collect_sitemap_urls(&prober, &sitemap_url).await;
    info!("Sitemap {} lists {} pages", sitemap_url, sitemap_urls.len());

    let seed = if options.seed_from_sitemap && !sitemap_urls.is_empty() {
        CrawlSeed::Urls(sitemap_urls.clone())
    } else {
        CrawlSeed::Discover
    };

    let outcome = execute_crawl(
        config,
        CrawlOptions {
            site_url: options.site_url.clone(),
            seed,
        },
        progress_callback.clone(),
    )
    .await?;

    let pages = if sitemap_urls.is_empty() {
        outcome.internal_pages()
    } else {
        sitemap_urls.clone()
    };

    let spinner = new_spinner(config.show_progress, "Validating pages...");
    let phase = |msg: &str| {
        if let Some(ref pb) = spinner {
            pb.set_message(msg.to_string());
        }
        if let Some(ref callback) = progress_callback {
            callback(msg.to_string());
        }
    };

    phase(&format!("Validating canonicals on {} pages", pages.len()));
    let canonical = CanonicalValidator::new(prober.clone(), options.site_url.clone())
        .with_workers(config.workers)
        .validate(&pages)
        .await;

    let hreflang_issues = if config.check_hreflang {
        phase("Checking hreflang alternates");
        HreflangValidator::new(prober.clone())
            .with_workers(config.workers)
            .validate_hreflangs(&pages)
            .await
    } else {
        Vec::new()
    };

    phase("Resolving redirect chains");
    let redirect_chains = RedirectResolver::new(prober.clone())
        .with_max_hops(config.max_hops)
        .with_workers(config.workers)
        .analyze_redirects(&pages)
        .await;

    phase(&format!("Validating {} sitemap entries", sitemap_urls.len()));
    let sitemap_issues = SitemapReconciler::new(prober)
        .with_workers(config.workers)
        .with_max_hops(config.max_hops)
        .with_max_entries(config.max_sitemap_entries)
        .validate_entries(&sitemap_urls)
        .await;

    if let Some(ref pb) = spinner {
        pb.finish_with_message("Audit complete!");
    }

    let mut report = AuditReport::new(options.site_url);
    report.started_at = started_at;
    report.finished_at = Utc::now().timestamp();
    report.summary.total_urls = outcome.graph.visited.len();
    report.summary.total_links = outcome.total_links();
    report.summary.sitemap_entries = sitemap_urls.len();
    report.broken_links = outcome.broken_link_issues();
    report.canonical_issues = canonical.issues;
    report.hreflang_issues = hreflang_issues;
    report.redirect_chains = redirect_chains;
    report.sitemap_issues = sitemap_issues;
    report.refresh_summary();

    info!(
        "Audit of {} finished: health score {}, {} issue(s)",
        report.site_url,
        report.summary.health_score,
        report.issue_count()
    );
    Ok(report)
}
