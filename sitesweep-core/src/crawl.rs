use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::issue::ValidationIssue;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use sitesweep_scanner::sitemap::collect_sitemap_urls;
use sitesweep_scanner::{CrawlGraph, Crawler, LinkClass, LinkStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};
use url::Url;

/// Where the walker's frontier comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlSeed {
    /// Start at the site root and discover pages by following links.
    Discover,
    /// Seed with every page listed in a sitemap (or sitemap index).
    Sitemap(String),
    /// Seed with an explicit URL list.
    Urls(Vec<String>),
}

pub struct CrawlOptions {
    pub site_url: String,
    pub seed: CrawlSeed,
}

/// Callback for human-readable phase messages.
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Walk result plus the no-follow status of every discovered link.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub site_url: String,
    pub seed_urls: Vec<String>,
    pub graph: CrawlGraph,
    pub statuses: Vec<LinkStatus>,
}

impl CrawlOutcome {
    pub fn total_links(&self) -> usize {
        self.statuses.len()
    }

    pub fn broken_count(&self) -> usize {
        self.statuses.iter().filter(|s| s.is_broken()).count()
    }

    pub fn valid_links(&self) -> usize {
        self.total_links() - self.broken_count()
    }

    pub fn broken_link_issues(&self) -> Vec<ValidationIssue> {
        self.statuses.iter().filter_map(broken_link_issue).collect()
    }

    /// Internal pages the walker fetched, in visit order.
    pub fn internal_pages(&self) -> Vec<String> {
        self.graph
            .pages
            .iter()
            .filter(|page| sitesweep_scanner::normalize::is_internal(page, &self.site_url))
            .cloned()
            .collect()
    }
}

/// A `broken-link` issue carrying the first recorded source, if the
/// link is broken.
pub fn broken_link_issue(status: &LinkStatus) -> Option<ValidationIssue> {
    if !status.is_broken() {
        return None;
    }
    let (source_page, anchor_text) = status
        .link
        .first_source()
        .map(|s| (s.page_url.clone(), s.anchor_text.clone()))
        .unwrap_or_default();

    Some(ValidationIssue::BrokenLink {
        target_url: status.link.target_url.clone(),
        status_code: status.probe.status_code,
        source_page,
        anchor_text,
        class: status.link.class,
    })
}

pub(crate) fn new_spinner(show: bool, message: &str) -> Option<Arc<ProgressBar>> {
    if !show {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Some(Arc::new(pb))
}

pub fn parse_site_url(site_url: &str) -> Result<Url> {
    let parsed = Url::parse(site_url)
        .map_err(|e| AuditError::InvalidUrl(format!("{}: {}", site_url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AuditError::InvalidUrl(format!(
            "{}: only http and https sites can be crawled",
            site_url
        )));
    }
    Ok(parsed)
}

/// Resolve the seed list, walk the site and probe every discovered link.
pub async fn execute_crawl(
    config: &AuditConfig,
    options: CrawlOptions,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<CrawlOutcome> {
    parse_site_url(&options.site_url)?;
    let prober = config.build_prober()?;

    let report = |msg: String| {
        if let Some(ref callback) = progress_callback {
            callback(msg);
        }
    };

    let seed_urls = match options.seed {
        CrawlSeed::Discover => vec![options.site_url.clone()],
        CrawlSeed::Urls(urls) => urls,
        CrawlSeed::Sitemap(sitemap_url) => {
            report(format!("Reading sitemap {}", sitemap_url));
            let urls = collect_sitemap_urls(&prober, &sitemap_url).await;
            if urls.is_empty() {
                warn!(
                    "Sitemap {} listed no pages; falling back to {}",
                    sitemap_url, options.site_url
                );
                vec![options.site_url.clone()]
            } else {
                urls
            }
        }
    };

    let progress_bar = new_spinner(config.show_progress, "Starting crawl...");
    let processed = Arc::new(AtomicUsize::new(0));

    let mut crawler = Crawler::new(prober, options.site_url.clone())
        .with_workers(config.workers)
        .with_max_pages(config.max_pages);

    if let Some(ref pb) = progress_bar {
        let pb = pb.clone();
        let processed = processed.clone();
        crawler = crawler.with_progress_callback(Arc::new(move |_slot: usize, _url: String| {
            let count = processed.fetch_add(1, Ordering::Relaxed) + 1;
            pb.set_message(format!("Crawling... {} pages fetched", count));
        }));
    }

    report(format!(
        "Crawling {} from {} seed URL(s)",
        options.site_url,
        seed_urls.len()
    ));
    let graph = crawler.crawl(&seed_urls).await;

    if let Some(ref pb) = progress_bar {
        pb.set_message(format!("Checking {} links...", graph.links.len()));
    }
    report(format!("Checking {} discovered links", graph.links.len()));
    let statuses = crawler.check_links(&graph).await;

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!(
            "Crawl complete! {} pages, {} links",
            graph.visited.len(),
            statuses.len()
        ));
    }

    let outcome = CrawlOutcome {
        site_url: options.site_url,
        seed_urls,
        graph,
        statuses,
    };
    info!(
        "{} of {} links broken on {}",
        outcome.broken_count(),
        outcome.total_links(),
        outcome.site_url
    );
    Ok(outcome)
}

fn colored_status(status_code: u16) -> String {
    let text = if status_code == 0 {
        "ERR".to_string()
    } else {
        status_code.to_string()
    };
    match status_code {
        200..=299 => text.green().to_string(),
        300..=399 => text.cyan().to_string(),
        400..=499 => text.yellow().to_string(),
        _ => text.red().to_string(),
    }
}

/// Terminal summary of a crawl: counts, then broken links grouped by the
/// page they appear on.
pub fn generate_crawl_report(outcome: &CrawlOutcome) -> String {
    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Pages crawled: {}\n", outcome.graph.visited.len()));
    report.push_str(&format!(
        "  Links found: {} ({} internal, {} external)\n",
        outcome.total_links(),
        outcome.graph.internal_links().count(),
        outcome.graph.external_links().count()
    ));
    report.push_str(&format!("  Broken links: {}\n", outcome.broken_count()));
    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    let mut by_page: BTreeMap<String, Vec<&LinkStatus>> = BTreeMap::new();
    for status in outcome.statuses.iter().filter(|s| s.is_broken()) {
        let page = status
            .link
            .first_source()
            .map(|s| s.page_url.clone())
            .unwrap_or_default();
        by_page.entry(page).or_default().push(status);
    }

    if by_page.is_empty() {
        report.push_str("No broken links found.\n");
        return report;
    }

    for (page, statuses) in by_page {
        report.push_str(&format!("## {}\n", page));
        for status in statuses {
            let class = match status.link.class {
                LinkClass::Internal => "",
                LinkClass::External => " (external)",
            };
            let mut line = format!(
                "  {} {}{}",
                colored_status(status.probe.status_code),
                status.link.target_url,
                class
            );
            if let Some(source) = status.link.first_source()
                && !source.anchor_text.is_empty()
            {
                line.push_str(&format!(" \"{}\"", source.anchor_text).dimmed().to_string());
            }
            report.push_str(&line);
            report.push('\n');
        }
        report.push('\n');
    }

    report
}
