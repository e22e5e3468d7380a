//! Reconciles a sitemap against what the server actually answers, then
//! rewrites and partitions it.

use crate::config::DEFAULT_WORKERS;
use crate::error::Result;
use crate::issue::{NoindexSource, SitemapAction, ValidationIssue};
use crate::redirect::RedirectResolver;
use futures::stream::{self, StreamExt};
use sitesweep_scanner::html::{extract_page_meta, is_noindex_directive};
use sitesweep_scanner::normalize::{normalize, resolve_location};
use sitesweep_scanner::sitemap::{
    DEFAULT_MAX_ENTRIES, SitemapDocument, SitemapSplit, collect_sitemap_urls, dedupe_urls,
    flatten_document, render_urlset, split_sitemap,
};
use sitesweep_scanner::{ProbeOptions, Prober};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanedSitemap {
    pub valid_urls: Vec<String>,
    pub issues: Vec<ValidationIssue>,
}

impl CleanedSitemap {
    /// A single `<urlset>` holding every valid URL.
    pub fn to_document(&self) -> String {
        render_urlset(&self.valid_urls)
    }

    pub fn split(&self, max_entries: usize, public_base: &str, stem: &str) -> SitemapSplit {
        split_sitemap(&self.valid_urls, max_entries, public_base, stem)
    }
}

pub struct SitemapReconciler {
    prober: Prober,
    resolver: RedirectResolver,
    workers: usize,
    max_entries: usize,
}

impl SitemapReconciler {
    pub fn new(prober: Prober) -> Self {
        Self {
            resolver: RedirectResolver::new(prober.clone()),
            prober,
            workers: DEFAULT_WORKERS,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self.resolver = self.resolver.with_workers(self.workers);
        self
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.resolver = self.resolver.with_max_hops(max_hops);
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Fetch the sitemap (flattening an index) and validate every entry.
    pub async fn validate_sitemap(&self, sitemap_url: &str) -> Vec<ValidationIssue> {
        let urls = collect_sitemap_urls(&self.prober, sitemap_url).await;
        info!("Validating {} sitemap entries from {}", urls.len(), sitemap_url);
        self.validate_entries(&urls).await
    }

    /// At most one issue per entry, in entry order.
    pub async fn validate_entries(&self, urls: &[String]) -> Vec<ValidationIssue> {
        stream::iter(urls)
            .map(|url| self.check_entry(url))
            .buffered(self.workers)
            .filter_map(std::future::ready)
            .collect()
            .await
    }

    /// First matching condition wins: redirect, 4xx, 5xx or unreachable,
    /// noindex, non-canonical.
    pub async fn check_entry(&self, url: &str) -> Option<ValidationIssue> {
        let page = self.prober.fetch(url, ProbeOptions::no_follow()).await;
        let status_code = page.probe.status_code;

        match status_code {
            300..=399 => {
                let chain = self.resolver.follow_chain(url).await;
                let destination = chain.destination().map(str::to_string);
                Some(ValidationIssue::SitemapIsRedirect {
                    url: url.to_string(),
                    status_code,
                    destination,
                })
            }
            400..=499 => Some(ValidationIssue::SitemapNotFound {
                url: url.to_string(),
                status_code,
            }),
            0 | 500.. => Some(ValidationIssue::SitemapServerError {
                url: url.to_string(),
                status_code,
            }),
            200 => {
                if page
                    .x_robots_tag
                    .as_deref()
                    .map(is_noindex_directive)
                    .unwrap_or(false)
                {
                    return Some(ValidationIssue::SitemapNoindex {
                        url: url.to_string(),
                        source: NoindexSource::XRobotsTag,
                    });
                }

                let meta = extract_page_meta(page.html_body()?, url);
                if meta.meta_noindex {
                    return Some(ValidationIssue::SitemapNoindex {
                        url: url.to_string(),
                        source: NoindexSource::MetaRobots,
                    });
                }

                let raw = meta.canonical?;
                let canonical = resolve_location(url, &raw).unwrap_or(raw);
                if normalize(&canonical) != normalize(url) {
                    return Some(ValidationIssue::SitemapNonCanonical {
                        url: url.to_string(),
                        canonical_url: canonical,
                    });
                }
                None
            }
            _ => {
                debug!("Sitemap entry {} answered {}; leaving it", url, status_code);
                None
            }
        }
    }

    /// Parse a sitemap document (flattening an index), validate every entry
    /// and apply the resulting actions.
    pub async fn clean_sitemap(&self, document: &str) -> Result<CleanedSitemap> {
        let parsed = SitemapDocument::parse(document)?;
        let urls = flatten_document(&self.prober, parsed, None).await;
        Ok(self.clean_urls(&urls).await)
    }

    pub async fn clean_urls(&self, urls: &[String]) -> CleanedSitemap {
        let issues = self.validate_entries(urls).await;
        let valid_urls = apply_actions(urls, &issues);

        info!(
            "Cleaned sitemap: {} entries in, {} out, {} issue(s)",
            urls.len(),
            valid_urls.len(),
            issues.len()
        );

        CleanedSitemap { valid_urls, issues }
    }
}

/// Drop removed and investigated entries, substitute replacements, then
/// de-duplicate by normalized form keeping first appearance.
pub fn apply_actions(urls: &[String], issues: &[ValidationIssue]) -> Vec<String> {
    let actions: HashMap<String, SitemapAction> = issues
        .iter()
        .filter_map(|issue| {
            issue
                .sitemap_action()
                .map(|action| (normalize(issue.primary_url()), action))
        })
        .collect();

    let rewritten = urls.iter().filter_map(|url| match actions.get(&normalize(url)) {
        None => Some(url.clone()),
        Some(SitemapAction::Replace(target)) => Some(target.clone()),
        Some(SitemapAction::Remove) | Some(SitemapAction::Investigate) => None,
    });

    dedupe_urls(rewritten)
}

/// Write every file of `split` into `dir`, index last. Returns the paths
/// written.
pub fn write_sitemap_files(split: &SitemapSplit, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    for file in split.files() {
        let path = dir.join(&file.file_name);
        fs::write(&path, &file.document)?;
        debug!("Wrote {} ({} entries)", path.display(), file.entries.len());
        written.push(path);
    }

    Ok(written)
}
