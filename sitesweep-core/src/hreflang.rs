use crate::config::DEFAULT_WORKERS;
use crate::issue::ValidationIssue;
use futures::stream::{self, StreamExt};
use sitesweep_scanner::html::{HreflangLink, extract_page_meta};
use sitesweep_scanner::normalize::{normalize, resolve_location};
use sitesweep_scanner::{ProbeOptions, ProbeResult, Prober};
use std::collections::HashMap;
use tracing::info;

/// Flags hreflang alternates whose targets answer with a redirect.
pub struct HreflangValidator {
    prober: Prober,
    workers: usize,
}

impl HreflangValidator {
    pub fn new(prober: Prober) -> Self {
        Self {
            prober,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    async fn alternates(&self, page_url: &str) -> Vec<HreflangLink> {
        let page = self.prober.fetch(page_url, ProbeOptions::follow()).await;
        match page.html_body() {
            Some(body) if page.probe.is_ok() => extract_page_meta(body, page_url).hreflangs,
            _ => Vec::new(),
        }
    }

    pub async fn validate_hreflangs(&self, pages: &[String]) -> Vec<ValidationIssue> {
        let per_page: Vec<(&String, Vec<HreflangLink>)> = stream::iter(pages)
            .map(|page| async move { (page, self.alternates(page).await) })
            .buffered(self.workers)
            .collect()
            .await;

        // each distinct target is probed once
        let mut targets: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for (_, links) in &per_page {
            for link in links {
                let key = normalize(&link.url);
                if !index.contains_key(&key) {
                    index.insert(key, targets.len());
                    targets.push(link.url.clone());
                }
            }
        }

        info!(
            "Probing {} hreflang targets from {} pages",
            targets.len(),
            pages.len()
        );

        let probes: Vec<ProbeResult> = stream::iter(&targets)
            .map(|target| self.prober.probe(target, ProbeOptions::no_follow()))
            .buffered(self.workers)
            .collect()
            .await;

        let mut issues = Vec::new();
        for (page_url, links) in per_page {
            for link in links {
                let probe = &probes[index[&normalize(&link.url)]];
                if probe.is_redirect() {
                    issues.push(ValidationIssue::HreflangPointsToRedirect {
                        page_url: page_url.clone(),
                        hreflang: link.hreflang,
                        location: probe
                            .redirect_location
                            .as_deref()
                            .and_then(|location| resolve_location(&link.url, location)),
                        target_url: link.url,
                        status_code: probe.status_code,
                    });
                }
            }
        }

        issues
    }
}
