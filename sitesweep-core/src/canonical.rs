use crate::config::DEFAULT_WORKERS;
use crate::issue::ValidationIssue;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sitesweep_scanner::html::extract_page_meta;
use sitesweep_scanner::normalize::{normalize, resolve_location, scheme_of, serialize};
use sitesweep_scanner::{ProbeOptions, Prober};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// A page and the canonical it declares, resolved to an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub page_url: String,
    pub canonical_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct CanonicalValidation {
    pub records: Vec<CanonicalRecord>,
    pub issues: Vec<ValidationIssue>,
    /// Pages that answered 200 with HTML and were inspected.
    pub pages_checked: usize,
}

#[derive(Default)]
struct PageCheck {
    checked: bool,
    record: Option<CanonicalRecord>,
    issues: Vec<ValidationIssue>,
}

pub struct CanonicalValidator {
    prober: Prober,
    site_url: String,
    workers: usize,
}

impl CanonicalValidator {
    pub fn new(prober: Prober, site_url: impl Into<String>) -> Self {
        Self {
            prober,
            site_url: site_url.into(),
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub async fn validate_canonicals(&self, pages: &[String]) -> Vec<ValidationIssue> {
        self.validate(pages).await.issues
    }

    /// Check every page, then look for conflicting claims across pages.
    pub async fn validate(&self, pages: &[String]) -> CanonicalValidation {
        info!("Validating canonicals for {} pages", pages.len());

        let checks: Vec<PageCheck> = stream::iter(pages)
            .map(|page| self.check_page(page))
            .buffered(self.workers)
            .collect()
            .await;

        let mut validation = CanonicalValidation::default();
        for check in checks {
            if check.checked {
                validation.pages_checked += 1;
            }
            validation.records.extend(check.record);
            validation.issues.extend(check.issues);
        }

        validation
            .issues
            .extend(find_conflicts(&validation.records));

        info!(
            "Canonical validation found {} issue(s) across {} pages",
            validation.issues.len(),
            validation.pages_checked
        );
        validation
    }

    async fn check_page(&self, page_url: &str) -> PageCheck {
        let page = self.prober.fetch(page_url, ProbeOptions::follow()).await;
        if !page.probe.is_ok() {
            debug!(
                "Skipping canonical check for {} (status {})",
                page_url, page.probe.status_code
            );
            return PageCheck::default();
        }
        let Some(body) = page.html_body() else {
            return PageCheck::default();
        };

        let meta = extract_page_meta(body, page_url);
        let mut check = PageCheck {
            checked: true,
            ..PageCheck::default()
        };

        let Some(raw) = meta.canonical else {
            check.issues.push(ValidationIssue::MissingCanonical {
                page_url: page_url.to_string(),
            });
            return check;
        };
        let canonical = resolve_location(page_url, &raw).unwrap_or(raw);

        let probe = self
            .prober
            .probe(&canonical, ProbeOptions::no_follow())
            .await;
        if probe.is_redirect() {
            check.issues.push(ValidationIssue::CanonicalPointsToRedirect {
                page_url: page_url.to_string(),
                canonical_url: canonical.clone(),
                status_code: probe.status_code,
                location: probe
                    .redirect_location
                    .as_deref()
                    .and_then(|location| resolve_location(&canonical, location)),
            });
        }

        if scheme_of(&self.site_url).as_deref() == Some("https")
            && scheme_of(&canonical).as_deref() == Some("http")
        {
            check.issues.push(ValidationIssue::CanonicalInvalidProtocol {
                page_url: page_url.to_string(),
                canonical_url: canonical.clone(),
            });
        }

        if normalize(&canonical) == normalize(page_url) && serialize(&canonical) != serialize(page_url)
        {
            check
                .issues
                .push(ValidationIssue::CanonicalSelfReferenceMismatch {
                    page_url: page_url.to_string(),
                    canonical_url: canonical.clone(),
                });
        }

        if let Some(og_url) = meta.og_url {
            let og_url = resolve_location(page_url, &og_url).unwrap_or(og_url);
            if normalize(&og_url) != normalize(&canonical) {
                check.issues.push(ValidationIssue::OgUrlMismatch {
                    page_url: page_url.to_string(),
                    canonical_url: canonical.clone(),
                    og_url,
                });
            }
        }

        check.record = Some(CanonicalRecord {
            page_url: page_url.to_string(),
            canonical_url: canonical,
        });
        check
    }
}

/// Group claiming pages by normalized canonical target.
pub fn canonical_map(records: &[CanonicalRecord]) -> BTreeMap<String, Vec<&CanonicalRecord>> {
    let mut map: BTreeMap<String, Vec<&CanonicalRecord>> = BTreeMap::new();
    for record in records {
        map.entry(normalize(&record.canonical_url))
            .or_default()
            .push(record);
    }
    map
}

/// A target claimed by two or more distinct pages, none of which is the
/// target itself, makes every claimant ambiguous.
pub fn find_conflicts(records: &[CanonicalRecord]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for (target, claimants) in canonical_map(records) {
        let distinct: BTreeSet<String> = claimants.iter().map(|r| normalize(&r.page_url)).collect();
        if distinct.len() < 2 || distinct.contains(&target) {
            continue;
        }

        let claimed_by: Vec<String> = claimants.iter().map(|r| r.page_url.clone()).collect();
        for record in &claimants {
            issues.push(ValidationIssue::CanonicalConflict {
                page_url: record.page_url.clone(),
                canonical_url: record.canonical_url.clone(),
                claimed_by: claimed_by.clone(),
            });
        }
    }

    issues
}
