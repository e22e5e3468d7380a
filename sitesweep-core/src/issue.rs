//! The closed set of problems an audit can report.
//!
//! Issues are values, not errors: every validator returns them as output and
//! nothing mutates one after it is created.

use serde::{Deserialize, Serialize};
use sitesweep_scanner::LinkClass;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a `noindex` directive was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoindexSource {
    MetaRobots,
    XRobotsTag,
}

impl NoindexSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoindexSource::MetaRobots => "meta robots tag",
            NoindexSource::XRobotsTag => "X-Robots-Tag header",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ValidationIssue {
    MissingCanonical {
        page_url: String,
    },
    CanonicalPointsToRedirect {
        page_url: String,
        canonical_url: String,
        status_code: u16,
        location: Option<String>,
    },
    CanonicalInvalidProtocol {
        page_url: String,
        canonical_url: String,
    },
    CanonicalSelfReferenceMismatch {
        page_url: String,
        canonical_url: String,
    },
    CanonicalConflict {
        page_url: String,
        canonical_url: String,
        claimed_by: Vec<String>,
    },
    OgUrlMismatch {
        page_url: String,
        canonical_url: String,
        og_url: String,
    },
    HreflangPointsToRedirect {
        page_url: String,
        hreflang: String,
        target_url: String,
        status_code: u16,
        location: Option<String>,
    },
    #[serde(rename = "sitemap-404")]
    SitemapNotFound {
        url: String,
        status_code: u16,
    },
    #[serde(rename = "sitemap-5xx")]
    SitemapServerError {
        url: String,
        status_code: u16,
    },
    SitemapIsRedirect {
        url: String,
        status_code: u16,
        /// End of the redirect chain; `None` when the chain loops.
        destination: Option<String>,
    },
    SitemapNoindex {
        url: String,
        source: NoindexSource,
    },
    SitemapNonCanonical {
        url: String,
        canonical_url: String,
    },
    BrokenLink {
        target_url: String,
        status_code: u16,
        source_page: String,
        anchor_text: String,
        class: LinkClass,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    BrokenLink,
    CanonicalPointsToRedirect,
    MissingCanonical,
    CanonicalInvalidProtocol,
    CanonicalSelfReferenceMismatch,
    CanonicalConflict,
    OgUrlMismatch,
    HreflangPointsToRedirect,
    #[serde(rename = "sitemap-404")]
    SitemapNotFound,
    #[serde(rename = "sitemap-5xx")]
    SitemapServerError,
    SitemapIsRedirect,
    SitemapNoindex,
    SitemapNonCanonical,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::BrokenLink => "broken-link",
            IssueKind::CanonicalPointsToRedirect => "canonical-points-to-redirect",
            IssueKind::MissingCanonical => "missing-canonical",
            IssueKind::CanonicalInvalidProtocol => "canonical-invalid-protocol",
            IssueKind::CanonicalSelfReferenceMismatch => "canonical-self-reference-mismatch",
            IssueKind::CanonicalConflict => "canonical-conflict",
            IssueKind::OgUrlMismatch => "og-url-mismatch",
            IssueKind::HreflangPointsToRedirect => "hreflang-points-to-redirect",
            IssueKind::SitemapNotFound => "sitemap-404",
            IssueKind::SitemapServerError => "sitemap-5xx",
            IssueKind::SitemapIsRedirect => "sitemap-is-redirect",
            IssueKind::SitemapNoindex => "sitemap-noindex",
            IssueKind::SitemapNonCanonical => "sitemap-non-canonical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "broken-link" => Some(IssueKind::BrokenLink),
            "canonical-points-to-redirect" => Some(IssueKind::CanonicalPointsToRedirect),
            "missing-canonical" => Some(IssueKind::MissingCanonical),
            "canonical-invalid-protocol" => Some(IssueKind::CanonicalInvalidProtocol),
            "canonical-self-reference-mismatch" => Some(IssueKind::CanonicalSelfReferenceMismatch),
            "canonical-conflict" => Some(IssueKind::CanonicalConflict),
            "og-url-mismatch" => Some(IssueKind::OgUrlMismatch),
            "hreflang-points-to-redirect" => Some(IssueKind::HreflangPointsToRedirect),
            "sitemap-404" => Some(IssueKind::SitemapNotFound),
            "sitemap-5xx" => Some(IssueKind::SitemapServerError),
            "sitemap-is-redirect" => Some(IssueKind::SitemapIsRedirect),
            "sitemap-noindex" => Some(IssueKind::SitemapNoindex),
            "sitemap-non-canonical" => Some(IssueKind::SitemapNonCanonical),
            _ => None,
        }
    }

    /// Heading used when issues are grouped in reports.
    pub fn title(&self) -> &'static str {
        match self {
            IssueKind::BrokenLink => "Broken links",
            IssueKind::CanonicalPointsToRedirect => "Canonical points to a redirect",
            IssueKind::MissingCanonical => "Missing canonical",
            IssueKind::CanonicalInvalidProtocol => "Canonical uses http on an https site",
            IssueKind::CanonicalSelfReferenceMismatch => "Canonical self-reference mismatch",
            IssueKind::CanonicalConflict => "Conflicting canonicals",
            IssueKind::OgUrlMismatch => "og:url differs from canonical",
            IssueKind::HreflangPointsToRedirect => "Hreflang points to a redirect",
            IssueKind::SitemapNotFound => "Sitemap entry not found",
            IssueKind::SitemapServerError => "Sitemap entry server error",
            IssueKind::SitemapIsRedirect => "Sitemap entry redirects",
            IssueKind::SitemapNoindex => "Sitemap entry is noindex",
            IssueKind::SitemapNonCanonical => "Sitemap entry is not canonical",
        }
    }

    /// Kinds that should fail a CI run.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            IssueKind::BrokenLink | IssueKind::CanonicalPointsToRedirect
        )
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What cleaning does with a sitemap entry that has an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapAction {
    Remove,
    Replace(String),
    /// Dropped from the cleaned sitemap and flagged for a human.
    Investigate,
}

impl ValidationIssue {
    pub fn kind(&self) -> IssueKind {
        match self {
            ValidationIssue::MissingCanonical { .. } => IssueKind::MissingCanonical,
            ValidationIssue::CanonicalPointsToRedirect { .. } => {
                IssueKind::CanonicalPointsToRedirect
            }
            ValidationIssue::CanonicalInvalidProtocol { .. } => IssueKind::CanonicalInvalidProtocol,
            ValidationIssue::CanonicalSelfReferenceMismatch { .. } => {
                IssueKind::CanonicalSelfReferenceMismatch
            }
            ValidationIssue::CanonicalConflict { .. } => IssueKind::CanonicalConflict,
            ValidationIssue::OgUrlMismatch { .. } => IssueKind::OgUrlMismatch,
            ValidationIssue::HreflangPointsToRedirect { .. } => IssueKind::HreflangPointsToRedirect,
            ValidationIssue::SitemapNotFound { .. } => IssueKind::SitemapNotFound,
            ValidationIssue::SitemapServerError { .. } => IssueKind::SitemapServerError,
            ValidationIssue::SitemapIsRedirect { .. } => IssueKind::SitemapIsRedirect,
            ValidationIssue::SitemapNoindex { .. } => IssueKind::SitemapNoindex,
            ValidationIssue::SitemapNonCanonical { .. } => IssueKind::SitemapNonCanonical,
            ValidationIssue::BrokenLink { .. } => IssueKind::BrokenLink,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ValidationIssue::BrokenLink { status_code, .. } => match status_code {
                404 | 410 => Severity::Critical,
                _ => Severity::Error,
            },
            ValidationIssue::CanonicalPointsToRedirect { .. } => Severity::Critical,
            ValidationIssue::SitemapNotFound { .. }
            | ValidationIssue::SitemapServerError { .. }
            | ValidationIssue::SitemapNoindex { .. }
            | ValidationIssue::SitemapIsRedirect {
                destination: None, ..
            } => Severity::Error,
            _ => Severity::Warning,
        }
    }

    /// The URL the issue is about: the page, sitemap entry or link target.
    pub fn primary_url(&self) -> &str {
        match self {
            ValidationIssue::MissingCanonical { page_url }
            | ValidationIssue::CanonicalPointsToRedirect { page_url, .. }
            | ValidationIssue::CanonicalInvalidProtocol { page_url, .. }
            | ValidationIssue::CanonicalSelfReferenceMismatch { page_url, .. }
            | ValidationIssue::CanonicalConflict { page_url, .. }
            | ValidationIssue::OgUrlMismatch { page_url, .. }
            | ValidationIssue::HreflangPointsToRedirect { page_url, .. } => page_url,
            ValidationIssue::SitemapNotFound { url, .. }
            | ValidationIssue::SitemapServerError { url, .. }
            | ValidationIssue::SitemapIsRedirect { url, .. }
            | ValidationIssue::SitemapNoindex { url, .. }
            | ValidationIssue::SitemapNonCanonical { url, .. } => url,
            ValidationIssue::BrokenLink { target_url, .. } => target_url,
        }
    }

    /// The problematic value, when it is not the primary URL itself.
    pub fn offending_value(&self) -> Option<String> {
        match self {
            ValidationIssue::MissingCanonical { .. } => None,
            ValidationIssue::CanonicalPointsToRedirect { canonical_url, .. }
            | ValidationIssue::CanonicalInvalidProtocol { canonical_url, .. }
            | ValidationIssue::CanonicalSelfReferenceMismatch { canonical_url, .. }
            | ValidationIssue::CanonicalConflict { canonical_url, .. }
            | ValidationIssue::SitemapNonCanonical { canonical_url, .. } => {
                Some(canonical_url.clone())
            }
            ValidationIssue::OgUrlMismatch { og_url, .. } => Some(og_url.clone()),
            ValidationIssue::HreflangPointsToRedirect { target_url, .. } => {
                Some(target_url.clone())
            }
            ValidationIssue::SitemapNotFound { status_code, .. }
            | ValidationIssue::SitemapServerError { status_code, .. }
            | ValidationIssue::SitemapIsRedirect { status_code, .. }
            | ValidationIssue::BrokenLink { status_code, .. } => Some(status_label(*status_code)),
            ValidationIssue::SitemapNoindex { source, .. } => Some(source.as_str().to_string()),
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            ValidationIssue::MissingCanonical { page_url } => format!(
                "Add <link rel=\"canonical\" href=\"{}\"> to the page head",
                page_url
            ),
            ValidationIssue::CanonicalPointsToRedirect {
                canonical_url,
                location,
                ..
            } => match location {
                Some(location) => format!(
                    "Point the canonical at {} instead of the redirecting {}",
                    location, canonical_url
                ),
                None => format!(
                    "Canonical {} redirects; point it at the final destination",
                    canonical_url
                ),
            },
            ValidationIssue::CanonicalInvalidProtocol { canonical_url, .. } => format!(
                "Use https in the canonical: {}",
                canonical_url.replacen("http://", "https://", 1)
            ),
            ValidationIssue::CanonicalSelfReferenceMismatch { page_url, .. } => format!(
                "Make the canonical match the page URL exactly: {}",
                page_url
            ),
            ValidationIssue::CanonicalConflict {
                canonical_url,
                claimed_by,
                ..
            } => format!(
                "{} pages claim {} as canonical but none of them is that URL; pick one authoritative page",
                claimed_by.len(),
                canonical_url
            ),
            ValidationIssue::OgUrlMismatch { canonical_url, .. } => {
                format!("Set og:url to the canonical URL {}", canonical_url)
            }
            ValidationIssue::HreflangPointsToRedirect {
                target_url,
                location,
                ..
            } => match location {
                Some(location) => format!(
                    "Update the hreflang alternate from {} to {}",
                    target_url, location
                ),
                None => format!("Update the hreflang alternate {} to a live page", target_url),
            },
            ValidationIssue::SitemapNotFound { .. } => "Remove the entry from the sitemap".to_string(),
            ValidationIssue::SitemapServerError { status_code, .. } => format!(
                "Investigate the server response ({}) and remove the entry until it is fixed",
                status_label(*status_code)
            ),
            ValidationIssue::SitemapIsRedirect { destination, .. } => match destination {
                Some(destination) => format!("Replace the entry with {}", destination),
                None => "Remove the entry; its redirect chain loops".to_string(),
            },
            ValidationIssue::SitemapNoindex { source, .. } => format!(
                "Remove the entry or drop the noindex in the {}",
                source.as_str()
            ),
            ValidationIssue::SitemapNonCanonical { canonical_url, .. } => {
                format!("Replace the entry with its canonical {}", canonical_url)
            }
            ValidationIssue::BrokenLink {
                source_page,
                status_code,
                ..
            } => format!(
                "Fix or remove the link on {} ({})",
                source_page,
                status_label(*status_code)
            ),
        }
    }

    /// Cleaning action for sitemap issues, `None` for every other kind.
    pub fn sitemap_action(&self) -> Option<SitemapAction> {
        match self {
            ValidationIssue::SitemapNotFound { .. } | ValidationIssue::SitemapNoindex { .. } => {
                Some(SitemapAction::Remove)
            }
            ValidationIssue::SitemapServerError { .. } => Some(SitemapAction::Investigate),
            ValidationIssue::SitemapIsRedirect { destination, .. } => Some(match destination {
                Some(destination) => SitemapAction::Replace(destination.clone()),
                None => SitemapAction::Remove,
            }),
            ValidationIssue::SitemapNonCanonical { canonical_url, .. } => {
                Some(SitemapAction::Replace(canonical_url.clone()))
            }
            _ => None,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.kind().is_blocking()
    }
}

/// `0` reads as "unreachable" in human output.
pub fn status_label(status_code: u16) -> String {
    if status_code == 0 {
        "unreachable".to_string()
    } else {
        format!("HTTP {}", status_code)
    }
}
