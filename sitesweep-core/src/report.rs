// Audit report aggregation and rendering

use crate::issue::{IssueKind, Severity, ValidationIssue};
use crate::redirect::RedirectChain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "md",
        }
    }
}

/// `round(100 * valid / total)`, or 100 when there is nothing to score.
pub fn health_score(valid: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    ((valid as f64 / total as f64) * 100.0).round() as u32
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total_urls: usize,
    pub total_links: usize,
    pub valid_links: usize,
    pub broken_links: usize,
    pub canonical_issues: usize,
    pub hreflang_issues: usize,
    pub redirect_chains: usize,
    pub sitemap_entries: usize,
    pub sitemap_issues: usize,
    pub health_score: u32,
}

/// Everything one audit produced, grouped by the validator that found it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub site_url: String,
    pub started_at: i64,
    pub finished_at: i64,
    pub summary: AuditSummary,
    pub broken_links: Vec<ValidationIssue>,
    pub canonical_issues: Vec<ValidationIssue>,
    pub hreflang_issues: Vec<ValidationIssue>,
    pub sitemap_issues: Vec<ValidationIssue>,
    pub redirect_chains: Vec<RedirectChain>,
}

impl AuditReport {
    pub fn new(site_url: impl Into<String>) -> Self {
        Self {
            site_url: site_url.into(),
            ..Self::default()
        }
    }

    /// Recompute the counts that derive from the issue lists.
    pub fn refresh_summary(&mut self) {
        self.summary.broken_links = self.broken_links.len();
        self.summary.valid_links = self.summary.total_links.saturating_sub(self.broken_links.len());
        self.summary.canonical_issues = self.canonical_issues.len();
        self.summary.hreflang_issues = self.hreflang_issues.len();
        self.summary.redirect_chains = self.redirect_chains.len();
        self.summary.sitemap_issues = self.sitemap_issues.len();
        self.summary.health_score = health_score(self.summary.valid_links, self.summary.total_links);
    }

    pub fn all_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.broken_links
            .iter()
            .chain(&self.canonical_issues)
            .chain(&self.hreflang_issues)
            .chain(&self.sitemap_issues)
    }

    pub fn issue_count(&self) -> usize {
        self.all_issues().count()
    }

    pub fn issues_by_kind(&self) -> BTreeMap<IssueKind, Vec<&ValidationIssue>> {
        let mut grouped: BTreeMap<IssueKind, Vec<&ValidationIssue>> = BTreeMap::new();
        for issue in self.all_issues() {
            grouped.entry(issue.kind()).or_default().push(issue);
        }
        grouped
    }

    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for issue in self.all_issues() {
            *counts.entry(issue.severity()).or_insert(0) += 1;
        }
        counts
    }

    /// Broken links or canonicals pointing at redirects; a CI run should fail.
    pub fn has_blocking_issues(&self) -> bool {
        self.all_issues().any(|issue| issue.is_blocking())
    }

    pub fn blocking_count(&self) -> usize {
        self.all_issues().filter(|issue| issue.is_blocking()).count()
    }

    pub fn duration_secs(&self) -> i64 {
        self.finished_at - self.started_at
    }
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{DateTime, Utc};
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn format_iso8601_timestamp(timestamp: i64) -> String {
    use chrono::{DateTime, Utc};
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "[CRITICAL]",
        Severity::Error => "[ERROR]   ",
        Severity::Warning => "[WARNING] ",
    }
}

fn score_glyph(score: u32) -> &'static str {
    match score {
        90..=100 => "✓",
        70..=89 => "⚠",
        _ => "✗",
    }
}

pub fn generate_text_report(report: &AuditReport) -> String {
    let mut out = String::new();
    let summary = &report.summary;

    out.push_str(RULE);
    out.push_str("                        SITESWEEP TECHNICAL SEO REPORT\n");
    out.push_str(RULE);
    out.push('\n');

    out.push_str(&format!("Site:         {}\n", report.site_url));
    out.push_str(&format!("Audit Date:   {}\n", format_timestamp(report.started_at)));
    out.push_str(&format!("Duration:     {} seconds\n", report.duration_secs()));
    out.push('\n');

    out.push_str(RULE);
    out.push_str("SUMMARY\n");
    out.push_str(RULE);
    out.push('\n');

    out.push_str(&format!(
        "Health Score: {} {}/100\n\n",
        score_glyph(summary.health_score),
        summary.health_score
    ));
    out.push_str(&format!("  Pages crawled:      {}\n", summary.total_urls));
    out.push_str(&format!("  Links checked:      {}\n", summary.total_links));
    out.push_str(&format!("  Valid links:        {}\n", summary.valid_links));
    out.push_str(&format!("  Broken links:       {}\n", summary.broken_links));
    out.push_str(&format!("  Canonical issues:   {}\n", summary.canonical_issues));
    out.push_str(&format!("  Hreflang issues:    {}\n", summary.hreflang_issues));
    out.push_str(&format!("  Redirect chains:    {}\n", summary.redirect_chains));
    out.push_str(&format!(
        "  Sitemap issues:     {} of {} entries\n",
        summary.sitemap_issues, summary.sitemap_entries
    ));
    out.push('\n');

    for (severity, count) in report.severity_counts() {
        out.push_str(&format!("  {} {}\n", severity_tag(severity), count));
    }
    out.push('\n');

    let grouped = report.issues_by_kind();
    if !grouped.is_empty() {
        out.push_str(RULE);
        out.push_str("ISSUES BY KIND\n");
        out.push_str(RULE);
        out.push('\n');

        for (kind, issues) in grouped {
            out.push_str(&format!("{} ({}) [{}]\n", kind.title(), issues.len(), kind));
            for issue in issues {
                out.push_str(&format!("  ✗ {}", issue.primary_url()));
                if let Some(value) = issue.offending_value() {
                    out.push_str(&format!("  → {}", value));
                }
                out.push('\n');
                out.push_str(&format!("      {}\n", issue.suggestion()));
            }
            out.push('\n');
        }
    }

    if !report.redirect_chains.is_empty() {
        out.push_str(RULE);
        out.push_str("REDIRECT CHAINS\n");
        out.push_str(RULE);
        out.push('\n');

        for chain in &report.redirect_chains {
            out.push_str(&format!(
                "  {} → {} ({} hop{}{})\n",
                chain.start_url,
                chain.final_url,
                chain.total_hops,
                if chain.total_hops == 1 { "" } else { "s" },
                if chain.looped { ", loop" } else { "" }
            ));
            for hop in &chain.hops {
                out.push_str(&format!(
                    "      {} {} ({})\n",
                    hop.status_code,
                    hop.url,
                    hop.redirect_type.as_str()
                ));
            }
            out.push_str(&format!("      {}\n", chain.suggestion()));
        }
        out.push('\n');
    }

    out.push_str(RULE);
    out.push_str("                          End of Report\n");
    out.push_str(RULE);
    out.push_str("\nGenerated by SiteSweep\n\n");

    out
}

pub fn generate_json_report(report: &AuditReport) -> Result<String, serde_json::Error> {
    let issues: Vec<serde_json::Value> = report
        .all_issues()
        .map(|issue| -> Result<serde_json::Value, serde_json::Error> {
            let mut value = serde_json::to_value(issue)?;
            if let Some(object) = value.as_object_mut() {
                object.insert("severity".into(), issue.severity().as_str().into());
                object.insert("suggestion".into(), issue.suggestion().into());
            }
            Ok(value)
        })
        .collect::<Result<_, serde_json::Error>>()?;

    let chains: Vec<serde_json::Value> = report
        .redirect_chains
        .iter()
        .map(|chain| -> Result<serde_json::Value, serde_json::Error> {
            let mut value = serde_json::to_value(chain)?;
            if let Some(object) = value.as_object_mut() {
                object.insert("suggestion".into(), chain.suggestion().into());
            }
            Ok(value)
        })
        .collect::<Result<_, serde_json::Error>>()?;

    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "SiteSweep",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "audit": {
                "site_url": report.site_url,
                "started_at": format_iso8601_timestamp(report.started_at),
                "finished_at": format_iso8601_timestamp(report.finished_at),
                "duration_seconds": report.duration_secs(),
            },
            "summary": report.summary,
            "blocking_issues": report.blocking_count(),
            "issues": issues,
            "redirect_chains": chains,
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_markdown_report(report: &AuditReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();

    out.push_str(&format!("# SEO Audit: {}\n\n", report.site_url));
    out.push_str(&format!("_Audited {}_\n\n", format_timestamp(report.started_at)));
    out.push_str(&format!("**Health score: {}/100**\n\n", summary.health_score));

    out.push_str("| Metric | Count |\n|---|---|\n");
    out.push_str(&format!("| Pages crawled | {} |\n", summary.total_urls));
    out.push_str(&format!("| Links checked | {} |\n", summary.total_links));
    out.push_str(&format!("| Broken links | {} |\n", summary.broken_links));
    out.push_str(&format!("| Canonical issues | {} |\n", summary.canonical_issues));
    out.push_str(&format!("| Hreflang issues | {} |\n", summary.hreflang_issues));
    out.push_str(&format!("| Redirect chains | {} |\n", summary.redirect_chains));
    out.push_str(&format!("| Sitemap issues | {} |\n\n", summary.sitemap_issues));

    for (kind, issues) in report.issues_by_kind() {
        out.push_str(&format!("## {} ({})\n\n", kind.title(), issues.len()));
        out.push_str("| URL | Detail | Severity | Suggestion |\n|---|---|---|---|\n");
        for issue in issues {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                escape_cell(issue.primary_url()),
                escape_cell(&issue.offending_value().unwrap_or_default()),
                issue.severity(),
                escape_cell(&issue.suggestion())
            ));
        }
        out.push('\n');
    }

    if !report.redirect_chains.is_empty() {
        out.push_str("## Redirect chains\n\n");
        out.push_str("| Start | Final | Hops | Suggestion |\n|---|---|---|---|\n");
        for chain in &report.redirect_chains {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                escape_cell(&chain.start_url),
                escape_cell(&chain.final_url),
                chain.total_hops,
                escape_cell(&chain.suggestion())
            ));
        }
        out.push('\n');
    }

    out
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

pub fn render_report(report: &AuditReport, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(report)),
        ReportFormat::Json => generate_json_report(report),
        ReportFormat::Markdown => Ok(generate_markdown_report(report)),
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
