pub mod audit;
pub mod canonical;
pub mod config;
pub mod crawl;
pub mod data;
pub mod error;
pub mod hreflang;
pub mod issue;
pub mod redirect;
pub mod report;
pub mod sitemap;

pub use config::AuditConfig;
pub use error::{AuditError, Result};
pub use issue::{IssueKind, Severity, SitemapAction, ValidationIssue};
