use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use sitesweep_scanner::probe::{DEFAULT_TIMEOUT, default_user_agent};
use sitesweep_scanner::sitemap::DEFAULT_MAX_ENTRIES;
use sitesweep_scanner::{Prober, ProberConfig};
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_MAX_PAGES: usize = 10_000;
pub const DEFAULT_MAX_HOPS: usize = 10;

/// Tunables shared by every validator in one audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    pub timeout: Duration,
    /// Maximum concurrent probes.
    pub workers: usize,
    /// Walker iteration cap.
    pub max_pages: usize,
    pub max_hops: usize,
    pub max_sitemap_entries: usize,
    pub user_agent: String,
    pub check_hreflang: bool,
    #[serde(skip)]
    pub show_progress: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            workers: DEFAULT_WORKERS,
            max_pages: DEFAULT_MAX_PAGES,
            max_hops: DEFAULT_MAX_HOPS,
            max_sitemap_entries: DEFAULT_MAX_ENTRIES,
            user_agent: default_user_agent(),
            check_hreflang: true,
            show_progress: false,
        }
    }
}

impl AuditConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_max_sitemap_entries(mut self, max_entries: usize) -> Self {
        self.max_sitemap_entries = max_entries;
        self
    }

    pub fn with_check_hreflang(mut self, check: bool) -> Self {
        self.check_hreflang = check;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Reject settings that would stall or never terminate.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(AuditError::InvalidOption(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.max_hops == 0 {
            return Err(AuditError::InvalidOption(
                "max_hops must be at least 1".to_string(),
            ));
        }
        if self.max_sitemap_entries == 0 {
            return Err(AuditError::InvalidOption(
                "max_sitemap_entries must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(AuditError::InvalidOption(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn prober_config(&self) -> ProberConfig {
        ProberConfig {
            timeout: self.timeout,
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn build_prober(&self) -> Result<Prober> {
        self.validate()?;
        Ok(Prober::new(&self.prober_config())?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
