use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sitesweep_scanner::normalize::{normalize, resolve_location, same_page};
use sitesweep_scanner::{ProbeOptions, Prober};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::{DEFAULT_MAX_HOPS, DEFAULT_WORKERS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectType {
    Permanent,
    Temporary,
}

impl RedirectType {
    /// 301 and 308 are permanent; every other 3xx is temporary.
    pub fn from_status(status_code: u16) -> Self {
        match status_code {
            301 | 308 => RedirectType::Permanent,
            _ => RedirectType::Temporary,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectType::Permanent => "permanent",
            RedirectType::Temporary => "temporary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    pub url: String,
    pub status_code: u16,
    pub redirect_type: RedirectType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectChain {
    pub start_url: String,
    pub hops: Vec<RedirectHop>,
    pub final_url: String,
    pub total_hops: usize,
    /// The chain came back to a URL it had already visited.
    #[serde(default)]
    pub looped: bool,
}

impl RedirectChain {
    pub fn has_redirects(&self) -> bool {
        self.total_hops > 0
    }

    /// Where the chain actually lands, if it lands somewhere new. `None` for
    /// loops, chains without hops, and chains that stopped on a 3xx with no
    /// usable `Location` (the final URL is then the last hop itself).
    pub fn destination(&self) -> Option<&str> {
        if self.looped || !self.has_redirects() {
            return None;
        }
        let dead_end = self
            .hops
            .last()
            .is_some_and(|hop| same_page(&hop.url, &self.final_url));
        if dead_end || same_page(&self.start_url, &self.final_url) {
            return None;
        }
        Some(&self.final_url)
    }

    pub fn suggestion(&self) -> String {
        if self.total_hops == 0 {
            return "No redirects".to_string();
        }
        if self.looped {
            return format!(
                "Redirect loop: {} eventually redirects back to {}; break the cycle",
                self.start_url, self.final_url
            );
        }
        if self.total_hops == 1 {
            let hop = &self.hops[0];
            if hop.redirect_type == RedirectType::Temporary {
                return format!(
                    "Use a permanent redirect (301/308) instead of {}",
                    hop.status_code
                );
            }
            return "Optimal".to_string();
        }
        format!(
            "Collapse the chain: redirect {} directly to {} ({} hops)",
            self.start_url, self.final_url, self.total_hops
        )
    }
}

/// Follows redirects one hop at a time with no-follow probes.
#[derive(Clone)]
pub struct RedirectResolver {
    prober: Prober,
    max_hops: usize,
    workers: usize,
}

impl RedirectResolver {
    pub fn new(prober: Prober) -> Self {
        Self {
            prober,
            max_hops: DEFAULT_MAX_HOPS,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops.max(1);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Resolve the chain starting at `url`.
    ///
    /// Stops at the first non-3xx answer, after `max_hops` hops, when a
    /// `Location` is missing or unresolvable, or when the chain revisits a
    /// URL (then `looped` is set).
    pub async fn follow_chain(&self, url: &str) -> RedirectChain {
        let mut current = url.to_string();
        let mut seen: HashSet<String> = HashSet::from([normalize(url)]);
        let mut hops = Vec::new();
        let mut looped = false;

        while hops.len() < self.max_hops {
            let probe = self.prober.probe(&current, ProbeOptions::no_follow()).await;
            if !probe.is_redirect() {
                break;
            }

            hops.push(RedirectHop {
                url: current.clone(),
                status_code: probe.status_code,
                redirect_type: RedirectType::from_status(probe.status_code),
            });

            let Some(next) = probe
                .redirect_location
                .as_deref()
                .and_then(|location| resolve_location(&current, location))
            else {
                debug!("{} answered {} without a usable Location", current, probe.status_code);
                break;
            };

            current = next;
            if !seen.insert(normalize(&current)) {
                debug!("Redirect loop detected at {}", current);
                looped = true;
                break;
            }
        }

        RedirectChain {
            start_url: url.to_string(),
            total_hops: hops.len(),
            hops,
            final_url: current,
            looped,
        }
    }

    /// Chains for every URL that redirects at least once, in input order.
    pub async fn analyze_redirects(&self, urls: &[String]) -> Vec<RedirectChain> {
        info!("Resolving redirect chains for {} URLs", urls.len());

        let chains: Vec<RedirectChain> = stream::iter(urls)
            .map(|url| self.follow_chain(url))
            .buffered(self.workers)
            .filter(|chain| std::future::ready(chain.has_redirects()))
            .collect()
            .await;

        info!("{} URLs redirect", chains.len());
        chains
    }
}
