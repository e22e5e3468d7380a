use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Outcome of probing one URL. `status_code == 0` means the URL could not
/// be reached at all (DNS, refused connection, timeout).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub url: String,
    pub status_code: u16,
    pub final_url: String,
    pub redirect_location: Option<String>,
}

impl ProbeResult {
    pub fn new(url: String, status_code: u16) -> Self {
        Self {
            final_url: url.clone(),
            url,
            status_code,
            redirect_location: None,
        }
    }

    pub fn unreachable(url: String) -> Self {
        Self::new(url, 0)
    }

    pub fn is_unreachable(&self) -> bool {
        self.status_code == 0
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    pub fn is_ok(&self) -> bool {
        self.status_code == 200
    }

    /// Broken for link-checking purposes: any 4xx/5xx or unreachable.
    pub fn is_broken(&self) -> bool {
        self.status_code == 0 || self.status_code >= 400
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkClass {
    Internal,
    External,
}

impl LinkClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkClass::Internal => "internal",
            LinkClass::External => "external",
        }
    }
}

/// A page that links to a [`DiscoveredLink`], with the anchor text used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkSource {
    pub page_url: String,
    pub anchor_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredLink {
    pub target_url: String,
    /// Every distinct (page, anchor text) pair linking here, in the order
    /// the walker recorded them.
    pub sources: Vec<LinkSource>,
    pub class: LinkClass,
}

impl DiscoveredLink {
    pub fn new(target_url: String, class: LinkClass) -> Self {
        Self {
            target_url,
            sources: Vec::new(),
            class,
        }
    }

    pub fn add_source(&mut self, source: LinkSource) {
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }

    /// First recorded source, used when a single representative is needed.
    pub fn first_source(&self) -> Option<&LinkSource> {
        self.sources.first()
    }
}

/// Everything one walk produced: discovered links keyed by normalized
/// target URL, and the normalized URLs of every page dequeued and fetched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlGraph {
    pub links: BTreeMap<String, DiscoveredLink>,
    pub visited: HashSet<String>,
    /// Pages actually fetched, in visit order, as first seen (not normalized).
    pub pages: Vec<String>,
}

impl CrawlGraph {
    pub fn internal_links(&self) -> impl Iterator<Item = &DiscoveredLink> {
        self.links.values().filter(|l| l.class == LinkClass::Internal)
    }

    pub fn external_links(&self) -> impl Iterator<Item = &DiscoveredLink> {
        self.links.values().filter(|l| l.class == LinkClass::External)
    }
}

/// A discovered link after its no-follow status probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkStatus {
    pub link: DiscoveredLink,
    pub probe: ProbeResult,
}

impl LinkStatus {
    pub fn is_broken(&self) -> bool {
        self.probe.is_broken()
    }
}
