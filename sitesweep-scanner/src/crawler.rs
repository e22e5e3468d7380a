use crate::html::extract_anchors;
use crate::normalize::{is_internal, normalize};
use crate::probe::{FetchedPage, ProbeOptions, Prober};
use crate::result::{CrawlGraph, DiscoveredLink, LinkClass, LinkSource, LinkStatus};
use futures::stream::{self, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// Called with (worker slot, url) as each page is fetched.
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Breadth-first walker bounded to one site.
///
/// The frontier is drained in batches of up to `workers` URLs. Each batch is
/// fetched concurrently, then merged into the graph in dequeue order, so the
/// graph (and the first recorded source of every link) depends only on the
/// site, not on response timing.
pub struct Crawler {
    prober: Prober,
    base_url: String,
    workers: usize,
    max_pages: usize,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new(prober: Prober, base_url: impl Into<String>) -> Self {
        Self {
            prober,
            base_url: base_url.into(),
            workers: DEFAULT_WORKERS,
            max_pages: DEFAULT_MAX_PAGES,
            progress_callback: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Cap on the number of pages dequeued and fetched.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    /// Walk the site from `seeds` and return the discovered-link graph.
    pub async fn crawl(&self, seeds: &[String]) -> CrawlGraph {
        info!(
            "Starting crawl of {} from {} seed(s) with {} workers",
            self.base_url,
            seeds.len(),
            self.workers
        );

        let mut graph = CrawlGraph::default();
        let mut frontier: VecDeque<String> = VecDeque::new();
        let mut queued: HashSet<String> = HashSet::new();

        for seed in seeds {
            if queued.insert(normalize(seed)) {
                frontier.push_back(seed.clone());
            }
        }

        let mut dequeued = 0usize;

        while !frontier.is_empty() && dequeued < self.max_pages {
            let room = self.workers.min(self.max_pages - dequeued);
            let mut batch = Vec::with_capacity(room);

            while batch.len() < room {
                let Some(url) = frontier.pop_front() else {
                    break;
                };
                dequeued += 1;
                // dequeue-and-mark is the only writer of `visited`
                if graph.visited.insert(normalize(&url)) {
                    batch.push(url);
                } else {
                    debug!("Skipping already visited {}", url);
                }
            }

            let pages = futures::future::join_all(
                batch
                    .iter()
                    .enumerate()
                    .map(|(slot, url)| self.fetch_page(slot, url)),
            )
            .await;

            for (url, page) in batch.into_iter().zip(pages) {
                self.record_page(&mut graph, &mut frontier, &mut queued, &url, &page);
                graph.pages.push(url);
            }
        }

        if !frontier.is_empty() {
            info!(
                "Page limit of {} reached with {} URL(s) still queued",
                self.max_pages,
                frontier.len()
            );
        }

        info!(
            "Crawl complete. Visited {} pages, discovered {} links",
            graph.visited.len(),
            graph.links.len()
        );
        graph
    }

    async fn fetch_page(&self, slot: usize, url: &str) -> FetchedPage {
        if let Some(ref callback) = self.progress_callback {
            callback(slot, url.to_string());
        }
        debug!("Fetching {}", url);
        self.prober.fetch(url, ProbeOptions::follow()).await
    }

    fn record_page(
        &self,
        graph: &mut CrawlGraph,
        frontier: &mut VecDeque<String>,
        queued: &mut HashSet<String>,
        page_url: &str,
        page: &FetchedPage,
    ) {
        if !page.probe.is_ok() {
            debug!("Not parsing {} (status {})", page_url, page.probe.status_code);
            return;
        }
        // relative hrefs resolve against the URL that was actually served
        let served_url = page.probe.final_url.as_str();
        let served_key = normalize(served_url);
        if served_key != normalize(page_url) {
            if !is_internal(served_url, &self.base_url) {
                debug!("{} redirected off-site to {}, not parsing", page_url, served_url);
                return;
            }
            queued.insert(served_key.clone());
            if !graph.visited.insert(served_key) {
                debug!("{} redirected to already visited {}", page_url, served_url);
                return;
            }
        }

        let Some(body) = page.html_body() else {
            return;
        };

        for anchor in extract_anchors(body, served_url) {
            let key = normalize(&anchor.url);
            let class = if is_internal(&anchor.url, &self.base_url) {
                LinkClass::Internal
            } else {
                LinkClass::External
            };

            graph
                .links
                .entry(key.clone())
                .or_insert_with(|| DiscoveredLink::new(anchor.url.clone(), class))
                .add_source(LinkSource {
                    page_url: served_url.to_string(),
                    anchor_text: anchor.text,
                });

            if class == LinkClass::Internal && queued.insert(key) {
                frontier.push_back(anchor.url);
            }
        }
    }

    /// Probe every discovered link once without following redirects.
    /// Results come back ordered by normalized link URL.
    pub async fn check_links(&self, graph: &CrawlGraph) -> Vec<LinkStatus> {
        info!("Checking {} discovered links", graph.links.len());

        let statuses: Vec<LinkStatus> = stream::iter(graph.links.values())
            .map(|link| async move {
                let probe = self
                    .prober
                    .probe(&link.target_url, ProbeOptions::no_follow())
                    .await;
                LinkStatus {
                    link: link.clone(),
                    probe,
                }
            })
            .buffered(self.workers)
            .collect()
            .await;

        let broken = statuses.iter().filter(|s| s.is_broken()).count();
        info!("{} of {} links are broken", broken, statuses.len());
        statuses
    }
}
