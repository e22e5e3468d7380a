pub mod crawler;
pub mod error;
pub mod html;
pub mod normalize;
pub mod probe;
pub mod result;
pub mod sitemap;

pub use crawler::Crawler;
pub use error::ScanError;
pub use normalize::normalize;
pub use probe::{FetchedPage, ProbeOptions, Prober, ProberConfig};
pub use result::{CrawlGraph, DiscoveredLink, LinkClass, LinkSource, LinkStatus, ProbeResult};
