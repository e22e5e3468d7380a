pub mod commands;
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use commands::command_argument_builder;
pub use handlers::{
    build_config, load_urls_from_file, parse_url_line, read_sitemap_source, resolve_db_path,
};

// Re-export crawl functionality from sitesweep-core
pub use sitesweep_core::crawl::{
    CrawlOptions, CrawlProgressCallback, CrawlSeed, execute_crawl, generate_crawl_report,
};

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
