use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use sitesweep_core::audit::{AuditOptions, execute_audit};
use sitesweep_core::canonical::CanonicalValidator;
use sitesweep_core::crawl::{
    CrawlOptions, CrawlProgressCallback, CrawlSeed, execute_crawl, generate_crawl_report,
};
use sitesweep_core::data::Database;
use sitesweep_core::hreflang::HreflangValidator;
use sitesweep_core::redirect::RedirectResolver;
use sitesweep_core::report::{ReportFormat, render_report, save_report};
use sitesweep_core::sitemap::{SitemapReconciler, write_sitemap_files};
use sitesweep_core::{AuditConfig, ValidationIssue};
use sitesweep_scanner::Prober;
use sitesweep_scanner::sitemap::{collect_sitemap_urls, default_sitemap_url};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DATABASE_FILE: &str = "sitesweep.db";

pub fn print_banner() {
    println!(
        "{} {}",
        "SiteSweep".bright_cyan().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("{}", "technical SEO crawl-and-validate".dimmed());
    println!();
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> io::Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

// Helper functions shared by the handlers

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line)
        && matches!(url.scheme(), "http" | "https")
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok_and(|url| url.host_str().is_some()) && !line.contains(' ') {
        return Some(with_scheme);
    }

    eprintln!("{}  Skipping invalid URL '{}'", "⚠".yellow(), line);
    None
}

/// Load page URLs from a newline-delimited file. Blank lines and `#`
/// comments are ignored.
pub fn load_urls_from_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL file {}", path.display()))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        bail!("No valid URLs found in {}", path.display());
    }

    Ok(urls)
}

/// `~`-expanded database file inside a config directory.
pub fn resolve_db_path(config_dir: &str) -> PathBuf {
    let expanded = shellexpand::tilde(config_dir);
    Path::new(expanded.as_ref()).join(DATABASE_FILE)
}

fn flag(args: &ArgMatches, id: &str) -> bool {
    matches!(args.try_get_one::<bool>(id), Ok(Some(true)))
}

fn optional<T: Clone + Send + Sync + 'static>(args: &ArgMatches, id: &str) -> Option<T> {
    args.try_get_one::<T>(id).ok().flatten().cloned()
}

fn site_url(args: &ArgMatches) -> Result<String> {
    args.get_one::<Url>("url")
        .map(|url| url.as_str().to_string())
        .ok_or_else(|| anyhow!("--url is required"))
}

/// Build an [`AuditConfig`] from whichever tuning flags the subcommand
/// defines.
pub fn build_config(args: &ArgMatches) -> Result<AuditConfig> {
    let mut config = AuditConfig::default().with_progress(!flag(args, "quiet"));

    if let Some(threads) = optional::<usize>(args, "threads") {
        config = config.with_workers(threads);
    }
    if let Some(timeout) = optional::<u64>(args, "timeout") {
        config = config.with_timeout(Duration::from_secs(timeout));
    }
    if let Some(max_pages) = optional::<usize>(args, "max-pages") {
        config = config.with_max_pages(max_pages);
    }
    if let Some(max_hops) = optional::<usize>(args, "max-hops") {
        config = config.with_max_hops(max_hops);
    }
    if let Some(max_entries) = optional::<usize>(args, "max-entries") {
        config = config.with_max_sitemap_entries(max_entries);
    }
    if flag(args, "no-hreflang") {
        config = config.with_check_hreflang(false);
    }

    config.validate()?;
    Ok(config)
}

/// Pages to validate: the `--pages-file` list, or every page in the
/// site's sitemap.
pub async fn resolve_pages(args: &ArgMatches, prober: &Prober, site: &str) -> Result<Vec<String>> {
    if let Some(path) = optional::<PathBuf>(args, "pages-file") {
        return load_urls_from_file(&path);
    }

    let sitemap_url = default_sitemap_url(site);
    let pages = collect_sitemap_urls(prober, &sitemap_url).await;
    if pages.is_empty() {
        bail!(
            "No pages found in {}; pass --pages-file to supply them",
            sitemap_url
        );
    }
    Ok(pages)
}

/// Sitemap XML from a local file or an http(s) URL.
pub async fn read_sitemap_source(input: &str, prober: &Prober) -> Result<String> {
    if input.starts_with("http://") || input.starts_with("https://") {
        return prober
            .fetch_text(input)
            .await
            .ok_or_else(|| anyhow!("Failed to fetch sitemap {}", input));
    }

    let expanded = shellexpand::tilde(input);
    fs::read_to_string(expanded.as_ref())
        .with_context(|| format!("Failed to read sitemap file {}", input))
}

fn parse_format(args: &ArgMatches) -> Result<ReportFormat> {
    let name = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    ReportFormat::from_str(name).ok_or_else(|| anyhow!("Unknown report format '{}'", name))
}

fn emit(content: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            save_report(content, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn progress_printer(quiet: bool) -> Option<CrawlProgressCallback> {
    if quiet {
        return None;
    }
    Some(Arc::new(|msg: String| {
        println!("{} {}", "→".blue(), msg);
    }))
}

fn print_issues(issues: &[ValidationIssue]) {
    for issue in issues {
        let mut line = format!("  {} {}", "✗".red().bold(), issue.primary_url());
        if let Some(value) = issue.offending_value() {
            line.push_str(&format!(" {} {}", "→".blue(), value));
        }
        println!("{} [{}]", line, issue.kind().as_str().yellow());
        println!("      {}", issue.suggestion().dimmed());
    }
}

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  SITESWEEP INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let config_dir = args
        .get_one::<String>("PATH")
        .map(String::as_str)
        .unwrap_or(crate::commands::DEFAULT_CONFIG_DIR);
    let force = flag(args, "force");
    let db_path = resolve_db_path(config_dir);
    let db_dir = db_path
        .parent()
        .ok_or_else(|| anyhow!("Invalid database path {}", db_path.display()))?;

    println!(
        "{} Target: {}",
        "→".blue(),
        db_dir.display().to_string().bright_white()
    );
    println!();

    fs::create_dir_all(db_dir)
        .with_context(|| format!("Failed to create config directory {}", db_dir.display()))?;

    if Database::exists(&db_path) {
        let overwrite = if force {
            true
        } else {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!("Database already exists at:");
            println!(
                "  {} {}",
                "•".yellow(),
                db_path.display().to_string().bright_white()
            );
            println!();
            let response = print_prompt("Would you like to overwrite it? [y/N]:")?;
            println!();
            response == "y" || response == "yes"
        };

        if overwrite {
            Database::drop(&db_path)
                .with_context(|| format!("Failed to remove {}", db_path.display()))?;
            println!("{} Existing database removed", "✓".green().bold());
        } else {
            println!("{} Keeping existing database", "→".blue());
        }
    }

    if !Database::exists(&db_path) {
        println!("{} Creating database...", "→".blue());
        Database::new(&db_path)?;
    }

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!(
        "{} Database: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    println!();
    Ok(())
}

pub async fn handle_crawl(args: &ArgMatches) -> Result<()> {
    let config = build_config(args)?;
    let site = site_url(args)?;
    let quiet = flag(args, "quiet");

    let seed = match args.get_one::<Url>("sitemap") {
        Some(sitemap) => CrawlSeed::Sitemap(sitemap.as_str().to_string()),
        None => CrawlSeed::Discover,
    };

    if !quiet {
        println!("Crawling {}", site.bright_white());
        println!("Workers: {}", config.workers);
        println!("Page limit: {}\n", config.max_pages);
    }

    let outcome = execute_crawl(
        &config,
        CrawlOptions {
            site_url: site,
            seed,
        },
        progress_printer(quiet),
    )
    .await
    .context("Crawl failed")?;

    println!("\n{} Crawl complete!\n", "✓".green().bold());
    emit(&generate_crawl_report(&outcome), args.get_one::<PathBuf>("output"))
}

pub async fn handle_canonicals(args: &ArgMatches) -> Result<()> {
    let config = build_config(args)?;
    let site = site_url(args)?;
    let prober = config.build_prober()?;
    let pages = resolve_pages(args, &prober, &site).await?;

    println!("Checking canonicals on {} pages\n", pages.len());

    let validation = CanonicalValidator::new(prober.clone(), site)
        .with_workers(config.workers)
        .validate(&pages)
        .await;
    let mut issues = validation.issues;

    if flag(args, "hreflang") {
        issues.extend(
            HreflangValidator::new(prober)
                .with_workers(config.workers)
                .validate_hreflangs(&pages)
                .await,
        );
    }

    if issues.is_empty() {
        println!(
            "{} {} pages checked, no issues",
            "✓".green().bold(),
            validation.pages_checked
        );
    } else {
        print_issues(&issues);
        println!(
            "\n{} {} issue(s) across {} pages",
            "✗".red().bold(),
            issues.len(),
            validation.pages_checked
        );
    }
    Ok(())
}

pub async fn handle_redirects(args: &ArgMatches) -> Result<()> {
    let config = build_config(args)?;
    let site = site_url(args)?;
    let prober = config.build_prober()?;
    let pages = resolve_pages(args, &prober, &site).await?;

    let chains = RedirectResolver::new(prober)
        .with_max_hops(config.max_hops)
        .with_workers(config.workers)
        .analyze_redirects(&pages)
        .await;

    if chains.is_empty() {
        println!("{} No redirects among {} pages", "✓".green().bold(), pages.len());
        return Ok(());
    }

    for chain in &chains {
        let glyph = if chain.looped || chain.total_hops > 1 {
            "✗".red().bold()
        } else {
            "↪".cyan().bold()
        };
        println!(
            "{} {} → {} ({} hop{})",
            glyph,
            chain.start_url,
            chain.final_url,
            chain.total_hops,
            if chain.total_hops == 1 { "" } else { "s" }
        );
        for hop in &chain.hops {
            println!("      {} {}", hop.status_code.to_string().cyan(), hop.url);
        }
        println!("      {}", chain.suggestion().dimmed());
    }
    println!("\n{} redirect chain(s) across {} pages", chains.len(), pages.len());
    Ok(())
}

pub async fn handle_sitemap_validate(args: &ArgMatches) -> Result<()> {
    let config = build_config(args)?;
    let sitemap_url = site_url(args)?;

    let issues = SitemapReconciler::new(config.build_prober()?)
        .with_workers(config.workers)
        .with_max_hops(config.max_hops)
        .validate_sitemap(&sitemap_url)
        .await;

    if issues.is_empty() {
        println!("{} Every sitemap entry is valid", "✓".green().bold());
    } else {
        print_issues(&issues);
        println!("\n{} {} sitemap issue(s)", "✗".red().bold(), issues.len());
    }
    Ok(())
}

/// Clean a sitemap and write the result. Returns the files written.
pub async fn handle_sitemap_clean(args: &ArgMatches) -> Result<Vec<PathBuf>> {
    let config = build_config(args)?;
    let prober = config.build_prober()?;

    let input = args
        .get_one::<String>("input")
        .ok_or_else(|| anyhow!("--input is required"))?;
    let output_dir = args
        .get_one::<String>("output-dir")
        .map(|dir| PathBuf::from(shellexpand::tilde(dir).as_ref()))
        .ok_or_else(|| anyhow!("--output-dir is required"))?;
    let base = args
        .get_one::<Url>("base")
        .ok_or_else(|| anyhow!("--base is required"))?;
    let stem = args
        .get_one::<String>("stem")
        .map(String::as_str)
        .unwrap_or("sitemap");

    let document = read_sitemap_source(input, &prober).await?;
    let reconciler = SitemapReconciler::new(prober)
        .with_workers(config.workers)
        .with_max_hops(config.max_hops)
        .with_max_entries(config.max_sitemap_entries);

    let cleaned = reconciler
        .clean_sitemap(&document)
        .await
        .with_context(|| format!("Failed to clean sitemap {}", input))?;
    print_issues(&cleaned.issues);

    let split = cleaned.split(reconciler.max_entries(), base.as_str(), stem);
    let written = write_sitemap_files(&split, &output_dir)?;

    println!(
        "\n{} {} valid entries, {} issue(s)",
        "✓".green().bold(),
        cleaned.valid_urls.len(),
        cleaned.issues.len()
    );
    for path in &written {
        println!("  {} {}", "✓".green(), path.display().to_string().bright_white());
    }
    Ok(written)
}

/// Run a full audit. Returns `true` when the report has blocking issues.
pub async fn handle_audit(args: &ArgMatches) -> Result<bool> {
    let config = build_config(args)?;
    let site = site_url(args)?;
    let format = parse_format(args)?;
    let quiet = flag(args, "quiet");

    let mut options =
        AuditOptions::new(site.clone()).seeded_from_sitemap(flag(args, "seed-from-sitemap"));
    if let Some(sitemap) = args.get_one::<Url>("sitemap") {
        options = options.with_sitemap(sitemap.as_str());
    }

    // fail before the network run if the report cannot be stored
    let db = if flag(args, "save") {
        Some(open_database(args)?)
    } else {
        None
    };

    let report = execute_audit(&config, options, progress_printer(quiet))
        .await
        .with_context(|| format!("Audit of {} failed", site))?;

    if let Some(db) = db {
        let session_id = db.save_report(&report, &config)?;
        println!("{} Audit saved as session {}", "✓".green().bold(), session_id);
    }

    emit(
        &render_report(&report, format)?,
        args.get_one::<PathBuf>("output"),
    )?;

    let blocking = report.has_blocking_issues();
    if blocking {
        eprintln!(
            "{} {} blocking issue(s) found",
            "✗".red().bold(),
            report.blocking_count()
        );
    }
    Ok(blocking)
}

fn open_database(args: &ArgMatches) -> Result<Database> {
    let db_path = resolve_db_path(
        args.get_one::<String>("db")
            .map(String::as_str)
            .unwrap_or(crate::commands::DEFAULT_CONFIG_DIR),
    );
    if !Database::exists(&db_path) {
        bail!(
            "No database at {}; run `sitesweep init` first",
            db_path.display()
        );
    }
    Ok(Database::new(&db_path)?)
}

pub fn handle_report(args: &ArgMatches) -> Result<()> {
    let db = open_database(args)?;
    let session_id = args
        .get_one::<String>("session")
        .ok_or_else(|| anyhow!("--session is required"))?;

    let report = db.load_report(session_id)?;
    emit(
        &render_report(&report, parse_format(args)?)?,
        args.get_one::<PathBuf>("output"),
    )
}

pub fn handle_history(args: &ArgMatches) -> Result<()> {
    let sessions = open_database(args)?.list_sessions()?;
    if sessions.is_empty() {
        println!("No saved audits yet. Run `sitesweep audit --save`.");
        return Ok(());
    }

    for session in sessions {
        let started = format_timestamp(session.start_time);
        let score = session
            .health_score
            .map(|s| format!("{}/100", s))
            .unwrap_or_else(|| "-".to_string());
        let status = match session.status.as_str() {
            "completed" => session.status.green(),
            "failed" => session.status.red(),
            _ => session.status.yellow(),
        };
        println!(
            "{}  {}  {}  {}  {} issue(s)  {}",
            session.id.dimmed(),
            started,
            status,
            score.bright_white(),
            session.issue_count,
            session.site_url
        );
    }
    Ok(())
}

fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
