use colored::Colorize;
use sitesweep::command_argument_builder;
use sitesweep::handlers::{
    handle_audit, handle_canonicals, handle_crawl, handle_history, handle_init, handle_redirects,
    handle_report, handle_sitemap_clean, handle_sitemap_validate, print_banner,
};
use tracing::Level;

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let chosen_command = command_argument_builder().get_matches();
    let quiet = chosen_command.get_flag("quiet");

    init_tracing(chosen_command.get_flag("verbose"), quiet);

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    let result = match chosen_command.subcommand() {
        // No subcommand provided, just show the banner
        None => Ok(false),
        Some(("init", args)) => handle_init(args).map(|_| false),
        Some(("crawl", args)) => handle_crawl(args).await.map(|_| false),
        Some(("canonicals", args)) => handle_canonicals(args).await.map(|_| false),
        Some(("redirects", args)) => handle_redirects(args).await.map(|_| false),
        Some(("sitemap", args)) => match args.subcommand() {
            Some(("validate", sub)) => handle_sitemap_validate(sub).await.map(|_| false),
            Some(("clean", sub)) => handle_sitemap_clean(sub).await.map(|_| false),
            _ => unreachable!("clap should ensure we don't get here"),
        },
        Some(("audit", args)) => handle_audit(args).await,
        Some(("report", args)) => handle_report(args).map(|_| false),
        Some(("history", args)) => handle_history(args).map(|_| false),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    match result {
        Ok(false) => {}
        Ok(true) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}
