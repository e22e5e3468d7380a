use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/sitesweep/";

/// Worker count and request timeout, shared by every networked subcommand.
fn network_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-t --"threads" <NUM_WORKERS>)
            .required(false)
            .help("Maximum number of concurrent requests")
            .value_parser(clap::value_parser!(usize))
            .default_value("5"),
    )
    .arg(
        arg!(--"timeout" <SECONDS>)
            .required(false)
            .help("Per-request timeout in seconds")
            .value_parser(clap::value_parser!(u64))
            .default_value("10"),
    )
}

fn site_arg() -> clap::Arg {
    arg!(-u --"url" <URL>)
        .required(true)
        .help("Base URL of the site")
        .value_parser(clap::value_parser!(Url))
}

fn db_arg() -> clap::Arg {
    arg!(--"db" <PATH>)
        .required(false)
        .help("Directory holding the sitesweep database")
        .default_value(DEFAULT_CONFIG_DIR)
}

fn format_arg() -> clap::Arg {
    arg!(-f --"format" <FORMAT>)
        .required(false)
        .help("Report format: text, json, markdown")
        .value_parser(["text", "json", "markdown", "md"])
        .default_value("text")
}

fn pages_file_arg() -> clap::Arg {
    arg!(--"pages-file" <PATH>)
        .required(false)
        .help("Newline-delimited file of page URLs (default: the site's sitemap)")
        .value_parser(clap::value_parser!(std::path::PathBuf))
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("sitesweep")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("sitesweep")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner, progress and informational logs")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log every request at debug level")
                .required(false)
                .global(true)
                .conflicts_with("quiet"),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the sitesweep audit history database")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location to store the sitesweep database")
                        .default_value(DEFAULT_CONFIG_DIR),
                )
                .arg(
                    arg!(-f - -"force")
                        .help("Overwrite any existing database at the specified location")
                        .required(false),
                ),
        )
        .subcommand(network_args(
            command!("crawl")
                .about("Walk a site and report every broken link")
                .arg(site_arg())
                .arg(
                    arg!(--"sitemap" <URL>)
                        .required(false)
                        .help("Seed the walk from this sitemap instead of the site root")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(--"max-pages" <NUM>)
                        .required(false)
                        .help("Stop after this many pages have been fetched")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10000"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save the report to a file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        ))
        .subcommand(network_args(
            command!("canonicals")
                .about("Validate canonical tags (and optionally hreflang alternates)")
                .arg(site_arg())
                .arg(pages_file_arg())
                .arg(
                    arg!(--"hreflang")
                        .required(false)
                        .help("Also flag hreflang alternates that point at redirects")
                        .action(clap::ArgAction::SetTrue),
                ),
        ))
        .subcommand(network_args(
            command!("redirects")
                .about("Resolve redirect chains for the site's pages")
                .arg(site_arg())
                .arg(pages_file_arg())
                .arg(
                    arg!(--"max-hops" <NUM>)
                        .required(false)
                        .help("Maximum hops followed per chain")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                ),
        ))
        .subcommand(
            command!("sitemap")
                .about("Validate or clean a sitemap")
                .subcommand_required(true)
                .subcommand(network_args(
                    command!("validate")
                        .about("Check every sitemap entry against the live site")
                        .arg(
                            arg!(-u --"url" <SITEMAP_URL>)
                                .required(true)
                                .help("URL of the sitemap or sitemap index")
                                .value_parser(clap::value_parser!(Url)),
                        ),
                ))
                .subcommand(network_args(
                    command!("clean")
                        .about("Write a cleaned sitemap, split into an index when oversized")
                        .arg(
                            arg!(-i --"input" <FILE_OR_URL>)
                                .required(true)
                                .help("Sitemap file or URL to clean"),
                        )
                        .arg(
                            arg!(-o --"output-dir" <DIR>)
                                .required(true)
                                .help("Directory the cleaned sitemap files are written to"),
                        )
                        .arg(
                            arg!(--"base" <URL>)
                                .required(true)
                                .help("Public URL the output directory is served under")
                                .value_parser(clap::value_parser!(Url)),
                        )
                        .arg(
                            arg!(--"max-entries" <NUM>)
                                .required(false)
                                .help("Maximum entries per sitemap document")
                                .value_parser(clap::value_parser!(usize))
                                .default_value("50000"),
                        )
                        .arg(
                            arg!(--"stem" <NAME>)
                                .required(false)
                                .help("Output file name stem")
                                .default_value("sitemap"),
                        ),
                )),
        )
        .subcommand(network_args(
            command!("audit")
                .about("Run every check against a site. Exits 1 on blocking issues.")
                .arg(site_arg())
                .arg(
                    arg!(--"sitemap" <URL>)
                        .required(false)
                        .help("Sitemap URL (default: <URL>/sitemap.xml)")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(--"seed-from-sitemap")
                        .required(false)
                        .help("Walk the sitemap's pages instead of discovering from the root")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"max-pages" <NUM>)
                        .required(false)
                        .help("Stop the walk after this many pages")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10000"),
                )
                .arg(
                    arg!(--"max-hops" <NUM>)
                        .required(false)
                        .help("Maximum hops followed per redirect chain")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"no-hreflang")
                        .required(false)
                        .help("Skip hreflang validation")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(format_arg())
                .arg(
                    arg!(--"save")
                        .required(false)
                        .help("Record the audit in the history database")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(db_arg()),
        ))
        .subcommand(
            command!("report")
                .about("Re-render a saved audit")
                .arg(
                    arg!(-s --"session" <ID>)
                        .required(true)
                        .help("Session id, as shown by `sitesweep history`"),
                )
                .arg(format_arg())
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(db_arg()),
        )
        .subcommand(
            command!("history")
                .about("List saved audits, most recent first")
                .arg(db_arg()),
        )
}
