//! Command-line interface definitions.
//!
//! Options that make sense per environment (output directory, config file)
//! can also come from environment variables.

use clap::{Args, Parser, Subcommand};
use listing_scrape::PageCap;
use std::path::PathBuf;

/// Walk paginated search results and convert product tiles to CSV.
///
/// # Examples
///
/// ```sh
/// # First ten pages of "laptop" in a live browser (needs the `chrome` feature)
/// listing_scrape crawl laptop
///
/// # Every page, with a visible browser window and a JSON copy
/// listing_scrape crawl "wireless headphones" --pages all --show-browser --json
///
/// # Offline run over saved result pages
/// listing_scrape crawl laptop --replay ./saved_pages -o ./out
///
/// # Re-convert an earlier capture
/// listing_scrape convert ./out/amazon_laptop_products.html
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search for a term and walk its result pages
    Crawl(CrawlArgs),
    /// Convert a saved raw capture into the product table
    Convert(ConvertArgs),
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Directory for the capture, table and audit log
    #[arg(short, long, env = "LISTING_SCRAPE_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Optional path to a config.yaml file
    #[arg(short, long, env = "LISTING_SCRAPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write the records as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Search term
    #[arg(default_value = "laptop")]
    pub term: String,

    /// Pages to visit: a positive number or "all"
    #[arg(short, long, default_value = "10")]
    pub pages: PageCap,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub show_browser: bool,

    /// Replay saved result pages from this directory instead of a browser
    #[arg(long, value_name = "DIR")]
    pub replay: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Raw capture file written by an earlier crawl
    pub capture: PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl Command {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Command::Crawl(args) => &args.common,
            Command::Convert(args) => &args.common,
        }
    }
}
