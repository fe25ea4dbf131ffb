//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use clap::builder::TypedValueParser;

use catexplorer_core::config::{DEFAULT_DEPTH_LIMIT, DEFAULT_LOCALE};
use catexplorer_core::fetcher::DEFAULT_MAX_RETRIES;
use catexplorer_core::{ExportFormat, NodeId};

/// Explore a wiki category tree and export the articles under a selection.
///
/// Opens CATEGORY, prefetches the requested nodes a few levels deep, prints
/// the annotated tree and writes the selected articles in the chosen format.
#[derive(Parser, Debug)]
#[command(name = "catexplorer")]
#[command(author, version, about)]
pub struct Args {
    /// Category title, `Category:` title, or wiki page URL
    pub category: String,

    /// Wiki language code (en, de, zh-yue, ...)
    #[arg(short = 'l', long, default_value = DEFAULT_LOCALE)]
    pub locale: String,

    /// Levels fetched below each expanded node (0-5)
    #[arg(short = 'd', long, default_value_t = DEFAULT_DEPTH_LIMIT, value_parser = clap::value_parser!(u8).range(0..=5).map(usize::from))]
    pub depth: usize,

    /// Node id to expand (repeatable)
    #[arg(short = 'e', long = "expand", value_name = "ID")]
    pub expand: Vec<NodeId>,

    /// Expand every subcategory of the explored category
    #[arg(short = 'a', long)]
    pub expand_all: bool,

    /// Node id to select (repeatable)
    #[arg(short = 's', long = "select", value_name = "ID")]
    pub select: Vec<NodeId>,

    /// Select the explored category itself
    #[arg(long)]
    pub select_top: bool,

    /// Export format: csv, txt, wikicode, json
    #[arg(short = 'f', long, default_value_t = ExportFormat::Csv)]
    pub format: ExportFormat,

    /// Write the export to this file instead of stdout; the format's
    /// extension is added when PATH has none
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Do not print the category tree
    #[arg(long)]
    pub no_tree: bool,

    /// List subcategories only (no articles, nothing to export)
    #[arg(long)]
    pub no_pages: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Maximum attempts per API request (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_retries: u32,

    /// Minimum delay between API requests in milliseconds (0 to disable, max 60000)
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub rate_limit: u64,

    /// API endpoint; `{locale}` is replaced with the language code
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Config file (default: $XDG_CONFIG_HOME/catexplorer/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
