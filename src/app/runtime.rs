//! One exploration run: open, expand, select, render, export.

use std::collections::HashSet;
use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use catexplorer_core::tree::normalize_category_input;
use catexplorer_core::{
    CategoryExplorer, ExplorerError, ExportFormat, MediaWikiFetcher, NodeId, ToggleOutcome,
    encode,
};
use futures_util::future::join_all;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::{config_runtime, progress_manager};
use crate::app_config;
use crate::cli::Args;
use crate::output;

pub(crate) async fn run() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let (args, cli_sources) = config_runtime::parse_cli_with_sources();
    let loaded_config = app_config::load_config(args.config.as_deref())?;
    let file_config = loaded_config.config.as_ref();
    let args = config_runtime::apply_config_defaults(args, &cli_sources, file_config);

    init_tracing(config_runtime::resolve_default_log_level(&args));
    debug!(?args, "CLI arguments parsed");
    if loaded_config.loaded_from_file()
        && let Some(path) = &loaded_config.path
    {
        debug!(path = %path.display(), "Loaded config file");
    }

    let title = normalize_category_input(&args.category)
        .with_context(|| format!("'{}' does not name a category", args.category))?;
    let explorer_config = config_runtime::build_explorer_config(&args)?;
    let fetcher_config = config_runtime::build_fetcher_config(&args, file_config)?;
    let fetcher =
        Arc::new(MediaWikiFetcher::new(fetcher_config).context("Failed to set up the API client")?);

    info!(category = %title, locale = %explorer_config.locale, "Opening category");
    let explorer = Arc::new(
        CategoryExplorer::open(fetcher, explorer_config, &title)
            .await
            .with_context(|| format!("Failed to open category '{title}'"))?,
    );

    let use_spinner = !args.quiet && io::stderr().is_terminal();
    let (handle, stop) =
        progress_manager::spawn_progress_ui(use_spinner, Arc::clone(&explorer), title.clone());
    expand_requested(&explorer, &args).await;
    select_requested(&explorer, &args).await;
    progress_manager::stop_progress_ui(handle, &stop).await;

    for notice in explorer.take_notices().await {
        warn!(node = %notice.node, "{notice}");
    }

    if !args.no_tree {
        let tree = explorer.tree().await;
        let selection = explorer.selection().await;
        let loaded = explorer.loaded().await;
        print!(
            "{}",
            output::render_tree(&tree, &selection, &loaded, output::terminal_width())
        );
    }

    if args.select.is_empty() && !args.select_top {
        debug!("Nothing selected; skipping export");
        return Ok(());
    }
    write_export(&explorer, &args).await
}

fn init_tracing(default_level: &str) {
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Ids to prefetch: explicit `-e` ids, then every top-level subcategory with
/// `--expand-all`, without repeats.
fn expansion_targets(explicit: &[NodeId], first_level: &[NodeId], expand_all: bool) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let all = if expand_all { first_level } else { &[] };
    explicit
        .iter()
        .chain(all)
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}

async fn expand_requested(explorer: &CategoryExplorer, args: &Args) {
    let first_level = {
        let tree = explorer.tree().await;
        tree.get(tree.top())
            .map(|top| top.children.clone())
            .unwrap_or_default()
    };
    let targets = expansion_targets(&args.expand, &first_level, args.expand_all);
    if targets.is_empty() {
        return;
    }

    let results = join_all(targets.iter().map(|id| explorer.prefetch(*id))).await;
    for (id, result) in targets.iter().zip(results) {
        match result {
            Ok(report) => debug!(
                node = %id,
                outcome = ?report.outcome,
                fetches = report.fetches,
                failures = report.failures,
                "Prefetched"
            ),
            Err(ExplorerError::Tree(error)) => warn!(node = %id, "Skipping expansion: {error}"),
            Err(error) => warn!(node = %id, "Expansion failed: {error}"),
        }
    }
}

async fn select_requested(explorer: &CategoryExplorer, args: &Args) {
    let mut ids = Vec::with_capacity(args.select.len() + 1);
    if args.select_top {
        ids.push(explorer.tree().await.top());
    }
    ids.extend(args.select.iter().copied());

    for id in ids {
        match explorer.toggle(id, true).await {
            Ok(ToggleOutcome::Disabled) => warn!(
                node = %id,
                "Cannot select a category whose subcategories are unknown; expand it first with -e {id}"
            ),
            Ok(outcome) => debug!(node = %id, ?outcome, "Selection updated"),
            Err(error) => warn!(node = %id, "Selection failed: {error}"),
        }
    }
}

async fn write_export(explorer: &CategoryExplorer, args: &Args) -> Result<()> {
    let bag = explorer.selected_articles().await;
    if bag.is_empty() {
        warn!("The selection contains no articles");
    }
    let encoded = encode(&bag, args.format).context("Failed to encode export")?;

    match args.output.as_deref().map(|path| export_path(path, args.format)) {
        Some(path) => {
            fs::write(&path, encoded)
                .with_context(|| format!("Failed to write export to '{}'", path.display()))?;
            info!(path = %path.display(), articles = bag.len(), format = %args.format, "Export written");
        }
        None => print!("{encoded}"),
    }
    Ok(())
}

/// Adds the format's extension when `path` has none.
fn export_path(path: &Path, format: ExportFormat) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(format.extension())
    }
}
