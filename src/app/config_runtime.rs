//! Merges command-line flags, file configuration and library defaults.

use std::time::Duration;

use anyhow::{Context, Result};
use catexplorer_core::{ExplorerConfig, FetcherConfig};
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};

use crate::app_config::{FileConfig, VerbositySetting};
use crate::cli::Args;

/// Which flags were given explicitly; those win over file values.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) locale: bool,
    pub(crate) depth: bool,
    pub(crate) format: bool,
    pub(crate) rate_limit: bool,
    pub(crate) max_retries: bool,
    pub(crate) api_url: bool,
    pub(crate) no_pages: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

pub(crate) fn parse_cli_with_sources() -> (Args, CliValueSources) {
    let command = Args::command();
    let matches = command.get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let sources = sources_from_matches(&matches);
    (args, sources)
}

fn sources_from_matches(matches: &ArgMatches) -> CliValueSources {
    CliValueSources {
        locale: is_commandline_value(matches, "locale"),
        depth: is_commandline_value(matches, "depth"),
        format: is_commandline_value(matches, "format"),
        rate_limit: is_commandline_value(matches, "rate_limit"),
        max_retries: is_commandline_value(matches, "max_retries"),
        api_url: is_commandline_value(matches, "api_url"),
        no_pages: is_commandline_value(matches, "no_pages"),
        verbose: is_commandline_value(matches, "verbose"),
        quiet: is_commandline_value(matches, "quiet"),
    }
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Fills every flag not given on the command line from the config file.
pub(crate) fn apply_config_defaults(
    mut args: Args,
    cli_sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> Args {
    let Some(file_config) = file_config else {
        return args;
    };

    if !cli_sources.locale
        && let Some(locale) = &file_config.locale
    {
        args.locale.clone_from(locale);
    }
    if !cli_sources.depth
        && let Some(depth) = file_config.depth
    {
        args.depth = depth;
    }
    if !cli_sources.format
        && let Some(format) = file_config.format
    {
        args.format = format;
    }
    if !cli_sources.rate_limit
        && let Some(rate_limit) = file_config.rate_limit
    {
        args.rate_limit = rate_limit;
    }
    if !cli_sources.max_retries
        && let Some(max_retries) = file_config.max_retries
    {
        args.max_retries = max_retries;
    }
    if !cli_sources.api_url
        && args.api_url.is_none()
        && let Some(api_url) = &file_config.api_url
    {
        args.api_url = Some(api_url.clone());
    }
    if !cli_sources.no_pages
        && let Some(include_pages) = file_config.include_pages
    {
        args.no_pages = !include_pages;
    }
    if !cli_sources.verbose
        && !cli_sources.quiet
        && let Some(verbosity) = file_config.verbosity
    {
        apply_config_verbosity(&mut args, verbosity);
    }
    args
}

fn apply_config_verbosity(args: &mut Args, verbosity: VerbositySetting) {
    let (quiet, verbose) = match verbosity {
        VerbositySetting::Default => (false, 0),
        VerbositySetting::Verbose => (false, 1),
        VerbositySetting::Quiet => (true, 0),
        VerbositySetting::Debug => (false, 2),
    };
    args.quiet = quiet;
    args.verbose = verbose;
}

pub(crate) fn resolve_default_log_level(args: &Args) -> &'static str {
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

pub(crate) fn build_explorer_config(args: &Args) -> Result<ExplorerConfig> {
    let config = ExplorerConfig {
        locale: args.locale.clone(),
        depth_limit: args.depth,
        include_metadata: !args.no_pages,
    };
    config.validate().context("Invalid explorer settings")?;
    Ok(config)
}

pub(crate) fn build_fetcher_config(
    args: &Args,
    file_config: Option<&FileConfig>,
) -> Result<FetcherConfig> {
    let mut config = FetcherConfig {
        max_retries: args.max_retries,
        rate_limit: Duration::from_millis(args.rate_limit),
        ..FetcherConfig::default()
    };
    if let Some(api_url) = &args.api_url {
        config.api_url_template.clone_from(api_url);
    }
    if let Some(file_config) = file_config {
        if let Some(user_agent) = &file_config.user_agent {
            config.user_agent.clone_from(user_agent);
        }
        if let Some(secs) = file_config.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file_config.read_timeout_secs {
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(max_continuations) = file_config.max_continuations {
            config.max_continuations = max_continuations;
        }
    }
    config.validate().context("Invalid fetcher settings")?;
    Ok(config)
}
