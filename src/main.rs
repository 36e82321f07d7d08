// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Command-line interface for chat2html.
//!
//! This binary provides the `chat2html` command for converting a ChatGPT
//! data export into a static HTML site.

use chat2html::{parser, renderer, site};
use lexopt::prelude::*;
use snafu::{ensure, prelude::*};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_INPUT: &str = "conversations.json";
const DEFAULT_OUT_DIR: &str = "site_out";

#[allow(clippy::struct_excessive_bools)]
struct Cli {
    input: PathBuf,
    archive_dir: Option<PathBuf>,
    out_dir: PathBuf,
    render: renderer::RenderOptions,
    quiet: bool,
    verbose: bool,
    dry_run: bool,
    force: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to parse arguments: {source}"))]
    ParseArgs { source: lexopt::Error },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseFile {
        path: PathBuf,
        source: parser::ParseError,
    },

    #[snafu(display(
        "{} already contains a site (use --force to overwrite)",
        path.display()
    ))]
    OutputExists { path: PathBuf },

    #[snafu(display("failed to build site: {source}"))]
    Build { source: site::SiteError },

    #[snafu(display("{failed} page(s) could not be written"))]
    Incomplete { failed: usize },
}

fn print_help() {
    println!(
        "\
{name} {version}
Convert a ChatGPT data export to a static HTML site

Usage: {name} [OPTIONS] [INPUT]

Arguments:
  [INPUT]  Export JSON file (default: {input})

Options:
  -f, --file <FILE>             Export JSON file (same as INPUT)
  -d, --archive-dir <DIR>       Directory holding exported images and files
                                (default: the directory containing INPUT)
  -o, --out-dir <DIR>           Output directory (default: {out_dir})
  -u, --user-name <NAME>        Label for user messages (default: User)
  -a, --assistant-name <NAME>   Label for assistant messages (default: Assistant)
      --title <TITLE>           Title of the index page (default: {title})

Content display (use --show-* or --hide-*):
      --show-system             Include system messages and custom instructions (default: off)
      --hide-system             Hide system messages
      --show-tools              Include tool calls and tool output (default: off)
      --hide-tools              Hide tool calls
      --show-thoughts           Include reasoning steps (default: on)
      --hide-thoughts           Hide reasoning steps
      --show-timestamps         Include message timestamps (default: off)
      --hide-timestamps         Hide message timestamps

Other options:
  -q, --quiet                   Only report warnings and errors
  -v, --verbose                 Report every file written
  -n, --dry-run                 Show what would be written without writing
      --force                   Overwrite an existing site
  -h, --help                    Print help
  -V, --version                 Print version

Logging can also be configured with RUST_LOG.",
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        input = DEFAULT_INPUT,
        out_dir = DEFAULT_OUT_DIR,
        title = renderer::DEFAULT_SITE_TITLE,
    );
}

fn parse_args() -> Result<Cli, lexopt::Error> {
    let mut input: Option<PathBuf> = None;
    let mut archive_dir = None;
    let mut out_dir = PathBuf::from(DEFAULT_OUT_DIR);
    let mut render = renderer::RenderOptions::default();
    let mut quiet = false;
    let mut verbose = false;
    let mut dry_run = false;
    let mut force = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Short('f') | Long("file") => input = Some(parser.value()?.parse()?),
            Short('d') | Long("archive-dir") => archive_dir = Some(parser.value()?.parse()?),
            Short('o') | Long("out-dir") => out_dir = parser.value()?.parse()?,
            Short('u') | Long("user-name") => render.user_name = parser.value()?.string()?,
            Short('a') | Long("assistant-name") => {
                render.assistant_name = parser.value()?.string()?;
            }
            Long("title") => render.site_title = parser.value()?.string()?,
            // Show/hide flags - last one wins
            Long("show-system") => render.show_system = true,
            Long("hide-system") => render.show_system = false,
            Long("show-tools") => render.show_tools = true,
            Long("hide-tools") => render.show_tools = false,
            Long("show-thoughts") => render.show_thoughts = true,
            Long("hide-thoughts") => render.show_thoughts = false,
            Long("show-timestamps") => render.show_timestamps = true,
            Long("hide-timestamps") => render.show_timestamps = false,
            Short('q') | Long("quiet") => quiet = true,
            Short('v') | Long("verbose") => verbose = true,
            Short('n') | Long("dry-run") => dry_run = true,
            Long("force") => force = true,
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            Short('V') | Long("version") => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            Value(val) if input.is_none() => input = Some(val.parse()?),
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(Cli {
        input: input.unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT)),
        archive_dir,
        out_dir,
        render,
        quiet,
        verbose,
        dry_run,
        force,
    })
}

/// Sets up logging to stderr; `RUST_LOG` overrides the flags.
fn setup_logging(quiet: bool, verbose: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter)
        .init();
}

/// Directory to search for assets when none is given: the one holding
/// the export file.
fn default_archive_dir(input: &Path) -> PathBuf {
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let cli = parse_args().context(ParseArgsSnafu)?;
    setup_logging(cli.quiet, cli.verbose);

    ensure!(
        cli.force || cli.dry_run || !site::has_existing_site(&cli.out_dir),
        OutputExistsSnafu { path: &cli.out_dir }
    );

    let path = &cli.input;
    let json = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    let archive = parser::parse_archive(&json).context(ParseFileSnafu { path })?;
    info!(
        path = %path.display(),
        conversations = archive.conversations.len(),
        "loaded export"
    );

    let opts = site::SiteOptions {
        archive_dir: cli
            .archive_dir
            .clone()
            .unwrap_or_else(|| default_archive_dir(path)),
        out_dir: cli.out_dir.clone(),
        render: cli.render,
        dry_run: cli.dry_run,
    };
    let summary = site::build_site(&archive, &opts).context(BuildSnafu)?;

    info!(
        pages = summary.pages,
        assets = summary.assets.copied + summary.assets.written,
        missing_assets = summary.assets.missing,
        out_dir = %opts.out_dir.display(),
        "{}",
        if opts.dry_run { "dry run complete" } else { "site written" }
    );

    ensure!(
        summary.failed == 0,
        IncompleteSnafu {
            failed: summary.failed
        }
    );
    Ok(())
}
