//! Filepath: src/app.rs
//! End-to-end flow: load config, pick a binding, expand patterns, run the
//! visual check, confirm, upload.
//!
//! Exit-code contract: configuration and validation problems surface as
//! errors (exit 1); graceful no-ops — no files found, user cancelled —
//! return cleanly. A partially failed upload batch is reported in the
//! output but still exits 0.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Result};
use clap::CommandFactory;
use indicatif::ProgressBar;
use owo_colors::{OwoColorize, Style};

use crate::cli::{AppContext, Cli};
use crate::core::excludes::{relative_slash_path, scan_ignored, ExcludeSet};
use crate::core::tree::{TreeDiff, TreeNode};
use crate::core::upload;
use crate::core::walk::expand_patterns;
use crate::infra::config::{
    global_config_locations, Binding, Config, ConfigError, Protocol, TieBreak,
};
use crate::infra::term::{confirm, format_elapsed};
use crate::remote::ftp::FtpConnector;
use crate::remote::session::{list_remote, RemoteConnector, ScanProgress};
use crate::remote::sftp::SftpConnector;

/// Styles resolved once from the color flag; plain styles when colors
/// are off.
struct Palette {
    ok: Style,
    warn: Style,
    err: Style,
    head: Style,
    dim: Style,
}

impl Palette {
    fn new(color: bool) -> Self {
        if color {
            Self {
                ok: Style::new().green(),
                warn: Style::new().yellow(),
                err: Style::new().red(),
                head: Style::new().cyan().bold(),
                dim: Style::new().dimmed(),
            }
        } else {
            Self {
                ok: Style::new(),
                warn: Style::new(),
                err: Style::new(),
                head: Style::new(),
                dim: Style::new(),
            }
        }
    }
}

enum Gate {
    Proceed,
    Cancelled,
}

pub fn run(cli: Cli) -> Result<()> {
    let ctx = cli.context();
    let palette = Palette::new(ctx.color());

    if cli.patterns.is_empty() && !cli.show_config && !cli.show_ignored {
        Cli::command().print_help()?;
        return Ok(());
    }

    let start_dir = std::env::current_dir()?;
    let config = Config::load(&start_dir, &global_config_locations())?;
    for warning in &config.warnings {
        eprintln!("{}", format!("Warning: {warning}").style(palette.warn));
    }

    if cli.show_config {
        show_config(&config, &palette);
        return Ok(());
    }

    let alias = select_binding(&cli, &config, &start_dir, &ctx, &palette)?;

    if let Some(comment) = config.comment() {
        display_comment(comment, &palette);
    }

    let binding = config.binding(&alias)?;
    if let Some(comment) = binding.comment() {
        display_comment(comment, &palette);
    }

    if !binding.local_basepath.exists() {
        return Err(ConfigError::BasepathMissing(binding.local_basepath.clone()).into());
    }

    let mut exclude_tokens = config.global_excludes.clone();
    exclude_tokens.extend(binding.excludes.iter().cloned());
    if let Some(comment) = config.global_excludes_comment() {
        display_comment(comment, &palette);
    }
    if let Some(comment) = binding.excludes_comment() {
        display_comment(comment, &palette);
    }
    let excludes = ExcludeSet::new(&exclude_tokens);

    if cli.show_ignored {
        show_ignored(&binding, &exclude_tokens, &excludes, cli.recursive(), &palette);
        return Ok(());
    }

    let expansion = expand_patterns(
        &cli.patterns,
        &excludes,
        &binding.local_basepath,
        &start_dir,
        cli.recursive(),
    );
    for warning in &expansion.warnings {
        eprintln!("{}", format!("Warning: {warning}").style(palette.warn));
    }
    if expansion.files.is_empty() {
        println!("No files found to upload.");
        return Ok(());
    }

    let workers = cli.max_workers.unwrap_or(binding.max_workers);
    let connector = make_connector(&binding, cli.ftp_active);

    if !cli.force && (cli.visual_check || cli.visual_check_complete()) {
        // An explicit --visual-check narrows the default complete view
        // down to changes only.
        let complete = cli.visual_check_complete() && !cli.visual_check;
        let gate = visual_check(
            &binding,
            connector.as_ref(),
            &expansion.files,
            complete,
            cli.max_depth,
            cli.tree_summary,
            &ctx,
            &palette,
        );
        if matches!(gate, Gate::Cancelled) {
            return Ok(());
        }
    }

    let started = Instant::now();
    if !ctx.quiet {
        println!("Uploading with {workers} parallel worker(s)...");
    }
    let report = upload::upload(
        connector.as_ref(),
        expansion.files,
        &binding.local_basepath,
        &binding.remote_basepath,
        workers,
        |outcome, completed, total| {
            let counter = format!("[{completed}/{total}]");
            match &outcome.result {
                Ok(remote) => println!(
                    "{counter} {}",
                    format!("{} -> {remote}", outcome.local.display()).style(palette.ok)
                ),
                Err(e) => eprintln!(
                    "{counter} {}",
                    format!("{} failed: {e}", outcome.local.display()).style(palette.err)
                ),
            }
        },
    );

    println!();
    println!("Upload completed in {}", format_elapsed(started.elapsed()));
    if report.failed > 0 {
        println!(
            "{}",
            format!("{} of {} uploads failed", report.failed, report.completed)
                .style(palette.warn)
        );
    }
    Ok(())
}

fn select_binding(
    cli: &Cli,
    config: &Config,
    start_dir: &Path,
    ctx: &AppContext,
    palette: &Palette,
) -> Result<String> {
    if let Some(alias) = &cli.binding {
        return Ok(alias.clone());
    }

    match config.auto_detect_binding(start_dir, TieBreak::FirstDefined)? {
        Some(detected) => {
            if !detected.ambiguous_with.is_empty() {
                eprintln!(
                    "{}",
                    format!(
                        "Warning: bindings {} share the same local base path; \
                         using '{}' (first defined)",
                        std::iter::once(&detected.alias)
                            .chain(detected.ambiguous_with.iter())
                            .map(String::as_str)
                            .collect::<Vec<_>>()
                            .join(", "),
                        detected.alias
                    )
                    .style(palette.warn)
                );
            }
            if !ctx.quiet {
                println!("Auto-detected binding: {}", detected.alias);
            }
            Ok(detected.alias)
        }
        None => {
            let mut message = String::from(
                "could not auto-detect binding; specify one with -b/--binding\n\
                 Available bindings:",
            );
            for (alias, base) in config.binding_aliases() {
                match base {
                    Some(base) => {
                        message.push_str(&format!("\n  - {alias}: {}", base.display()));
                    }
                    None => message.push_str(&format!("\n  - {alias}")),
                }
            }
            bail!(message)
        }
    }
}

fn make_connector(binding: &Binding, ftp_active: bool) -> Box<dyn RemoteConnector> {
    match binding.protocol {
        Protocol::Ftp => Box::new(FtpConnector {
            hostname: binding.hostname.clone(),
            port: binding.port,
            username: binding.username.clone(),
            password: binding.password.clone().unwrap_or_default(),
            passive: !ftp_active,
        }),
        Protocol::Sftp => Box::new(SftpConnector {
            hostname: binding.hostname.clone(),
            port: binding.port,
            username: binding.username.clone(),
            password: binding.password.clone(),
            key_file: binding.key_filename.clone(),
        }),
    }
}

/// Compare the local selection against the remote tree and ask for
/// confirmation. A connection failure falls back to an explicit
/// proceed-without-comparison choice.
#[allow(clippy::too_many_arguments)]
fn visual_check(
    binding: &Binding,
    connector: &dyn RemoteConnector,
    files: &[PathBuf],
    complete: bool,
    max_depth: usize,
    summary_only: bool,
    ctx: &AppContext,
    palette: &Palette,
) -> Gate {
    if !ctx.quiet {
        println!("Connecting to {}...", binding.hostname);
        println!("Binding in use: {}", binding.alias);
    }

    let mut session = match connector.connect() {
        Ok(session) => session,
        Err(e) => {
            eprintln!(
                "{}",
                format!("Warning: failed to list remote files: {e}").style(palette.warn)
            );
            return if confirm("Proceed with upload without comparison?", false) {
                Gate::Proceed
            } else {
                println!("Upload cancelled.");
                Gate::Cancelled
            };
        }
    };

    let local: BTreeSet<String> = files
        .iter()
        .filter_map(|f| relative_slash_path(f, &binding.local_basepath))
        .collect();

    let spinner = if ctx.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    let scan_started = Instant::now();
    let mut last = ScanProgress::default();
    let remote = list_remote(session.as_mut(), &binding.remote_basepath, |p| {
        last = p;
        spinner.set_message(format!(
            "Scanning... {} dirs, {} files found",
            p.dirs_scanned, p.files_found
        ));
        spinner.tick();
    });
    spinner.finish_and_clear();
    session.close();

    if !ctx.quiet {
        println!(
            "{}",
            format!(
                "Found {} files in {} directories",
                last.files_found, last.dirs_scanned
            )
            .style(palette.ok)
        );
        println!(
            "Scan completed in {}",
            format_elapsed(scan_started.elapsed())
        );
    }

    let diff = TreeDiff::compute(&local, &remote, complete);

    if !summary_only {
        let mode = if complete { "Complete" } else { "Changes Only" };
        println!();
        println!(
            "{}",
            format!("File Comparison Tree - {mode} (max depth: {max_depth})")
                .style(palette.head)
        );
        println!();
        println!("Local:  {}", binding.local_basepath.display());
        println!("Remote: {}", binding.remote_basepath);
        println!();
        if !complete {
            println!(
                "{}",
                "(remote-only files not shown; drop --visual-check to see all)"
                    .style(palette.dim)
            );
        }

        let tree = TreeNode::from_diff(&diff);
        let mut lines = Vec::new();
        let hidden = tree.render(max_depth, ctx.color(), &mut lines);
        for line in &lines {
            println!("{line}");
        }
        if hidden > 0 {
            println!();
            println!("... ({hidden} more files beyond depth {max_depth})");
        }
    }

    let rule = "=".repeat(60);
    println!();
    println!("{rule}");
    println!("Summary:");
    println!("{rule}");
    println!(
        "  {} {}",
        "New files:         ".style(palette.ok),
        diff.new.len()
    );
    println!(
        "  {} {}",
        "Files to overwrite:".style(palette.warn),
        diff.overwrite.len()
    );
    println!(
        "  {} {}",
        "Remote only:       ".style(palette.dim),
        diff.remote_only_count()
    );
    println!("{rule}");
    println!();

    if confirm("Proceed with upload?", false) {
        println!();
        Gate::Proceed
    } else {
        println!("Upload cancelled.");
        Gate::Cancelled
    }
}

fn show_config(config: &Config, palette: &Palette) {
    println!("{}", "Configuration files (merge order):".style(palette.head));
    for (i, file) in config.sources.config_files.iter().enumerate() {
        println!("  {}. {}", i + 1, file.display());
    }

    println!();
    println!("{}", "Merged configuration:".style(palette.head));
    let json =
        serde_json::to_string_pretty(&config.to_json()).unwrap_or_else(|_| String::new());
    println!("{}", json.style(palette.ok));

    println!();
    println!("{}", "Source annotations:".style(palette.head));

    if !config.sources.global_excludes.is_empty() {
        println!("  {}", "global_excludes:".style(palette.warn));
        for (pattern, sources) in &config.sources.global_excludes {
            println!("    - {pattern}");
            println!(
                "      from: {}",
                format_sources(sources).style(palette.dim)
            );
        }
    }

    if !config.sources.bindings.is_empty() {
        println!("  {}", "bindings:".style(palette.warn));
        for (alias, info) in &config.sources.bindings {
            println!("    - {alias}");
            println!(
                "      defined in: {}",
                format_sources(&info.defined_in).style(palette.dim)
            );
            for (field, sources) in &info.fields {
                println!(
                    "        {field}: from {}",
                    format_sources(sources).style(palette.dim)
                );
            }
        }
    }
}

fn format_sources(sources: &[std::path::PathBuf]) -> String {
    sources
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn show_ignored(
    binding: &Binding,
    tokens: &[String],
    excludes: &ExcludeSet,
    recursive: bool,
    palette: &Palette,
) {
    println!(
        "{}",
        "Ignored files and directories:".style(palette.head)
    );
    println!("Scanning from: {}", binding.local_basepath.display());
    println!(
        "Mode: {}",
        if recursive { "Recursive" } else { "Current directory only" }
    );
    println!();

    if tokens.is_empty() {
        println!("{}", "No exclude patterns configured.".style(palette.dim));
        return;
    }

    println!("{}", "Active exclude patterns:".style(palette.warn));
    for token in tokens {
        println!("  - {token}");
    }
    println!();

    let (items, scanned) = scan_ignored(&binding.local_basepath, excludes, recursive);
    if items.is_empty() {
        println!("{}", "No ignored files or directories found.".style(palette.ok));
    } else {
        println!(
            "{}",
            format!("Found {} ignored items:", items.len()).style(palette.err)
        );
        println!();
        for item in &items {
            let indent = "  ".repeat(item.depth);
            let suffix = if item.is_dir { "/" } else { "" };
            println!(
                "{indent}{}",
                format!("{}{suffix}", item.rel_path).style(palette.err)
            );
        }
    }
    println!();
    println!("Total items scanned: {scanned}");
}

fn display_comment(comment: &str, palette: &Palette) {
    println!("{}", format!("note: {comment}").style(palette.dim));
}
