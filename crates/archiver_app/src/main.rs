mod cli;
mod config;
mod logging;
mod report;

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use archiver_core::parse_source_list;
use archiver_engine::{ArchiveEngine, ThrottledFetcher};
use archiver_logging::{archive_error, archive_info, archive_warn, level_from_verbosity};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use crate::config::ArchiverConfig;
use crate::logging::LogDestination;

/// Exit status of a run stopped with Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            archive_error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::initialize(
        LogDestination::from_log_file(cli.log_file.as_deref()),
        level_from_verbosity(cli.verbose),
    );

    let mut config = ArchiverConfig::load(cli.config.as_deref())?;
    config.apply_cli(&cli)?;

    let fetcher = ThrottledFetcher::from_settings(&config.fetch_settings()?)
        .context("building HTTP client")?;
    let engine = ArchiveEngine::new(Arc::new(fetcher), &config.rules, config.engine_config())
        .context("compiling sanitizer rules")?;

    if cli.links_only {
        archive_info!("resolving links under {}", config.output_dir.display());
        let report = engine.resolve_links().await?;
        println!(
            "links: {} rewritten in {} of {} posts, {} left unresolved",
            report.links_rewritten,
            report.posts_rewritten,
            report.posts_scanned,
            report.links_unresolved
        );
        return Ok(ExitCode::SUCCESS);
    }

    let Some(input) = cli.input.as_deref() else {
        anyhow::bail!("--input is required unless --links-only is given");
    };
    let raw = fs::read_to_string(input)
        .with_context(|| format!("reading input list {}", input.display()))?;
    let identifiers = parse_source_list(&raw);
    archive_info!(
        "{} identifiers from {}, output under {}",
        identifiers.len(),
        input.display(),
        config.output_dir.display()
    );

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let summary = engine.run(identifiers, cancel).await;
    watcher.abort();

    report::save_report(&config.output_dir, &summary);
    println!("{summary}");
    for row in &summary.failures {
        println!("  failed at {}: {} ({})", row.stage, row.identifier, row.message);
    }

    if summary.is_fatal() {
        Ok(ExitCode::FAILURE)
    } else if summary.cancelled {
        Ok(ExitCode::from(EXIT_INTERRUPTED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            archive_warn!("interrupt received; stopping after in-flight work");
            cancel.cancel();
        }
        Err(err) => archive_warn!("cannot listen for Ctrl-C: {err}"),
    }
}
