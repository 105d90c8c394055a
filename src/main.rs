//! page-walker - Parallel Fetcher for Paginated APIs
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use page_walker::config::{CliArgs, RunConfig};
use page_walker::pager::FetchCoordinator;
use page_walker::progress::{print_header, print_summary, ProgressReporter, Summary};
use page_walker::sink::{JsonLinesSink, RecordSink};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    let config = RunConfig::from_args(args).context("Invalid configuration")?;
    let output = config.output_display();

    if config.show_progress {
        print_header(
            &format!(
                "simulated API ({} pages x {} records)",
                config.api.pages(),
                config.api.page_size()
            ),
            config.fetch.worker_count,
            &output,
        );
    }

    let coordinator =
        FetchCoordinator::new(config.fetch.clone()).context("Failed to initialize fetcher")?;

    let progress = config.show_progress.then(ProgressReporter::new);
    if let Some(ref p) = progress {
        p.set_status("Fetching first page...");
    }

    let result = coordinator.run_with_progress(&config.api, |snapshot| {
        if let Some(ref p) = progress {
            p.update(&snapshot);
        }
    });

    let mut report = match result {
        Ok(report) => report,
        Err(e) => {
            if let Some(ref p) = progress {
                p.finish("Fetch failed");
            }
            return Err(e).context("Fetch failed");
        }
    };

    if let Some(ref p) = progress {
        p.finish("Fetch completed");
    }

    // Completion order is arbitrary; the sink gets a stable order
    report.records.sort_unstable_by(|a, b| a.id.cmp(&b.id));

    let bytes = match &config.output_path {
        Some(path) => JsonLinesSink::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?
            .write_records(&report.records[..]),
        None => JsonLinesSink::stdout().write_records(&report.records[..]),
    }
    .context("Failed to write records")?;

    info!(
        records = report.records.len(),
        requests = config.api.calls(),
        "Output written"
    );

    if config.show_progress {
        print_summary(&Summary {
            pages: report.pages,
            records: report.records.len(),
            dropped_tokens: report.dropped_tokens,
            duration: report.duration,
            output: &output,
            output_bytes: bytes,
        });
    }

    if !report.is_complete() {
        warn!(
            dropped = report.dropped_tokens,
            "Some pages were never fetched, output is incomplete"
        );
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("page_walker=debug,warn")
    } else {
        EnvFilter::new("page_walker=info,warn")
    };

    // Records may go to stdout
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
