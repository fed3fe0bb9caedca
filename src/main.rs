// src/main.rs
// =============================================================================
// Entry point of step-crawler.
//
// What happens here:
// 1. Parse command-line arguments and set up logging
// 2. Load and compile the crawl definitions
// 3. Crawl every selected target and write its records
// 4. Print a summary and exit (0 = ok, 1 = empty or invalid target, 2 = error)
//
// Logs go to stderr; stdout only carries the summary (or its JSON form).
// =============================================================================

mod cli;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands, RunArgs};
use step_crawler::config::{self, TargetConfig};
use step_crawler::crawl::{CrawlReport, CrawlTarget, TraversalDriver};
use step_crawler::fetch::{FetchSettings, HttpFetcher};
use step_crawler::output::{JsonFileSink, RecordSink};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "step_crawler=debug"
    } else {
        "step_crawler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run(args) => handle_run(args).await,
        Commands::Validate { config, json } => handle_validate(&config, json),
    }
}

/// One line of the run summary.
#[derive(Debug, Serialize)]
struct TargetSummary {
    name: String,
    records: usize,
    pages_fetched: usize,
    fetch_failures: usize,
    skipped: usize,
    cancelled: bool,
    output: PathBuf,
}

impl TargetSummary {
    fn new(report: &CrawlReport, output: PathBuf) -> Self {
        Self {
            name: report.name.clone(),
            records: report.record_count(),
            pages_fetched: report.pages_fetched,
            fetch_failures: report.fetch_failures,
            skipped: report.skipped,
            cancelled: report.cancelled,
            output,
        }
    }
}

// Handles the 'run' subcommand
async fn handle_run(args: RunArgs) -> Result<i32> {
    let configs = config::load_path(&args.config)
        .with_context(|| format!("could not load {}", args.config.display()))?;
    let selected = select_targets(configs, &args.targets)?;

    let targets = match config::compile_all(selected) {
        Ok(targets) => targets,
        Err(e) => {
            eprintln!("❌ {}", e);
            return Ok(1);
        }
    };

    let sink = JsonFileSink::new(&args.output_dir);
    if args.clean {
        let removed = sink.clean(targets.iter().map(|t| t.name.as_str()))?;
        info!("Removed {} earlier output file(s)", removed);
    }

    let fetcher = HttpFetcher::new(&FetchSettings {
        timeout: Duration::from_secs(args.timeout),
        user_agent: args.user_agent.clone(),
        request_delay: Duration::from_millis(args.delay_ms),
        settle_delay: Duration::from_millis(args.settle_ms),
    })?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current fetches");
                cancel.cancel();
            }
        }
    });

    let driver = TraversalDriver::new(Arc::new(fetcher))
        .with_concurrency(args.concurrency)
        .with_cancellation(cancel.clone());

    let mut summaries = Vec::with_capacity(targets.len());
    for target in &targets {
        if cancel.is_cancelled() {
            warn!("Skipping '{}' after interrupt", target.name);
            continue;
        }

        let report = driver.crawl(target).await;
        let output = sink
            .write(&target.name, &report.records)
            .with_context(|| format!("could not save results of '{}'", target.name))?;
        summaries.push(TargetSummary::new(&report, output));
    }

    print_results(&summaries, args.json)?;

    let empty = summaries.iter().filter(|s| s.records == 0).count();
    if empty > 0 || cancel.is_cancelled() {
        Ok(1)
    } else {
        Ok(0)
    }
}

// Keeps the targets named on the command line; all of them when none are.
fn select_targets(configs: Vec<TargetConfig>, names: &[String]) -> Result<Vec<TargetConfig>> {
    if names.is_empty() {
        return Ok(configs);
    }

    let known: HashSet<&str> = configs.iter().map(|c| c.name.as_str()).collect();
    if let Some(unknown) = names.iter().find(|n| !known.contains(n.as_str())) {
        bail!("no target named '{}'", unknown);
    }

    Ok(configs
        .into_iter()
        .filter(|c| names.contains(&c.name))
        .collect())
}

/// One line of the validation summary.
#[derive(Debug, Serialize)]
struct ValidationSummary {
    name: String,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pagination: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// Handles the 'validate' subcommand
fn handle_validate(path: &Path, json: bool) -> Result<i32> {
    let configs = config::load_path(path)
        .with_context(|| format!("could not load {}", path.display()))?;

    let mut seen = HashSet::new();
    let summaries: Vec<ValidationSummary> = configs
        .into_iter()
        .map(|raw| {
            let name = raw.name.clone();
            if !seen.insert(name.clone()) {
                return ValidationSummary {
                    error: Some(config::ConfigError::DuplicateName(name.clone()).to_string()),
                    name,
                    valid: false,
                    steps: None,
                    pagination: None,
                };
            }
            match CrawlTarget::try_from(raw) {
                Ok(target) => ValidationSummary {
                    name,
                    valid: true,
                    steps: Some(target.steps.len()),
                    pagination: Some(target.pagination.kind()),
                    error: None,
                },
                Err(e) => ValidationSummary {
                    name,
                    valid: false,
                    steps: None,
                    pagination: None,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for summary in &summaries {
            match &summary.error {
                None => println!(
                    "✅ {:<30} {} step(s), pagination: {}",
                    summary.name,
                    summary.steps.unwrap_or_default(),
                    summary.pagination.unwrap_or("none")
                ),
                Some(error) => println!("❌ {:<30} {}", summary.name, error),
            }
        }
    }

    if summaries.iter().all(|s| s.valid) {
        Ok(0)
    } else {
        Ok(1)
    }
}

// Prints the run summary either as a table or JSON
fn print_results(summaries: &[TargetSummary], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summaries)?);
    } else {
        print_table(summaries);
    }
    Ok(())
}

fn print_table(summaries: &[TargetSummary]) {
    println!(
        "{:<30} {:>8} {:>8} {:>8} {:>8}  {}",
        "TARGET", "RECORDS", "PAGES", "FAILED", "SKIPPED", "OUTPUT"
    );
    println!("{}", "=".repeat(100));

    for s in summaries {
        let name = if s.name.len() > 27 {
            format!("{}...", &s.name[..27])
        } else {
            s.name.clone()
        };
        println!(
            "{:<30} {:>8} {:>8} {:>8} {:>8}  {}{}",
            name,
            s.records,
            s.pages_fetched,
            s.fetch_failures,
            s.skipped,
            s.output.display(),
            if s.cancelled { " (interrupted)" } else { "" }
        );
    }

    println!();

    let records: usize = summaries.iter().map(|s| s.records).sum();
    let empty = summaries.iter().filter(|s| s.records == 0).count();

    println!("📊 Summary:");
    println!("   🎯 Targets: {}", summaries.len());
    println!("   📄 Records: {}", records);
    println!("   ⚠️  Empty targets: {}", empty);
}
