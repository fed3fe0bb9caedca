// src/cli.rs
// =============================================================================
// Command-line interface, defined with clap's derive API.
//
//   step-crawler run <config> [--target NAME]... [--output-dir DIR] [--json]
//   step-crawler validate <config>
//
// <config> is a .toml/.json definition file or a directory of them.
// =============================================================================

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use step_crawler::crawl::DEFAULT_CONCURRENCY;
use step_crawler::output::DEFAULT_OUTPUT_DIR;

#[derive(Parser, Debug)]
#[command(
    name = "step-crawler",
    version,
    about = "Crawl paginated sites and extract structured records from declarative definitions",
    long_about = "step-crawler reads crawl definitions (start URL, pagination strategy, and a chain \
                  of find/follow steps) and writes the extracted records of every target to \
                  <output-dir>/<name>_out.json."
)]
pub struct Cli {
    /// Log every traversal decision
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl every target in a definition file or directory
    ///
    /// Example: step-crawler run configs/ --target catalog --output-dir out
    Run(RunArgs),

    /// Load and check definitions without fetching anything
    ///
    /// Example: step-crawler validate configs/catalog.toml
    Validate {
        /// Definition file (.toml or .json) or a directory of them
        config: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Definition file (.toml or .json) or a directory of them
    pub config: PathBuf,

    /// Only crawl targets with this name (repeatable)
    #[arg(short, long = "target", value_name = "NAME")]
    pub targets: Vec<String>,

    /// Directory the <name>_out.json files are written to
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Remove earlier output of the selected targets before crawling
    #[arg(long)]
    pub clean: bool,

    /// Fetches in flight per target
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Pause before every request, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,

    /// Wait applied to pages of targets marked `render`, in milliseconds
    #[arg(long, default_value_t = 8000)]
    pub settle_ms: u64,

    /// Custom User-Agent header
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Print the run summary as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["step-crawler", "run", "targets.toml"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config, PathBuf::from("targets.toml"));
        assert_eq!(args.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(args.concurrency, DEFAULT_CONCURRENCY);
        assert!(args.targets.is_empty());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_repeatable_target_filter() {
        let cli = Cli::try_parse_from([
            "step-crawler",
            "run",
            "configs",
            "--target",
            "a",
            "-t",
            "b",
            "--verbose",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.targets, vec!["a", "b"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_validate_requires_config() {
        assert!(Cli::try_parse_from(["step-crawler", "validate"]).is_err());
    }
}
