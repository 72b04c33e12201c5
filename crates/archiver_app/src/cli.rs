//! Command-line interface of the `archiver` binary.

use std::path::PathBuf;

use clap::Parser;

/// Archives a list of articles into an offline, self-contained corpus.
///
/// Flags given here override the configuration file.
///
/// ```sh
/// archiver --input urls.txt --config config/medium.ron --output archive
/// archiver --links-only --output archive
/// ```
#[derive(Parser, Debug)]
#[command(name = "archiver", author, version, about)]
pub struct Cli {
    /// File with one URL or local path per line (`#` starts a comment)
    #[arg(short, long, required_unless_present = "links_only")]
    pub input: Option<PathBuf>,

    /// RON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output root of the corpus
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Posts materialized at the same time
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Seconds between two requests
    #[arg(long)]
    pub delay: Option<f64>,

    /// Only rewrite links between posts already on disk
    #[arg(long)]
    pub links_only: bool,

    /// Also write the log to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
