//! CLI argument definitions for `ashare`.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `search` | Query the symbol catalog, optionally with live quotes |
//! | `quote` | Fetch live quotes for codes |
//! | `heatmap` | Limit-up category heatmap over trailing business days |
//! | `sources` | Quote feed health |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--catalog` | none | Stock list CSV (repeatable) |
//! | `--etf-sse` / `--etf-szse` | none | Exchange ETF listings |
//! | `--source` | `auto` | Feed selection (`auto`, `tencent`, `eastmoney`, `sina`) |
//! | `--timeout-ms` | `5000` | Per-request HTTP timeout |
//! | `--cache-ttl-secs` | `60` | Quote cache TTL |
//! | `--format` | `json` | Output format (`json`, `table`) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Warnings fail the run; no feed failover |
//!
//! # Examples
//!
//! ```bash
//! ashare --catalog stocks.csv search --prefix 60 --name 茅台 --quotes
//! ashare quote 600519 000001 --pretty
//! ashare heatmap --days 10 --threshold 3 --format table
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// A-share symbol lookup, live quotes and limit-up heatmap.
#[derive(Debug, Parser)]
#[command(
    name = "ashare",
    author,
    version,
    about = "A-share symbol lookup, live quotes and limit-up heatmap"
)]
pub struct Cli {
    /// Stock list CSV with code/name columns. May be given more than once.
    #[arg(long = "catalog", global = true, value_name = "PATH")]
    pub catalogs: Vec<PathBuf>,

    /// Shanghai ETF listing (证券代码/证券简称 columns).
    #[arg(long, global = true, value_name = "PATH")]
    pub etf_sse: Option<PathBuf>,

    /// Shenzhen ETF listing (证券代码/证券简称 columns).
    #[arg(long, global = true, value_name = "PATH")]
    pub etf_szse: Option<PathBuf>,

    /// Quote feed selection: auto, tencent, eastmoney or sina.
    #[arg(long, global = true, default_value = "auto")]
    pub source: String,

    /// Per-request HTTP timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Seconds a fetched quote is served as fresh.
    #[arg(long, global = true)]
    pub cache_ttl_secs: Option<u64>,

    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings and errors as failures (exit code 5) and disable
    /// failover to other feeds.
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain table for terminal display.
    Table,
    /// Single JSON envelope.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search the catalog by code prefix/suffix and fuzzy name.
    ///
    ///   ashare --catalog stocks.csv search --prefix 60 --suffix 88
    ///   ashare --catalog stocks.csv search --name 茅台 --quotes --export out.csv
    Search(SearchArgs),

    /// Fetch live quotes for one or more six-digit codes.
    ///
    ///   ashare quote 600519 000001
    Quote(QuoteArgs),

    /// Limit-up category heatmap over a trailing business-day window.
    ///
    ///   ashare heatmap --days 20 --threshold 5
    Heatmap(HeatmapArgs),

    /// Show quote feeds and their health.
    Sources,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Code prefix, at most two characters.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Code suffix, at most two characters.
    #[arg(long)]
    pub suffix: Option<String>,

    /// Name fragment; every character must appear in the name, in any order.
    #[arg(long)]
    pub name: Option<String>,

    /// Overlay live quotes on the matches.
    #[arg(long, default_value_t = false)]
    pub quotes: bool,

    /// Also write the matches to a UTF-8 (BOM) CSV file.
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct QuoteArgs {
    /// Six-digit codes (e.g. 600519 000001).
    #[arg(required = true, num_args = 1..)]
    pub codes: Vec<String>,
}

#[derive(Debug, Args)]
pub struct HeatmapArgs {
    /// Business days in the window.
    #[arg(long)]
    pub days: Option<usize>,

    /// Extra calendar days scanned to fill the window across weekends.
    #[arg(long)]
    pub extra_lookback: Option<usize>,

    /// Categories with a window total at or below this are dropped.
    #[arg(long)]
    pub threshold: Option<u32>,

    /// Last day of the window (YYYY-MM-DD). Defaults to today in Shanghai.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub end: Option<String>,

    /// Maximum roster fetches in flight.
    #[arg(long)]
    pub concurrency: Option<usize>,
}
