//! Shared CLI definitions for salesdash.
//!
//! Used by the main application and by the build script (manpage).

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// How the report is written to stdout
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned plain text, one block per KPI group and panel
    Text,
    /// Pretty-printed JSON document (includes the load report)
    Json,
}

impl OutputFormat {
    /// Parse the config spelling ("text" / "json"), case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse a calendar date given on the command line (YYYY-MM-DD).
fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("expected a date like 2024-01-31: {}", e))
}

/// Parse a row count that must be at least 1.
fn parse_positive(s: &str) -> Result<usize, String> {
    match s.trim().parse::<usize>() {
        Ok(0) => Err("must be greater than 0".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("expected a positive whole number: {}", e)),
    }
}

/// Command-line arguments for salesdash
#[derive(Clone, Parser, Debug)]
#[command(
    name = "salesdash",
    version,
    about = "Revenue, refund and return-rate report for e-commerce transaction CSVs",
    long_about = "Loads a CSV of e-commerce transactions, narrows it by product category and \
calendar-date range, and prints the dashboard KPIs (revenue, refunds, net revenue, return rate, \
transactions) together with the chart-ready tables: daily trend, per-category totals and rates, \
and the top refunded transactions and products."
)]
pub struct Args {
    /// Path to the transactions CSV (not required with --generate-config)
    #[arg(required_unless_present = "generate_config", value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Keep only this product category. Repeat for several categories. Default: all categories
    #[arg(long = "category", value_name = "NAME")]
    pub categories: Vec<String>,

    /// First calendar day to include (inclusive). Default: earliest date in the file
    #[arg(long = "from", value_name = "YYYY-MM-DD", value_parser = parse_date)]
    pub from: Option<NaiveDate>,

    /// Last calendar day to include (inclusive). Default: latest date in the file
    #[arg(long = "to", value_name = "YYYY-MM-DD", value_parser = parse_date)]
    pub to: Option<NaiveDate>,

    /// Accept files that lack some of the usual columns; dependent metrics are reported as unavailable
    #[arg(long = "lenient", action)]
    pub lenient: bool,

    /// Output format (text, json). Overrides config [report] output
    #[arg(long = "output", value_enum)]
    pub output: Option<OutputFormat>,

    /// Number of products listed in the top-products tables (default: 10)
    #[arg(long = "top-products", value_name = "N", value_parser = parse_positive)]
    pub top_products: Option<usize>,

    /// Number of transactions listed in the top-refunds table (default: 15)
    #[arg(long = "top-transactions", value_name = "N", value_parser = parse_positive)]
    pub top_transactions: Option<usize>,

    /// Specify the delimiter to use when reading the file (as ASCII value, e.g. 59 for ';')
    #[arg(long = "delimiter")]
    pub delimiter: Option<u8>,

    /// Specify that the file has no header
    #[arg(long = "no-header")]
    pub no_header: Option<bool>,

    /// Treat this value as null when reading the CSV. Use once per value. Example: --null-value NA --null-value "-"
    #[arg(long = "null-value", value_name = "VAL")]
    pub null_value: Vec<String>,

    /// Extra chrono format tried first when parsing the date column (repeatable). Example: --date-format "%d.%m.%Y"
    #[arg(long = "date-format", value_name = "FMT")]
    pub date_formats: Vec<String>,

    /// Enable debug logging on stderr
    #[arg(long = "debug", action)]
    pub debug: bool,

    /// Generate default configuration file at ~/.config/salesdash/config.toml
    #[arg(long = "generate-config", action)]
    pub generate_config: bool,

    /// Force overwrite existing config file when using --generate-config
    #[arg(long = "force", requires = "generate_config", action)]
    pub force: bool,
}
