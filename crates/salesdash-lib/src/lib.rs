//! Filter-and-aggregate query core for e-commerce transaction dashboards.
//!
//! A CSV is loaded once into an immutable [`Snapshot`]; logical fields are resolved to the
//! file's column names by the [`schema`] module; every filter change re-runs
//! [`filter::apply`] and the [`aggregate`] functions against that snapshot.

pub mod aggregate;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod error_display;
pub mod filter;
pub mod logging;
pub mod report;
pub mod schema;
pub mod session;
pub mod snapshot;

pub use config::{AppConfig, ConfigManager};
pub use dashboard::{build_report, DashboardReport, Kpis, Panel, ReportSettings};
pub use error::SessionError;
pub use filter::{apply, DateInterval, FilterAvailability, FilterSelection, FilteredView};
pub use schema::{CandidateTable, Field, SchemaMapping, SchemaPolicy, SchemaProfile};
pub use session::Session;
pub use snapshot::{LoadReport, Snapshot};

/// Re-export CLI definitions so the binary and tests need a single import path
pub use salesdash_cli::{Args, OutputFormat};

/// Application name used for the config directory and other app-specific paths
pub const APP_NAME: &str = "salesdash";

/// Chrono formats tried, in order, when the date column is read as text.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d",
    "%d.%m.%Y %H:%M",
    "%d.%m.%Y",
    "%d/%m/%Y",
];

/// How the source CSV is read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadOptions {
    pub delimiter: Option<u8>,
    pub has_header: Option<bool>,
    /// Cell values read as null in every column. None = reader default (empty cells only).
    pub null_values: Option<Vec<String>>,
    /// Formats for the date column, tried in order; the first that parses a cell wins.
    pub date_formats: Vec<String>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self {
            delimiter: None,
            has_header: None,
            null_values: None,
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = Some(has_header);
        self
    }

    pub fn with_null_values(mut self, values: Vec<String>) -> Self {
        self.null_values = if values.is_empty() {
            None
        } else {
            Some(values)
        };
        self
    }

    pub fn with_date_formats(mut self, formats: Vec<String>) -> Self {
        self.date_formats = formats;
        self
    }

    /// Create LoadOptions from CLI args and config, with CLI args taking precedence
    pub fn from_args_and_config(args: &Args, config: &AppConfig) -> Self {
        let mut opts = LoadOptions::new();

        opts.delimiter = args.delimiter.or(config.file_loading.delimiter);

        // Handle has_header: CLI no_header flag overrides config
        opts.has_header = if let Some(no_header) = args.no_header {
            Some(!no_header)
        } else {
            config.file_loading.has_header
        };

        // Null values: config list with CLI values appended
        let config_nulls = config.file_loading.null_values.as_deref().unwrap_or(&[]);
        let nulls: Vec<String> = config_nulls
            .iter()
            .chain(args.null_value.iter())
            .cloned()
            .collect();
        opts.null_values = if nulls.is_empty() { None } else { Some(nulls) };

        // Date formats: CLI first, then config, then the built-in list; first occurrence wins
        let mut formats: Vec<String> = Vec::new();
        for fmt in args
            .date_formats
            .iter()
            .map(String::as_str)
            .chain(config.file_loading.date_formats.iter().map(String::as_str))
            .chain(DEFAULT_DATE_FORMATS.iter().copied())
        {
            if !formats.iter().any(|f| f == fmt) {
                formats.push(fmt.to_string());
            }
        }
        opts.date_formats = formats;

        opts
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&Args> for LoadOptions {
    fn from(args: &Args) -> Self {
        // Use default config if creating from args alone
        let config = AppConfig::default();
        Self::from_args_and_config(args, &config)
    }
}
