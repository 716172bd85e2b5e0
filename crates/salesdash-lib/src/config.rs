use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::schema::{CandidateTable, Field, SchemaPolicy, SchemaProfile};
use crate::OutputFormat;

/// Manages config directory and config file operations
#[derive(Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager with a custom config directory (primarily for testing)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a new ConfigManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);

        Ok(Self { config_dir })
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get path to a specific config file
    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    /// Ensure the config directory exists
    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Generate default configuration template as a string with comments.
    /// All fields are commented out so defaults are used; uncomment to override.
    pub fn generate_default_config(&self) -> Result<String> {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;

        let comments = Self::collect_all_comments();
        Ok(Self::comment_all_fields(toml_str, comments))
    }

    /// Collect all field comments from the per-section constants, keyed by dotted path
    fn collect_all_comments() -> HashMap<String, String> {
        let mut comments = HashMap::new();

        for (field, comment) in APP_COMMENTS {
            comments.insert(field.to_string(), comment.to_string());
        }
        let sections: &[(&str, &[(&str, &str)])] = &[
            ("file_loading", FILE_LOADING_COMMENTS),
            ("schema", SCHEMA_COMMENTS),
            ("report", REPORT_COMMENTS),
            ("debug", DEBUG_COMMENTS),
        ];
        for (section, fields) in sections {
            for (field, comment) in *fields {
                comments.insert(format!("{}.{}", section, field), comment.to_string());
            }
        }

        comments
    }

    /// Comment out all fields in TOML and add comments.
    /// Also adds missing Option fields as commented-out `# field = ...`
    fn comment_all_fields(toml: String, comments: HashMap<String, String>) -> String {
        let mut result = String::new();
        result.push_str("# salesdash configuration file\n");
        result
            .push_str("# This file uses TOML format. See https://toml.io/ for syntax reference.\n");
        result.push('\n');

        let mut current_section = String::new();
        let mut seen_fields: HashSet<String> = HashSet::new();

        for line in toml.lines() {
            if let Some(section) = Self::extract_section_name(line) {
                current_section = section.clone();

                if let Some(header) = SECTION_HEADERS.iter().find(|(s, _)| s == &section) {
                    result.push_str(header.1);
                    result.push('\n');
                }

                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
                continue;
            }

            if let Some(field_path) = Self::extract_field_path_simple(line, &current_section) {
                seen_fields.insert(field_path.clone());

                if let Some(comment) = comments.get(&field_path) {
                    for comment_line in comment.lines() {
                        result.push_str("# ");
                        result.push_str(comment_line);
                        result.push('\n');
                    }
                }

                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
            } else {
                result.push_str(line);
                result.push('\n');
            }
        }

        Self::add_missing_option_fields(result, &comments, &seen_fields)
    }

    /// Add Option fields that were not serialized because they are None
    fn add_missing_option_fields(
        mut result: String,
        comments: &HashMap<String, String>,
        seen_fields: &HashSet<String>,
    ) -> String {
        // (path, example value shown in the commented-out line)
        let option_fields = [
            ("file_loading.delimiter", "44"),
            ("file_loading.has_header", "true"),
            ("file_loading.null_values", "[\"NA\", \"-\"]"),
            ("report.top_products", "10"),
            ("report.top_transactions", "15"),
            ("report.output", "\"text\""),
        ];

        let mut missing_by_section: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
        for (field_path, example) in &option_fields {
            if !seen_fields.contains(*field_path) && comments.contains_key(*field_path) {
                if let Some((section, _)) = field_path.split_once('.') {
                    missing_by_section
                        .entry(section)
                        .or_default()
                        .push((*field_path, *example));
                }
            }
        }

        for (section, fields) in &missing_by_section {
            let section_header = format!("[{}]", section);
            if let Some(section_pos) = result.find(&section_header) {
                let after_header_start = section_pos + section_header.len();
                let newline_pos = result[after_header_start..].find('\n').unwrap_or(0);
                let insert_pos = after_header_start + newline_pos + 1;

                let mut new_content = String::new();
                for (field_path, example) in fields {
                    if let Some(comment) = comments.get(*field_path) {
                        for comment_line in comment.lines() {
                            new_content.push_str("# ");
                            new_content.push_str(comment_line);
                            new_content.push('\n');
                        }
                    }
                    let field_name = field_path.rsplit('.').next().unwrap_or(*field_path);
                    new_content.push_str(&format!("# {} = {}\n", field_name, example));
                    new_content.push('\n');
                }

                result.insert_str(insert_pos, &new_content);
            }
        }

        result
    }

    /// Extract section name from TOML line like "[report]"
    fn extract_section_name(line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            Some(trimmed[1..trimmed.len() - 1].to_string())
        } else {
            None
        }
    }

    /// Extract the dotted field path from a `name = value` line
    fn extract_field_path_simple(line: &str, current_section: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
            return None;
        }

        let (field_name, _) = trimmed.split_once('=')?;
        let field_name = field_name.trim();
        if current_section.is_empty() {
            Some(field_name.to_string())
        } else {
            Some(format!("{}.{}", current_section, field_name))
        }
    }

    /// Write default configuration to config file
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path("config.toml");

        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        self.ensure_config_dir()?;

        let template = self.generate_default_config()?;
        std::fs::write(&config_path, template)?;

        Ok(config_path)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration format version (for future compatibility)
    pub version: String,
    pub file_loading: FileLoadingConfig,
    pub schema: SchemaConfig,
    /// Extra column-name synonyms per field, tried before the built-in names
    pub columns: BTreeMap<String, Vec<String>>,
    pub report: ReportConfig,
    pub debug: DebugConfig,
}

const APP_COMMENTS: &[(&str, &str)] = &[(
    "version",
    "Configuration format version (for future compatibility)",
)];

const SECTION_HEADERS: &[(&str, &str)] = &[
    (
        "file_loading",
        "# ============================================================================\n# File Loading Defaults\n# ============================================================================",
    ),
    (
        "schema",
        "# ============================================================================\n# Schema\n# ============================================================================",
    ),
    (
        "columns",
        "# ============================================================================\n# Column Names\n# ============================================================================\n# Extra column names per field, tried before the built-in ones. Fields:\n#   transaction_id, order_id, date, category, product, revenue, refund,\n#   return_flag, channel, device, support_ticket\n# Example:\n#   revenue = [\"Umsatz\", \"Gross_EUR\"]",
    ),
    (
        "report",
        "# ============================================================================\n# Report\n# ============================================================================",
    ),
    (
        "debug",
        "# ============================================================================\n# Debug Settings\n# ============================================================================",
    ),
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileLoadingConfig {
    pub delimiter: Option<u8>,
    pub has_header: Option<bool>,
    /// Cell values read as null in every column
    pub null_values: Option<Vec<String>>,
    /// Extra formats for the date column, tried before the built-in list
    pub date_formats: Vec<String>,
}

const FILE_LOADING_COMMENTS: &[(&str, &str)] = &[
    (
        "delimiter",
        "Default delimiter for CSV files (as ASCII value, e.g., 44 for comma, 59 for ';')",
    ),
    (
        "has_header",
        "Whether files have a header row\nnull = reader default (header expected)",
    ),
    (
        "null_values",
        "Cell values read as null in every column (in addition to empty cells)",
    ),
    (
        "date_formats",
        "Extra chrono formats tried in order before the built-in list\n(ISO dates and datetimes, dd.mm.yyyy, dd/mm/yyyy) when parsing the date column",
    ),
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SchemaConfig {
    pub profile: SchemaProfile,
}

const SCHEMA_COMMENTS: &[(&str, &str)] = &[(
    "profile",
    "\"full\" = transaction id, date, category, product, revenue, refund and return flag are required\n\"lenient\" = nothing is required; metrics whose columns are missing are reported as unavailable",
)];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReportConfig {
    pub top_products: Option<usize>,
    pub top_transactions: Option<usize>,
    /// "text" or "json"
    pub output: Option<String>,
}

const REPORT_COMMENTS: &[(&str, &str)] = &[
    (
        "top_products",
        "Rows in the top-products-by-refund and top-products-by-revenue tables (default 10)",
    ),
    (
        "top_transactions",
        "Rows in the largest-refund transactions table (default 15)",
    ),
    ("output", "Output format: \"text\" (default) or \"json\""),
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
}

const DEBUG_COMMENTS: &[(&str, &str)] = &[(
    "enabled",
    "Enable debug logging on stderr by default (RUST_LOG overrides the level)",
)];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            file_loading: FileLoadingConfig::default(),
            schema: SchemaConfig::default(),
            columns: BTreeMap::new(),
            report: ReportConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from all layers (default → user)
    pub fn load(app_name: &str) -> Result<Self> {
        let mut config = AppConfig::default();

        let config_path = ConfigManager::new(app_name)
            .ok()
            .map(|m| m.config_path("config.toml"));
        config.merge(Self::load_user_config(app_name)?);

        config.validate().map_err(|e| {
            let path_hint = config_path
                .as_ref()
                .map(|p| format!(" in {}", p.display()))
                .unwrap_or_default();
            eyre!("Invalid configuration{}: {}", path_hint, e)
        })?;

        Ok(config)
    }

    /// Load user configuration from ~/.config/salesdash/config.toml
    fn load_user_config(app_name: &str) -> Result<AppConfig> {
        let config_manager = ConfigManager::new(app_name)?;
        Self::load_from_path(&config_manager.config_path("config.toml"))
    }

    /// Parse a config file. A missing file yields the defaults.
    pub fn load_from_path(config_path: &Path) -> Result<AppConfig> {
        if !config_path.exists() {
            return Ok(AppConfig::default());
        }

        let content = std::fs::read_to_string(config_path).map_err(|e| {
            eyre!(
                "Failed to read config file at {}: {}",
                config_path.display(),
                e
            )
        })?;

        toml::from_str(&content).map_err(|e| {
            eyre!(
                "Failed to parse config file at {}: {}",
                config_path.display(),
                e
            )
        })
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != AppConfig::default().version {
            self.version = other.version;
        }

        self.file_loading.merge(other.file_loading);
        self.schema.merge(other.schema);
        for (field, names) in other.columns {
            self.columns.insert(field, names);
        }
        self.report.merge(other.report);
        self.debug.merge(other.debug);
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.1") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.1.x",
                self.version
            ));
        }

        for name in self.columns.keys() {
            if Field::from_name(name).is_none() {
                let known: Vec<&str> = Field::ALL.iter().map(|f| f.as_str()).collect();
                return Err(eyre!(
                    "Unknown field in [columns]: {}. Expected one of: {}",
                    name,
                    known.join(", ")
                ));
            }
        }

        if self.report.top_products == Some(0) {
            return Err(eyre!("report.top_products must be greater than 0 when set"));
        }
        if self.report.top_transactions == Some(0) {
            return Err(eyre!(
                "report.top_transactions must be greater than 0 when set"
            ));
        }
        if let Some(output) = &self.report.output {
            if OutputFormat::from_name(output).is_none() {
                return Err(eyre!(
                    "report.output must be \"text\" or \"json\", got {:?}",
                    output
                ));
            }
        }

        Ok(())
    }

    /// Built-in candidate names with the `[columns]` synonyms put first.
    pub fn candidate_table(&self) -> CandidateTable {
        self.columns
            .iter()
            .filter_map(|(name, synonyms)| Field::from_name(name).map(|f| (f, synonyms)))
            .fold(CandidateTable::default(), |table, (field, synonyms)| {
                table.with_synonyms(field, synonyms.iter().cloned())
            })
    }

    /// Required-field policy; `lenient` (the CLI flag) wins over the configured profile.
    pub fn schema_policy(&self, lenient: bool) -> SchemaPolicy {
        if lenient {
            SchemaPolicy::lenient()
        } else {
            SchemaPolicy::from_profile(self.schema.profile)
        }
    }

    pub fn output_format(&self) -> Option<OutputFormat> {
        self.report.output.as_deref().and_then(OutputFormat::from_name)
    }
}

impl FileLoadingConfig {
    pub fn merge(&mut self, other: Self) {
        if other.delimiter.is_some() {
            self.delimiter = other.delimiter;
        }
        if other.has_header.is_some() {
            self.has_header = other.has_header;
        }
        if other.null_values.is_some() {
            self.null_values = other.null_values;
        }
        if !other.date_formats.is_empty() {
            self.date_formats = other.date_formats;
        }
    }
}

impl SchemaConfig {
    pub fn merge(&mut self, other: Self) {
        if other.profile != SchemaProfile::default() {
            self.profile = other.profile;
        }
    }
}

impl ReportConfig {
    pub fn merge(&mut self, other: Self) {
        if other.top_products.is_some() {
            self.top_products = other.top_products;
        }
        if other.top_transactions.is_some() {
            self.top_transactions = other.top_transactions;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
    }
}

impl DebugConfig {
    pub fn merge(&mut self, other: Self) {
        let default = DebugConfig::default();
        if other.enabled != default.enabled {
            self.enabled = other.enabled;
        }
    }
}
