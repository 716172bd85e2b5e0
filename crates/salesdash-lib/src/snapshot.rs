//! Loading a CSV into an immutable, type-coerced snapshot.
//!
//! Every column is read as text and coerced per field role afterwards, so a dirty cell
//! never aborts a load. How many cells had to be coerced is recorded in the [`LoadReport`].

use color_eyre::Result;
use polars::io::csv::read::NullValues;
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::SessionError;
use crate::filter::{date_from_epoch_days, DateInterval};
use crate::schema::{CandidateTable, Field, FieldKind, SchemaMapping, SchemaPolicy};
use crate::LoadOptions;

/// Label given to dimension cells that are empty or null, so they stay visible as a group.
pub const MISSING_LABEL: &str = "(missing)";

const WHITESPACE: &str = " \t\n\r";

/// Coercion statistics for one resolved field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldReport {
    pub field: Field,
    pub column: String,
    /// Amounts and flags: cells replaced by 0. Dates: non-empty cells no format parsed.
    /// Dimensions: cells replaced by the missing label.
    pub coerced: usize,
    /// Amounts only: cells below zero, kept as they are
    pub negative: usize,
}

/// What happened while loading: row count and per-field coercions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub rows: usize,
    pub fields: Vec<FieldReport>,
}

impl LoadReport {
    pub fn coerced(&self, field: Field) -> usize {
        self.fields
            .iter()
            .find(|r| r.field == field)
            .map(|r| r.coerced)
            .unwrap_or(0)
    }

    pub fn total_coerced(&self) -> usize {
        self.fields.iter().map(|r| r.coerced).sum()
    }

    pub fn negative(&self, field: Field) -> usize {
        self.fields
            .iter()
            .find(|r| r.field == field)
            .map(|r| r.negative)
            .unwrap_or(0)
    }

    pub fn total_negative(&self) -> usize {
        self.fields.iter().map(|r| r.negative).sum()
    }
}

/// The loaded table plus everything derived from it once per load.
#[derive(Debug, Clone)]
pub struct Snapshot {
    frame: DataFrame,
    schema: SchemaMapping,
    categories: Vec<String>,
    date_span: Option<DateInterval>,
    report: LoadReport,
    source: Option<PathBuf>,
}

impl Snapshot {
    /// Read `path`, resolve its columns and coerce them. Fails on a missing or empty file
    /// and when `policy` finds required fields absent.
    pub fn load(
        path: &Path,
        options: &LoadOptions,
        candidates: &CandidateTable,
        policy: &SchemaPolicy,
    ) -> Result<Self> {
        if !path.exists() {
            return Err(SessionError::MissingFile(path.to_path_buf()).into());
        }
        if std::fs::metadata(path)?.len() == 0 {
            return Err(SessionError::EmptyFile(path.to_path_buf()).into());
        }

        let lf = Self::read_csv(path, options)?;
        let mut snapshot = Self::from_lazy(lf, options, candidates, policy)?;
        if snapshot.height() == 0 {
            return Err(SessionError::EmptyFile(path.to_path_buf()).into());
        }
        snapshot.source = Some(path.to_path_buf());

        info!(
            path = %path.display(),
            rows = snapshot.height(),
            columns = snapshot.frame.width(),
            coerced = snapshot.report.total_coerced(),
            "loaded snapshot"
        );
        Ok(snapshot)
    }

    /// Build a snapshot from an in-memory frame. Columns of resolved fields may be text or
    /// already typed; they go through the same coercion as a file load.
    pub fn from_frame(
        frame: DataFrame,
        options: &LoadOptions,
        candidates: &CandidateTable,
        policy: &SchemaPolicy,
    ) -> Result<Self> {
        Self::from_lazy(frame.lazy(), options, candidates, policy)
    }

    fn read_csv(path: &Path, options: &LoadOptions) -> Result<LazyFrame> {
        let pl_path = PlRefPath::try_from_path(path)?;
        let mut reader = LazyCsvReader::new(pl_path)
            .with_infer_schema_length(Some(0))
            .with_try_parse_dates(false);
        if let Some(delimiter) = options.delimiter {
            reader = reader.with_separator(delimiter);
        }
        if let Some(has_header) = options.has_header {
            reader = reader.with_has_header(has_header);
        }
        reader = match Self::build_null_values(options) {
            Some(n) => reader.map_parse_options(|opts| opts.with_null_values(Some(n.clone()))),
            None => reader,
        };
        Self::trim_column_names(reader.finish()?)
    }

    fn build_null_values(options: &LoadOptions) -> Option<NullValues> {
        let values: Vec<PlSmallStr> = options
            .null_values
            .as_ref()?
            .iter()
            .map(|s| PlSmallStr::from(s.as_str()))
            .collect();
        match values.len() {
            0 => None,
            1 => Some(NullValues::AllColumnsSingle(values[0].clone())),
            _ => Some(NullValues::AllColumns(values)),
        }
    }

    fn trim_column_names(mut lf: LazyFrame) -> Result<LazyFrame> {
        let schema = lf.collect_schema()?;
        let names: Vec<String> = schema.iter_names().map(|s| s.to_string()).collect();
        let trimmed: Vec<String> = names.iter().map(|s| s.trim().to_string()).collect();
        if names == trimmed {
            return Ok(lf);
        }
        Ok(lf.rename(
            names.iter().map(|s| s.as_str()),
            trimmed.iter().map(|s| s.as_str()),
            false,
        ))
    }

    fn from_lazy(
        mut lf: LazyFrame,
        options: &LoadOptions,
        candidates: &CandidateTable,
        policy: &SchemaPolicy,
    ) -> Result<Self> {
        let columns: Vec<String> = lf
            .collect_schema()?
            .iter_names()
            .map(|s| s.to_string())
            .collect();
        let schema = candidates.resolve(&columns);
        for (field, column) in schema.resolved() {
            debug!(field = %field, column, "resolved field");
        }
        policy.check(&schema, candidates)?;

        let coerced: Vec<(Field, String)> = schema
            .resolved()
            .filter(|(field, _)| field.kind() != FieldKind::Identifier)
            .map(|(field, column)| (field, column.to_string()))
            .collect();

        // Trimmed text with blanks as null: the baseline for counting what parsing loses.
        let text = lf
            .with_columns(
                coerced
                    .iter()
                    .map(|(_, c)| trimmed_text(c))
                    .collect::<Vec<_>>(),
            )
            .collect()?;
        let parsed = text
            .clone()
            .lazy()
            .with_columns(
                coerced
                    .iter()
                    .map(|(field, c)| parse_expr(field.kind(), c, &options.date_formats))
                    .collect::<Vec<_>>(),
            )
            .collect()?;

        let mut report = LoadReport {
            rows: parsed.height(),
            fields: Vec::with_capacity(coerced.len()),
        };
        for (field, column) in &coerced {
            let after = parsed.column(column.as_str())?.null_count();
            let count = match field.kind() {
                FieldKind::Timestamp => {
                    after.saturating_sub(text.column(column.as_str())?.null_count())
                }
                _ => after,
            };
            if count > 0 {
                debug!(field = %field, column = %column, coerced = count, "coerced cells");
            }
            let negative = match field.kind() {
                FieldKind::Amount => parsed
                    .column(column.as_str())?
                    .f64()?
                    .into_iter()
                    .flatten()
                    .filter(|v| *v < 0.0)
                    .count(),
                _ => 0,
            };
            if negative > 0 {
                debug!(field = %field, column = %column, negative, "negative amounts");
            }
            report.fields.push(FieldReport {
                field: *field,
                column: column.clone(),
                coerced: count,
                negative,
            });
        }

        let frame = parsed
            .lazy()
            .with_columns(
                coerced
                    .iter()
                    .filter_map(|(field, c)| fill_expr(field.kind(), c))
                    .collect::<Vec<_>>(),
            )
            .collect()?;

        let categories = match schema.column(Field::Category) {
            Some(c) => distinct_labels(&frame, c)?,
            None => Vec::new(),
        };
        let date_span = match schema.column(Field::Date) {
            Some(c) => observed_span(&frame, c)?,
            None => None,
        };

        Ok(Self {
            frame,
            schema,
            categories,
            date_span,
            report,
            source: None,
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn schema(&self) -> &SchemaMapping {
        &self.schema
    }

    /// Concrete column name for `field`, if it resolved.
    pub fn column(&self, field: Field) -> Option<&str> {
        self.schema.column(field)
    }

    pub fn has(&self, field: Field) -> bool {
        self.schema.is_resolved(field)
    }

    /// Distinct category labels, sorted.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// First and last calendar day with a parsed date. None if no date parsed.
    pub fn date_span(&self) -> Option<DateInterval> {
        self.date_span
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }
}

fn trimmed_text(name: &str) -> Expr {
    let text = col(name)
        .cast(DataType::String)
        .str()
        .strip_chars(lit(PlSmallStr::from_static(WHITESPACE)));
    when(text.clone().eq(lit(PlSmallStr::from_static(""))))
        .then(Null {}.lit())
        .otherwise(text)
        .alias(name)
}

/// Typed value or null where the cell could not be read.
fn parse_expr(kind: FieldKind, name: &str, date_formats: &[String]) -> Expr {
    match kind {
        FieldKind::Amount => col(name).cast(DataType::Float64).alias(name),
        FieldKind::Flag => flag_expr(name).alias(name),
        FieldKind::Timestamp => timestamp_expr(name, date_formats).alias(name),
        FieldKind::Dimension | FieldKind::Identifier => col(name),
    }
}

fn fill_expr(kind: FieldKind, name: &str) -> Option<Expr> {
    match kind {
        FieldKind::Amount => Some(col(name).fill_null(lit(0.0)).alias(name)),
        FieldKind::Flag => Some(col(name).fill_null(lit(0i32)).alias(name)),
        FieldKind::Dimension => Some(col(name).fill_null(lit(MISSING_LABEL)).alias(name)),
        FieldKind::Timestamp | FieldKind::Identifier => None,
    }
}

/// true/yes → 1, false/no → 0, numbers → 1 unless zero, anything else null.
fn flag_expr(name: &str) -> Expr {
    let text = col(name).str().to_lowercase();
    let number = col(name).cast(DataType::Float64);
    when(
        text.clone()
            .eq(lit("true"))
            .or(text.clone().eq(lit("yes"))),
    )
    .then(lit(1i32))
    .when(text.clone().eq(lit("false")).or(text.eq(lit("no"))))
    .then(lit(0i32))
    .when(number.clone().is_not_null())
    .then(
        when(number.neq(lit(0.0)))
            .then(lit(1i32))
            .otherwise(lit(0i32)),
    )
    .otherwise(Null {}.lit().cast(DataType::Int32))
}

fn has_time_component(format: &str) -> bool {
    ["%H", "%I", "%M", "%S", "%T", "%R", "%s"]
        .iter()
        .any(|token| format.contains(token))
}

/// First format that parses a cell wins; cells no format parses become null.
fn timestamp_expr(name: &str, formats: &[String]) -> Expr {
    let datetime = DataType::Datetime(TimeUnit::Microseconds, None);
    let attempts: Vec<Expr> = formats
        .iter()
        .map(|format| {
            let opts = StrptimeOptions {
                format: Some(PlSmallStr::from(format.as_str())),
                strict: false,
                exact: true,
                cache: true,
            };
            if has_time_component(format) {
                col(name).str().to_datetime(
                    Some(TimeUnit::Microseconds),
                    None,
                    opts,
                    lit("raise"),
                )
            } else {
                col(name).str().to_date(opts).cast(datetime.clone())
            }
        })
        .collect();
    if attempts.is_empty() {
        Null {}.lit().cast(datetime)
    } else {
        coalesce(&attempts)
    }
}

fn distinct_labels(frame: &DataFrame, name: &str) -> Result<Vec<String>> {
    let labels: BTreeSet<String> = frame
        .column(name)?
        .str()?
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect();
    Ok(labels.into_iter().collect())
}

fn observed_span(frame: &DataFrame, name: &str) -> Result<Option<DateInterval>> {
    let day = col(name).dt().date().cast(DataType::Int32);
    let bounds = frame
        .clone()
        .lazy()
        .select([
            day.clone().min().alias("first"),
            day.max().alias("last"),
        ])
        .collect()?;
    let first = bounds.column("first")?.i32()?.get(0);
    let last = bounds.column("last")?.i32()?.get(0);
    Ok(match (
        first.and_then(date_from_epoch_days),
        last.and_then(date_from_epoch_days),
    ) {
        (Some(a), Some(b)) => Some(DateInterval::new(a, b)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{day, scenario_snapshot};
    use std::io::Write;

    fn load_text(
        frame: DataFrame,
        candidates: &CandidateTable,
        policy: &SchemaPolicy,
    ) -> Snapshot {
        Snapshot::from_frame(frame, &LoadOptions::default(), candidates, policy).unwrap()
    }

    #[test]
    fn scenario_snapshot_is_typed() {
        let snapshot = scenario_snapshot();
        let frame = snapshot.frame();
        assert_eq!(
            frame.column("Revenue_EUR").unwrap().dtype(),
            &DataType::Float64
        );
        assert_eq!(frame.column("Has_Return").unwrap().dtype(), &DataType::Int32);
        assert_eq!(
            frame.column("Date").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Microseconds, None)
        );
        assert_eq!(snapshot.categories(), &["A".to_string(), "B".to_string()]);
        assert_eq!(
            snapshot.date_span(),
            Some(DateInterval::new(day(2024, 1, 1), day(2024, 1, 2)))
        );
        assert_eq!(snapshot.report().total_coerced(), 0);
    }

    #[test]
    fn dirty_cells_are_coerced_and_counted() {
        let frame = df!(
            "Date" => ["2024-01-01", "yesterday", "", "05.01.2024 10:30"],
            "Product_Category" => ["A", "", "B", " B "],
            "Revenue_EUR" => ["10.5", "n/a", "", " 4 "],
            "Has_Return" => ["1", "yes", "maybe", "0"],
        )
        .unwrap();
        let snapshot = load_text(frame, &CandidateTable::default(), &SchemaPolicy::lenient());

        let revenue: Vec<f64> = snapshot
            .frame()
            .column("Revenue_EUR")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(revenue, vec![10.5, 0.0, 0.0, 4.0]);

        let flags: Vec<i32> = snapshot
            .frame()
            .column("Has_Return")
            .unwrap()
            .i32()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(flags, vec![1, 1, 0, 0]);

        assert_eq!(snapshot.frame().column("Date").unwrap().null_count(), 2);
        assert_eq!(
            snapshot.date_span(),
            Some(DateInterval::new(day(2024, 1, 1), day(2024, 1, 5)))
        );

        let report = snapshot.report();
        assert_eq!(report.rows, 4);
        assert_eq!(report.coerced(Field::Revenue), 2);
        assert_eq!(report.coerced(Field::ReturnFlag), 1);
        // the empty date cell was never a date; only "yesterday" failed to parse
        assert_eq!(report.coerced(Field::Date), 1);
        assert_eq!(report.coerced(Field::Category), 1);
        assert_eq!(
            snapshot.categories(),
            &["(missing)".to_string(), "A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn negative_amounts_are_kept_and_counted() {
        let frame = df!(
            "Revenue_EUR" => ["10", "-4.5", "x"],
            "Refund_Amount" => ["-1", "-2", "0"],
            "Has_Return" => ["-1", "0", "1"],
        )
        .unwrap();
        let snapshot = load_text(frame, &CandidateTable::default(), &SchemaPolicy::lenient());

        let revenue: Vec<f64> = snapshot
            .frame()
            .column("Revenue_EUR")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(revenue, vec![10.0, -4.5, 0.0]);

        let report = snapshot.report();
        assert_eq!(report.negative(Field::Revenue), 1);
        assert_eq!(report.negative(Field::Refund), 2);
        assert_eq!(report.negative(Field::ReturnFlag), 0);
        assert_eq!(report.total_negative(), 3);
        assert_eq!(report.coerced(Field::Revenue), 1);
    }

    #[test]
    fn flag_words_and_numbers() {
        let frame = df!(
            "Has_Return" => ["TRUE", "No", "2", "0.0", "false", "-1"],
        )
        .unwrap();
        let snapshot = load_text(frame, &CandidateTable::default(), &SchemaPolicy::lenient());
        let flags: Vec<i32> = snapshot
            .frame()
            .column("Has_Return")
            .unwrap()
            .i32()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(flags, vec![1, 0, 1, 0, 0, 1]);
        assert_eq!(snapshot.report().coerced(Field::ReturnFlag), 0);
    }

    #[test]
    fn unresolved_and_unknown_columns_pass_through() {
        let frame = df!(
            "Transaction_ID" => [" 7 ", "8"],
            "Notes" => ["a", ""],
        )
        .unwrap();
        let snapshot = load_text(frame, &CandidateTable::default(), &SchemaPolicy::lenient());
        let ids = snapshot.frame().column("Transaction_ID").unwrap();
        assert_eq!(ids.str().unwrap().get(0), Some(" 7 "));
        assert_eq!(snapshot.frame().column("Notes").unwrap().str().unwrap().get(1), Some(""));
        assert!(snapshot.categories().is_empty());
        assert_eq!(snapshot.date_span(), None);
        assert!(snapshot.report().fields.is_empty());
    }

    #[test]
    fn full_policy_rejects_partial_schema() {
        let frame = df!("Date" => ["2024-01-01"]).unwrap();
        let err = Snapshot::from_frame(
            frame,
            &LoadOptions::default(),
            &CandidateTable::default(),
            &SchemaPolicy::full(),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::MissingFields(_))
        ));
    }

    #[test]
    fn load_trims_header_names_and_applies_null_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, " Date ;Product_Category;Revenue_EUR").unwrap();
        writeln!(file, "2024-02-01;A;NA").unwrap();
        writeln!(file, "2024-02-03;NA;12").unwrap();
        file.flush().unwrap();

        let options = LoadOptions::new()
            .with_delimiter(b';')
            .with_null_values(vec!["NA".to_string()]);
        let snapshot = Snapshot::load(
            file.path(),
            &options,
            &CandidateTable::default(),
            &SchemaPolicy::lenient(),
        )
        .unwrap();
        assert_eq!(snapshot.column(Field::Date), Some("Date"));
        assert_eq!(snapshot.source(), Some(file.path()));
        assert_eq!(snapshot.report().coerced(Field::Revenue), 1);
        assert_eq!(
            snapshot.categories(),
            &["(missing)".to_string(), "A".to_string()]
        );
    }

    #[test]
    fn missing_and_empty_files_are_session_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        let err = Snapshot::load(
            &missing,
            &LoadOptions::default(),
            &CandidateTable::default(),
            &SchemaPolicy::lenient(),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::MissingFile(_))
        ));

        let empty = dir.path().join("empty.csv");
        std::fs::write(&empty, "").unwrap();
        let err = Snapshot::load(
            &empty,
            &LoadOptions::default(),
            &CandidateTable::default(),
            &SchemaPolicy::lenient(),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::EmptyFile(_))
        ));

        let header_only = dir.path().join("header.csv");
        std::fs::write(&header_only, "Date,Revenue_EUR\n").unwrap();
        let err = Snapshot::load(
            &header_only,
            &LoadOptions::default(),
            &CandidateTable::default(),
            &SchemaPolicy::lenient(),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::EmptyFile(_))
        ));
    }

    #[test]
    fn time_component_detection() {
        assert!(has_time_component("%Y-%m-%d %H:%M"));
        assert!(!has_time_component("%d/%m/%Y"));
    }
}
