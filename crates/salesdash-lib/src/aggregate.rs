//! One family of read-only aggregations over a (filtered) table.
//!
//! Callers pass concrete column names, so every function here assumes its columns exist;
//! deciding that a metric is unavailable happens one level up, in `dashboard`.

use chrono::NaiveDate;
use color_eyre::Result;
use polars::prelude::*;
use serde::Serialize;

use crate::filter::date_from_epoch_days;
use crate::snapshot::MISSING_LABEL;

const VALUE: &str = "value";
const DAY: &str = "bucket_day";

/// One group of a grouped aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOrder {
    /// Largest value first; ties keep first-appearance order
    Descending,
    /// Ascending by group key
    Chronological,
}

/// Sums of one or more measures for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRow {
    pub day: NaiveDate,
    /// Same order as the measures asked for
    pub values: Vec<f64>,
}

/// Row counts on either side of a 0/1 flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlagSplit {
    pub flagged: usize,
    pub unflagged: usize,
}

fn sort_options(descending: bool) -> SortMultipleOptions {
    SortMultipleOptions::default()
        .with_order_descending(descending)
        .with_maintain_order(true)
        .with_nulls_last(true)
}

fn group_key(group: &str) -> Expr {
    col(group).cast(DataType::String).alias(group)
}

fn order_and_collect(grouped: LazyFrame, group: &str, order: GroupOrder) -> Result<Vec<GroupRow>> {
    let sorted = match order {
        GroupOrder::Descending => grouped.sort_by_exprs(vec![col(VALUE)], sort_options(true)),
        GroupOrder::Chronological => grouped.sort_by_exprs(vec![col(group)], sort_options(false)),
    };
    group_rows(&sorted.collect()?, group)
}

fn group_rows(df: &DataFrame, group: &str) -> Result<Vec<GroupRow>> {
    let keys = df.column(group)?.str()?;
    let values = df.column(VALUE)?.f64()?;
    Ok(keys
        .into_iter()
        .zip(values.into_iter())
        .map(|(key, value)| GroupRow {
            key: key.unwrap_or(MISSING_LABEL).to_string(),
            value: value.unwrap_or(0.0),
        })
        .collect())
}

/// Total of `measure` per distinct value of `group`.
pub fn sum_by(
    table: &DataFrame,
    group: &str,
    measure: &str,
    order: GroupOrder,
) -> Result<Vec<GroupRow>> {
    let grouped = table
        .clone()
        .lazy()
        .group_by_stable([group_key(group)])
        .agg([col(measure).cast(DataType::Float64).sum().alias(VALUE)]);
    order_and_collect(grouped, group, order)
}

/// Number of rows per distinct value of `group`, largest first.
pub fn count_by(table: &DataFrame, group: &str) -> Result<Vec<GroupRow>> {
    let grouped = table
        .clone()
        .lazy()
        .group_by_stable([group_key(group)])
        .agg([len().cast(DataType::Float64).alias(VALUE)]);
    order_and_collect(grouped, group, GroupOrder::Descending)
}

/// 1.0 for any non-zero flag value, 0.0 for zero; null stays null.
fn flagged(column: &str) -> Expr {
    col(column)
        .cast(DataType::Float64)
        .neq(lit(0.0))
        .cast(DataType::Float64)
}

/// Share of flagged rows per group as a percentage, highest rate first.
pub fn mean_by(table: &DataFrame, group: &str, flag: &str) -> Result<Vec<GroupRow>> {
    let grouped = table
        .clone()
        .lazy()
        .group_by_stable([group_key(group)])
        .agg([(flagged(flag).mean() * lit(100.0)).alias(VALUE)]);
    order_and_collect(grouped, group, GroupOrder::Descending)
}

/// Per-day sums of `measures`, ascending by day. Rows with a null date are left out.
pub fn time_bucket_sum(table: &DataFrame, date: &str, measures: &[&str]) -> Result<Vec<DailyRow>> {
    let aggs: Vec<Expr> = measures
        .iter()
        .map(|m| col(*m).cast(DataType::Float64).sum().alias(*m))
        .collect();
    let df = table
        .clone()
        .lazy()
        .filter(col(date).is_not_null())
        .group_by_stable([col(date).dt().date().cast(DataType::Int32).alias(DAY)])
        .agg(aggs)
        .sort_by_exprs(vec![col(DAY)], sort_options(false))
        .collect()?;

    let days = df.column(DAY)?.i32()?;
    let sums = measures
        .iter()
        .map(|m| df.column(m).and_then(|c| c.f64().cloned()))
        .collect::<PolarsResult<Vec<_>>>()?;

    let mut rows = Vec::with_capacity(df.height());
    for (i, d) in days.into_iter().enumerate() {
        let Some(day) = d.and_then(date_from_epoch_days) else {
            continue;
        };
        rows.push(DailyRow {
            day,
            values: sums.iter().map(|s| s.get(i).unwrap_or(0.0)).collect(),
        });
    }
    Ok(rows)
}

/// First `n` rows after a stable sort on `sort_col`.
pub fn top_n(table: &DataFrame, sort_col: &str, n: usize, descending: bool) -> Result<DataFrame> {
    Ok(table
        .clone()
        .lazy()
        .sort_by_exprs(vec![col(sort_col)], sort_options(descending))
        .limit(IdxSize::try_from(n).unwrap_or(IdxSize::MAX))
        .collect()?)
}

fn scalar(table: &DataFrame, expr: Expr) -> Result<Option<f64>> {
    let df = table
        .clone()
        .lazy()
        .select([expr.cast(DataType::Float64).alias(VALUE)])
        .collect()?;
    Ok(df.column(VALUE)?.f64()?.get(0))
}

/// Sum of a numeric column. 0.0 for an empty table.
pub fn total(table: &DataFrame, column: &str) -> Result<f64> {
    Ok(scalar(table, col(column).cast(DataType::Float64).sum())?.unwrap_or(0.0))
}

/// Number of distinct non-null values.
pub fn distinct_count(table: &DataFrame, column: &str) -> Result<usize> {
    Ok(table
        .column(column)?
        .as_materialized_series()
        .drop_nulls()
        .n_unique()?)
}

/// Share of rows with a non-zero flag, as a percentage. 0.0 for an empty table.
pub fn flag_rate(table: &DataFrame, column: &str) -> Result<f64> {
    if table.height() == 0 {
        return Ok(0.0);
    }
    Ok(scalar(table, flagged(column).mean() * lit(100.0))?.unwrap_or(0.0))
}

pub fn flag_split(table: &DataFrame, column: &str) -> Result<FlagSplit> {
    let count = scalar(table, flagged(column).sum())?.unwrap_or(0.0) as usize;
    Ok(FlagSplit {
        flagged: count,
        unflagged: table.height().saturating_sub(count),
    })
}
