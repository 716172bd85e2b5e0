//! Filter selection and the filter engine that narrows a snapshot into a filtered view.

use chrono::NaiveDate;
use color_eyre::Result;
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use crate::schema::Field;
use crate::snapshot::Snapshot;

/// Days from 0001-01-01 (CE day 1) to 1970-01-01, the epoch of Polars' Date type.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

/// Calendar day → days since the Unix epoch (physical value of a Polars Date).
pub(crate) fn epoch_days(day: NaiveDate) -> i32 {
    use chrono::Datelike;
    day.num_days_from_ce() - UNIX_EPOCH_CE_DAYS
}

/// Days since the Unix epoch → calendar day. None when out of chrono's range.
pub(crate) fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(UNIX_EPOCH_CE_DAYS.checked_add(days)?)
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateInterval {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateInterval {
    /// Bounds given in the wrong order are swapped.
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

/// The user's current choices. Passed explicitly into [`apply`]; never ambient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSelection {
    /// Categories to keep. Values the snapshot never observed are ignored at apply time.
    pub categories: BTreeSet<String>,
    /// Inclusive calendar-date interval. None = no date filter (null dates are kept).
    pub dates: Option<DateInterval>,
}

impl FilterSelection {
    /// All observed categories and the full observed date span.
    pub fn reset(snapshot: &Snapshot) -> Self {
        Self {
            categories: snapshot.categories().iter().cloned().collect(),
            dates: snapshot.date_span(),
        }
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dates(mut self, dates: Option<DateInterval>) -> Self {
        self.dates = dates;
        self
    }

    /// Set the interval from optional bounds; a missing bound falls back to `span`, and
    /// to an open end when there is no span either.
    pub fn with_date_bounds(
        self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        span: Option<DateInterval>,
    ) -> Self {
        if from.is_none() && to.is_none() {
            return self;
        }
        let start = from
            .or_else(|| span.map(|s| s.start()))
            .unwrap_or(NaiveDate::MIN);
        let end = to
            .or_else(|| span.map(|s| s.end()))
            .unwrap_or(NaiveDate::MAX);
        self.with_dates(Some(DateInterval::new(start, end)))
    }

    /// Selected categories that the snapshot actually contains, in snapshot order.
    pub fn effective_categories<'a>(&self, snapshot: &'a Snapshot) -> Vec<&'a str> {
        snapshot
            .categories()
            .iter()
            .filter(|c| self.categories.contains(c.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// Whether each filter control can be offered for the loaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterAvailability {
    pub category: bool,
    pub date: bool,
}

/// Snapshot rows that pass the current selection. Recomputed on every filter change.
#[derive(Debug, Clone)]
pub struct FilteredView {
    frame: DataFrame,
    availability: FilterAvailability,
}

impl FilteredView {
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn availability(&self) -> FilterAvailability {
        self.availability
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }
}

/// Row predicate for the category stage: membership in the effective subset.
fn category_predicate(column: &str, allowed: &[&str]) -> Expr {
    allowed
        .iter()
        .map(|c| col(column).eq(lit(*c)))
        .reduce(|acc, e| acc.or(e))
        .unwrap_or_else(|| lit(false))
}

/// Row predicate for the date stage. Time-of-day is truncated; null dates never match.
fn date_predicate(column: &str, interval: DateInterval) -> Expr {
    let day = col(column).dt().date().cast(DataType::Int32);
    day.clone()
        .gt_eq(lit(epoch_days(interval.start())))
        .and(day.lt_eq(lit(epoch_days(interval.end()))))
}

/// Narrow `snapshot` by `selection`. The snapshot is never modified.
///
/// A stage whose field is unresolved is skipped and reported through
/// [`FilteredView::availability`]. Both stages form one conjunctive predicate.
pub fn apply(snapshot: &Snapshot, selection: &FilterSelection) -> Result<FilteredView> {
    let category_col = snapshot.column(Field::Category);
    let date_col = snapshot.column(Field::Date);
    let availability = FilterAvailability {
        category: category_col.is_some(),
        date: date_col.is_some(),
    };

    let mut predicates: Vec<Expr> = Vec::new();
    if let Some(name) = category_col {
        let allowed = selection.effective_categories(snapshot);
        if allowed.len() < snapshot.categories().len() {
            predicates.push(category_predicate(name, &allowed));
        }
    }
    if let (Some(name), Some(interval)) = (date_col, selection.dates) {
        predicates.push(date_predicate(name, interval));
    }

    let frame = match predicates.into_iter().reduce(|acc, p| acc.and(p)) {
        Some(predicate) => snapshot.frame().clone().lazy().filter(predicate).collect()?,
        None => snapshot.frame().clone(),
    };

    debug!(
        rows_in = snapshot.height(),
        rows_out = frame.height(),
        categories = selection.categories.len(),
        dates = ?selection.dates,
        "applied filter selection"
    );

    Ok(FilteredView {
        frame,
        availability,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{day, scenario_snapshot, snapshot_from};

    fn ids(view: &FilteredView) -> Vec<String> {
        view.frame()
            .column("Transaction_ID")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap().to_string())
            .collect()
    }

    #[test]
    fn epoch_day_conversion() {
        assert_eq!(epoch_days(day(1970, 1, 1)), 0);
        assert_eq!(epoch_days(day(2024, 1, 1)), 19_723);
        assert_eq!(date_from_epoch_days(19_723), Some(day(2024, 1, 1)));
        assert_eq!(date_from_epoch_days(-1), Some(day(1969, 12, 31)));
    }

    #[test]
    fn interval_orders_bounds_and_is_inclusive() {
        let iv = DateInterval::new(day(2024, 1, 5), day(2024, 1, 1));
        assert_eq!(iv.start(), day(2024, 1, 1));
        assert_eq!(iv.end(), day(2024, 1, 5));
        assert!(iv.contains(day(2024, 1, 1)));
        assert!(iv.contains(day(2024, 1, 5)));
        assert!(!iv.contains(day(2024, 1, 6)));
    }

    #[test]
    fn reset_selects_everything() {
        let snapshot = scenario_snapshot();
        let selection = FilterSelection::reset(&snapshot);
        assert_eq!(
            selection.categories.iter().cloned().collect::<Vec<_>>(),
            vec!["A", "B"]
        );
        assert_eq!(
            selection.dates,
            Some(DateInterval::new(day(2024, 1, 1), day(2024, 1, 2)))
        );
        let view = apply(&snapshot, &selection).unwrap();
        assert_eq!(view.height(), 2);
        assert_eq!(
            view.availability(),
            FilterAvailability {
                category: true,
                date: true
            }
        );
    }

    #[test]
    fn category_subset_filters_rows() {
        let snapshot = scenario_snapshot();
        let selection = FilterSelection::reset(&snapshot).with_categories(["A"]);
        let view = apply(&snapshot, &selection).unwrap();
        assert_eq!(ids(&view), vec!["1"]);
    }

    #[test]
    fn unknown_categories_are_ignored() {
        let snapshot = scenario_snapshot();
        let selection = FilterSelection::reset(&snapshot).with_categories(["B", "Z"]);
        assert_eq!(selection.effective_categories(&snapshot), vec!["B"]);
        let view = apply(&snapshot, &selection).unwrap();
        assert_eq!(ids(&view), vec!["2"]);
    }

    #[test]
    fn empty_category_subset_gives_empty_view() {
        let snapshot = scenario_snapshot();
        let selection = FilterSelection::reset(&snapshot).with_categories(Vec::<String>::new());
        let view = apply(&snapshot, &selection).unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn date_interval_is_inclusive_and_ignores_time_of_day() {
        let snapshot = snapshot_from(
            &["1", "2", "3", "4"],
            &[
                "2024-01-01 00:00:00",
                "2024-01-02 23:59:59",
                "2024-01-03 00:00:00",
                "2023-12-31 23:59:59",
            ],
            &["A", "A", "A", "A"],
        );
        let selection = FilterSelection::reset(&snapshot)
            .with_dates(Some(DateInterval::new(day(2024, 1, 1), day(2024, 1, 2))));
        let view = apply(&snapshot, &selection).unwrap();
        assert_eq!(ids(&view), vec!["1", "2"]);
    }

    #[test]
    fn null_dates_dropped_only_when_date_filter_applies() {
        let snapshot = snapshot_from(
            &["1", "2", "3"],
            &["2024-01-01", "not a date", "2024-01-02"],
            &["A", "A", "B"],
        );
        let with_dates = apply(&snapshot, &FilterSelection::reset(&snapshot)).unwrap();
        assert_eq!(ids(&with_dates), vec!["1", "3"]);

        let without_dates = FilterSelection::reset(&snapshot).with_dates(None);
        let view = apply(&snapshot, &without_dates).unwrap();
        assert_eq!(ids(&view), vec!["1", "2", "3"]);
    }

    #[test]
    fn filters_compose_as_conjunction() {
        let snapshot = snapshot_from(
            &["1", "2", "3", "4"],
            &["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-02"],
            &["A", "B", "A", "A"],
        );
        let selection = FilterSelection::reset(&snapshot)
            .with_categories(["A"])
            .with_dates(Some(DateInterval::new(day(2024, 1, 2), day(2024, 1, 3))));
        let view = apply(&snapshot, &selection).unwrap();
        assert_eq!(ids(&view), vec!["3", "4"]);
    }

    #[test]
    fn apply_is_idempotent_and_leaves_snapshot_untouched() {
        let snapshot = scenario_snapshot();
        let selection = FilterSelection::reset(&snapshot).with_categories(["A"]);
        let first = apply(&snapshot, &selection).unwrap();
        let second = apply(&snapshot, &selection).unwrap();
        assert!(first.frame().equals_missing(second.frame()));
        assert_eq!(snapshot.height(), 2);
    }

    #[test]
    fn date_bounds_fill_from_span() {
        let span = Some(DateInterval::new(day(2024, 1, 1), day(2024, 1, 31)));
        let selection =
            FilterSelection::default().with_date_bounds(Some(day(2024, 1, 10)), None, span);
        assert_eq!(
            selection.dates,
            Some(DateInterval::new(day(2024, 1, 10), day(2024, 1, 31)))
        );

        let open = FilterSelection::default().with_date_bounds(None, Some(day(2024, 2, 1)), None);
        assert_eq!(open.dates.unwrap().start(), NaiveDate::MIN);

        let untouched = FilterSelection::default().with_date_bounds(None, None, span);
        assert_eq!(untouched.dates, None);
    }
}
