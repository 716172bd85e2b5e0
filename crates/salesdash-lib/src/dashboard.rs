//! KPI block and named panels of the dashboard, assembled from a filtered view.
//!
//! A panel whose columns did not resolve is [`Panel::Unavailable`]; a panel with nothing to
//! show for the current filter is [`Panel::Empty`]. Neither is an error.

use color_eyre::Result;
use polars::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

use crate::aggregate::{self, DailyRow, FlagSplit, GroupOrder, GroupRow};
use crate::config::AppConfig;
use crate::filter::{FilterAvailability, FilterSelection, FilteredView};
use crate::schema::Field;
use crate::snapshot::{LoadReport, Snapshot};
use crate::Args;

const NO_DATA: &str = "no data for this filter";
const NO_REFUNDS: &str = "no refunds for this filter";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum Panel<T> {
    Ready(T),
    /// Nothing to show for the current filter
    Empty(String),
    /// Columns this panel needs are absent from the file
    Unavailable(String),
}

impl<T> Panel<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Panel::Ready(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Panel::Ready(data) => Some(data),
            _ => None,
        }
    }

    fn empty(note: &str) -> Self {
        Panel::Empty(note.to_string())
    }

    fn unavailable(fields: &[Field]) -> Self {
        let names: Vec<&str> = fields.iter().map(|f| f.as_str()).collect();
        Panel::Unavailable(format!("needs column(s): {}", names.join(", ")))
    }
}

/// Headline numbers. None = the metric's columns are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Kpis {
    pub total_revenue: Option<f64>,
    pub total_refunds: Option<f64>,
    /// Revenue minus refunds
    pub net_revenue: Option<f64>,
    /// Percentage of rows with a return
    pub return_rate: Option<f64>,
    /// Refunds as a percentage of revenue; 0.0 when there is no revenue
    pub refund_ratio: Option<f64>,
    pub transactions: Option<usize>,
    pub support_ticket_rate: Option<f64>,
}

/// Grouped values for a bar or pie chart. `measure` names what `value` holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakdown {
    pub measure: String,
    pub rows: Vec<GroupRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTrend {
    pub measures: Vec<String>,
    pub rows: Vec<DailyRow>,
}

/// One row of the largest-refund table. Columns that did not resolve are None.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundTransaction {
    pub id: Option<String>,
    pub date: Option<String>,
    pub category: Option<String>,
    pub product: Option<String>,
    pub refund: f64,
    pub revenue: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panels {
    pub daily_trend: Panel<DailyTrend>,
    pub revenue_by_category: Panel<Breakdown>,
    pub refunds_by_category: Panel<Breakdown>,
    pub return_rate_by_category: Panel<Breakdown>,
    pub return_split: Panel<FlagSplit>,
    pub top_refund_transactions: Panel<Vec<RefundTransaction>>,
    pub top_products_by_refund: Panel<Breakdown>,
    pub top_products_by_revenue: Panel<Breakdown>,
    pub revenue_by_channel: Panel<Breakdown>,
    pub revenue_by_device: Panel<Breakdown>,
}

/// Row limits for the ranked panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSettings {
    pub top_products: usize,
    pub top_transactions: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            top_products: 10,
            top_transactions: 15,
        }
    }
}

impl ReportSettings {
    /// CLI flags win over the `[report]` config section, which wins over defaults.
    pub fn from_args_and_config(args: &Args, config: &AppConfig) -> Self {
        let defaults = Self::default();
        Self {
            top_products: args
                .top_products
                .or(config.report.top_products)
                .unwrap_or(defaults.top_products),
            top_transactions: args
                .top_transactions
                .or(config.report.top_transactions)
                .unwrap_or(defaults.top_transactions),
        }
    }
}

/// Everything the presentation layer needs for one filter state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub source: Option<PathBuf>,
    pub snapshot_rows: usize,
    pub filtered_rows: usize,
    pub selection: FilterSelection,
    pub availability: FilterAvailability,
    pub load: LoadReport,
    pub kpis: Kpis,
    pub panels: Panels,
}

/// Compute KPIs and every panel for `view`. Pure: same inputs, same report.
pub fn build_report(
    snapshot: &Snapshot,
    selection: &FilterSelection,
    view: &FilteredView,
    settings: &ReportSettings,
) -> Result<DashboardReport> {
    let ctx = Context {
        snapshot,
        table: view.frame(),
    };
    let kpis = ctx.kpis()?;
    let panels = Panels {
        daily_trend: ctx.daily_trend()?,
        revenue_by_category: ctx.revenue_by(Field::Category)?,
        refunds_by_category: ctx.refunds_by_category()?,
        return_rate_by_category: ctx.return_rate_by_category()?,
        return_split: ctx.return_split()?,
        top_refund_transactions: ctx.top_refund_transactions(settings.top_transactions)?,
        top_products_by_refund: ctx.top_products(Field::Refund, settings.top_products)?,
        top_products_by_revenue: ctx.top_products(Field::Revenue, settings.top_products)?,
        revenue_by_channel: ctx.revenue_by(Field::Channel)?,
        revenue_by_device: ctx.revenue_by(Field::Device)?,
    };

    debug!(
        filtered_rows = view.height(),
        top_products = settings.top_products,
        top_transactions = settings.top_transactions,
        "built dashboard report"
    );

    Ok(DashboardReport {
        source: snapshot.source().map(|p| p.to_path_buf()),
        snapshot_rows: snapshot.height(),
        filtered_rows: view.height(),
        selection: selection.clone(),
        availability: view.availability(),
        load: snapshot.report().clone(),
        kpis,
        panels,
    })
}

struct Context<'a> {
    snapshot: &'a Snapshot,
    table: &'a DataFrame,
}

impl Context<'_> {
    fn column(&self, field: Field) -> Option<&str> {
        self.snapshot.column(field)
    }

    /// Transaction id, falling back to order id.
    fn id_column(&self) -> Option<&str> {
        self.column(Field::TransactionId)
            .or_else(|| self.column(Field::OrderId))
    }

    fn total(&self, field: Field) -> Result<Option<f64>> {
        self.column(field)
            .map(|c| aggregate::total(self.table, c))
            .transpose()
    }

    fn rate(&self, field: Field) -> Result<Option<f64>> {
        self.column(field)
            .map(|c| aggregate::flag_rate(self.table, c))
            .transpose()
    }

    fn is_empty(&self) -> bool {
        self.table.height() == 0
    }

    fn kpis(&self) -> Result<Kpis> {
        let total_revenue = self.total(Field::Revenue)?;
        let total_refunds = self.total(Field::Refund)?;
        let (net_revenue, refund_ratio) = match (total_revenue, total_refunds) {
            (Some(revenue), Some(refunds)) => {
                let ratio = if revenue == 0.0 {
                    0.0
                } else {
                    refunds / revenue * 100.0
                };
                (Some(revenue - refunds), Some(ratio))
            }
            _ => (None, None),
        };
        let transactions = self
            .id_column()
            .map(|c| aggregate::distinct_count(self.table, c))
            .transpose()?;

        Ok(Kpis {
            total_revenue,
            total_refunds,
            net_revenue,
            return_rate: self.rate(Field::ReturnFlag)?,
            refund_ratio,
            transactions,
            support_ticket_rate: self.rate(Field::SupportTicket)?,
        })
    }

    fn daily_trend(&self) -> Result<Panel<DailyTrend>> {
        let Some(date) = self.column(Field::Date) else {
            return Ok(Panel::unavailable(&[Field::Date]));
        };
        let resolved: Vec<(Field, &str)> = [Field::Revenue, Field::Refund]
            .into_iter()
            .filter_map(|f| self.column(f).map(|c| (f, c)))
            .collect();
        if resolved.is_empty() {
            return Ok(Panel::unavailable(&[Field::Revenue, Field::Refund]));
        }
        let columns: Vec<&str> = resolved.iter().map(|(_, c)| *c).collect();
        let rows = aggregate::time_bucket_sum(self.table, date, &columns)?;
        if rows.is_empty() {
            return Ok(Panel::empty(NO_DATA));
        }
        Ok(Panel::Ready(DailyTrend {
            measures: resolved.iter().map(|(f, _)| f.to_string()).collect(),
            rows,
        }))
    }

    /// Revenue per group, or row counts per group when revenue is absent.
    fn revenue_by(&self, group: Field) -> Result<Panel<Breakdown>> {
        let Some(key) = self.column(group) else {
            return Ok(Panel::unavailable(&[group]));
        };
        if self.is_empty() {
            return Ok(Panel::empty(NO_DATA));
        }
        let (measure, rows) = match self.column(Field::Revenue) {
            Some(revenue) => (
                Field::Revenue.to_string(),
                aggregate::sum_by(self.table, key, revenue, GroupOrder::Descending)?,
            ),
            None => (
                "transactions".to_string(),
                aggregate::count_by(self.table, key)?,
            ),
        };
        Ok(Panel::Ready(Breakdown { measure, rows }))
    }

    fn refunds_by_category(&self) -> Result<Panel<Breakdown>> {
        let (Some(category), Some(refund)) =
            (self.column(Field::Category), self.column(Field::Refund))
        else {
            return Ok(Panel::unavailable(&[Field::Category, Field::Refund]));
        };
        if aggregate::total(self.table, refund)? <= 0.0 {
            return Ok(Panel::empty(NO_REFUNDS));
        }
        Ok(Panel::Ready(Breakdown {
            measure: Field::Refund.to_string(),
            rows: aggregate::sum_by(self.table, category, refund, GroupOrder::Descending)?,
        }))
    }

    fn return_rate_by_category(&self) -> Result<Panel<Breakdown>> {
        let (Some(category), Some(flag)) =
            (self.column(Field::Category), self.column(Field::ReturnFlag))
        else {
            return Ok(Panel::unavailable(&[Field::Category, Field::ReturnFlag]));
        };
        if self.is_empty() {
            return Ok(Panel::empty(NO_DATA));
        }
        Ok(Panel::Ready(Breakdown {
            measure: "return_rate".to_string(),
            rows: aggregate::mean_by(self.table, category, flag)?,
        }))
    }

    fn return_split(&self) -> Result<Panel<FlagSplit>> {
        let Some(flag) = self.column(Field::ReturnFlag) else {
            return Ok(Panel::unavailable(&[Field::ReturnFlag]));
        };
        if self.is_empty() {
            return Ok(Panel::empty(NO_DATA));
        }
        Ok(Panel::Ready(aggregate::flag_split(self.table, flag)?))
    }

    fn top_products(&self, measure: Field, n: usize) -> Result<Panel<Breakdown>> {
        let (Some(product), Some(value)) = (self.column(Field::Product), self.column(measure))
        else {
            return Ok(Panel::unavailable(&[Field::Product, measure]));
        };
        if self.is_empty() {
            return Ok(Panel::empty(NO_DATA));
        }
        let mut rows = aggregate::sum_by(self.table, product, value, GroupOrder::Descending)?;
        rows.truncate(n);
        Ok(Panel::Ready(Breakdown {
            measure: measure.to_string(),
            rows,
        }))
    }

    fn top_refund_transactions(&self, n: usize) -> Result<Panel<Vec<RefundTransaction>>> {
        let Some(refund) = self.column(Field::Refund) else {
            return Ok(Panel::unavailable(&[Field::Refund]));
        };
        let refunded = self
            .table
            .clone()
            .lazy()
            .filter(col(refund).gt(lit(0.0)))
            .collect()?;
        if refunded.height() == 0 {
            return Ok(Panel::empty(NO_REFUNDS));
        }
        let top = aggregate::top_n(&refunded, refund, n, true)?;

        let mut exprs = vec![col(refund).cast(DataType::Float64).alias("refund")];
        let text_columns = [
            (self.id_column(), "id"),
            (self.column(Field::Category), "category"),
            (self.column(Field::Product), "product"),
        ];
        for (column, alias) in text_columns {
            if let Some(c) = column {
                exprs.push(col(c).cast(DataType::String).alias(alias));
            }
        }
        if let Some(c) = self.column(Field::Date) {
            exprs.push(col(c).dt().to_string("%Y-%m-%d %H:%M:%S").alias("date"));
        }
        if let Some(c) = self.column(Field::Revenue) {
            exprs.push(col(c).cast(DataType::Float64).alias("revenue"));
        }
        let projected = top.lazy().select(exprs).collect()?;

        let text = |name: &str, i: usize| -> Option<String> {
            projected
                .column(name)
                .ok()
                .and_then(|c| c.str().ok())
                .and_then(|s| s.get(i))
                .map(str::to_string)
        };
        let number = |name: &str, i: usize| -> Option<f64> {
            projected
                .column(name)
                .ok()
                .and_then(|c| c.f64().ok())
                .and_then(|s| s.get(i))
        };

        let rows = (0..projected.height())
            .map(|i| RefundTransaction {
                id: text("id", i),
                date: text("date", i),
                category: text("category", i),
                product: text("product", i),
                refund: number("refund", i).unwrap_or(0.0),
                revenue: number("revenue", i),
            })
            .collect();
        Ok(Panel::Ready(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::apply;
    use crate::schema::{CandidateTable, SchemaPolicy};
    use crate::tests::scenario_snapshot;
    use crate::LoadOptions;

    fn report_for(snapshot: &Snapshot, selection: &FilterSelection) -> DashboardReport {
        let view = apply(snapshot, selection).unwrap();
        build_report(snapshot, selection, &view, &ReportSettings::default()).unwrap()
    }

    fn lenient(frame: DataFrame) -> Snapshot {
        Snapshot::from_frame(
            frame,
            &LoadOptions::default(),
            &CandidateTable::default(),
            &SchemaPolicy::lenient(),
        )
        .unwrap()
    }

    #[test]
    fn both_rows_selected() {
        let snapshot = scenario_snapshot();
        let report = report_for(&snapshot, &FilterSelection::reset(&snapshot));
        assert_eq!(report.filtered_rows, 2);
        let k = &report.kpis;
        assert_eq!(k.total_revenue, Some(150.0));
        assert_eq!(k.total_refunds, Some(50.0));
        assert_eq!(k.net_revenue, Some(100.0));
        assert_eq!(k.return_rate, Some(50.0));
        assert_eq!(k.transactions, Some(2));
        assert_eq!(k.support_ticket_rate, None);

        let trend = report.panels.daily_trend.ready().unwrap();
        assert_eq!(trend.measures, vec!["revenue", "refund"]);
        assert_eq!(trend.rows.len(), 2);
        assert_eq!(trend.rows[1].values, vec![50.0, 50.0]);

        let by_cat = report.panels.revenue_by_category.ready().unwrap();
        assert_eq!(by_cat.rows[0].key, "A");
        assert_eq!(by_cat.rows[0].value, 100.0);

        let split = report.panels.return_split.ready().unwrap();
        assert_eq!(
            *split,
            FlagSplit {
                flagged: 1,
                unflagged: 1
            }
        );

        let top = report.panels.top_refund_transactions.ready().unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id.as_deref(), Some("2"));
        assert_eq!(top[0].date.as_deref(), Some("2024-01-02 00:00:00"));
        assert_eq!(top[0].product.as_deref(), Some("Chair"));
        assert_eq!(top[0].revenue, Some(50.0));

        assert!(matches!(
            report.panels.revenue_by_channel,
            Panel::Unavailable(_)
        ));
    }

    #[test]
    fn single_category_without_returns() {
        let snapshot = scenario_snapshot();
        let selection = FilterSelection::reset(&snapshot).with_categories(["A"]);
        let report = report_for(&snapshot, &selection);
        assert_eq!(report.filtered_rows, 1);
        assert_eq!(report.kpis.return_rate, Some(0.0));
        assert_eq!(report.kpis.refund_ratio, Some(0.0));
        assert_eq!(
            report.panels.refunds_by_category,
            Panel::Empty(NO_REFUNDS.to_string())
        );
        assert_eq!(
            report.panels.top_refund_transactions,
            Panel::Empty(NO_REFUNDS.to_string())
        );
    }

    #[test]
    fn empty_view_gives_zero_rates_and_empty_panels() {
        let snapshot = scenario_snapshot();
        let selection = FilterSelection::reset(&snapshot).with_categories(Vec::<String>::new());
        let report = report_for(&snapshot, &selection);
        assert_eq!(report.filtered_rows, 0);
        assert_eq!(report.kpis.total_revenue, Some(0.0));
        assert_eq!(report.kpis.return_rate, Some(0.0));
        assert_eq!(report.kpis.refund_ratio, Some(0.0));
        assert_eq!(report.kpis.transactions, Some(0));
        assert!(matches!(report.panels.daily_trend, Panel::Empty(_)));
        assert!(matches!(report.panels.revenue_by_category, Panel::Empty(_)));
        assert!(matches!(report.panels.return_split, Panel::Empty(_)));
        assert!(matches!(report.panels.top_products_by_revenue, Panel::Empty(_)));
    }

    #[test]
    fn refund_rows_fall_back_to_order_id() {
        let snapshot = lenient(
            df!(
                "Order_ID" => ["o1", "o2", "o3"],
                "Refund_Amount" => ["0", "12", "30"],
            )
            .unwrap(),
        );
        let report = report_for(&snapshot, &FilterSelection::reset(&snapshot));
        let top = report.panels.top_refund_transactions.ready().unwrap();
        let ids: Vec<&str> = top.iter().filter_map(|t| t.id.as_deref()).collect();
        assert_eq!(ids, vec!["o3", "o2"]);
        assert_eq!(report.kpis.transactions, Some(3));
    }

    #[test]
    fn absent_columns_degrade_to_unavailable() {
        let snapshot = lenient(
            df!(
                "Order_ID" => ["o1", "o1", "o2"],
                "category" => ["A", "B", "A"],
                "Channel" => ["web", "app", "web"],
            )
            .unwrap(),
        );
        let report = report_for(&snapshot, &FilterSelection::reset(&snapshot));
        assert_eq!(report.kpis.total_revenue, None);
        assert_eq!(report.kpis.net_revenue, None);
        assert_eq!(report.kpis.return_rate, None);
        // falls back to order ids
        assert_eq!(report.kpis.transactions, Some(2));
        assert!(!report.availability.date);
        assert!(report.availability.category);
        assert!(matches!(report.panels.daily_trend, Panel::Unavailable(_)));
        assert!(matches!(
            report.panels.top_refund_transactions,
            Panel::Unavailable(_)
        ));

        let by_cat = report.panels.revenue_by_category.ready().unwrap();
        assert_eq!(by_cat.measure, "transactions");
        assert_eq!(by_cat.rows[0].key, "A");
        assert_eq!(by_cat.rows[0].value, 2.0);

        let by_channel = report.panels.revenue_by_channel.ready().unwrap();
        assert_eq!(by_channel.rows[0].key, "web");
    }

    #[test]
    fn top_products_respect_limit_and_support_rate() {
        let snapshot = lenient(
            df!(
                "Product_Name" => ["p1", "p2", "p3", "p1"],
                "Revenue_EUR" => ["5", "30", "20", "10"],
                "Support_Ticket" => ["1", "0", "0", "0"],
            )
            .unwrap(),
        );
        let view = apply(&snapshot, &FilterSelection::reset(&snapshot)).unwrap();
        let settings = ReportSettings {
            top_products: 2,
            top_transactions: 15,
        };
        let report =
            build_report(&snapshot, &FilterSelection::reset(&snapshot), &view, &settings).unwrap();
        let top = report.panels.top_products_by_revenue.ready().unwrap();
        let keys: Vec<&str> = top.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["p2", "p3"]);
        assert_eq!(report.kpis.support_ticket_rate, Some(25.0));
        assert!(matches!(
            report.panels.top_products_by_refund,
            Panel::Unavailable(_)
        ));
    }

    #[test]
    fn panel_serializes_with_state_tag() {
        let panel: Panel<FlagSplit> = Panel::Unavailable("needs column(s): return_flag".into());
        let json = serde_json::to_value(&panel).unwrap();
        assert_eq!(json["state"], "unavailable");
        assert_eq!(json["data"], "needs column(s): return_flag");
    }

    #[test]
    fn settings_layering() {
        use clap::Parser;
        let mut config = AppConfig::default();
        config.report.top_products = Some(5);
        let args = Args::try_parse_from(["salesdash", "x.csv", "--top-transactions", "3"]).unwrap();
        let settings = ReportSettings::from_args_and_config(&args, &config);
        assert_eq!(settings.top_products, 5);
        assert_eq!(settings.top_transactions, 3);
    }
}
