//! Plain-text rendering of a dashboard report for the terminal.

use crate::aggregate::GroupRow;
use crate::dashboard::{Breakdown, DailyTrend, DashboardReport, Kpis, Panel, RefundTransaction};

const NOT_AVAILABLE: &str = "n/a";

/// Two decimals with a space as thousands separator: `1 234.50`.
pub fn format_amount(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(*c);
    }
    let sign = if value < 0.0 && fixed.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, frac_part)
}

/// One decimal and a percent sign: `50.0%`.
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

fn or_na<T>(value: Option<T>, f: impl Fn(T) -> String) -> String {
    value.map(f).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn heading(out: &mut String, title: &str) {
    out.push('\n');
    out.push_str(title);
    out.push('\n');
}

/// Two-column table with the label column padded to its widest entry.
fn pairs(out: &mut String, rows: &[(String, String)]) {
    let width = rows.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);
    let value_width = rows.iter().map(|(_, v)| v.chars().count()).max().unwrap_or(0);
    for (label, value) in rows {
        out.push_str(&format!(
            "  {:<width$}  {:>value_width$}\n",
            label,
            value,
            width = width,
            value_width = value_width
        ));
    }
}

fn placeholder<T>(out: &mut String, panel: &Panel<T>) -> bool {
    match panel {
        Panel::Ready(_) => false,
        Panel::Empty(note) => {
            out.push_str(&format!("  ({})\n", note));
            true
        }
        Panel::Unavailable(reason) => {
            out.push_str(&format!("  (unavailable: {})\n", reason));
            true
        }
    }
}

fn format_group_value(measure: &str, row: &GroupRow) -> String {
    match measure {
        "return_rate" => format_percent(row.value),
        "transactions" => format!("{}", row.value as u64),
        _ => format_amount(row.value),
    }
}

fn breakdown(out: &mut String, title: &str, panel: &Panel<Breakdown>) {
    heading(out, title);
    if placeholder(out, panel) {
        return;
    }
    if let Panel::Ready(b) = panel {
        let rows: Vec<(String, String)> = b
            .rows
            .iter()
            .map(|r| (r.key.clone(), format_group_value(&b.measure, r)))
            .collect();
        pairs(out, &rows);
    }
}

fn daily_trend(out: &mut String, panel: &Panel<DailyTrend>) {
    heading(out, "Daily trend");
    if placeholder(out, panel) {
        return;
    }
    if let Panel::Ready(trend) = panel {
        let cells: Vec<Vec<String>> = trend
            .rows
            .iter()
            .map(|r| r.values.iter().map(|v| format_amount(*v)).collect())
            .collect();
        let widths: Vec<usize> = trend
            .measures
            .iter()
            .enumerate()
            .map(|(i, m)| {
                cells
                    .iter()
                    .map(|row| row[i].len())
                    .chain(std::iter::once(m.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut header = format!("  {:<10}", "day");
        for (m, w) in trend.measures.iter().zip(&widths) {
            header.push_str(&format!("  {:>w$}", m, w = *w));
        }
        out.push_str(&header);
        out.push('\n');
        for (row, values) in trend.rows.iter().zip(&cells) {
            let mut line = format!("  {:<10}", row.day.format("%Y-%m-%d"));
            for (v, w) in values.iter().zip(&widths) {
                line.push_str(&format!("  {:>w$}", v, w = *w));
            }
            out.push_str(&line);
            out.push('\n');
        }
    }
}

fn refund_transactions(out: &mut String, panel: &Panel<Vec<RefundTransaction>>) {
    heading(out, "Largest refunds");
    if placeholder(out, panel) {
        return;
    }
    if let Panel::Ready(rows) = panel {
        for r in rows {
            let mut parts = vec![
                r.id.clone().unwrap_or_else(|| "-".to_string()),
                r.date.clone().unwrap_or_else(|| "-".to_string()),
            ];
            parts.extend(r.category.clone());
            parts.extend(r.product.clone());
            parts.push(format!("refund {}", format_amount(r.refund)));
            if let Some(revenue) = r.revenue {
                parts.push(format!("revenue {}", format_amount(revenue)));
            }
            out.push_str("  ");
            out.push_str(&parts.join("  "));
            out.push('\n');
        }
    }
}

fn kpis(out: &mut String, k: &Kpis) {
    heading(out, "KPIs");
    pairs(
        out,
        &[
            ("Total revenue".to_string(), or_na(k.total_revenue, format_amount)),
            ("Total refunds".to_string(), or_na(k.total_refunds, format_amount)),
            ("Net revenue".to_string(), or_na(k.net_revenue, format_amount)),
            ("Return rate".to_string(), or_na(k.return_rate, format_percent)),
            ("Refunds / revenue".to_string(), or_na(k.refund_ratio, format_percent)),
            (
                "Transactions".to_string(),
                or_na(k.transactions, |n| n.to_string()),
            ),
            (
                "Support ticket rate".to_string(),
                or_na(k.support_ticket_rate, format_percent),
            ),
        ],
    );
}

/// Render the whole report as aligned plain text.
pub fn render_text(report: &DashboardReport) -> String {
    let mut out = String::new();

    let source = report
        .source
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(in memory)".to_string());
    out.push_str(&format!("salesdash report: {}\n", source));
    out.push_str(&format!(
        "rows: {} of {}\n",
        report.filtered_rows, report.snapshot_rows
    ));

    if report.availability.category {
        let cats: Vec<&str> = report.selection.categories.iter().map(String::as_str).collect();
        out.push_str(&format!("categories: {}\n", cats.join(", ")));
    } else {
        out.push_str("categories: (filter unavailable: no category column)\n");
    }
    match (report.availability.date, report.selection.dates) {
        (false, _) => out.push_str("dates: (filter unavailable: no date column)\n"),
        (true, Some(iv)) => out.push_str(&format!(
            "dates: {} to {}\n",
            iv.start().format("%Y-%m-%d"),
            iv.end().format("%Y-%m-%d")
        )),
        (true, None) => out.push_str("dates: all\n"),
    }
    let coerced = report.load.total_coerced();
    if coerced > 0 {
        let detail: Vec<String> = report
            .load
            .fields
            .iter()
            .filter(|f| f.coerced > 0)
            .map(|f| format!("{} {}", f.field, f.coerced))
            .collect();
        out.push_str(&format!(
            "coerced cells: {} ({})\n",
            coerced,
            detail.join(", ")
        ));
    }
    let negative = report.load.total_negative();
    if negative > 0 {
        let detail: Vec<String> = report
            .load
            .fields
            .iter()
            .filter(|f| f.negative > 0)
            .map(|f| format!("{} {}", f.field, f.negative))
            .collect();
        out.push_str(&format!(
            "negative amounts: {} ({})\n",
            negative,
            detail.join(", ")
        ));
    }

    kpis(&mut out, &report.kpis);

    let p = &report.panels;
    daily_trend(&mut out, &p.daily_trend);
    breakdown(&mut out, "Revenue by category", &p.revenue_by_category);
    breakdown(&mut out, "Refunds by category", &p.refunds_by_category);
    breakdown(&mut out, "Return rate by category", &p.return_rate_by_category);

    heading(&mut out, "Return vs no return");
    if !placeholder(&mut out, &p.return_split) {
        if let Panel::Ready(split) = &p.return_split {
            pairs(
                &mut out,
                &[
                    ("Returned".to_string(), split.flagged.to_string()),
                    ("Not returned".to_string(), split.unflagged.to_string()),
                ],
            );
        }
    }

    refund_transactions(&mut out, &p.top_refund_transactions);
    breakdown(&mut out, "Top products by refunds", &p.top_products_by_refund);
    breakdown(&mut out, "Top products by revenue", &p.top_products_by_revenue);
    breakdown(&mut out, "Revenue by channel", &p.revenue_by_channel);
    breakdown(&mut out, "Revenue by device", &p.revenue_by_device);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{build_report, ReportSettings};
    use crate::filter::{apply, FilterSelection};
    use crate::tests::scenario_snapshot;

    #[test]
    fn amounts_use_space_thousands_separator() {
        assert_eq!(format_amount(0.0), "0.00");
        assert_eq!(format_amount(150.0), "150.00");
        assert_eq!(format_amount(1234.5), "1 234.50");
        assert_eq!(format_amount(1234567.891), "1 234 567.89");
        assert_eq!(format_amount(-2500.0), "-2 500.00");
        assert_eq!(format_amount(-0.001), "0.00");
    }

    #[test]
    fn percent_has_one_decimal() {
        assert_eq!(format_percent(50.0), "50.0%");
        assert_eq!(format_percent(100.0 / 3.0), "33.3%");
    }

    #[test]
    fn renders_scenario_report() {
        let snapshot = scenario_snapshot();
        let selection = FilterSelection::reset(&snapshot);
        let view = apply(&snapshot, &selection).unwrap();
        let report =
            build_report(&snapshot, &selection, &view, &ReportSettings::default()).unwrap();
        let text = render_text(&report);

        assert!(text.contains("rows: 2 of 2"));
        assert!(text.contains("categories: A, B"));
        assert!(text.contains("dates: 2024-01-01 to 2024-01-02"));
        assert!(text.contains("Total revenue"));
        assert!(text.contains("150.00"));
        assert!(text.contains("50.0%"));
        assert!(text.contains("(unavailable: needs column(s): channel)"));
        assert!(text.contains("refund 50.00"));
        assert!(!text.contains("coerced cells"));
        assert!(!text.contains("negative amounts"));
    }

    #[test]
    fn header_lists_negative_amounts() {
        let frame = polars::df!(
            "Transaction_ID" => ["1", "2"],
            "Revenue_EUR" => ["100", "-20"],
            "Refund_Amount" => ["0", "-5"],
        )
        .unwrap();
        let snapshot = crate::Snapshot::from_frame(
            frame,
            &crate::LoadOptions::default(),
            &crate::CandidateTable::default(),
            &crate::SchemaPolicy::lenient(),
        )
        .unwrap();
        let selection = FilterSelection::reset(&snapshot);
        let view = apply(&snapshot, &selection).unwrap();
        let report =
            build_report(&snapshot, &selection, &view, &ReportSettings::default()).unwrap();
        let text = render_text(&report);

        assert!(text.contains("negative amounts: 2 (revenue 1, refund 1)"), "{}", text);
        assert!(text.contains("Net revenue"));
        assert!(text.contains("85.00"));
    }
}
