use crate::config::{InvoicingFilter, PopularityRange, ReportConfig};
use crate::error::Result;
use crate::types::{
    MonthCell, MonthlyAggregate, ProductTotal, ReportInsights, ReportRow, ReportTable,
    ReservationEvent, ReservationRecord, YearMonth,
};
use crate::util::{average, months_back};
use chrono::NaiveDate;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, warn};

/// A run that produced an empty table. Not an error: callers show "no rows".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportWarning {
    NoEventsInWindow { start: NaiveDate },
    NoRowsInRange { min: u64, max: u64 },
}

impl fmt::Display for ReportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportWarning::NoEventsInWindow { start } => {
                write!(f, "no reservations since {}", start.format("%Y-%m-%d"))
            }
            ReportWarning::NoRowsInRange { min, max } => {
                write!(f, "no product has between {} and {} reservations", min, max)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportOutcome {
    pub table: ReportTable,
    pub window_start: NaiveDate,
    /// Total-reservation bounds of the unfiltered table, for picking a range.
    pub natural_range: Option<PopularityRange>,
    pub warnings: Vec<ReportWarning>,
}

/// Run every stage from the invoicing filter to the sorter.
pub fn run_pipeline(records: &[ReservationRecord], config: &ReportConfig) -> Result<ReportOutcome> {
    let cfg = config.validate()?;
    let mut warnings = Vec::new();

    let invoiced = filter_invoicing(records, cfg.invoicing);
    let events = group_events(invoiced.into_iter().map(ReservationEvent::from));
    debug!(records = records.len(), events = events.len(), "grouped reservation events");

    let start = window_start(cfg.today, cfg.window_months);
    let windowed = select_window(events, start);
    debug!(window_start = %start, events = windowed.len(), "applied analysis window");
    if windowed.is_empty() {
        warn!(window_start = %start, "no reservation events inside the analysis window");
        warnings.push(ReportWarning::NoEventsInWindow { start });
    }

    let aggregates = aggregate_monthly(&windowed);
    let pivot = build_pivot(&aggregates);
    let natural_range = natural_range(&pivot);
    debug!(products = pivot.rows.len(), months = pivot.months.len(), "built pivot");

    let filtered = match cfg.popularity {
        Some(range) => {
            let filtered = filter_popularity(&pivot, range);
            if filtered.is_empty() && !pivot.is_empty() {
                warn!(min = range.min, max = range.max, "popularity range removed every product");
                warnings.push(ReportWarning::NoRowsInRange { min: range.min, max: range.max });
            }
            filtered
        }
        None => pivot,
    };

    Ok(ReportOutcome {
        table: sort_by_popularity(filtered),
        window_start: start,
        natural_range,
        warnings,
    })
}

pub fn filter_invoicing(records: &[ReservationRecord], mode: InvoicingFilter) -> Vec<&ReservationRecord> {
    records.iter().filter(|r| mode.accepts(r.invoiced)).collect()
}

/// Collapse events sharing (date, product code, product name) into one,
/// summing their quantities. Output is ordered by that key.
pub fn group_events<I>(events: I) -> Vec<ReservationEvent>
where
    I: IntoIterator<Item = ReservationEvent>,
{
    let mut map: BTreeMap<(NaiveDate, String, String), u64> = BTreeMap::new();
    for e in events {
        *map.entry((e.creation_date, e.product_code, e.product_name)).or_insert(0) += e.quantity;
    }
    map.into_iter()
        .map(|((creation_date, product_code, product_name), quantity)| ReservationEvent {
            creation_date,
            product_code,
            product_name,
            quantity,
        })
        .collect()
}

/// First day of the month `window_months` months before the current month.
pub fn window_start(today: NaiveDate, window_months: u32) -> NaiveDate {
    months_back(today, window_months)
}

/// Keep events on or after `start`. There is no upper bound.
pub fn select_window(events: Vec<ReservationEvent>, start: NaiveDate) -> Vec<ReservationEvent> {
    events.into_iter().filter(|e| e.creation_date >= start).collect()
}

pub fn aggregate_monthly(events: &[ReservationEvent]) -> Vec<MonthlyAggregate> {
    let mut map: BTreeMap<(&str, &str, YearMonth), MonthCell> = BTreeMap::new();
    for e in events {
        let key = (e.product_code.as_str(), e.product_name.as_str(), YearMonth::of(e.creation_date));
        let cell = map.entry(key).or_default();
        cell.event_count += 1;
        cell.unit_total += e.quantity;
    }
    map.into_iter()
        .map(|((code, name, year_month), cell)| MonthlyAggregate {
            product_code: code.to_string(),
            product_name: name.to_string(),
            year_month,
            event_count: cell.event_count,
            unit_total: cell.unit_total,
        })
        .collect()
}

/// Reshape per-(product, month) aggregates into one row per product with a
/// cell for every month seen in any aggregate. Rows come out ordered by
/// product code, then product name.
pub fn build_pivot(aggregates: &[MonthlyAggregate]) -> ReportTable {
    let months: BTreeSet<YearMonth> = aggregates.iter().map(|a| a.year_month).collect();

    let mut by_product: BTreeMap<(&str, &str), BTreeMap<YearMonth, MonthCell>> = BTreeMap::new();
    for a in aggregates {
        let cells = by_product
            .entry((a.product_code.as_str(), a.product_name.as_str()))
            .or_default();
        let cell = cells.entry(a.year_month).or_default();
        cell.event_count += a.event_count;
        cell.unit_total += a.unit_total;
    }

    let rows = by_product
        .into_iter()
        .map(|((code, name), cells)| {
            let per_month: BTreeMap<YearMonth, MonthCell> = months
                .iter()
                .map(|m| (*m, cells.get(m).copied().unwrap_or_default()))
                .collect();
            ReportRow {
                product_code: code.to_string(),
                product_name: name.to_string(),
                total_event_count: per_month.values().map(|c| c.event_count).sum(),
                total_unit_total: per_month.values().map(|c| c.unit_total).sum(),
                per_month,
            }
        })
        .collect();

    ReportTable { months: months.into_iter().collect(), rows }
}

/// Smallest and largest total reservation count in the table. A single
/// value is widened by one so the range can still be narrowed from.
pub fn natural_range(table: &ReportTable) -> Option<PopularityRange> {
    let min = table.rows.iter().map(|r| r.total_event_count).min()?;
    let max = table.rows.iter().map(|r| r.total_event_count).max()?;
    let max = if min == max { min + 1 } else { max };
    Some(PopularityRange { min, max })
}

pub fn filter_popularity(table: &ReportTable, range: PopularityRange) -> ReportTable {
    ReportTable {
        months: table.months.clone(),
        rows: table
            .rows
            .iter()
            .filter(|r| range.contains(r.total_event_count))
            .cloned()
            .collect(),
    }
}

/// Order rows by total reservations, descending. The sort is stable, so
/// ties keep the pivot's product code / name order.
pub fn sort_by_popularity(mut table: ReportTable) -> ReportTable {
    table.rows.sort_by_key(|r| Reverse(r.total_event_count));
    table
}

pub fn generate_insights(table: &ReportTable, window_start: NaiveDate) -> ReportInsights {
    let top_by = |value: fn(&ReportRow) -> u64| {
        // `max_by_key` keeps the last maximum; reverse so the first row wins.
        table
            .rows
            .iter()
            .rev()
            .max_by_key(|r| value(r))
            .map(|r| ProductTotal {
                product_code: r.product_code.clone(),
                product_name: r.product_name.clone(),
                value: value(r),
            })
    };
    let events: Vec<u64> = table.rows.iter().map(|r| r.total_event_count).collect();
    let units: Vec<u64> = table.rows.iter().map(|r| r.total_unit_total).collect();

    ReportInsights {
        window_start,
        total_products: table.rows.len(),
        months: table.months.iter().map(|m| m.to_string()).collect(),
        top_by_reservations: top_by(|r| r.total_event_count),
        top_by_units: top_by(|r| r.total_unit_total),
        avg_reservations_per_product: average(&events),
        avg_units_per_product: average(&units),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, ReportError};
    use crate::types::Invoiced;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rec(date: NaiveDate, code: &str, name: &str, qty: u64, invoiced: Invoiced) -> ReservationRecord {
        ReservationRecord {
            creation_date: date,
            product_code: code.to_string(),
            product_name: name.to_string(),
            quantity: qty,
            invoiced,
        }
    }

    fn event(date: NaiveDate, code: &str, qty: u64) -> ReservationEvent {
        ReservationEvent {
            creation_date: date,
            product_code: code.to_string(),
            product_name: format!("Product {code}"),
            quantity: qty,
        }
    }

    fn aspirin_records() -> Vec<ReservationRecord> {
        vec![
            rec(d(2024, 1, 5), "P1", "Aspirin", 2, Invoiced::No),
            rec(d(2024, 1, 5), "P1", "Aspirin", 3, Invoiced::No),
            rec(d(2024, 2, 10), "P1", "Aspirin", 1, Invoiced::Yes),
        ]
    }

    fn config(window_months: i64) -> ReportConfig {
        ReportConfig { window_months, ..ReportConfig::new(d(2024, 3, 18)) }
    }

    fn cell(event_count: u64, unit_total: u64) -> MonthCell {
        MonthCell { event_count, unit_total }
    }

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth { year, month }
    }

    /// Several products over several months, including same-day duplicates.
    fn mixed_records() -> Vec<ReservationRecord> {
        vec![
            rec(d(2024, 1, 2), "P2", "Brufen", 1, Invoiced::Yes),
            rec(d(2024, 1, 2), "P2", "Brufen", 1, Invoiced::No),
            rec(d(2024, 1, 9), "P2", "Brufen", 4, Invoiced::Yes),
            rec(d(2024, 2, 1), "P3", "Ben-u-ron", 2, Invoiced::No),
            rec(d(2024, 2, 14), "P1", "Aspirin", 6, Invoiced::Yes),
            rec(d(2024, 3, 3), "P1", "Aspirin", 1, Invoiced::No),
            rec(d(2024, 3, 4), "P3", "Ben-u-ron", 1, Invoiced::No),
            rec(d(2023, 11, 30), "P4", "Daflon", 9, Invoiced::Yes),
        ]
    }

    #[test]
    fn scenario_all_records() {
        let out = run_pipeline(&aspirin_records(), &config(2)).unwrap();
        assert_eq!(out.window_start, d(2024, 1, 1));
        assert!(out.warnings.is_empty());
        assert_eq!(out.table.months, vec![ym(2024, 1), ym(2024, 2)]);
        assert_eq!(out.table.rows.len(), 1);

        let row = &out.table.rows[0];
        assert_eq!((row.product_code.as_str(), row.product_name.as_str()), ("P1", "Aspirin"));
        assert_eq!(row.cell(&ym(2024, 1)), cell(1, 5));
        assert_eq!(row.cell(&ym(2024, 2)), cell(1, 1));
        assert_eq!((row.total_event_count, row.total_unit_total), (2, 6));
    }

    #[test]
    fn scenario_invoiced_only() {
        let cfg = ReportConfig { invoicing: InvoicingFilter::InvoicedOnly, ..config(2) };
        let out = run_pipeline(&aspirin_records(), &cfg).unwrap();
        // Months come from the surviving aggregates only.
        assert_eq!(out.table.months, vec![ym(2024, 2)]);
        let row = &out.table.rows[0];
        assert_eq!(row.cell(&ym(2024, 1)), cell(0, 0));
        assert_eq!(row.cell(&ym(2024, 2)), cell(1, 1));
        assert_eq!((row.total_event_count, row.total_unit_total), (1, 1));
    }

    #[test]
    fn scenario_empty_input() {
        let out = run_pipeline(&[], &config(3)).unwrap();
        assert!(out.table.rows.is_empty());
        assert!(out.table.months.is_empty());
        assert_eq!(out.natural_range, None);
        assert_eq!(out.warnings, vec![ReportWarning::NoEventsInWindow { start: d(2023, 12, 1) }]);
    }

    #[test]
    fn invalid_configuration_is_rejected_before_running() {
        let err = run_pipeline(&aspirin_records(), &config(0)).unwrap_err();
        assert!(matches!(err, ReportError::Config(ConfigError::InvalidWindow(0))));

        let cfg = ReportConfig { popularity: Some((3, 1)), ..config(2) };
        let err = run_pipeline(&aspirin_records(), &cfg).unwrap_err();
        assert!(matches!(err, ReportError::Config(ConfigError::InvalidBounds { min: 3, max: 1 })));
    }

    #[test]
    fn invoicing_filter_preserves_order() {
        let records = mixed_records();
        let kept = filter_invoicing(&records, InvoicingFilter::NotInvoicedOnly);
        let dates: Vec<NaiveDate> = kept.iter().map(|r| r.creation_date).collect();
        assert_eq!(dates, vec![d(2024, 1, 2), d(2024, 2, 1), d(2024, 3, 3), d(2024, 3, 4)]);
        assert_eq!(filter_invoicing(&records, InvoicingFilter::All).len(), records.len());
    }

    #[test]
    fn grouping_sums_same_day_quantities_and_is_idempotent() {
        let events = vec![
            event(d(2024, 1, 2), "P2", 1),
            event(d(2024, 1, 2), "P2", 1),
            event(d(2024, 1, 2), "P1", 5),
            event(d(2024, 1, 3), "P2", 4),
        ];
        let once = group_events(events);
        assert_eq!(once.len(), 3);
        let p2_day = once
            .iter()
            .find(|e| e.product_code == "P2" && e.creation_date == d(2024, 1, 2))
            .unwrap();
        assert_eq!(p2_day.quantity, 2);

        let twice = group_events(once.clone());
        assert_eq!(twice, once);
        assert!(group_events(Vec::new()).is_empty());
    }

    #[test]
    fn window_keeps_events_from_start_month_onwards() {
        let today = d(2024, 3, 18);
        assert_eq!(window_start(today, 1), d(2024, 2, 1));
        assert_eq!(window_start(today, 3), d(2023, 12, 1));

        let events = vec![
            event(d(2024, 1, 31), "P1", 1),
            event(d(2024, 2, 1), "P1", 1),
            event(d(2024, 3, 18), "P1", 1),
            event(d(2024, 5, 1), "P1", 1),
        ];
        let kept = select_window(events, window_start(today, 1));
        let dates: Vec<NaiveDate> = kept.iter().map(|e| e.creation_date).collect();
        assert_eq!(dates, vec![d(2024, 2, 1), d(2024, 3, 18), d(2024, 5, 1)]);
    }

    #[test]
    fn monthly_aggregation_ignores_input_order() {
        let events = vec![
            event(d(2024, 1, 2), "P1", 2),
            event(d(2024, 1, 20), "P1", 3),
            event(d(2024, 2, 2), "P1", 1),
            event(d(2024, 1, 7), "P2", 4),
        ];
        let mut reversed = events.clone();
        reversed.reverse();

        let aggregates = aggregate_monthly(&events);
        assert_eq!(aggregates, aggregate_monthly(&reversed));
        assert_eq!(aggregates.len(), 3);
        let jan_p1 = &aggregates[0];
        assert_eq!((jan_p1.year_month, jan_p1.event_count, jan_p1.unit_total), (ym(2024, 1), 2, 5));
    }

    #[test]
    fn pivot_is_column_complete_and_totals_match() {
        let out = run_pipeline(&mixed_records(), &config(6)).unwrap();
        let table = &out.table;

        assert_eq!(table.months, vec![ym(2023, 11), ym(2024, 1), ym(2024, 2), ym(2024, 3)]);
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.columns().len(), 2 * table.months.len() + 2);
        for row in &table.rows {
            let months: Vec<YearMonth> = row.per_month.keys().copied().collect();
            assert_eq!(months, table.months);
            let events: u64 = row.per_month.values().map(|c| c.event_count).sum();
            let units: u64 = row.per_month.values().map(|c| c.unit_total).sum();
            assert_eq!(row.total_event_count, events);
            assert_eq!(row.total_unit_total, units);
        }

        let brufen = table.rows.iter().find(|r| r.product_code == "P2").unwrap();
        // Two line-items on Jan 2 are one reservation.
        assert_eq!(brufen.cell(&ym(2024, 1)), cell(2, 6));
        assert_eq!(brufen.cell(&ym(2024, 3)), cell(0, 0));
    }

    #[test]
    fn sorter_is_descending_with_code_tie_break() {
        let out = run_pipeline(&mixed_records(), &config(6)).unwrap();
        let order: Vec<(&str, u64)> = out
            .table
            .rows
            .iter()
            .map(|r| (r.product_code.as_str(), r.total_event_count))
            .collect();
        assert_eq!(order, vec![("P1", 2), ("P2", 2), ("P3", 2), ("P4", 1)]);
        assert!(order.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn popularity_filter_is_inclusive_and_monotonic() {
        let pivot = run_pipeline(&mixed_records(), &config(6)).unwrap().table;
        let narrow = filter_popularity(&pivot, PopularityRange { min: 2, max: 2 });
        let wide = filter_popularity(&pivot, PopularityRange { min: 1, max: 5 });
        assert_eq!(narrow.rows.len(), 3);
        assert_eq!(wide.rows.len(), 4);
        assert!(narrow.rows.iter().all(|r| wide.rows.contains(r)));
        assert_eq!(narrow.months, pivot.months);
    }

    #[test]
    fn empty_popularity_result_is_a_warning() {
        let cfg = ReportConfig { popularity: Some((10, 20)), ..config(6) };
        let out = run_pipeline(&mixed_records(), &cfg).unwrap();
        assert!(out.table.is_empty());
        assert_eq!(out.warnings, vec![ReportWarning::NoRowsInRange { min: 10, max: 20 }]);
        assert_eq!(out.natural_range, Some(PopularityRange { min: 1, max: 2 }));
    }

    #[test]
    fn natural_range_widens_a_single_value() {
        let table = run_pipeline(&aspirin_records(), &config(2)).unwrap().table;
        assert_eq!(natural_range(&table), Some(PopularityRange { min: 2, max: 3 }));
        assert_eq!(natural_range(&ReportTable::default()), None);
    }

    #[test]
    fn insights_pick_first_top_product() {
        let out = run_pipeline(&mixed_records(), &config(6)).unwrap();
        let insights = generate_insights(&out.table, out.window_start);
        assert_eq!(insights.total_products, 4);
        assert_eq!(insights.top_by_reservations.as_ref().unwrap().product_code, "P1");
        let top_units = insights.top_by_units.unwrap();
        assert_eq!((top_units.product_code.as_str(), top_units.value), ("P4", 9));
        assert!((insights.avg_reservations_per_product - 1.75).abs() < 1e-9);
        assert!((insights.avg_units_per_product - 6.25).abs() < 1e-9);

        let empty = generate_insights(&ReportTable::default(), out.window_start);
        assert_eq!(empty.top_by_reservations, None);
        assert_eq!(empty.avg_units_per_product, 0.0);
    }
}
