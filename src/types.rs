use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const COL_CREATION_DATE: &str = "Dt. Criação";
pub const COL_PRODUCT_CODE: &str = "CNP";
pub const COL_PRODUCT_NAME: &str = "Produto";
pub const COL_QUANTITY: &str = "Qtd. Res.";
pub const COL_INVOICED: &str = "Faturada";

/// Header names the loader requires, in the order of `RawRow`'s fields.
pub const REQUIRED_COLUMNS: [&str; 5] = [
    COL_CREATION_DATE,
    COL_PRODUCT_CODE,
    COL_PRODUCT_NAME,
    COL_QUANTITY,
    COL_INVOICED,
];

/// One data row of the reservation export, before cleaning.
#[derive(Debug, Default, Deserialize)]
pub struct RawRow {
    #[serde(rename = "Dt. Criação")]
    pub creation_date: Option<String>,
    #[serde(rename = "CNP")]
    pub product_code: Option<String>,
    #[serde(rename = "Produto")]
    pub product_name: Option<String>,
    #[serde(rename = "Qtd. Res.")]
    pub quantity: Option<String>,
    #[serde(rename = "Faturada")]
    pub invoiced: Option<String>,
}

impl RawRow {
    pub fn is_blank(&self) -> bool {
        [
            &self.creation_date,
            &self.product_code,
            &self.product_name,
            &self.quantity,
            &self.invoiced,
        ]
        .iter()
        .all(|v| v.as_deref().map_or(true, |s| s.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invoiced {
    Yes,
    No,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRecord {
    pub creation_date: NaiveDate,
    pub product_code: String,
    pub product_name: String,
    pub quantity: u64,
    pub invoiced: Invoiced,
}

/// Reservations of one product on one day, quantities summed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationEvent {
    pub creation_date: NaiveDate,
    pub product_code: String,
    pub product_name: String,
    pub quantity: u64,
}

impl From<&ReservationRecord> for ReservationEvent {
    fn from(r: &ReservationRecord) -> Self {
        ReservationEvent {
            creation_date: r.creation_date,
            product_code: r.product_code.clone(),
            product_name: r.product_name.clone(),
            quantity: r.quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        YearMonth { year: date.year(), month: date.month() }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyAggregate {
    pub product_code: String,
    pub product_name: String,
    pub year_month: YearMonth,
    pub event_count: u64,
    pub unit_total: u64,
}

/// Reservation count and units for one product in one month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthCell {
    pub event_count: u64,
    pub unit_total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub product_code: String,
    pub product_name: String,
    pub per_month: BTreeMap<YearMonth, MonthCell>,
    pub total_event_count: u64,
    pub total_unit_total: u64,
}

impl ReportRow {
    pub fn cell(&self, month: &YearMonth) -> MonthCell {
        self.per_month.get(month).copied().unwrap_or_default()
    }
}

/// Pivoted report: one row per product, `months` ascending defines the columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportTable {
    pub months: Vec<YearMonth>,
    pub rows: Vec<ReportRow>,
}

impl ReportTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Data columns in display order: reservations per month, units per
    /// month, then the two totals.
    pub fn columns(&self) -> Vec<Column> {
        let mut cols = Vec::with_capacity(self.months.len() * 2 + 2);
        for metric in [Metric::Reservations, Metric::Units] {
            cols.extend(self.months.iter().map(|m| Column { metric, period: Period::Month(*m) }));
        }
        cols.push(Column { metric: Metric::Reservations, period: Period::Total });
        cols.push(Column { metric: Metric::Units, period: Period::Total });
        cols
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Reservations,
    Units,
}

impl Metric {
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Reservations => "Reservations",
            Metric::Units => "Units",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Month(YearMonth),
    Total,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Month(m) => write!(f, "{m}"),
            Period::Total => f.write_str("Total"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub metric: Metric,
    pub period: Period,
}

impl Column {
    pub fn value(&self, row: &ReportRow) -> u64 {
        match (self.metric, self.period) {
            (Metric::Reservations, Period::Total) => row.total_event_count,
            (Metric::Units, Period::Total) => row.total_unit_total,
            (Metric::Reservations, Period::Month(m)) => row.cell(&m).event_count,
            (Metric::Units, Period::Month(m)) => row.cell(&m).unit_total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductTotal {
    pub product_code: String,
    pub product_name: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportInsights {
    pub window_start: NaiveDate,
    pub total_products: usize,
    pub months: Vec<String>,
    pub top_by_reservations: Option<ProductTotal>,
    pub top_by_units: Option<ProductTotal>,
    pub avg_reservations_per_product: f64,
    pub avg_units_per_product: f64,
}
