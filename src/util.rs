// Utility helpers for parsing export cells, calendar months and number
// formatting.
//
// This module centralizes all the "dirty" spreadsheet/CSV handling so the
// pipeline can assume clean, typed values.
use crate::types::Invoiced;
use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Trim an optional cell and drop it when nothing is left.
pub fn non_empty(s: Option<&str>) -> Option<&str> {
    let s = s?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Parse a creation date as found in exports.
///
/// - Accepts ISO dates, day-first dates (`05/01/2024`) and date-times.
/// - A bare number is read as an Excel serial date, which is how workbook
///   dates come out when the cell carries no date format.
pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    let s = non_empty(s)?;
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    // Fractional seconds and anything else after the date.
    if let Some((date, _)) = s.split_once(|c: char| c == ' ' || c == 'T') {
        if let Ok(d) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            return Some(d);
        }
    }
    s.parse::<f64>().ok().and_then(excel_serial_to_date)
}

/// Convert an Excel serial day number (1900 date system) to a date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.trunc() as u64))
}

/// Parse a reserved quantity. Workbooks hand numbers over as floats, so
/// `"2.0"` is accepted; negative or fractional quantities are rejected.
pub fn parse_quantity_safe(s: Option<&str>) -> Option<u64> {
    let s = non_empty(s)?;
    if let Ok(q) = s.parse::<u64>() {
        return Some(q);
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 {
        Some(f as u64)
    } else {
        None
    }
}

/// Parse the invoiced flag. The export writes `Sim`/`Não`.
pub fn parse_invoiced_safe(s: Option<&str>) -> Option<Invoiced> {
    let s = non_empty(s)?.to_lowercase();
    match s.as_str() {
        "sim" | "s" | "yes" | "y" => Some(Invoiced::Yes),
        "não" | "nao" | "n" | "no" => Some(Invoiced::No),
        _ => None,
    }
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    // Day 1 exists in every month, so `with_day(1)` cannot fail.
    date.with_day(1).unwrap_or(date)
}

/// First day of the month `months` calendar months before `today`'s month.
pub fn months_back(today: NaiveDate, months: u32) -> NaiveDate {
    month_start(today)
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

pub fn average(v: &[u64]) -> f64 {
    // Arithmetic mean; returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: u64 = v.iter().sum();
    sum as f64 / v.len() as f64
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals with locale-aware thousands separators (`1,234.50`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_val: u64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = parts.next() {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}
