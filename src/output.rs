use crate::classify::{classify, ColumnGroup};
use crate::error::Result;
use crate::types::{Column, Period, ReportTable, COL_PRODUCT_CODE, COL_PRODUCT_NAME};
use crate::util::format_int;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tabled::{builder::Builder, settings::Style};

/// Write the report as CSV, one header row, columns labelled
/// `<metric> <period>`.
pub fn write_csv(path: &Path, table: &ReportTable) -> Result<()> {
    let wtr = csv::Writer::from_path(path)?;
    write_csv_to(wtr, table)
}

pub fn write_csv_to<W: Write>(mut wtr: csv::Writer<W>, table: &ReportTable) -> Result<()> {
    let columns = table.columns();
    let mut header = vec![COL_PRODUCT_CODE.to_string(), COL_PRODUCT_NAME.to_string()];
    header.extend(columns.iter().map(|c| format!("{} {}", c.metric.label(), c.period)));
    wtr.write_record(&header)?;
    for row in body_rows(table, &columns, |v| v.to_string()) {
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Render the first `max_rows` rows as a markdown table with a two-level
/// header: column group, then month (or metric, under the totals).
pub fn render_preview(table: &ReportTable, max_rows: usize) -> Option<String> {
    if table.is_empty() {
        return None;
    }
    let columns = table.columns();
    let groups: Vec<Option<ColumnGroup>> = columns
        .iter()
        .map(|c| classify(c.metric.label(), &c.period.to_string()))
        .collect();

    let mut builder = Builder::default();
    let mut top = vec![COL_PRODUCT_CODE.to_string(), COL_PRODUCT_NAME.to_string()];
    top.extend(groups.iter().map(|g| g.map(|g| g.label()).unwrap_or_default().to_string()));
    builder.push_record(top);

    let mut second = vec![String::new(), String::new()];
    second.extend(columns.iter().zip(&groups).map(|(c, g)| match (g, c.period) {
        (Some(ColumnGroup::TotalGroup), _) | (_, Period::Total) => c.metric.label().to_string(),
        (_, Period::Month(m)) => m.to_string(),
    }));
    builder.push_record(second);

    let shown = ReportTable {
        months: table.months.clone(),
        rows: table.rows.iter().take(max_rows).cloned().collect(),
    };
    for row in body_rows(&shown, &columns, format_int::<u64>) {
        builder.push_record(row);
    }
    Some(builder.build().with(Style::markdown()).to_string())
}

pub fn preview_report(table: &ReportTable, max_rows: usize) {
    match render_preview(table, max_rows) {
        Some(s) => println!("{}\n", s),
        None => println!("(no rows)\n"),
    }
}

fn body_rows<F>(table: &ReportTable, columns: &[Column], format: F) -> Vec<Vec<String>>
where
    F: Fn(u64) -> String,
{
    table
        .rows
        .iter()
        .map(|row| {
            let mut cells = vec![row.product_code.clone(), row.product_name.clone()];
            cells.extend(columns.iter().map(|c| format(c.value(row))));
            cells
        })
        .collect()
}
