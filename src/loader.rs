use crate::error::{ReportError, Result};
use crate::types::{RawRow, ReservationRecord, REQUIRED_COLUMNS};
use crate::util::{excel_serial_to_date, non_empty, parse_date_safe, parse_invoiced_safe, parse_quantity_safe};
use calamine::{open_workbook_auto, Data, Reader};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub skipped_rows: usize,
}

/// Load a reservation export, picking the reader from the file extension.
///
/// The first `skip_rows` rows of the sheet are the export's metadata block;
/// the row after them holds the column headers.
pub fn load_reservations(path: &Path, skip_rows: usize) -> Result<(Vec<ReservationRecord>, LoadReport)> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let (records, report) = match ext.as_str() {
        "csv" => load_csv(File::open(path)?, skip_rows)?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => load_workbook(path, skip_rows)?,
        _ => return Err(ReportError::UnsupportedFormat(path.display().to_string())),
    };
    info!(
        path = %path.display(),
        total = report.total_rows,
        loaded = report.loaded_rows,
        skipped = report.skipped_rows,
        "reservation export loaded"
    );
    Ok((records, report))
}

/// Load a CSV export. `skip_rows` counts physical lines, blank ones included,
/// even though the csv reader itself never yields empty lines.
pub fn load_csv<R: Read>(reader: R, skip_rows: usize) -> Result<(Vec<ReservationRecord>, LoadReport)> {
    let mut rdr = ReaderBuilder::new().has_headers(false).flexible(true).from_reader(reader);
    let mut rows = rdr.records().skip_while(|r| match r {
        Ok(record) => record.position().map_or(false, |p| p.line() <= skip_rows as u64),
        Err(_) => false,
    });
    let headers = match rows.next() {
        Some(h) => h?,
        None => return Ok((Vec::new(), LoadReport::default())),
    };
    // Rows are matched by the trimmed names the header check used.
    let headers: StringRecord = headers.iter().map(str::trim).collect();
    header_positions(headers.iter())?;

    let mut cleaner = Cleaner::default();
    for result in rows {
        let raw = result.and_then(|record| record.deserialize::<RawRow>(Some(&headers)));
        match raw {
            Ok(row) => cleaner.push(row),
            Err(e) => {
                debug!(error = %e, "unreadable CSV row");
                cleaner.reject();
            }
        }
    }
    Ok(cleaner.finish())
}

fn load_workbook(path: &Path, skip_rows: usize) -> Result<(Vec<ReservationRecord>, LoadReport)> {
    let mut workbook = open_workbook_auto(path)?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range?,
        None => return Ok((Vec::new(), LoadReport::default())),
    };
    // The range starts at the first used cell, not at the top of the sheet.
    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let mut rows = range.rows().skip(skip_rows.saturating_sub(first_row));

    let Some(header) = rows.next() else {
        return Ok((Vec::new(), LoadReport::default()));
    };
    let header: Vec<String> = header.iter().map(cell_to_string).collect();
    let positions = header_positions(header.iter().map(String::as_str))?;

    let mut cleaner = Cleaner::default();
    for row in rows {
        cleaner.push(raw_row_from_cells(row, &positions));
    }
    Ok(cleaner.finish())
}

/// Index of each required column, in `REQUIRED_COLUMNS` order.
fn header_positions<'a, I>(header: I) -> Result<[usize; 5]>
where
    I: IntoIterator<Item = &'a str>,
{
    let header: Vec<&str> = header.into_iter().map(str::trim).collect();
    let mut positions = [0usize; 5];
    for (slot, name) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = header
            .iter()
            .position(|h| *h == name)
            .ok_or(ReportError::MissingColumn(name))?;
    }
    Ok(positions)
}

fn raw_row_from_cells(cells: &[Data], positions: &[usize; 5]) -> RawRow {
    let get = |i: usize| cells.get(positions[i]).map(cell_to_string);
    RawRow {
        creation_date: get(0),
        product_code: get(1),
        product_name: get(2),
        quantity: get(3),
        invoiced: get(4),
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(v) => v.clone(),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(v) => excel_serial_to_date(v.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(v) => v.clone(),
        Data::DurationIso(v) => v.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

/// Turn a raw row into a typed record; `None` when a required field is
/// missing or cannot be parsed.
pub fn clean_row(row: &RawRow) -> Option<ReservationRecord> {
    Some(ReservationRecord {
        creation_date: parse_date_safe(row.creation_date.as_deref())?,
        product_code: non_empty(row.product_code.as_deref())?.to_string(),
        product_name: non_empty(row.product_name.as_deref())?.to_string(),
        quantity: parse_quantity_safe(row.quantity.as_deref())?,
        invoiced: parse_invoiced_safe(row.invoiced.as_deref())?,
    })
}

#[derive(Default)]
struct Cleaner {
    records: Vec<ReservationRecord>,
    report: LoadReport,
}

impl Cleaner {
    fn push(&mut self, row: RawRow) {
        // Exports end with a few empty rows.
        if row.is_blank() {
            return;
        }
        self.report.total_rows += 1;
        match clean_row(&row) {
            Some(record) => self.records.push(record),
            None => {
                debug!(?row, "skipping reservation row with missing or invalid fields");
                self.report.skipped_rows += 1;
            }
        }
    }

    fn reject(&mut self) {
        self.report.total_rows += 1;
        self.report.skipped_rows += 1;
    }

    fn finish(mut self) -> (Vec<ReservationRecord>, LoadReport) {
        self.report.loaded_rows = self.records.len();
        if self.report.skipped_rows > 0 {
            warn!(skipped = self.report.skipped_rows, "some reservation rows were skipped");
        }
        (self.records, self.report)
    }
}
