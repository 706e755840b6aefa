// Column classification for presentation.
//
// Each rendered data column is identified by its metric label and its
// period label (a month or the total marker). The tag only decides how a
// front end groups or colours the column; it never touches the numbers.

use crate::types::Metric;

pub const TOTAL_MARKER: &str = "Total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnGroup {
    CountGroup,
    UnitsGroup,
    TotalGroup,
}

impl ColumnGroup {
    pub fn label(&self) -> &'static str {
        match self {
            ColumnGroup::CountGroup => Metric::Reservations.label(),
            ColumnGroup::UnitsGroup => Metric::Units.label(),
            ColumnGroup::TotalGroup => TOTAL_MARKER,
        }
    }
}

/// Tag a column by `(metric, period)`. Columns whose metric is not a known
/// one, such as the product key columns, get `None` and are left unstyled.
pub fn classify(metric: &str, period: &str) -> Option<ColumnGroup> {
    let group = if metric == TOTAL_MARKER {
        ColumnGroup::TotalGroup
    } else if metric == Metric::Reservations.label() {
        ColumnGroup::CountGroup
    } else if metric == Metric::Units.label() {
        ColumnGroup::UnitsGroup
    } else {
        return None;
    };
    if period == TOTAL_MARKER {
        Some(ColumnGroup::TotalGroup)
    } else {
        Some(group)
    }
}
