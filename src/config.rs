use crate::error::ConfigError;
use crate::types::Invoiced;
use chrono::NaiveDate;
use clap::ValueEnum;

pub const DEFAULT_WINDOW_MONTHS: i64 = 3;
/// Metadata rows preceding the header row in the reservation export.
pub const DEFAULT_SKIP_ROWS: usize = 17;

/// Which reservations to keep according to their invoiced flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum InvoicingFilter {
    #[default]
    All,
    #[value(name = "yes")]
    InvoicedOnly,
    #[value(name = "no")]
    NotInvoicedOnly,
}

impl InvoicingFilter {
    pub fn accepts(&self, invoiced: Invoiced) -> bool {
        match self {
            InvoicingFilter::All => true,
            InvoicingFilter::InvoicedOnly => invoiced == Invoiced::Yes,
            InvoicingFilter::NotInvoicedOnly => invoiced == Invoiced::No,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InvoicingFilter::All => "all",
            InvoicingFilter::InvoicedOnly => "invoiced only",
            InvoicingFilter::NotInvoicedOnly => "not invoiced only",
        }
    }
}

/// Inclusive bounds on a product's total reservation count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopularityRange {
    pub min: u64,
    pub max: u64,
}

impl PopularityRange {
    pub fn contains(&self, count: u64) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

/// Everything one pipeline run depends on besides the records themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    pub window_months: i64,
    pub invoicing: InvoicingFilter,
    pub popularity: Option<(i64, i64)>,
    /// The current month is taken from this date.
    pub today: NaiveDate,
}

/// `ReportConfig` after validation, as consumed by the pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidConfig {
    pub window_months: u32,
    pub invoicing: InvoicingFilter,
    pub popularity: Option<PopularityRange>,
    pub today: NaiveDate,
}

impl ReportConfig {
    pub fn new(today: NaiveDate) -> Self {
        ReportConfig {
            window_months: DEFAULT_WINDOW_MONTHS,
            invoicing: InvoicingFilter::All,
            popularity: None,
            today,
        }
    }

    pub fn validate(&self) -> Result<ValidConfig, ConfigError> {
        if self.window_months < 1 {
            return Err(ConfigError::InvalidWindow(self.window_months));
        }
        let window_months = u32::try_from(self.window_months)
            .map_err(|_| ConfigError::WindowTooLarge(self.window_months))?;

        let popularity = match self.popularity {
            None => None,
            Some((min, max)) if min > max => return Err(ConfigError::InvalidBounds { min, max }),
            // Totals are never negative, so a negative bound behaves like zero.
            Some((min, max)) => Some(PopularityRange {
                min: min.max(0) as u64,
                max: max.max(0) as u64,
            }),
        };

        Ok(ValidConfig {
            window_months,
            invoicing: self.invoicing,
            popularity,
            today: self.today,
        })
    }
}
