// Entry point and high-level CLI flow.
//
// - `--batch` loads the export, generates the report once and exits.
// - Otherwise an interactive menu loads the export once per session and
//   re-runs the whole pipeline each time a report is generated, so changing
//   the filters never touches the loaded records.
mod classify;
mod config;
mod error;
mod loader;
mod output;
mod reports;
mod types;
mod util;

use chrono::{Local, NaiveDate};
use clap::Parser;
use config::{InvoicingFilter, ReportConfig, DEFAULT_SKIP_ROWS, DEFAULT_WINDOW_MONTHS};
use error::Result;
use once_cell::unsync::OnceCell;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::time::ChronoLocal;
use types::ReservationRecord;

#[derive(Parser, Debug)]
#[command(name = "pharmacy_reservations", version, about = "Monthly reservation report per product")]
struct Cli {
    /// Reservation export (.xlsx, .xls, .ods or .csv)
    #[arg(short = 'i', long = "input", default_value = "reservas.xlsx")]
    input: PathBuf,

    /// Analysis window in whole months before the current month
    #[arg(short = 'm', long = "months", default_value_t = DEFAULT_WINDOW_MONTHS, allow_hyphen_values = true)]
    months: i64,

    /// Keep all reservations, only invoiced ones, or only non-invoiced ones
    #[arg(long = "invoiced", value_enum, default_value_t = InvoicingFilter::All)]
    invoiced: InvoicingFilter,

    /// Minimum total reservations for a product to be listed
    #[arg(long = "min-reservations")]
    min_reservations: Option<i64>,

    /// Maximum total reservations for a product to be listed
    #[arg(long = "max-reservations")]
    max_reservations: Option<i64>,

    /// Reference date for the current month (YYYY-MM-DD), defaults to today
    #[arg(long = "today", value_parser = parse_today)]
    today: Option<NaiveDate>,

    /// Metadata rows before the header row of the export
    #[arg(long = "skip-rows", default_value_t = DEFAULT_SKIP_ROWS)]
    skip_rows: usize,

    /// Directory for the CSV report and the JSON summary
    #[arg(short = 'o', long = "out-dir", default_value = ".")]
    out_dir: PathBuf,

    /// Rows shown in the console preview
    #[arg(long = "preview-rows", default_value_t = 10)]
    preview_rows: usize,

    /// Generate the report once and exit
    #[arg(long = "batch")]
    batch: bool,

    /// Debug logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn parse_today(s: &str) -> std::result::Result<NaiveDate, String> {
    util::parse_date_safe(Some(s)).ok_or_else(|| format!("invalid date '{}'", s))
}

/// Records of the current export, loaded on first use and never modified.
struct Session {
    input: PathBuf,
    skip_rows: usize,
    records: OnceCell<Vec<ReservationRecord>>,
    config: ReportConfig,
    out_dir: PathBuf,
    preview_rows: usize,
}

impl Session {
    fn records(&self) -> Result<&[ReservationRecord]> {
        let records = self.records.get_or_try_init(|| {
            let (records, report) = loader::load_reservations(&self.input, self.skip_rows)?;
            println!(
                "Processing export... ({} rows read, {} reservations loaded)",
                util::format_int(report.total_rows),
                util::format_int(report.loaded_rows)
            );
            if report.skipped_rows > 0 {
                println!(
                    "Note: {} rows skipped due to missing or invalid fields.",
                    util::format_int(report.skipped_rows)
                );
            }
            println!();
            Ok::<_, error::ReportError>(records)
        })?;
        Ok(records.as_slice())
    }

    fn reload(&mut self, input: PathBuf) {
        self.input = input;
        self.records = OnceCell::new();
    }
}

/// Read a single trimmed line after printing `prompt`. `None` once stdin is
/// closed or unreadable.
fn read_line(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    read_answer(&mut io::stdin().lock())
}

fn read_answer<R: BufRead>(input: &mut R) -> Option<String> {
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

/// Ask for a number, keeping `current` when the answer is empty or input ends.
fn prompt_number(prompt: &str, current: Option<i64>) -> Option<i64> {
    loop {
        let shown = current.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
        let Some(answer) = read_line(&format!("{} [{}]: ", prompt, shown)) else {
            return current;
        };
        if answer.is_empty() {
            return current;
        }
        if answer == "-" {
            return None;
        }
        match answer.parse::<i64>() {
            Ok(v) => return Some(v),
            Err(_) => println!("Please enter a whole number."),
        }
    }
}

fn prompt_back_to_menu() -> bool {
    loop {
        let Some(answer) = read_line("Back to menu (Y/N): ") else {
            return false;
        };
        match answer.to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Option [1]: (re)load the export.
fn handle_load(session: &mut Session) {
    let Some(answer) = read_line(&format!("Export file [{}]: ", session.input.display())) else {
        return;
    };
    let input = if answer.is_empty() { session.input.clone() } else { PathBuf::from(answer) };
    session.reload(input);
    if let Err(e) = session.records() {
        error!(error = %e, "failed to load reservation export");
        eprintln!("Failed to load file: {}\n", e);
    }
}

/// Option [3]: change window, invoicing filter and reservation range.
fn handle_adjust(session: &mut Session) {
    let cfg = &mut session.config;
    if let Some(m) = prompt_number("Analysis window in months", Some(cfg.window_months)) {
        cfg.window_months = m;
    }

    let current = match cfg.invoicing {
        InvoicingFilter::All => "all",
        InvoicingFilter::InvoicedOnly => "yes",
        InvoicingFilter::NotInvoicedOnly => "no",
    };
    loop {
        let Some(answer) = read_line(&format!("Invoiced filter (all/yes/no) [{}]: ", current)) else {
            break;
        };
        let answer = answer.to_lowercase();
        cfg.invoicing = match answer.as_str() {
            "" => break,
            "all" => InvoicingFilter::All,
            "yes" | "sim" => InvoicingFilter::InvoicedOnly,
            "no" | "não" | "nao" => InvoicingFilter::NotInvoicedOnly,
            _ => {
                println!("Invalid choice. Please enter all, yes or no.");
                continue;
            }
        };
        break;
    }

    // Offer the bounds of the unfiltered table as the defaults.
    let hint = session.records().ok().and_then(|records| {
        let unbounded = ReportConfig { popularity: None, ..session.config.clone() };
        reports::run_pipeline(records, &unbounded).ok()?.natural_range
    });
    if let Some(range) = hint {
        println!("Products in this window have between {} and {} reservations (use '-' to clear a bound).", range.min, range.max);
    }
    let (min, max) = session.config.popularity.unzip();
    let min = prompt_number("Minimum reservations", min.or(hint.map(|r| r.min as i64)));
    let max = prompt_number("Maximum reservations", max.or(hint.map(|r| r.max as i64)));
    session.config.popularity = match (min, max) {
        (None, None) => None,
        (min, max) => Some((min.unwrap_or(0), max.unwrap_or(i64::MAX))),
    };
    if let Err(e) = session.config.validate() {
        println!("Warning: {}. Fix it before generating the report.", e);
    }
    println!();
}

/// Option [2]: run the pipeline, preview the table and write the exports.
fn handle_generate(session: &Session) -> Result<()> {
    let records = session.records()?;
    let outcome = reports::run_pipeline(records, &session.config)?;
    let cfg = &session.config;

    println!("Reservations per product");
    println!(
        "(Since {}, invoiced: {}, {} months)\n",
        outcome.window_start.format("%Y-%m-%d"),
        cfg.invoicing.label(),
        util::format_int(cfg.window_months)
    );
    for w in &outcome.warnings {
        println!("Note: {}.", w);
    }
    if let Some(range) = outcome.natural_range {
        println!("Reservation range in this window: {} to {}", range.min, range.max);
    }
    output::preview_report(&outcome.table, session.preview_rows);
    println!("How to read the table:");
    println!("- Reservations: how often a product was requested. 2 units in the same request count as 1 reservation.");
    println!("- Units: total packages requested. 2 units in the same request count as 2 units.");
    println!("Many reservations with few units suggests spread-out demand; few reservations with many units");
    println!("points to a small number of high-volume customers.\n");

    std::fs::create_dir_all(&session.out_dir)?;
    let report_path = session.out_dir.join("reservations_report.csv");
    output::write_csv(&report_path, &outcome.table)?;
    println!("(Full table exported to {})\n", report_path.display());

    let insights = reports::generate_insights(&outcome.table, outcome.window_start);
    let summary_path = session.out_dir.join("summary.json");
    output::write_json(&summary_path, &insights)?;
    info!(
        products = insights.total_products,
        months = insights.months.len(),
        report = %report_path.display(),
        summary = %summary_path.display(),
        "report written"
    );

    if let Some(top) = &insights.top_by_reservations {
        println!("Most reserved product (reservations): {} {} ({})", top.product_code, top.product_name, top.value);
    }
    if let Some(top) = &insights.top_by_units {
        println!("Most reserved product (units): {} {} ({})", top.product_code, top.product_name, top.value);
    }
    println!(
        "Average reservations per product: {}",
        util::format_number(insights.avg_reservations_per_product, 2)
    );
    println!(
        "Average units per product: {}\n",
        util::format_number(insights.avg_units_per_product, 2)
    );
    Ok(())
}

fn init_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());
    let popularity = match (cli.min_reservations, cli.max_reservations) {
        (None, None) => None,
        (min, max) => Some((min.unwrap_or(0), max.unwrap_or(i64::MAX))),
    };
    let mut session = Session {
        input: cli.input,
        skip_rows: cli.skip_rows,
        records: OnceCell::new(),
        config: ReportConfig {
            window_months: cli.months,
            invoicing: cli.invoiced,
            popularity,
            ..ReportConfig::new(today)
        },
        out_dir: cli.out_dir,
        preview_rows: cli.preview_rows,
    };

    if cli.batch {
        if let Err(e) = handle_generate(&session) {
            error!(error = %e, "report generation failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    loop {
        println!("Reservation Report:");
        println!("[1] Load the file");
        println!("[2] Generate report");
        println!("[3] Adjust filters\n");
        let Some(choice) = read_line("Enter choice: ") else {
            println!("\nExiting the program.");
            break;
        };
        match choice.as_str() {
            "1" => handle_load(&mut session),
            "2" => {
                println!();
                if let Err(e) = handle_generate(&session) {
                    eprintln!("Error: {}\n", e);
                }
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            "3" => handle_adjust(&mut session),
            _ => println!("Invalid choice. Please enter 1, 2 or 3.\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn closed_input_ends_prompting() {
        let mut input = Cursor::new("  2 \n\n");
        assert_eq!(read_answer(&mut input), Some("2".to_string()));
        assert_eq!(read_answer(&mut input), Some(String::new()));
        assert_eq!(read_answer(&mut input), None);
        assert_eq!(read_answer(&mut input), None);
    }
}
