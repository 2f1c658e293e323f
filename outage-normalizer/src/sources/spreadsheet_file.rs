use std::path::PathBuf;

use calamine::{open_workbook_auto, Data, ExcelDateTime, Range, Reader};
use time::{
    format_description::BorrowedFormatItem, macros::format_description, OffsetDateTime, PrimitiveDateTime,
};

use crate::{
    pipeline::{Envelope, EnvelopeStream, Origin, PipelineError, Source},
    transform::clean,
};

use super::row::{ColumnLabels, Field, NormalizedRow};

const CELL_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const CELL_TIME: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]:[second]");

/// Spreadsheet cell as seen by the header/row logic.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    DateTime(PrimitiveDateTime),
}

impl Cell {
    fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Plain-text rendering handed to the record builder. Integral numbers
    /// lose their fractional part so `1200.0` reads as `1200`.
    fn to_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::DateTime(dt) => format!("{} {}", format_date(dt), format_time(dt)),
        }
    }
}

fn format_date(dt: &PrimitiveDateTime) -> String {
    dt.format(CELL_DATE).unwrap_or_else(|_| dt.date().to_string())
}

fn format_time(dt: &PrimitiveDateTime) -> String {
    dt.format(CELL_TIME).unwrap_or_else(|_| dt.time().to_string())
}

/// Calendar value of a date-formatted cell, honoring the workbook's 1900 or
/// 1904 date system. Seconds are rounded to the nearest whole second.
fn excel_datetime(value: &ExcelDateTime) -> Option<PrimitiveDateTime> {
    let naive = value.as_datetime()?;
    let millis = naive.and_utc().timestamp_millis();
    let seconds = millis.div_euclid(1000) + i64::from(millis.rem_euclid(1000) >= 500);
    let utc = OffsetDateTime::from_unix_timestamp(seconds).ok()?;
    Some(PrimitiveDateTime::new(utc.date(), utc.time()))
}

/// `[h]:mm:ss` rendering of a duration-formatted cell.
fn excel_duration_text(value: &ExcelDateTime) -> String {
    let total = (value.as_f64() * 86_400.0).round() as i64;
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    format!("{sign}{}:{:02}:{:02}", total / 3600, total % 3600 / 60, total % 60)
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        // Durations are not calendar dates and must fail the date-row check.
        Data::DateTime(dt) if dt.is_duration() => Cell::Text(excel_duration_text(dt)),
        Data::DateTime(dt) => excel_datetime(dt)
            .map(Cell::DateTime)
            .unwrap_or(Cell::Number(dt.as_f64())),
        Data::DateTimeIso(s) => clean::parse_iso_datetime(s)
            .map(Cell::DateTime)
            .unwrap_or_else(|| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => {
            tracing::debug!(error = %e, "spreadsheet cell holds an error value");
            Cell::Empty
        }
    }
}

/// Lays a worksheet range out in absolute sheet coordinates, so the
/// reference column and row numbers match what a spreadsheet viewer shows.
fn grid_from_range(range: &Range<Data>) -> Vec<Vec<Cell>> {
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut grid: Vec<Vec<Cell>> = (0..start_row).map(|_| Vec::new()).collect();
    for data_row in range.rows() {
        let mut row = vec![Cell::Empty; start_col as usize];
        row.extend(data_row.iter().map(cell_from_data));
        grid.push(row);
    }
    grid
}

/// Turns a raw grid into normalized rows.
///
/// The header is the first row with a non-blank cell in `reference_column`;
/// it and everything above it are discarded. Rows whose date cell is not a
/// native date are skipped.
pub fn rows_from_grid(
    grid: &[Vec<Cell>],
    reference_column: usize,
    period: i32,
    labels: &ColumnLabels,
) -> Result<Vec<Envelope<NormalizedRow>>, PipelineError> {
    let header_idx = grid
        .iter()
        .position(|row| row.get(reference_column).is_some_and(|c| !c.is_blank()))
        .ok_or_else(|| {
            PipelineError::Source(format!(
                "no header row found for {period} (column {reference_column} is empty)"
            ))
        })?;

    let headers: Vec<Option<Field>> = grid[header_idx]
        .iter()
        .map(|c| labels.field_for(&c.to_text()))
        .collect();
    let date_col = headers.iter().position(|f| *f == Some(Field::Date));

    let mut out = Vec::new();
    for (idx, cells) in grid.iter().enumerate().skip(header_idx + 1) {
        let origin = Origin { period, row: idx + 1 };
        metrics::counter!("outage_rows_read_total").increment(1);

        if let Some(col) = date_col {
            let is_date = matches!(cells.get(col), Some(Cell::DateTime(_)));
            if !is_date {
                metrics::counter!("outage_spreadsheet_rows_skipped_total").increment(1);
                if cells.iter().all(Cell::is_blank) {
                    tracing::debug!(%origin, "skipping blank spreadsheet row");
                } else {
                    tracing::warn!(%origin, "skipping spreadsheet row without a valid date");
                }
                continue;
            }
        }

        let mut row = NormalizedRow::new();
        for (field, cell) in headers.iter().zip(cells.iter()) {
            let Some(field) = field else { continue };
            if row.has(*field) {
                continue;
            }
            let value = match (field, cell) {
                (Field::Date, Cell::DateTime(dt)) => format_date(dt),
                (Field::Time, Cell::DateTime(dt)) => format_time(dt),
                (_, cell) => cell.to_text(),
            };
            row.insert(*field, value);
        }
        // Columns past the end of a short row are still present, just empty.
        for field in headers.iter().skip(cells.len()).flatten() {
            if !row.has(*field) {
                row.insert(*field, "");
            }
        }

        out.push(Envelope { payload: row, origin });
    }

    Ok(out)
}

/// Spreadsheet (`.xls`) source for one reporting period. Only the first
/// worksheet is read.
pub struct SpreadsheetFileSource {
    path: PathBuf,
    period: i32,
    labels: ColumnLabels,
    reference_column: usize,
}

impl SpreadsheetFileSource {
    pub fn new<P: Into<PathBuf>>(path: P, period: i32, labels: ColumnLabels, reference_column: usize) -> Self {
        Self {
            path: path.into(),
            period,
            labels,
            reference_column,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load_grid(&self) -> Result<Vec<Vec<Cell>>, PipelineError> {
        let mut workbook = open_workbook_auto(&self.path).map_err(|e| {
            PipelineError::Source(format!("failed to open {}: {e}", self.path.display()))
        })?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| PipelineError::Source(format!("{} has no worksheets", self.path.display())))?
            .map_err(|e| PipelineError::Source(format!("failed to read {}: {e}", self.path.display())))?;

        Ok(grid_from_range(&range))
    }
}

#[async_trait::async_trait]
impl Source<NormalizedRow> for SpreadsheetFileSource {
    async fn stream(&self) -> EnvelopeStream<NormalizedRow> {
        let loaded = self
            .load_grid()
            .and_then(|grid| rows_from_grid(&grid, self.reference_column, self.period, &self.labels));

        tracing::info!(period = self.period, path = %self.path.display(), "reading spreadsheet source");

        let items: Vec<Result<Envelope<NormalizedRow>, PipelineError>> = match loaded {
            Ok(rows) => rows.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        Box::pin(futures::stream::iter(items))
    }
}
