use std::{
    ops::Range,
    path::{Path, PathBuf},
};

use crate::pipeline::{EnvelopeStream, PipelineError, Source};

use super::{
    delimited_file::DelimitedFileSource,
    row::{ColumnLabels, NormalizedRow},
    spreadsheet_file::SpreadsheetFileSource,
};

pub const SPREADSHEET_SUFFIX: &str = "_Annual_Summary.xls";
pub const DELIMITED_SUFFIX: &str = "_Annual_Summary_Converted.csv";

/// The source chosen for one reporting period.
pub enum PeriodSource {
    Spreadsheet(SpreadsheetFileSource),
    Delimited(DelimitedFileSource),
}

impl PeriodSource {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Spreadsheet(s) => s.path(),
            Self::Delimited(s) => s.path(),
        }
    }
}

#[async_trait::async_trait]
impl Source<NormalizedRow> for PeriodSource {
    async fn stream(&self) -> EnvelopeStream<NormalizedRow> {
        match self {
            Self::Spreadsheet(s) => s.stream().await,
            Self::Delimited(s) => s.stream().await,
        }
    }
}

pub fn spreadsheet_path(dir: &Path, period: i32) -> PathBuf {
    dir.join(format!("{period}{SPREADSHEET_SUFFIX}"))
}

pub fn delimited_path(dir: &Path, period: i32) -> PathBuf {
    dir.join(format!("{period}{DELIMITED_SUFFIX}"))
}

/// Picks a source for every period in `periods`, spreadsheet first.
///
/// Fails on the first period with neither file; nothing is read until every
/// period has a source.
pub fn discover<F>(
    original_dir: &Path,
    periods: Range<i32>,
    reference_column: usize,
    labels_for: F,
) -> Result<Vec<PeriodSource>, PipelineError>
where
    F: Fn(i32) -> ColumnLabels,
{
    let mut sources = Vec::new();

    for period in periods {
        let xls = spreadsheet_path(original_dir, period);
        let csv = delimited_path(original_dir, period);

        let source = if xls.is_file() {
            PeriodSource::Spreadsheet(SpreadsheetFileSource::new(xls, period, labels_for(period), reference_column))
        } else if csv.is_file() {
            PeriodSource::Delimited(DelimitedFileSource::new(csv, period, labels_for(period)))
        } else {
            return Err(PipelineError::MissingSource {
                period,
                candidates: vec![xls, csv],
            });
        };

        tracing::info!(period, path = %source.path().display(), "source selected");
        sources.push(source);
    }

    Ok(sources)
}
