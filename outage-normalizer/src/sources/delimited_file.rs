use std::{fs::File, path::PathBuf};

use csv::StringRecord;

use crate::pipeline::{Envelope, EnvelopeStream, Origin, PipelineError, Source};

use super::row::{ColumnLabels, NormalizedRow};

/// Comma-delimited source for one reporting period.
///
/// The first line is the header; quoted fields may contain commas. Columns
/// are matched against the period's historical labels, everything else is
/// ignored. Short rows are tolerated and simply lack the trailing fields.
pub struct DelimitedFileSource {
    path: PathBuf,
    period: i32,
    labels: ColumnLabels,
}

impl DelimitedFileSource {
    pub fn new<P: Into<PathBuf>>(path: P, period: i32, labels: ColumnLabels) -> Self {
        Self {
            path: path.into(),
            period,
            labels,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

fn record_to_row(record: &StringRecord, headers: &StringRecord, labels: &ColumnLabels) -> NormalizedRow {
    NormalizedRow::from_labeled(
        labels,
        headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header, value.to_string())),
    )
}

#[async_trait::async_trait]
impl Source<NormalizedRow> for DelimitedFileSource {
    async fn stream(&self) -> EnvelopeStream<NormalizedRow> {
        let path = self.path.clone();
        let period = self.period;
        let labels = self.labels.clone();
        let s = async_stream::try_stream! {
            let file = File::open(&path).map_err(|e| {
                PipelineError::Source(format!("failed to open {}: {e}", path.display()))
            })?;
            let mut rdr = csv::ReaderBuilder::new()
                .delimiter(b',')
                .quote(b'"')
                .flexible(true)
                .from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read headers of {}: {e}", path.display())))?
                .clone();

            tracing::info!(period, path = %path.display(), "reading delimited source");

            for (idx, result) in rdr.records().enumerate() {
                let row = result
                    .as_ref()
                    .ok()
                    .and_then(|r| r.position())
                    .map(|p| p.line() as usize)
                    .unwrap_or(idx + 2);
                let origin = Origin { period, row };
                metrics::counter!("outage_rows_read_total").increment(1);

                let record = match result {
                    Ok(record) => record,
                    Err(e) => {
                        Err(PipelineError::Row { origin, reason: format!("unreadable record: {e}") })?
                    }
                };

                yield Envelope {
                    payload: record_to_row(&record, &headers, &labels),
                    origin,
                };
            }
        };

        Box::pin(s)
    }
}
