use std::{
    fs,
    path::{Path, PathBuf},
};

use csv::{QuoteStyle, WriterBuilder};
use futures::StreamExt;
use outage_model::domain::{OutageEvent, FIELD_NAMES};

use crate::pipeline::{Envelope, PipelineError, Sink};

pub const NORMALIZED_SUFFIX: &str = "_Normalized";

/// `<dir>/<start>_Normalized-<stop>_Normalized.csv`
pub fn output_path(dir: &Path, start_year: i32, stop_year: i32) -> PathBuf {
    dir.join(format!("{start_year}{NORMALIZED_SUFFIX}-{stop_year}{NORMALIZED_SUFFIX}.csv"))
}

/// Writes the normalized record set as CSV, one row per record, header in
/// `OutageEvent` field order. Fields are quoted only when needed.
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl Sink<OutageEvent> for CsvFileSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<OutageEvent>, PipelineError>> + Send + Unpin + 'static,
    {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                PipelineError::Sink(format!("failed to create {}: {e}", dir.display()))
            })?;
        }

        let mut wtr = WriterBuilder::new()
            .has_headers(false)
            .quote_style(QuoteStyle::Necessary)
            .from_path(&self.path)
            .map_err(|e| PipelineError::Sink(format!("failed to create {}: {e}", self.path.display())))?;

        wtr.write_record(FIELD_NAMES)
            .map_err(|e| PipelineError::Sink(format!("failed to write header: {e}")))?;

        let mut written = 0u64;
        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for CsvFileSink");
                    continue;
                }
            };

            wtr.serialize(&env.payload).map_err(|e| {
                PipelineError::Sink(format!("failed to write record {}: {e}", env.origin))
            })?;
            written += 1;
        }

        wtr.flush()
            .map_err(|e| PipelineError::Sink(format!("failed to flush {}: {e}", self.path.display())))?;

        metrics::counter!("outage_events_written_total").increment(written);
        tracing::info!(records = written, path = %self.path.display(), "normalized output written");
        Ok(())
    }
}
