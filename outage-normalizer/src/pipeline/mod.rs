use std::{fmt, path::PathBuf, pin::Pin, sync::Arc};

use futures::{stream, Stream, StreamExt};
use outage_model::domain::OutageEvent;

use crate::{sources::NormalizedRow, transform::Augmenter};

/// Where a row came from: reporting year plus 1-based row within its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub period: i32,
    pub row: usize,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.period, self.row)
    }
}

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub origin: Origin,
}

impl<T> Envelope<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            payload: f(self.payload),
            origin: self.origin,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("no source file found for {period} (looked for {candidates:?})")]
    MissingSource {
        period: i32,
        candidates: Vec<PathBuf>,
    },
    #[error("source error: {0}")]
    Source(String),
    #[error("row {origin} dropped: {reason}")]
    Row { origin: Origin, reason: String },
    #[error("sink error: {0}")]
    Sink(String),
}

impl PipelineError {
    /// Row-scoped failures drop a single record; everything else ends the run.
    pub fn is_row_scoped(&self) -> bool {
        matches!(self, Self::Row { .. })
    }
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> EnvelopeStream<T>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

/// Batch normalization run: every source, then the builder, then the
/// augmenter, then the sink. Each stage sees the complete output of the
/// previous one.
pub struct Pipeline<S, K> {
    pub sources: Vec<S>,
    pub builder: Arc<dyn Transform<NormalizedRow, OutageEvent> + Send + Sync>,
    pub augmenter: Augmenter,
    pub sink: K,
}

impl<S, K> Pipeline<S, K>
where
    S: Source<NormalizedRow> + Send + Sync + 'static,
    K: Sink<OutageEvent> + Send + Sync + 'static,
{
    /// Runs the pipeline and returns the records handed to the sink.
    pub async fn run(self) -> Result<Vec<Envelope<OutageEvent>>, PipelineError> {
        let mut built = Vec::new();
        let mut dropped = 0usize;

        for source in &self.sources {
            let mut rows = source.stream().await;
            while let Some(item) = rows.next().await {
                let result = match item {
                    Ok(env) => self.builder.apply(env).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(env) => built.push(env),
                    Err(e) if e.is_row_scoped() => {
                        dropped += 1;
                        metrics::counter!("outage_rows_dropped_total").increment(1);
                        tracing::warn!(error = %e, "dropping row");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        tracing::info!(records = built.len(), dropped, "records built");

        let augmented = self.augmenter.augment(built).await;

        let output = stream::iter(augmented.clone().into_iter().map(Ok));
        self.sink.run(output).await?;

        Ok(augmented)
    }
}
