//! Natural-language fallback for values the cleaner cannot read.

use time::PrimitiveDateTime;

mod openai;

#[cfg(test)]
pub(crate) mod fake;

pub use openai::OpenAiInference;

/// Errors from a single inference call. Callers treat every variant the
/// same way: the field stays unset.
#[derive(thiserror::Error, Debug)]
pub enum InferenceError {
    /// Network connectivity error (DNS, connection refused, etc.).
    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout after {0}ms")]
    Timeout(u64),

    /// Service answered with a non-success status.
    #[error("inference service error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Answer missing, empty or not of the requested shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("model refused: {0}")]
    Refused(String),

    #[error("restoration {restored} falls outside the window after {start}")]
    OutOfWindow { start: String, restored: String },
}

/// Structured-extraction capability used when deterministic parsing fails.
#[async_trait::async_trait]
pub trait Inference: Send + Sync {
    /// Reads a number out of free text. Ranges resolve to their maximum;
    /// `None` means the text says the value is not available.
    async fn resolve_number(&self, raw: &str) -> Result<Option<u64>, InferenceError>;

    /// Combines an `m/d/YY` date and an optional `H:MM a.m.` time.
    async fn resolve_start_datetime(&self, date: &str, time: Option<&str>) -> Result<PrimitiveDateTime, InferenceError>;

    /// Interprets a free-text restoration description relative to the
    /// outage date. `None` when the text is a not-available sentinel.
    async fn resolve_restoration_datetime(
        &self,
        date: &str,
        restoration: &str,
    ) -> Result<Option<PrimitiveDateTime>, InferenceError>;
}
