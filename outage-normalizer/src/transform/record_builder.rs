use std::sync::Arc;

use once_cell::sync::Lazy;
use outage_model::domain::OutageEvent;
use regex::Regex;

use crate::{
    inference::Inference,
    pipeline::{Envelope, Origin, PipelineError, Transform},
    sources::{Field, NormalizedRow},
};

use super::clean::{self, Outcome};

// Region codes are 2-6 uppercase letters in a trailing parenthetical.
static TRAILING_REGION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([A-Z]{2,6})\)$").expect("valid regex"));

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing column '{0}'")]
    MissingColumn(Field),
    #[error("invalid {field}: {reason}")]
    InvalidValue { field: Field, reason: String },
}

fn optional_text(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn required_text(row: &NormalizedRow, field: Field) -> Result<String, BuildError> {
    let value = row.get(field).ok_or(BuildError::MissingColumn(field))?;
    optional_text(Some(value)).ok_or_else(|| BuildError::InvalidValue {
        field,
        reason: "value is empty".to_string(),
    })
}

/// Splits a trailing `(CODE)` off a utility name.
///
/// Returns `(utility_name, region)`; the name is untouched when there is no
/// well-formed code.
pub fn split_region(utility_name: &str) -> (String, Option<String>) {
    let trimmed = utility_name.trim();
    if !trimmed.ends_with(')') {
        return (trimmed.to_string(), None);
    }
    match TRAILING_REGION_RE.captures(trimmed) {
        Some(c) => {
            let start = c.get(0).map(|m| m.start()).unwrap_or(trimmed.len());
            (trimmed[..start].trim_end().to_string(), Some(c[1].to_string()))
        }
        None => (trimmed.to_string(), None),
    }
}

/// Builds one `OutageEvent` per normalized row.
///
/// Numeric fields go through the cleaner first; the inference service is
/// only asked when the cleaner finds the value ambiguous, and a failed
/// answer leaves the field unset.
pub struct RecordBuilder {
    inference: Arc<dyn Inference>,
}

impl RecordBuilder {
    pub fn new(inference: Arc<dyn Inference>) -> Self {
        Self { inference }
    }

    async fn resolve_number(&self, origin: Origin, field: Field, raw: Option<&str>) -> Option<u64> {
        let raw = raw?;
        match clean::clean_number(raw) {
            Outcome::Resolved(value) => value,
            Outcome::Ambiguous => {
                metrics::counter!("outage_inference_fallback_total", "field" => field.name()).increment(1);
                tracing::warn!(%origin, %field, raw, "ambiguous number, asking inference service");
                match self.inference.resolve_number(raw).await {
                    Ok(value) => value,
                    Err(e) => {
                        metrics::counter!("outage_inference_failures_total", "field" => field.name()).increment(1);
                        tracing::error!(%origin, %field, error = %e, "failed to resolve number, leaving unset");
                        None
                    }
                }
            }
        }
    }

    /// Builds the record, or explains why the row cannot become one.
    pub async fn build(&self, origin: Origin, row: &NormalizedRow) -> Result<OutageEvent, BuildError> {
        let date = required_text(row, Field::Date)?;
        let outage_type = required_text(row, Field::OutageType)?;

        let (region, utility_name) = if row.has(Field::Region) {
            (
                optional_text(row.get(Field::Region)),
                optional_text(row.get(Field::UtilityName)),
            )
        } else {
            match optional_text(row.get(Field::UtilityName)) {
                Some(name) => {
                    let (name, region) = split_region(&name);
                    (region, Some(name))
                }
                None => (None, None),
            }
        };

        let customers_affected = self
            .resolve_number(origin, Field::CustomersAffected, row.get(Field::CustomersAffected))
            .await;
        let demand_loss_mw = self
            .resolve_number(origin, Field::DemandLossMw, row.get(Field::DemandLossMw))
            .await;

        Ok(OutageEvent {
            time: optional_text(row.get(Field::Time)),
            restoration_time: optional_text(row.get(Field::RestorationTime)),
            region,
            area_affected: optional_text(row.get(Field::AreaAffected)),
            utility_name,
            demand_loss_mw,
            customers_affected,
            ..OutageEvent::new(date, outage_type)
        })
    }
}

#[async_trait::async_trait]
impl Transform<NormalizedRow, OutageEvent> for RecordBuilder {
    async fn apply(&self, input: Envelope<NormalizedRow>) -> Result<Envelope<OutageEvent>, PipelineError> {
        let origin = input.origin;
        match self.build(origin, &input.payload).await {
            Ok(event) => {
                tracing::debug!(%origin, "row built");
                Ok(input.map(|_| event))
            }
            Err(e) => Err(PipelineError::Row {
                origin,
                reason: format!("{e}; row {}", input.payload),
            }),
        }
    }
}
