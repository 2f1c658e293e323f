use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use time::PrimitiveDateTime;

use super::{Inference, InferenceError};
use crate::transform::clean;

/// Answers from fixed tables; anything not in a table fails.
#[derive(Default)]
pub struct ScriptedInference {
    pub numbers: HashMap<String, Option<u64>>,
    pub starts: HashMap<String, PrimitiveDateTime>,
    pub restorations: HashMap<String, PrimitiveDateTime>,
    pub calls: AtomicUsize,
}

impl ScriptedInference {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn miss(what: &str) -> InferenceError {
        InferenceError::InvalidResponse(format!("no scripted answer for {what:?}"))
    }
}

#[async_trait::async_trait]
impl Inference for ScriptedInference {
    async fn resolve_number(&self, raw: &str) -> Result<Option<u64>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.numbers.get(raw).copied().ok_or_else(|| Self::miss(raw))
    }

    async fn resolve_start_datetime(&self, date: &str, _time: Option<&str>) -> Result<PrimitiveDateTime, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.starts.get(date).copied().ok_or_else(|| Self::miss(date))
    }

    async fn resolve_restoration_datetime(
        &self,
        _date: &str,
        restoration: &str,
    ) -> Result<Option<PrimitiveDateTime>, InferenceError> {
        if clean::is_not_available(restoration) {
            return Ok(None);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.restorations
            .get(restoration)
            .copied()
            .map(Some)
            .ok_or_else(|| Self::miss(restoration))
    }
}
