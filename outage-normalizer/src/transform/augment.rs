use std::sync::Arc;

use futures::{stream, StreamExt};
use outage_model::domain::OutageEvent;

use crate::{inference::Inference, pipeline::Envelope};

use super::clean::{self, Outcome};

/// Fills in start, restoration and duration for a built record set.
///
/// Each phase runs every record concurrently, at most `max_in_flight`
/// inference calls at a time. Every in-flight future owns exactly one
/// record and hands it back, so a failure only affects its own record and
/// the output has one entry per input. A phase finishes for all records
/// before the next one starts.
pub struct Augmenter {
    inference: Arc<dyn Inference>,
    max_in_flight: usize,
}

impl Augmenter {
    pub fn new(inference: Arc<dyn Inference>, max_in_flight: usize) -> Self {
        Self {
            inference,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub async fn augment(&self, events: Vec<Envelope<OutageEvent>>) -> Vec<Envelope<OutageEvent>> {
        let total = events.len();
        tracing::info!(records = total, max_in_flight = self.max_in_flight, "augmenting start datetimes");
        let events: Vec<_> = stream::iter(events)
            .map(|env| self.add_start_datetime(env))
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        tracing::info!(records = total, "augmenting restoration datetimes");
        let events: Vec<_> = stream::iter(events)
            .map(|env| self.add_restored_datetime(env))
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        events.into_iter().map(add_duration).collect()
    }

    async fn add_start_datetime(&self, mut env: Envelope<OutageEvent>) -> Envelope<OutageEvent> {
        let origin = env.origin;
        let ev = &mut env.payload;

        match clean::parse_start_datetime(&ev.date, ev.time.as_deref()) {
            Outcome::Resolved(dt) => ev.start_datetime = Some(dt),
            Outcome::Ambiguous => {
                metrics::counter!("outage_inference_fallback_total", "field" => "start_datetime").increment(1);
                match self.inference.resolve_start_datetime(&ev.date, ev.time.as_deref()).await {
                    Ok(dt) => {
                        tracing::info!(%origin, start = %dt, "start datetime resolved by inference");
                        ev.start_datetime = Some(dt);
                    }
                    Err(e) => {
                        metrics::counter!("outage_inference_failures_total", "field" => "start_datetime").increment(1);
                        tracing::error!(
                            %origin,
                            date = %ev.date,
                            time = ?ev.time,
                            error = %e,
                            "failed to add start datetime"
                        );
                    }
                }
            }
        }

        env
    }

    async fn add_restored_datetime(&self, mut env: Envelope<OutageEvent>) -> Envelope<OutageEvent> {
        let origin = env.origin;
        let ev = &mut env.payload;

        let text = match ev.restoration_time.as_deref() {
            Some(t) if !clean::is_not_available(t) => t.to_string(),
            _ => {
                tracing::debug!(%origin, "no restoration time provided");
                return env;
            }
        };

        match clean::parse_restoration_datetime(&ev.date, Some(&text)) {
            Outcome::Resolved(dt) => ev.restored_datetime = dt,
            Outcome::Ambiguous => {
                metrics::counter!("outage_inference_fallback_total", "field" => "restored_datetime").increment(1);
                match self.inference.resolve_restoration_datetime(&ev.date, &text).await {
                    Ok(dt) => ev.restored_datetime = dt,
                    Err(e) => {
                        metrics::counter!("outage_inference_failures_total", "field" => "restored_datetime")
                            .increment(1);
                        tracing::error!(
                            %origin,
                            date = %ev.date,
                            restoration = %text,
                            error = %e,
                            "failed to add restored datetime"
                        );
                    }
                }
            }
        }

        env
    }
}

fn add_duration(mut env: Envelope<OutageEvent>) -> Envelope<OutageEvent> {
    let ev = &mut env.payload;
    if let (Some(start), Some(restored)) = (ev.start_datetime, ev.restored_datetime) {
        let minutes = clean::duration_minutes(start, restored);
        if minutes < 0 {
            metrics::counter!("outage_negative_duration_total").increment(1);
            tracing::warn!(origin = %env.origin, %start, %restored, minutes, "restoration precedes start");
        }
        ev.duration_minutes = Some(minutes);
    }
    env
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::{inference::fake::ScriptedInference, pipeline::Origin};

    fn envelope(row: usize, ev: OutageEvent) -> Envelope<OutageEvent> {
        Envelope {
            payload: ev,
            origin: Origin { period: 2002, row },
        }
    }

    fn event(date: &str, time: Option<&str>, restoration: Option<&str>) -> OutageEvent {
        OutageEvent {
            time: time.map(str::to_string),
            restoration_time: restoration.map(str::to_string),
            ..OutageEvent::new(date, "Storm")
        }
    }

    #[tokio::test]
    async fn deterministic_values_skip_inference() {
        let fake = Arc::new(ScriptedInference::default());
        let augmenter = Augmenter::new(fake.clone(), 4);

        let out = augmenter
            .augment(vec![envelope(
                2,
                event("6/1/02", Some("10:00 p.m."), Some("6:00 a.m. June 2")),
            )])
            .await;

        assert_eq!(out.len(), 1);
        let ev = &out[0].payload;
        assert_eq!(ev.start_datetime, Some(datetime!(2002-06-01 22:00:00)));
        assert_eq!(ev.restored_datetime, Some(datetime!(2002-06-02 06:00:00)));
        assert_eq!(ev.duration_minutes, Some(480));
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn sentinel_restoration_is_never_sent() {
        let fake = Arc::new(ScriptedInference::default());
        let augmenter = Augmenter::new(fake.clone(), 4);

        let out = augmenter
            .augment(vec![
                envelope(2, event("6/1/02", None, Some("N/A"))),
                envelope(3, event("6/1/02", None, None)),
            ])
            .await;

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.payload.restored_datetime.is_none()));
        assert!(out.iter().all(|e| e.payload.duration_minutes.is_none()));
        assert!(out.iter().all(|e| e.payload.start_datetime.is_some()));
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn failures_are_isolated_per_record() {
        const N: usize = 20;
        let mut fake = ScriptedInference::default();
        let mut events = Vec::new();
        let mut failing = 0;

        for i in 0..N {
            let date = format!("early June, record {i}");
            if i % 3 == 0 {
                failing += 1;
            } else {
                fake.starts.insert(date.clone(), datetime!(2002-06-01 00:00:00));
            }
            events.push(envelope(i + 2, event(&date, None, None)));
        }

        let fake = Arc::new(fake);
        let augmenter = Augmenter::new(fake.clone(), 3);
        let out = augmenter.augment(events).await;

        assert_eq!(out.len(), N);
        let unset: Vec<_> = out.iter().filter(|e| e.payload.start_datetime.is_none()).collect();
        assert_eq!(unset.len(), failing);
        for env in &out {
            let i = env.origin.row - 2;
            assert_eq!(env.payload.start_datetime.is_none(), i % 3 == 0, "record {i}");
        }
        assert_eq!(fake.calls(), N);
    }

    #[tokio::test]
    async fn ambiguous_restoration_uses_inference() {
        let mut fake = ScriptedInference::default();
        fake.restorations
            .insert("most service back by the weekend".to_string(), datetime!(2002-06-02 23:59:59));
        let fake = Arc::new(fake);
        let augmenter = Augmenter::new(fake.clone(), 2);

        let out = augmenter
            .augment(vec![
                envelope(2, event("6/1/02", Some("11:59 p.m."), Some("most service back by the weekend"))),
                envelope(3, event("6/1/02", None, Some("eventually"))),
            ])
            .await;

        let by_row = |row: usize| &out.iter().find(|e| e.origin.row == row).expect("row").payload;
        assert_eq!(by_row(2).restored_datetime, Some(datetime!(2002-06-02 23:59:59)));
        assert_eq!(by_row(2).duration_minutes, Some(1440));
        assert_eq!(by_row(3).restored_datetime, None);
        assert_eq!(by_row(3).duration_minutes, None);
        assert_eq!(fake.calls(), 2);
    }

    #[test]
    fn negative_durations_are_kept() {
        let mut ev = event("6/1/02", None, None);
        ev.start_datetime = Some(datetime!(2002-06-01 10:00:00));
        ev.restored_datetime = Some(datetime!(2002-06-01 09:00:00));

        let env = add_duration(envelope(2, ev));
        assert_eq!(env.payload.duration_minutes, Some(-60));
    }
}
