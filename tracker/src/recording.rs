//! Turns a finished session into a persisted [`RunRecord`].

use std::sync::Arc;

use crate::{
    models::RunRecord,
    providers::{RunSummary, TextGenerator},
    session::FinishedSession,
    storage::{RunStore, StoreError},
};

/// Used when the text generator fails.
pub const FALLBACK_COACHING_TIPS: &str = "Excellent effort today! Focus on recovery and hydration.";

/// Used when the text generator answers with nothing.
pub const EMPTY_COACHING_TIPS: &str = "Keep up the great work! Consistency is key to improvement.";

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    /// The run may already be partly stored; `RunStore::save_run` of the
    /// same record is safe to retry.
    #[error("run {} could not be saved: {source}", .record.id)]
    Persist {
        record: Box<RunRecord>,
        #[source]
        source: StoreError,
    },
}

pub struct RecordingPipeline {
    coach: Arc<dyn TextGenerator>,
    store: Arc<dyn RunStore>,
}

impl RecordingPipeline {
    pub fn new(coach: Arc<dyn TextGenerator>, store: Arc<dyn RunStore>) -> Self {
        Self { coach, store }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Builds the record, asks for coaching tips and saves it.
    ///
    /// Coaching never fails the pipeline. A storage failure hands the
    /// complete record back inside the error so the caller can retry.
    pub async fn record(&self, finished: FinishedSession) -> Result<RunRecord, RecordingError> {
        let mut record = build_record(finished);
        record.coaching_tips = Some(self.coaching_tips(&record).await);

        match self.store.save_run(&record).await {
            Ok(()) => {
                tracing::info!("Run {} recorded for route {}", record.id, record.route_name);
                Ok(record)
            }
            Err(source) => {
                tracing::error!("Failed to save run {}: {}", record.id, source);
                Err(RecordingError::Persist {
                    record: Box::new(record),
                    source,
                })
            }
        }
    }

    async fn coaching_tips(&self, record: &RunRecord) -> String {
        let summary = RunSummary {
            route_name: record.route_name.clone(),
            distance_km: record.distance_km,
            duration_seconds: record.duration_seconds,
            average_pace: record.average_pace,
        };
        match self.coach.coaching_tips(&summary).await {
            Ok(text) if text.trim().is_empty() => EMPTY_COACHING_TIPS.to_string(),
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                tracing::warn!("Coaching tips unavailable: {}", err);
                FALLBACK_COACHING_TIPS.to_string()
            }
        }
    }
}

/// Record without coaching tips. Distance is rounded to two decimals; the
/// pace is computed before rounding.
pub fn build_record(finished: FinishedSession) -> RunRecord {
    let average_pace = finished.average_pace();
    RunRecord {
        id: uuid::Uuid::new_v4().to_string(),
        route_id: finished.route_id,
        route_name: finished.route_name,
        started_at: finished.started_at,
        duration_seconds: finished.elapsed_seconds,
        distance_km: round_2(finished.distance_km),
        average_pace,
        recorded_path: finished.recorded_path,
        coaching_tips: None,
    }
}

fn round_2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
