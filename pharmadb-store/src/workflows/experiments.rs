//! Experiment workflows
//!
//! An experiment and its data points are written together. Each point's
//! `is_qualified` is derived from its value and standard range at insert
//! and recomputed whenever `update_data_point` changes either.

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use pharmadb_core::{ExperimentResult, ExperimentStatus, ValidationError};

use crate::db::repos::{
    DataPoint, DataPointPatch, ExperimentPatch, ExperimentRecord, Measurement, NewDataPoint,
    NewExperiment,
};
use crate::db::Session;
use crate::error::StoreResult;

/// Rows written for one experiment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordedPoints {
    pub experiment_id: i64,
    pub data_ids: Vec<i64>,
    pub qualified: usize,
    pub unqualified: usize,
}

impl RecordedPoints {
    /// Points whose qualification could not be derived
    pub fn undetermined(&self) -> usize {
        self.data_ids.len() - self.qualified - self.unqualified
    }
}

fn validate_points(points: &[Measurement]) -> StoreResult<()> {
    for point in points {
        point.validate()?;
    }
    Ok(())
}

async fn insert_points(
    session: &mut Session,
    experiment_id: i64,
    points: Vec<Measurement>,
) -> StoreResult<RecordedPoints> {
    let mut recorded = RecordedPoints {
        experiment_id,
        ..RecordedPoints::default()
    };
    for measurement in points {
        match measurement.qualifies() {
            Some(true) => recorded.qualified += 1,
            Some(false) => recorded.unqualified += 1,
            None => {}
        }
        let new = NewDataPoint {
            experiment_id,
            measurement,
        };
        recorded.data_ids.push(session.repo::<DataPoint>().create(&new).await?);
    }
    Ok(recorded)
}

/// Insert an experiment and all of its data points, or nothing.
pub async fn create_experiment_with_data_points(
    session: &mut Session,
    experiment: NewExperiment,
    points: Vec<Measurement>,
) -> StoreResult<RecordedPoints> {
    validate_points(&points)?;

    let recorded = session
        .within_transaction(move |s| {
            Box::pin(async move {
                let experiment_id = s.repo::<ExperimentRecord>().create(&experiment).await?;
                insert_points(s, experiment_id, points).await
            })
        })
        .await?;

    info!(
        experiment_id = recorded.experiment_id,
        points = recorded.data_ids.len(),
        qualified = recorded.qualified,
        "experiment recorded"
    );
    Ok(recorded)
}

/// Append data points to an existing experiment.
pub async fn add_data_points(
    session: &mut Session,
    experiment_id: i64,
    points: Vec<Measurement>,
) -> StoreResult<RecordedPoints> {
    validate_points(&points)?;

    let recorded = session
        .within_transaction(move |s| {
            Box::pin(async move {
                s.repo::<ExperimentRecord>().lock(experiment_id).await?;
                insert_points(s, experiment_id, points).await
            })
        })
        .await?;

    info!(
        experiment_id,
        points = recorded.data_ids.len(),
        "data points added"
    );
    Ok(recorded)
}

/// Change a point's measurement or range and re-derive its flag.
pub async fn update_data_point(
    session: &mut Session,
    data_id: i64,
    patch: DataPointPatch,
) -> StoreResult<DataPoint> {
    patch.validate()?;

    session
        .within_transaction(move |s| {
            Box::pin(async move {
                let current = s.repo::<DataPoint>().lock(data_id).await?;
                let next = patch.apply(&current);
                next.range().validate()?;
                s.repo::<DataPoint>().store(&next).await
            })
        })
        .await
}

/// Move an in-progress experiment to `completed` with its outcome.
pub async fn complete_experiment(
    session: &mut Session,
    experiment_id: i64,
    result: ExperimentResult,
    conclusion: Option<String>,
) -> StoreResult<ExperimentRecord> {
    let completed = session
        .within_transaction(move |s| {
            Box::pin(async move {
                let current = s.repo::<ExperimentRecord>().lock(experiment_id).await?;
                if current.status != ExperimentStatus::InProgress {
                    return Err(ValidationError::InvalidTransition {
                        field: "status",
                        from: current.status.to_string(),
                        to: ExperimentStatus::Completed.to_string(),
                    }
                    .into());
                }
                let patch = ExperimentPatch {
                    status: Some(ExperimentStatus::Completed),
                    result: Some(result),
                    conclusion,
                    end_time: Some(Utc::now()),
                    ..ExperimentPatch::default()
                };
                s.repo::<ExperimentRecord>().update(experiment_id, &patch).await
            })
        })
        .await?;

    info!(experiment_id, result = %result, "experiment completed");
    Ok(completed)
}
