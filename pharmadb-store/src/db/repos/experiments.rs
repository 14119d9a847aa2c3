//! Experiment record repository
//!
//! Status and result are typed closed sets; raw strings from callers go
//! through `ExperimentPatch::status_change`, which rejects unknown values
//! before any statement is sent.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use pharmadb_core::models::validation::{check_len, require_text};
use pharmadb_core::{ExperimentResult, ExperimentStatus, OrderBy, ValidationError};

use super::crud::{Deletable, Entity, Filter, Insertable, Repo, Updatable, Value};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub experiment_id: i64,
    pub experiment_no: String,
    pub inspector_id: i64,
    pub lab_id: i64,
    pub item_id: i64,
    pub experiment_type: Option<String>,
    pub batch_no: Option<String>,
    pub sample_quantity: Option<f64>,
    pub experiment_date: NaiveDate,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExperimentStatus,
    pub result: Option<ExperimentResult>,
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExperiment {
    pub experiment_no: String,
    pub inspector_id: i64,
    pub lab_id: i64,
    pub item_id: i64,
    pub experiment_type: Option<String>,
    pub batch_no: Option<String>,
    pub sample_quantity: Option<f64>,
    pub experiment_date: NaiveDate,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExperimentStatus,
    pub result: Option<ExperimentResult>,
    pub conclusion: Option<String>,
}

impl NewExperiment {
    /// An in-progress experiment with no outcome yet.
    pub fn new(
        experiment_no: impl Into<String>,
        inspector_id: i64,
        lab_id: i64,
        item_id: i64,
        experiment_date: NaiveDate,
    ) -> Self {
        Self {
            experiment_no: experiment_no.into(),
            inspector_id,
            lab_id,
            item_id,
            experiment_type: None,
            batch_no: None,
            sample_quantity: None,
            experiment_date,
            start_time: None,
            end_time: None,
            status: ExperimentStatus::default(),
            result: None,
            conclusion: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPatch {
    pub status: Option<ExperimentStatus>,
    pub result: Option<ExperimentResult>,
    pub conclusion: Option<String>,
    pub experiment_type: Option<String>,
    pub batch_no: Option<String>,
    pub sample_quantity: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ExperimentPatch {
    /// Status/result/conclusion update from raw strings.
    pub fn status_change(
        status: &str,
        result: Option<&str>,
        conclusion: Option<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            status: Some(status.parse()?),
            result: result.map(|r| r.parse::<ExperimentResult>()).transpose()?,
            conclusion,
            ..Self::default()
        })
    }
}

pub type ExperimentRepo<'c> = Repo<'c, ExperimentRecord>;

impl Entity for ExperimentRecord {
    type Id = i64;

    const TABLE: &'static str = "experiment_records";
    const ID_COLUMN: &'static str = "experiment_id";
    const RESOURCE: &'static str = "experiment";
    const COLUMNS: &'static [&'static str] = &[
        "experiment_id",
        "experiment_no",
        "inspector_id",
        "lab_id",
        "item_id",
        "experiment_type",
        "batch_no",
        "sample_quantity",
        "experiment_date",
        "start_time",
        "end_time",
        "status",
        "result",
        "created_at",
        "updated_at",
    ];
    const DEFAULT_ORDER: &'static str = "experiment_date DESC, experiment_id DESC";
}

fn check_times(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<(), ValidationError> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(ValidationError::InvalidFormat {
                field: "end_time",
                reason: "must not precede start_time",
            });
        }
    }
    Ok(())
}

fn check_quantity(quantity: Option<f64>) -> Result<(), ValidationError> {
    match quantity {
        Some(q) if !q.is_finite() || q < 0.0 => Err(ValidationError::OutOfRange {
            field: "sample_quantity",
            value: q,
            min: 0.0,
            max: f64::INFINITY,
        }),
        _ => Ok(()),
    }
}

impl Insertable for ExperimentRecord {
    type New = NewExperiment;

    fn validate_new(new: &NewExperiment) -> Result<(), ValidationError> {
        require_text("experiment_no", &new.experiment_no)?;
        check_len("experiment_no", &new.experiment_no, 50)?;
        if let Some(batch_no) = &new.batch_no {
            check_len("batch_no", batch_no, 50)?;
        }
        check_quantity(new.sample_quantity)?;
        check_times(new.start_time, new.end_time)
    }

    fn insert_values(new: &NewExperiment) -> Vec<(&'static str, Value)> {
        vec![
            ("experiment_no", new.experiment_no.clone().into()),
            ("inspector_id", new.inspector_id.into()),
            ("lab_id", new.lab_id.into()),
            ("item_id", new.item_id.into()),
            ("experiment_type", new.experiment_type.clone().into()),
            ("batch_no", new.batch_no.clone().into()),
            ("sample_quantity", new.sample_quantity.into()),
            ("experiment_date", new.experiment_date.into()),
            ("start_time", new.start_time.into()),
            ("end_time", new.end_time.into()),
            ("status", new.status.as_str().into()),
            ("result", new.result.map(|r| r.as_str()).into()),
            ("conclusion", new.conclusion.clone().into()),
        ]
    }
}

impl Updatable for ExperimentRecord {
    type Patch = ExperimentPatch;

    const TOUCH_COLUMN: Option<&'static str> = Some("updated_at");

    fn validate_patch(patch: &ExperimentPatch) -> Result<(), ValidationError> {
        if let Some(batch_no) = &patch.batch_no {
            check_len("batch_no", batch_no, 50)?;
        }
        check_quantity(patch.sample_quantity)?;
        check_times(patch.start_time, patch.end_time)
    }

    fn assignments(patch: &ExperimentPatch) -> Vec<(&'static str, Value)> {
        let mut set: Vec<(&'static str, Value)> = Vec::new();
        if let Some(status) = patch.status {
            set.push(("status", status.as_str().into()));
        }
        if let Some(result) = patch.result {
            set.push(("result", result.as_str().into()));
        }
        if let Some(conclusion) = &patch.conclusion {
            set.push(("conclusion", conclusion.clone().into()));
        }
        if let Some(kind) = &patch.experiment_type {
            set.push(("experiment_type", kind.clone().into()));
        }
        if let Some(batch_no) = &patch.batch_no {
            set.push(("batch_no", batch_no.clone().into()));
        }
        if let Some(quantity) = patch.sample_quantity {
            set.push(("sample_quantity", quantity.into()));
        }
        if let Some(start) = patch.start_time {
            set.push(("start_time", start.into()));
        }
        if let Some(end) = patch.end_time {
            set.push(("end_time", end.into()));
        }
        set
    }
}

impl Deletable for ExperimentRecord {}

/// Optional narrowing for date-range searches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExperimentScope {
    pub inspector_id: Option<i64>,
    pub lab_id: Option<i64>,
}

impl Repo<'_, ExperimentRecord> {
    pub async fn find_by_no(&mut self, experiment_no: &str) -> StoreResult<Option<ExperimentRecord>> {
        self.find_one(&[Filter::eq("experiment_no", experiment_no)]).await
    }

    pub async fn find_by_inspector(&mut self, inspector_id: i64) -> StoreResult<Vec<ExperimentRecord>> {
        self.find_all(&[Filter::eq("inspector_id", inspector_id)], None).await
    }

    pub async fn find_by_item(&mut self, item_id: i64) -> StoreResult<Vec<ExperimentRecord>> {
        self.find_all(&[Filter::eq("item_id", item_id)], None).await
    }

    pub async fn find_by_lab(&mut self, lab_id: i64) -> StoreResult<Vec<ExperimentRecord>> {
        self.find_all(&[Filter::eq("lab_id", lab_id)], None).await
    }

    pub async fn find_by_status(&mut self, status: ExperimentStatus) -> StoreResult<Vec<ExperimentRecord>> {
        self.find_all(&[Filter::eq("status", status.as_str())], None).await
    }

    /// Experiments dated inside `[from, to]`, oldest first.
    pub async fn find_in_date_range(
        &mut self,
        from: NaiveDate,
        to: NaiveDate,
        scope: ExperimentScope,
    ) -> StoreResult<Vec<ExperimentRecord>> {
        if from > to {
            return Err(StoreError::invalid("from", "date range start is after its end"));
        }
        let mut filters = vec![
            Filter::at_least("experiment_date", from),
            Filter::at_most("experiment_date", to),
        ];
        if let Some(inspector_id) = scope.inspector_id {
            filters.push(Filter::eq("inspector_id", inspector_id));
        }
        if let Some(lab_id) = scope.lab_id {
            filters.push(Filter::eq("lab_id", lab_id));
        }
        self.find_all(&filters, Some(&OrderBy::asc("experiment_date")))
            .await
    }

    /// Lock the row for the rest of the transaction and return it.
    pub(crate) async fn lock(&mut self, experiment_id: i64) -> StoreResult<ExperimentRecord> {
        sqlx::query_as("SELECT * FROM experiment_records WHERE experiment_id = $1 FOR UPDATE")
            .bind(experiment_id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| StoreError::not_found(ExperimentRecord::RESOURCE, experiment_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_change_rejects_unknown_values() {
        let patch = ExperimentPatch::status_change("completed", Some("qualified"), None).unwrap();
        assert_eq!(patch.status, Some(ExperimentStatus::Completed));
        assert_eq!(patch.result, Some(ExperimentResult::Qualified));

        assert!(ExperimentPatch::status_change("finished", None, None).is_err());
        assert!(ExperimentPatch::status_change("completed", Some("ok"), None).is_err());
    }

    #[test]
    fn new_experiment_defaults_to_in_progress() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let new = NewExperiment::new("EXP-2025-0001", 1, 1, 1, date);
        assert_eq!(new.status, ExperimentStatus::InProgress);
        let values = ExperimentRecord::insert_values(&new);
        assert!(values.contains(&("status", Value::from("in-progress"))));
        assert!(values.contains(&("result", Value::Text(None))));
    }

    #[test]
    fn end_before_start_rejected() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let start = date.and_hms_opt(10, 0, 0).unwrap().and_utc();
        let mut new = NewExperiment::new("EXP-1", 1, 1, 1, date);
        new.start_time = Some(start);
        new.end_time = Some(start - chrono::Duration::minutes(5));
        assert!(ExperimentRecord::validate_new(&new).is_err());
    }

    #[test]
    fn updates_touch_updated_at() {
        assert_eq!(ExperimentRecord::TOUCH_COLUMN, Some("updated_at"));
    }
}
