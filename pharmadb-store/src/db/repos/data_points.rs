//! Experiment data point repository
//!
//! `is_qualified` is derived from the value and its standard range on
//! every insert; measurement changes go through the `update_data_point`
//! workflow so the flag is recomputed there too.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use pharmadb_core::models::validation::{check_len, require_text};
use pharmadb_core::{Paginated, Pagination, StandardRange, ValidationError};

use super::crud::{Deletable, Entity, Filter, Insertable, ListQuery, Repo, Value};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct DataPoint {
    pub data_id: i64,
    pub experiment_id: i64,
    pub measurement_type: String,
    pub measurement_value: Option<f64>,
    pub measurement_unit: Option<String>,
    pub standard_min: Option<f64>,
    pub standard_max: Option<f64>,
    pub is_qualified: Option<bool>,
    pub measurement_time: DateTime<Utc>,
    pub equipment_id: Option<String>,
    pub notes: Option<String>,
}

impl DataPoint {
    pub fn range(&self) -> StandardRange {
        StandardRange {
            min: self.standard_min,
            max: self.standard_max,
        }
    }
}

/// One measurement, independent of the experiment it will belong to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub measurement_type: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub range: StandardRange,
    /// Defaults to the insert time
    pub measured_at: Option<DateTime<Utc>>,
    pub equipment_id: Option<String>,
    pub notes: Option<String>,
}

impl Measurement {
    pub fn new(measurement_type: impl Into<String>, value: f64) -> Self {
        Self {
            measurement_type: measurement_type.into(),
            value: Some(value),
            unit: None,
            range: StandardRange::default(),
            measured_at: None,
            equipment_id: None,
            notes: None,
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn within(mut self, range: StandardRange) -> Self {
        self.range = range;
        self
    }

    pub fn qualifies(&self) -> Option<bool> {
        self.range.qualifies(self.value)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("measurement_type", &self.measurement_type)?;
        if let Some(value) = self.value {
            if !value.is_finite() {
                return Err(ValidationError::InvalidFormat {
                    field: "measurement_value",
                    reason: "must be a finite number",
                });
            }
        }
        if let Some(unit) = &self.unit {
            check_len("measurement_unit", unit, 20)?;
        }
        self.range.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDataPoint {
    pub experiment_id: i64,
    pub measurement: Measurement,
}

/// Measurement change; applied by the `update_data_point` workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPointPatch {
    pub measurement_value: Option<f64>,
    pub measurement_unit: Option<String>,
    /// Replaces both bounds when present
    pub range: Option<StandardRange>,
    pub notes: Option<String>,
}

impl DataPointPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(value) = self.measurement_value {
            if !value.is_finite() {
                return Err(ValidationError::InvalidFormat {
                    field: "measurement_value",
                    reason: "must be a finite number",
                });
            }
        }
        if let Some(unit) = &self.measurement_unit {
            check_len("measurement_unit", unit, 20)?;
        }
        match &self.range {
            Some(range) => range.validate(),
            None => Ok(()),
        }
    }

    /// The point as it will look after the patch, with its flag recomputed.
    pub fn apply(&self, current: &DataPoint) -> DataPoint {
        let mut next = current.clone();
        if let Some(value) = self.measurement_value {
            next.measurement_value = Some(value);
        }
        if let Some(unit) = &self.measurement_unit {
            next.measurement_unit = Some(unit.clone());
        }
        if let Some(range) = self.range {
            next.standard_min = range.min;
            next.standard_max = range.max;
        }
        if let Some(notes) = &self.notes {
            next.notes = Some(notes.clone());
        }
        next.is_qualified = next.range().qualifies(next.measurement_value);
        next
    }
}

pub type DataPointRepo<'c> = Repo<'c, DataPoint>;

impl Entity for DataPoint {
    type Id = i64;

    const TABLE: &'static str = "experiment_data_points";
    const ID_COLUMN: &'static str = "data_id";
    const RESOURCE: &'static str = "data point";
    const COLUMNS: &'static [&'static str] = &[
        "data_id",
        "experiment_id",
        "measurement_type",
        "measurement_value",
        "measurement_unit",
        "standard_min",
        "standard_max",
        "is_qualified",
        "measurement_time",
        "equipment_id",
    ];
    const DEFAULT_ORDER: &'static str = "experiment_id, measurement_time, data_id";
}

impl Insertable for DataPoint {
    type New = NewDataPoint;

    fn validate_new(new: &NewDataPoint) -> Result<(), ValidationError> {
        new.measurement.validate()
    }

    fn insert_values(new: &NewDataPoint) -> Vec<(&'static str, Value)> {
        let m = &new.measurement;
        let mut values = vec![
            ("experiment_id", new.experiment_id.into()),
            ("measurement_type", m.measurement_type.clone().into()),
            ("measurement_value", m.value.into()),
            ("measurement_unit", m.unit.clone().into()),
            ("standard_min", m.range.min.into()),
            ("standard_max", m.range.max.into()),
            ("is_qualified", m.qualifies().into()),
            ("equipment_id", m.equipment_id.clone().into()),
            ("notes", m.notes.clone().into()),
        ];
        if let Some(at) = m.measured_at {
            values.push(("measurement_time", at.into()));
        }
        values
    }
}

impl Deletable for DataPoint {}

impl Repo<'_, DataPoint> {
    /// Points of one experiment in measurement order.
    pub async fn find_by_experiment(&mut self, experiment_id: i64) -> StoreResult<Vec<DataPoint>> {
        self.find_all(&[Filter::eq("experiment_id", experiment_id)], None)
            .await
    }

    pub async fn find_by_measurement_type(&mut self, measurement_type: &str, page: Pagination) -> StoreResult<Paginated<DataPoint>> {
        let query = ListQuery::new()
            .filter(Filter::eq("measurement_type", measurement_type))
            .page(page);
        self.list(&query).await
    }

    /// Points of an experiment that fell outside their range.
    pub async fn find_unqualified(&mut self, experiment_id: i64) -> StoreResult<Vec<DataPoint>> {
        self.find_all(
            &[
                Filter::eq("experiment_id", experiment_id),
                Filter::eq("is_qualified", false),
            ],
            None,
        )
        .await
    }

    /// Lock one point for the rest of the transaction.
    pub(crate) async fn lock(&mut self, data_id: i64) -> StoreResult<DataPoint> {
        sqlx::query_as("SELECT * FROM experiment_data_points WHERE data_id = $1 FOR UPDATE")
            .bind(data_id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| StoreError::not_found(DataPoint::RESOURCE, data_id))
    }

    /// Write back every mutable measurement column of `point`.
    pub(crate) async fn store(&mut self, point: &DataPoint) -> StoreResult<DataPoint> {
        let stored = sqlx::query_as(
            r#"
            UPDATE experiment_data_points
            SET measurement_value = $2, measurement_unit = $3, standard_min = $4,
                standard_max = $5, is_qualified = $6, notes = $7
            WHERE data_id = $1
            RETURNING *
            "#,
        )
        .bind(point.data_id)
        .bind(point.measurement_value)
        .bind(&point.measurement_unit)
        .bind(point.standard_min)
        .bind(point.standard_max)
        .bind(point.is_qualified)
        .bind(&point.notes)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(value: f64, min: f64, max: f64) -> DataPoint {
        DataPoint {
            data_id: 1,
            experiment_id: 1,
            measurement_type: "含量".into(),
            measurement_value: Some(value),
            measurement_unit: Some("%".into()),
            standard_min: Some(min),
            standard_max: Some(max),
            is_qualified: Some(min <= value && value <= max),
            measurement_time: Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap(),
            equipment_id: None,
            notes: None,
        }
    }

    #[test]
    fn insert_derives_qualification() {
        let new = NewDataPoint {
            experiment_id: 7,
            measurement: Measurement::new("含量", 98.5)
                .within(StandardRange::between(95.0, 100.0).unwrap()),
        };
        let values = DataPoint::insert_values(&new);
        assert!(values.contains(&("is_qualified", Value::Bool(Some(true)))));

        let new = NewDataPoint {
            experiment_id: 7,
            measurement: Measurement::new("含量", 101.2)
                .within(StandardRange::between(95.0, 100.0).unwrap()),
        };
        let values = DataPoint::insert_values(&new);
        assert!(values.contains(&("is_qualified", Value::Bool(Some(false)))));
    }

    #[test]
    fn unbounded_point_leaves_flag_null() {
        let new = NewDataPoint {
            experiment_id: 7,
            measurement: Measurement::new("性状", 1.0),
        };
        let values = DataPoint::insert_values(&new);
        assert!(values.contains(&("is_qualified", Value::Bool(None))));
    }

    #[test]
    fn patch_recomputes_flag() {
        let current = point(98.5, 95.0, 100.0);
        let patch = DataPointPatch {
            measurement_value: Some(100.4),
            ..DataPointPatch::default()
        };
        assert_eq!(patch.apply(&current).is_qualified, Some(false));

        let patch = DataPointPatch {
            range: Some(StandardRange::between(90.0, 110.0).unwrap()),
            ..DataPointPatch::default()
        };
        let next = patch.apply(&point(101.2, 95.0, 100.0));
        assert_eq!(next.is_qualified, Some(true));
        assert_eq!(next.standard_max, Some(110.0));
    }

    #[test]
    fn dropping_a_bound_clears_flag() {
        let patch = DataPointPatch {
            range: Some(StandardRange {
                min: Some(99.0),
                max: None,
            }),
            ..DataPointPatch::default()
        };
        let next = patch.apply(&point(98.5, 95.0, 100.0));
        assert_eq!(next.standard_min, Some(99.0));
        assert_eq!(next.standard_max, None);
        assert_eq!(next.is_qualified, None);
    }

    #[test]
    fn inverted_range_in_patch_rejected() {
        let patch = DataPointPatch {
            range: Some(StandardRange {
                min: Some(10.0),
                max: Some(1.0),
            }),
            ..DataPointPatch::default()
        };
        assert!(patch.validate().is_err());
    }
}
