//! Inspector/laboratory access grants (N:M junction)
//!
//! The `(inspector_id, lab_id)` pair is unique in storage; a second grant
//! for the same pair surfaces as `DuplicateKey`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use pharmadb_core::models::validation::check_len;
use pharmadb_core::ValidationError;

use super::crud::{Deletable, Entity, Filter, Insertable, Repo, Updatable, Value};
use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct LabAccess {
    pub access_id: i64,
    pub inspector_id: i64,
    pub lab_id: i64,
    pub access_level: Option<String>,
    pub granted_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLabAccess {
    pub inspector_id: i64,
    pub lab_id: i64,
    pub access_level: Option<String>,
    /// Defaults to the current date
    pub granted_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabAccessPatch {
    pub access_level: Option<String>,
    pub granted_date: Option<NaiveDate>,
}

/// A laboratory together with the grant that opens it
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct AccessibleLab {
    pub lab_id: i64,
    pub lab_code: String,
    pub lab_name: String,
    pub location: Option<String>,
    pub access_level: Option<String>,
    pub granted_date: NaiveDate,
}

/// An inspector together with their grant on one laboratory
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LabInspector {
    pub inspector_id: i64,
    pub employee_no: String,
    pub name: String,
    pub department: Option<String>,
    pub is_active: bool,
    pub access_level: Option<String>,
    pub granted_date: NaiveDate,
}

pub type LabAccessRepo<'c> = Repo<'c, LabAccess>;

impl Entity for LabAccess {
    type Id = i64;

    const TABLE: &'static str = "inspector_lab_access";
    const ID_COLUMN: &'static str = "access_id";
    const RESOURCE: &'static str = "lab access";
    const COLUMNS: &'static [&'static str] = &[
        "access_id",
        "inspector_id",
        "lab_id",
        "access_level",
        "granted_date",
    ];
    const DEFAULT_ORDER: &'static str = "inspector_id, lab_id";
}

impl Insertable for LabAccess {
    type New = NewLabAccess;

    fn validate_new(new: &NewLabAccess) -> Result<(), ValidationError> {
        match &new.access_level {
            Some(level) => check_len("access_level", level, 50),
            None => Ok(()),
        }
    }

    fn insert_values(new: &NewLabAccess) -> Vec<(&'static str, Value)> {
        let mut values = vec![
            ("inspector_id", new.inspector_id.into()),
            ("lab_id", new.lab_id.into()),
            ("access_level", new.access_level.clone().into()),
        ];
        if let Some(date) = new.granted_date {
            values.push(("granted_date", date.into()));
        }
        values
    }
}

impl Updatable for LabAccess {
    type Patch = LabAccessPatch;

    fn validate_patch(patch: &LabAccessPatch) -> Result<(), ValidationError> {
        match &patch.access_level {
            Some(level) => check_len("access_level", level, 50),
            None => Ok(()),
        }
    }

    fn assignments(patch: &LabAccessPatch) -> Vec<(&'static str, Value)> {
        let mut set: Vec<(&'static str, Value)> = Vec::new();
        if let Some(level) = &patch.access_level {
            set.push(("access_level", level.clone().into()));
        }
        if let Some(date) = patch.granted_date {
            set.push(("granted_date", date.into()));
        }
        set
    }
}

impl Deletable for LabAccess {}

impl Repo<'_, LabAccess> {
    pub async fn find_pair(&mut self, inspector_id: i64, lab_id: i64) -> StoreResult<Option<LabAccess>> {
        self.find_one(&[
            Filter::eq("inspector_id", inspector_id),
            Filter::eq("lab_id", lab_id),
        ])
        .await
    }

    /// Remove the grant for a pair; returns whether one existed.
    pub async fn delete_pair(&mut self, inspector_id: i64, lab_id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM inspector_lab_access WHERE inspector_id = $1 AND lab_id = $2",
        )
        .bind(inspector_id)
        .bind(lab_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Laboratories an inspector may use.
    pub async fn labs_for_inspector(&mut self, inspector_id: i64) -> StoreResult<Vec<AccessibleLab>> {
        let labs = sqlx::query_as(
            r#"
            SELECT l.lab_id, l.lab_code, l.lab_name, l.location,
                   a.access_level, a.granted_date
            FROM inspector_lab_access a
            JOIN laboratories l ON l.lab_id = a.lab_id
            WHERE a.inspector_id = $1
            ORDER BY l.lab_code
            "#,
        )
        .bind(inspector_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(labs)
    }

    /// Inspectors holding a grant on a laboratory.
    pub async fn inspectors_for_lab(&mut self, lab_id: i64) -> StoreResult<Vec<LabInspector>> {
        let inspectors = sqlx::query_as(
            r#"
            SELECT i.inspector_id, i.employee_no, i.name, i.department, i.is_active,
                   a.access_level, a.granted_date
            FROM inspector_lab_access a
            JOIN inspectors i ON i.inspector_id = a.inspector_id
            WHERE a.lab_id = $1
            ORDER BY i.name, i.inspector_id
            "#,
        )
        .bind(lab_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(inspectors)
    }
}
