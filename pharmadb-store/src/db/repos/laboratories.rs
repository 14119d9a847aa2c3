//! Laboratory repository

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use pharmadb_core::models::validation::{check_len, require_text};
use pharmadb_core::ValidationError;

use super::crud::{Deletable, Entity, Filter, Insertable, Repo, Updatable, Value};
use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Laboratory {
    pub lab_id: i64,
    pub lab_code: String,
    pub lab_name: String,
    pub location: Option<String>,
    pub certification: Option<String>,
    pub equipment_level: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewLaboratory {
    pub lab_code: String,
    pub lab_name: String,
    pub location: Option<String>,
    pub certification: Option<String>,
    pub equipment_level: Option<String>,
}

impl NewLaboratory {
    pub fn new(lab_code: impl Into<String>, lab_name: impl Into<String>) -> Self {
        Self {
            lab_code: lab_code.into(),
            lab_name: lab_name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaboratoryPatch {
    pub lab_name: Option<String>,
    pub location: Option<String>,
    pub certification: Option<String>,
    pub equipment_level: Option<String>,
}

pub type LaboratoryRepo<'c> = Repo<'c, Laboratory>;

impl Entity for Laboratory {
    type Id = i64;

    const TABLE: &'static str = "laboratories";
    const ID_COLUMN: &'static str = "lab_id";
    const RESOURCE: &'static str = "laboratory";
    const COLUMNS: &'static [&'static str] = &[
        "lab_id",
        "lab_code",
        "lab_name",
        "location",
        "certification",
        "equipment_level",
        "created_at",
    ];
    const DEFAULT_ORDER: &'static str = "lab_code";
}

impl Insertable for Laboratory {
    type New = NewLaboratory;

    fn validate_new(new: &NewLaboratory) -> Result<(), ValidationError> {
        require_text("lab_code", &new.lab_code)?;
        check_len("lab_code", &new.lab_code, 20)?;
        require_text("lab_name", &new.lab_name)?;
        check_len("lab_name", &new.lab_name, 100)
    }

    fn insert_values(new: &NewLaboratory) -> Vec<(&'static str, Value)> {
        vec![
            ("lab_code", new.lab_code.clone().into()),
            ("lab_name", new.lab_name.clone().into()),
            ("location", new.location.clone().into()),
            ("certification", new.certification.clone().into()),
            ("equipment_level", new.equipment_level.clone().into()),
        ]
    }
}

impl Updatable for Laboratory {
    type Patch = LaboratoryPatch;

    fn validate_patch(patch: &LaboratoryPatch) -> Result<(), ValidationError> {
        match &patch.lab_name {
            Some(name) => {
                require_text("lab_name", name)?;
                check_len("lab_name", name, 100)
            }
            None => Ok(()),
        }
    }

    fn assignments(patch: &LaboratoryPatch) -> Vec<(&'static str, Value)> {
        [
            ("lab_name", &patch.lab_name),
            ("location", &patch.location),
            ("certification", &patch.certification),
            ("equipment_level", &patch.equipment_level),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.clone().map(|v| (column, Value::from(v))))
        .collect()
    }
}

impl Deletable for Laboratory {}

impl Repo<'_, Laboratory> {
    pub async fn find_by_code(&mut self, lab_code: &str) -> StoreResult<Option<Laboratory>> {
        self.find_one(&[Filter::eq("lab_code", lab_code)]).await
    }

    pub async fn find_by_certification(&mut self, certification: &str) -> StoreResult<Vec<Laboratory>> {
        self.find_all(&[Filter::contains("certification", certification)], None)
            .await
    }

    pub async fn find_by_equipment_level(&mut self, level: &str) -> StoreResult<Vec<Laboratory>> {
        self.find_all(&[Filter::eq("equipment_level", level)], None).await
    }
}
