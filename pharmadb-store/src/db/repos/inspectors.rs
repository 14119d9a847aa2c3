//! Inspector repository
//!
//! Inspectors are never hard-deleted while referenced; `deactivate` is
//! the normal way to retire one.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use pharmadb_core::models::validation::{check_len, require_text};
use pharmadb_core::{OrderBy, ValidationError};

use super::crud::{Deletable, Entity, Filter, Insertable, Repo, Updatable, Value};
use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Inspector {
    pub inspector_id: i64,
    pub employee_no: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub certification_level: Option<String>,
    pub join_date: NaiveDate,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewInspector {
    pub employee_no: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub certification_level: Option<String>,
    /// Defaults to the current date
    pub join_date: Option<NaiveDate>,
    /// Defaults to active
    pub is_active: Option<bool>,
}

impl NewInspector {
    pub fn new(employee_no: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            employee_no: employee_no.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InspectorPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub certification_level: Option<String>,
    pub is_active: Option<bool>,
}

pub type InspectorRepo<'c> = Repo<'c, Inspector>;

impl Entity for Inspector {
    type Id = i64;

    const TABLE: &'static str = "inspectors";
    const ID_COLUMN: &'static str = "inspector_id";
    const RESOURCE: &'static str = "inspector";
    const COLUMNS: &'static [&'static str] = &[
        "inspector_id",
        "employee_no",
        "name",
        "phone",
        "email",
        "department",
        "title",
        "certification_level",
        "join_date",
        "is_active",
        "created_at",
    ];
    const DEFAULT_ORDER: &'static str = "name, inspector_id";
}

fn check_contact(phone: Option<&String>, email: Option<&String>) -> Result<(), ValidationError> {
    if let Some(phone) = phone {
        check_len("phone", phone, 20)?;
    }
    if let Some(email) = email {
        check_len("email", email, 100)?;
        if !email.contains('@') {
            return Err(ValidationError::InvalidFormat {
                field: "email",
                reason: "must contain '@'",
            });
        }
    }
    Ok(())
}

impl Insertable for Inspector {
    type New = NewInspector;

    fn validate_new(new: &NewInspector) -> Result<(), ValidationError> {
        require_text("employee_no", &new.employee_no)?;
        check_len("employee_no", &new.employee_no, 20)?;
        require_text("name", &new.name)?;
        check_len("name", &new.name, 50)?;
        check_contact(new.phone.as_ref(), new.email.as_ref())
    }

    fn insert_values(new: &NewInspector) -> Vec<(&'static str, Value)> {
        let mut values = vec![
            ("employee_no", new.employee_no.clone().into()),
            ("name", new.name.clone().into()),
            ("phone", new.phone.clone().into()),
            ("email", new.email.clone().into()),
            ("department", new.department.clone().into()),
            ("title", new.title.clone().into()),
            ("certification_level", new.certification_level.clone().into()),
        ];
        if let Some(join_date) = new.join_date {
            values.push(("join_date", join_date.into()));
        }
        if let Some(is_active) = new.is_active {
            values.push(("is_active", is_active.into()));
        }
        values
    }
}

impl Updatable for Inspector {
    type Patch = InspectorPatch;

    fn validate_patch(patch: &InspectorPatch) -> Result<(), ValidationError> {
        if let Some(name) = &patch.name {
            require_text("name", name)?;
            check_len("name", name, 50)?;
        }
        check_contact(patch.phone.as_ref(), patch.email.as_ref())
    }

    fn assignments(patch: &InspectorPatch) -> Vec<(&'static str, Value)> {
        let mut set: Vec<(&'static str, Value)> = Vec::new();
        if let Some(name) = &patch.name {
            set.push(("name", name.clone().into()));
        }
        if let Some(phone) = &patch.phone {
            set.push(("phone", phone.clone().into()));
        }
        if let Some(email) = &patch.email {
            set.push(("email", email.clone().into()));
        }
        if let Some(department) = &patch.department {
            set.push(("department", department.clone().into()));
        }
        if let Some(title) = &patch.title {
            set.push(("title", title.clone().into()));
        }
        if let Some(level) = &patch.certification_level {
            set.push(("certification_level", level.clone().into()));
        }
        if let Some(is_active) = patch.is_active {
            set.push(("is_active", is_active.into()));
        }
        set
    }
}

impl Deletable for Inspector {}

impl Repo<'_, Inspector> {
    pub async fn find_by_employee_no(&mut self, employee_no: &str) -> StoreResult<Option<Inspector>> {
        self.find_one(&[Filter::eq("employee_no", employee_no)]).await
    }

    /// Active inspectors ordered by name.
    pub async fn find_active(&mut self) -> StoreResult<Vec<Inspector>> {
        self.find_all(&[Filter::eq("is_active", true)], None).await
    }

    pub async fn find_by_department(&mut self, department: &str) -> StoreResult<Vec<Inspector>> {
        self.find_all(&[Filter::eq("department", department)], Some(&OrderBy::asc("name")))
            .await
    }

    /// Soft retirement: keeps every referencing row intact.
    pub async fn deactivate(&mut self, inspector_id: i64) -> StoreResult<Inspector> {
        let patch = InspectorPatch {
            is_active: Some(false),
            ..InspectorPatch::default()
        };
        self.update(inspector_id, &patch).await
    }
}
