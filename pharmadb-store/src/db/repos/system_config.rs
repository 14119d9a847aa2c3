//! System configuration entries
//!
//! The key is the primary key; there is no surrogate id. Values change
//! only through `upsert_system_config`, which honours `is_editable`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use pharmadb_core::models::validation::{check_len, validate_config_key};
use pharmadb_core::ValidationError;

use super::crud::{Deletable, Entity, Filter, Insertable, Repo, Value};
use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SystemConfig {
    pub config_key: String,
    pub config_value: Option<String>,
    pub config_type: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub is_editable: bool,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSystemConfig {
    pub config_key: String,
    pub config_value: Option<String>,
    /// Defaults to `string`
    pub config_type: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Defaults to editable
    pub is_editable: Option<bool>,
    pub updated_by: Option<String>,
}

impl NewSystemConfig {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            config_key: key.into(),
            config_value: Some(value.into()),
            config_type: None,
            description: None,
            category: None,
            is_editable: None,
            updated_by: None,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Mark the entry read-only for `upsert_system_config`.
    pub fn locked(mut self) -> Self {
        self.is_editable = Some(false);
        self
    }
}

pub type SystemConfigRepo<'c> = Repo<'c, SystemConfig>;

impl Entity for SystemConfig {
    type Id = String;

    const TABLE: &'static str = "system_config";
    const ID_COLUMN: &'static str = "config_key";
    const RESOURCE: &'static str = "config key";
    const COLUMNS: &'static [&'static str] = &[
        "config_key",
        "config_type",
        "category",
        "is_editable",
        "updated_by",
        "updated_at",
    ];
    const DEFAULT_ORDER: &'static str = "config_key";
}

impl Insertable for SystemConfig {
    type New = NewSystemConfig;

    fn validate_new(new: &NewSystemConfig) -> Result<(), ValidationError> {
        validate_config_key(&new.config_key)?;
        if let Some(kind) = &new.config_type {
            check_len("config_type", kind, 20)?;
        }
        if let Some(category) = &new.category {
            check_len("category", category, 50)?;
        }
        if let Some(editor) = &new.updated_by {
            check_len("updated_by", editor, 50)?;
        }
        Ok(())
    }

    fn insert_values(new: &NewSystemConfig) -> Vec<(&'static str, Value)> {
        let mut values = vec![
            ("config_key", new.config_key.clone().into()),
            ("config_value", new.config_value.clone().into()),
            ("description", new.description.clone().into()),
            ("category", new.category.clone().into()),
            ("updated_by", new.updated_by.clone().into()),
        ];
        if let Some(kind) = &new.config_type {
            values.push(("config_type", kind.clone().into()));
        }
        if let Some(editable) = new.is_editable {
            values.push(("is_editable", editable.into()));
        }
        values
    }
}

impl Deletable for SystemConfig {}

impl Repo<'_, SystemConfig> {
    pub async fn find_by_category(&mut self, category: &str) -> StoreResult<Vec<SystemConfig>> {
        self.find_all(&[Filter::eq("category", category)], None).await
    }

    pub async fn find_editable(&mut self) -> StoreResult<Vec<SystemConfig>> {
        self.find_all(&[Filter::eq("is_editable", true)], None).await
    }

    /// Current row locked for update, if the key exists.
    pub(crate) async fn lock(&mut self, key: &str) -> StoreResult<Option<SystemConfig>> {
        let row = sqlx::query_as("SELECT * FROM system_config WHERE config_key = $1 FOR UPDATE")
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// Insert unless another writer got there first; `None` on conflict.
    pub(crate) async fn try_insert(&mut self, new: &NewSystemConfig) -> StoreResult<Option<SystemConfig>> {
        SystemConfig::validate_new(new)?;
        let mut qb = super::crud::insert_query::<SystemConfig>(new);
        qb.push(" ON CONFLICT (config_key) DO NOTHING RETURNING *");
        let row = qb
            .build_query_as::<SystemConfig>()
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    pub(crate) async fn set_value(&mut self, key: &str, value: &str, editor: Option<&str>) -> StoreResult<SystemConfig> {
        let row = sqlx::query_as(
            r#"
            UPDATE system_config
            SET config_value = $2, updated_by = $3, updated_at = NOW()
            WHERE config_key = $1
            RETURNING *
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(editor)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(row)
    }
}
