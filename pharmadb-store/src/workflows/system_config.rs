//! System configuration writes

use serde::Serialize;
use tracing::info;

use pharmadb_core::models::validation::{check_len, validate_config_key};

use crate::db::repos::{NewSystemConfig, SystemConfig};
use crate::db::Session;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// The stored row after an upsert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigWrite {
    pub config: SystemConfig,
    pub outcome: UpsertOutcome,
}

/// Insert or update one configuration value.
///
/// An existing row with `is_editable = false` is left untouched and the
/// write fails with `NotEditable`. Every successful write refreshes
/// `updated_by` and `updated_at`.
pub async fn upsert_system_config(
    session: &mut Session,
    key: &str,
    value: &str,
    editor: Option<&str>,
) -> StoreResult<ConfigWrite> {
    validate_config_key(key)?;
    if let Some(editor) = editor {
        check_len("updated_by", editor, 50)?;
    }
    let key = key.to_owned();
    let value = value.to_owned();
    let editor = editor.map(str::to_owned);

    let write = session
        .within_transaction(move |s| {
            Box::pin(async move {
                // one retry covers a concurrent first insert of the same key
                for _ in 0..2 {
                    let mut configs = s.repo::<SystemConfig>();
                    if let Some(current) = configs.lock(&key).await? {
                        if !current.is_editable {
                            return Err(StoreError::NotEditable { key });
                        }
                        let config = configs.set_value(&key, &value, editor.as_deref()).await?;
                        return Ok(ConfigWrite {
                            config,
                            outcome: UpsertOutcome::Updated,
                        });
                    }

                    let new = NewSystemConfig {
                        updated_by: editor.clone(),
                        ..NewSystemConfig::new(key.clone(), value.clone())
                    };
                    if let Some(config) = configs.try_insert(&new).await? {
                        return Ok(ConfigWrite {
                            config,
                            outcome: UpsertOutcome::Inserted,
                        });
                    }
                }
                Err(StoreError::invalid(
                    "config_key",
                    format!("'{key}' changed concurrently, retry the write"),
                ))
            })
        })
        .await?;

    info!(
        key = %write.config.config_key,
        outcome = ?write.outcome,
        editor = write.config.updated_by.as_deref().unwrap_or("-"),
        "system config written"
    );
    Ok(write)
}

