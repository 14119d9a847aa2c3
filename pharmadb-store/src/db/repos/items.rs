//! Pharmacopoeia item repository
//!
//! Items are reference data loaded in bulk: insert and administrative
//! delete only, no generic update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use pharmadb_core::models::validation::{check_len, require_text};
use pharmadb_core::{OrderBy, Paginated, Pagination, ValidationError};

use super::crud::{escape_like, Deletable, Entity, Filter, Insertable, ListQuery, Repo, Value};
use crate::error::StoreResult;

/// A monograph entry of one pharmacopoeia volume
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PharmacopoeiaItem {
    pub item_id: i64,
    pub volume: i32,
    pub doc_id: i32,
    pub name_cn: String,
    pub name_pinyin: Option<String>,
    pub name_en: Option<String>,
    pub category: Option<String>,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub volume: i32,
    pub doc_id: i32,
    pub name_cn: String,
    pub name_pinyin: Option<String>,
    pub name_en: Option<String>,
    pub category: Option<String>,
    pub content: Option<String>,
}

impl NewItem {
    pub fn new(volume: i32, doc_id: i32, name_cn: impl Into<String>) -> Self {
        Self {
            volume,
            doc_id,
            name_cn: name_cn.into(),
            ..Self::default()
        }
    }
}

/// Item count of one volume
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct VolumeCount {
    pub volume: i32,
    pub items: i64,
}

pub type ItemRepo<'c> = Repo<'c, PharmacopoeiaItem>;

impl Entity for PharmacopoeiaItem {
    type Id = i64;

    const TABLE: &'static str = "pharmacopoeia_items";
    const ID_COLUMN: &'static str = "item_id";
    const RESOURCE: &'static str = "pharmacopoeia item";
    const COLUMNS: &'static [&'static str] = &[
        "item_id",
        "volume",
        "doc_id",
        "name_cn",
        "name_pinyin",
        "name_en",
        "category",
        "created_at",
    ];
    const DEFAULT_ORDER: &'static str = "volume, doc_id";
}

impl Insertable for PharmacopoeiaItem {
    type New = NewItem;

    fn validate_new(new: &NewItem) -> Result<(), ValidationError> {
        if !(1..=4).contains(&new.volume) {
            return Err(ValidationError::OutOfRange {
                field: "volume",
                value: new.volume as f64,
                min: 1.0,
                max: 4.0,
            });
        }
        require_text("name_cn", &new.name_cn)?;
        check_len("name_cn", &new.name_cn, 200)?;
        if let Some(category) = &new.category {
            check_len("category", category, 100)?;
        }
        Ok(())
    }

    fn insert_values(new: &NewItem) -> Vec<(&'static str, Value)> {
        vec![
            ("volume", new.volume.into()),
            ("doc_id", new.doc_id.into()),
            ("name_cn", new.name_cn.clone().into()),
            ("name_pinyin", new.name_pinyin.clone().into()),
            ("name_en", new.name_en.clone().into()),
            ("category", new.category.clone().into()),
            ("content", new.content.clone().into()),
        ]
    }
}

impl Deletable for PharmacopoeiaItem {}

impl Repo<'_, PharmacopoeiaItem> {
    /// Look up by the natural key `(volume, doc_id)`.
    pub async fn find_by_doc(&mut self, volume: i32, doc_id: i32) -> StoreResult<Option<PharmacopoeiaItem>> {
        self.find_one(&[Filter::eq("volume", volume), Filter::eq("doc_id", doc_id)])
            .await
    }

    pub async fn list_by_volume(&mut self, volume: i32, page: Pagination) -> StoreResult<Paginated<PharmacopoeiaItem>> {
        let query = ListQuery::new()
            .filter(Filter::eq("volume", volume))
            .page(page);
        self.list(&query).await
    }

    pub async fn find_by_category(&mut self, category: &str) -> StoreResult<Vec<PharmacopoeiaItem>> {
        self.find_all(&[Filter::eq("category", category)], Some(&OrderBy::asc("name_cn")))
            .await
    }

    /// Match any of the three names, case-insensitively.
    pub async fn search_by_name(&mut self, term: &str, page: Pagination) -> StoreResult<Paginated<PharmacopoeiaItem>> {
        let pattern = format!("%{}%", escape_like(term));
        let items: Vec<PharmacopoeiaItem> = sqlx::query_as(
            r#"
            SELECT * FROM pharmacopoeia_items
            WHERE name_cn ILIKE $1 OR name_pinyin ILIKE $1 OR name_en ILIKE $1
            ORDER BY volume, doc_id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&pattern)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *self.conn)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM pharmacopoeia_items
            WHERE name_cn ILIKE $1 OR name_pinyin ILIKE $1 OR name_en ILIKE $1
            "#,
        )
        .bind(&pattern)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(Paginated::new(items, total, page))
    }

    pub async fn volume_counts(&mut self) -> StoreResult<Vec<VolumeCount>> {
        let counts = sqlx::query_as(
            r#"
            SELECT volume, COUNT(*) AS items
            FROM pharmacopoeia_items
            GROUP BY volume
            ORDER BY volume
            "#,
        )
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(counts)
    }
}
