//! Generic repository - shared CRUD for every entity
//!
//! An entity describes its table once (`Entity`) and opts into the write
//! capabilities it supports (`Insertable`, `Updatable`, `Deletable`).
//! `Repo<E>` implements each operation once on top of those descriptions;
//! entity-specific finders live in inherent `impl Repo<'_, X>` blocks next
//! to each entity.
//!
//! Column names reaching SQL are always `&'static str` taken from the
//! entity's whitelist; values are always bound parameters.

use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Decode, Encode, FromRow, PgConnection, Postgres, QueryBuilder, Row, Type};

use pharmadb_core::{OrderBy, Paginated, Pagination, ValidationError};

use crate::error::{StoreError, StoreResult};

/// A table the store manages
pub trait Entity: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static {
    type Id: for<'q> Encode<'q, Postgres>
        + for<'r> Decode<'r, Postgres>
        + Type<Postgres>
        + Clone
        + fmt::Display
        + Send
        + Sync
        + Unpin
        + 'static;

    const TABLE: &'static str;
    const ID_COLUMN: &'static str;
    /// Name used in `NotFound` errors
    const RESOURCE: &'static str;
    /// Columns accepted in filters and ordering
    const COLUMNS: &'static [&'static str];
    /// Ordering when a list query names none
    const DEFAULT_ORDER: &'static str;
}

/// Entities created through the generic `create`
pub trait Insertable: Entity {
    type New: Send + Sync;

    fn validate_new(_new: &Self::New) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Column/value pairs for the INSERT, in column order.
    fn insert_values(new: &Self::New) -> Vec<(&'static str, Value)>;
}

/// Entities changed through the generic `update`
pub trait Updatable: Entity {
    type Patch: Send + Sync;

    /// Column set to `NOW()` on every non-empty update
    const TOUCH_COLUMN: Option<&'static str> = None;

    fn validate_patch(_patch: &Self::Patch) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Assignments for the fields present in `patch`.
    fn assignments(patch: &Self::Patch) -> Vec<(&'static str, Value)>;
}

/// Entities removable through the generic `delete`
pub trait Deletable: Entity {}

/// A typed, nullable bind value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    BigInt(Option<i64>),
    Int(Option<i32>),
    Float(Option<f64>),
    Text(Option<String>),
    Bool(Option<bool>),
    Date(Option<NaiveDate>),
    Timestamp(Option<DateTime<Utc>>),
}

impl Value {
    fn push_to(self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Self::BigInt(v) => qb.push_bind(v),
            Self::Int(v) => qb.push_bind(v),
            Self::Float(v) => qb.push_bind(v),
            Self::Text(v) => qb.push_bind(v),
            Self::Bool(v) => qb.push_bind(v),
            Self::Date(v) => qb.push_bind(v),
            Self::Timestamp(v) => qb.push_bind(v),
        };
    }
}

macro_rules! value_from {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Self::$variant(Some(value))
            }
        }

        impl From<Option<$ty>> for Value {
            fn from(value: Option<$ty>) -> Self {
                Self::$variant(value)
            }
        }
    };
}

value_from!(BigInt, i64);
value_from!(Int, i32);
value_from!(Float, f64);
value_from!(Text, String);
value_from!(Bool, bool);
value_from!(Date, NaiveDate);
value_from!(Timestamp, DateTime<Utc>);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(Some(value.to_owned()))
    }
}

impl From<Option<&str>> for Value {
    fn from(value: Option<&str>) -> Self {
        Self::Text(value.map(str::to_owned))
    }
}

/// A predicate on one whitelisted column
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    /// Case-insensitive substring match
    Contains(String, String),
    /// Inclusive lower bound
    AtLeast(String, Value),
    /// Inclusive upper bound
    AtMost(String, Value),
    IsNull(String),
    NotNull(String),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(column.into(), value.into())
    }

    pub fn contains(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains(column.into(), needle.into())
    }

    pub fn at_least(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::AtLeast(column.into(), value.into())
    }

    pub fn at_most(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::AtMost(column.into(), value.into())
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull(column.into())
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Self::NotNull(column.into())
    }

    fn column(&self) -> &str {
        match self {
            Self::Eq(c, _)
            | Self::Contains(c, _)
            | Self::AtLeast(c, _)
            | Self::AtMost(c, _)
            | Self::IsNull(c)
            | Self::NotNull(c) => c,
        }
    }
}

/// Filter + page + ordering for `Repo::list`
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub pagination: Pagination,
    pub order: Option<OrderBy>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn page(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order = Some(order);
        self
    }
}

/// Resolve a caller-supplied column against the entity whitelist.
pub(crate) fn checked_column<E: Entity>(column: &str) -> StoreResult<&'static str> {
    E::COLUMNS
        .iter()
        .copied()
        .find(|known| *known == column)
        .ok_or_else(|| StoreError::invalid("column", format!("unknown column '{column}' for {}", E::TABLE)))
}

fn push_filters<E: Entity>(qb: &mut QueryBuilder<'_, Postgres>, filters: &[Filter]) -> StoreResult<()> {
    for (i, filter) in filters.iter().enumerate() {
        let column = checked_column::<E>(filter.column())?;
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        match filter {
            Filter::Eq(_, value) => {
                qb.push(column).push(" = ");
                value.clone().push_to(qb);
            }
            Filter::Contains(_, needle) => {
                qb.push(column)
                    .push("::text ILIKE ")
                    .push_bind(format!("%{}%", escape_like(needle)));
            }
            Filter::AtLeast(_, value) => {
                qb.push(column).push(" >= ");
                value.clone().push_to(qb);
            }
            Filter::AtMost(_, value) => {
                qb.push(column).push(" <= ");
                value.clone().push_to(qb);
            }
            Filter::IsNull(_) => {
                qb.push(column).push(" IS NULL");
            }
            Filter::NotNull(_) => {
                qb.push(column).push(" IS NOT NULL");
            }
        }
    }
    Ok(())
}

fn push_order<E: Entity>(qb: &mut QueryBuilder<'_, Postgres>, order: Option<&OrderBy>) -> StoreResult<()> {
    qb.push(" ORDER BY ");
    match order {
        Some(order) => {
            let column = checked_column::<E>(&order.column)?;
            qb.push(column).push(" ").push(order.order.as_sql());
            if column != E::ID_COLUMN {
                // stable pages when the sort column has ties
                qb.push(", ").push(E::ID_COLUMN);
            }
        }
        None => {
            qb.push(E::DEFAULT_ORDER);
        }
    }
    Ok(())
}

/// Escape `%`, `_` and `\` so user text matches literally inside LIKE.
pub(crate) fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

pub(crate) fn select_query<E: Entity>(
    filters: &[Filter],
    order: Option<&OrderBy>,
    page: Option<Pagination>,
) -> StoreResult<QueryBuilder<'static, Postgres>> {
    let mut qb = QueryBuilder::new("SELECT *");
    if page.is_some() {
        qb.push(", COUNT(*) OVER() AS total");
    }
    qb.push(" FROM ").push(E::TABLE);
    push_filters::<E>(&mut qb, filters)?;
    push_order::<E>(&mut qb, order)?;
    if let Some(page) = page {
        qb.push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
    }
    Ok(qb)
}

pub(crate) fn insert_query<E: Insertable>(new: &E::New) -> QueryBuilder<'static, Postgres> {
    let values = E::insert_values(new);
    let mut qb = QueryBuilder::new("INSERT INTO ");
    qb.push(E::TABLE).push(" (");
    for (i, (column, _)) in values.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(*column);
    }
    qb.push(") VALUES (");
    for (i, (_, value)) in values.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        value.push_to(&mut qb);
    }
    qb.push(")");
    qb
}

pub(crate) fn update_query<E: Updatable>(
    id: E::Id,
    patch: &E::Patch,
) -> Option<QueryBuilder<'static, Postgres>> {
    let assignments = E::assignments(patch);
    if assignments.is_empty() {
        return None;
    }
    let mut qb = QueryBuilder::new("UPDATE ");
    qb.push(E::TABLE).push(" SET ");
    for (i, (column, value)) in assignments.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(column).push(" = ");
        value.push_to(&mut qb);
    }
    if let Some(touch) = E::TOUCH_COLUMN {
        qb.push(", ").push(touch).push(" = NOW()");
    }
    qb.push(" WHERE ")
        .push(E::ID_COLUMN)
        .push(" = ")
        .push_bind(id)
        .push(" RETURNING *");
    Some(qb)
}

/// Repository over one entity, bound to a borrowed connection.
///
/// Works identically inside or outside a transaction; the session decides.
pub struct Repo<'c, E> {
    pub(crate) conn: &'c mut PgConnection,
    _entity: PhantomData<fn() -> E>,
}

impl<'c, E: Entity> Repo<'c, E> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self {
            conn,
            _entity: PhantomData,
        }
    }

    /// Fetch by primary key; `None` when absent.
    pub async fn find(&mut self, id: E::Id) -> StoreResult<Option<E>> {
        let mut qb = QueryBuilder::new("SELECT * FROM ");
        qb.push(E::TABLE)
            .push(" WHERE ")
            .push(E::ID_COLUMN)
            .push(" = ")
            .push_bind(id);
        let row = qb.build_query_as::<E>().fetch_optional(&mut *self.conn).await?;
        Ok(row)
    }

    /// Fetch by primary key; `NotFound` when absent.
    pub async fn get(&mut self, id: E::Id) -> StoreResult<E> {
        let label = id.to_string();
        self.find(id)
            .await?
            .ok_or_else(|| StoreError::not_found(E::RESOURCE, label))
    }

    pub async fn exists(&mut self, id: E::Id) -> StoreResult<bool> {
        let mut qb = QueryBuilder::new("SELECT EXISTS(SELECT 1 FROM ");
        qb.push(E::TABLE)
            .push(" WHERE ")
            .push(E::ID_COLUMN)
            .push(" = ")
            .push_bind(id)
            .push(")");
        let exists: bool = qb.build_query_scalar().fetch_one(&mut *self.conn).await?;
        Ok(exists)
    }

    /// Filtered, ordered, paginated listing.
    pub async fn list(&mut self, query: &ListQuery) -> StoreResult<Paginated<E>> {
        let mut qb = select_query::<E>(&query.filters, query.order.as_ref(), Some(query.pagination))?;
        let rows: Vec<PgRow> = qb.build().fetch_all(&mut *self.conn).await?;

        let mut total = match rows.first() {
            Some(row) => row.try_get::<i64, _>("total")?,
            None => 0,
        };
        if rows.is_empty() && query.pagination.offset() > 0 {
            // past the last page: the window count is unavailable
            total = self.count(&query.filters).await?;
        }

        let items = rows
            .iter()
            .map(|row| E::from_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paginated::new(items, total, query.pagination))
    }

    /// Every row matching `filters`, unpaginated.
    pub async fn find_all(&mut self, filters: &[Filter], order: Option<&OrderBy>) -> StoreResult<Vec<E>> {
        let mut qb = select_query::<E>(filters, order, None)?;
        let rows = qb.build_query_as::<E>().fetch_all(&mut *self.conn).await?;
        Ok(rows)
    }

    /// First row matching `filters` in default order.
    pub async fn find_one(&mut self, filters: &[Filter]) -> StoreResult<Option<E>> {
        let mut qb = select_query::<E>(filters, None, None)?;
        qb.push(" LIMIT 1");
        let row = qb.build_query_as::<E>().fetch_optional(&mut *self.conn).await?;
        Ok(row)
    }

    pub async fn count(&mut self, filters: &[Filter]) -> StoreResult<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM ");
        qb.push(E::TABLE);
        push_filters::<E>(&mut qb, filters)?;
        let count: i64 = qb.build_query_scalar().fetch_one(&mut *self.conn).await?;
        Ok(count)
    }
}

impl<'c, E: Insertable> Repo<'c, E> {
    /// Insert and return the generated id.
    pub async fn create(&mut self, new: &E::New) -> StoreResult<E::Id> {
        E::validate_new(new)?;
        let mut qb = insert_query::<E>(new);
        qb.push(" RETURNING ").push(E::ID_COLUMN);
        let id: E::Id = qb.build_query_scalar().fetch_one(&mut *self.conn).await?;
        tracing::debug!(table = E::TABLE, %id, "row created");
        Ok(id)
    }

    /// Insert and return the stored row with server defaults filled in.
    pub async fn insert(&mut self, new: &E::New) -> StoreResult<E> {
        E::validate_new(new)?;
        let mut qb = insert_query::<E>(new);
        qb.push(" RETURNING *");
        let row = qb.build_query_as::<E>().fetch_one(&mut *self.conn).await?;
        Ok(row)
    }
}

impl<'c, E: Updatable> Repo<'c, E> {
    /// Apply the fields present in `patch`; an empty patch returns the
    /// current row unchanged.
    pub async fn update(&mut self, id: E::Id, patch: &E::Patch) -> StoreResult<E> {
        E::validate_patch(patch)?;
        let label = id.to_string();
        let Some(mut qb) = update_query::<E>(id.clone(), patch) else {
            return self.get(id).await;
        };
        qb.build_query_as::<E>()
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| StoreError::not_found(E::RESOURCE, label))
    }
}

impl<'c, E: Deletable> Repo<'c, E> {
    /// Delete by primary key. Rows still referenced by children fail with
    /// `ConstraintViolation`.
    pub async fn delete(&mut self, id: E::Id) -> StoreResult<()> {
        let label = id.to_string();
        let mut qb = QueryBuilder::new("DELETE FROM ");
        qb.push(E::TABLE)
            .push(" WHERE ")
            .push(E::ID_COLUMN)
            .push(" = ")
            .push_bind(id);
        let result = qb.build().execute(&mut *self.conn).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(E::RESOURCE, label));
        }
        tracing::debug!(table = E::TABLE, id = %label, "row deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::{Inspector, NewInspector};
    use pharmadb_core::SortOrder;

    #[test]
    fn select_binds_filters_and_page() {
        let filters = vec![
            Filter::eq("department", "化学检验科"),
            Filter::eq("is_active", true),
        ];
        let qb = select_query::<Inspector>(
            &filters,
            Some(&OrderBy::desc("join_date")),
            Some(Pagination::new(2, 10)),
        )
        .unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT *, COUNT(*) OVER() AS total FROM inspectors WHERE department = $1 \
             AND is_active = $2 ORDER BY join_date DESC, inspector_id LIMIT $3 OFFSET $4"
        );
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let err = select_query::<Inspector>(&[Filter::eq("1=1; DROP TABLE x", 1i64)], None, None)
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        let order = OrderBy {
            column: "password".into(),
            order: SortOrder::Asc,
        };
        assert!(select_query::<Inspector>(&[], Some(&order), None).is_err());
    }

    #[test]
    fn contains_and_null_filters() {
        let qb = select_query::<Inspector>(
            &[Filter::contains("name", "李"), Filter::is_null("email")],
            None,
            None,
        )
        .unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT * FROM inspectors WHERE name::text ILIKE $1 AND email IS NULL ORDER BY name, inspector_id"
        );
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("100%_a\\b"), "100\\%\\_a\\\\b");
        assert_eq!(escape_like("黄连"), "黄连");
    }

    #[test]
    fn insert_lists_columns_in_order() {
        let new = NewInspector::new("INS-001", "张三");
        let qb = insert_query::<Inspector>(&new);
        assert!(qb
            .sql()
            .starts_with("INSERT INTO inspectors (employee_no, name, phone, email, department"));
        assert!(qb.sql().ends_with(")"));
    }
}
