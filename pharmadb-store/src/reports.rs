//! Read-only reporting queries
//!
//! Aggregates are computed in SQL with explicit casts (`::float8`,
//! `::bigint`) so every column decodes into a fixed Rust type. Rates are
//! derived in Rust from the raw counts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder, Row};

use pharmadb_core::{
    ExperimentResult, ExperimentStatus, Paginated, Pagination, SenderType, ValidationError,
};

use crate::db::repos::crud::escape_like;
use crate::db::repos::{
    DataPoint, Entity, ExperimentRecord, Inspector, ItemRepo, PharmacopoeiaItem, Repo, VolumeCount,
};
use crate::error::{StoreError, StoreResult};
use crate::schema::table_names;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct InspectorStats {
    pub inspector_id: i64,
    pub name: String,
    pub conversation_count: i64,
    pub total_messages: i64,
    pub last_conversation_at: Option<DateTime<Utc>>,
    pub experiment_count: i64,
    pub qualified_experiments: i64,
    pub in_progress_experiments: i64,
    pub last_experiment_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ConversationStats {
    pub conversations: i64,
    pub messages: i64,
    pub avg_messages: Option<f64>,
    /// Over ended conversations only
    pub avg_duration_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct SenderStats {
    pub sender_type: SenderType,
    pub messages: i64,
    pub avg_response_time_ms: Option<f64>,
    pub avg_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LaboratoryStats {
    pub lab_id: i64,
    pub lab_code: String,
    pub lab_name: String,
    pub experiments: i64,
    pub completed: i64,
    pub qualified: i64,
}

impl LaboratoryStats {
    /// Completed experiments as a percentage of all experiments.
    pub fn completion_rate(&self) -> Option<f64> {
        percent(self.completed, self.experiments)
    }

    /// Qualified results as a percentage of completed experiments.
    pub fn pass_rate(&self) -> Option<f64> {
        percent(self.qualified, self.completed)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct MeasurementSummary {
    pub measurement_type: String,
    pub measurements: i64,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub avg_value: Option<f64>,
    pub qualified: i64,
}

impl MeasurementSummary {
    pub fn qualification_rate(&self) -> Option<f64> {
        percent(self.qualified, self.measurements)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct RecentExperiment {
    pub experiment_id: i64,
    pub experiment_no: String,
    pub experiment_date: NaiveDate,
    pub status: ExperimentStatus,
    pub result: Option<ExperimentResult>,
    pub inspector_name: String,
    pub lab_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize)]
pub struct ResultCounts {
    pub experiments: i64,
    pub qualified: i64,
    pub unqualified: i64,
    pub pending: i64,
    /// No result recorded yet
    pub undecided: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSummary {
    pub item: PharmacopoeiaItem,
    pub results: ResultCounts,
    pub measurements: Vec<MeasurementSummary>,
    pub recent: Vec<RecentExperiment>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ExperimentHeader {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: ExperimentRecord,
    pub inspector_name: String,
    pub lab_name: String,
    pub item_name_cn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentDetail {
    #[serde(flatten)]
    pub header: ExperimentHeader,
    pub data_points: Vec<DataPoint>,
}

/// Filters for `search_conversations`; all optional
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationSearch {
    pub inspector_id: Option<i64>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    /// Matches the topic or the text of any message
    pub keywords: Option<String>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ConversationHit {
    pub conversation_id: i64,
    pub session_id: String,
    pub context_topic: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_messages: i32,
    pub inspector_id: i64,
    pub inspector_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: i64,
}

fn percent(part: i64, whole: i64) -> Option<f64> {
    if whole <= 0 {
        return None;
    }
    let rate = part as f64 * 100.0 / whole as f64;
    Some((rate * 100.0).round() / 100.0)
}

/// Reporting queries over a borrowed connection
pub struct Reports<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> Reports<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    pub async fn inspector_stats(&mut self, inspector_id: i64) -> StoreResult<InspectorStats> {
        sqlx::query_as(
            r#"
            SELECT
                i.inspector_id,
                i.name,
                (SELECT COUNT(*) FROM conversations c
                 WHERE c.inspector_id = i.inspector_id) AS conversation_count,
                (SELECT COALESCE(SUM(c.total_messages), 0)::bigint FROM conversations c
                 WHERE c.inspector_id = i.inspector_id) AS total_messages,
                (SELECT MAX(c.start_time) FROM conversations c
                 WHERE c.inspector_id = i.inspector_id) AS last_conversation_at,
                (SELECT COUNT(*) FROM experiment_records e
                 WHERE e.inspector_id = i.inspector_id) AS experiment_count,
                (SELECT COUNT(*) FROM experiment_records e
                 WHERE e.inspector_id = i.inspector_id AND e.result = 'qualified') AS qualified_experiments,
                (SELECT COUNT(*) FROM experiment_records e
                 WHERE e.inspector_id = i.inspector_id AND e.status = 'in-progress') AS in_progress_experiments,
                (SELECT MAX(e.experiment_date) FROM experiment_records e
                 WHERE e.inspector_id = i.inspector_id) AS last_experiment_date
            FROM inspectors i
            WHERE i.inspector_id = $1
            "#,
        )
        .bind(inspector_id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| StoreError::not_found(Inspector::RESOURCE, inspector_id))
    }

    /// Conversation volume, for one inspector or everyone.
    pub async fn conversation_stats(&mut self, inspector_id: Option<i64>) -> StoreResult<ConversationStats> {
        let stats = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS conversations,
                COALESCE(SUM(total_messages), 0)::bigint AS messages,
                AVG(total_messages)::float8 AS avg_messages,
                AVG(EXTRACT(EPOCH FROM (end_time - start_time)))::float8 AS avg_duration_secs
            FROM conversations
            WHERE $1::bigint IS NULL OR inspector_id = $1
            "#,
        )
        .bind(inspector_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(stats)
    }

    /// Per-sender message figures, for one conversation or all.
    pub async fn message_stats(&mut self, conversation_id: Option<i64>) -> StoreResult<Vec<SenderStats>> {
        let stats = sqlx::query_as(
            r#"
            SELECT
                sender_type,
                COUNT(*) AS messages,
                AVG(response_time_ms)::float8 AS avg_response_time_ms,
                AVG(confidence_score)::float8 AS avg_confidence
            FROM messages
            WHERE $1::bigint IS NULL OR conversation_id = $1
            GROUP BY sender_type
            ORDER BY sender_type
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(stats)
    }

    /// Experiment counts for every laboratory, busiest first.
    pub async fn laboratory_stats(&mut self) -> StoreResult<Vec<LaboratoryStats>> {
        let stats = sqlx::query_as(
            r#"
            SELECT
                l.lab_id,
                l.lab_code,
                l.lab_name,
                COUNT(e.experiment_id) AS experiments,
                COUNT(e.experiment_id) FILTER (WHERE e.status = 'completed') AS completed,
                COUNT(e.experiment_id) FILTER (WHERE e.result = 'qualified') AS qualified
            FROM laboratories l
            LEFT JOIN experiment_records e ON e.lab_id = l.lab_id
            GROUP BY l.lab_id, l.lab_code, l.lab_name
            ORDER BY experiments DESC, l.lab_code
            "#,
        )
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(stats)
    }

    pub async fn item_summary(&mut self, item_id: i64) -> StoreResult<ItemSummary> {
        let item = Repo::<PharmacopoeiaItem>::new(&mut *self.conn).get(item_id).await?;

        let results = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS experiments,
                COUNT(*) FILTER (WHERE result = 'qualified') AS qualified,
                COUNT(*) FILTER (WHERE result = 'unqualified') AS unqualified,
                COUNT(*) FILTER (WHERE result = 'pending') AS pending,
                COUNT(*) FILTER (WHERE result IS NULL) AS undecided
            FROM experiment_records
            WHERE item_id = $1
            "#,
        )
        .bind(item_id)
        .fetch_one(&mut *self.conn)
        .await?;

        let measurements = sqlx::query_as(
            r#"
            SELECT
                d.measurement_type,
                COUNT(*) AS measurements,
                MIN(d.measurement_value) AS min_value,
                MAX(d.measurement_value) AS max_value,
                AVG(d.measurement_value)::float8 AS avg_value,
                COUNT(*) FILTER (WHERE d.is_qualified) AS qualified
            FROM experiment_data_points d
            JOIN experiment_records e ON e.experiment_id = d.experiment_id
            WHERE e.item_id = $1
            GROUP BY d.measurement_type
            ORDER BY d.measurement_type
            "#,
        )
        .bind(item_id)
        .fetch_all(&mut *self.conn)
        .await?;

        let recent = sqlx::query_as(
            r#"
            SELECT
                e.experiment_id, e.experiment_no, e.experiment_date, e.status, e.result,
                i.name AS inspector_name,
                l.lab_name
            FROM experiment_records e
            JOIN inspectors i ON i.inspector_id = e.inspector_id
            JOIN laboratories l ON l.lab_id = e.lab_id
            WHERE e.item_id = $1
            ORDER BY e.experiment_date DESC, e.experiment_id DESC
            LIMIT 5
            "#,
        )
        .bind(item_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(ItemSummary {
            item,
            results,
            measurements,
            recent,
        })
    }

    /// An experiment with the names it references and all its data points.
    pub async fn experiment_detail(&mut self, experiment_id: i64) -> StoreResult<ExperimentDetail> {
        let header: ExperimentHeader = sqlx::query_as(
            r#"
            SELECT e.*, i.name AS inspector_name, l.lab_name, p.name_cn AS item_name_cn
            FROM experiment_records e
            JOIN inspectors i ON i.inspector_id = e.inspector_id
            JOIN laboratories l ON l.lab_id = e.lab_id
            JOIN pharmacopoeia_items p ON p.item_id = e.item_id
            WHERE e.experiment_id = $1
            "#,
        )
        .bind(experiment_id)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| StoreError::not_found(ExperimentRecord::RESOURCE, experiment_id))?;

        let data_points = Repo::<DataPoint>::new(&mut *self.conn)
            .find_by_experiment(experiment_id)
            .await?;
        Ok(ExperimentDetail {
            header,
            data_points,
        })
    }

    /// Conversations matching `search`, newest first.
    pub async fn search_conversations(
        &mut self,
        search: &ConversationSearch,
        page: Pagination,
    ) -> StoreResult<Paginated<ConversationHit>> {
        if let (Some(after), Some(before)) = (search.started_after, search.started_before) {
            if after > before {
                return Err(ValidationError::InvalidFormat {
                    field: "started_after",
                    reason: "must not be later than started_before",
                }
                .into());
            }
        }

        let mut qb = paged_search_query(search, page);
        let rows = qb.build().fetch_all(&mut *self.conn).await?;

        let mut total = match rows.first() {
            Some(row) => row.try_get::<i64, _>("total")?,
            None => 0,
        };
        if rows.is_empty() && page.offset() > 0 {
            let mut count = QueryBuilder::new("SELECT COUNT(*) FROM (");
            push_conversation_filters(&mut count, search);
            count.push(") AS matched");
            total = count.build_query_scalar().fetch_one(&mut *self.conn).await?;
        }

        let hits = rows
            .iter()
            .map(|row| ConversationHit::from_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paginated::new(hits, total, page))
    }

    /// Row count of every table, in creation order.
    pub async fn table_counts(&mut self) -> StoreResult<Vec<TableCount>> {
        let mut counts = Vec::new();
        for table in table_names() {
            // table names come from the fixed schema list
            let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&mut *self.conn)
                .await?;
            counts.push(TableCount { table, rows });
        }
        Ok(counts)
    }

    pub async fn volume_counts(&mut self) -> StoreResult<Vec<VolumeCount>> {
        ItemRepo::new(&mut *self.conn).volume_counts().await
    }
}

fn push_conversation_filters(qb: &mut QueryBuilder<'static, Postgres>, search: &ConversationSearch) {
    qb.push(
        "SELECT c.conversation_id, c.session_id, c.context_topic, c.start_time, c.end_time, \
         c.total_messages, c.inspector_id, i.name AS inspector_name \
         FROM conversations c JOIN inspectors i ON i.inspector_id = c.inspector_id WHERE TRUE",
    );
    if let Some(inspector_id) = search.inspector_id {
        qb.push(" AND c.inspector_id = ").push_bind(inspector_id);
    }
    if let Some(after) = search.started_after {
        qb.push(" AND c.start_time >= ").push_bind(after);
    }
    if let Some(before) = search.started_before {
        qb.push(" AND c.start_time <= ").push_bind(before);
    }
    if let Some(keywords) = search.keywords.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        let pattern = format!("%{}%", escape_like(keywords));
        qb.push(" AND (c.context_topic ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM messages m WHERE m.conversation_id = c.conversation_id AND m.message_text ILIKE ")
            .push_bind(pattern)
            .push("))");
    }
}

fn conversation_search_query(search: &ConversationSearch) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT matched.*, COUNT(*) OVER() AS total FROM (");
    push_conversation_filters(&mut qb, search);
    qb.push(") AS matched");
    qb
}

fn paged_search_query(search: &ConversationSearch, page: Pagination) -> QueryBuilder<'static, Postgres> {
    let mut qb = conversation_search_query(search);
    qb.push(" ORDER BY matched.start_time DESC, matched.conversation_id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    qb
}
