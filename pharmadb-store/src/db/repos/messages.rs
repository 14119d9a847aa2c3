//! Message repository
//!
//! Messages are inserted and removed only through the conversation
//! workflows, which keep `message_seq` dense and the parent counter
//! exact. The generic surface here is read access plus updates of the
//! annotation fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};

use pharmadb_core::models::validation::{check_len, check_non_negative, check_unit_interval, require_text};
use pharmadb_core::{OrderBy, Paginated, Pagination, SenderType, ValidationError};

use super::crud::{Entity, Filter, ListQuery, Repo, Updatable, Value};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub conversation_id: i64,
    pub message_seq: i32,
    pub sender_type: SenderType,
    pub message_text: String,
    pub intent: Option<String>,
    pub confidence_score: Option<f64>,
    pub response_time_ms: Option<i32>,
    pub referenced_item_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// Message content before it is placed in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender_type: SenderType,
    pub message_text: String,
    pub intent: Option<String>,
    pub confidence_score: Option<f64>,
    pub response_time_ms: Option<i32>,
    pub referenced_item_id: Option<i64>,
    /// Defaults to the insert time
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewMessage {
    pub fn new(sender_type: SenderType, message_text: impl Into<String>) -> Self {
        Self {
            sender_type,
            message_text: message_text.into(),
            intent: None,
            confidence_score: None,
            response_time_ms: None,
            referenced_item_id: None,
            timestamp: None,
        }
    }

    /// Build from a raw sender string, rejecting values outside the set.
    pub fn parse(sender_type: &str, message_text: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self::new(sender_type.parse()?, message_text))
    }

    pub fn inspector(message_text: impl Into<String>) -> Self {
        Self::new(SenderType::Inspector, message_text)
    }

    pub fn system(message_text: impl Into<String>) -> Self {
        Self::new(SenderType::System, message_text)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("message_text", &self.message_text)?;
        check_annotations(
            self.intent.as_ref(),
            self.confidence_score,
            self.response_time_ms,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePatch {
    pub intent: Option<String>,
    pub confidence_score: Option<f64>,
    pub response_time_ms: Option<i32>,
    pub referenced_item_id: Option<i64>,
}

/// A message joined with the item it references
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct MessageWithItem {
    #[sqlx(flatten)]
    pub message: Message,
    pub item_name_cn: Option<String>,
    pub item_volume: Option<i32>,
    pub item_category: Option<String>,
}

pub type MessageRepo<'c> = Repo<'c, Message>;

impl Entity for Message {
    type Id = i64;

    const TABLE: &'static str = "messages";
    const ID_COLUMN: &'static str = "message_id";
    const RESOURCE: &'static str = "message";
    const COLUMNS: &'static [&'static str] = &[
        "message_id",
        "conversation_id",
        "message_seq",
        "sender_type",
        "message_text",
        "intent",
        "confidence_score",
        "response_time_ms",
        "referenced_item_id",
        "timestamp",
    ];
    const DEFAULT_ORDER: &'static str = "conversation_id, message_seq";
}

fn check_annotations(
    intent: Option<&String>,
    confidence: Option<f64>,
    response_time_ms: Option<i32>,
) -> Result<(), ValidationError> {
    if let Some(intent) = intent {
        check_len("intent", intent, 50)?;
    }
    if let Some(score) = confidence {
        check_unit_interval("confidence_score", score)?;
    }
    if let Some(ms) = response_time_ms {
        check_non_negative("response_time_ms", ms as i64)?;
    }
    Ok(())
}

impl Updatable for Message {
    type Patch = MessagePatch;

    fn validate_patch(patch: &MessagePatch) -> Result<(), ValidationError> {
        check_annotations(
            patch.intent.as_ref(),
            patch.confidence_score,
            patch.response_time_ms,
        )
    }

    fn assignments(patch: &MessagePatch) -> Vec<(&'static str, Value)> {
        let mut set: Vec<(&'static str, Value)> = Vec::new();
        if let Some(intent) = &patch.intent {
            set.push(("intent", intent.clone().into()));
        }
        if let Some(score) = patch.confidence_score {
            set.push(("confidence_score", score.into()));
        }
        if let Some(ms) = patch.response_time_ms {
            set.push(("response_time_ms", ms.into()));
        }
        if let Some(item_id) = patch.referenced_item_id {
            set.push(("referenced_item_id", item_id.into()));
        }
        set
    }
}

/// Insert one message at a known sequence number. Callers hold the
/// parent conversation lock.
pub(crate) async fn insert_at(
    conn: &mut PgConnection,
    conversation_id: i64,
    message_seq: i32,
    message: &NewMessage,
) -> StoreResult<Message> {
    let inserted = sqlx::query_as(
        r#"
        INSERT INTO messages (
            conversation_id, message_seq, sender_type, message_text, intent,
            confidence_score, response_time_ms, referenced_item_id, timestamp
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, NOW()))
        RETURNING *
        "#,
    )
    .bind(conversation_id)
    .bind(message_seq)
    .bind(message.sender_type)
    .bind(&message.message_text)
    .bind(&message.intent)
    .bind(message.confidence_score)
    .bind(message.response_time_ms)
    .bind(message.referenced_item_id)
    .bind(message.timestamp)
    .fetch_one(conn)
    .await?;
    Ok(inserted)
}

/// Next free sequence number of a conversation (1 when it has none).
pub(crate) async fn next_seq(conn: &mut PgConnection, conversation_id: i64) -> StoreResult<i32> {
    let seq: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(message_seq), 0) + 1 FROM messages WHERE conversation_id = $1",
    )
    .bind(conversation_id)
    .fetch_one(conn)
    .await?;
    Ok(seq)
}

/// Delete one message by id, returning its conversation. Callers hold
/// the parent conversation lock and adjust the counter.
pub(crate) async fn remove(conn: &mut PgConnection, message_id: i64) -> StoreResult<i64> {
    let conversation_id: Option<i64> = sqlx::query_scalar(
        "DELETE FROM messages WHERE message_id = $1 RETURNING conversation_id",
    )
    .bind(message_id)
    .fetch_optional(conn)
    .await?;
    conversation_id.ok_or_else(|| StoreError::not_found(Message::RESOURCE, message_id))
}

impl Repo<'_, Message> {
    /// Messages of a conversation in sequence order.
    pub async fn find_by_conversation(&mut self, conversation_id: i64) -> StoreResult<Vec<Message>> {
        self.find_all(
            &[Filter::eq("conversation_id", conversation_id)],
            Some(&OrderBy::asc("message_seq")),
        )
        .await
    }

    /// The `limit` latest messages of a conversation, oldest first.
    pub async fn latest(&mut self, conversation_id: i64, limit: u32) -> StoreResult<Vec<Message>> {
        let query = ListQuery::new()
            .filter(Filter::eq("conversation_id", conversation_id))
            .order_by(OrderBy::desc("message_seq"))
            .page(Pagination::first(limit));
        let mut messages = self.list(&query).await?.items;
        messages.reverse();
        Ok(messages)
    }

    pub async fn search_text(&mut self, term: &str, page: Pagination) -> StoreResult<Paginated<Message>> {
        let query = ListQuery::new()
            .filter(Filter::contains("message_text", term))
            .order_by(OrderBy::desc("timestamp"))
            .page(page);
        self.list(&query).await
    }

    pub async fn find_by_intent(&mut self, intent: &str, page: Pagination) -> StoreResult<Paginated<Message>> {
        let query = ListQuery::new()
            .filter(Filter::eq("intent", intent))
            .order_by(OrderBy::desc("timestamp"))
            .page(page);
        self.list(&query).await
    }

    pub async fn find_by_referenced_item(&mut self, item_id: i64) -> StoreResult<Vec<Message>> {
        self.find_all(
            &[Filter::eq("referenced_item_id", item_id)],
            Some(&OrderBy::desc("timestamp")),
        )
        .await
    }

    /// A message with the item it references, if any.
    pub async fn get_with_reference(&mut self, message_id: i64) -> StoreResult<MessageWithItem> {
        let found: Option<MessageWithItem> = sqlx::query_as(
            r#"
            SELECT m.*, p.name_cn AS item_name_cn, p.volume AS item_volume,
                   p.category AS item_category
            FROM messages m
            LEFT JOIN pharmacopoeia_items p ON p.item_id = m.referenced_item_id
            WHERE m.message_id = $1
            "#,
        )
        .bind(message_id)
        .fetch_optional(&mut *self.conn)
        .await?;
        found.ok_or_else(|| StoreError::not_found(Message::RESOURCE, message_id))
    }

}
