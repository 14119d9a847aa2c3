//! Conversation repository
//!
//! `total_messages` is owned by the message workflows: it is never part
//! of an insert or a patch here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use pharmadb_core::models::validation::{check_len, require_text};
use pharmadb_core::{OrderBy, Paginated, Pagination, ValidationError};

use super::crud::{Deletable, Entity, Filter, Insertable, ListQuery, Repo, Updatable, Value};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: i64,
    pub inspector_id: i64,
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_messages: i32,
    pub session_type: Option<String>,
    pub context_topic: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConversation {
    pub inspector_id: i64,
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub session_type: Option<String>,
    pub context_topic: Option<String>,
}

impl NewConversation {
    pub fn new(inspector_id: i64, session_id: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            inspector_id,
            session_id: session_id.into(),
            start_time,
            session_type: None,
            context_topic: None,
        }
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.context_topic = Some(topic.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationPatch {
    pub end_time: Option<DateTime<Utc>>,
    pub session_type: Option<String>,
    pub context_topic: Option<String>,
}

pub type ConversationRepo<'c> = Repo<'c, Conversation>;

impl Entity for Conversation {
    type Id = i64;

    const TABLE: &'static str = "conversations";
    const ID_COLUMN: &'static str = "conversation_id";
    const RESOURCE: &'static str = "conversation";
    const COLUMNS: &'static [&'static str] = &[
        "conversation_id",
        "inspector_id",
        "session_id",
        "start_time",
        "end_time",
        "total_messages",
        "session_type",
        "context_topic",
        "created_at",
    ];
    const DEFAULT_ORDER: &'static str = "start_time DESC, conversation_id DESC";
}

fn check_labels(session_type: Option<&String>, topic: Option<&String>) -> Result<(), ValidationError> {
    if let Some(session_type) = session_type {
        check_len("session_type", session_type, 50)?;
    }
    if let Some(topic) = topic {
        check_len("context_topic", topic, 200)?;
    }
    Ok(())
}

impl Insertable for Conversation {
    type New = NewConversation;

    fn validate_new(new: &NewConversation) -> Result<(), ValidationError> {
        require_text("session_id", &new.session_id)?;
        check_len("session_id", &new.session_id, 100)?;
        check_labels(new.session_type.as_ref(), new.context_topic.as_ref())
    }

    fn insert_values(new: &NewConversation) -> Vec<(&'static str, Value)> {
        vec![
            ("inspector_id", new.inspector_id.into()),
            ("session_id", new.session_id.clone().into()),
            ("start_time", new.start_time.into()),
            ("session_type", new.session_type.clone().into()),
            ("context_topic", new.context_topic.clone().into()),
        ]
    }
}

impl Updatable for Conversation {
    type Patch = ConversationPatch;

    fn validate_patch(patch: &ConversationPatch) -> Result<(), ValidationError> {
        check_labels(patch.session_type.as_ref(), patch.context_topic.as_ref())
    }

    fn assignments(patch: &ConversationPatch) -> Vec<(&'static str, Value)> {
        let mut set: Vec<(&'static str, Value)> = Vec::new();
        if let Some(end_time) = patch.end_time {
            set.push(("end_time", end_time.into()));
        }
        if let Some(session_type) = &patch.session_type {
            set.push(("session_type", session_type.clone().into()));
        }
        if let Some(topic) = &patch.context_topic {
            set.push(("context_topic", topic.clone().into()));
        }
        set
    }
}

impl Deletable for Conversation {}

impl Repo<'_, Conversation> {
    pub async fn find_by_session_id(&mut self, session_id: &str) -> StoreResult<Option<Conversation>> {
        self.find_one(&[Filter::eq("session_id", session_id)]).await
    }

    /// An inspector's conversations, newest first.
    pub async fn list_by_inspector(&mut self, inspector_id: i64, page: Pagination) -> StoreResult<Paginated<Conversation>> {
        let query = ListQuery::new()
            .filter(Filter::eq("inspector_id", inspector_id))
            .page(page);
        self.list(&query).await
    }

    /// The `limit` most recently started conversations.
    pub async fn recent(&mut self, limit: u32) -> StoreResult<Vec<Conversation>> {
        let query = ListQuery::new().page(Pagination::first(limit));
        Ok(self.list(&query).await?.items)
    }

    pub async fn find_by_topic(&mut self, topic: &str) -> StoreResult<Vec<Conversation>> {
        self.find_all(&[Filter::contains("context_topic", topic)], None)
            .await
    }

    /// Conversations started inside `[from, to]`.
    pub async fn find_in_time_range(&mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<Conversation>> {
        if from > to {
            return Err(StoreError::invalid("from", "time range start is after its end"));
        }
        self.find_all(
            &[Filter::at_least("start_time", from), Filter::at_most("start_time", to)],
            Some(&OrderBy::asc("start_time")),
        )
        .await
    }

    /// Conversations without an end time.
    pub async fn find_open(&mut self, inspector_id: Option<i64>) -> StoreResult<Vec<Conversation>> {
        let mut filters = vec![Filter::is_null("end_time")];
        if let Some(inspector_id) = inspector_id {
            filters.push(Filter::eq("inspector_id", inspector_id));
        }
        self.find_all(&filters, None).await
    }

    /// Lock the row for the rest of the transaction and return it.
    pub(crate) async fn lock(&mut self, conversation_id: i64) -> StoreResult<Conversation> {
        sqlx::query_as("SELECT * FROM conversations WHERE conversation_id = $1 FOR UPDATE")
            .bind(conversation_id)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| StoreError::not_found(Conversation::RESOURCE, conversation_id))
    }

    /// Add `delta` to the message counter, returning the new value.
    pub(crate) async fn adjust_message_count(&mut self, conversation_id: i64, delta: i32) -> StoreResult<i32> {
        let total: i32 = sqlx::query_scalar(
            r#"
            UPDATE conversations
            SET total_messages = total_messages + $2
            WHERE conversation_id = $1
            RETURNING total_messages
            "#,
        )
        .bind(conversation_id)
        .bind(delta)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(total)
    }

    /// Reset the counter from the child rows, returning the new value.
    pub(crate) async fn recount_messages(&mut self, conversation_id: i64) -> StoreResult<i32> {
        let total: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE conversations
            SET total_messages = (
                SELECT COUNT(*)::int FROM messages WHERE conversation_id = $1
            )
            WHERE conversation_id = $1
            RETURNING total_messages
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&mut *self.conn)
        .await?;
        total.ok_or_else(|| StoreError::not_found(Conversation::RESOURCE, conversation_id))
    }
}
