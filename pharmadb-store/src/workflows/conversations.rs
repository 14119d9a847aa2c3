//! Conversation and message workflows
//!
//! Appends lock the parent conversation row (`SELECT ... FOR UPDATE`)
//! before reading the next sequence number. Concurrent appends to one
//! conversation queue on that lock; appends to different conversations
//! never touch the same row.
//!
//! Counter-maintaining workflows always run at READ COMMITTED. Under a
//! snapshot level, `FOR UPDATE` on a row committed after the snapshot
//! fails with a serialization error instead of waiting for the lock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use pharmadb_core::IsolationLevel;

use crate::db::repos::messages::{insert_at, next_seq, remove};
use crate::db::repos::{Conversation, ConversationPatch, Message, NewConversation, NewMessage};
use crate::db::Session;
use crate::error::StoreResult;

const COUNTER_ISOLATION: IsolationLevel = IsolationLevel::ReadCommitted;

/// What `append_message_to_conversation` wrote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppendedMessage {
    pub message: Message,
    /// Parent counter after the append
    pub total_messages: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppendedMessages {
    pub conversation_id: i64,
    pub messages: Vec<Message>,
    pub total_messages: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenedConversation {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemovedMessage {
    pub conversation_id: i64,
    pub total_messages: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub conversation_id: i64,
    pub previous: i32,
    pub total_messages: i32,
}

impl Reconciliation {
    pub fn changed(&self) -> bool {
        self.previous != self.total_messages
    }
}

fn validate_all(messages: &[NewMessage]) -> StoreResult<()> {
    for message in messages {
        message.validate()?;
    }
    Ok(())
}

/// Insert `messages` after the current last one. The caller holds the
/// conversation lock.
async fn insert_batch(
    session: &mut Session,
    conversation_id: i64,
    messages: &[NewMessage],
) -> StoreResult<Vec<Message>> {
    let mut seq = next_seq(session.conn(), conversation_id).await?;
    let mut stored = Vec::with_capacity(messages.len());
    for message in messages {
        stored.push(insert_at(session.conn(), conversation_id, seq, message).await?);
        seq += 1;
    }
    Ok(stored)
}

/// Append one message with the next sequence number and bump the
/// parent's `total_messages` in the same transaction.
pub async fn append_message_to_conversation(
    session: &mut Session,
    conversation_id: i64,
    message: NewMessage,
) -> StoreResult<AppendedMessage> {
    message.validate()?;

    let appended = session
        .within_transaction_at(COUNTER_ISOLATION, move |s| {
            Box::pin(async move {
                s.repo::<Conversation>().lock(conversation_id).await?;
                let seq = next_seq(s.conn(), conversation_id).await?;
                let message = insert_at(s.conn(), conversation_id, seq, &message).await?;
                let total_messages = s
                    .repo::<Conversation>()
                    .adjust_message_count(conversation_id, 1)
                    .await?;
                Ok(AppendedMessage {
                    message,
                    total_messages,
                })
            })
        })
        .await?;

    debug!(
        conversation_id,
        seq = appended.message.message_seq,
        total = appended.total_messages,
        "message appended"
    );
    Ok(appended)
}

/// Append several messages under one parent lock, in order.
pub async fn append_messages(
    session: &mut Session,
    conversation_id: i64,
    messages: Vec<NewMessage>,
) -> StoreResult<AppendedMessages> {
    validate_all(&messages)?;

    let appended = session
        .within_transaction_at(COUNTER_ISOLATION, move |s| {
            Box::pin(async move {
                let conversation = s.repo::<Conversation>().lock(conversation_id).await?;
                if messages.is_empty() {
                    return Ok(AppendedMessages {
                        conversation_id,
                        messages: Vec::new(),
                        total_messages: conversation.total_messages,
                    });
                }
                let stored = insert_batch(s, conversation_id, &messages).await?;
                let delta = i32::try_from(stored.len()).unwrap_or(i32::MAX);
                let total_messages = s
                    .repo::<Conversation>()
                    .adjust_message_count(conversation_id, delta)
                    .await?;
                Ok(AppendedMessages {
                    conversation_id,
                    messages: stored,
                    total_messages,
                })
            })
        })
        .await?;

    info!(
        conversation_id,
        appended = appended.messages.len(),
        total = appended.total_messages,
        "messages appended"
    );
    Ok(appended)
}

/// Create a conversation together with its opening messages (seq 1..n).
pub async fn open_conversation(
    session: &mut Session,
    conversation: NewConversation,
    messages: Vec<NewMessage>,
) -> StoreResult<OpenedConversation> {
    validate_all(&messages)?;

    let opened = session
        .within_transaction(move |s| {
            Box::pin(async move {
                let created = s.repo::<Conversation>().insert(&conversation).await?;
                let conversation_id = created.conversation_id;
                let stored = insert_batch(s, conversation_id, &messages).await?;
                let conversation = if stored.is_empty() {
                    created
                } else {
                    let delta = i32::try_from(stored.len()).unwrap_or(i32::MAX);
                    s.repo::<Conversation>()
                        .adjust_message_count(conversation_id, delta)
                        .await?;
                    s.repo::<Conversation>().get(conversation_id).await?
                };
                Ok(OpenedConversation {
                    conversation,
                    messages: stored,
                })
            })
        })
        .await?;

    info!(
        conversation_id = opened.conversation.conversation_id,
        session_id = %opened.conversation.session_id,
        messages = opened.messages.len(),
        "conversation opened"
    );
    Ok(opened)
}

/// Administrative delete of one message; decrements the parent counter.
///
/// The sequence number of the removed message is not reused by later
/// appends unless it was the last one.
pub async fn remove_message(session: &mut Session, message_id: i64) -> StoreResult<RemovedMessage> {
    let removed = session
        .within_transaction_at(COUNTER_ISOLATION, move |s| {
            Box::pin(async move {
                let conversation_id = s.repo::<Message>().get(message_id).await?.conversation_id;
                s.repo::<Conversation>().lock(conversation_id).await?;
                remove(s.conn(), message_id).await?;
                let total_messages = s
                    .repo::<Conversation>()
                    .adjust_message_count(conversation_id, -1)
                    .await?;
                Ok(RemovedMessage {
                    conversation_id,
                    total_messages,
                })
            })
        })
        .await?;

    info!(
        message_id,
        conversation_id = removed.conversation_id,
        "message removed"
    );
    Ok(removed)
}

/// Close a conversation. An end time before its start violates the
/// table's time-order check.
pub async fn end_conversation(
    session: &mut Session,
    conversation_id: i64,
    end_time: DateTime<Utc>,
) -> StoreResult<Conversation> {
    let patch = ConversationPatch {
        end_time: Some(end_time),
        ..ConversationPatch::default()
    };
    let ended = session
        .within_transaction(move |s| {
            Box::pin(async move { s.repo::<Conversation>().update(conversation_id, &patch).await })
        })
        .await?;

    info!(conversation_id, total = ended.total_messages, "conversation ended");
    Ok(ended)
}

/// Recompute `total_messages` from the stored messages.
pub async fn reconcile_message_count(
    session: &mut Session,
    conversation_id: i64,
) -> StoreResult<Reconciliation> {
    let reconciliation = session
        .within_transaction_at(COUNTER_ISOLATION, move |s| {
            Box::pin(async move {
                let previous = s
                    .repo::<Conversation>()
                    .lock(conversation_id)
                    .await?
                    .total_messages;
                let total_messages = s
                    .repo::<Conversation>()
                    .recount_messages(conversation_id)
                    .await?;
                Ok(Reconciliation {
                    conversation_id,
                    previous,
                    total_messages,
                })
            })
        })
        .await?;

    if reconciliation.changed() {
        tracing::warn!(
            conversation_id,
            previous = reconciliation.previous,
            actual = reconciliation.total_messages,
            "message counter drifted, corrected"
        );
    }
    Ok(reconciliation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconciliation_reports_change() {
        let same = Reconciliation {
            conversation_id: 1,
            previous: 3,
            total_messages: 3,
        };
        assert!(!same.changed());
        let drifted = Reconciliation {
            previous: 2,
            ..same
        };
        assert!(drifted.changed());
    }

    #[test]
    fn batch_validation_stops_at_first_bad_message() {
        let messages = vec![
            NewMessage::inspector("阿司匹林的含量测定方法是什么?"),
            NewMessage::system("   "),
        ];
        assert!(validate_all(&messages).is_err());
        assert!(validate_all(&messages[..1]).is_ok());
    }
}
