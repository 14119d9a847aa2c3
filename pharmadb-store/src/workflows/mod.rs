//! Multi-table writes that must apply atomically
//!
//! Every workflow takes a `&mut Session` and runs inside
//! `Session::within_transaction`, so it either applies all of its rows or
//! none of them. Called from inside an outer transaction a workflow
//! becomes a savepoint of that transaction and commits with it.
//!
//! The redundant state the schema carries is maintained here and only
//! here:
//! - `conversations.total_messages` and `messages.message_seq`, under a
//!   row lock on the parent conversation
//! - `experiment_data_points.is_qualified`, derived from value and range
//! - `system_config.updated_by/updated_at`, refreshed on every value change

pub mod conversations;
pub mod experiments;
pub mod lab_access;
pub mod system_config;

pub use conversations::{
    append_message_to_conversation, append_messages, end_conversation, open_conversation,
    reconcile_message_count, remove_message, AppendedMessage, AppendedMessages, OpenedConversation,
    Reconciliation, RemovedMessage,
};
pub use experiments::{
    add_data_points, complete_experiment, create_experiment_with_data_points, update_data_point,
    RecordedPoints,
};
pub use lab_access::{grant_lab_access, revoke_lab_access, transfer_lab_access, LabAccessTransfer};
pub use system_config::{upsert_system_config, ConfigWrite, UpsertOutcome};
