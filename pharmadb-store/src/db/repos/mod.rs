//! Entity repositories
//!
//! Every repository is a `Repo<'c, E>` over a borrowed connection:
//! - shared CRUD is implemented once in `crud` and gated by capability
//! - uniqueness and foreign keys are enforced by storage, never by a
//!   check-then-insert
//! - writes that keep redundant state consistent (message counters,
//!   qualification flags, config editability) live in `workflows`

pub mod conversations;
pub mod crud;
pub mod data_points;
pub mod experiments;
pub mod inspectors;
pub mod items;
pub mod lab_access;
pub mod laboratories;
pub mod messages;
pub mod system_config;

pub use conversations::{Conversation, ConversationPatch, ConversationRepo, NewConversation};
pub use crud::{Deletable, Entity, Filter, Insertable, ListQuery, Repo, Updatable, Value};
pub use data_points::{DataPoint, DataPointPatch, DataPointRepo, Measurement, NewDataPoint};
pub use experiments::{ExperimentPatch, ExperimentRecord, ExperimentRepo, ExperimentScope, NewExperiment};
pub use inspectors::{Inspector, InspectorPatch, InspectorRepo, NewInspector};
pub use items::{ItemRepo, NewItem, PharmacopoeiaItem, VolumeCount};
pub use lab_access::{AccessibleLab, LabAccess, LabAccessPatch, LabAccessRepo, LabInspector, NewLabAccess};
pub use laboratories::{Laboratory, LaboratoryPatch, LaboratoryRepo, NewLaboratory};
pub use messages::{Message, MessagePatch, MessageRepo, MessageWithItem, NewMessage};
pub use system_config::{NewSystemConfig, SystemConfig, SystemConfigRepo};
