//! pharmadb-store: PostgreSQL data access for the pharmacopoeia
//! inspection schema.
//!
//! - [`Store`] owns the connection pool and hands out [`Session`]s
//! - [`Session::within_transaction`] scopes a transaction (savepoints
//!   when nested) with a deadline
//! - `Repo<E>` gives every entity the same CRUD surface plus its finders
//! - [`workflows`] are the multi-table writes that must be atomic
//! - [`Reports`] holds the read-only aggregate queries
//!
//! ```ignore
//! let store = Store::connect(StoreConfig::load()?).await?;
//! store.initialize_schema().await?;
//!
//! let mut session = store.acquire().await?;
//! let inspector = session.repo::<Inspector>().get(42).await?;
//! ```

pub mod db;
pub mod error;
pub mod reports;
pub mod schema;
pub mod store;
pub mod workflows;

pub use db::repos::*;
pub use db::Session;
pub use error::{AbortReason, StoreError, StoreResult};
pub use reports::{ConversationSearch, Reports};
pub use schema::{table_names, SchemaReport};
pub use store::Store;

pub use pharmadb_core::{
    ExperimentResult, ExperimentStatus, IsolationLevel, OrderBy, Paginated, Pagination, SenderType,
    StandardRange, StoreConfig,
};
