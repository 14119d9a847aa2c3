//! pharmadb-core: storage-independent domain for the pharmacopoeia
//! inspection store.

pub mod config;
pub mod error;
pub mod models;

#[cfg(feature = "sqlx")]
mod pg;

pub use config::{IsolationLevel, PoolConfig, StoreConfig, TransactionConfig};
pub use error::{CoreError, Result};
pub use models::{
    ExperimentResult, ExperimentStatus, OrderBy, Paginated, Pagination, SenderType, SortOrder,
    StandardRange, ValidationError,
};
