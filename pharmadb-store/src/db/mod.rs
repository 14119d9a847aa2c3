//! Database layer - pool, sessions and repositories
//!
//! # Design Principles
//!
//! - One `PgPool` per process; sessions own a pooled connection, never a
//!   shared `Arc<Mutex<Connection>>`
//! - Constraint failures are translated once, in `StoreError`
//! - Multi-step writes run inside `Session::within_transaction`

pub mod pool;
pub mod repos;
pub mod session;

pub use pool::create_pool;
pub use repos::*;
pub use session::Session;
