//! Scoped sessions and transaction boundaries
//!
//! A `Session` owns one pooled connection for its whole life and hands it
//! back on drop. Transactions:
//!
//! - `within_transaction` commits when the body returns `Ok`, rolls back
//!   and returns the body's error unchanged otherwise
//! - nested calls become savepoints; only the outermost call commits
//! - the session deadline is enforced twice: `SET LOCAL statement_timeout`
//!   on the server and a client-side timer around the body
//! - a connection whose transaction outcome is unknown (deadline hit,
//!   session dropped mid-transaction) is closed, never reused

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::{Executor, PgConnection, Postgres};
use tokio::time::Instant;
use tracing::{debug, warn};

use pharmadb_core::IsolationLevel;

use crate::db::repos::{Entity, Repo};
use crate::error::{AbortReason, StoreError, StoreResult};
use crate::reports::Reports;

/// A pooled connection with a bounded lifetime
pub struct Session {
    conn: PoolConnection<Postgres>,
    isolation: IsolationLevel,
    deadline: Instant,
    depth: u32,
    abandoned: bool,
}

impl Session {
    pub(crate) fn new(
        conn: PoolConnection<Postgres>,
        isolation: IsolationLevel,
        deadline: Instant,
    ) -> Self {
        Self {
            conn,
            isolation,
            deadline,
            depth: 0,
            abandoned: false,
        }
    }

    /// Raw connection for ad-hoc statements.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// Repository for entity `E` bound to this session.
    pub fn repo<E: Entity>(&mut self) -> Repo<'_, E> {
        Repo::new(&mut self.conn)
    }

    /// Reporting queries bound to this session.
    pub fn reports(&mut self) -> Reports<'_> {
        Reports::new(&mut self.conn)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Replace the deadline. Applies to transactions started afterwards.
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = deadline;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.deadline = Instant::now() + timeout;
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Number of open transaction levels (0 outside a transaction).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Run `body` inside a transaction on this session.
    ///
    /// ```ignore
    /// let id = session
    ///     .within_transaction(move |s| Box::pin(async move {
    ///         s.repo::<Inspector>().create(&new_inspector).await
    ///     }))
    ///     .await?;
    /// ```
    pub async fn within_transaction<T, F>(&mut self, body: F) -> StoreResult<T>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, StoreResult<T>> + Send,
    {
        let isolation = self.isolation;
        self.within_transaction_at(isolation, body).await
    }

    /// `within_transaction` with an explicit isolation level for the
    /// outermost `BEGIN`. Nested calls inherit the open transaction's level.
    pub async fn within_transaction_at<T, F>(
        &mut self,
        isolation: IsolationLevel,
        body: F,
    ) -> StoreResult<T>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, StoreResult<T>> + Send,
    {
        if self.abandoned {
            return Err(StoreError::aborted(AbortReason::SessionAbandoned));
        }
        if self.depth > 0 {
            return self.within_savepoint(body).await;
        }

        let deadline = self.deadline;
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .filter(|left| !left.is_zero())
            .ok_or_else(|| StoreError::aborted(AbortReason::DeadlineExceeded))?;

        self.begin(isolation, remaining).await?;

        let timed = tokio::time::timeout_at(deadline, body(self)).await;
        let outcome = match timed {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(?remaining, "transaction deadline exceeded, discarding connection");
                self.abandon();
                return Err(StoreError::aborted(AbortReason::DeadlineExceeded));
            }
        };

        // depth stays at 1 until COMMIT/ROLLBACK returns; Drop relies on it
        match outcome {
            Ok(value) => {
                let committed = self.execute("COMMIT").await;
                self.depth = 0;
                if let Err(err) = committed {
                    warn!(error = %err, "commit failed");
                    return Err(commit_error(err));
                }
                debug!("transaction committed");
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "rolling back transaction");
                let rolled_back = self.execute("ROLLBACK").await;
                self.depth = 0;
                if let Err(rollback_err) = rolled_back {
                    warn!(error = %rollback_err, "rollback failed, discarding connection");
                    self.abandon();
                }
                Err(err)
            }
        }
    }

    async fn within_savepoint<T, F>(&mut self, body: F) -> StoreResult<T>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, StoreResult<T>> + Send,
    {
        let savepoint = format!("pharmadb_sp_{}", self.depth);
        self.execute(&format!("SAVEPOINT {savepoint}")).await?;
        debug!(%savepoint, "savepoint opened");
        self.depth += 1;

        let outcome = body(self).await;
        self.depth -= 1;

        match outcome {
            Ok(value) => {
                self.execute(&format!("RELEASE SAVEPOINT {savepoint}")).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self
                    .execute(&format!("ROLLBACK TO SAVEPOINT {savepoint}"))
                    .await
                {
                    warn!(error = %rollback_err, %savepoint, "rollback to savepoint failed");
                }
                Err(err)
            }
        }
    }

    /// Opens the transaction and leaves `depth` at 1. The session counts as
    /// in a transaction from before `BEGIN` is sent.
    async fn begin(&mut self, isolation: IsolationLevel, remaining: Duration) -> StoreResult<()> {
        self.depth = 1;
        if let Err(err) = self
            .execute(&format!("BEGIN ISOLATION LEVEL {}", isolation.as_sql()))
            .await
        {
            self.depth = 0;
            return Err(err.into());
        }
        // SET LOCAL takes no bind parameters; the value is an integer we built
        let timeout_ms = remaining.as_millis().max(1);
        if let Err(err) = self
            .execute(&format!("SET LOCAL statement_timeout = {timeout_ms}"))
            .await
        {
            if self.execute("ROLLBACK").await.is_err() {
                self.abandon();
            }
            self.depth = 0;
            return Err(err.into());
        }
        debug!(isolation = isolation.as_sql(), timeout_ms, "transaction started");
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        let conn: &mut PgConnection = &mut self.conn;
        conn.execute(sql).await.map(|_| ())
    }

    fn abandon(&mut self) {
        self.abandoned = true;
        self.depth = 0;
        self.conn.close_on_drop();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("isolation", &self.isolation)
            .field("deadline", &self.deadline)
            .field("depth", &self.depth)
            .field("abandoned", &self.abandoned)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.depth > 0 && !self.abandoned {
            warn!("session dropped inside a transaction, closing connection");
            self.conn.close_on_drop();
        }
    }
}

fn commit_error(err: sqlx::Error) -> StoreError {
    match StoreError::from(err) {
        aborted @ StoreError::TransactionAborted { .. } => aborted,
        StoreError::Database(source) => StoreError::TransactionAborted {
            reason: AbortReason::CommitFailed,
            source: Some(source),
        },
        other => other,
    }
}
