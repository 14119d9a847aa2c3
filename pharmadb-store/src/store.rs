//! Store handle - the pool plus the configuration that shapes sessions

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::PgPool;
use tokio::time::Instant;
use tracing::{info, warn};

use pharmadb_core::StoreConfig;

use crate::db::repos::NewMessage;
use crate::db::{create_pool, Session};
use crate::error::{StoreError, StoreResult};
use crate::schema::{self, SchemaReport};
use crate::workflows::{append_message_to_conversation, AppendedMessage};

/// Entry point to the database. Cheap to clone; clones share one pool.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    config: Arc<StoreConfig>,
}

impl Store {
    /// Validate `config` and open the pool.
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        config
            .validate()
            .map_err(|err| StoreError::invalid("config", err.to_string()))?;
        let pool = create_pool(&config.database_url, &config.pool).await?;
        info!(
            max_connections = config.pool.max_connections,
            isolation = config.transactions.isolation.as_sql(),
            "store connected"
        );
        Ok(Self::from_pool(pool, config))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, config: StoreConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Borrow a connection; its session deadline starts now.
    pub async fn acquire(&self) -> StoreResult<Session> {
        self.acquire_with_deadline(Instant::now() + self.config.transaction_timeout())
            .await
    }

    /// Borrow a connection whose transactions must finish by `deadline`.
    ///
    /// Waiting for a free connection counts against the deadline; an
    /// exhausted pool fails with `ResourceExhausted` after at most the
    /// configured acquire timeout.
    pub async fn acquire_with_deadline(&self, deadline: Instant) -> StoreResult<Session> {
        let started = Instant::now();
        let conn = match tokio::time::timeout_at(deadline, self.pool.acquire()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(sqlx::Error::PoolTimedOut)) => {
                warn!(waited = ?started.elapsed(), "connection pool exhausted");
                return Err(StoreError::ResourceExhausted {
                    waited: Some(self.config.acquire_timeout()),
                });
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                warn!(waited = ?started.elapsed(), "deadline reached while waiting for a connection");
                return Err(StoreError::ResourceExhausted {
                    waited: Some(started.elapsed()),
                });
            }
        };
        Ok(Session::new(conn, self.config.transactions.isolation, deadline))
    }

    /// Acquire a session and run `body` in a transaction on it.
    pub async fn transaction<T, F>(&self, body: F) -> StoreResult<T>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, StoreResult<T>> + Send,
    {
        let mut session = self.acquire().await?;
        session.within_transaction(body).await
    }

    pub async fn initialize_schema(&self) -> StoreResult<()> {
        schema::initialize_schema(&self.pool).await
    }

    pub async fn create_indexes(&self) -> StoreResult<()> {
        schema::create_indexes(&self.pool).await
    }

    pub async fn verify_schema(&self) -> StoreResult<SchemaReport> {
        schema::verify_schema(&self.pool).await
    }

    /// `append_message_to_conversation` on a fresh session, rerun when the
    /// transaction hits a serialization failure or deadlock.
    pub async fn append_message(
        &self,
        conversation_id: i64,
        message: NewMessage,
    ) -> StoreResult<AppendedMessage> {
        let limit = self.config.transactions.append_retry_limit;
        let mut attempt = 0;
        loop {
            let mut session = self.acquire().await?;
            match append_message_to_conversation(&mut session, conversation_id, message.clone()).await {
                Err(err) if err.is_retryable() && attempt < limit => {
                    attempt += 1;
                    warn!(conversation_id, attempt, error = %err, "retrying message append");
                    drop(session);
                    tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
                }
                outcome => return outcome,
            }
        }
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("store closed");
    }
}
