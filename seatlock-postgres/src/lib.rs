//! PostgreSQL backend for `seatlock`
//!
//! The reservation protocol relies on two things the database does for us:
//!
//! - `SELECT ... FOR UPDATE` on the event row serializes every transaction
//!   that touches the same event's seat ledger; waiters are bounded by a
//!   per-transaction `lock_timeout`
//! - the `registrations_user_event_key` unique index rejects a second
//!   registration for the same (user, event) pair, which `INSERT ... ON
//!   CONFLICT DO NOTHING` turns into an ordinary outcome
//!
//! The schema's `events_available_seats_check` keeps the ledger within
//! `0..=capacity` even if a caller gets the protocol wrong.

mod catalog;
mod rows;

use std::num::NonZeroU32;
use std::time::Duration;

use nutype::nutype;
use seatlock::{
    EventId, InsertOutcome, LedgerError, LedgerResult, LockedEvent, Operation, Registration,
    RegistrationStore, RegistrationTransaction, SeatLedger, StoreError, StoreResult, UserId,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{query, query_as, query_scalar, Pool, Postgres, Transaction};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::rows::{capacity_of, LedgerRow, RegistrationRow, REGISTRATION_COLUMNS};

/// Failures while setting the backend up.
#[derive(Debug, Error)]
pub enum PostgresStoreError {
    /// The connection pool could not be created.
    #[error("failed to create postgres connection pool")]
    ConnectionFailed(#[source] sqlx::Error),

    /// Applying the embedded migrations failed.
    #[error("failed to apply postgres migrations")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),
}

/// Maximum number of database connections in the pool.
///
/// Every in-flight reservation holds one connection for the length of its
/// transaction, including the time it waits for the event row lock.
///
/// ```ignore
/// use seatlock_postgres::MaxConnections;
/// use std::num::NonZeroU32;
///
/// let pool_size = MaxConnections::new(NonZeroU32::new(20).unwrap());
/// ```
#[nutype(derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRef, Into))]
pub struct MaxConnections(NonZeroU32);

/// Configuration for [`PostgresStore`].
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: MaxConnections,
    /// Timeout for acquiring a connection from the pool (default: 30 seconds)
    pub acquire_timeout: Duration,
    /// Idle timeout for connections in the pool (default: 10 minutes)
    pub idle_timeout: Duration,
    /// Longest wait for a row lock inside a transaction (default: 5 seconds)
    pub lock_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        const DEFAULT_MAX_CONNECTIONS: NonZeroU32 = match NonZeroU32::new(10) {
            Some(v) => v,
            None => unreachable!(),
        };

        Self {
            max_connections: MaxConnections::new(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// PostgreSQL-backed seatlock store. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Pool<Postgres>,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Connects with the default configuration.
    pub async fn new<S: Into<String>>(connection_string: S) -> Result<Self, PostgresStoreError> {
        Self::with_config(connection_string, PostgresConfig::default()).await
    }

    /// Connects with a custom configuration.
    pub async fn with_config<S: Into<String>>(
        connection_string: S,
        config: PostgresConfig,
    ) -> Result<Self, PostgresStoreError> {
        let connection_string = connection_string.into();
        let max_connections: NonZeroU32 = config.max_connections.into();
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.get())
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&connection_string)
            .await
            .map_err(PostgresStoreError::ConnectionFailed)?;
        Ok(Self {
            pool,
            lock_timeout: config.lock_timeout,
        })
    }

    /// Wraps an existing pool.
    pub const fn from_pool(pool: Pool<Postgres>, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// The underlying connection pool.
    pub const fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    #[instrument(name = "postgres.migrate", skip(self))]
    pub async fn migrate(&self) -> Result<(), PostgresStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|error| {
                error!(%error, "[postgres.migration_failed]");
                PostgresStoreError::MigrationFailed(error)
            })
    }

    /// Round-trips a trivial query.
    pub async fn ping(&self) -> StoreResult<()> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::FindEvent))?;
        Ok(())
    }

    /// Opens a transaction whose lock waits are bounded by the configured
    /// lock timeout.
    async fn begin_bounded(&self, operation: Operation) -> StoreResult<Transaction<'static, Postgres>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::BeginTransaction))?;

        query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx_error(error, operation))?;

        Ok(tx)
    }
}

/// Open transaction on a [`PostgresStore`].
///
/// Dropping it without committing rolls the transaction back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTransaction").finish_non_exhaustive()
    }
}

impl PostgresTransaction {
    async fn event_exists(&mut self, event_id: EventId, operation: Operation) -> StoreResult<bool> {
        query_scalar("SELECT EXISTS (SELECT 1 FROM events WHERE id = $1)")
            .bind(event_id.into_inner())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|error| map_sqlx_error(error, operation))
    }
}

impl SeatLedger for PostgresTransaction {
    #[instrument(name = "postgres.lock_for_update", skip(self))]
    async fn lock_for_update(&mut self, event_id: EventId) -> LedgerResult<LockedEvent> {
        let row: Option<LedgerRow> =
            query_as("SELECT capacity, available_seats FROM events WHERE id = $1 FOR UPDATE")
                .bind(event_id.into_inner())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|error| map_sqlx_error(error, Operation::LockEvent))?;

        let row = row.ok_or(LedgerError::EventNotFound(event_id))?;
        Ok(LockedEvent {
            event_id,
            capacity: capacity_of(&row)?,
            available_seats: row.available_seats,
        })
    }

    #[instrument(name = "postgres.reserve", skip(self))]
    async fn reserve(&mut self, event_id: EventId) -> LedgerResult<()> {
        let result = query(
            "UPDATE events SET available_seats = available_seats - 1
             WHERE id = $1 AND available_seats > 0",
        )
        .bind(event_id.into_inner())
        .execute(&mut *self.tx)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::ReserveSeat))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        if self.event_exists(event_id, Operation::ReserveSeat).await? {
            Err(LedgerError::SeatsExhausted(event_id))
        } else {
            Err(LedgerError::EventNotFound(event_id))
        }
    }

    #[instrument(name = "postgres.release", skip(self))]
    async fn release(&mut self, event_id: EventId) -> LedgerResult<()> {
        let result = query("UPDATE events SET available_seats = available_seats + 1 WHERE id = $1")
            .bind(event_id.into_inner())
            .execute(&mut *self.tx)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReleaseSeat))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::EventNotFound(event_id));
        }
        Ok(())
    }
}

impl RegistrationTransaction for PostgresTransaction {
    async fn find_registration(
        &mut self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreResult<Option<Registration>> {
        let sql = format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE user_id = $1 AND event_id = $2"
        );
        let row: Option<RegistrationRow> = query_as(&sql)
            .bind(user_id.into_inner())
            .bind(event_id.into_inner())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::FindRegistration))?;
        Ok(row.map(Registration::from))
    }

    #[instrument(name = "postgres.insert_registration", skip(self, registration), fields(registration_id = %registration.id))]
    async fn insert_registration(
        &mut self,
        registration: &Registration,
    ) -> StoreResult<InsertOutcome> {
        let result = query(
            "INSERT INTO registrations (id, user_id, event_id, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, event_id) DO NOTHING",
        )
        .bind(registration.id.into_inner())
        .bind(registration.user_id.into_inner())
        .bind(registration.event_id.into_inner())
        .bind(registration.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::InsertRegistration))?;

        if result.rows_affected() == 0 {
            debug!("[postgres.registration_conflict] pair already registered");
            Ok(InsertOutcome::Conflict)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn delete_registration(&mut self, user_id: UserId, event_id: EventId) -> StoreResult<bool> {
        let result = query("DELETE FROM registrations WHERE user_id = $1 AND event_id = $2")
            .bind(user_id.into_inner())
            .bind(event_id.into_inner())
            .execute(&mut *self.tx)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::DeleteRegistration))?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::CommitTransaction))
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::RollbackTransaction))
    }
}

impl RegistrationStore for PostgresStore {
    type Transaction = PostgresTransaction;

    async fn user_exists(&self, user_id: UserId) -> StoreResult<bool> {
        query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id.into_inner())
            .fetch_one(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::FindUser))
    }

    async fn begin(&self) -> StoreResult<PostgresTransaction> {
        let tx = self.begin_bounded(Operation::BeginTransaction).await?;
        Ok(PostgresTransaction { tx })
    }
}

/// Connection-level SQLSTATE classes and codes that a retry can outlive.
fn is_connection_state(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "53300" | "57P01" | "57P02" | "57P03")
}

/// Translates a driver error into the store's taxonomy.
///
/// | SQLSTATE | meaning | result |
/// |---|---|---|
/// | 55P03 | lock_not_available | `LockTimeout` |
/// | 40P01 | deadlock_detected | `Deadlock` |
/// | 40001 | serialization_failure | `SerializationConflict` |
/// | 57014, 08xxx, 53300, 57P0x | canceled or connection loss | `Unavailable` |
/// | 23505 / 23503 / 23514 | constraint violations | matching violation |
pub(crate) fn map_sqlx_error(error: sqlx::Error, operation: Operation) -> StoreError {
    if let sqlx::Error::Database(db_error) = &error {
        let constraint = db_error.constraint().unwrap_or_default().to_string();
        match db_error.code().as_deref() {
            Some("55P03") => {
                warn!(%operation, "[postgres.lock_timeout] gave up waiting for a row lock");
                return StoreError::LockTimeout { operation };
            }
            Some("40P01") => {
                warn!(%operation, "[postgres.deadlock] transaction chosen as deadlock victim");
                return StoreError::Deadlock { operation };
            }
            Some("40001") => {
                warn!(%operation, "[postgres.serialization_failure]");
                return StoreError::SerializationConflict { operation };
            }
            Some("23505") => return StoreError::UniqueViolation { constraint },
            Some("23503") => return StoreError::ForeignKeyViolation { constraint },
            Some("23514") => {
                error!(%operation, %constraint, "[postgres.check_violation]");
                return StoreError::CheckViolation { constraint };
            }
            Some(code) if code == "57014" || is_connection_state(code) => {
                warn!(%operation, code, "[postgres.unavailable]");
                return StoreError::Unavailable {
                    operation,
                    detail: db_error.to_string(),
                };
            }
            _ => {}
        }
    }

    match error {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => {
            warn!(%operation, %error, "[postgres.unavailable]");
            StoreError::Unavailable {
                operation,
                detail: error.to_string(),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            error!(%operation, %error, "[postgres.decode_failed]");
            StoreError::Corrupted {
                detail: error.to_string(),
            }
        }
        other => {
            error!(
                error = %other,
                operation = %operation,
                "[postgres.database_error] database operation failed"
            );
            StoreError::StoreFailure {
                operation,
                detail: other.to_string(),
            }
        }
    }
}
