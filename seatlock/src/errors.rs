//! Error types for seatlock.
//!
//! Errors are split by layer:
//!
//! - **StoreError**: infrastructure failures reported by a backend, tagged with
//!   the [`Operation`] that failed and classified as transient or not
//! - **LedgerError**: outcomes of the seat ledger primitives
//! - **RegistrationError**: the closed set of outcomes of the reservation
//!   protocol other than success
//! - **CatalogError**: failures of the user and event management operations
//!
//! Every caller-facing error maps onto an [`ErrorClass`], which decides
//! whether a retry can help.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! match coordinator.register(user_id, event_id).await {
//!     Ok(registration) => confirm(registration),
//!     Err(RegistrationError::EventFull(_)) => offer_waitlist(),
//!     Err(error) if error.is_retryable() => schedule_retry(),
//!     Err(error) => return Err(error.into()),
//! }
//! ```

use crate::types::{Email, EventId, UserId};
use thiserror::Error;

/// Identifies the store operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Opening a transaction.
    BeginTransaction,
    /// Committing a transaction.
    CommitTransaction,
    /// Rolling a transaction back.
    RollbackTransaction,
    /// Looking a user up.
    FindUser,
    /// Looking a registration up.
    FindRegistration,
    /// Taking the exclusive lock on an event's ledger row.
    LockEvent,
    /// The conditional seat decrement.
    ReserveSeat,
    /// The seat increment on cancellation.
    ReleaseSeat,
    /// Inserting a registration row.
    InsertRegistration,
    /// Deleting a registration row.
    DeleteRegistration,
    /// Creating a user.
    CreateUser,
    /// Deleting a user.
    DeleteUser,
    /// Listing users.
    ListUsers,
    /// Creating an event.
    CreateEvent,
    /// Reading an event outside a reservation transaction.
    FindEvent,
    /// Listing events.
    ListEvents,
    /// Updating event details.
    UpdateEvent,
    /// Deleting an event.
    DeleteEvent,
    /// Listing registrations.
    ListRegistrations,
    /// Running schema migrations.
    Migrate,
}

impl Operation {
    /// Stable snake_case name used in logs and error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeginTransaction => "begin_transaction",
            Self::CommitTransaction => "commit_transaction",
            Self::RollbackTransaction => "rollback_transaction",
            Self::FindUser => "find_user",
            Self::FindRegistration => "find_registration",
            Self::LockEvent => "lock_event",
            Self::ReserveSeat => "reserve_seat",
            Self::ReleaseSeat => "release_seat",
            Self::InsertRegistration => "insert_registration",
            Self::DeleteRegistration => "delete_registration",
            Self::CreateUser => "create_user",
            Self::DeleteUser => "delete_user",
            Self::ListUsers => "list_users",
            Self::CreateEvent => "create_event",
            Self::FindEvent => "find_event",
            Self::ListEvents => "list_events",
            Self::UpdateEvent => "update_event",
            Self::DeleteEvent => "delete_event",
            Self::ListRegistrations => "list_registrations",
            Self::Migrate => "migrate",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a failure, used to pick the caller's reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// A referenced user or event does not exist. Do not retry.
    NotFound,
    /// A business rule rejected the request. Do not retry.
    Conflict,
    /// Lock timeout, deadlock, commit or connectivity failure. Safe to retry.
    Transient,
    /// An infrastructure failure that retrying will not fix.
    Internal,
}

/// Failures reported by a storage backend.
///
/// # Retry Strategy
///
/// Only errors for which [`StoreError::is_transient`] returns `true` are worth
/// retrying. Every backend operation runs inside a transaction that is rolled
/// back on failure, so a retry always starts from clean state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Waiting for a row lock exceeded the configured lock timeout.
    #[error("{operation} timed out waiting for a row lock")]
    LockTimeout {
        /// The operation that was waiting.
        operation: Operation,
    },

    /// The store aborted this transaction to break a deadlock.
    #[error("{operation} was chosen as a deadlock victim")]
    Deadlock {
        /// The operation that was aborted.
        operation: Operation,
    },

    /// The store could not serialize this transaction against a concurrent one.
    #[error("{operation} failed with a serialization conflict")]
    SerializationConflict {
        /// The operation that was aborted.
        operation: Operation,
    },

    /// The store could not be reached or dropped the connection.
    #[error("store unavailable during {operation}: {detail}")]
    Unavailable {
        /// The operation in flight.
        operation: Operation,
        /// Driver-provided description.
        detail: String,
    },

    /// A write violated a uniqueness constraint.
    #[error("unique constraint {constraint} violated")]
    UniqueViolation {
        /// Name of the violated constraint.
        constraint: String,
    },

    /// A write referenced a row that does not exist.
    #[error("foreign key constraint {constraint} violated")]
    ForeignKeyViolation {
        /// Name of the violated constraint.
        constraint: String,
    },

    /// A write would have broken a schema-level check such as
    /// `available_seats <= capacity`.
    #[error("check constraint {constraint} violated")]
    CheckViolation {
        /// Name of the violated constraint.
        constraint: String,
    },

    /// A stored row could not be decoded into a domain value.
    #[error("stored row is malformed: {detail}")]
    Corrupted {
        /// What failed to decode.
        detail: String,
    },

    /// Any other failure of a store operation.
    #[error("{operation} operation failed: {detail}")]
    StoreFailure {
        /// The operation that failed.
        operation: Operation,
        /// Driver-provided description.
        detail: String,
    },
}

impl StoreError {
    /// Whether retrying the whole unit of work may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. }
                | Self::Deadlock { .. }
                | Self::SerializationConflict { .. }
                | Self::Unavailable { .. }
        )
    }

    /// Classification of this error.
    pub const fn class(&self) -> ErrorClass {
        if self.is_transient() {
            ErrorClass::Transient
        } else {
            ErrorClass::Internal
        }
    }
}

/// Outcomes of the seat ledger primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// No ledger row exists for the event.
    #[error("event {0} not found")]
    EventNotFound(EventId),

    /// The conditional decrement matched no row: no seat was free at the
    /// instant of the write.
    #[error("no seats left for event {0}")]
    SeatsExhausted(EventId),

    /// The backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Every way `register` can fail.
///
/// The set is closed: callers can match exhaustively and map each variant to
/// a response without guessing.
///
/// # Error Handling Strategy
///
/// - **UserNotFound / EventNotFound**: report, do not retry
/// - **AlreadyRegistered / EventFull**: report, do not retry
/// - **Transient**: the coordinator already retried according to its
///   [`RetryPolicy`](crate::retry::RetryPolicy); the caller may retry again
/// - **Store**: log and investigate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The user does not exist.
    #[error("user {0} not found")]
    UserNotFound(UserId),

    /// The event does not exist.
    #[error("event {0} not found")]
    EventNotFound(EventId),

    /// The user already holds a seat for this event.
    #[error("user {user_id} is already registered for event {event_id}")]
    AlreadyRegistered {
        /// The user.
        user_id: UserId,
        /// The event.
        event_id: EventId,
    },

    /// No seats are left.
    #[error("event {0} is full")]
    EventFull(EventId),

    /// The transaction was aborted by a retryable infrastructure failure. No
    /// partial state was committed.
    #[error("transient failure: {0}")]
    Transient(StoreError),

    /// The transaction was aborted by a failure retrying will not fix.
    #[error("store failure: {0}")]
    Store(StoreError),
}

impl RegistrationError {
    /// Classification of this error.
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::UserNotFound(_) | Self::EventNotFound(_) => ErrorClass::NotFound,
            Self::AlreadyRegistered { .. } | Self::EventFull(_) => ErrorClass::Conflict,
            Self::Transient(_) => ErrorClass::Transient,
            Self::Store(_) => ErrorClass::Internal,
        }
    }

    /// Whether running the whole registration again may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<StoreError> for RegistrationError {
    fn from(error: StoreError) -> Self {
        if error.is_transient() {
            Self::Transient(error)
        } else {
            Self::Store(error)
        }
    }
}

/// Failures of user and event management.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The user does not exist.
    #[error("user {0} not found")]
    UserNotFound(UserId),

    /// The event does not exist.
    #[error("event {0} not found")]
    EventNotFound(EventId),

    /// The registration does not exist.
    #[error("registration not found")]
    RegistrationNotFound,

    /// An event names an organizer that does not exist.
    #[error("organizer {0} not found")]
    OrganizerNotFound(UserId),

    /// Another user already uses this email address.
    #[error("email {0} is already in use")]
    DuplicateEmail(Email),

    /// The user still holds seats; deleting them would orphan those seats.
    #[error("user {0} still holds registrations")]
    UserHasRegistrations(UserId),

    /// The user still organizes events.
    #[error("user {0} still organizes events")]
    UserOrganizesEvents(UserId),

    /// The backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CatalogError {
    /// Classification of this error.
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::UserNotFound(_)
            | Self::EventNotFound(_)
            | Self::RegistrationNotFound
            | Self::OrganizerNotFound(_) => ErrorClass::NotFound,
            Self::DuplicateEmail(_)
            | Self::UserHasRegistrations(_)
            | Self::UserOrganizesEvents(_) => ErrorClass::Conflict,
            Self::Store(error) => error.class(),
        }
    }
}

/// Type alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for ledger results.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Type alias for registration results.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// Type alias for catalog results.
pub type CatalogResult<T> = Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_messages_name_the_operation() {
        let err = StoreError::LockTimeout {
            operation: Operation::LockEvent,
        };
        assert_eq!(err.to_string(), "lock_event timed out waiting for a row lock");

        let err = StoreError::Unavailable {
            operation: Operation::CommitTransaction,
            detail: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "store unavailable during commit_transaction: connection reset"
        );
    }

    #[test]
    fn only_lock_commit_and_connectivity_failures_are_transient() {
        let transient = [
            StoreError::LockTimeout {
                operation: Operation::LockEvent,
            },
            StoreError::Deadlock {
                operation: Operation::ReserveSeat,
            },
            StoreError::SerializationConflict {
                operation: Operation::CommitTransaction,
            },
            StoreError::Unavailable {
                operation: Operation::BeginTransaction,
                detail: "pool timed out".to_string(),
            },
        ];
        for error in &transient {
            assert!(error.is_transient(), "{error} should be transient");
            assert_eq!(error.class(), ErrorClass::Transient);
        }

        let permanent = [
            StoreError::UniqueViolation {
                constraint: "registrations_user_event_key".to_string(),
            },
            StoreError::CheckViolation {
                constraint: "events_seats_within_capacity".to_string(),
            },
            StoreError::Corrupted {
                detail: "negative capacity".to_string(),
            },
        ];
        for error in &permanent {
            assert!(!error.is_transient(), "{error} should not be transient");
            assert_eq!(error.class(), ErrorClass::Internal);
        }
    }

    #[test]
    fn store_error_converts_by_transience() {
        let transient: RegistrationError = StoreError::Deadlock {
            operation: Operation::LockEvent,
        }
        .into();
        assert!(matches!(transient, RegistrationError::Transient(_)));
        assert!(transient.is_retryable());

        let permanent: RegistrationError = StoreError::CheckViolation {
            constraint: "events_seats_within_capacity".to_string(),
        }
        .into();
        assert!(matches!(permanent, RegistrationError::Store(_)));
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn registration_errors_map_onto_the_taxonomy() {
        let user_id = UserId::generate();
        let event_id = EventId::generate();

        assert_eq!(
            RegistrationError::UserNotFound(user_id).class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            RegistrationError::EventNotFound(event_id).class(),
            ErrorClass::NotFound
        );
        assert_eq!(
            RegistrationError::EventFull(event_id).class(),
            ErrorClass::Conflict
        );
        assert_eq!(
            RegistrationError::AlreadyRegistered { user_id, event_id }.class(),
            ErrorClass::Conflict
        );
    }

    #[test]
    fn ledger_error_wraps_store_error_transparently() {
        let store = StoreError::LockTimeout {
            operation: Operation::LockEvent,
        };
        let ledger: LedgerError = store.clone().into();
        assert_eq!(ledger.to_string(), store.to_string());
    }

    #[test]
    fn catalog_store_errors_keep_their_class() {
        let err: CatalogError = StoreError::Unavailable {
            operation: Operation::ListEvents,
            detail: "io".to_string(),
        }
        .into();
        assert_eq!(err.class(), ErrorClass::Transient);
        assert_eq!(
            CatalogError::UserHasRegistrations(UserId::generate()).class(),
            ErrorClass::Conflict
        );
    }
}
