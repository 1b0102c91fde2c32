//! Row shapes read from the schema and their conversion into domain values.

use chrono::{DateTime, Utc};
use seatlock::{
    Capacity, Email, Event, EventId, EventTitle, Registration, RegistrationId, StoreError, User,
    UserId, UserName, UserRole,
};
use sqlx::FromRow;
use uuid::Uuid;

pub(crate) const USER_COLUMNS: &str = "id, name, email, role, created_at";
pub(crate) const EVENT_COLUMNS: &str =
    "id, title, capacity, available_seats, organizer_id, created_at";
pub(crate) const REGISTRATION_COLUMNS: &str = "id, user_id, event_id, created_at";

fn corrupted(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupted {
        detail: format!("{what}: {detail}"),
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId::new(row.id),
            name: UserName::try_new(row.name).map_err(|e| corrupted("users.name", e))?,
            email: Email::try_new(row.email).map_err(|e| corrupted("users.email", e))?,
            role: UserRole::parse(&row.role)
                .ok_or_else(|| corrupted("users.role", &row.role))?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct EventRow {
    id: Uuid,
    title: String,
    capacity: i32,
    available_seats: i32,
    organizer_id: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: EventId::new(row.id),
            title: EventTitle::try_new(row.title).map_err(|e| corrupted("events.title", e))?,
            capacity: Capacity::try_new(row.capacity)
                .map_err(|e| corrupted("events.capacity", e))?,
            available_seats: row.available_seats,
            organizer_id: UserId::new(row.organizer_id),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct RegistrationRow {
    id: Uuid,
    user_id: Uuid,
    event_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<RegistrationRow> for Registration {
    fn from(row: RegistrationRow) -> Self {
        Self {
            id: RegistrationId::new(row.id),
            user_id: UserId::new(row.user_id),
            event_id: EventId::new(row.event_id),
            created_at: row.created_at,
        }
    }
}

/// Ledger columns of an event, read under `FOR UPDATE`.
#[derive(Debug, FromRow)]
pub(crate) struct LedgerRow {
    pub(crate) capacity: i32,
    pub(crate) available_seats: i32,
}

pub(crate) fn capacity_of(row: &LedgerRow) -> Result<Capacity, StoreError> {
    Capacity::try_new(row.capacity).map_err(|e| corrupted("events.capacity", e))
}

pub(crate) fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}
