use chrono::Utc;
use seatlock::{
    CatalogError, CatalogResult, CatalogStore, Event, EventId, EventTitle, NewEvent, NewUser,
    Operation, Registration, RegistrationId, StoreError, User, UserId,
};
use sqlx::{query, query_as};
use tracing::{info, instrument};

use crate::rows::{
    collect, EventRow, RegistrationRow, UserRow, EVENT_COLUMNS, REGISTRATION_COLUMNS,
    USER_COLUMNS,
};
use crate::{map_sqlx_error, PostgresStore};

const USERS_EMAIL_KEY: &str = "users_email_key";
const REGISTRATIONS_USER_FK: &str = "registrations_user_id_fkey";
const EVENTS_ORGANIZER_FK: &str = "events_organizer_id_fkey";

impl PostgresStore {
    async fn fetch_events(&self, sql: &str, organizer_id: Option<UserId>) -> CatalogResult<Vec<Event>> {
        let mut statement = query_as::<_, EventRow>(sql);
        if let Some(organizer_id) = organizer_id {
            statement = statement.bind(organizer_id.into_inner());
        }
        let rows = statement
            .fetch_all(self.pool())
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ListEvents))?;
        Ok(collect(rows)?)
    }

    async fn fetch_registrations(&self, column: &str, id: uuid::Uuid) -> CatalogResult<Vec<Registration>> {
        let sql = format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE {column} = $1 ORDER BY created_at, id"
        );
        let rows: Vec<RegistrationRow> = query_as(&sql)
            .bind(id)
            .fetch_all(self.pool())
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ListRegistrations))?;
        Ok(rows.into_iter().map(Registration::from).collect())
    }
}

impl CatalogStore for PostgresStore {
    #[instrument(name = "postgres.create_user", skip(self, new_user), fields(email = %new_user.email))]
    async fn create_user(&self, new_user: NewUser) -> CatalogResult<User> {
        let sql = format!(
            "INSERT INTO users (id, name, email, role, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        );
        let row: UserRow = query_as(&sql)
            .bind(UserId::generate().into_inner())
            .bind(new_user.name.as_str())
            .bind(new_user.email.as_str())
            .bind(new_user.role.as_str())
            .bind(Utc::now())
            .fetch_one(self.pool())
            .await
            .map_err(|error| match map_sqlx_error(error, Operation::CreateUser) {
                StoreError::UniqueViolation { constraint } if constraint == USERS_EMAIL_KEY => {
                    CatalogError::DuplicateEmail(new_user.email.clone())
                }
                other => other.into(),
            })?;
        Ok(User::try_from(row)?)
    }

    async fn get_user(&self, user_id: UserId) -> CatalogResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserRow> = query_as(&sql)
            .bind(user_id.into_inner())
            .fetch_optional(self.pool())
            .await
            .map_err(|error| map_sqlx_error(error, Operation::FindUser))?;
        let row = row.ok_or(CatalogError::UserNotFound(user_id))?;
        Ok(User::try_from(row)?)
    }

    async fn list_users(&self) -> CatalogResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id");
        let rows: Vec<UserRow> = query_as(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ListUsers))?;
        Ok(collect(rows)?)
    }

    #[instrument(name = "postgres.delete_user", skip(self))]
    async fn delete_user(&self, user_id: UserId) -> CatalogResult<()> {
        let result = query("DELETE FROM users WHERE id = $1")
            .bind(user_id.into_inner())
            .execute(self.pool())
            .await
            .map_err(|error| match map_sqlx_error(error, Operation::DeleteUser) {
                StoreError::ForeignKeyViolation { constraint } if constraint == REGISTRATIONS_USER_FK => {
                    CatalogError::UserHasRegistrations(user_id)
                }
                StoreError::ForeignKeyViolation { constraint } if constraint == EVENTS_ORGANIZER_FK => {
                    CatalogError::UserOrganizesEvents(user_id)
                }
                other => other.into(),
            })?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::UserNotFound(user_id));
        }
        info!("[postgres.user_deleted]");
        Ok(())
    }

    #[instrument(name = "postgres.create_event", skip(self, new_event), fields(organizer_id = %new_event.organizer_id))]
    async fn create_event(&self, new_event: NewEvent) -> CatalogResult<Event> {
        let capacity = i32::from(new_event.capacity);
        let sql = format!(
            "INSERT INTO events (id, title, capacity, available_seats, organizer_id, created_at)
             VALUES ($1, $2, $3, $3, $4, $5)
             RETURNING {EVENT_COLUMNS}"
        );
        let row: EventRow = query_as(&sql)
            .bind(EventId::generate().into_inner())
            .bind(new_event.title.as_str())
            .bind(capacity)
            .bind(new_event.organizer_id.into_inner())
            .bind(Utc::now())
            .fetch_one(self.pool())
            .await
            .map_err(|error| match map_sqlx_error(error, Operation::CreateEvent) {
                StoreError::ForeignKeyViolation { constraint } if constraint == EVENTS_ORGANIZER_FK => {
                    CatalogError::OrganizerNotFound(new_event.organizer_id)
                }
                other => other.into(),
            })?;
        Ok(Event::try_from(row)?)
    }

    async fn get_event(&self, event_id: EventId) -> CatalogResult<Event> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        let row: Option<EventRow> = query_as(&sql)
            .bind(event_id.into_inner())
            .fetch_optional(self.pool())
            .await
            .map_err(|error| map_sqlx_error(error, Operation::FindEvent))?;
        let row = row.ok_or(CatalogError::EventNotFound(event_id))?;
        Ok(Event::try_from(row)?)
    }

    async fn list_events(&self) -> CatalogResult<Vec<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY created_at, id");
        self.fetch_events(&sql, None).await
    }

    async fn list_events_by_organizer(&self, organizer_id: UserId) -> CatalogResult<Vec<Event>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE organizer_id = $1 ORDER BY created_at, id"
        );
        self.fetch_events(&sql, Some(organizer_id)).await
    }

    async fn update_event_title(&self, event_id: EventId, title: EventTitle) -> CatalogResult<Event> {
        let sql = format!("UPDATE events SET title = $2 WHERE id = $1 RETURNING {EVENT_COLUMNS}");
        let row: Option<EventRow> = query_as(&sql)
            .bind(event_id.into_inner())
            .bind(title.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(|error| map_sqlx_error(error, Operation::UpdateEvent))?;
        let row = row.ok_or(CatalogError::EventNotFound(event_id))?;
        Ok(Event::try_from(row)?)
    }

    /// Waits for the event row lock, so an in-flight reservation finishes
    /// before its event disappears.
    #[instrument(name = "postgres.delete_event", skip(self))]
    async fn delete_event(&self, event_id: EventId) -> CatalogResult<()> {
        let mut tx = self.begin_bounded(Operation::DeleteEvent).await?;

        let locked = query("SELECT id FROM events WHERE id = $1 FOR UPDATE")
            .bind(event_id.into_inner())
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::DeleteEvent))?;
        if locked.rows_affected() == 0 {
            return Err(CatalogError::EventNotFound(event_id));
        }

        query("DELETE FROM events WHERE id = $1")
            .bind(event_id.into_inner())
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::DeleteEvent))?;

        tx.commit()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::CommitTransaction))?;
        info!("[postgres.event_deleted]");
        Ok(())
    }

    async fn get_registration(&self, registration_id: RegistrationId) -> CatalogResult<Registration> {
        let sql = format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1");
        let row: Option<RegistrationRow> = query_as(&sql)
            .bind(registration_id.into_inner())
            .fetch_optional(self.pool())
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ListRegistrations))?;
        row.map(Registration::from)
            .ok_or(CatalogError::RegistrationNotFound)
    }

    async fn list_registrations_by_user(&self, user_id: UserId) -> CatalogResult<Vec<Registration>> {
        self.fetch_registrations("user_id", user_id.into_inner()).await
    }

    async fn list_registrations_by_event(
        &self,
        event_id: EventId,
    ) -> CatalogResult<Vec<Registration>> {
        self.fetch_registrations("event_id", event_id.into_inner()).await
    }
}
