//! User, event and registration management around the reservation protocol.
//!
//! None of these operations touch `available_seats` except
//! [`CatalogStore::create_event`], which initializes it to the capacity.
//! Seats move only through the [`SeatLedger`](crate::ledger::SeatLedger).

use crate::errors::CatalogResult;
use crate::types::{
    Capacity, Email, Event, EventId, EventTitle, Registration, RegistrationId, User, UserId,
    UserName, UserRole,
};
use serde::Deserialize;
use std::future::Future;

/// Input for creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    /// Display name.
    pub name: UserName,
    /// Contact address; must not be used by another user.
    pub email: Email,
    /// Defaults to attendee.
    #[serde(default)]
    pub role: UserRole,
}

/// Input for creating an event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewEvent {
    /// Title shown to attendees.
    pub title: EventTitle,
    /// Seats offered; fixed for the lifetime of the event.
    pub capacity: Capacity,
    /// Publishing user; must exist.
    pub organizer_id: UserId,
}

/// CRUD operations over users, events and registrations.
///
/// Deleting a user who still holds registrations fails with
/// [`CatalogError::UserHasRegistrations`](crate::errors::CatalogError::UserHasRegistrations),
/// and deleting one who still organizes events fails with
/// [`CatalogError::UserOrganizesEvents`](crate::errors::CatalogError::UserOrganizesEvents).
/// Deleting an event removes its registrations together with its ledger row.
pub trait CatalogStore: Send + Sync {
    /// Creates a user.
    fn create_user(&self, new_user: NewUser) -> impl Future<Output = CatalogResult<User>> + Send;

    /// Fetches a user.
    fn get_user(&self, user_id: UserId) -> impl Future<Output = CatalogResult<User>> + Send;

    /// Lists all users, oldest first.
    fn list_users(&self) -> impl Future<Output = CatalogResult<Vec<User>>> + Send;

    /// Deletes a user who neither holds registrations nor organizes events.
    fn delete_user(&self, user_id: UserId) -> impl Future<Output = CatalogResult<()>> + Send;

    /// Creates an event with every seat free.
    fn create_event(
        &self,
        new_event: NewEvent,
    ) -> impl Future<Output = CatalogResult<Event>> + Send;

    /// Fetches an event with its current seat count.
    fn get_event(&self, event_id: EventId) -> impl Future<Output = CatalogResult<Event>> + Send;

    /// Lists all events, oldest first.
    fn list_events(&self) -> impl Future<Output = CatalogResult<Vec<Event>>> + Send;

    /// Lists the events published by one organizer, oldest first.
    fn list_events_by_organizer(
        &self,
        organizer_id: UserId,
    ) -> impl Future<Output = CatalogResult<Vec<Event>>> + Send;

    /// Renames an event. Capacity and seats are left alone.
    fn update_event_title(
        &self,
        event_id: EventId,
        title: EventTitle,
    ) -> impl Future<Output = CatalogResult<Event>> + Send;

    /// Deletes an event and every registration for it.
    fn delete_event(&self, event_id: EventId) -> impl Future<Output = CatalogResult<()>> + Send;

    /// Fetches a registration.
    fn get_registration(
        &self,
        registration_id: RegistrationId,
    ) -> impl Future<Output = CatalogResult<Registration>> + Send;

    /// Lists a user's registrations, oldest first.
    fn list_registrations_by_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = CatalogResult<Vec<Registration>>> + Send;

    /// Lists an event's registrations, oldest first.
    fn list_registrations_by_event(
        &self,
        event_id: EventId,
    ) -> impl Future<Output = CatalogResult<Vec<Registration>>> + Send;
}
