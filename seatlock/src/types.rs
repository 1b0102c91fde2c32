//! Core types for seatlock.
//!
//! Identifiers are opaque UUIDs; user-supplied values go through smart
//! constructors so that anything past the request boundary is already valid.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a user (attendee or organizer).
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Deref,
    Display,
    Serialize,
    Deserialize
))]
pub struct UserId(Uuid);

impl UserId {
    /// Generates a fresh, time-ordered identifier.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// Identifies an event and, with it, the event's seat ledger row.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Deref,
    Display,
    Serialize,
    Deserialize
))]
pub struct EventId(Uuid);

impl EventId {
    /// Generates a fresh, time-ordered identifier.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// Identifies a single registration row.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Deref,
    Display,
    Serialize,
    Deserialize
))]
pub struct RegistrationId(Uuid);

impl RegistrationId {
    /// Generates a fresh, time-ordered identifier.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// Total number of seats an event offers. Always positive.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct Capacity(i32);

/// Human readable event title.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventTitle(String);

/// Display name of a user.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct UserName(String);

/// Contact address of a user, unique across all users.
#[nutype(
    sanitize(trim, lowercase),
    validate(not_empty, len_char_max = 255, predicate = looks_like_email),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct Email(String);

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// Role a user plays in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Publishes events.
    Organizer,
    /// Registers for events.
    #[default]
    Attendee,
}

impl UserRole {
    /// Storage representation of the role.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Organizer => "organizer",
            Self::Attendee => "attendee",
        }
    }

    /// Parses the storage representation back into a role.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "organizer" => Some(Self::Organizer),
            "attendee" => Some(Self::Attendee),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identity.
    pub id: UserId,
    /// Display name.
    pub name: UserName,
    /// Unique contact address.
    pub email: Email,
    /// Organizer or attendee.
    pub role: UserRole,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}

/// An event together with its seat ledger.
///
/// `available_seats` is owned by the store; a value held in memory is a
/// snapshot and is never written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Identity.
    pub id: EventId,
    /// Title shown to attendees.
    pub title: EventTitle,
    /// Seats offered.
    pub capacity: Capacity,
    /// Seats still free at the time this snapshot was read.
    pub available_seats: i32,
    /// The user who published the event.
    pub organizer_id: UserId,
    /// When the event was created.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Seats currently held by live registrations.
    pub fn registered_seats(&self) -> i32 {
        i32::from(self.capacity) - self.available_seats
    }
}

/// A user's claim on one seat of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Identity.
    pub id: RegistrationId,
    /// Who holds the seat.
    pub user_id: UserId,
    /// Which event the seat belongs to.
    pub event_id: EventId,
    /// When the seat was reserved.
    pub created_at: DateTime<Utc>,
}

impl Registration {
    /// Builds the row a reservation transaction will insert.
    pub fn new(user_id: UserId, event_id: EventId) -> Self {
        Self {
            id: RegistrationId::generate(),
            user_id,
            event_id,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn capacity_accepts_positive_values(v in 1i32..=i32::MAX) {
            let capacity = Capacity::try_new(v);
            prop_assert!(capacity.is_ok());
            let value: i32 = capacity.unwrap().into();
            prop_assert_eq!(value, v);
        }

        #[test]
        fn capacity_rejects_zero_and_negative_values(v in i32::MIN..=0i32) {
            prop_assert!(Capacity::try_new(v).is_err());
        }

        #[test]
        fn event_title_trims_whitespace(s in " {0,10}[a-zA-Z0-9 _-]{0,200}[a-zA-Z0-9] {0,10}") {
            let title = EventTitle::try_new(s.clone()).unwrap();
            prop_assert_eq!(title.as_ref(), s.trim());
        }

        #[test]
        fn event_title_rejects_blank_strings(s in "[ \t]{0,50}") {
            prop_assert!(EventTitle::try_new(s).is_err());
        }

        #[test]
        fn user_name_rejects_strings_over_255_chars(s in "[a-zA-Z]{256,400}") {
            prop_assert!(UserName::try_new(s).is_err());
        }

        #[test]
        fn email_accepts_simple_addresses(local in "[a-z0-9.]{1,30}", domain in "[a-z0-9]{1,20}\\.[a-z]{2,5}") {
            let raw = format!("{local}@{domain}");
            let email = Email::try_new(raw.clone());
            prop_assert!(email.is_ok());
            let email = email.unwrap();
            prop_assert_eq!(email.as_ref(), raw.as_str());
        }
    }

    #[test]
    fn email_rejects_missing_or_repeated_at_sign() {
        assert!(Email::try_new("no-at-sign.example.com").is_err());
        assert!(Email::try_new("@example.com").is_err());
        assert!(Email::try_new("someone@").is_err());
        assert!(Email::try_new("a@b@c.com").is_err());
    }

    #[test]
    fn email_is_normalized_to_lowercase() {
        let email = Email::try_new("  Ada@Example.COM ").unwrap();
        assert_eq!(email.as_ref(), "ada@example.com");
    }

    #[test]
    fn generated_ids_are_distinct_uuid_v7() {
        let first = EventId::generate();
        let second = EventId::generate();
        assert_ne!(first, second);
        assert_eq!(first.as_ref().get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn ids_serialize_as_plain_uuid_strings() {
        let id = UserId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.into_inner()));
    }

    #[test]
    fn capacity_deserialization_rejects_zero() {
        let result: Result<Capacity, _> = serde_json::from_str("0");
        assert!(result.is_err());
    }

    #[test]
    fn user_role_round_trips_through_storage_representation() {
        for role in [UserRole::Organizer, UserRole::Attendee] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("admin"), None);
    }

    #[test]
    fn registered_seats_is_capacity_minus_available() {
        let event = Event {
            id: EventId::generate(),
            title: EventTitle::try_new("Rust meetup").unwrap(),
            capacity: Capacity::try_new(10).unwrap(),
            available_seats: 3,
            organizer_id: UserId::generate(),
            created_at: Utc::now(),
        };
        assert_eq!(event.registered_seats(), 7);
    }
}
