//! Request handlers, one module per resource.

pub mod events;
pub mod meta;
pub mod registrations;
pub mod users;

use serde::Serialize;

/// Body of responses that only confirm an action.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// What happened.
    pub message: &'static str,
}
