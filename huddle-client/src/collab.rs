//! Contracts for the external collaborators the core depends on.
//!
//! The backend-as-a-service glue (auth, relational tables, change feeds)
//! lives outside this crate; the core only sees these seams.  Tests inject
//! in-memory fakes.

use anyhow::Result;
use huddle_types::{Callback, CallRecord, CallStatus, PresenceStatus};

/// Identity for the local user plus lookups for remote participants.
#[derive(Clone, Debug, PartialEq)]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub status: PresenceStatus,
}

pub trait ProfileService {
    fn local_profile(&self) -> Profile;
    fn profile(&self, id: &str) -> Option<Profile>;
    fn set_status(&self, status: PresenceStatus) -> Result<()>;
}

/// The relational store holding call records.
///
/// Purely a status rendezvous point: the core inserts a ringing row,
/// updates `status`, and reacts to change notifications for a given call
/// id.  The backend watchdog writes terminal statuses out-of-band, so a
/// notification may arrive in any local state.
pub trait CallStore {
    fn insert(&self, record: &CallRecord) -> Result<()>;
    fn update_status(&self, call_id: &str, status: CallStatus) -> Result<()>;
    /// Registers a callback fired on every status change of `call_id`,
    /// including changes made by this client and by the watchdog.
    fn on_status_change(&self, call_id: &str, callback: Callback<CallStatus>);
}
