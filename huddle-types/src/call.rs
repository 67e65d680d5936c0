/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! The call record persisted by the relational store.
//!
//! The record is a status rendezvous point between caller and callee; the
//! core only reads and writes `status` and reacts to change notifications.
//! A backend watchdog may move stale rows to `Missed` or `Ended` at any
//! time, so every status transition must be accepted asynchronously.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Ringing,
    Connecting,
    Active,
    Declined,
    Missed,
    Ended,
}

impl CallStatus {
    /// Terminal states never transition to anything else.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Declined | CallStatus::Missed | CallStatus::Ended
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: String,
    pub caller: String,
    pub callee: String,
    pub status: CallStatus,
    pub created_ms: f64,
    #[serde(default)]
    pub ended_ms: Option<f64>,
}

impl CallRecord {
    pub fn new(id: impl Into<String>, caller: impl Into<String>, callee: impl Into<String>, created_ms: f64) -> Self {
        Self {
            id: id.into(),
            caller: caller.into(),
            callee: callee.into(),
            status: CallStatus::Ringing,
            created_ms,
            ended_ms: None,
        }
    }

    /// The other party, from `id`'s point of view.
    pub fn remote_of(&self, id: &str) -> &str {
        if self.caller == id {
            &self.callee
        } else {
            &self.caller
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!CallStatus::Ringing.is_terminal());
        assert!(!CallStatus::Connecting.is_terminal());
        assert!(!CallStatus::Active.is_terminal());
        assert!(CallStatus::Declined.is_terminal());
        assert!(CallStatus::Missed.is_terminal());
        assert!(CallStatus::Ended.is_terminal());
    }

    #[test]
    fn remote_of_is_symmetric() {
        let record = CallRecord::new("c1", "a1", "b2", 0.0);
        assert_eq!(record.remote_of("a1"), "b2");
        assert_eq!(record.remote_of("b2"), "a1");
    }

    #[test]
    fn status_wire_format_is_snake_case() {
        assert_eq!(serde_json::to_string(&CallStatus::Ringing).unwrap(), "\"ringing\"");
        assert_eq!(serde_json::to_string(&CallStatus::Ended).unwrap(), "\"ended\"");
    }
}
