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

//! The attribute set each participant tracks on a presence topic.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    #[default]
    Online,
    Away,
    Offline,
}

/// The live attribute set published for one participant.
///
/// Re-published whenever an attribute changes and on a fixed interval as a
/// liveness signal; other participants read the aggregate set through
/// presence sync events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresenceMeta {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub speaking: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub sharing: bool,
    #[serde(default)]
    pub status: PresenceStatus,
    /// Wall-clock milliseconds of the last local user activity.
    #[serde(default)]
    pub last_active_ms: f64,
}

impl PresenceMeta {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar_url: None,
            speaking: false,
            muted: false,
            sharing: false,
            status: PresenceStatus::Online,
            last_active_ms: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_payload_fills_defaults() {
        let meta: PresenceMeta =
            serde_json::from_str(r#"{"user_id":"a1","display_name":"Ada"}"#).unwrap();
        assert_eq!(meta.status, PresenceStatus::Online);
        assert!(!meta.speaking);
        assert!(!meta.sharing);
        assert_eq!(meta.avatar_url, None);
    }

    #[test]
    fn status_round_trips() {
        for status in [
            PresenceStatus::Online,
            PresenceStatus::Away,
            PresenceStatus::Offline,
        ] {
            let text = serde_json::to_string(&status).unwrap();
            let back: PresenceStatus = serde_json::from_str(&text).unwrap();
            assert_eq!(status, back);
        }
    }
}
