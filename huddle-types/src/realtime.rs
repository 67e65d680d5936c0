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

//! Frames exchanged with the realtime pub/sub service.
//!
//! One WebSocket carries every topic a client is subscribed to; each frame
//! names its topic and event.  Broadcast payloads are opaque JSON at this
//! layer (the client reads them as [`SignalEnvelope`](crate::SignalEnvelope)
//! on signaling topics).

use crate::presence::PresenceMeta;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameEvent {
    /// Client subscribes to a topic.
    Join,
    /// Client unsubscribes from a topic.
    Leave,
    /// Connection keep-alive; the topic field is empty.
    Heartbeat,
    /// Fan-out payload to every current subscriber of the topic.
    Broadcast,
    /// Client publishes/updates its presence attribute set.
    Track,
    /// Server snapshot of every tracked attribute set on the topic.
    PresenceState,
    /// Server delta: attribute sets that joined and ids that left.
    PresenceDiff,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: FrameEvent,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Frame {
    pub fn new(topic: impl Into<String>, event: FrameEvent, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            event,
            payload,
        }
    }

    pub fn heartbeat() -> Self {
        Self::new("", FrameEvent::Heartbeat, serde_json::Value::Null)
    }
}

/// Payload of a [`FrameEvent::PresenceDiff`] frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceDiff {
    #[serde(default)]
    pub joins: Vec<PresenceMeta>,
    #[serde(default)]
    pub leaves: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_round_trips() {
        let frame = Frame::new(
            "voice:room-7",
            FrameEvent::Broadcast,
            json!({"kind": "offer"}),
        );
        let text = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&text).unwrap();
        assert_eq!(frame, back);
    }

    #[test]
    fn heartbeat_has_empty_topic() {
        let text = serde_json::to_string(&Frame::heartbeat()).unwrap();
        let back: Frame = serde_json::from_str(&text).unwrap();
        assert_eq!(back.event, FrameEvent::Heartbeat);
        assert!(back.topic.is_empty());
    }

    #[test]
    fn diff_tolerates_missing_fields() {
        let diff: PresenceDiff = serde_json::from_value(json!({"leaves": ["a1"]})).unwrap();
        assert!(diff.joins.is_empty());
        assert_eq!(diff.leaves, vec!["a1".to_string()]);
    }
}
