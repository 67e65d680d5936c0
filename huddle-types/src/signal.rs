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

//! Signaling envelopes carried over broadcast topics.
//!
//! Delivery is at most once: an envelope published before the recipient has
//! joined the topic is lost, and no acknowledgment exists at this layer.
//! Anything that needs reliability (the screen-share viewer request, for
//! example) layers its own request/response on top of these envelopes.

use serde::{Deserialize, Serialize};

/// What a [`SignalEnvelope`] carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// SDP offer; `payload` is `{"sdp": "..."}`.
    Offer,
    /// SDP answer; `payload` is `{"sdp": "..."}`.
    Answer,
    /// ICE candidate; `payload` is `{"candidate", "sdp_mid", "sdp_mline_index"}`.
    IceCandidate,
    /// A viewer asking a sharer for a screen-share offer.  Carries no payload.
    ShareRequest,
}

/// Which media relationship a peer link serves.
///
/// There is at most one link per (remote participant, purpose) pair, so
/// voice and screen share between the same two people are independent
/// connections with independent lifecycles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaPurpose {
    Voice,
    Screen,
}

impl std::fmt::Display for MediaPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            MediaPurpose::Voice => write!(f, "voice"),
            MediaPurpose::Screen => write!(f, "screen"),
        }
    }
}

/// One signaling message between two participants on a topic.
///
/// Envelopes are broadcast to every subscriber of the topic; receivers
/// discard anything whose `to` is not their own id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub kind: SignalKind,
    pub from: String,
    pub to: String,
    pub purpose: MediaPurpose,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SignalEnvelope {
    pub fn sdp(&self) -> Option<&str> {
        self.payload.get("sdp").and_then(|v| v.as_str())
    }

    /// True if this envelope is addressed to `id`.
    pub fn is_for(&self, id: &str) -> bool {
        self.to == id
    }
}

/// An ICE candidate as carried in an envelope payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IceCandidatePayload {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_mline_index: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_round_trips_through_json() {
        let env = SignalEnvelope {
            kind: SignalKind::Offer,
            from: "a1".to_string(),
            to: "b2".to_string(),
            purpose: MediaPurpose::Voice,
            payload: json!({"sdp": "v=0\r\n"}),
        };
        let text = serde_json::to_string(&env).unwrap();
        let back: SignalEnvelope = serde_json::from_str(&text).unwrap();
        assert_eq!(env, back);
        assert_eq!(back.sdp(), Some("v=0\r\n"));
    }

    #[test]
    fn kind_uses_snake_case_on_the_wire() {
        let text = serde_json::to_string(&SignalKind::IceCandidate).unwrap();
        assert_eq!(text, "\"ice_candidate\"");
        let text = serde_json::to_string(&SignalKind::ShareRequest).unwrap();
        assert_eq!(text, "\"share_request\"");
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let back: SignalEnvelope = serde_json::from_str(
            r#"{"kind":"share_request","from":"b2","to":"a1","purpose":"screen"}"#,
        )
        .unwrap();
        assert!(back.payload.is_null());
        assert!(back.is_for("a1"));
        assert!(!back.is_for("b2"));
    }

    #[test]
    fn ice_payload_tolerates_absent_mid_and_index() {
        let p: IceCandidatePayload =
            serde_json::from_value(json!({"candidate": "candidate:0 1 UDP ..."})).unwrap();
        assert_eq!(p.sdp_mid, None);
        assert_eq!(p.sdp_mline_index, None);
    }
}
