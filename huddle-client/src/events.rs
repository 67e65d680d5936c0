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

//! Framework-agnostic event types emitted by the core.
//!
//! Events go out through the event bus and can be consumed by any frontend
//! (Yew, Dioxus, plain JS via wasm-bindgen).  They carry ids rather than JS
//! handles so the enum stays usable off-browser.

use huddle_types::{CallStatus, MediaPurpose};

/// Events emitted by the client that UI layers can subscribe to.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    // === Connection events ===
    /// The realtime socket is open and topics are joined.
    Connected,
    /// The realtime socket dropped.
    ConnectionLost(String),

    // === Roster events ===
    /// A participant joined the channel/call.
    ParticipantJoined(String),
    /// A participant left; their links and streams are already gone.
    ParticipantLeft(String),
    /// A participant's speaking state flipped.
    Speaking { peer_id: String, speaking: bool },

    // === Call lifecycle ===
    /// The call record moved to a new status.
    CallStatus { call_id: String, status: CallStatus },

    // === Link errors ===
    /// A peer link failed beyond its restart budget.  Fired exactly once
    /// per link; the user must rejoin to re-establish it.
    LinkFailed {
        peer_id: String,
        purpose: MediaPurpose,
    },

    // === Media ===
    /// Microphone or display acquisition failed; human-readable message
    /// suitable for a toast.
    MediaError(String),
    /// A remote screen-share stream arrived or went away for a peer.
    ScreenShare { peer_id: String, active: bool },
}
