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

//! Types shared between the huddle client core and the realtime backend.
//!
//! Everything here is plain serde data: signal envelopes exchanged over
//! broadcast topics, presence attribute sets, and the call record the
//! relational store persists.  The crate compiles on native targets so the
//! protocol can be tested without a browser.

pub mod call;
pub mod callback;
pub mod presence;
pub mod realtime;
pub mod signal;

pub use call::{CallRecord, CallStatus};
pub use callback::Callback;
pub use presence::{PresenceMeta, PresenceStatus};
pub use realtime::{Frame, FrameEvent, PresenceDiff};
pub use signal::{IceCandidatePayload, MediaPurpose, SignalEnvelope, SignalKind};
