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

//! Browser real-time communication core for huddle.
//!
//! This crate owns the hard parts of the voice/video side of the app:
//! WebRTC session negotiation over a pub/sub signaling transport, glare-free
//! link ownership, voice-activity detection, the microphone noise
//! suppression chain, screen-share fan-out and the 1:1 call lifecycle.
//! Profile CRUD, message history and all UI chrome live elsewhere and reach
//! this crate only through the collaborator traits in [`collab`].
//!
//! The crate makes no assumptions about the UI framework: events go out
//! through the [`event_bus`] and plain callbacks, and every browser handle
//! the UI needs (remote streams for `<audio>`/`<video>` elements) arrives
//! through an options callback.
//!
//! Protocol, state-machine and DSP logic is kept free of browser types so
//! it compiles and tests on native targets; only the `web-sys` glue is
//! wasm-only.
//!
//! # Outline of usage
//!
//! ```ignore
//! let options = HuddleClientOptions {...}; // ids, urls, callbacks
//! let client = HuddleClient::new(options);
//! client.connect()?;
//!
//! client.join("channel-7");         // voice room
//! client.toggle_mute();
//! client.start_screen_share(SharePreset::FullHd15);
//! client.stop_screen_share();
//! client.set_user_volume("b2", 0.5);
//! client.leave();
//! ```

pub mod audio;
pub mod call;
mod client;
pub mod collab;
pub mod constants;
mod event_bus;
mod events;
pub mod media;
pub mod participants;
pub mod peer;
pub mod presence;
pub mod screen_share;
pub mod signaling;

#[cfg(test)]
mod tests;

pub use audio::{NoisePipelineConfig, SuppressionMode, VadTuning};
#[cfg(target_arch = "wasm32")]
pub use call::{CallManager, CallManagerOptions};
#[cfg(target_arch = "wasm32")]
pub use client::{HuddleClient, HuddleClientOptions};
pub use collab::{CallStore, Profile, ProfileService};
pub use event_bus::{emit_client_event, subscribe_client_events};
pub use events::ClientEvent;
pub use media::SharePreset;
pub use participants::Participant;
