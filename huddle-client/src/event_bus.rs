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

//! Global MPMC broadcast channel for [`ClientEvent`]s.
//!
//! Any component can emit, any number of subscribers receive every event
//! independently.  Emission never blocks; on overflow the oldest event is
//! dropped.

use crate::events::ClientEvent;
use async_broadcast::{broadcast, Receiver, Sender};
use once_cell::sync::Lazy;
use std::ops::Deref;

const EVENT_BUS_CAPACITY: usize = 256;

static SENDER: Lazy<Sender<ClientEvent>> = Lazy::new(|| {
    let (s, r) = broadcast(EVENT_BUS_CAPACITY);

    // A resident receiver keeps the channel open when no UI subscriber is
    // attached yet.
    #[cfg(target_arch = "wasm32")]
    {
        let mut receiver = r;
        wasm_bindgen_futures::spawn_local(async move {
            while (receiver.recv().await).is_ok() {}
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    std::mem::drop(r);

    s
});

/// Subscribe to client events.  Each receiver sees all future events.
pub fn subscribe_client_events() -> Receiver<ClientEvent> {
    SENDER.deref().new_receiver()
}

/// Emit an event to every subscriber.  Non-blocking.
pub fn emit_client_event(event: ClientEvent) {
    let _ = SENDER.deref().try_broadcast(event);
}
