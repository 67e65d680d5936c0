//! Ownership and orchestration of the voice links for one channel or call.
//!
//! The manager subscribes to the signaling topic, routes inbound envelopes
//! to the right link, and holds the only map of live connections.  Who
//! offers is decided exclusively by the injected tie-breaker, so two
//! participants discovering each other simultaneously can never create
//! duplicate links.

use crate::event_bus::emit_client_event;
use crate::events::ClientEvent;
use crate::peer::link::{PeerLink, PeerLinkOptions};
use crate::peer::registry::PeerRegistry;
use crate::peer::tie_break::TieBreaker;
use crate::signaling::RealtimeSocket;
use huddle_types::{Callback, MediaPurpose, SignalEnvelope, SignalKind};
use log::{debug, warn};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use wasm_bindgen::JsValue;
use web_sys::MediaStream;

#[derive(Clone)]
pub struct PeerManagerOptions {
    pub local_id: String,
    /// Broadcast topic carrying the signal envelopes for this channel/call.
    pub topic: String,
    pub socket: RealtimeSocket,
    pub ice_servers: Vec<String>,
    pub tie_breaker: TieBreaker,
    /// Remote voice streams, keyed by participant id.
    pub on_remote_stream: Callback<(String, MediaStream)>,
}

struct ManagerInner {
    options: PeerManagerOptions,
    registry: PeerRegistry<PeerLink>,
    local_stream: Option<MediaStream>,
}

#[derive(Clone)]
pub struct PeerManager {
    inner: Rc<RefCell<ManagerInner>>,
}

impl PeerManager {
    pub fn new(options: PeerManagerOptions) -> Self {
        let manager = Self {
            inner: Rc::new(RefCell::new(ManagerInner {
                options: options.clone(),
                registry: PeerRegistry::new(),
                local_stream: None,
            })),
        };

        let handler = manager.clone();
        let local_id = options.local_id.clone();
        options.socket.on_envelope(
            &options.topic,
            Callback::from(move |envelope: SignalEnvelope| {
                if envelope.purpose == MediaPurpose::Voice && envelope.is_for(&local_id) {
                    handler.handle_envelope(envelope);
                }
            }),
        );
        manager
    }

    /// The processed stream every new link gets; set before any peer is
    /// connected.
    pub fn set_local_stream(&self, stream: MediaStream) {
        self.inner.borrow_mut().local_stream = Some(stream);
    }

    /// Swaps the outgoing audio on every live link after a pipeline
    /// rebuild; new links get the new stream automatically.
    pub fn replace_local_stream(&self, stream: MediaStream) {
        let mut inner = self.inner.borrow_mut();
        for (_, link) in inner.registry.iter() {
            link.replace_audio_track(&stream);
        }
        inner.local_stream = Some(stream);
    }

    /// Opens a link toward a participant if, and only if, the tie-break
    /// says we offer.  The other side answers; calling this on both sides
    /// yields exactly one offer.
    pub fn connect_to(&self, remote_id: &str) {
        let mut inner = self.inner.borrow_mut();
        if remote_id == inner.options.local_id {
            return;
        }
        if inner.registry.contains(remote_id, MediaPurpose::Voice) {
            return;
        }
        if !inner
            .options
            .tie_breaker
            .is_offerer(&inner.options.local_id, remote_id)
        {
            debug!("waiting for {remote_id} to offer");
            return;
        }

        match Self::create_link(Rc::downgrade(&self.inner), &inner.options, remote_id, true) {
            Ok(link) => {
                if let Some(stream) = inner.local_stream.as_ref() {
                    link.attach_stream(stream);
                }
                link.start_offer();
                inner
                    .registry
                    .open_with(remote_id, MediaPurpose::Voice, || link);
            }
            Err(e) => warn!("failed to create link to {remote_id}: {e:?}"),
        }
    }

    fn handle_envelope(&self, envelope: SignalEnvelope) {
        let mut inner = self.inner.borrow_mut();
        let remote_id = envelope.from.clone();
        match envelope.kind {
            SignalKind::Offer => {
                let Some(sdp) = envelope.sdp().map(str::to_string) else {
                    warn!("offer from {remote_id} without sdp");
                    return;
                };
                if !inner.registry.contains(&remote_id, MediaPurpose::Voice) {
                    match Self::create_link(Rc::downgrade(&self.inner), &inner.options, &remote_id, false)
                    {
                        Ok(link) => {
                            if let Some(stream) = inner.local_stream.as_ref() {
                                link.attach_stream(stream);
                            }
                            inner
                                .registry
                                .open_with(&remote_id, MediaPurpose::Voice, || link);
                        }
                        Err(e) => {
                            warn!("failed to create link to {remote_id}: {e:?}");
                            return;
                        }
                    }
                }
                if let Some(link) = inner.registry.get(&remote_id, MediaPurpose::Voice) {
                    link.accept_offer(sdp);
                }
            }
            SignalKind::Answer => {
                let Some(sdp) = envelope.sdp().map(str::to_string) else {
                    warn!("answer from {remote_id} without sdp");
                    return;
                };
                match inner.registry.get(&remote_id, MediaPurpose::Voice) {
                    Some(link) => link.accept_answer(sdp),
                    None => warn!("answer from {remote_id} with no link"),
                }
            }
            SignalKind::IceCandidate => {
                match serde_json::from_value(envelope.payload) {
                    Ok(payload) => match inner.registry.get(&remote_id, MediaPurpose::Voice) {
                        Some(link) => link.add_remote_candidate(payload),
                        None => debug!("ice candidate from {remote_id} with no link"),
                    },
                    Err(e) => warn!("malformed ice candidate from {remote_id}: {e}"),
                }
            }
            SignalKind::ShareRequest => {
                // Screen-share negotiation is owned elsewhere.
            }
        }
    }

    fn create_link(
        manager: Weak<RefCell<ManagerInner>>,
        options: &PeerManagerOptions,
        remote_id: &str,
        offerer: bool,
    ) -> Result<PeerLink, JsValue> {
        let socket = options.socket.clone();
        let topic = options.topic.clone();
        let link_options = PeerLinkOptions {
            local_id: options.local_id.clone(),
            remote_id: remote_id.to_string(),
            purpose: MediaPurpose::Voice,
            ice_servers: options.ice_servers.clone(),
            on_signal: Callback::from(move |envelope: SignalEnvelope| {
                socket.send_envelope(&topic, &envelope);
            }),
            on_remote_stream: options.on_remote_stream.clone(),
            on_failed: Callback::from(move |(peer_id, purpose): (String, MediaPurpose)| {
                if let Some(inner) = manager.upgrade() {
                    inner.borrow_mut().registry.close(&peer_id, purpose);
                }
                emit_client_event(ClientEvent::LinkFailed { peer_id, purpose });
            }),
        };
        if offerer {
            PeerLink::offerer(link_options)
        } else {
            PeerLink::answerer(link_options)
        }
    }

    /// A participant left: close their link and let the event loop drop
    /// the stream references.
    pub fn peer_left(&self, remote_id: &str) {
        self.inner.borrow_mut().registry.close_peer(remote_id);
    }

    /// Unconditional teardown; abandons every in-flight negotiation.
    pub fn close_all(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.registry.close_all();
        inner.local_stream = None;
    }

    pub fn connected_peers(&self) -> Vec<String> {
        self.inner.borrow().registry.peers_with(MediaPurpose::Voice)
    }
}
