//! Screen-share fan-out.
//!
//! Every participant can broadcast at most one share while viewing any
//! number of others, so each side of a share pair is its own connection:
//! the sharer owns a broadcaster link per viewer, a watcher owns a viewer
//! link per sharer.  Presence is the discovery mechanism: `sharing=true`
//! in a member's attributes invites a viewer `request`, and the sharer
//! answers each request with a dedicated offer.  The request doubles as
//! the retry for offers lost to at-most-once signaling.

use huddle_types::PresenceMeta;
use std::collections::BTreeMap;

/// What a presence observation obliges the viewer side to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewerAction {
    /// Ask this sharer for an offer.
    Request(String),
    /// The share ended or the sharer left: drop the stream and the link.
    Drop(String),
}

/// Pure bookkeeping of which remote shares this participant watches.
#[derive(Default, Debug)]
pub struct ViewerBook {
    /// Sharer id → whether their stream has arrived.
    watching: BTreeMap<String, bool>,
}

impl ViewerBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds in the full membership view and returns the actions it
    /// implies.  Idempotent: a sharer already being watched produces no
    /// second request.
    pub fn observe(&mut self, members: &[PresenceMeta], local_id: &str) -> Vec<ViewerAction> {
        let mut actions = Vec::new();

        for member in members {
            if member.user_id == local_id || !member.sharing {
                continue;
            }
            if !self.watching.contains_key(&member.user_id) {
                self.watching.insert(member.user_id.clone(), false);
                actions.push(ViewerAction::Request(member.user_id.clone()));
            }
        }

        let stale: Vec<String> = self
            .watching
            .keys()
            .filter(|id| !members.iter().any(|m| m.user_id == **id && m.sharing))
            .cloned()
            .collect();
        for id in stale {
            self.watching.remove(&id);
            actions.push(ViewerAction::Drop(id));
        }

        actions
    }

    pub fn stream_received(&mut self, sharer_id: &str) {
        if let Some(received) = self.watching.get_mut(sharer_id) {
            *received = true;
        }
    }

    pub fn is_watching(&self, sharer_id: &str) -> bool {
        self.watching.contains_key(sharer_id)
    }

    pub fn watched(&self) -> Vec<String> {
        self.watching.keys().cloned().collect()
    }

    /// Clears the book, returning every sharer that must be dropped.
    pub fn clear(&mut self) -> Vec<String> {
        let ids = self.watching.keys().cloned().collect();
        self.watching.clear();
        ids
    }
}

#[cfg(target_arch = "wasm32")]
pub use manager::{ScreenShareManager, ScreenShareOptions};

#[cfg(target_arch = "wasm32")]
mod manager {
    use super::{ViewerAction, ViewerBook};
    use crate::event_bus::emit_client_event;
    use crate::events::ClientEvent;
    use crate::media::{capture_display, stop_all_tracks, SharePreset};
    use crate::peer::{PeerLink, PeerLinkOptions, PeerRegistry};
    use crate::signaling::{PresenceEvent, RealtimeSocket};
    use huddle_types::{Callback, MediaPurpose, SignalEnvelope, SignalKind};
    use log::{debug, error, warn};
    use serde_json::Value;
    use std::cell::RefCell;
    use std::rc::{Rc, Weak};
    use wasm_bindgen::JsValue;
    use web_sys::MediaStream;

    /// Which side of a share pair generated a signal.  Carried in ICE
    /// payloads because a pair sharing in both directions holds two links
    /// under the same (peer, purpose) key, one per registry.
    const ROLE_KEY: &str = "role";
    const ROLE_BROADCASTER: &str = "broadcaster";
    const ROLE_VIEWER: &str = "viewer";

    #[derive(Clone)]
    pub struct ScreenShareOptions {
        pub local_id: String,
        /// The channel topic; shares signal over the same topic as voice.
        pub topic: String,
        pub socket: RealtimeSocket,
        pub ice_servers: Vec<String>,
        /// Routes the `sharing` attribute change to the presence owner.
        pub publish_sharing: Callback<bool>,
        /// A remote sharer's stream arrived, keyed by sharer id.
        pub on_viewer_stream: Callback<(String, MediaStream)>,
    }

    struct Inner {
        options: ScreenShareOptions,
        /// Our share, one link per viewer.
        broadcaster: PeerRegistry<PeerLink>,
        /// Shares we watch, one link per sharer.
        viewers: PeerRegistry<PeerLink>,
        book: ViewerBook,
        capture: Option<MediaStream>,
        sharing: bool,
    }

    #[derive(Clone)]
    pub struct ScreenShareManager {
        inner: Rc<RefCell<Inner>>,
    }

    impl ScreenShareManager {
        pub fn new(options: ScreenShareOptions) -> Self {
            let manager = Self {
                inner: Rc::new(RefCell::new(Inner {
                    options: options.clone(),
                    broadcaster: PeerRegistry::new(),
                    viewers: PeerRegistry::new(),
                    book: ViewerBook::new(),
                    capture: None,
                    sharing: false,
                })),
            };

            let handler = manager.clone();
            let local_id = options.local_id.clone();
            options.socket.on_envelope(
                &options.topic,
                Callback::from(move |envelope: SignalEnvelope| {
                    if envelope.purpose == MediaPurpose::Screen && envelope.is_for(&local_id) {
                        handler.handle_envelope(envelope);
                    }
                }),
            );

            let presence_handler = manager.clone();
            options.socket.on_presence(
                &options.topic,
                Callback::from(move |event: PresenceEvent| {
                    presence_handler.handle_presence(event);
                }),
            );

            manager
        }

        /// Captures the display at the chosen quality and offers it to
        /// everyone currently present.
        pub fn start_share(&self, preset: SharePreset) {
            if self.inner.borrow().sharing {
                warn!("already sharing; stop the current share first");
                return;
            }
            let manager = self.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let capture = match capture_display(preset).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("display capture failed: {e:?}");
                        emit_client_event(ClientEvent::MediaError(
                            "Could not start screen sharing. Check browser permissions."
                                .to_string(),
                        ));
                        return;
                    }
                };

                let (publish_sharing, members) = {
                    let mut inner = manager.inner.borrow_mut();
                    inner.capture = Some(capture);
                    inner.sharing = true;
                    (
                        inner.options.publish_sharing.clone(),
                        inner.options.socket.presence_members(&inner.options.topic),
                    )
                };
                publish_sharing.emit(true);

                let local_id = manager.inner.borrow().options.local_id.clone();
                for member in members {
                    if member.user_id != local_id {
                        manager.offer_to_viewer(&member.user_id);
                    }
                }
            });
        }

        /// Ends the local share: every broadcaster link closes, capture
        /// stops, and presence flips back.
        pub fn stop_share(&self) {
            let publish_sharing = {
                let mut inner = self.inner.borrow_mut();
                if !inner.sharing {
                    return;
                }
                inner.sharing = false;
                inner.broadcaster.close_all();
                if let Some(capture) = inner.capture.take() {
                    stop_all_tracks(&capture);
                }
                inner.options.publish_sharing.clone()
            };
            publish_sharing.emit(false);
        }

        pub fn is_sharing(&self) -> bool {
            self.inner.borrow().sharing
        }

        /// Shares currently watched, for UI listings.
        pub fn watched_sharers(&self) -> Vec<String> {
            self.inner.borrow().book.watched()
        }

        /// Drops everything: our share and every watched one.
        pub fn teardown(&self) {
            self.stop_share();
            let mut inner = self.inner.borrow_mut();
            inner.viewers.close_all();
            for sharer in inner.book.clear() {
                emit_client_event(ClientEvent::ScreenShare {
                    peer_id: sharer,
                    active: false,
                });
            }
        }

        fn handle_presence(&self, event: PresenceEvent) {
            if let PresenceEvent::Leave(meta) = &event {
                let mut inner = self.inner.borrow_mut();
                inner.broadcaster.close_peer(&meta.user_id);
            }

            let (members, local_id) = {
                let inner = self.inner.borrow();
                (
                    inner.options.socket.presence_members(&inner.options.topic),
                    inner.options.local_id.clone(),
                )
            };
            let actions = self
                .inner
                .borrow_mut()
                .book
                .observe(&members, &local_id);
            for action in actions {
                match action {
                    ViewerAction::Request(sharer) => self.request_share(&sharer),
                    ViewerAction::Drop(sharer) => {
                        self.inner
                            .borrow_mut()
                            .viewers
                            .close(&sharer, MediaPurpose::Screen);
                        emit_client_event(ClientEvent::ScreenShare {
                            peer_id: sharer,
                            active: false,
                        });
                    }
                }
            }
        }

        fn request_share(&self, sharer_id: &str) {
            let inner = self.inner.borrow();
            debug!("requesting share from {sharer_id}");
            inner.options.socket.send_envelope(
                &inner.options.topic,
                &SignalEnvelope {
                    kind: SignalKind::ShareRequest,
                    from: inner.options.local_id.clone(),
                    to: sharer_id.to_string(),
                    purpose: MediaPurpose::Screen,
                    payload: Value::Null,
                },
            );
        }

        fn handle_envelope(&self, envelope: SignalEnvelope) {
            let remote_id = envelope.from.clone();
            match envelope.kind {
                SignalKind::ShareRequest => {
                    if self.inner.borrow().sharing {
                        self.offer_to_viewer(&remote_id);
                    } else {
                        debug!("share request from {remote_id} while not sharing");
                    }
                }
                SignalKind::Offer => {
                    let Some(sdp) = envelope.sdp().map(str::to_string) else {
                        warn!("share offer from {remote_id} without sdp");
                        return;
                    };
                    self.accept_share_offer(&remote_id, sdp);
                }
                SignalKind::Answer => {
                    let Some(sdp) = envelope.sdp().map(str::to_string) else {
                        warn!("share answer from {remote_id} without sdp");
                        return;
                    };
                    let inner = self.inner.borrow();
                    match inner.broadcaster.get(&remote_id, MediaPurpose::Screen) {
                        Some(link) => link.accept_answer(sdp),
                        None => warn!("share answer from {remote_id} with no link"),
                    }
                }
                SignalKind::IceCandidate => self.route_ice(&remote_id, envelope.payload),
            }
        }

        /// ICE from the remote's broadcaster link belongs to our viewer
        /// link and vice versa; the role tag disambiguates the pair
        /// sharing in both directions.
        fn route_ice(&self, remote_id: &str, payload: Value) {
            let role = payload
                .get(ROLE_KEY)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let candidate = match serde_json::from_value(payload) {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!("malformed share ice candidate from {remote_id}: {e}");
                    return;
                }
            };
            let inner = self.inner.borrow();
            let link = match role.as_str() {
                ROLE_BROADCASTER => inner.viewers.get(remote_id, MediaPurpose::Screen),
                ROLE_VIEWER => inner.broadcaster.get(remote_id, MediaPurpose::Screen),
                _ => inner
                    .viewers
                    .get(remote_id, MediaPurpose::Screen)
                    .or_else(|| inner.broadcaster.get(remote_id, MediaPurpose::Screen)),
            };
            match link {
                Some(link) => link.add_remote_candidate(candidate),
                None => debug!("share ice from {remote_id} with no link"),
            }
        }

        fn offer_to_viewer(&self, viewer_id: &str) {
            let mut inner = self.inner.borrow_mut();
            if inner.broadcaster.contains(viewer_id, MediaPurpose::Screen) {
                return;
            }
            let Some(capture) = inner.capture.clone() else {
                return;
            };
            match Self::create_link(
                Rc::downgrade(&self.inner),
                &inner.options,
                viewer_id,
                ROLE_BROADCASTER,
            ) {
                Ok(link) => {
                    link.attach_stream(&capture);
                    link.start_offer();
                    inner
                        .broadcaster
                        .open_with(viewer_id, MediaPurpose::Screen, || link);
                }
                Err(e) => warn!("failed to create broadcaster link to {viewer_id}: {e:?}"),
            }
        }

        fn accept_share_offer(&self, sharer_id: &str, sdp: String) {
            let mut inner = self.inner.borrow_mut();
            if !inner.viewers.contains(sharer_id, MediaPurpose::Screen) {
                match Self::create_link(
                    Rc::downgrade(&self.inner),
                    &inner.options,
                    sharer_id,
                    ROLE_VIEWER,
                ) {
                    Ok(link) => {
                        inner
                            .viewers
                            .open_with(sharer_id, MediaPurpose::Screen, || link);
                    }
                    Err(e) => {
                        warn!("failed to create viewer link to {sharer_id}: {e:?}");
                        return;
                    }
                }
            }
            if let Some(link) = inner.viewers.get(sharer_id, MediaPurpose::Screen) {
                link.accept_offer(sdp);
            }
        }

        fn create_link(
            manager: Weak<RefCell<Inner>>,
            options: &ScreenShareOptions,
            remote_id: &str,
            role: &'static str,
        ) -> Result<PeerLink, JsValue> {
            let socket = options.socket.clone();
            let topic = options.topic.clone();
            let on_viewer_stream = options.on_viewer_stream.clone();
            let stream_manager = manager.clone();
            let is_viewer = role == ROLE_VIEWER;

            let link_options = PeerLinkOptions {
                local_id: options.local_id.clone(),
                remote_id: remote_id.to_string(),
                purpose: MediaPurpose::Screen,
                ice_servers: options.ice_servers.clone(),
                on_signal: Callback::from(move |mut envelope: SignalEnvelope| {
                    if envelope.kind == SignalKind::IceCandidate {
                        if let Value::Object(map) = &mut envelope.payload {
                            map.insert(ROLE_KEY.to_string(), Value::String(role.to_string()));
                        }
                    }
                    socket.send_envelope(&topic, &envelope);
                }),
                on_remote_stream: Callback::from(move |(peer_id, stream): (String, MediaStream)| {
                    if !is_viewer {
                        return;
                    }
                    if let Some(inner) = stream_manager.upgrade() {
                        inner.borrow_mut().book.stream_received(&peer_id);
                    }
                    emit_client_event(ClientEvent::ScreenShare {
                        peer_id: peer_id.clone(),
                        active: true,
                    });
                    on_viewer_stream.emit((peer_id, stream));
                }),
                on_failed: Callback::from(move |(peer_id, purpose): (String, MediaPurpose)| {
                    if let Some(inner) = manager.upgrade() {
                        let mut inner = inner.borrow_mut();
                        if is_viewer {
                            inner.viewers.close(&peer_id, purpose);
                        } else {
                            inner.broadcaster.close(&peer_id, purpose);
                        }
                    }
                    emit_client_event(ClientEvent::LinkFailed { peer_id, purpose });
                }),
            };

            if is_viewer {
                PeerLink::answerer(link_options)
            } else {
                PeerLink::offerer(link_options)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, sharing: bool) -> PresenceMeta {
        let mut meta = PresenceMeta::new(id, id.to_uppercase());
        meta.sharing = sharing;
        meta
    }

    #[test]
    fn new_sharer_triggers_exactly_one_request() {
        let mut book = ViewerBook::new();
        let members = vec![member("a1", false), member("c3", true)];

        let actions = book.observe(&members, "a1");
        assert_eq!(actions, vec![ViewerAction::Request("c3".to_string())]);

        // Observing the same view again requests nothing.
        let actions = book.observe(&members, "a1");
        assert!(actions.is_empty());
    }

    #[test]
    fn own_share_is_never_requested() {
        let mut book = ViewerBook::new();
        let members = vec![member("a1", true)];
        assert!(book.observe(&members, "a1").is_empty());
    }

    #[test]
    fn stopped_share_is_dropped() {
        let mut book = ViewerBook::new();
        book.observe(&[member("c3", true)], "a1");
        book.stream_received("c3");

        let actions = book.observe(&[member("c3", false)], "a1");
        assert_eq!(actions, vec![ViewerAction::Drop("c3".to_string())]);
        assert!(!book.is_watching("c3"));
    }

    #[test]
    fn departed_sharer_is_dropped() {
        let mut book = ViewerBook::new();
        book.observe(&[member("c3", true)], "a1");

        let actions = book.observe(&[], "a1");
        assert_eq!(actions, vec![ViewerAction::Drop("c3".to_string())]);
    }

    #[test]
    fn three_party_room_each_viewer_requests_the_sharer_once() {
        // Participants a1, b2 and sharer c3: both viewers request exactly
        // c3, never each other.
        for viewer in ["a1", "b2"] {
            let mut book = ViewerBook::new();
            let members = vec![member("a1", false), member("b2", false), member("c3", true)];
            let actions = book.observe(&members, viewer);
            assert_eq!(actions, vec![ViewerAction::Request("c3".to_string())]);

            // c3 stops: the stream reference goes away on both.
            book.stream_received("c3");
            let members = vec![member("a1", false), member("b2", false), member("c3", false)];
            let actions = book.observe(&members, viewer);
            assert_eq!(actions, vec![ViewerAction::Drop("c3".to_string())]);
        }
    }

    #[test]
    fn clear_returns_everything_watched() {
        let mut book = ViewerBook::new();
        book.observe(&[member("b2", true), member("c3", true)], "a1");
        let mut dropped = book.clear();
        dropped.sort();
        assert_eq!(dropped, vec!["b2".to_string(), "c3".to_string()]);
        assert!(book.watched().is_empty());
    }
}
