//! The top-level client for channel voice rooms.
//!
//! Owns the realtime socket and, while joined to a room, the microphone
//! session, the voice peer manager, the screen-share fan-out and the
//! presence supervisor.  UI layers talk to this type and the event bus
//! only.

use crate::audio::{NoisePipelineConfig, SpeakingSample, VadTuning, VoiceSession};
use crate::collab::{Profile, ProfileService};
use crate::event_bus::emit_client_event;
use crate::events::ClientEvent;
use crate::media::SharePreset;
use crate::participants::{Participant, Roster};
use crate::peer::{PeerManager, PeerManagerOptions, TieBreaker};
use crate::presence::{PresenceSupervisor, PresenceSupervisorOptions};
use crate::screen_share::{ScreenShareManager, ScreenShareOptions};
use crate::signaling::{RealtimeSocket, RealtimeSocketOptions};
use huddle_types::{Callback, PresenceMeta, PresenceStatus};
use log::{error, info, warn};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::JsValue;
use web_sys::MediaStream;

fn room_topic(channel_id: &str) -> String {
    format!("room:{channel_id}")
}

/// Options for constructing a client via [`HuddleClient::new`].
#[derive(Clone)]
pub struct HuddleClientOptions {
    /// Identity/profile collaborator; the local profile names this client
    /// on every topic.
    pub profiles: Rc<dyn ProfileService>,
    /// WebSocket url of the realtime pub/sub service.
    pub realtime_url: String,
    pub ice_servers: Vec<String>,
    /// Injected pipeline configuration; use
    /// [`NoisePipelineConfig::load`] to start from the persisted one.
    pub pipeline_config: NoisePipelineConfig,
    pub on_connected: Callback<()>,
    pub on_connection_lost: Callback<String>,
    /// Remote voice streams for playback, keyed by participant id.
    pub on_remote_stream: Callback<(String, MediaStream)>,
    /// Remote screen-share streams, keyed by sharer id.
    pub on_share_stream: Callback<(String, MediaStream)>,
}

struct Room {
    topic: String,
    peers: PeerManager,
    shares: ScreenShareManager,
    supervisor: PresenceSupervisor,
    session: Rc<VoiceSession>,
    roster: Roster,
}

struct Inner {
    options: HuddleClientOptions,
    socket: Option<RealtimeSocket>,
    room: Option<Room>,
    config: NoisePipelineConfig,
}

/// The client struct for huddle's real-time core.
///
/// Construct with [`new`](Self::new), then [`connect`](Self::connect),
/// then [`join`](Self::join) a channel's voice room.
#[derive(Clone)]
pub struct HuddleClient {
    inner: Rc<RefCell<Inner>>,
}

impl HuddleClient {
    pub fn new(options: HuddleClientOptions) -> Self {
        let config = options.pipeline_config.clone();
        Self {
            inner: Rc::new(RefCell::new(Inner {
                options,
                socket: None,
                room: None,
                config,
            })),
        }
    }

    /// Opens the realtime socket.  Idempotent.
    pub fn connect(&self) -> Result<(), JsValue> {
        if self.inner.borrow().socket.is_some() {
            return Ok(());
        }
        let options = self.inner.borrow().options.clone();
        let on_connected = options.on_connected.clone();
        let on_lost = options.on_connection_lost.clone();
        let socket = RealtimeSocket::connect(RealtimeSocketOptions {
            url: options.realtime_url.clone(),
            on_open: Callback::from(move |_| {
                emit_client_event(ClientEvent::Connected);
                on_connected.emit(());
            }),
            on_close: Callback::from(move |reason: String| {
                emit_client_event(ClientEvent::ConnectionLost(reason.clone()));
                on_lost.emit(reason);
            }),
        })?;
        self.inner.borrow_mut().socket = Some(socket);
        Ok(())
    }

    fn local_profile(&self) -> Profile {
        self.inner.borrow().options.profiles.local_profile()
    }

    fn local_meta(&self) -> PresenceMeta {
        let profile = self.local_profile();
        let mut meta = PresenceMeta::new(profile.id, profile.display_name);
        meta.avatar_url = profile.avatar_url;
        meta
    }

    /// Joins a channel voice room: microphone first (a denied microphone
    /// aborts the join with nothing to clean up), then peers, shares and
    /// presence.  Offers flow as presence reveals the other members.
    pub fn join(&self, channel_id: &str) {
        if self.inner.borrow().room.is_some() {
            warn!("already in a voice room; leave first");
            return;
        }
        let Some(socket) = self.inner.borrow().socket.clone() else {
            warn!("join before connect");
            return;
        };

        let client = self.clone();
        let channel_id = channel_id.to_string();
        wasm_bindgen_futures::spawn_local(async move {
            client.join_inner(socket, &channel_id).await;
        });
    }

    async fn join_inner(&self, socket: RealtimeSocket, channel_id: &str) {
        let topic = room_topic(channel_id);
        let (config, options) = {
            let inner = self.inner.borrow();
            (inner.config.clone(), inner.options.clone())
        };
        let local_id = self.local_profile().id;

        // Speaking state flows through the presence supervisor once it
        // exists; the cell bridges the construction order.
        let supervisor_cell: Rc<RefCell<Option<PresenceSupervisor>>> =
            Rc::new(RefCell::new(None));
        let sample_supervisor = supervisor_cell.clone();
        let sample_id = local_id.clone();
        let on_sample = Callback::from(move |sample: SpeakingSample| {
            if !sample.should_broadcast {
                return;
            }
            if let Some(supervisor) = sample_supervisor.borrow().as_ref() {
                supervisor.publish_patch(|meta| meta.speaking = sample.speaking);
            }
            emit_client_event(ClientEvent::Speaking {
                peer_id: sample_id.clone(),
                speaking: sample.speaking,
            });
        });

        let session = match VoiceSession::start(config, VadTuning::group(), on_sample).await {
            Ok(session) => Rc::new(session),
            Err(e) => {
                error!("microphone acquisition failed: {e:?}");
                emit_client_event(ClientEvent::MediaError(
                    "Could not access your microphone. Check browser permissions.".to_string(),
                ));
                return;
            }
        };
        info!("voice room media ready");

        let peers = PeerManager::new(PeerManagerOptions {
            local_id: local_id.clone(),
            topic: topic.clone(),
            socket: socket.clone(),
            ice_servers: options.ice_servers.clone(),
            tie_breaker: TieBreaker::identity_order(),
            on_remote_stream: options.on_remote_stream.clone(),
        });
        peers.set_local_stream(session.stream());

        let share_supervisor = supervisor_cell.clone();
        let shares = ScreenShareManager::new(ScreenShareOptions {
            local_id: local_id.clone(),
            topic: topic.clone(),
            socket: socket.clone(),
            ice_servers: options.ice_servers.clone(),
            publish_sharing: Callback::from(move |sharing: bool| {
                if let Some(supervisor) = share_supervisor.borrow().as_ref() {
                    supervisor.publish_patch(|meta| meta.sharing = sharing);
                }
            }),
            on_viewer_stream: options.on_share_stream.clone(),
        });

        let join_client = self.clone();
        let leave_client = self.clone();
        let profiles = options.profiles.clone();
        let supervisor = PresenceSupervisor::start(PresenceSupervisorOptions {
            topic: topic.clone(),
            socket: socket.clone(),
            local_meta: self.local_meta(),
            on_peer_joined: Callback::from(move |meta: PresenceMeta| {
                join_client.on_peer_joined(meta);
            }),
            on_peer_left: Callback::from(move |peer_id: String| {
                leave_client.on_peer_left(&peer_id);
            }),
            on_status_change: Callback::from(move |status: PresenceStatus| {
                if let Err(e) = profiles.set_status(status) {
                    warn!("failed to mirror status to profile: {e}");
                }
            }),
        });
        *supervisor_cell.borrow_mut() = Some(supervisor.clone());

        self.inner.borrow_mut().room = Some(Room {
            topic,
            peers,
            shares,
            supervisor,
            session,
            roster: Roster::new(),
        });
    }

    fn on_peer_joined(&self, meta: PresenceMeta) {
        let mut inner = self.inner.borrow_mut();
        let Some(room) = inner.room.as_mut() else { return };

        let previous_speaking = room.roster.get(&meta.user_id).map(|p| p.speaking);
        room.roster.upsert(&meta);
        if previous_speaking.is_some() && previous_speaking != Some(meta.speaking) {
            emit_client_event(ClientEvent::Speaking {
                peer_id: meta.user_id.clone(),
                speaking: meta.speaking,
            });
        }

        let peers = room.peers.clone();
        let peer_id = meta.user_id.clone();
        drop(inner);
        // Tie-break decides which side actually offers.
        peers.connect_to(&peer_id);
    }

    fn on_peer_left(&self, peer_id: &str) {
        let mut inner = self.inner.borrow_mut();
        let Some(room) = inner.room.as_mut() else { return };
        room.roster.remove(peer_id);
        room.peers.peer_left(peer_id);
    }

    /// Leaves the room.  Unconditional: all media tracks stop, every link
    /// closes, the detector loop ends, presence goes offline.
    pub fn leave(&self) {
        let room = self.inner.borrow_mut().room.take();
        let Some(room) = room else { return };
        room.shares.teardown();
        room.peers.close_all();
        room.session.teardown();
        room.supervisor.stop();
        if let Some(socket) = self.inner.borrow().socket.clone() {
            socket.leave(&room.topic);
        }
    }

    /// Toggles the microphone.  Returns the new muted state; the change
    /// rides the next presence broadcast.
    pub fn toggle_mute(&self) -> bool {
        let inner = self.inner.borrow();
        let Some(room) = inner.room.as_ref() else {
            return false;
        };
        let muted = !room.session.is_muted();
        room.session.set_muted(muted);
        room.supervisor.publish_patch(|meta| meta.muted = muted);
        muted
    }

    pub fn start_screen_share(&self, quality: SharePreset) {
        if let Some(room) = self.inner.borrow().room.as_ref() {
            room.shares.start_share(quality);
        }
    }

    pub fn stop_screen_share(&self) {
        if let Some(room) = self.inner.borrow().room.as_ref() {
            room.shares.stop_share();
        }
    }

    /// Per-listener playback volume for one participant, 0.0..=1.0.
    pub fn set_user_volume(&self, peer_id: &str, volume: f32) {
        let mut inner = self.inner.borrow_mut();
        if let Some(room) = inner.room.as_mut() {
            room.roster.set_volume(peer_id, volume);
        }
    }

    /// Current roster snapshot, sorted by participant id.
    pub fn participants(&self) -> Vec<Participant> {
        self.inner
            .borrow()
            .room
            .as_ref()
            .map(|room| room.roster.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Call on local user activity (typing, pointer) so presence can
    /// promote `away` back to `online`.
    pub fn note_activity(&self) {
        if let Some(room) = self.inner.borrow().room.as_ref() {
            room.supervisor.note_activity();
        }
    }

    /// Applies a new pipeline configuration and persists it.  A mode-only
    /// change retunes the live graph; anything else rebuilds the pipeline
    /// against a freshly acquired microphone and swaps the outgoing track
    /// on every live link.
    pub fn reconfigure(&self, config: NoisePipelineConfig) {
        config.store();
        let needs_rebuild = {
            let mut inner = self.inner.borrow_mut();
            let old = inner.config.clone();
            inner.config = config.clone();
            old.suppression != config.suppression
                || old.input_device != config.input_device
                || old.echo_cancel != config.echo_cancel
                || old.auto_gain != config.auto_gain
        };

        let inner = self.inner.borrow();
        let Some(room) = inner.room.as_ref() else { return };

        if !needs_rebuild {
            room.session.set_mode(config.mode);
            return;
        }

        let client = self.clone();
        drop(inner);
        wasm_bindgen_futures::spawn_local(async move {
            client.rebuild_session(config).await;
        });
    }

    async fn rebuild_session(&self, config: NoisePipelineConfig) {
        // Release the previous microphone before re-acquiring; holding
        // both trips device locks on several platforms.
        let (old_session, supervisor_cell) = {
            let inner = self.inner.borrow();
            let Some(room) = inner.room.as_ref() else { return };
            (Rc::clone(&room.session), room.supervisor.clone())
        };
        old_session.teardown();

        let local_id = self.local_profile().id;
        let supervisor = supervisor_cell;
        let on_sample = Callback::from(move |sample: SpeakingSample| {
            if !sample.should_broadcast {
                return;
            }
            supervisor.publish_patch(|meta| meta.speaking = sample.speaking);
            emit_client_event(ClientEvent::Speaking {
                peer_id: local_id.clone(),
                speaking: sample.speaking,
            });
        });

        match VoiceSession::start(config, VadTuning::group(), on_sample).await {
            Ok(session) => {
                let session = Rc::new(session);
                let mut inner = self.inner.borrow_mut();
                if let Some(room) = inner.room.as_mut() {
                    room.peers.replace_local_stream(session.stream());
                    room.session = session;
                }
            }
            Err(e) => {
                error!("pipeline rebuild failed: {e:?}");
                emit_client_event(ClientEvent::MediaError(
                    "Could not switch microphone settings.".to_string(),
                ));
            }
        }
    }
}
