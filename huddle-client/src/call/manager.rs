//! 1:1 call orchestration.
//!
//! The call record in the relational store is the rendezvous point: this
//! manager writes status transitions, reacts to everyone else's (the
//! remote party and the backend watchdog alike), and owns all local media
//! for the call.  Glare cannot happen at the link level because the call
//! initiator, and only the call initiator, offers once its media is ready.

use crate::audio::{NoisePipelineConfig, VadTuning, VoiceSession};
use crate::call::state::{Applied, CallLifecycle};
use crate::collab::CallStore;
use crate::event_bus::emit_client_event;
use crate::events::ClientEvent;
use crate::peer::{PeerManager, PeerManagerOptions, TieBreaker};
use crate::signaling::RealtimeSocket;
use huddle_types::{Callback, CallRecord, CallStatus, PresenceMeta};
use log::{error, info, warn};
use std::cell::RefCell;
use std::rc::Rc;
use web_sys::MediaStream;

fn call_topic(call_id: &str) -> String {
    format!("call:{call_id}")
}

#[derive(Clone)]
pub struct CallManagerOptions {
    pub local_id: String,
    /// Presence attribute template for this user (display name, avatar).
    pub local_meta: PresenceMeta,
    pub socket: RealtimeSocket,
    pub store: Rc<dyn CallStore>,
    pub ice_servers: Vec<String>,
    pub pipeline_config: NoisePipelineConfig,
    /// The remote party's voice stream.
    pub on_remote_stream: Callback<(String, MediaStream)>,
}

struct CurrentCall {
    record: CallRecord,
    lifecycle: CallLifecycle,
    peers: PeerManager,
    session: Option<Rc<VoiceSession>>,
    /// Canonical presence attributes on the call topic; single writer so
    /// speaking and muted updates never clobber each other.
    meta: Rc<RefCell<PresenceMeta>>,
}

struct Inner {
    options: CallManagerOptions,
    current: Option<CurrentCall>,
}

#[derive(Clone)]
pub struct CallManager {
    inner: Rc<RefCell<Inner>>,
}

impl CallManager {
    pub fn new(options: CallManagerOptions) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                options,
                current: None,
            })),
        }
    }

    /// Rings `callee_id`.  Returns the new call id; the call is live only
    /// once the callee drives the record to `Active`.
    pub fn start_call(&self, callee_id: &str) -> anyhow::Result<String> {
        if self.inner.borrow().current.is_some() {
            anyhow::bail!("a call is already in progress");
        }
        let (record, store) = {
            let inner = self.inner.borrow();
            let call_id = format!(
                "call-{}-{}",
                inner.options.local_id,
                js_sys::Date::now() as u64
            );
            (
                CallRecord::new(
                    call_id,
                    inner.options.local_id.clone(),
                    callee_id,
                    js_sys::Date::now(),
                ),
                inner.options.store.clone(),
            )
        };
        store.insert(&record)?;

        let call_id = record.id.clone();
        self.install_call(record, true);
        Ok(call_id)
    }

    /// Accepts an incoming ring.  Media comes up first; the record is
    /// driven to `Active` only once this side can actually answer an
    /// offer with tracks attached.
    pub fn accept(&self, record: CallRecord) {
        if self.inner.borrow().current.is_some() {
            warn!("already in a call; ignoring accept");
            return;
        }
        self.install_call(record.clone(), false);

        let manager = self.clone();
        wasm_bindgen_futures::spawn_local(async move {
            if manager.bring_up_media().await {
                let store = manager.inner.borrow().options.store.clone();
                if let Err(e) = store.update_status(&record.id, CallStatus::Active) {
                    error!("failed to update call status: {e}");
                }
            }
        });
    }

    /// Declines an incoming ring without touching any media.
    pub fn decline(&self, record: &CallRecord) {
        let store = self.inner.borrow().options.store.clone();
        if let Err(e) = store.update_status(&record.id, CallStatus::Declined) {
            error!("failed to decline call: {e}");
        }
    }

    /// Ends the current call in any state.  Unconditional: every in-flight
    /// negotiation is abandoned and all media stops.
    pub fn hang_up(&self) {
        let (call_id, store) = {
            let inner = self.inner.borrow();
            let Some(current) = inner.current.as_ref() else {
                return;
            };
            (current.record.id.clone(), inner.options.store.clone())
        };
        if let Err(e) = store.update_status(&call_id, CallStatus::Ended) {
            error!("failed to write terminal call status: {e}");
        }
        // Do not wait for the change notification to come back around.
        self.teardown_local();
    }

    pub fn toggle_mute(&self) -> bool {
        let inner = self.inner.borrow();
        let Some(current) = inner.current.as_ref() else {
            return false;
        };
        let Some(session) = current.session.as_ref() else {
            return false;
        };
        let muted = !session.is_muted();
        session.set_muted(muted);
        let meta = {
            let mut meta = current.meta.borrow_mut();
            meta.muted = muted;
            meta.clone()
        };
        inner
            .options
            .socket
            .track(&call_topic(&current.record.id), &meta);
        muted
    }

    pub fn current_status(&self) -> Option<CallStatus> {
        self.inner
            .borrow()
            .current
            .as_ref()
            .map(|c| c.lifecycle.status())
    }

    fn install_call(&self, record: CallRecord, is_initiator: bool) {
        let topic = call_topic(&record.id);
        let (socket, options) = {
            let inner = self.inner.borrow();
            (inner.options.socket.clone(), inner.options.clone())
        };
        socket.join(&topic);
        socket.track(&topic, &options.local_meta);

        // Link-level glare is impossible: the comparator only ever lets
        // the call initiator offer.
        let peers = PeerManager::new(PeerManagerOptions {
            local_id: options.local_id.clone(),
            topic: topic.clone(),
            socket: socket.clone(),
            ice_servers: options.ice_servers.clone(),
            tie_breaker: TieBreaker::initiator(record.caller.clone()),
            on_remote_stream: options.on_remote_stream.clone(),
        });

        let manager = self.clone();
        let call_id = record.id.clone();
        options.store.on_status_change(
            &record.id,
            Callback::from(move |status: CallStatus| {
                manager.handle_status(&call_id, status);
            }),
        );

        self.inner.borrow_mut().current = Some(CurrentCall {
            record,
            lifecycle: CallLifecycle::new(is_initiator),
            peers,
            session: None,
            meta: Rc::new(RefCell::new(options.local_meta.clone())),
        });
    }

    fn handle_status(&self, call_id: &str, status: CallStatus) {
        let applied = {
            let mut inner = self.inner.borrow_mut();
            let Some(current) = inner.current.as_mut() else {
                return;
            };
            if current.record.id != call_id {
                return;
            }
            current.record.status = status;
            current.lifecycle.apply(status)
        };

        match applied {
            Applied::Ignored => {}
            Applied::Entered {
                status,
                needs_media,
            } => {
                info!("call {call_id}: {status:?}");
                emit_client_event(ClientEvent::CallStatus {
                    call_id: call_id.to_string(),
                    status,
                });
                if status.is_terminal() {
                    self.teardown_local();
                } else if needs_media {
                    let manager = self.clone();
                    wasm_bindgen_futures::spawn_local(async move {
                        manager.activate().await;
                    });
                }
            }
        }
    }

    /// Entry to `Active`: bring media up if it is not already, then let
    /// the initiator offer.
    async fn activate(&self) {
        let has_session = {
            let inner = self.inner.borrow();
            match inner.current.as_ref() {
                Some(current) => current.session.is_some(),
                None => return,
            }
        };
        if !has_session && !self.bring_up_media().await {
            return;
        }

        let (is_initiator, remote_id, peers) = {
            let inner = self.inner.borrow();
            let Some(current) = inner.current.as_ref() else {
                return;
            };
            (
                current.lifecycle.is_initiator(),
                current.record.remote_of(&inner.options.local_id).to_string(),
                current.peers.clone(),
            )
        };
        if is_initiator {
            peers.connect_to(&remote_id);
        }
    }

    /// Acquires the microphone and wires the processing chain plus the
    /// speaking broadcast.  On acquisition failure the attempt is aborted
    /// and surfaced; no prior state is touched.
    async fn bring_up_media(&self) -> bool {
        let (config, topic, meta, socket) = {
            let inner = self.inner.borrow();
            let Some(current) = inner.current.as_ref() else {
                return false;
            };
            (
                inner.options.pipeline_config.clone(),
                call_topic(&current.record.id),
                current.meta.clone(),
                inner.options.socket.clone(),
            )
        };

        let on_sample = Callback::from(move |sample: crate::audio::SpeakingSample| {
            if sample.should_broadcast {
                let snapshot = {
                    let mut meta = meta.borrow_mut();
                    meta.speaking = sample.speaking;
                    meta.last_active_ms = js_sys::Date::now();
                    meta.clone()
                };
                socket.track(&topic, &snapshot);
                emit_client_event(ClientEvent::Speaking {
                    peer_id: snapshot.user_id,
                    speaking: sample.speaking,
                });
            }
        });

        match VoiceSession::start(config, VadTuning::direct(), on_sample).await {
            Ok(session) => {
                let session = Rc::new(session);
                let mut inner = self.inner.borrow_mut();
                let Some(current) = inner.current.as_mut() else {
                    // Call ended while the microphone prompt was open.
                    session.teardown();
                    return false;
                };
                current.peers.set_local_stream(session.stream());
                current.session = Some(session);
                true
            }
            Err(e) => {
                error!("microphone acquisition failed: {e:?}");
                emit_client_event(ClientEvent::MediaError(
                    "Could not access your microphone. Check browser permissions.".to_string(),
                ));
                false
            }
        }
    }

    /// Drops every local resource of the current call: links, microphone,
    /// pipeline, detector, signaling topic.
    fn teardown_local(&self) {
        let current = self.inner.borrow_mut().current.take();
        let Some(current) = current else { return };
        current.peers.close_all();
        if let Some(session) = current.session.as_ref() {
            session.teardown();
        }
        let socket = self.inner.borrow().options.socket.clone();
        socket.leave(&call_topic(&current.record.id));
    }
}
