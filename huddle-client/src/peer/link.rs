//! One `RtcPeerConnection` toward one remote participant for one purpose.
//!
//! The link owns the browser connection object and drives it from the pure
//! [`Negotiation`](super::Negotiation) record: every signaling callback
//! checks in with the state machine before touching the connection, and
//! every decision it returns (apply, buffer, restart, teardown) is executed
//! here.

use crate::constants::{DISCONNECT_GRACE_MS, VOICE_MAX_BITRATE};
use crate::peer::negotiation::{IceDisposition, IceObservation, Negotiation, Recovery};
use crate::peer::registry::LinkHandle;
use gloo_timers::callback::Timeout;
use huddle_types::{Callback, IceCandidatePayload, MediaPurpose, SignalEnvelope, SignalKind};
use log::{debug, error, warn};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    MediaStream, MediaStreamTrack, RtcConfiguration, RtcIceCandidateInit, RtcIceConnectionState,
    RtcIceServer, RtcOfferOptions, RtcPeerConnection, RtcPeerConnectionIceEvent, RtcRtpSender,
    RtcSdpType, RtcSessionDescriptionInit, RtcTrackEvent,
};

#[derive(Clone)]
pub struct PeerLinkOptions {
    pub local_id: String,
    pub remote_id: String,
    pub purpose: MediaPurpose,
    pub ice_servers: Vec<String>,
    /// Outbound envelopes, routed to the signaling topic by the owner.
    pub on_signal: Callback<SignalEnvelope>,
    /// A remote media stream became available on this link.
    pub on_remote_stream: Callback<(String, MediaStream)>,
    /// The link died beyond recovery.  Fired at most once.
    pub on_failed: Callback<(String, MediaPurpose)>,
}

struct LinkInner {
    pc: RtcPeerConnection,
    negotiation: RefCell<Negotiation>,
    options: PeerLinkOptions,
}

#[derive(Clone)]
pub struct PeerLink {
    inner: Rc<LinkInner>,
}

impl PeerLink {
    /// Builds the connection as the offering side.  The caller is expected
    /// to have won the tie-break.
    pub fn offerer(options: PeerLinkOptions) -> Result<Self, JsValue> {
        Self::build(options, Negotiation::offerer())
    }

    /// Builds the connection as the answering side, in response to a
    /// remote offer.
    pub fn answerer(options: PeerLinkOptions) -> Result<Self, JsValue> {
        Self::build(options, Negotiation::answerer())
    }

    fn build(options: PeerLinkOptions, negotiation: Negotiation) -> Result<Self, JsValue> {
        let config = RtcConfiguration::new();
        let servers = js_sys::Array::new();
        for url in &options.ice_servers {
            let server = RtcIceServer::new();
            server.set_urls(&JsValue::from_str(url));
            servers.push(&server);
        }
        config.set_ice_servers(&servers);

        let pc = RtcPeerConnection::new_with_configuration(&config)?;
        let link = Self {
            inner: Rc::new(LinkInner {
                pc,
                negotiation: RefCell::new(negotiation),
                options,
            }),
        };
        link.wire_callbacks();
        Ok(link)
    }

    fn wire_callbacks(&self) {
        let weak = Rc::downgrade(&self.inner);
        let onicecandidate = Closure::wrap(Box::new(move |event: RtcPeerConnectionIceEvent| {
            let Some(inner) = weak.upgrade() else { return };
            let Some(candidate) = event.candidate() else {
                return; // end-of-candidates marker
            };
            let payload = IceCandidatePayload {
                candidate: candidate.candidate(),
                sdp_mid: candidate.sdp_mid(),
                sdp_mline_index: candidate.sdp_m_line_index(),
            };
            match serde_json::to_value(&payload) {
                Ok(value) => inner.options.on_signal.emit(SignalEnvelope {
                    kind: SignalKind::IceCandidate,
                    from: inner.options.local_id.clone(),
                    to: inner.options.remote_id.clone(),
                    purpose: inner.options.purpose,
                    payload: value,
                }),
                Err(e) => error!("failed to serialize ice candidate: {e}"),
            }
        }) as Box<dyn FnMut(RtcPeerConnectionIceEvent)>);
        self.inner
            .pc
            .set_onicecandidate(Some(onicecandidate.as_ref().unchecked_ref()));
        onicecandidate.forget();

        let weak = Rc::downgrade(&self.inner);
        let ontrack = Closure::wrap(Box::new(move |event: RtcTrackEvent| {
            let Some(inner) = weak.upgrade() else { return };
            let streams = event.streams();
            let stream = if streams.length() > 0 {
                streams.get(0).unchecked_into::<MediaStream>()
            } else {
                // Track arrived without a stream; wrap it in one.
                let Ok(stream) = MediaStream::new() else { return };
                stream.add_track(&event.track());
                stream
            };
            inner
                .options
                .on_remote_stream
                .emit((inner.options.remote_id.clone(), stream));
        }) as Box<dyn FnMut(RtcTrackEvent)>);
        self.inner
            .pc
            .set_ontrack(Some(ontrack.as_ref().unchecked_ref()));
        ontrack.forget();

        let weak = Rc::downgrade(&self.inner);
        let onstatechange = Closure::wrap(Box::new(move |_: JsValue| {
            let Some(inner) = weak.upgrade() else { return };
            Self::on_ice_state(&inner);
        }) as Box<dyn FnMut(JsValue)>);
        self.inner
            .pc
            .set_oniceconnectionstatechange(Some(onstatechange.as_ref().unchecked_ref()));
        onstatechange.forget();
    }

    fn on_ice_state(inner: &Rc<LinkInner>) {
        let observation = match inner.pc.ice_connection_state() {
            RtcIceConnectionState::Checking => IceObservation::Checking,
            RtcIceConnectionState::Connected | RtcIceConnectionState::Completed => {
                IceObservation::Connected
            }
            RtcIceConnectionState::Disconnected => IceObservation::Disconnected,
            RtcIceConnectionState::Failed => IceObservation::Failed,
            RtcIceConnectionState::Closed => IceObservation::Closed,
            _ => return,
        };
        debug!(
            "link {}/{}: ice {:?}",
            inner.options.remote_id, inner.options.purpose, observation
        );

        let recovery = inner.negotiation.borrow_mut().ice_state_changed(observation);
        Self::run_recovery(inner, recovery);

        if observation == IceObservation::Disconnected {
            let weak = Rc::downgrade(inner);
            Timeout::new(DISCONNECT_GRACE_MS, move || {
                if let Some(inner) = weak.upgrade() {
                    let recovery = inner.negotiation.borrow_mut().disconnected_grace_expired();
                    Self::run_recovery(&inner, recovery);
                }
            })
            .forget();
        }
    }

    fn run_recovery(inner: &Rc<LinkInner>, recovery: Recovery) {
        match recovery {
            Recovery::None => {}
            Recovery::RestartIce => {
                warn!(
                    "link {}/{}: attempting ice restart",
                    inner.options.remote_id, inner.options.purpose
                );
                Self::spawn_restart_offer(inner);
            }
            Recovery::Teardown => {
                warn!(
                    "link {}/{}: failed beyond recovery",
                    inner.options.remote_id, inner.options.purpose
                );
                inner.negotiation.borrow_mut().close();
                inner.pc.close();
                inner
                    .options
                    .on_failed
                    .emit((inner.options.remote_id.clone(), inner.options.purpose));
            }
        }
    }

    /// Attaches every track of a local stream, tuning voice senders for
    /// low-latency speech.
    pub fn attach_stream(&self, stream: &MediaStream) {
        let tracks = stream.get_tracks();
        for track in tracks.iter() {
            let track = track.unchecked_into::<MediaStreamTrack>();
            let sender = self
                .inner
                .pc
                .add_track(&track, stream, &js_sys::Array::new());
            if self.inner.options.purpose == MediaPurpose::Voice {
                tune_voice_sender(&sender);
            }
        }
    }

    /// Creates and sends the initial offer.
    pub fn start_offer(&self) {
        if let Err(e) = self.inner.negotiation.borrow_mut().local_offer_created() {
            warn!("suppressing offer: {e}");
            return;
        }
        Self::spawn_offer(&self.inner, false);
    }

    fn spawn_restart_offer(inner: &Rc<LinkInner>) {
        if let Err(e) = inner.negotiation.borrow_mut().restart_offer_created() {
            warn!("suppressing restart offer: {e}");
            return;
        }
        Self::spawn_offer(inner, true);
    }

    fn spawn_offer(inner: &Rc<LinkInner>, ice_restart: bool) {
        let weak = Rc::downgrade(inner);
        wasm_bindgen_futures::spawn_local(async move {
            let Some(inner) = weak.upgrade() else { return };
            let result = async {
                let promise = if ice_restart {
                    let options = RtcOfferOptions::new();
                    options.set_ice_restart(true);
                    inner.pc.create_offer_with_rtc_offer_options(&options)
                } else {
                    inner.pc.create_offer()
                };
                let offer = JsFuture::from(promise).await?;
                let sdp = sdp_of(&offer)?;
                let init = RtcSessionDescriptionInit::new(RtcSdpType::Offer);
                init.set_sdp(&sdp);
                JsFuture::from(inner.pc.set_local_description(&init)).await?;
                Ok::<String, JsValue>(sdp)
            }
            .await;

            match result {
                Ok(sdp) => {
                    if inner.negotiation.borrow().is_closed() {
                        return;
                    }
                    inner.options.on_signal.emit(SignalEnvelope {
                        kind: SignalKind::Offer,
                        from: inner.options.local_id.clone(),
                        to: inner.options.remote_id.clone(),
                        purpose: inner.options.purpose,
                        payload: json!({ "sdp": sdp }),
                    });
                }
                Err(e) => error!("offer negotiation failed: {e:?}"),
            }
        });
    }

    /// Handles a remote offer: applies it, drains buffered candidates and
    /// replies with an answer.
    pub fn accept_offer(&self, sdp: String) {
        if let Err(e) = self.inner.negotiation.borrow_mut().remote_offer_received() {
            warn!("dropping offer: {e}");
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        wasm_bindgen_futures::spawn_local(async move {
            let Some(inner) = weak.upgrade() else { return };
            let result = async {
                let init = RtcSessionDescriptionInit::new(RtcSdpType::Offer);
                init.set_sdp(&sdp);
                JsFuture::from(inner.pc.set_remote_description(&init)).await?;

                // Re-check after the suspension: the link may have been
                // closed while the description applied.
                if inner.negotiation.borrow().is_closed() {
                    return Ok(None);
                }
                let drained = inner.negotiation.borrow_mut().remote_description_applied();
                apply_candidates(&inner.pc, drained).await;

                let answer = JsFuture::from(inner.pc.create_answer()).await?;
                let sdp = sdp_of(&answer)?;
                let init = RtcSessionDescriptionInit::new(RtcSdpType::Answer);
                init.set_sdp(&sdp);
                JsFuture::from(inner.pc.set_local_description(&init)).await?;
                Ok::<Option<String>, JsValue>(Some(sdp))
            }
            .await;

            match result {
                Ok(Some(sdp)) => {
                    if inner.negotiation.borrow().is_closed() {
                        return;
                    }
                    inner.options.on_signal.emit(SignalEnvelope {
                        kind: SignalKind::Answer,
                        from: inner.options.local_id.clone(),
                        to: inner.options.remote_id.clone(),
                        purpose: inner.options.purpose,
                        payload: json!({ "sdp": sdp }),
                    });
                }
                Ok(None) => {}
                Err(e) => error!("answer negotiation failed: {e:?}"),
            }
        });
    }

    /// Handles a remote answer to our offer.
    pub fn accept_answer(&self, sdp: String) {
        if let Err(e) = self.inner.negotiation.borrow_mut().answer_received() {
            warn!("dropping answer: {e}");
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        wasm_bindgen_futures::spawn_local(async move {
            let Some(inner) = weak.upgrade() else { return };
            let init = RtcSessionDescriptionInit::new(RtcSdpType::Answer);
            init.set_sdp(&sdp);
            if let Err(e) = JsFuture::from(inner.pc.set_remote_description(&init)).await {
                error!("failed to apply answer: {e:?}");
                return;
            }
            if inner.negotiation.borrow().is_closed() {
                return;
            }
            let drained = inner.negotiation.borrow_mut().remote_description_applied();
            apply_candidates(&inner.pc, drained).await;
        });
    }

    /// Handles an inbound ICE candidate, buffering it when it outran the
    /// remote description.
    pub fn add_remote_candidate(&self, payload: IceCandidatePayload) {
        let disposition = self
            .inner
            .negotiation
            .borrow_mut()
            .ice_candidate_received(payload.clone());
        if disposition == IceDisposition::Buffered {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        wasm_bindgen_futures::spawn_local(async move {
            let Some(inner) = weak.upgrade() else { return };
            apply_candidates(&inner.pc, vec![payload]).await;
        });
    }

    /// Swaps the outgoing audio track without renegotiating, for pipeline
    /// rebuilds (device change, suppression toggle).
    pub fn replace_audio_track(&self, stream: &MediaStream) {
        let new_track = stream.get_audio_tracks().get(0);
        let new_track = if new_track.is_undefined() {
            None
        } else {
            Some(new_track.unchecked_into::<MediaStreamTrack>())
        };
        for sender in self.inner.pc.get_senders().iter() {
            let sender = sender.unchecked_into::<RtcRtpSender>();
            let is_audio = sender
                .track()
                .map(|track| track.kind() == "audio")
                .unwrap_or(false);
            if !is_audio {
                continue;
            }
            let promise = sender.replace_track(new_track.as_ref());
            wasm_bindgen_futures::spawn_local(async move {
                if let Err(e) = JsFuture::from(promise).await {
                    warn!("failed to replace outgoing audio track: {e:?}");
                }
            });
        }
    }

    pub fn remote_id(&self) -> &str {
        &self.inner.options.remote_id
    }
}

impl LinkHandle for PeerLink {
    fn shutdown(&self) {
        self.inner.negotiation.borrow_mut().close();
        self.inner.pc.set_onicecandidate(None);
        self.inner.pc.set_ontrack(None);
        self.inner.pc.set_oniceconnectionstatechange(None);
        self.inner.pc.close();
    }
}

/// Applies candidates sequentially, preserving arrival order.
async fn apply_candidates(pc: &RtcPeerConnection, candidates: Vec<IceCandidatePayload>) {
    for payload in candidates {
        let init = RtcIceCandidateInit::new(&payload.candidate);
        init.set_sdp_mid(payload.sdp_mid.as_deref());
        init.set_sdp_m_line_index(payload.sdp_mline_index);
        if let Err(e) =
            JsFuture::from(pc.add_ice_candidate_with_opt_rtc_ice_candidate_init(Some(&init))).await
        {
            warn!("failed to apply ice candidate: {e:?}");
        }
    }
}

fn sdp_of(description: &JsValue) -> Result<String, JsValue> {
    js_sys::Reflect::get(description, &JsValue::from_str("sdp"))?
        .as_string()
        .ok_or_else(|| JsValue::from_str("session description without sdp"))
}

/// Voice is latency-critical: bound the bitrate and raise the transport
/// priority so audio wins under contention.
fn tune_voice_sender(sender: &RtcRtpSender) {
    let params = sender.get_parameters();
    let encodings = match js_sys::Reflect::get(params.as_ref(), &JsValue::from_str("encodings")) {
        Ok(value) if value.is_object() => value.unchecked_into::<js_sys::Array>(),
        _ => return,
    };
    if encodings.length() == 0 {
        encodings.push(&js_sys::Object::new());
    }
    let encoding = encodings.get(0);
    let _ = js_sys::Reflect::set(
        &encoding,
        &JsValue::from_str("maxBitrate"),
        &JsValue::from_f64(VOICE_MAX_BITRATE as f64),
    );
    let _ = js_sys::Reflect::set(
        &encoding,
        &JsValue::from_str("priority"),
        &JsValue::from_str("high"),
    );
    let _ = js_sys::Reflect::set(
        &encoding,
        &JsValue::from_str("networkPriority"),
        &JsValue::from_str("high"),
    );
    let _ = js_sys::Reflect::set(
        params.as_ref(),
        &JsValue::from_str("encodings"),
        &encodings,
    );
    let _ = sender.set_parameters(&params);
}
