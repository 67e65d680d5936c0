//! One WebSocket to the realtime service, multiplexing every topic the
//! client is subscribed to.
//!
//! Broadcast topics carry [`SignalEnvelope`]s; presence topics carry
//! tracked attribute sets.  Delivery is at most once and only to current
//! subscribers: anything published before a peer joins a topic is lost,
//! and callers are expected to tolerate that.
//!
//! Registered topics are re-joined (and presence re-tracked) every time
//! the socket opens, so a `reconnect()` restores the full subscription
//! state without callers doing anything.

use crate::constants::HEARTBEAT_INTERVAL_MS;
use crate::signaling::presence_state::{PresenceEvent, PresenceSet};
use gloo_timers::callback::Interval;
use huddle_types::{Callback, Frame, FrameEvent, PresenceDiff, PresenceMeta, SignalEnvelope};
use log::{debug, error, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::prelude::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CloseEvent, MessageEvent, WebSocket};

#[derive(Clone)]
pub struct RealtimeSocketOptions {
    pub url: String,
    pub on_open: Callback<()>,
    pub on_close: Callback<String>,
}

#[derive(Default)]
struct Topic {
    presence: PresenceSet,
    /// Our own attribute set, re-published on every (re)join.
    tracked: Option<PresenceMeta>,
    on_envelope: Vec<Callback<SignalEnvelope>>,
    on_presence: Vec<Callback<PresenceEvent>>,
}

struct Inner {
    options: RealtimeSocketOptions,
    ws: Option<WebSocket>,
    open: bool,
    topics: HashMap<String, Topic>,
    _heartbeat: Option<Interval>,
}

/// Handle to the realtime connection.  Cheap to clone; all clones share
/// one socket.
#[derive(Clone)]
pub struct RealtimeSocket {
    inner: Rc<RefCell<Inner>>,
}

impl RealtimeSocket {
    pub fn connect(options: RealtimeSocketOptions) -> Result<Self, JsValue> {
        let socket = Self {
            inner: Rc::new(RefCell::new(Inner {
                options,
                ws: None,
                open: false,
                topics: HashMap::new(),
                _heartbeat: None,
            })),
        };
        socket.open_websocket()?;

        let weak = Rc::downgrade(&socket.inner);
        let heartbeat = Interval::new(HEARTBEAT_INTERVAL_MS, move || {
            if let Some(inner) = weak.upgrade() {
                let open = inner.borrow().open;
                if open {
                    Self::send_frame_on(&inner, &Frame::heartbeat());
                }
            }
        });
        socket.inner.borrow_mut()._heartbeat = Some(heartbeat);

        Ok(socket)
    }

    /// Tears down the current WebSocket and dials again.  Registered
    /// topics re-join on open.
    pub fn reconnect(&self) -> Result<(), JsValue> {
        self.drop_websocket();
        self.open_websocket()
    }

    pub fn is_open(&self) -> bool {
        self.inner.borrow().open
    }

    /// Subscribes to a broadcast topic.  Idempotent.
    pub fn join(&self, topic: &str) {
        let needs_join = {
            let mut inner = self.inner.borrow_mut();
            let fresh = !inner.topics.contains_key(topic);
            inner.topics.entry(topic.to_string()).or_default();
            fresh && inner.open
        };
        if needs_join {
            Self::send_frame_on(
                &self.inner,
                &Frame::new(topic, FrameEvent::Join, serde_json::Value::Null),
            );
        }
    }

    /// Unsubscribes and drops all callbacks and presence state for the
    /// topic.
    pub fn leave(&self, topic: &str) {
        let was_registered = self.inner.borrow_mut().topics.remove(topic).is_some();
        if was_registered && self.inner.borrow().open {
            Self::send_frame_on(
                &self.inner,
                &Frame::new(topic, FrameEvent::Leave, serde_json::Value::Null),
            );
        }
    }

    pub fn on_envelope(&self, topic: &str, callback: Callback<SignalEnvelope>) {
        self.join(topic);
        let mut inner = self.inner.borrow_mut();
        if let Some(entry) = inner.topics.get_mut(topic) {
            entry.on_envelope.push(callback);
        }
    }

    pub fn on_presence(&self, topic: &str, callback: Callback<PresenceEvent>) {
        self.join(topic);
        let mut inner = self.inner.borrow_mut();
        if let Some(entry) = inner.topics.get_mut(topic) {
            entry.on_presence.push(callback);
        }
    }

    /// Publishes an envelope to every current subscriber of the topic.
    pub fn send_envelope(&self, topic: &str, envelope: &SignalEnvelope) {
        match serde_json::to_value(envelope) {
            Ok(payload) => {
                Self::send_frame_on(&self.inner, &Frame::new(topic, FrameEvent::Broadcast, payload))
            }
            Err(e) => error!("failed to serialize envelope: {e}"),
        }
    }

    /// Publishes or updates our presence attribute set on the topic.
    pub fn track(&self, topic: &str, meta: &PresenceMeta) {
        self.join(topic);
        {
            let mut inner = self.inner.borrow_mut();
            if let Some(entry) = inner.topics.get_mut(topic) {
                entry.tracked = Some(meta.clone());
            }
        }
        match serde_json::to_value(meta) {
            Ok(payload) => {
                Self::send_frame_on(&self.inner, &Frame::new(topic, FrameEvent::Track, payload))
            }
            Err(e) => error!("failed to serialize presence meta: {e}"),
        }
    }

    /// A snapshot of the membership currently visible on a presence topic.
    pub fn presence_members(&self, topic: &str) -> Vec<PresenceMeta> {
        self.inner
            .borrow()
            .topics
            .get(topic)
            .map(|t| t.presence.members().cloned().collect())
            .unwrap_or_default()
    }

    pub fn close(&self) {
        self.drop_websocket();
        let mut inner = self.inner.borrow_mut();
        inner.topics.clear();
        inner._heartbeat = None;
    }

    fn open_websocket(&self) -> Result<(), JsValue> {
        let url = self.inner.borrow().options.url.clone();
        debug!("realtime socket connecting to {url}");
        let ws = WebSocket::new(&url)?;

        let weak = Rc::downgrade(&self.inner);
        let onopen = Closure::wrap(Box::new(move |_: JsValue| {
            if let Some(inner) = weak.upgrade() {
                Self::handle_open(&inner);
            }
        }) as Box<dyn FnMut(JsValue)>);
        ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));
        onopen.forget();

        let weak = Rc::downgrade(&self.inner);
        let onmessage = Closure::wrap(Box::new(move |event: MessageEvent| {
            if let Some(inner) = weak.upgrade() {
                if let Some(text) = event.data().as_string() {
                    Self::handle_frame(&inner, &text);
                }
            }
        }) as Box<dyn FnMut(MessageEvent)>);
        ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        onmessage.forget();

        let weak = Rc::downgrade(&self.inner);
        let onclose = Closure::wrap(Box::new(move |event: CloseEvent| {
            if let Some(inner) = weak.upgrade() {
                let reason = if event.reason().is_empty() {
                    format!("socket closed (code {})", event.code())
                } else {
                    event.reason()
                };
                let on_close = {
                    let mut inner = inner.borrow_mut();
                    inner.open = false;
                    inner.options.on_close.clone()
                };
                on_close.emit(reason);
            }
        }) as Box<dyn FnMut(CloseEvent)>);
        ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));
        onclose.forget();

        self.inner.borrow_mut().ws = Some(ws);
        Ok(())
    }

    fn drop_websocket(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.open = false;
        if let Some(ws) = inner.ws.take() {
            ws.set_onopen(None);
            ws.set_onmessage(None);
            ws.set_onclose(None);
            if let Err(e) = ws.close() {
                warn!("error closing realtime socket: {e:?}");
            }
        }
    }

    fn handle_open(inner: &Rc<RefCell<Inner>>) {
        let (topics, on_open) = {
            let mut borrowed = inner.borrow_mut();
            borrowed.open = true;
            let topics: Vec<(String, Option<PresenceMeta>)> = borrowed
                .topics
                .iter()
                .map(|(name, t)| (name.clone(), t.tracked.clone()))
                .collect();
            (topics, borrowed.options.on_open.clone())
        };

        for (name, tracked) in topics {
            Self::send_frame_on(
                inner,
                &Frame::new(name.as_str(), FrameEvent::Join, serde_json::Value::Null),
            );
            if let Some(meta) = tracked {
                if let Ok(payload) = serde_json::to_value(&meta) {
                    Self::send_frame_on(inner, &Frame::new(name.as_str(), FrameEvent::Track, payload));
                }
            }
        }
        on_open.emit(());
    }

    /// Parses and dispatches one inbound frame.  Callbacks run after the
    /// inner borrow is released so handlers may call back into the socket.
    fn handle_frame(inner: &Rc<RefCell<Inner>>, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping malformed realtime frame: {e}");
                return;
            }
        };

        enum Dispatch {
            Envelope(Vec<Callback<SignalEnvelope>>, SignalEnvelope),
            Presence(Vec<Callback<PresenceEvent>>, Vec<PresenceEvent>),
        }

        let dispatch = {
            let mut borrowed = inner.borrow_mut();
            let Some(topic) = borrowed.topics.get_mut(&frame.topic) else {
                debug!("frame for unsubscribed topic {}", frame.topic);
                return;
            };
            match frame.event {
                FrameEvent::Broadcast => match serde_json::from_value(frame.payload) {
                    Ok(envelope) => Some(Dispatch::Envelope(topic.on_envelope.clone(), envelope)),
                    Err(e) => {
                        warn!("dropping malformed envelope on {}: {e}", frame.topic);
                        None
                    }
                },
                FrameEvent::PresenceState => match serde_json::from_value(frame.payload) {
                    Ok(snapshot) => {
                        let events = topic.presence.apply_state(snapshot);
                        Some(Dispatch::Presence(topic.on_presence.clone(), events))
                    }
                    Err(e) => {
                        warn!("dropping malformed presence state on {}: {e}", frame.topic);
                        None
                    }
                },
                FrameEvent::PresenceDiff => {
                    match serde_json::from_value::<PresenceDiff>(frame.payload) {
                        Ok(diff) => {
                            let events = topic.presence.apply_diff(diff);
                            Some(Dispatch::Presence(topic.on_presence.clone(), events))
                        }
                        Err(e) => {
                            warn!("dropping malformed presence diff on {}: {e}", frame.topic);
                            None
                        }
                    }
                }
                _ => None,
            }
        };

        match dispatch {
            Some(Dispatch::Envelope(callbacks, envelope)) => {
                for callback in callbacks {
                    callback.emit(envelope.clone());
                }
            }
            Some(Dispatch::Presence(callbacks, events)) => {
                for event in events {
                    for callback in &callbacks {
                        callback.emit(event.clone());
                    }
                }
            }
            None => {}
        }
    }

    fn send_frame_on(inner: &Rc<RefCell<Inner>>, frame: &Frame) {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                error!("failed to serialize frame: {e}");
                return;
            }
        };
        let borrowed = inner.borrow();
        if let Some(ws) = borrowed.ws.as_ref() {
            if let Err(e) = ws.send_with_str(&text) {
                warn!("realtime send failed: {e:?}");
            }
        }
    }
}
