//! The single writer of this client's presence on a channel topic.
//!
//! Owning the attribute set in one place keeps partial updates (speaking
//! from the detector, muted from the UI, sharing from the share manager)
//! from clobbering each other.  The supervisor also watches local activity
//! to demote `online` to `away`, republishes on an interval as a liveness
//! signal, and turns presence departures into peer teardown.

use crate::constants::{AWAY_AFTER_IDLE_MS, PRESENCE_REPUBLISH_INTERVAL_MS};
use crate::event_bus::emit_client_event;
use crate::events::ClientEvent;
use crate::signaling::{PresenceEvent, RealtimeSocket};
use gloo::timers::callback::Interval;
use huddle_types::{Callback, PresenceMeta, PresenceStatus};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone)]
pub struct PresenceSupervisorOptions {
    pub topic: String,
    pub socket: RealtimeSocket,
    pub local_meta: PresenceMeta,
    /// A remote participant appeared (or refreshed its attributes).
    pub on_peer_joined: Callback<PresenceMeta>,
    /// A remote participant departed; links and streams must go.
    pub on_peer_left: Callback<String>,
    /// The local status (online/away/offline) changed; the profile
    /// service mirrors it.
    pub on_status_change: Callback<PresenceStatus>,
}

struct Inner {
    options: PresenceSupervisorOptions,
    meta: PresenceMeta,
    announced_status: PresenceStatus,
    last_activity_ms: f64,
    _republish: Option<Interval>,
}

#[derive(Clone)]
pub struct PresenceSupervisor {
    inner: Rc<RefCell<Inner>>,
}

impl PresenceSupervisor {
    pub fn start(options: PresenceSupervisorOptions) -> Self {
        let mut meta = options.local_meta.clone();
        meta.status = PresenceStatus::Online;
        meta.last_active_ms = js_sys::Date::now();

        let supervisor = Self {
            inner: Rc::new(RefCell::new(Inner {
                options: options.clone(),
                meta,
                announced_status: PresenceStatus::Online,
                last_activity_ms: js_sys::Date::now(),
                _republish: None,
            })),
        };

        let local_id = options.local_meta.user_id.clone();
        let handler = supervisor.clone();
        options.socket.on_presence(
            &options.topic,
            Callback::from(move |event: PresenceEvent| match event {
                PresenceEvent::Join(meta) => {
                    if meta.user_id != local_id {
                        let on_joined = handler.inner.borrow().options.on_peer_joined.clone();
                        on_joined.emit(meta.clone());
                        emit_client_event(ClientEvent::ParticipantJoined(meta.user_id));
                    }
                }
                PresenceEvent::Leave(meta) => {
                    if meta.user_id != local_id {
                        let on_left = handler.inner.borrow().options.on_peer_left.clone();
                        on_left.emit(meta.user_id.clone());
                        emit_client_event(ClientEvent::ParticipantLeft(meta.user_id));
                    }
                }
                PresenceEvent::Sync(_) => {}
            }),
        );

        supervisor.publish();

        let weak = Rc::downgrade(&supervisor.inner);
        let republish = Interval::new(PRESENCE_REPUBLISH_INTERVAL_MS, move || {
            let Some(inner) = weak.upgrade() else { return };
            {
                let mut inner = inner.borrow_mut();
                let idle = js_sys::Date::now() - inner.last_activity_ms;
                inner.meta.status = if idle > AWAY_AFTER_IDLE_MS {
                    PresenceStatus::Away
                } else {
                    PresenceStatus::Online
                };
            }
            Self::publish_on(&inner);
        });
        supervisor.inner.borrow_mut()._republish = Some(republish);

        supervisor
    }

    /// Applies a partial attribute update and publishes the result.
    pub fn publish_patch(&self, patch: impl FnOnce(&mut PresenceMeta)) {
        {
            let mut inner = self.inner.borrow_mut();
            patch(&mut inner.meta);
            inner.meta.last_active_ms = js_sys::Date::now();
        }
        self.publish();
    }

    /// Call on local user activity; promotes `away` back to `online`.
    pub fn note_activity(&self) {
        let was_away = {
            let mut inner = self.inner.borrow_mut();
            inner.last_activity_ms = js_sys::Date::now();
            inner.meta.status == PresenceStatus::Away
        };
        if was_away {
            self.publish_patch(|meta| meta.status = PresenceStatus::Online);
        }
    }

    /// Publishes `offline` and stops republishing.  Called on leave.
    pub fn stop(&self) {
        self.publish_patch(|meta| meta.status = PresenceStatus::Offline);
        self.inner.borrow_mut()._republish = None;
    }

    fn publish(&self) {
        Self::publish_on(&self.inner);
    }

    fn publish_on(inner: &Rc<RefCell<Inner>>) {
        let (topic, socket, meta, status_change) = {
            let mut inner = inner.borrow_mut();
            let status_change = if inner.meta.status != inner.announced_status {
                inner.announced_status = inner.meta.status;
                Some((inner.options.on_status_change.clone(), inner.meta.status))
            } else {
                None
            };
            (
                inner.options.topic.clone(),
                inner.options.socket.clone(),
                inner.meta.clone(),
                status_change,
            )
        };
        socket.track(&topic, &meta);
        if let Some((callback, status)) = status_change {
            callback.emit(status);
        }
    }
}
