//! Enumeration and selection of audio input devices.
//!
//! Selecting a device here only records the choice and fires the
//! callback; the owner is expected to rebuild the noise pipeline against
//! the newly selected microphone.

use huddle_types::Callback;
use js_sys::Array;
use log::error;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{MediaDeviceInfo, MediaDeviceKind};

/// A list of devices of one kind with a tracked selection.
pub struct SelectableDevices {
    devices: Rc<RefCell<Vec<MediaDeviceInfo>>>,
    selected: Option<String>,
    /// Fired as `callback(device_id)` on every valid selection.
    pub on_selected: Callback<String>,
}

impl SelectableDevices {
    fn new() -> Self {
        Self {
            devices: Rc::new(RefCell::new(Vec::new())),
            selected: None,
            on_selected: Callback::noop(),
        }
    }

    /// Records the selection and fires `on_selected`.  Unknown ids are
    /// ignored.
    pub fn select(&mut self, device_id: &str) {
        let known = self
            .devices
            .borrow()
            .iter()
            .any(|d| d.device_id() == device_id);
        if known {
            self.selected = Some(device_id.to_string());
            self.on_selected.emit(device_id.to_string());
        }
    }

    pub fn devices(&self) -> Vec<MediaDeviceInfo> {
        self.devices.borrow().clone()
    }

    /// The selected device id, defaulting to the first device once the
    /// list has loaded.
    pub fn selected(&self) -> Option<String> {
        match &self.selected {
            Some(id) => Some(id.clone()),
            None => self
                .devices
                .borrow()
                .first()
                .map(|device| device.device_id()),
        }
    }
}

/// The audio input devices visible to the page.
///
/// Construct, set callbacks, then call [`load()`](Self::load).  Device
/// labels are only populated once the user has granted media permission.
pub struct MediaDeviceList {
    pub audio_inputs: SelectableDevices,
    /// Fired once enumeration completes.
    pub on_loaded: Callback<()>,
}

impl Default for MediaDeviceList {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaDeviceList {
    pub fn new() -> Self {
        Self {
            audio_inputs: SelectableDevices::new(),
            on_loaded: Callback::noop(),
        }
    }

    /// Starts device enumeration; returns immediately.
    pub fn load(&self) {
        let sink = self.audio_inputs.devices.clone();
        let on_loaded = self.on_loaded.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let navigator = gloo_utils::window().navigator();
            let media_devices = match navigator.media_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    error!("media devices unavailable: {e:?}");
                    return;
                }
            };
            let promise = match media_devices.enumerate_devices() {
                Ok(promise) => promise,
                Err(e) => {
                    error!("device enumeration rejected: {e:?}");
                    return;
                }
            };
            match JsFuture::from(promise).await {
                Ok(devices) => {
                    let devices = devices.unchecked_into::<Array>();
                    let inputs: Vec<MediaDeviceInfo> = devices
                        .iter()
                        .map(|d| d.unchecked_into::<MediaDeviceInfo>())
                        .filter(|d| d.kind() == MediaDeviceKind::Audioinput)
                        .collect();
                    *sink.borrow_mut() = inputs;
                    on_loaded.emit(());
                }
                Err(e) => error!("device enumeration failed: {e:?}"),
            }
        });
    }
}
