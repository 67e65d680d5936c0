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

#[cfg(target_arch = "wasm32")]
mod device_list;
#[cfg(target_arch = "wasm32")]
mod microphone;
mod screen;

#[cfg(target_arch = "wasm32")]
pub use device_list::{MediaDeviceList, SelectableDevices};
#[cfg(target_arch = "wasm32")]
pub use microphone::acquire_microphone;
#[cfg(target_arch = "wasm32")]
pub use screen::capture_display;
pub use screen::SharePreset;

/// Stops every track of a stream, releasing the underlying device.
#[cfg(target_arch = "wasm32")]
pub fn stop_all_tracks(stream: &web_sys::MediaStream) {
    use wasm_bindgen::JsCast;
    for track in stream.get_tracks().iter() {
        track.unchecked_into::<web_sys::MediaStreamTrack>().stop();
    }
}
