//! Microphone acquisition.
//!
//! Every constraint is an *ideal* hint, never a hard requirement: an exact
//! constraint a device cannot satisfy rejects the whole request, and a
//! join that fails because a microphone reports 44.1kHz helps no one.

use crate::audio::NoisePipelineConfig;
use crate::constants::{AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};
use gloo_utils::window;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{MediaStream, MediaStreamConstraints, MediaTrackConstraints};

/// Wraps a value as `{ideal: value}`.
fn ideal(value: &JsValue) -> JsValue {
    let hint = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&hint, &JsValue::from_str("ideal"), value);
    hint.into()
}

/// Requests the microphone described by the pipeline config.
///
/// The browser's own noise suppression is hinted off while our pipeline is
/// active; stacking two suppressors chews up speech.
pub async fn acquire_microphone(config: &NoisePipelineConfig) -> Result<MediaStream, JsValue> {
    let navigator = window().navigator();
    let media_devices = navigator.media_devices()?;

    let audio = MediaTrackConstraints::new();
    if let Some(device_id) = config.input_device.as_ref() {
        audio.set_device_id(&ideal(&JsValue::from_str(device_id)));
    }
    audio.set_echo_cancellation(&ideal(&JsValue::from_bool(config.echo_cancel)));
    audio.set_auto_gain_control(&ideal(&JsValue::from_bool(config.auto_gain)));
    audio.set_noise_suppression(&ideal(&JsValue::from_bool(!config.suppression)));
    audio.set_sample_rate(&ideal(&JsValue::from_f64(AUDIO_SAMPLE_RATE as f64)));
    audio.set_sample_size(&ideal(&JsValue::from_f64(16.0)));
    audio.set_channel_count(&ideal(&JsValue::from_f64(AUDIO_CHANNELS as f64)));

    let constraints = MediaStreamConstraints::new();
    constraints.set_audio(&audio.into());
    constraints.set_video(&JsValue::FALSE);

    let promise = media_devices.get_user_media_with_constraints(&constraints)?;
    let stream = JsFuture::from(promise).await?;
    Ok(stream.unchecked_into::<MediaStream>())
}
