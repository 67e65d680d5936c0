//! Display capture with operator-selectable quality.

use serde::{Deserialize, Serialize};

/// Resolution and frame-rate presets a sharer picks before capture begins.
/// The choice is passed as capture constraints; changing quality means
/// stopping and restarting the share.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharePreset {
    /// 1280x720 at 15fps, the bandwidth-friendly default.
    #[default]
    Hd15,
    /// 1920x1080 at 15fps.
    FullHd15,
    /// 1920x1080 at 30fps, for motion-heavy content.
    FullHd30,
}

impl SharePreset {
    pub fn width(&self) -> u32 {
        match self {
            SharePreset::Hd15 => 1280,
            SharePreset::FullHd15 | SharePreset::FullHd30 => 1920,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            SharePreset::Hd15 => 720,
            SharePreset::FullHd15 | SharePreset::FullHd30 => 1080,
        }
    }

    pub fn frame_rate(&self) -> u32 {
        match self {
            SharePreset::Hd15 | SharePreset::FullHd15 => 15,
            SharePreset::FullHd30 => 30,
        }
    }

    pub fn all() -> [SharePreset; 3] {
        [SharePreset::Hd15, SharePreset::FullHd15, SharePreset::FullHd30]
    }
}

/// Prompts for a screen/window and captures it at the preset quality.
#[cfg(target_arch = "wasm32")]
pub async fn capture_display(preset: SharePreset) -> Result<web_sys::MediaStream, wasm_bindgen::JsValue> {
    use gloo_utils::window;
    use wasm_bindgen::{JsCast, JsValue};
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{DisplayMediaStreamConstraints, MediaTrackConstraints};

    let navigator = window().navigator();
    let media_devices = navigator.media_devices()?;

    let video = MediaTrackConstraints::new();
    video.set_width(&JsValue::from_f64(preset.width() as f64));
    video.set_height(&JsValue::from_f64(preset.height() as f64));
    video.set_frame_rate(&JsValue::from_f64(preset.frame_rate() as f64));

    let constraints = DisplayMediaStreamConstraints::new();
    constraints.set_video(&video.into());

    let promise = media_devices.get_display_media_with_constraints(&constraints)?;
    let stream = JsFuture::from(promise).await?;
    Ok(stream.unchecked_into::<web_sys::MediaStream>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_cover_distinct_quality_points() {
        let mut seen = std::collections::HashSet::new();
        for preset in SharePreset::all() {
            seen.insert((preset.width(), preset.height(), preset.frame_rate()));
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn default_preset_is_the_bandwidth_friendly_one() {
        assert_eq!(SharePreset::default(), SharePreset::Hd15);
        assert_eq!(SharePreset::default().frame_rate(), 15);
    }

    #[test]
    fn preset_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SharePreset::FullHd30).unwrap(),
            "\"full_hd30\""
        );
    }
}
