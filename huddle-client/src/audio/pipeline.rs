//! The microphone processing chain.
//!
//! Built once per microphone acquisition: suppressor stage (neural, with
//! the adaptive gate as fallback) feeding a fixed filter bank, a voice
//! compressor and an output gain.  Peers are only ever handed the
//! synthetic output stream.  Construction never fails outward; every
//! stage that cannot come up degrades the chain one step, down to the
//! raw stream untouched.
//!
//! Mode changes retune the live filter and compressor parameters without
//! rebuilding.  Changing the input device or toggling suppression rebuilds
//! the whole chain against a freshly acquired microphone; that is the
//! owner's job, via teardown + build.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionMode {
    #[default]
    Standard,
    Aggressive,
}

/// Explicitly injected pipeline configuration; persisted on the device,
/// never read ambiently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoisePipelineConfig {
    pub mode: SuppressionMode,
    pub suppression: bool,
    pub echo_cancel: bool,
    pub auto_gain: bool,
    pub input_device: Option<String>,
}

impl Default for NoisePipelineConfig {
    fn default() -> Self {
        Self {
            mode: SuppressionMode::Standard,
            suppression: true,
            echo_cancel: true,
            auto_gain: true,
            input_device: None,
        }
    }
}

const STORAGE_KEY: &str = "huddle.noise-pipeline";

#[cfg(target_arch = "wasm32")]
impl NoisePipelineConfig {
    /// Reads the persisted config, falling back to defaults on anything
    /// missing or unreadable.
    pub fn load() -> Self {
        gloo_utils::window()
            .local_storage()
            .ok()
            .flatten()
            .and_then(|storage| storage.get_item(STORAGE_KEY).ok().flatten())
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    /// Persists the config so it survives page reloads.
    pub fn store(&self) {
        if let Some(storage) = gloo_utils::window().local_storage().ok().flatten() {
            if let Ok(text) = serde_json::to_string(self) {
                let _ = storage.set_item(STORAGE_KEY, &text);
            }
        }
    }
}

/// Filter bank and compressor targets for one suppression mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChainParams {
    pub highpass_hz: f32,
    pub peaking_hz: f32,
    pub peaking_gain_db: f32,
    pub shelf_hz: f32,
    pub shelf_gain_db: f32,
    pub lowpass_hz: f32,
    pub compressor_threshold_db: f32,
    pub compressor_ratio: f32,
    pub compressor_attack_s: f32,
    pub compressor_release_s: f32,
    pub output_gain: f32,
}

/// The bank is fixed in shape; modes only shift its parameters.  High-pass
/// removes rumble, the 200Hz cut reduces mud, the shelf restores vocal
/// presence, the low-pass takes off residual hiss.
pub fn chain_params(mode: SuppressionMode) -> ChainParams {
    match mode {
        SuppressionMode::Standard => ChainParams {
            highpass_hz: 85.0,
            peaking_hz: 200.0,
            peaking_gain_db: -3.0,
            shelf_hz: 3000.0,
            shelf_gain_db: 2.0,
            lowpass_hz: 14000.0,
            compressor_threshold_db: -28.0,
            compressor_ratio: 4.0,
            compressor_attack_s: 0.015,
            compressor_release_s: 0.25,
            output_gain: 1.0,
        },
        SuppressionMode::Aggressive => ChainParams {
            highpass_hz: 100.0,
            peaking_hz: 200.0,
            peaking_gain_db: -5.0,
            shelf_hz: 3200.0,
            shelf_gain_db: 3.0,
            lowpass_hz: 12000.0,
            compressor_threshold_db: -32.0,
            compressor_ratio: 6.0,
            compressor_attack_s: 0.01,
            compressor_release_s: 0.3,
            output_gain: 1.0,
        },
    }
}

#[cfg(target_arch = "wasm32")]
pub use graph::NoisePipeline;

#[cfg(target_arch = "wasm32")]
mod graph {
    use super::{chain_params, NoisePipelineConfig, SuppressionMode};
    use crate::audio::denoiser::Denoiser;
    use crate::audio::frame_pump::{FramePump, Suppressor};
    use crate::audio::noise_gate::{AdaptiveGate, GateTuning};
    use crate::constants::AUDIO_SAMPLE_RATE;
    use crate::media::stop_all_tracks;
    use log::warn;
    use wasm_bindgen::{JsCast, JsValue};
    use web_sys::{
        AudioContext, AudioContextOptions, BiquadFilterNode, BiquadFilterType,
        DynamicsCompressorNode, GainNode, MediaStream, MediaStreamTrack,
    };

    struct FilterChain {
        highpass: BiquadFilterNode,
        peaking: BiquadFilterNode,
        shelf: BiquadFilterNode,
        lowpass: BiquadFilterNode,
        compressor: DynamicsCompressorNode,
        gain: GainNode,
    }

    impl FilterChain {
        fn apply(&self, mode: SuppressionMode) {
            let p = chain_params(mode);
            self.highpass.frequency().set_value(p.highpass_hz);
            self.peaking.frequency().set_value(p.peaking_hz);
            self.peaking.gain().set_value(p.peaking_gain_db);
            self.shelf.frequency().set_value(p.shelf_hz);
            self.shelf.gain().set_value(p.shelf_gain_db);
            self.lowpass.frequency().set_value(p.lowpass_hz);
            self.compressor
                .threshold()
                .set_value(p.compressor_threshold_db);
            self.compressor.ratio().set_value(p.compressor_ratio);
            self.compressor.attack().set_value(p.compressor_attack_s);
            self.compressor.release().set_value(p.compressor_release_s);
            self.gain.gain().set_value(p.output_gain);
        }
    }

    pub struct NoisePipeline {
        config: NoisePipelineConfig,
        raw: MediaStream,
        processed: MediaStream,
        context: Option<AudioContext>,
        chain: Option<FilterChain>,
        pump: Option<FramePump>,
        stage: &'static str,
    }

    impl NoisePipeline {
        /// Builds the chain over an acquired microphone stream.  Never
        /// fails: each stage that cannot come up is skipped, worst case
        /// the raw stream passes through untouched.
        pub fn build(raw: MediaStream, config: NoisePipelineConfig) -> Self {
            if !config.suppression {
                return Self::passthrough(raw, config);
            }

            let input_track = raw.get_audio_tracks().get(0);
            if input_track.is_undefined() {
                warn!("microphone stream has no audio track; passing through");
                return Self::passthrough(raw, config);
            }
            let input_track = input_track.unchecked_into::<MediaStreamTrack>();

            let suppressor = match Denoiser::try_new() {
                Ok(denoiser) => Suppressor::Neural(denoiser),
                Err(e) => {
                    warn!("denoiser unavailable ({e}); falling back to adaptive gate");
                    Suppressor::Gate(AdaptiveGate::new(GateTuning::default()))
                }
            };
            let stage = suppressor.name();

            let (suppressed, pump) = match FramePump::start(input_track, suppressor) {
                Ok(started) => started,
                Err(e) => {
                    warn!("suppression pump failed to start ({e:?}); passing through");
                    return Self::passthrough(raw, config);
                }
            };

            match Self::build_graph(&suppressed, config.mode) {
                Ok((context, chain, shaped)) => Self {
                    config,
                    raw,
                    processed: shaped,
                    context: Some(context),
                    chain: Some(chain),
                    pump: Some(pump),
                    stage,
                },
                Err(e) => {
                    warn!("filter graph failed to build ({e:?}); using suppressed stream");
                    Self {
                        config,
                        raw,
                        processed: suppressed,
                        context: None,
                        chain: None,
                        pump: Some(pump),
                        stage,
                    }
                }
            }
        }

        fn passthrough(raw: MediaStream, config: NoisePipelineConfig) -> Self {
            let processed = raw.clone();
            Self {
                config,
                raw,
                processed,
                context: None,
                chain: None,
                pump: None,
                stage: "passthrough",
            }
        }

        fn build_graph(
            input: &MediaStream,
            mode: SuppressionMode,
        ) -> Result<(AudioContext, FilterChain, MediaStream), JsValue> {
            let options = AudioContextOptions::new();
            options.set_sample_rate(AUDIO_SAMPLE_RATE as f32);
            let context = AudioContext::new_with_context_options(&options)?;

            let source = context.create_media_stream_source(input)?;
            let highpass = context.create_biquad_filter()?;
            highpass.set_type(BiquadFilterType::Highpass);
            let peaking = context.create_biquad_filter()?;
            peaking.set_type(BiquadFilterType::Peaking);
            peaking.q().set_value(1.0);
            let shelf = context.create_biquad_filter()?;
            shelf.set_type(BiquadFilterType::Highshelf);
            let lowpass = context.create_biquad_filter()?;
            lowpass.set_type(BiquadFilterType::Lowpass);
            let compressor = context.create_dynamics_compressor()?;
            let gain = context.create_gain()?;
            let destination = context.create_media_stream_destination()?;

            source.connect_with_audio_node(&highpass)?;
            highpass.connect_with_audio_node(&peaking)?;
            peaking.connect_with_audio_node(&shelf)?;
            shelf.connect_with_audio_node(&lowpass)?;
            lowpass.connect_with_audio_node(&compressor)?;
            compressor.connect_with_audio_node(&gain)?;
            gain.connect_with_audio_node(&destination)?;

            let chain = FilterChain {
                highpass,
                peaking,
                shelf,
                lowpass,
                compressor,
                gain,
            };
            chain.apply(mode);

            Ok((context, chain, destination.stream()))
        }

        /// The stream to attach to peer connections.
        pub fn output_stream(&self) -> &MediaStream {
            &self.processed
        }

        pub fn raw_stream(&self) -> &MediaStream {
            &self.raw
        }

        pub fn config(&self) -> &NoisePipelineConfig {
            &self.config
        }

        /// Which suppressor actually came up: "neural", "gate" or
        /// "passthrough".
        pub fn stage(&self) -> &'static str {
            self.stage
        }

        /// Live retune; no graph rebuild.
        pub fn set_mode(&mut self, mode: SuppressionMode) {
            self.config.mode = mode;
            if let Some(chain) = self.chain.as_ref() {
                chain.apply(mode);
            }
        }

        /// Stops the pump, every track (raw and processed) and the graph
        /// context.  After this the microphone is released.
        pub fn teardown(&self) {
            if let Some(pump) = self.pump.as_ref() {
                pump.stop();
            }
            stop_all_tracks(&self.processed);
            stop_all_tracks(&self.raw);
            if let Some(context) = self.context.as_ref() {
                if let Err(e) = context.close() {
                    warn!("failed to close pipeline context: {e:?}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_json() {
        let config = NoisePipelineConfig {
            mode: SuppressionMode::Aggressive,
            suppression: true,
            echo_cancel: false,
            auto_gain: true,
            input_device: Some("mic-7".to_string()),
        };
        let text = serde_json::to_string(&config).unwrap();
        let back: NoisePipelineConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn default_config_enables_suppression() {
        let config = NoisePipelineConfig::default();
        assert!(config.suppression);
        assert_eq!(config.mode, SuppressionMode::Standard);
        assert_eq!(config.input_device, None);
    }

    #[test]
    fn aggressive_mode_shifts_the_bank() {
        let standard = chain_params(SuppressionMode::Standard);
        let aggressive = chain_params(SuppressionMode::Aggressive);
        assert!(aggressive.highpass_hz > standard.highpass_hz);
        assert!(aggressive.peaking_gain_db < standard.peaking_gain_db);
        assert!(aggressive.lowpass_hz < standard.lowpass_hz);
        assert!(aggressive.compressor_ratio > standard.compressor_ratio);
    }

    #[test]
    fn lowpass_stays_inside_the_hiss_band() {
        for mode in [SuppressionMode::Standard, SuppressionMode::Aggressive] {
            let p = chain_params(mode);
            assert!((12_000.0..=14_000.0).contains(&p.lowpass_hz));
        }
    }
}
