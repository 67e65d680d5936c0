//! One microphone tenancy: pipeline plus speaking detector.
//!
//! The microphone is exclusively owned; starting a new session while one
//! is live must tear the old one down first, or the device stays locked.
//! Teardown is total: detector loop cancelled, pump stopped, every raw and
//! processed track stopped.

use crate::audio::pipeline::{NoisePipeline, NoisePipelineConfig, SuppressionMode};
use crate::audio::voice_activity::{SpeakingSample, VadTuning, VoiceActivityDetector};
use crate::media::acquire_microphone;
use huddle_types::Callback;
use log::warn;
use std::cell::{Cell, RefCell};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{MediaStream, MediaStreamTrack};

pub struct VoiceSession {
    pipeline: RefCell<NoisePipeline>,
    detector: Option<VoiceActivityDetector>,
    muted: Cell<bool>,
}

impl VoiceSession {
    /// Acquires the microphone and builds the processing chain plus the
    /// speaking detector.  Only acquisition itself can fail; pipeline
    /// construction degrades instead.
    pub async fn start(
        config: NoisePipelineConfig,
        tuning: VadTuning,
        on_sample: Callback<SpeakingSample>,
    ) -> Result<Self, JsValue> {
        let raw = acquire_microphone(&config).await?;
        let pipeline = NoisePipeline::build(raw, config);

        let detector =
            match VoiceActivityDetector::start(pipeline.output_stream(), tuning, on_sample) {
                Ok(detector) => Some(detector),
                Err(e) => {
                    warn!("voice activity detector failed to start: {e:?}");
                    None
                }
            };

        Ok(Self {
            pipeline: RefCell::new(pipeline),
            detector,
            muted: Cell::new(false),
        })
    }

    /// The processed stream to attach to peer connections.
    pub fn stream(&self) -> MediaStream {
        self.pipeline.borrow().output_stream().clone()
    }

    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    /// Mute toggles the track's enabled flag; the track keeps running so
    /// unmute is instant.
    pub fn set_muted(&self, muted: bool) {
        self.muted.set(muted);
        let pipeline = self.pipeline.borrow();
        for stream in [pipeline.output_stream(), pipeline.raw_stream()] {
            for track in stream.get_audio_tracks().iter() {
                track
                    .unchecked_into::<MediaStreamTrack>()
                    .set_enabled(!muted);
            }
        }
    }

    /// Live retune of the filter bank and compressor.
    pub fn set_mode(&self, mode: SuppressionMode) {
        self.pipeline.borrow_mut().set_mode(mode);
    }

    pub fn config(&self) -> NoisePipelineConfig {
        self.pipeline.borrow().config().clone()
    }

    /// Releases the microphone and stops every loop this session started.
    pub fn teardown(&self) {
        if let Some(detector) = self.detector.as_ref() {
            detector.stop();
        }
        self.pipeline.borrow().teardown();
    }
}
