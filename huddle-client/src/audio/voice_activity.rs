//! Speaking detection over a frequency-domain tap of an audio stream.
//!
//! The analysis loop is frame-synced to the display refresh; every frame
//! the average spectrum magnitude is scored against a threshold.  The
//! score feeds local UI directly, while presence broadcasts are gated to
//! state changes plus a minimum interval so signaling traffic stays
//! bounded no matter how fast the compositor runs.

use crate::constants::{
    VAD_BROADCAST_INTERVAL_MS, VAD_THRESHOLD_DIRECT, VAD_THRESHOLD_GROUP,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VadTuning {
    /// Average magnitude (0-255 scale) above which a frame is speech.
    pub threshold: f32,
    /// Floor between presence broadcasts, in milliseconds.
    pub broadcast_interval_ms: f64,
}

impl VadTuning {
    pub fn group() -> Self {
        Self {
            threshold: VAD_THRESHOLD_GROUP,
            broadcast_interval_ms: VAD_BROADCAST_INTERVAL_MS,
        }
    }

    pub fn direct() -> Self {
        Self {
            threshold: VAD_THRESHOLD_DIRECT,
            broadcast_interval_ms: VAD_BROADCAST_INTERVAL_MS,
        }
    }
}

/// One frame's worth of detector output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeakingSample {
    pub speaking: bool,
    /// Normalized level, 0.0..=1.0, for meters.
    pub level: f32,
    /// True when this sample is worth a presence broadcast: the speaking
    /// state flipped, or the minimum interval elapsed.
    pub should_broadcast: bool,
}

#[derive(Debug)]
pub struct SpeakingScore {
    tuning: VadTuning,
    speaking: bool,
    last_broadcast_ms: Option<f64>,
}

impl SpeakingScore {
    pub fn new(tuning: VadTuning) -> Self {
        Self {
            tuning,
            speaking: false,
            last_broadcast_ms: None,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Scores one frame of byte-frequency bins at wall-clock `now_ms`.
    pub fn ingest(&mut self, bins: &[u8], now_ms: f64) -> SpeakingSample {
        let average = if bins.is_empty() {
            0.0
        } else {
            bins.iter().map(|&b| b as f32).sum::<f32>() / bins.len() as f32
        };
        let speaking = average > self.tuning.threshold;
        let level = (average / 255.0).clamp(0.0, 1.0);

        let state_changed = speaking != self.speaking;
        let interval_elapsed = match self.last_broadcast_ms {
            Some(last) => now_ms - last >= self.tuning.broadcast_interval_ms,
            None => true,
        };
        let should_broadcast = state_changed || interval_elapsed;
        if should_broadcast {
            self.last_broadcast_ms = Some(now_ms);
        }
        self.speaking = speaking;

        SpeakingSample {
            speaking,
            level,
            should_broadcast,
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use detector::VoiceActivityDetector;

#[cfg(target_arch = "wasm32")]
mod detector {
    use super::{SpeakingSample, SpeakingScore, VadTuning};
    use crate::constants::VAD_FFT_SIZE;
    use gloo_utils::window;
    use huddle_types::Callback;
    use log::{error, warn};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use wasm_bindgen::prelude::Closure;
    use wasm_bindgen::{JsCast, JsValue};
    use web_sys::{AnalyserNode, AudioContext, MediaStream};
    use web_time::Instant;

    /// Continuous analysis loop over one stream.
    ///
    /// Owns a private tap context and an animation-frame loop; [`stop`]
    /// cancels both, and must be called when the owning stream is torn
    /// down so no detection loop outlives its call.
    ///
    /// [`stop`]: VoiceActivityDetector::stop
    pub struct VoiceActivityDetector {
        context: AudioContext,
        stopped: Rc<Cell<bool>>,
        animation_id: Rc<Cell<Option<i32>>>,
        frame: Rc<RefCell<Option<Closure<dyn FnMut()>>>>,
    }

    impl VoiceActivityDetector {
        pub fn start(
            stream: &MediaStream,
            tuning: VadTuning,
            on_sample: Callback<SpeakingSample>,
        ) -> Result<Self, JsValue> {
            let context = AudioContext::new()?;
            let analyser: AnalyserNode = context.create_analyser()?;
            analyser.set_fft_size(VAD_FFT_SIZE);
            let source = context.create_media_stream_source(stream)?;
            source.connect_with_audio_node(&analyser)?;

            let stopped = Rc::new(Cell::new(false));
            let animation_id = Rc::new(Cell::new(None));
            let frame: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));

            let mut score = SpeakingScore::new(tuning);
            let mut bins = vec![0u8; analyser.frequency_bin_count() as usize];
            // Monotonic clock for the broadcast interval; wall clock can
            // jump backwards.
            let started = Instant::now();
            let loop_stopped = stopped.clone();
            let loop_id = animation_id.clone();
            let loop_frame = frame.clone();
            *frame.borrow_mut() = Some(Closure::wrap(Box::new(move || {
                if loop_stopped.get() {
                    return;
                }
                analyser.get_byte_frequency_data(&mut bins);
                let now_ms = started.elapsed().as_secs_f64() * 1000.0;
                let sample = score.ingest(&bins, now_ms);
                on_sample.emit(sample);

                let next = loop_frame.borrow();
                if let Some(closure) = next.as_ref() {
                    match window().request_animation_frame(closure.as_ref().unchecked_ref()) {
                        Ok(id) => loop_id.set(Some(id)),
                        Err(e) => error!("failed to schedule analysis frame: {e:?}"),
                    }
                }
            }) as Box<dyn FnMut()>));

            {
                let kickoff = frame.borrow();
                let closure = kickoff.as_ref().ok_or_else(|| JsValue::from_str("no frame"))?;
                let id = window().request_animation_frame(closure.as_ref().unchecked_ref())?;
                animation_id.set(Some(id));
            }

            Ok(Self {
                context,
                stopped,
                animation_id,
                frame,
            })
        }

        /// Cancels the analysis loop and releases the tap context.
        pub fn stop(&self) {
            self.stopped.set(true);
            if let Some(id) = self.animation_id.take() {
                if let Err(e) = window().cancel_animation_frame(id) {
                    warn!("failed to cancel analysis frame: {e:?}");
                }
            }
            // Break the closure's self-reference so it can drop.
            self.frame.borrow_mut().take();
            if let Err(e) = self.context.close() {
                warn!("failed to close analyser context: {e:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_splits_speech_from_silence() {
        let mut score = SpeakingScore::new(VadTuning::group());
        let silence = vec![2u8; 128];
        let speech = vec![80u8; 128];

        assert!(!score.ingest(&silence, 0.0).speaking);
        let sample = score.ingest(&speech, 10.0);
        assert!(sample.speaking);
        assert!(sample.level > 0.2);
    }

    #[test]
    fn state_change_always_broadcasts() {
        let mut score = SpeakingScore::new(VadTuning::group());
        let silence = vec![0u8; 128];
        let speech = vec![80u8; 128];

        score.ingest(&silence, 0.0);
        // Within the interval, but the state flipped.
        let sample = score.ingest(&speech, 20.0);
        assert!(sample.should_broadcast);
    }

    #[test]
    fn steady_state_broadcasts_at_the_interval_floor() {
        let mut score = SpeakingScore::new(VadTuning::group());
        let speech = vec![80u8; 128];

        assert!(score.ingest(&speech, 0.0).should_broadcast);
        // 60fps frames well inside the interval: suppressed.
        assert!(!score.ingest(&speech, 16.0).should_broadcast);
        assert!(!score.ingest(&speech, 33.0).should_broadcast);
        // Interval elapsed: republished.
        assert!(score.ingest(&speech, 160.0).should_broadcast);
    }

    #[test]
    fn direct_calls_are_more_sensitive_than_group_rooms() {
        assert!(VadTuning::direct().threshold < VadTuning::group().threshold);
    }

    #[test]
    fn empty_bins_score_as_silence() {
        let mut score = SpeakingScore::new(VadTuning::group());
        let sample = score.ingest(&[], 0.0);
        assert!(!sample.speaking);
        assert_eq!(sample.level, 0.0);
    }
}
