//! Sample-level suppression loop over insertable streams.
//!
//! Reads raw `AudioData` frames off the microphone track, runs the active
//! suppressor (neural denoiser, or the adaptive gate when the denoiser is
//! unavailable) over fixed 10ms blocks, and writes the processed frames
//! into a generated track.  The generated track is the only thing the rest
//! of the pipeline ever sees.

use crate::audio::denoiser::Denoiser;
use crate::audio::noise_gate::AdaptiveGate;
use crate::constants::{AUDIO_SAMPLE_RATE, DENOISE_FRAME_SIZE};
use log::{debug, error, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    AudioData, AudioDataCopyToOptions, AudioDataInit, AudioSampleFormat, MediaStream,
    MediaStreamTrack, MediaStreamTrackGenerator, MediaStreamTrackGeneratorInit,
    MediaStreamTrackProcessor, MediaStreamTrackProcessorInit, ReadableStreamDefaultReader,
};

/// The stage the pump runs per 10ms block.
pub enum Suppressor {
    Neural(Denoiser),
    Gate(AdaptiveGate),
}

impl Suppressor {
    fn process(&mut self, frame: &mut [f32; DENOISE_FRAME_SIZE]) {
        match self {
            Suppressor::Neural(denoiser) => {
                denoiser.process_frame(frame);
            }
            Suppressor::Gate(gate) => gate.process_frame(frame),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Suppressor::Neural(_) => "neural",
            Suppressor::Gate(_) => "gate",
        }
    }
}

pub struct FramePump {
    destroy: Arc<AtomicBool>,
    output_track: MediaStreamTrack,
}

impl FramePump {
    /// Starts the loop.  Returns the stream carrying the processed track.
    pub fn start(input_track: MediaStreamTrack, suppressor: Suppressor) -> Result<(MediaStream, Self), JsValue> {
        let processor =
            MediaStreamTrackProcessor::new(&MediaStreamTrackProcessorInit::new(&input_track))?;
        let reader = processor
            .readable()
            .get_reader()
            .unchecked_into::<ReadableStreamDefaultReader>();

        let generator = MediaStreamTrackGenerator::new(&MediaStreamTrackGeneratorInit::new("audio"))?;
        let output_track = generator.clone().unchecked_into::<MediaStreamTrack>();
        let output_stream = MediaStream::new()?;
        output_stream.add_track(&output_track);
        let writer = generator.writable().get_writer()?;

        let destroy = Arc::new(AtomicBool::new(false));
        debug!("starting {} suppression pump", suppressor.name());

        let loop_destroy = destroy.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let mut suppressor = suppressor;
            let mut pending: Vec<f32> = Vec::with_capacity(DENOISE_FRAME_SIZE * 4);
            let mut byte_buffer: Vec<u8> = Vec::new();
            let mut emitted_samples: u64 = 0;

            loop {
                if loop_destroy.load(Ordering::Acquire) {
                    break;
                }
                let chunk = match JsFuture::from(reader.read()).await {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        error!("suppression pump read failed: {e:?}");
                        break;
                    }
                };
                let done = js_sys::Reflect::get(&chunk, &JsValue::from_str("done"))
                    .ok()
                    .and_then(|d| d.as_bool())
                    .unwrap_or(true);
                if done {
                    break;
                }
                let Ok(value) = js_sys::Reflect::get(&chunk, &JsValue::from_str("value")) else {
                    continue;
                };
                let audio = value.unchecked_into::<AudioData>();

                // Channel 0 as f32; conversion to f32-planar is the one
                // copyTo conversion every browser guarantees.
                let options = AudioDataCopyToOptions::new(0);
                options.set_format(AudioSampleFormat::F32Planar);
                let byte_length = audio.allocation_size(&options) as usize;
                byte_buffer.resize(byte_length, 0);
                audio.copy_to_with_u8_array(&mut byte_buffer, &options);
                audio.close();

                pending.extend(
                    byte_buffer
                        .chunks_exact(4)
                        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
                );

                let mut processed: Vec<f32> = Vec::new();
                while pending.len() >= DENOISE_FRAME_SIZE {
                    let mut frame = [0.0f32; DENOISE_FRAME_SIZE];
                    frame.copy_from_slice(&pending[..DENOISE_FRAME_SIZE]);
                    pending.drain(..DENOISE_FRAME_SIZE);
                    suppressor.process(&mut frame);
                    processed.extend_from_slice(&frame);
                }
                if processed.is_empty() {
                    continue;
                }

                let timestamp_us =
                    emitted_samples as f64 * 1_000_000.0 / AUDIO_SAMPLE_RATE as f64;
                emitted_samples += processed.len() as u64;

                let data = js_sys::Float32Array::from(processed.as_slice());
                let init = AudioDataInit::new(
                    &data,
                    AudioSampleFormat::F32,
                    1,
                    processed.len() as u32,
                    AUDIO_SAMPLE_RATE as f32,
                    timestamp_us,
                );
                let frame = match AudioData::new(&init) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("failed to build processed audio frame: {e:?}");
                        continue;
                    }
                };
                if let Err(e) = JsFuture::from(writer.ready()).await {
                    error!("suppression pump writer not ready: {e:?}");
                    break;
                }
                if let Err(e) = JsFuture::from(writer.write_with_chunk(&frame)).await {
                    error!("suppression pump write failed: {e:?}");
                    break;
                }
            }
            writer.release_lock();
            debug!("suppression pump stopped");
        });

        Ok((
            output_stream,
            Self {
                destroy,
                output_track,
            },
        ))
    }

    /// Stops the loop and the generated track.
    pub fn stop(&self) {
        self.destroy.store(true, Ordering::Release);
        self.output_track.stop();
    }
}
