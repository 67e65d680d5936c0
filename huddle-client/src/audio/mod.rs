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

mod denoiser;
#[cfg(target_arch = "wasm32")]
mod frame_pump;
mod noise_gate;
mod pipeline;
mod voice_activity;
#[cfg(target_arch = "wasm32")]
mod voice_session;

pub use denoiser::{Denoiser, DenoiserUnavailable};
#[cfg(target_arch = "wasm32")]
pub use frame_pump::{FramePump, Suppressor};
pub use noise_gate::{AdaptiveGate, GateTuning};
#[cfg(target_arch = "wasm32")]
pub use pipeline::NoisePipeline;
pub use pipeline::{chain_params, ChainParams, NoisePipelineConfig, SuppressionMode};
pub use voice_activity::{SpeakingSample, SpeakingScore, VadTuning};
#[cfg(target_arch = "wasm32")]
pub use voice_activity::VoiceActivityDetector;
#[cfg(target_arch = "wasm32")]
pub use voice_session::VoiceSession;
