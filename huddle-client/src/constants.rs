//! Product-tuning defaults.  Everything here is a default, not a contract:
//! detector thresholds, gate behavior and share presets are overridable
//! through the respective config structs.

pub const AUDIO_SAMPLE_RATE: u32 = 48000u32;
pub const AUDIO_CHANNELS: u32 = 1u32;

/// Outbound voice sender tuning: bounded bitrate, high transport priority.
pub const VOICE_MAX_BITRATE: u32 = 128_000;

/// RNNoise operates on fixed 10ms frames at 48kHz.
pub const DENOISE_FRAME_SIZE: usize = 480;

// Voice activity detection.
pub const VAD_FFT_SIZE: u32 = 256;
/// Average byte-frequency magnitude (0-255) above which a frame counts as speech.
pub const VAD_THRESHOLD_GROUP: f32 = 12.0;
/// 1:1 calls run slightly more sensitive; two-party audio is quieter.
pub const VAD_THRESHOLD_DIRECT: f32 = 10.0;
/// Minimum interval between presence broadcasts of speaking state, in ms.
pub const VAD_BROADCAST_INTERVAL_MS: f64 = 150.0;

// Adaptive noise gate (denoiser fallback).
pub const GATE_FLOOR_RISE_PER_FRAME: f32 = 1.02;
pub const GATE_OPEN_FACTOR: f32 = 2.5;
pub const GATE_ATTACK: f32 = 0.35;
pub const GATE_RELEASE: f32 = 0.06;
/// Frames (10ms each) the gate stays open after the signal drops.
pub const GATE_HOLD_FRAMES: u32 = 8;
/// The gate never fully mutes; this keeps the room tone alive.
pub const GATE_MIN_GAIN: f32 = 0.12;

// Connection recovery.
/// How long a link may sit in `disconnected` before an ICE restart, in ms.
pub const DISCONNECT_GRACE_MS: u32 = 5_000;
/// ICE restarts attempted per failure episode.
pub const ICE_RESTART_BUDGET: u8 = 1;

// Presence.
pub const PRESENCE_REPUBLISH_INTERVAL_MS: u32 = 15_000;
pub const HEARTBEAT_INTERVAL_MS: u32 = 30_000;
/// Idle time before the local user is published as away, in ms.
pub const AWAY_AFTER_IDLE_MS: f64 = 300_000.0;
