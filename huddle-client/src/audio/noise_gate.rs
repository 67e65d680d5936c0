//! Adaptive noise gate, the fallback when the neural denoiser is
//! unavailable.
//!
//! The gate estimates the noise floor from the running signal: the
//! estimate falls instantly to any quieter frame and creeps upward
//! otherwise, so a burst of speech cannot drag the floor up but a changed
//! room tone is absorbed within seconds.  Gain moves with separate
//! attack/release smoothing and a hold keeps the gate open across the
//! short gaps between words.  The closed gain never reaches zero; hard
//! muting makes speech onsets sound clipped and robotic.

use crate::constants::{
    GATE_ATTACK, GATE_FLOOR_RISE_PER_FRAME, GATE_HOLD_FRAMES, GATE_MIN_GAIN, GATE_OPEN_FACTOR,
    GATE_RELEASE,
};

#[derive(Clone, Copy, Debug)]
pub struct GateTuning {
    /// Multiplicative floor rise per frame while signal exceeds the floor.
    pub floor_rise: f32,
    /// Signal must exceed `floor * open_factor` to open the gate.
    pub open_factor: f32,
    /// Smoothing coefficient while opening (fast).
    pub attack: f32,
    /// Smoothing coefficient while closing (slow).
    pub release: f32,
    /// Frames the gate stays open after the signal drops.
    pub hold_frames: u32,
    /// Closed gain; never zero.
    pub min_gain: f32,
}

impl Default for GateTuning {
    fn default() -> Self {
        Self {
            floor_rise: GATE_FLOOR_RISE_PER_FRAME,
            open_factor: GATE_OPEN_FACTOR,
            attack: GATE_ATTACK,
            release: GATE_RELEASE,
            hold_frames: GATE_HOLD_FRAMES,
            min_gain: GATE_MIN_GAIN,
        }
    }
}

#[derive(Debug)]
pub struct AdaptiveGate {
    tuning: GateTuning,
    floor: f32,
    gain: f32,
    hold_left: u32,
}

impl AdaptiveGate {
    pub fn new(tuning: GateTuning) -> Self {
        Self {
            tuning,
            floor: 1e-4,
            gain: 1.0,
            hold_left: 0,
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Processes one frame of samples in place.
    pub fn process_frame(&mut self, samples: &mut [f32]) {
        if samples.is_empty() {
            return;
        }
        let rms = rms(samples);

        if rms < self.floor {
            self.floor = rms.max(1e-6);
        } else {
            self.floor = (self.floor * self.tuning.floor_rise).max(1e-6);
        }

        let open = rms > self.floor * self.tuning.open_factor;
        let target = if open {
            self.hold_left = self.tuning.hold_frames;
            1.0
        } else if self.hold_left > 0 {
            self.hold_left -= 1;
            1.0
        } else {
            self.tuning.min_gain
        };

        let coefficient = if target > self.gain {
            self.tuning.attack
        } else {
            self.tuning.release
        };
        self.gain += (target - self.gain) * coefficient;

        for sample in samples.iter_mut() {
            *sample *= self.gain;
        }
    }
}

fn rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_frame() -> Vec<f32> {
        vec![0.001; 480]
    }

    fn loud_frame() -> Vec<f32> {
        (0..480)
            .map(|i| 0.5 * (i as f32 * 0.13).sin())
            .collect()
    }

    fn run_frames(gate: &mut AdaptiveGate, frame: Vec<f32>, count: usize) -> f32 {
        for _ in 0..count {
            let mut copy = frame.clone();
            gate.process_frame(&mut copy);
        }
        gate.gain()
    }

    #[test]
    fn sustained_quiet_settles_at_the_minimum_gain_not_zero() {
        let mut gate = AdaptiveGate::new(GateTuning::default());
        let gain = run_frames(&mut gate, quiet_frame(), 200);
        assert!(gain <= GATE_MIN_GAIN + 0.05, "gain {gain} did not close");
        assert!(gain >= GATE_MIN_GAIN - 0.01, "gain {gain} fell below the floor");
    }

    #[test]
    fn speech_over_a_settled_floor_opens_the_gate() {
        let mut gate = AdaptiveGate::new(GateTuning::default());
        run_frames(&mut gate, quiet_frame(), 200);
        let gain = run_frames(&mut gate, loud_frame(), 30);
        assert!(gain > 0.9, "gain {gain} did not open for speech");
    }

    #[test]
    fn hold_bridges_short_gaps_between_words() {
        let mut gate = AdaptiveGate::new(GateTuning::default());
        run_frames(&mut gate, quiet_frame(), 200);
        run_frames(&mut gate, loud_frame(), 30);

        // A few quiet frames inside the hold window: still open.
        let mut frame = quiet_frame();
        for _ in 0..3 {
            gate.process_frame(&mut frame);
        }
        assert!(gate.gain() > 0.85, "gate closed inside the hold window");
    }

    #[test]
    fn gate_attenuates_quiet_frames_in_place() {
        let mut gate = AdaptiveGate::new(GateTuning::default());
        run_frames(&mut gate, quiet_frame(), 200);
        let mut frame = vec![0.001f32; 480];
        gate.process_frame(&mut frame);
        assert!(frame.iter().all(|s| s.abs() < 0.001));
    }

    #[test]
    fn floor_creeps_up_under_sustained_noise() {
        let mut gate = AdaptiveGate::new(GateTuning::default());
        // Constant mid-level noise: after enough frames the floor has risen
        // to meet it and the gate closes on it.
        let noise: Vec<f32> = (0..480).map(|i| 0.05 * (i as f32 * 0.41).sin()).collect();
        let mut frame = noise.clone();
        for _ in 0..600 {
            frame.copy_from_slice(&noise);
            gate.process_frame(&mut frame);
        }
        assert!(gate.gain() < 0.5, "gate failed to adapt to steady noise");
    }
}
