//! Neural denoise stage: an RNNoise model separating voice from background
//! noise on fixed 10ms frames at 48kHz.

use crate::constants::DENOISE_FRAME_SIZE;
use nnnoiseless::DenoiseState;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenoiserUnavailable;

impl fmt::Display for DenoiserUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "neural denoiser unavailable")
    }
}

impl std::error::Error for DenoiserUnavailable {}

pub struct Denoiser {
    state: Box<DenoiseState<'static>>,
    scaled_in: [f32; DENOISE_FRAME_SIZE],
    scaled_out: [f32; DENOISE_FRAME_SIZE],
}

impl Denoiser {
    pub fn try_new() -> Result<Self, DenoiserUnavailable> {
        if DenoiseState::FRAME_SIZE != DENOISE_FRAME_SIZE {
            return Err(DenoiserUnavailable);
        }
        Ok(Self {
            state: DenoiseState::new(),
            scaled_in: [0.0; DENOISE_FRAME_SIZE],
            scaled_out: [0.0; DENOISE_FRAME_SIZE],
        })
    }

    /// Denoises one frame of unit-range samples in place.  Returns the
    /// model's voice probability for the frame.
    ///
    /// The model works in 16-bit sample range, so unit-range input is
    /// scaled up on the way in and back down (clamped) on the way out.
    pub fn process_frame(&mut self, samples: &mut [f32; DENOISE_FRAME_SIZE]) -> f32 {
        for (scaled, sample) in self.scaled_in.iter_mut().zip(samples.iter()) {
            *scaled = sample * i16::MAX as f32;
        }
        let voice_probability = self
            .state
            .process_frame(&mut self.scaled_out, &self.scaled_in);
        for (sample, scaled) in samples.iter_mut().zip(self.scaled_out.iter()) {
            *sample = (scaled / i16::MAX as f32).clamp(-1.0, 1.0);
        }
        voice_probability
    }
}

impl fmt::Debug for Denoiser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Denoiser").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_stays_in_unit_range() {
        let mut denoiser = Denoiser::try_new().unwrap();
        let mut frame = [0.0f32; DENOISE_FRAME_SIZE];
        for (i, sample) in frame.iter_mut().enumerate() {
            *sample = 0.9 * (i as f32 * 0.2).sin();
        }
        for _ in 0..10 {
            denoiser.process_frame(&mut frame);
        }
        assert!(frame.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    }

    #[test]
    fn voice_probability_is_a_probability() {
        let mut denoiser = Denoiser::try_new().unwrap();
        let mut frame = [0.0f32; DENOISE_FRAME_SIZE];
        let p = denoiser.process_frame(&mut frame);
        assert!((0.0..=1.0).contains(&p));
    }
}
