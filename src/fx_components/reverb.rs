// src/fx_components/reverb.rs

//! A single-tap feedback delay used as the looper's reverb.
//!
//! The delay line is a circular buffer of `rate * delay_ms / 1000` samples.
//! Every sample reads the oldest slot, scales it by `decay`, adds it to the
//! input and writes the sum back into that same slot, so each echo is fed
//! back into the line. The buffer is reallocated only when the delay time
//! changes its length in samples.

use crate::fx_components::DspComponent;
use serde::{Deserialize, Serialize};

pub const MAX_DELAY_MS: f32 = 2000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Feedback gain applied to the delayed sample (0.0 to 0.999).
    pub decay: f32,
    /// Wet/dry balance of the output (0.0 = dry, 1.0 = wet).
    pub wet: f32,
    /// Length of the delay line in milliseconds.
    pub delay_ms: f32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            decay: 0.5,
            wet: 0.5,
            delay_ms: 100.0,
        }
    }
}

impl Params {
    pub fn clamped(self) -> Self {
        Self {
            decay: self.decay.clamp(0.0, 0.999),
            wet: self.wet.clamp(0.0, 1.0),
            delay_ms: self.delay_ms.clamp(1.0, MAX_DELAY_MS),
        }
    }
}

#[derive(Debug)]
pub struct Reverb {
    params: Params,
    sample_rate: f32,
    buffer: Vec<f32>,
    write_pos: usize,
}

impl Reverb {
    pub fn new(sample_rate: f32, params: Params) -> Self {
        let params = params.clamped();
        let len = Self::delay_len(params.delay_ms, sample_rate);
        Self {
            params,
            sample_rate,
            buffer: vec![0.0; len],
            write_pos: 0,
        }
    }

    fn delay_len(delay_ms: f32, sample_rate: f32) -> usize {
        ((sample_rate * delay_ms / 1000.0) as usize).max(1)
    }

    pub fn params(&self) -> Params {
        self.params
    }

    /// Length of the delay line in samples.
    pub fn delay_samples(&self) -> usize {
        self.buffer.len()
    }

    pub fn set_params(&mut self, params: Params) {
        let params = params.clamped();
        let len = Self::delay_len(params.delay_ms, self.sample_rate);
        if len != self.buffer.len() {
            self.buffer = vec![0.0; len];
            self.write_pos = 0;
        }
        self.params = params;
    }

    pub fn set_decay(&mut self, decay: f32) {
        self.set_params(Params { decay, ..self.params });
    }

    pub fn set_wet(&mut self, wet: f32) {
        self.set_params(Params { wet, ..self.params });
    }

    pub fn set_delay_ms(&mut self, delay_ms: f32) {
        self.set_params(Params { delay_ms, ..self.params });
    }
}

impl DspComponent for Reverb {
    fn process_chunk(&mut self, input: &[f32], output: &mut [f32]) {
        let Params { decay, wet, .. } = self.params;
        let dry = 1.0 - wet;
        let len = self.buffer.len();
        for (out, &sample) in output.iter_mut().zip(input) {
            let delayed = self.buffer[self.write_pos] * decay;
            let wet_sample = sample + delayed;
            self.buffer[self.write_pos] = wet_sample;
            self.write_pos = (self.write_pos + 1) % len;
            *out = (dry * sample + wet * wet_sample).clamp(-1.0, 1.0);
        }
    }

    fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
    }
}
